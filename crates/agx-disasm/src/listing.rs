use core::fmt;

use tracing::debug;

use crate::decode::{decode_one, Instruction};

/// Result of decoding a shader binary.
#[derive(Debug, Clone, PartialEq)]
pub struct Disassembly {
    /// Instructions with their byte offset from the start of the input.
    pub instructions: Vec<(usize, Instruction)>,
    /// Bytes covered by the decoded instructions.
    pub consumed: usize,
    pub stopped: bool,
    /// The last instruction's encoded length ran past the input.
    pub truncated: bool,
}

/// Decodes instructions from the start of `code` until a stop instruction or
/// the end of the input.
pub fn disassemble(code: &[u8]) -> Disassembly {
    let mut instructions = Vec::new();
    let mut consumed = 0usize;
    let mut stopped = false;
    let mut truncated = false;

    while consumed < code.len() && !stopped {
        let inst = decode_one(&code[consumed..]);
        let len = usize::from(inst.length);
        stopped = inst.is_stop();
        truncated = inst.truncated;
        instructions.push((consumed, inst));
        consumed += len;
        if truncated {
            break;
        }
    }

    if !stopped {
        debug!(consumed, len = code.len(), "no stop instruction in shader");
    }

    Disassembly {
        instructions,
        consumed: consumed.min(code.len()),
        stopped,
        truncated,
    }
}

impl Disassembly {
    /// Text form, one instruction per line. Instructions that are not fully
    /// understood are always preceded by their hex bytes; `verbose` adds the
    /// bytes for every instruction.
    pub fn listing(&self, verbose: bool) -> Listing<'_> {
        Listing {
            disassembly: self,
            verbose,
        }
    }
}

pub struct Listing<'a> {
    disassembly: &'a Disassembly,
    verbose: bool,
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (offset, inst) in &self.disassembly.instructions {
            if self.verbose || !inst.is_understood() {
                writeln!(f, "{}", inst.hex())?;
            }
            writeln!(f, "{inst}")?;
            if inst.truncated {
                writeln!(
                    f,
                    "// error: instruction at 0x{offset:x} runs past the end of the buffer"
                )?;
            }
        }
        if !self.disassembly.stopped {
            writeln!(f, "// error: stop instruction not found")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_at_end_of_buffer_is_found() {
        let code = [0x62, 0x00, 0x87, 0x3A, 0x88, 0x00, 0x08, 0x00];
        let d = disassemble(&code);
        assert!(d.stopped);
        assert_eq!(d.consumed, 8);
        assert_eq!(d.instructions.len(), 2);
        assert_eq!(d.instructions[1].0, 4);
    }

    #[test]
    fn missing_stop_is_reported() {
        let d = disassemble(&[0x38, 0x00, 0x38, 0x00]);
        assert!(!d.stopped);
        assert_eq!(d.consumed, 4);
        assert_eq!(
            d.listing(false).to_string(),
            "# 38 00\n-wait h0\n# 38 00\n-wait h0\n// error: stop instruction not found\n"
        );
    }

    #[test]
    fn verbose_listing_dumps_every_instruction() {
        let code = [0x62, 0x00, 0x87, 0x3A, 0x88, 0x00, 0x08, 0x00];
        let quiet = disassemble(&code).listing(false).to_string();
        assert!(quiet.starts_with("-movi h0, #0x3A87\n# 88 00 08 00\n+stop"));
        let verbose = disassemble(&code).listing(true).to_string();
        assert!(verbose.starts_with("# 62 00 87 3A\n-movi h0, #0x3A87\n"));
    }

    #[test]
    fn truncated_tail_ends_the_loop() {
        let d = disassemble(&[0x38, 0x00, 0x0e, 0x05, 0xc2]);
        assert!(d.truncated);
        assert!(!d.stopped);
        assert_eq!(d.instructions.len(), 2);
        assert_eq!(d.consumed, 5);
        assert!(d
            .listing(false)
            .to_string()
            .contains("// error: instruction at 0x2 runs past the end of the buffer"));
    }

    #[test]
    fn empty_input() {
        let d = disassemble(&[]);
        assert!(d.instructions.is_empty());
        assert!(!d.stopped);
    }
}
