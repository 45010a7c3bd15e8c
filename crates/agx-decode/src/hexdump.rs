use core::fmt;

const LINE: usize = 16;

/// Classic offset / hex / ASCII dump. A run of all-zero lines after the
/// first is collapsed into a single `*`.
pub struct HexDump<'a> {
    bytes: &'a [u8],
    indent: usize,
}

pub fn hexdump(bytes: &[u8]) -> HexDump<'_> {
    HexDump { bytes, indent: 0 }
}

impl<'a> HexDump<'a> {
    pub fn indent(self, indent: usize) -> HexDump<'a> {
        HexDump { indent, ..self }
    }
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prev_zero = false;
        let mut starred = false;
        for (i, line) in self.bytes.chunks(LINE).enumerate() {
            let zero = line.len() == LINE && line.iter().all(|&b| b == 0);
            if zero && prev_zero {
                if !starred {
                    writeln!(f, "{:1$}*", "", self.indent)?;
                    starred = true;
                }
                continue;
            }
            prev_zero = zero;
            starred = false;

            write!(f, "{:2$}{:06X}  ", "", i * LINE, self.indent)?;
            for b in line {
                write!(f, "{b:02X} ")?;
            }
            for _ in line.len()..LINE {
                f.write_str("   ")?;
            }
            f.write_str(" |")?;
            for &b in line {
                let c = if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                };
                write!(f, "{c}")?;
            }
            writeln!(f, "|")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_line() {
        assert_eq!(
            hexdump(b"AB\x00").to_string(),
            "000000  41 42 00                                         |AB.|\n"
        );
    }

    #[test]
    fn zero_runs_collapse() {
        let mut bytes = vec![0u8; 64];
        bytes[63] = 1;
        let out = hexdump(&bytes).indent(2).to_string();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("  000000  00 00"));
        assert_eq!(lines[1], "  *");
        assert!(lines[2].starts_with("  000030  00 "));
        assert!(lines[2].contains("01 "));
    }
}
