use core::fmt;

use crate::opcodes::{instruction_length, opcode_byte, Opcode, OperandShape};
use crate::operand::{
    BitopSrc, ComputeSelector, Condition, FloatSrc, HalfSrc, Operand, Register, SrcKind,
    SrcModifiers,
};

/// Bytes visible to the decoder at each position. Operand layouts read up to
/// byte 7 and the longest instruction is 12 bytes; anything past the end of
/// the input reads as zero.
pub const WINDOW: usize = 16;

/// First byte of the shader terminator (`stop` with the high bit set).
pub const STOP_BYTE: u8 = 0x88;

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    window: [u8; WINDOW],
    /// Opcode value, `(byte0 & 0x7F) | (byte1 & 0x80)`.
    pub opcode_byte: u8,
    pub opcode: Option<Opcode>,
    pub length: u8,
    /// High bit of byte 0, meaning unknown.
    pub high_bit: bool,
    pub condition: Option<Condition>,
    pub dest: Register,
    pub operands: Vec<Operand>,
    /// The encoded length runs past the bytes that were available.
    pub truncated: bool,
}

impl Instruction {
    /// The encoded bytes (zero padded when truncated).
    pub fn bytes(&self) -> &[u8] {
        &self.window[..usize::from(self.length)]
    }

    pub fn is_stop(&self) -> bool {
        self.window[0] == STOP_BYTE
    }

    pub fn mnemonic(&self) -> Mnemonic {
        Mnemonic(self.opcode, self.opcode_byte)
    }

    /// Whether the text form accounts for every encoded bit.
    pub fn is_understood(&self) -> bool {
        self.opcode.is_some_and(Opcode::is_understood)
    }

    /// `#` followed by each encoded byte in hex.
    pub fn hex(&self) -> HexBytes<'_> {
        HexBytes(self.bytes())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.high_bit { "+" } else { "-" })?;
        write!(f, "{}", self.mnemonic())?;
        if let Some(condition) = self.condition {
            write!(f, "{condition}")?;
        }
        write!(f, " {}", self.dest)?;
        for operand in &self.operands {
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Mnemonic(Option<Opcode>, u8);

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(op) => f.write_str(op.mnemonic()),
            None => write!(f, "op_{:02X}", self.1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HexBytes<'a>(&'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("#")?;
        for b in self.0 {
            write!(f, " {b:02X}")?;
        }
        Ok(())
    }
}

/// Decodes the instruction at the start of `bytes`.
///
/// Never fails: unknown opcodes decode as 2-byte `op_XX`, and bytes past the
/// end of the input read as zero. The returned length is always at least 2.
pub fn decode_one(bytes: &[u8]) -> Instruction {
    let mut code = [0u8; WINDOW];
    let available = bytes.len().min(WINDOW);
    code[..available].copy_from_slice(&bytes[..available]);

    let opcode_byte = opcode_byte(code[0], code[1]);
    let opcode = Opcode::from_u8(opcode_byte);
    let length = instruction_length(code[0], code[1]);

    let condition = match opcode {
        Some(Opcode::Icsel) => Some(Condition::integer(code[7] >> 4)),
        Some(Opcode::Fcsel) => Some(Condition::float(code[7] >> 4)),
        _ => None,
    };

    let mut wide = code[1] & 1 != 0;
    if opcode == Some(Opcode::StVar) {
        wide = !wide;
    }
    let dest = Register {
        wide,
        index: (code[1] >> 1) & 0x3F,
    };

    let shape = opcode.map_or(OperandShape::Generic, Opcode::shape);
    let operands = match shape {
        OperandShape::Float32Alu => float32_alu(&code),
        OperandShape::HalfAlu => half_alu(&code),
        OperandShape::Bitop => bitop(&code),
        OperandShape::LdCompute => ld_compute(&code),
        OperandShape::MovImm => mov_imm(&code, dest.wide),
        OperandShape::StVar => st_var(&code),
        OperandShape::Generic => generic(&code, length, opcode == Some(Opcode::Iadd)),
    };

    Instruction {
        window: code,
        opcode_byte,
        opcode,
        length,
        high_bit: code[0] & 0x80 != 0,
        condition,
        dest,
        operands,
        truncated: usize::from(length) > bytes.len(),
    }
}

fn float32_alu(code: &[u8; WINDOW]) -> Vec<Operand> {
    let src0 = u16::from(code[2]) | (u16::from(code[3] & 0xF) << 8);
    let src1 = u16::from(code[3] >> 4) | (u16::from(code[4]) << 4);
    let mut ops = vec![
        Operand::Float(FloatSrc::from_packed(src0)),
        Operand::Float(FloatSrc::from_packed(src1)),
    ];
    if code[5] != 0 {
        ops.push(Operand::Comment {
            name: "unk5",
            value: code[5],
        });
    }
    ops
}

fn half_alu(code: &[u8; WINDOW]) -> Vec<Operand> {
    let src1 = HalfSrc {
        value: (code[2] & 0x3F) | ((code[5] & 0x0C) << 4),
        type_bits: (code[2] >> 6) | ((code[3] & 0x0F) << 2),
    };
    let src2 = HalfSrc {
        value: (code[3] >> 4) | ((code[4] & 0x3) << 4) | ((code[5] & 0x3) << 6),
        type_bits: code[4] >> 2,
    };
    vec![Operand::Half(src1), Operand::Half(src2)]
}

fn bitop(code: &[u8; WINDOW]) -> Vec<Operand> {
    // Sum-of-products truth table over a&b, ~a&b, a&~b, ~a&~b.
    let control = ((code[3] >> 2) & 0x3) | ((code[4] >> 4) & 0xC);
    let src1 = u16::from(code[2])
        | (u16::from(code[3] & 0x3) << 8)
        | (u16::from(code[5] & 0xC) << 8);
    let src2 = u16::from(code[3] >> 4)
        | (u16::from(code[4] & 0x3F) << 4)
        | (u16::from(code[5] & 0x3) << 10);
    vec![
        Operand::BitopControl(control),
        Operand::Bitop(BitopSrc { raw: src1 }),
        Operand::Bitop(BitopSrc { raw: src2 }),
    ]
}

fn ld_compute(code: &[u8; WINDOW]) -> Vec<Operand> {
    let arg = u16::from(code[2]) | (u16::from(code[3]) << 8);
    vec![Operand::SystemValue {
        selector: ComputeSelector::from_raw(arg >> 2),
        component: (arg & 3) as u8,
    }]
}

fn mov_imm(code: &[u8; WINDOW], wide: bool) -> Vec<Operand> {
    let mut imm = u32::from(code[2]) | (u32::from(code[3]) << 8);
    if wide {
        imm |= (u32::from(code[4]) << 16) | (u32::from(code[5]) << 24);
    }
    vec![Operand::Immediate(imm)]
}

fn st_var(code: &[u8; WINDOW]) -> Vec<Operand> {
    let mut ops = Vec::new();
    if code[1] & 1 != 0 {
        ops.push(Operand::UnknownFlag);
    }
    ops.push(Operand::VaryingIndex(code[2] & 0xF));
    if code[2] & 0xF0 != 0x80 {
        ops.push(Operand::Unknown {
            name: "unk2",
            value: u32::from(code[2] >> 4),
        });
    }
    if code[3] != 0x80 {
        ops.push(Operand::Unknown {
            name: "unk3",
            value: u32::from(code[3]),
        });
    }
    ops
}

fn float_src(kind: u8, index: u32, wide: bool, abs: bool, neg: bool) -> Operand {
    let mut modifiers = SrcModifiers::empty();
    modifiers.set(SrcModifiers::WIDE, wide);
    modifiers.set(SrcModifiers::ABS, abs);
    modifiers.set(SrcModifiers::NEG, neg);
    Operand::Float(FloatSrc {
        kind: SrcKind::from_bits(kind),
        index,
        modifiers,
    })
}

/// Best guess shared by the opcodes without a dedicated layout.
fn generic(code: &[u8; WINDOW], length: u8, iadd: bool) -> Vec<Operand> {
    let mut ops = Vec::new();
    if length > 2 {
        // iadd folds two more index bits in from byte 5.
        let extra = if iadd { u32::from(code[5] & 0x0C) << 4 } else { 0 };
        ops.push(float_src(
            (code[2] & 0xC0) >> 6,
            u32::from(code[2] & 0x3F) | extra,
            code[3] & 0x20 != 0,
            code[3] & 0x04 != 0,
            code[3] & 0x08 != 0,
        ));
        ops.push(float_src(
            (code[4] & 0x0C) >> 2,
            u32::from((code[3] >> 4) & 0xF)
                | (u32::from(code[4] & 0x3) << 4)
                | (u32::from(code[7] & 0x3) << 6),
            code[4] & 0x20 != 0,
            code[4] & 0x40 != 0,
            code[4] & 0x80 != 0,
        ));
    }
    if length > 6 && !iadd {
        ops.push(float_src(
            (code[5] & 0xC0) >> 6,
            u32::from(code[5] & 0x3F) | u32::from(code[6] & 0xC0),
            code[6] & 0x20 != 0,
            code[6] & 0x04 != 0,
            code[6] & 0x08 != 0,
        ));
    }
    ops
}
