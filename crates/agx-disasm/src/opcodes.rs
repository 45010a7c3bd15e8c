//! Opcode numbering and per-opcode metadata.
//!
//! The opcode is 8 bits assembled from two instruction bytes: the low 7 bits
//! of byte 0 and the high bit of byte 1. The high bit of byte 0 is not part of
//! the opcode (it is rendered as a `+`/`-` prefix).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    FfmaCmpct16 = 0x36,
    FfmaCmpctSat16 = 0x76,
    Fmul16 = 0x96,
    Fadd16 = 0xA6,
    Ffma16 = 0xB6,
    FmulSat16 = 0xD6,
    FaddSat16 = 0xE6,
    FfmaSat16 = 0xF6,

    Fround32 = 0x0A,
    FfmaCmpct32 = 0x3A,
    FfmaCmpctSat32 = 0x7A,
    Fmul32 = 0x9A,
    Fadd32 = 0xAA,
    Ffma32 = 0xBA,
    FmulSat32 = 0xDA,
    FaddSat32 = 0xEA,
    FfmaSat32 = 0xFA,

    Iadd = 0x0E,
    Imad = 0x1E,
    Ishl = 0x2E,
    Iaddsat = 0x4E,
    Ishr = 0xAE,
    I2f = 0xBE,

    Load = 0x05,
    Store = 0x45,
    LdVarNoPerspective = 0xA1,
    LdVar = 0xE1,
    StVar = 0x11,
    UnkB1 = 0xB1,

    Fcsel = 0x02,
    Icsel = 0x12,
    Movi = 0x62,
    LdCompute = 0x72,
    Bitop = 0x7E,

    Blend = 0x09,
    Stop = 0x08,
    Wait = 0x38,

    // Seen before blending.
    Unk48 = 0x48,
    // Branch-like, not understood.
    Unk42 = 0x42,
    Unk52 = 0x52,
    UnkD2 = 0xD2,
    Unk80 = 0x80,
}

/// How an opcode's operand bytes are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// Two 12-bit packed float sources (fadd/fmul 32-bit).
    Float32Alu,
    /// Two 16-bit float sources with a 6-bit type field each.
    HalfAlu,
    Bitop,
    LdCompute,
    MovImm,
    StVar,
    /// Best-effort layout shared by everything else.
    Generic,
}

impl Opcode {
    pub const ALL: [Opcode; 42] = [
        Opcode::FfmaCmpct16,
        Opcode::FfmaCmpctSat16,
        Opcode::Fmul16,
        Opcode::Fadd16,
        Opcode::Ffma16,
        Opcode::FmulSat16,
        Opcode::FaddSat16,
        Opcode::FfmaSat16,
        Opcode::Fround32,
        Opcode::FfmaCmpct32,
        Opcode::FfmaCmpctSat32,
        Opcode::Fmul32,
        Opcode::Fadd32,
        Opcode::Ffma32,
        Opcode::FmulSat32,
        Opcode::FaddSat32,
        Opcode::FfmaSat32,
        Opcode::Iadd,
        Opcode::Imad,
        Opcode::Ishl,
        Opcode::Iaddsat,
        Opcode::Ishr,
        Opcode::I2f,
        Opcode::Load,
        Opcode::Store,
        Opcode::LdVarNoPerspective,
        Opcode::LdVar,
        Opcode::StVar,
        Opcode::UnkB1,
        Opcode::Fcsel,
        Opcode::Icsel,
        Opcode::Movi,
        Opcode::LdCompute,
        Opcode::Bitop,
        Opcode::Blend,
        Opcode::Stop,
        Opcode::Wait,
        Opcode::Unk48,
        Opcode::Unk42,
        Opcode::Unk52,
        Opcode::UnkD2,
        Opcode::Unk80,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        OPCODE_TABLE[value as usize].map(|info| info.opcode)
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::FfmaCmpct16 => "ffma.cmpct.16",
            Opcode::FfmaCmpctSat16 => "ffma.cmpct.sat.16",
            Opcode::Fmul16 => "fmul.16",
            Opcode::Fadd16 => "fadd.16",
            Opcode::Ffma16 => "ffma.16",
            Opcode::FmulSat16 => "fmul.sat.16",
            Opcode::FaddSat16 => "fadd.sat.16",
            Opcode::FfmaSat16 => "ffma.sat.16",
            Opcode::Fround32 => "fround.32",
            Opcode::FfmaCmpct32 => "ffma.cmpct.32",
            Opcode::FfmaCmpctSat32 => "ffma.cmpct.sat.32",
            Opcode::Fmul32 => "fmul.32",
            Opcode::Fadd32 => "fadd.32",
            Opcode::Ffma32 => "ffma.32",
            Opcode::FmulSat32 => "fmul.sat.32",
            Opcode::FaddSat32 => "fadd.sat.32",
            Opcode::FfmaSat32 => "ffma.sat.32",
            Opcode::Iadd => "iadd",
            Opcode::Imad => "imad",
            Opcode::Ishl => "ishl",
            Opcode::Iaddsat => "iaddsat",
            Opcode::Ishr => "ishr",
            Opcode::I2f => "i2f",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::LdVarNoPerspective => "ld_var.no_perspective",
            Opcode::LdVar => "ld_var",
            Opcode::StVar => "st_var",
            Opcode::UnkB1 => "unkb1",
            Opcode::Fcsel => "fcsel",
            Opcode::Icsel => "icsel",
            Opcode::Movi => "movi",
            Opcode::LdCompute => "ld_compute",
            Opcode::Bitop => "bitop",
            Opcode::Blend => "blend",
            Opcode::Stop => "stop",
            Opcode::Wait => "wait",
            Opcode::Unk48 => "unk48",
            Opcode::Unk42 => "unk42",
            Opcode::Unk52 => "unk52",
            Opcode::UnkD2 => "unkD2",
            Opcode::Unk80 => "unk80",
        }
    }

    /// Encoded length in bytes. `movi` grows to 6 bytes with a 32-bit
    /// destination; see [`instruction_length`].
    pub const fn length(self) -> u8 {
        match self {
            Opcode::Wait => 2,
            Opcode::StVar
            | Opcode::Movi
            | Opcode::LdCompute
            | Opcode::Stop
            | Opcode::Unk48
            | Opcode::Unk80 => 4,
            Opcode::FfmaCmpct16
            | Opcode::FfmaCmpctSat16
            | Opcode::Fmul16
            | Opcode::Fadd16
            | Opcode::FmulSat16
            | Opcode::FaddSat16
            | Opcode::Fround32
            | Opcode::FfmaCmpct32
            | Opcode::FfmaCmpctSat32
            | Opcode::Fmul32
            | Opcode::Fadd32
            | Opcode::FmulSat32
            | Opcode::FaddSat32
            | Opcode::I2f
            | Opcode::Bitop
            | Opcode::Unk42
            | Opcode::Unk52 => 6,
            Opcode::UnkB1 => 10,
            Opcode::UnkD2 => 12,
            _ => 8,
        }
    }

    /// Whether every bit of the encoding is accounted for. Instructions that
    /// are not get a hex dump alongside their text.
    pub const fn is_understood(self) -> bool {
        matches!(
            self,
            Opcode::Fadd32
                | Opcode::FaddSat32
                | Opcode::Fmul32
                | Opcode::FmulSat32
                | Opcode::StVar
                | Opcode::Movi
                | Opcode::LdCompute
        )
    }

    pub const fn shape(self) -> OperandShape {
        match self {
            Opcode::Fadd32 | Opcode::FaddSat32 | Opcode::Fmul32 | Opcode::FmulSat32 => {
                OperandShape::Float32Alu
            }
            Opcode::Fadd16 | Opcode::FaddSat16 | Opcode::Fmul16 | Opcode::FmulSat16 => {
                OperandShape::HalfAlu
            }
            Opcode::Bitop => OperandShape::Bitop,
            Opcode::LdCompute => OperandShape::LdCompute,
            Opcode::Movi => OperandShape::MovImm,
            Opcode::StVar => OperandShape::StVar,
            _ => OperandShape::Generic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub opcode: Opcode,
    pub mnemonic: &'static str,
    pub length: u8,
    pub understood: bool,
}

const fn build_table() -> [Option<OpcodeInfo>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < Opcode::ALL.len() {
        let opcode = Opcode::ALL[i];
        table[opcode as usize] = Some(OpcodeInfo {
            opcode,
            mnemonic: opcode.mnemonic(),
            length: opcode.length(),
            understood: opcode.is_understood(),
        });
        i += 1;
    }
    table
}

/// Opcode metadata indexed by the 8-bit opcode value.
pub static OPCODE_TABLE: [Option<OpcodeInfo>; 256] = build_table();

/// Extracts the opcode from the first two instruction bytes.
pub fn opcode_byte(b0: u8, b1: u8) -> u8 {
    (b0 & 0x7F) | (b1 & 0x80)
}

/// Length of the instruction starting with `b0 b1`. Unknown opcodes are
/// assumed to be 2 bytes.
pub fn instruction_length(b0: u8, b1: u8) -> u8 {
    match Opcode::from_u8(opcode_byte(b0, b1)) {
        Some(Opcode::Movi) if b1 & 1 != 0 => 6,
        Some(op) => op.length(),
        None => 2,
    }
}
