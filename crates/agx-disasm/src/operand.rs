use core::fmt;

bitflags::bitflags! {
    /// Modifier bits attached to a source operand.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SrcModifiers: u8 {
        /// Full 32-bit register rather than a 16-bit half.
        const WIDE = 1 << 0;
        const ABS = 1 << 1;
        const NEG = 1 << 2;
        /// Set in captured shaders, meaning unknown (possibly "discard").
        const UNKNOWN = 1 << 3;
    }
}

/// Register file a float source reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SrcKind {
    Immediate,
    /// Type 1 has never been observed.
    Unknown1,
    ConstantMemory,
    GeneralRegister,
}

impl SrcKind {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => SrcKind::Immediate,
            1 => SrcKind::Unknown1,
            2 => SrcKind::ConstantMemory,
            _ => SrcKind::GeneralRegister,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            SrcKind::Immediate => "#",
            SrcKind::Unknown1 => "unk1:",
            SrcKind::ConstantMemory => "u",
            SrcKind::GeneralRegister => "",
        }
    }
}

/// Source operand of the 32-bit float ALU and the generic layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatSrc {
    pub kind: SrcKind,
    pub index: u32,
    pub modifiers: SrcModifiers,
}

impl FloatSrc {
    /// Decodes the 12-bit packed form `neg:1 abs:1 size32:1 unk:1 type:2 reg:6`.
    pub fn from_packed(packed: u16) -> Self {
        let mut modifiers = SrcModifiers::empty();
        modifiers.set(SrcModifiers::UNKNOWN, packed & 0x100 != 0);
        modifiers.set(SrcModifiers::WIDE, packed & 0x200 != 0);
        modifiers.set(SrcModifiers::ABS, packed & 0x400 != 0);
        modifiers.set(SrcModifiers::NEG, packed & 0x800 != 0);
        FloatSrc {
            kind: SrcKind::from_bits(((packed & 0xC0) >> 6) as u8),
            index: u32::from(packed & 0x3F),
            modifiers,
        }
    }

    pub fn is_32bit(&self) -> bool {
        self.modifiers.contains(SrcModifiers::WIDE)
    }

    pub fn absolute(&self) -> bool {
        self.modifiers.contains(SrcModifiers::ABS)
    }

    pub fn negate(&self) -> bool {
        self.modifiers.contains(SrcModifiers::NEG)
    }

    pub fn unknown_modifier(&self) -> bool {
        self.modifiers.contains(SrcModifiers::UNKNOWN)
    }
}

impl fmt::Display for FloatSrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let half = if self.is_32bit() || self.kind == SrcKind::Immediate {
            ""
        } else if self.index & 1 != 0 {
            "h"
        } else {
            "l"
        };
        write!(f, "{}{}{}", self.kind.prefix(), self.index, half)?;
        if self.absolute() {
            f.write_str(".abs")?;
        }
        if self.negate() {
            f.write_str(".neg")?;
        }
        if self.unknown_modifier() {
            f.write_str(".unk")?;
        }
        Ok(())
    }
}

/// Decodes the 8-bit float immediate used by the 16-bit ALU.
///
/// Bit 7 is the sign, bits 4..7 the exponent and bits 0..4 the mantissa. A
/// zero exponent encodes `mantissa / 64`.
pub fn decode_float_imm8(value: u8) -> f32 {
    let sign = if value & 0x80 != 0 { -1.0f32 } else { 1.0 };
    let exponent = i32::from((value & 0x70) >> 4);
    let mantissa = f32::from(value & 0x0F);
    if exponent == 0 {
        sign * mantissa / 64.0
    } else {
        sign * (mantissa + 16.0) * 2f32.powi(exponent - 7)
    }
}

/// Returns the encoding whose value is closest to `value`.
pub fn encode_float_imm8(value: f32) -> u8 {
    let sign = if value.is_sign_negative() { 0x80 } else { 0 };
    let magnitude = value.abs();
    let mut best = 0u8;
    let mut best_err = f32::INFINITY;
    for code in 0u8..0x80 {
        let err = (decode_float_imm8(code) - magnitude).abs();
        if err < best_err {
            best = code;
            best_err = err;
        }
    }
    sign | best
}

/// Source operand of the 16-bit float ALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HalfSrc {
    pub value: u8,
    /// Six type bits: bits 0 and 2 select the kind (bit 0 doubles as bit 8
    /// of a constant index), bit 3 is abs, bit 4 is neg. Bits 1 and 5 are
    /// unknown and kept as-is.
    pub type_bits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HalfKind {
    Immediate(f32),
    Register(u8),
    Constant(u16),
}

impl HalfSrc {
    pub fn kind(&self) -> HalfKind {
        match self.type_bits & 5 {
            0 => HalfKind::Immediate(decode_float_imm8(self.value)),
            1 => HalfKind::Register(self.value),
            _ => HalfKind::Constant((u16::from(self.type_bits & 1) << 8) | u16::from(self.value)),
        }
    }

    pub fn modifiers(&self) -> SrcModifiers {
        let mut m = SrcModifiers::empty();
        m.set(SrcModifiers::ABS, self.type_bits & 0x08 != 0);
        m.set(SrcModifiers::NEG, self.type_bits & 0x10 != 0);
        m
    }
}

impl fmt::Display for HalfSrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            HalfKind::Immediate(v) => write!(f, "#{v:.6}f")?,
            HalfKind::Register(r) => write!(f, "h{r}")?,
            HalfKind::Constant(c) => write!(f, "const_{c}")?,
        }
        let m = self.modifiers();
        if m.contains(SrcModifiers::ABS) {
            f.write_str(".abs")?;
        }
        if m.contains(SrcModifiers::NEG) {
            f.write_str(".neg")?;
        }
        Ok(())
    }
}

/// 12-bit bitop source: `mode:4` at bits 6..10 around an 8-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitopSrc {
    pub raw: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitopKind {
    Immediate(u8),
    Half(u8),
    /// 32-bit register pair, numbered in 32-bit units.
    Wide(u8),
    Unknown(u16),
}

impl BitopSrc {
    pub fn mode(&self) -> u8 {
        ((self.raw >> 6) & 0x0F) as u8
    }

    pub fn value(&self) -> u8 {
        ((self.raw & 0x3F) | ((self.raw >> 4) & 0xC0)) as u8
    }

    pub fn kind(&self) -> BitopKind {
        let v = self.value();
        match self.mode() {
            0x0 => BitopKind::Immediate(v),
            0x3 => BitopKind::Half(v),
            // A pair must start on an even half.
            0xB if v & 1 == 0 => BitopKind::Wide(v >> 1),
            _ => BitopKind::Unknown(self.raw),
        }
    }
}

impl fmt::Display for BitopSrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            BitopKind::Immediate(v) => write!(f, "#0x{v:x}"),
            BitopKind::Half(v) => write!(f, "h{v}"),
            BitopKind::Wide(v) => write!(f, "w{v}"),
            BitopKind::Unknown(raw) => write!(f, "unk_{raw:x}"),
        }
    }
}

/// Compute-stage system value read by `ld_compute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeSelector {
    ThreadgroupPositionInGrid,
    ThreadPositionInThreadgroup,
    ThreadPositionInSimdgroup,
    ThreadPositionInGrid,
    Unknown(u16),
}

impl ComputeSelector {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x00 => ComputeSelector::ThreadgroupPositionInGrid,
            0x0c => ComputeSelector::ThreadPositionInThreadgroup,
            0x0d => ComputeSelector::ThreadPositionInSimdgroup,
            0x104 => ComputeSelector::ThreadPositionInGrid,
            other => ComputeSelector::Unknown(other),
        }
    }
}

impl fmt::Display for ComputeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeSelector::ThreadgroupPositionInGrid => f.write_str("threadgroup_position_in_grid"),
            ComputeSelector::ThreadPositionInThreadgroup => {
                f.write_str("thread_position_in_threadgroup")
            }
            ComputeSelector::ThreadPositionInSimdgroup => f.write_str("thread_position_in_simdgroup"),
            ComputeSelector::ThreadPositionInGrid => f.write_str("thread_position_in_grid"),
            ComputeSelector::Unknown(raw) => write!(f, "unk_{raw:X}"),
        }
    }
}

/// Comparison or min/max mode of `icsel`/`fcsel`, from the high nibble of
/// byte 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq,
    Imin,
    Ult,
    Imax,
    Ugt,
    Fmin,
    Fmax,
    Unknown(u8),
}

impl Condition {
    pub fn integer(mode: u8) -> Self {
        match mode {
            0x1 => Condition::Eq,
            0x2 => Condition::Imin,
            0x3 => Condition::Ult,
            0x4 => Condition::Imax,
            0x5 => Condition::Ugt,
            other => Condition::Unknown(other),
        }
    }

    pub fn float(mode: u8) -> Self {
        match mode {
            0x6 => Condition::Fmin,
            0xE => Condition::Fmax,
            other => Condition::Unknown(other),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Eq => f.write_str(".eq"),
            Condition::Imin => f.write_str(".imin"),
            Condition::Ult => f.write_str(".ult"),
            Condition::Imax => f.write_str(".imax"),
            Condition::Ugt => f.write_str(".ugt"),
            Condition::Fmin => f.write_str(".fmin"),
            Condition::Fmax => f.write_str(".fmax"),
            Condition::Unknown(mode) => write!(f, ".unk{mode:X}"),
        }
    }
}

/// Destination register from byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub wide: bool,
    pub index: u8,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.wide { "w" } else { "h" }, self.index)
    }
}

/// One decoded operand. `Display` includes the separator that precedes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Float(FloatSrc),
    Half(HalfSrc),
    BitopControl(u8),
    Bitop(BitopSrc),
    SystemValue {
        selector: ComputeSelector,
        component: u8,
    },
    Immediate(u32),
    VaryingIndex(u8),
    /// Bits that differ from the value always seen so far.
    Unknown { name: &'static str, value: u32 },
    UnknownFlag,
    Comment { name: &'static str, value: u8 },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Float(src) => write!(f, ", {src}"),
            Operand::Half(src) => write!(f, ", {src}"),
            Operand::BitopControl(control) => write!(f, ", #0x{control:x}"),
            Operand::Bitop(src) => write!(f, ", {src}"),
            Operand::SystemValue {
                selector,
                component,
            } => {
                let lane = ['x', 'y', 'z', 'w'][usize::from(*component & 3)];
                write!(f, ", [{selector}].{lane}")
            }
            Operand::Immediate(imm) => write!(f, ", #0x{imm:X}"),
            Operand::VaryingIndex(index) => write!(f, ", index:{index}"),
            Operand::Unknown { name, value } => write!(f, ", {name}={value:X}"),
            Operand::UnknownFlag => f.write_str(".unk"),
            Operand::Comment { name, value } => write!(f, " /* {name} = {value:02X} */"),
        }
    }
}
