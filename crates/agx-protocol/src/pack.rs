//! Schema-driven bit packing for fixed-size GPU descriptors.
//!
//! A [`RecordLayout`] names every field by bit offset and width. Fields may
//! straddle byte boundaries and are little-endian at the bit level: bit `n`
//! of the record is bit `n % 8` of byte `n / 8`.

use core::fmt;

/// How a field's raw bits map to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Uint,
    /// Opaque bits, printed in hex.
    Hex,
    Bool,
    /// 32-bit IEEE float stored as its bit pattern.
    Float,
    /// Stored as `value - 1`.
    MinusOne,
    Enum(&'static [(u64, &'static str)]),
    /// GPU address stored right-shifted by `shift` bits.
    Address { shift: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    pub name: &'static str,
    pub start: u32,
    pub width: u32,
    pub kind: FieldKind,
}

/// Bits every record of a layout carries, such as a tag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBits {
    pub start: u32,
    pub width: u32,
    pub value: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RecordLayout {
    pub name: &'static str,
    /// Encoded size in bytes.
    pub length: usize,
    pub fixed: &'static [FixedBits],
    pub fields: &'static [FieldDesc],
}

pub const fn field(name: &'static str, start: u32, width: u32, kind: FieldKind) -> FieldDesc {
    FieldDesc {
        name,
        start,
        width,
        kind,
    }
}

pub const fn fixed(start: u32, width: u32, value: u64) -> FixedBits {
    FixedBits {
        start,
        width,
        value,
    }
}

/// A value handed to [`RecordLayout::pack`] or [`Record::set`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Uint(u64),
    Float(f32),
    Bool(bool),
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Uint(u64::from(v))
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::Uint(u64::from(v))
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackError {
    #[error("{layout} has no field named `{field}`")]
    UnknownField { layout: &'static str, field: String },

    #[error("{layout}.{field}: 0x{value:x} does not fit in {width} bits")]
    ValueTooWide {
        layout: &'static str,
        field: &'static str,
        value: u64,
        width: u32,
    },

    #[error("{layout}.{field}: address 0x{value:x} is not {align}-byte aligned")]
    Misaligned {
        layout: &'static str,
        field: &'static str,
        value: u64,
        align: u64,
    },

    #[error("{layout}.{field}: {value} cannot be encoded")]
    OutOfRange {
        layout: &'static str,
        field: &'static str,
        value: u64,
    },

    #[error("{layout}.{field}: expected a {expected} value")]
    TypeMismatch {
        layout: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    #[error("{layout} is {needed} bytes but only {len} are available")]
    TooShort {
        layout: &'static str,
        needed: usize,
        len: usize,
    },
}

fn fits(value: u64, width: u32) -> bool {
    width >= 64 || value >> width == 0
}

pub(crate) fn read_bits(bytes: &[u8], start: u32, width: u32) -> u64 {
    let mut value = 0u64;
    let mut done = 0;
    while done < width {
        let bit = start + done;
        let shift = bit % 8;
        let take = (8 - shift).min(width - done);
        let chunk = (u64::from(bytes[(bit / 8) as usize]) >> shift) & ((1u64 << take) - 1);
        value |= chunk << done;
        done += take;
    }
    value
}

pub(crate) fn write_bits(bytes: &mut [u8], start: u32, width: u32, value: u64) {
    let mut done = 0;
    while done < width {
        let bit = start + done;
        let shift = bit % 8;
        let take = (8 - shift).min(width - done);
        let mask = (((1u16 << take) - 1) << shift) as u8;
        let byte = &mut bytes[(bit / 8) as usize];
        *byte = (*byte & !mask) | (((value >> done) as u8) << shift & mask);
        done += take;
    }
}

impl RecordLayout {
    pub fn field(&self, name: &str) -> Option<&'static FieldDesc> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn lookup(&self, name: &str) -> Result<&'static FieldDesc, PackError> {
        self.field(name).ok_or_else(|| PackError::UnknownField {
            layout: self.name,
            field: name.to_string(),
        })
    }

    /// Whether `bytes` carry this layout's fixed bits.
    pub fn matches_fixed(&self, bytes: &[u8]) -> bool {
        bytes.len() >= self.length
            && self
                .fixed
                .iter()
                .all(|f| read_bits(bytes, f.start, f.width) == f.value)
    }

    /// An all-zero record.
    pub fn record(&'static self) -> Record {
        Record {
            layout: self,
            raw: vec![0; self.fields.len()],
        }
    }

    /// Packs the named values; fields not mentioned are zero.
    pub fn pack(&'static self, values: &[(&str, FieldValue)]) -> Result<Vec<u8>, PackError> {
        let mut record = self.record();
        for (name, value) in values {
            record.set(name, *value)?;
        }
        Ok(record.to_bytes())
    }

    pub fn unpack(&'static self, bytes: &[u8]) -> Result<Record, PackError> {
        if bytes.len() < self.length {
            return Err(PackError::TooShort {
                layout: self.name,
                needed: self.length,
                len: bytes.len(),
            });
        }
        let raw = self
            .fields
            .iter()
            .map(|f| read_bits(bytes, f.start, f.width))
            .collect();
        Ok(Record { layout: self, raw })
    }

    fn encode(&self, desc: &FieldDesc, value: FieldValue) -> Result<u64, PackError> {
        let mismatch = |expected| PackError::TypeMismatch {
            layout: self.name,
            field: desc.name,
            expected,
        };
        let raw = match (desc.kind, value) {
            (FieldKind::Float, FieldValue::Float(v)) => u64::from(v.to_bits()),
            (FieldKind::Float, FieldValue::Uint(bits)) => bits,
            (FieldKind::Float, FieldValue::Bool(_)) => return Err(mismatch("float")),
            (_, FieldValue::Float(_)) => return Err(mismatch("integer")),
            (_, FieldValue::Bool(b)) => u64::from(b),
            (FieldKind::MinusOne, FieldValue::Uint(v)) => {
                v.checked_sub(1).ok_or(PackError::OutOfRange {
                    layout: self.name,
                    field: desc.name,
                    value: v,
                })?
            }
            (FieldKind::Address { shift }, FieldValue::Uint(v)) => {
                let align = 1u64 << shift;
                if v & (align - 1) != 0 {
                    return Err(PackError::Misaligned {
                        layout: self.name,
                        field: desc.name,
                        value: v,
                        align,
                    });
                }
                v >> shift
            }
            (_, FieldValue::Uint(v)) => v,
        };
        Ok(raw)
    }
}

/// Field values of one descriptor, held in their raw (stored) form.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    layout: &'static RecordLayout,
    raw: Vec<u64>,
}

impl Record {
    pub fn layout(&self) -> &'static RecordLayout {
        self.layout
    }

    fn position(&self, name: &str) -> Result<usize, PackError> {
        self.layout
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| PackError::UnknownField {
                layout: self.layout.name,
                field: name.to_string(),
            })
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<&mut Self, PackError> {
        let desc = self.layout.lookup(name)?;
        let raw = self.layout.encode(desc, value.into())?;
        self.set_raw(name, raw)
    }

    /// Stores `raw` as the field's bit pattern, bypassing value conversion.
    pub fn set_raw(&mut self, name: &str, raw: u64) -> Result<&mut Self, PackError> {
        let i = self.position(name)?;
        let desc = &self.layout.fields[i];
        if !fits(raw, desc.width) {
            return Err(PackError::ValueTooWide {
                layout: self.layout.name,
                field: desc.name,
                value: raw,
                width: desc.width,
            });
        }
        self.raw[i] = raw;
        Ok(self)
    }

    pub fn raw(&self, name: &str) -> Option<u64> {
        self.position(name).ok().map(|i| self.raw[i])
    }

    /// Decoded integer value: addresses shifted back, `MinusOne` fields
    /// incremented.
    pub fn get(&self, name: &str) -> Option<u64> {
        let i = self.position(name).ok()?;
        Some(decode(&self.layout.fields[i], self.raw[i]))
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        let raw = self.raw(name)?;
        Some(f32::from_bits(raw as u32))
    }

    /// The value of an address field; `None` for other kinds.
    pub fn address(&self, name: &str) -> Option<u64> {
        match self.layout.field(name)?.kind {
            FieldKind::Address { .. } => self.get(name),
            _ => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static FieldDesc, u64)> + '_ {
        self.layout.fields.iter().zip(self.raw.iter().copied())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.layout.length];
        for (desc, raw) in self.fields() {
            write_bits(&mut bytes, desc.start, desc.width, raw);
        }
        for f in self.layout.fixed {
            write_bits(&mut bytes, f.start, f.width, f.value);
        }
        bytes
    }
}

fn decode(desc: &FieldDesc, raw: u64) -> u64 {
    match desc.kind {
        FieldKind::MinusOne => raw + 1,
        FieldKind::Address { shift } => raw << shift,
        _ => raw,
    }
}

/// Renders one field value the way the dump prints it.
pub struct FieldDisplay<'a> {
    pub desc: &'a FieldDesc,
    pub raw: u64,
}

impl fmt::Display for FieldDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = decode(self.desc, self.raw);
        match self.desc.kind {
            FieldKind::Uint | FieldKind::MinusOne => write!(f, "{value}"),
            FieldKind::Hex | FieldKind::Address { .. } => write!(f, "0x{value:x}"),
            FieldKind::Bool => write!(f, "{}", value != 0),
            FieldKind::Float => write!(f, "{:.6}", f32::from_bits(value as u32)),
            FieldKind::Enum(names) => match names.iter().find(|(v, _)| *v == value) {
                Some((_, name)) => f.write_str(name),
                None => write!(f, "unknown ({value})"),
            },
        }
    }
}

/// One `name: value` line per field.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (desc, raw)) in self.fields().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}: {}", desc.name, FieldDisplay { desc, raw })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static COLORS: &[(u64, &str)] = &[(0, "red"), (1, "green")];

    static TEST: RecordLayout = RecordLayout {
        name: "TEST",
        length: 8,
        fixed: &[fixed(0, 4, 0xA)],
        fields: &[
            field("flag", 4, 1, FieldKind::Bool),
            field("color", 5, 2, FieldKind::Enum(COLORS)),
            field("size", 7, 13, FieldKind::MinusOne),
            field("ptr", 20, 28, FieldKind::Address { shift: 4 }),
            field("tail", 48, 16, FieldKind::Hex),
        ],
    };

    #[test]
    fn bits_straddle_bytes() {
        let mut bytes = [0u8; 4];
        write_bits(&mut bytes, 6, 12, 0xABC);
        assert_eq!(read_bits(&bytes, 6, 12), 0xABC);
        assert_eq!(bytes, [0x00, 0xAF, 0x02, 0x00]);
        write_bits(&mut bytes, 0, 6, 0x3F);
        assert_eq!(read_bits(&bytes, 6, 12), 0xABC);
    }

    #[test]
    fn full_width_fields() {
        let mut bytes = [0u8; 9];
        write_bits(&mut bytes, 4, 64, u64::MAX - 1);
        assert_eq!(read_bits(&bytes, 4, 64), u64::MAX - 1);
        assert_eq!(bytes[0], 0xE0);
    }

    #[test]
    fn pack_writes_fixed_bits_and_values() {
        let bytes = TEST
            .pack(&[
                ("flag", true.into()),
                ("size", 800u32.into()),
                ("ptr", 0x1234_5670u64.into()),
            ])
            .unwrap();
        assert!(TEST.matches_fixed(&bytes));
        assert_eq!(bytes[0] & 0xF, 0xA);

        let rec = TEST.unpack(&bytes).unwrap();
        assert_eq!(rec.get("flag"), Some(1));
        assert_eq!(rec.get("size"), Some(800));
        assert_eq!(rec.raw("size"), Some(799));
        assert_eq!(rec.address("ptr"), Some(0x1234_5670));
        assert_eq!(rec.address("size"), None);
        assert_eq!(rec.get("tail"), Some(0));
    }

    #[test]
    fn pack_rejects_out_of_range_values() {
        assert!(matches!(
            TEST.pack(&[("tail", 0x1_0000u32.into())]),
            Err(PackError::ValueTooWide { field: "tail", width: 16, .. })
        ));
        assert!(matches!(
            TEST.pack(&[("ptr", 0x1001u32.into())]),
            Err(PackError::Misaligned { align: 16, .. })
        ));
        assert!(matches!(
            TEST.pack(&[("size", 0u32.into())]),
            Err(PackError::OutOfRange { .. })
        ));
        assert!(matches!(
            TEST.pack(&[("size", 1.5f32.into())]),
            Err(PackError::TypeMismatch { .. })
        ));
        assert!(matches!(
            TEST.pack(&[("nope", 1u32.into())]),
            Err(PackError::UnknownField { .. })
        ));
    }

    #[test]
    fn unpack_checks_length() {
        assert_eq!(
            TEST.unpack(&[0; 7]),
            Err(PackError::TooShort {
                layout: "TEST",
                needed: 8,
                len: 7
            })
        );
        assert!(!TEST.matches_fixed(&[0xA; 7]));
    }

    #[test]
    fn display_renders_each_kind() {
        let mut rec = TEST.record();
        rec.set("color", 1u32).unwrap().set("ptr", 0x40u32).unwrap();
        rec.set("tail", 0xbeefu32).unwrap();
        assert_eq!(
            rec.to_string(),
            "flag: false\ncolor: green\nsize: 1\nptr: 0x40\ntail: 0xbeef"
        );
        rec.set_raw("color", 3).unwrap();
        assert!(rec.to_string().contains("color: unknown (3)"));
    }
}
