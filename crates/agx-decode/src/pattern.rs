//! Byte-prefix tables that classify the command at a stream cursor.

use PatternByte::{Any, Exact};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternByte {
    Any,
    Exact(u8),
}

/// A positional byte prefix, optionally requiring the first
/// `not_all_zero` bytes to contain a set bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPattern {
    pub prefix: &'static [PatternByte],
    pub not_all_zero: usize,
}

impl HeaderPattern {
    pub const fn new(prefix: &'static [PatternByte]) -> Self {
        Self {
            prefix,
            not_all_zero: 0,
        }
    }

    pub fn matches(&self, bytes: &[u8]) -> bool {
        if bytes.len() < self.prefix.len() || bytes.len() < self.not_all_zero {
            return false;
        }
        let prefix_ok = self.prefix.iter().zip(bytes).all(|(p, &b)| match p {
            Any => true,
            Exact(v) => *v == b,
        });
        prefix_ok && (self.not_all_zero == 0 || bytes[..self.not_all_zero].iter().any(|&b| b != 0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Launch,
    BindPipeline,
    Draw,
    IndexedDraw,
    Record,
    StreamEnd,
    Terminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    SetShader,
    AuxShader,
    BindTexture,
    BindSampler,
    BindUniform,
    Terminator,
}

const TERMINATOR: HeaderPattern = HeaderPattern::new(&[Exact(0), Exact(0), Exact(0), Exact(0)]);

/// Encoder commands in match priority order.
pub static ENCODER_PATTERNS: &[(HeaderPattern, EncoderKind)] = &[
    (
        HeaderPattern::new(&[Exact(0x02), Exact(0x10), Exact(0x00), Exact(0x00)]),
        EncoderKind::Launch,
    ),
    (
        HeaderPattern::new(&[Exact(0x2E), Exact(0x00), Exact(0x00), Exact(0x40)]),
        EncoderKind::BindPipeline,
    ),
    (
        HeaderPattern::new(&[Any, Exact(0xC0), Exact(0x61)]),
        EncoderKind::Draw,
    ),
    (
        HeaderPattern::new(&[Any, Exact(0xC0), Exact(0x65)]),
        EncoderKind::IndexedDraw,
    ),
    // Zero-size records are legal, so only an all-zero word is excluded.
    (
        HeaderPattern {
            prefix: &[Any, Exact(0x00), Exact(0x00)],
            not_all_zero: 8,
        },
        EncoderKind::Record,
    ),
    (
        HeaderPattern::new(&[Exact(0x00), Exact(0x00), Exact(0xC0), Exact(0x00)]),
        EncoderKind::StreamEnd,
    ),
    (TERMINATOR, EncoderKind::Terminator),
];

/// Pipeline state commands in match priority order.
pub static PIPELINE_PATTERNS: &[(HeaderPattern, PipelineKind)] = &[
    (HeaderPattern::new(&[Exact(0x4D)]), PipelineKind::SetShader),
    (
        HeaderPattern::new(&[Exact(0x80), Exact(0xC0)]),
        PipelineKind::AuxShader,
    ),
    (HeaderPattern::new(&[Exact(0xDD)]), PipelineKind::BindTexture),
    (HeaderPattern::new(&[Exact(0x9D)]), PipelineKind::BindSampler),
    (HeaderPattern::new(&[Exact(0x1D)]), PipelineKind::BindUniform),
    (TERMINATOR, PipelineKind::Terminator),
];

/// First matching kind, if any.
pub fn classify<K: Copy>(table: &[(HeaderPattern, K)], bytes: &[u8]) -> Option<K> {
    table
        .iter()
        .find(|(pattern, _)| pattern.matches(bytes))
        .map(|(_, kind)| *kind)
}
