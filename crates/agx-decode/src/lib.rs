//! Decoder for captured AGX command buffer submissions.
//!
//! A submission is a command buffer, whose header points at the encoder
//! stream, plus a memory map listing the allocations it uses. The walker
//! classifies each command by its leading bytes, follows pointers into
//! pipeline objects and shader code through an [`AddressRegistry`], and
//! builds a [`Submission`] tree. [`Trace`] renders the tree as text.
//!
//! [`AddressRegistry`]: agx_mem::AddressRegistry

#![forbid(unsafe_code)]

mod dump;
mod hexdump;
pub mod pattern;
mod render;
mod walk;

pub use dump::{DumpConfig, DumpSink, DumpTarget, DEFAULT_DUMP_BASE};
pub use hexdump::{hexdump, HexDump};
pub use render::Trace;
pub use walk::{
    decode_encoder, decode_submission, DecodeError, DecodeOptions, Decoder, EncoderCmd, Item,
    Nested, Pipeline, PipelineCmd, RecordPayload, Shader, Stream, StreamEnd, Submission,
    MAX_NESTING, SHADER_FETCH_LIMIT,
};
