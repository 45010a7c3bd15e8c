//! AGX command and descriptor formats.
//!
//! [`pack`] is the generic bit-field codec; [`layouts`] declares every
//! structure seen in captured command buffers. The writers assemble
//! encoder streams, pipeline streams and memory maps from those layouts.

#![forbid(unsafe_code)]

pub mod buffer_arena;
pub mod cmd_writer;
pub mod layouts;
pub mod map;
pub mod pack;

pub use buffer_arena::{BumpArena, UPLOAD_ALIGNMENT};
pub use cmd_writer::{
    make_ptr40, render_target, EncoderWriter, PipelineWriter, FRAMEBUFFER_ALIGNMENT,
};
pub use map::{parse_memory_map, MapBuilder, MapEntry, MemoryMap};
pub use pack::{
    FieldDesc, FieldDisplay, FieldKind, FieldValue, FixedBits, PackError, Record, RecordLayout,
};
