//! GPU virtual address bookkeeping for the AGX decoder.
//!
//! Every buffer the decoder may dereference is registered here together with
//! its host-side bytes. Decoders resolve GPU pointers found inside command
//! records through [`AddressRegistry::fetch`], which also marks the backing
//! allocation read-only for the duration of a decode pass.

#![forbid(unsafe_code)]

mod registry;

pub use registry::{AddressRegistry, AllocKind, Allocation, Diagnostic, MemError};
