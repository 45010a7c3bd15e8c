use std::collections::HashSet;

use agx_disasm::{disassemble, Disassembly};
use agx_mem::{AddressRegistry, AllocKind, Diagnostic, MemError};
use agx_protocol::layouts::{
    AUX_SHADER, BIND_FRAGMENT_PIPELINE, BIND_PIPELINE, BIND_PIPELINE_PAD, BIND_SAMPLER,
    BIND_TEXTURE, BIND_UNIFORM, DRAW, INDEXED_DRAW, IOGPU_HEADER, LAUNCH, LINKAGE, RECORD,
    SAMPLER, SET_SHADER, STREAM_END, TEXTURE, VIEWPORT,
};
use agx_protocol::{parse_memory_map, MemoryMap, PackError, Record, RecordLayout};
use tracing::{debug, warn};

use crate::pattern::{
    classify, EncoderKind, PipelineKind, ENCODER_PATTERNS, PIPELINE_PATTERNS,
};

/// Deepest nested object decoded; the encoder stream is depth 0.
pub const MAX_NESTING: u32 = 2;

/// Most shader bytes handed to the disassembler.
pub const SHADER_FETCH_LIMIT: u64 = 16384;

/// Bytes visible to a command decoder. Longer than any command; reads past
/// the end of the allocation see zeros.
const WINDOW: usize = 64;

/// Advance after bytes no pattern matches.
const SKIP: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub max_nesting: u32,
    pub shader_limit: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_nesting: MAX_NESTING,
            shader_limit: SHADER_FETCH_LIMIT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Memory(#[from] MemError),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error("failed to decode {what} at 0x{address:x}")]
    Nested {
        what: &'static str,
        address: u64,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    fn context(self, what: &'static str, address: u64) -> Self {
        DecodeError::Nested {
            what,
            address,
            source: Box::new(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item<C> {
    Command { offset: u64, cmd: C },
    /// Bytes no pattern matched; the walker skipped past them.
    Unknown { offset: u64, bytes: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Terminator,
    EndOfAllocation,
}

/// One walked command stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream<C> {
    pub address: u64,
    pub items: Vec<Item<C>>,
    pub end: StreamEnd,
    /// The bytes the walk covered.
    pub raw: Vec<u8>,
}

impl<C> Stream<C> {
    pub fn commands(&self) -> impl Iterator<Item = &C> {
        self.items.iter().filter_map(|item| match item {
            Item::Command { cmd, .. } => Some(cmd),
            Item::Unknown { .. } => None,
        })
    }

    pub fn terminated(&self) -> bool {
        self.end == StreamEnd::Terminator
    }
}

pub type Pipeline = Stream<PipelineCmd>;

/// A pointer to an object decoded at most once per top-level walk.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested<T> {
    Decoded(T),
    /// Already decoded earlier in this walk.
    Revisit(u64),
    TooDeep(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    pub address: u64,
    pub disassembly: Disassembly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EncoderCmd {
    Launch {
        record: Record,
        pipeline: Nested<Pipeline>,
    },
    BindPipeline {
        record: Record,
        pipeline: Nested<Pipeline>,
    },
    Draw(Record),
    IndexedDraw {
        record: Record,
        index_buffer: Diagnostic,
    },
    Record {
        header: Record,
        payload: RecordPayload,
    },
    StreamEnd,
}

/// What an out-of-line record points at.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    Empty,
    /// The data pointer does not resolve to enough mapped bytes.
    Missing(Diagnostic),
    Viewport(Record),
    Linkage(Record),
    BindFragmentPipeline {
        record: Record,
        pipeline: Nested<Pipeline>,
    },
    Unknown(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCmd {
    SetShader {
        record: Record,
        shader: Nested<Shader>,
    },
    AuxShader {
        record: Record,
        shader: Nested<Shader>,
    },
    BindTexture {
        record: Record,
        textures: Result<Vec<Record>, Diagnostic>,
    },
    BindSampler {
        record: Record,
        samplers: Result<Vec<Record>, Diagnostic>,
    },
    BindUniform {
        record: Record,
        data: Result<Vec<u8>, Diagnostic>,
    },
}

enum Step<C> {
    Command(C, usize),
    Terminate,
    Unknown,
}

fn address_of(record: &Record, field: &str) -> u64 {
    record.address(field).unwrap_or(0)
}

/// Walks command streams for one top-level decode.
pub struct Decoder<'r> {
    registry: &'r AddressRegistry,
    options: DecodeOptions,
    visited: HashSet<u64>,
}

impl<'r> Decoder<'r> {
    pub fn new(registry: &'r AddressRegistry, options: DecodeOptions) -> Self {
        Self {
            registry,
            options,
            visited: HashSet::new(),
        }
    }

    pub fn encoder_stream(&mut self, address: u64) -> Result<Stream<EncoderCmd>, DecodeError> {
        self.walk(address, 0, Self::encoder_command)
    }

    pub fn pipeline_stream(&mut self, address: u64) -> Result<Pipeline, DecodeError> {
        self.walk(address, 1, Self::pipeline_command)
    }

    fn walk<C>(
        &mut self,
        address: u64,
        depth: u32,
        mut step: impl FnMut(&mut Self, &[u8], u64, u32) -> Result<Step<C>, DecodeError>,
    ) -> Result<Stream<C>, DecodeError> {
        let registry = self.registry;
        let alloc = registry.find_containing(address).ok_or(MemError::Unmapped {
            address,
            len: WINDOW as u64,
        })?;
        let alloc_end = alloc.gpu_address + alloc.size;
        debug!(address, depth, allocation = %alloc.name, "walking stream");

        let mut items = Vec::new();
        let mut cursor = address;
        let end = loop {
            if cursor >= alloc_end {
                break StreamEnd::EndOfAllocation;
            }
            let available = registry.fetch_up_to(cursor, WINDOW as u64)?;
            let mut window = [0u8; WINDOW];
            window[..available.len()].copy_from_slice(available);

            let offset = cursor - address;
            match step(self, &window, cursor, depth)? {
                Step::Command(cmd, len) => {
                    items.push(Item::Command { offset, cmd });
                    cursor += len as u64;
                }
                Step::Terminate => break StreamEnd::Terminator,
                Step::Unknown => {
                    warn!(address = cursor, "unrecognized command, skipping {SKIP} bytes");
                    let n = available.len().min(SKIP);
                    items.push(Item::Unknown {
                        offset,
                        bytes: available[..n].to_vec(),
                    });
                    cursor += SKIP as u64;
                }
            }
        };

        let covered = cursor.min(alloc_end) - address;
        let raw = registry.fetch(address, covered)?.to_vec();
        Ok(Stream {
            address,
            items,
            end,
            raw,
        })
    }

    fn encoder_command(
        &mut self,
        window: &[u8],
        address: u64,
        depth: u32,
    ) -> Result<Step<EncoderCmd>, DecodeError> {
        let Some(kind) = classify(ENCODER_PATTERNS, window) else {
            return Ok(Step::Unknown);
        };
        debug!(address, ?kind, "encoder command");

        let step = match kind {
            EncoderKind::Launch => {
                let record = LAUNCH.unpack(window)?;
                let pipeline = self.pipeline(address_of(&record, "pipeline"), depth)?;
                Step::Command(EncoderCmd::Launch { record, pipeline }, LAUNCH.length)
            }
            EncoderKind::BindPipeline => {
                let record = BIND_PIPELINE.unpack(window)?;
                let pipeline = self.pipeline(address_of(&record, "pipeline"), depth)?;
                Step::Command(
                    EncoderCmd::BindPipeline { record, pipeline },
                    BIND_PIPELINE.length + BIND_PIPELINE_PAD,
                )
            }
            EncoderKind::Draw => Step::Command(EncoderCmd::Draw(DRAW.unpack(window)?), DRAW.length),
            EncoderKind::IndexedDraw => {
                let record = INDEXED_DRAW.unpack(window)?;
                let len = record.get("index_count").unwrap_or(0)
                    * record.get("index_size").unwrap_or(0);
                // Checked even for zero indices, like the bind commands.
                let index_buffer = self
                    .registry
                    .validate(address_of(&record, "index_buffer"), len);
                if !index_buffer.is_ok() {
                    warn!(address, %index_buffer, "indexed draw");
                }
                Step::Command(
                    EncoderCmd::IndexedDraw {
                        record,
                        index_buffer,
                    },
                    INDEXED_DRAW.length,
                )
            }
            EncoderKind::Record => {
                let header = RECORD.unpack(window)?;
                let size = header.get("size_words").unwrap_or(0) * 4;
                let payload = self.record_payload(address_of(&header, "data"), size, depth)?;
                Step::Command(EncoderCmd::Record { header, payload }, RECORD.length)
            }
            EncoderKind::StreamEnd => Step::Command(EncoderCmd::StreamEnd, STREAM_END.length),
            EncoderKind::Terminator => Step::Terminate,
        };
        Ok(step)
    }

    fn record_payload(
        &mut self,
        data: u64,
        size: u64,
        depth: u32,
    ) -> Result<RecordPayload, DecodeError> {
        if size == 0 {
            return Ok(RecordPayload::Empty);
        }
        let registry = self.registry;
        let diagnostic = registry.validate(data, size);
        if !diagnostic.is_ok() {
            warn!(data, size, %diagnostic, "non-existent record");
            return Ok(RecordPayload::Missing(diagnostic));
        }
        let bytes = registry.fetch(data, size)?;

        let payload = if VIEWPORT.matches_fixed(bytes) {
            RecordPayload::Viewport(VIEWPORT.unpack(bytes)?)
        } else if LINKAGE.matches_fixed(bytes) {
            RecordPayload::Linkage(LINKAGE.unpack(bytes)?)
        } else if BIND_FRAGMENT_PIPELINE.matches_fixed(bytes) {
            let record = BIND_FRAGMENT_PIPELINE.unpack(bytes)?;
            let pipeline = self.pipeline(address_of(&record, "pipeline"), depth)?;
            RecordPayload::BindFragmentPipeline { record, pipeline }
        } else {
            debug!(data, size, "unrecognized record payload");
            RecordPayload::Unknown(bytes.to_vec())
        };
        Ok(payload)
    }

    fn pipeline_command(
        &mut self,
        window: &[u8],
        address: u64,
        depth: u32,
    ) -> Result<Step<PipelineCmd>, DecodeError> {
        let Some(kind) = classify(PIPELINE_PATTERNS, window) else {
            return Ok(Step::Unknown);
        };
        debug!(address, ?kind, "pipeline command");

        let step = match kind {
            PipelineKind::SetShader => {
                let record = SET_SHADER.unpack(window)?;
                let shader = self.shader(address_of(&record, "code"), depth)?;
                Step::Command(PipelineCmd::SetShader { record, shader }, SET_SHADER.length)
            }
            PipelineKind::AuxShader => {
                let record = AUX_SHADER.unpack(window)?;
                let shader = self.shader(address_of(&record, "code"), depth)?;
                Step::Command(PipelineCmd::AuxShader { record, shader }, AUX_SHADER.length)
            }
            PipelineKind::BindTexture => {
                let record = BIND_TEXTURE.unpack(window)?;
                let textures = self.descriptors(&TEXTURE, &record)?;
                Step::Command(
                    PipelineCmd::BindTexture { record, textures },
                    BIND_TEXTURE.length,
                )
            }
            PipelineKind::BindSampler => {
                let record = BIND_SAMPLER.unpack(window)?;
                let samplers = self.descriptors(&SAMPLER, &record)?;
                Step::Command(
                    PipelineCmd::BindSampler { record, samplers },
                    BIND_SAMPLER.length,
                )
            }
            PipelineKind::BindUniform => {
                let record = BIND_UNIFORM.unpack(window)?;
                let len = record.get("size_halfs").unwrap_or(0) * 2;
                let data = self.bytes_at(address_of(&record, "buffer"), len)?;
                Step::Command(PipelineCmd::BindUniform { record, data }, BIND_UNIFORM.length)
            }
            PipelineKind::Terminator => Step::Terminate,
        };
        Ok(step)
    }

    /// Reads `len` bytes if they are mapped; otherwise reports why not.
    /// The pointer is checked even when `len` is zero, so an empty bind at
    /// address 0 reports a null pointer.
    fn bytes_at(&self, address: u64, len: u64) -> Result<Result<Vec<u8>, Diagnostic>, DecodeError> {
        let diagnostic = self.registry.validate(address, len);
        if !diagnostic.is_ok() {
            warn!(address, len, %diagnostic, "bound buffer");
            return Ok(Err(diagnostic));
        }
        Ok(Ok(self.registry.fetch(address, len)?.to_vec()))
    }

    fn descriptors(
        &self,
        layout: &'static RecordLayout,
        bind: &Record,
    ) -> Result<Result<Vec<Record>, Diagnostic>, DecodeError> {
        let count = bind.get("count").unwrap_or(0);
        let bytes = match self.bytes_at(address_of(bind, "buffer"), count * layout.length as u64)? {
            Ok(bytes) => bytes,
            Err(diagnostic) => return Ok(Err(diagnostic)),
        };
        let records = bytes
            .chunks_exact(layout.length)
            .map(|chunk| layout.unpack(chunk))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Ok(records))
    }

    /// Checks nesting and revisits before descending into `address`.
    fn enter<T>(&mut self, what: &'static str, address: u64, depth: u32) -> Option<Nested<T>> {
        if depth > self.options.max_nesting {
            warn!(address, depth, "{what} nested too deeply");
            return Some(Nested::TooDeep(address));
        }
        if !self.visited.insert(address) {
            debug!(address, "{what} already decoded");
            return Some(Nested::Revisit(address));
        }
        None
    }

    fn pipeline(&mut self, address: u64, depth: u32) -> Result<Nested<Pipeline>, DecodeError> {
        let depth = depth + 1;
        if let Some(skip) = self.enter("pipeline", address, depth) {
            return Ok(skip);
        }
        let stream = self
            .walk(address, depth, Self::pipeline_command)
            .map_err(|e| e.context("pipeline", address))?;
        Ok(Nested::Decoded(stream))
    }

    fn shader(&mut self, address: u64, depth: u32) -> Result<Nested<Shader>, DecodeError> {
        let depth = depth + 1;
        if let Some(skip) = self.enter("shader", address, depth) {
            return Ok(skip);
        }
        let code = self
            .registry
            .fetch_up_to(address, self.options.shader_limit)
            .map_err(|e| DecodeError::from(e).context("shader", address))?;
        let disassembly = disassemble(code);
        if !disassembly.stopped {
            warn!(address, "shader has no stop instruction");
        }
        Ok(Nested::Decoded(Shader {
            address,
            disassembly,
        }))
    }
}

/// Walks the encoder stream at `address` and restores the registry's
/// writable state afterwards.
pub fn decode_encoder(
    registry: &AddressRegistry,
    address: u64,
    options: DecodeOptions,
) -> Result<Stream<EncoderCmd>, DecodeError> {
    let result = Decoder::new(registry, options).encoder_stream(address);
    registry.restore_writable();
    result
}

/// A decoded command buffer submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub command_buffer: u32,
    pub memory_map: MemoryMap,
    /// Allocation indices the memory map lists that are not registered.
    pub unlisted: Vec<u32>,
    pub header: Record,
    pub encoder: Stream<EncoderCmd>,
    /// Allocations read during the decode.
    pub touched: usize,
}

/// Decodes the command buffer with handle `cmdbuf` and its memory map.
pub fn decode_submission(
    registry: &AddressRegistry,
    cmdbuf: u32,
    map: u32,
    options: DecodeOptions,
) -> Result<Submission, DecodeError> {
    let result = submission(registry, cmdbuf, map, options);
    let touched = registry.restore_writable();
    let mut submission = result?;
    submission.touched = touched;
    Ok(submission)
}

fn submission(
    registry: &AddressRegistry,
    cmdbuf: u32,
    map: u32,
    options: DecodeOptions,
) -> Result<Submission, DecodeError> {
    let memory_map = parse_memory_map(registry.fetch_handle(map, AllocKind::MemoryMap)?)?;
    let mut unlisted = Vec::new();
    for entry in &memory_map.entries {
        if !registry.mark_mapped(entry.index) {
            warn!(index = entry.index, "memory map lists an unknown allocation");
            unlisted.push(entry.index);
        }
    }
    if !memory_map.sentinel_found {
        warn!(map, "memory map has no sentinel entry");
    }

    let header = IOGPU_HEADER.unpack(registry.fetch_handle(cmdbuf, AllocKind::CommandBuffer)?)?;
    let encoder_address = address_of(&header, "encoder");
    debug!(cmdbuf, encoder = encoder_address, "decoding submission");

    let encoder = Decoder::new(registry, options)
        .encoder_stream(encoder_address)
        .map_err(|e| e.context("encoder stream", encoder_address))?;

    Ok(Submission {
        command_buffer: cmdbuf,
        memory_map,
        unlisted,
        header,
        encoder,
        touched: 0,
    })
}
