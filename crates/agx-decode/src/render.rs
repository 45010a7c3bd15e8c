//! Text form of decoded streams.

use core::fmt::{self, Display, Write};

use agx_mem::{AddressRegistry, AllocKind, Diagnostic};
use agx_protocol::{FieldDisplay, FieldKind, Record};

use crate::hexdump::hexdump;
use crate::walk::{
    EncoderCmd, Item, Nested, Pipeline, PipelineCmd, RecordPayload, Shader, Stream, StreamEnd,
    Submission,
};

struct Printer<'a> {
    out: &'a mut dyn Write,
    registry: &'a AddressRegistry,
    verbose: bool,
    indent: usize,
}

impl Printer<'_> {
    fn line(&mut self, text: impl Display) -> fmt::Result {
        writeln!(self.out, "{:1$}{text}", "", self.indent * 2)
    }

    fn nested(&mut self, body: impl FnOnce(&mut Self) -> fmt::Result) -> fmt::Result {
        self.indent += 1;
        let result = body(self);
        self.indent -= 1;
        result
    }

    fn describe(&self, address: u64) -> String {
        self.registry.describe(address)
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) -> fmt::Result {
        self.line(format_args!("// {diagnostic}"))
    }

    fn hexdump(&mut self, bytes: &[u8]) -> fmt::Result {
        write!(self.out, "{}", hexdump(bytes).indent(self.indent * 2))
    }

    fn record(&mut self, title: &str, record: &Record) -> fmt::Result {
        self.line(format_args!("{title}:"))?;
        self.nested(|p| {
            for (desc, raw) in record.fields() {
                let value = FieldDisplay { desc, raw };
                match (desc.kind, record.address(desc.name)) {
                    (FieldKind::Address { .. }, Some(a)) if a != 0 => {
                        let target = p.describe(a);
                        p.line(format_args!("{}: {value} ({target})", desc.name))?
                    }
                    _ => p.line(format_args!("{}: {value}", desc.name))?,
                }
            }
            Ok(())
        })
    }

    fn stream<C>(
        &mut self,
        title: &str,
        stream: &Stream<C>,
        mut command: impl FnMut(&mut Self, &C) -> fmt::Result,
    ) -> fmt::Result {
        let at = self.describe(stream.address);
        self.line(format_args!("{title} at {at}:"))?;
        self.nested(|p| {
            if p.verbose {
                p.hexdump(&stream.raw)?;
            }
            for item in &stream.items {
                match item {
                    Item::Command { cmd, .. } => command(p, cmd)?,
                    Item::Unknown { offset, bytes } => {
                        let hex: Vec<_> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                        p.line(format_args!(
                            "// XXX: unknown command at offset 0x{offset:x}: {}",
                            hex.join(" ")
                        ))?
                    }
                }
            }
            if stream.end == StreamEnd::EndOfAllocation {
                p.line("// XXX: stream runs to the end of its allocation")?;
            }
            Ok(())
        })
    }

    fn skipped(&mut self, what: &str, address: u64, reason: &str) -> fmt::Result {
        let at = self.describe(address);
        self.line(format_args!("{what} at {at}: {reason}"))
    }

    fn pipeline(&mut self, pipeline: &Nested<Pipeline>) -> fmt::Result {
        match pipeline {
            Nested::Decoded(stream) => self.stream("Pipeline", stream, Self::pipeline_command),
            Nested::Revisit(a) => self.skipped("Pipeline", *a, "see above"),
            Nested::TooDeep(a) => self.skipped("// XXX: pipeline", *a, "nested too deeply"),
        }
    }

    fn shader(&mut self, shader: &Nested<Shader>) -> fmt::Result {
        let shader = match shader {
            Nested::Decoded(s) => s,
            Nested::Revisit(a) => return self.skipped("Shader", *a, "see above"),
            Nested::TooDeep(a) => return self.skipped("// XXX: shader", *a, "nested too deeply"),
        };
        let at = self.describe(shader.address);
        self.line(format_args!("Shader at {at}:"))?;
        let listing = shader.disassembly.listing(self.verbose).to_string();
        self.nested(|p| listing.lines().try_for_each(|l| p.line(l)))
    }

    fn descriptors(&mut self, title: &str, list: &Result<Vec<Record>, Diagnostic>) -> fmt::Result {
        match list {
            Ok(records) => records
                .iter()
                .enumerate()
                .try_for_each(|(i, r)| self.record(&format!("{title} {i}"), r)),
            Err(diagnostic) => self.diagnostic(diagnostic),
        }
    }

    fn pipeline_command(&mut self, cmd: &PipelineCmd) -> fmt::Result {
        match cmd {
            PipelineCmd::SetShader { record, shader } => {
                self.record("SetShader", record)?;
                self.nested(|p| p.shader(shader))
            }
            PipelineCmd::AuxShader { record, shader } => {
                self.record("AuxShader", record)?;
                self.nested(|p| p.shader(shader))
            }
            PipelineCmd::BindTexture { record, textures } => {
                self.record("BindTexture", record)?;
                self.nested(|p| p.descriptors("Texture", textures))
            }
            PipelineCmd::BindSampler { record, samplers } => {
                self.record("BindSampler", record)?;
                self.nested(|p| p.descriptors("Sampler", samplers))
            }
            PipelineCmd::BindUniform { record, data } => {
                self.record("BindUniform", record)?;
                self.nested(|p| match data {
                    Ok(bytes) => p.hexdump(bytes),
                    Err(diagnostic) => p.diagnostic(diagnostic),
                })
            }
        }
    }

    fn encoder_command(&mut self, cmd: &EncoderCmd) -> fmt::Result {
        match cmd {
            EncoderCmd::Launch { record, pipeline } => {
                self.record("Launch", record)?;
                self.nested(|p| p.pipeline(pipeline))
            }
            EncoderCmd::BindPipeline { record, pipeline } => {
                self.record("BindPipeline", record)?;
                self.nested(|p| p.pipeline(pipeline))
            }
            EncoderCmd::Draw(record) => self.record("Draw", record),
            EncoderCmd::IndexedDraw {
                record,
                index_buffer,
            } => {
                self.record("IndexedDraw", record)?;
                if index_buffer.is_ok() {
                    return Ok(());
                }
                self.nested(|p| p.diagnostic(index_buffer))
            }
            EncoderCmd::Record { header, payload } => {
                let words = header.get("size_words").unwrap_or(0);
                let at = self.describe(header.address("data").unwrap_or(0));
                self.line(format_args!("Record ({words} words at {at}):"))?;
                self.nested(|p| p.payload(payload))
            }
            EncoderCmd::StreamEnd => self.line("StreamEnd"),
        }
    }

    fn payload(&mut self, payload: &RecordPayload) -> fmt::Result {
        match payload {
            RecordPayload::Empty => self.line("(empty)"),
            RecordPayload::Missing(diagnostic) => {
                self.line("// non-existent record")?;
                self.diagnostic(diagnostic)
            }
            RecordPayload::Viewport(record) => self.record("Viewport", record),
            RecordPayload::Linkage(record) => self.record("Linkage", record),
            RecordPayload::BindFragmentPipeline { record, pipeline } => {
                self.record("BindFragmentPipeline", record)?;
                self.nested(|p| p.pipeline(pipeline))
            }
            RecordPayload::Unknown(bytes) => {
                self.line("// XXX: unknown record")?;
                self.hexdump(bytes)
            }
        }
    }

    fn submission(&mut self, submission: &Submission) -> fmt::Result {
        let map = &submission.memory_map;
        self.record("Memory map", &map.header)?;
        let registry = self.registry;
        self.nested(|p| {
            for entry in &map.entries {
                let name = registry
                    .find_handle(entry.index, AllocKind::Regular)
                    .map(|a| a.name.as_str())
                    .unwrap_or("?");
                p.line(format_args!(
                    "slot {}: allocation {} ({name})",
                    entry.slot, entry.index
                ))?;
            }
            for index in &submission.unlisted {
                p.line(format_args!(
                    "// XXX: allocation {index} is listed but not registered"
                ))?;
            }
            if !map.sentinel_found {
                p.line("// XXX: memory map has no sentinel entry")?;
            }
            Ok(())
        })?;
        self.record("IOGPU header", &submission.header)?;
        self.stream("Encoder", &submission.encoder, Self::encoder_command)
    }
}

enum Subject<'a> {
    Submission(&'a Submission),
    Encoder(&'a Stream<EncoderCmd>),
}

/// Displays a decoded submission or stream with addresses resolved against
/// the registry it was decoded from.
pub struct Trace<'a> {
    subject: Subject<'a>,
    registry: &'a AddressRegistry,
    verbose: bool,
}

impl<'a> Trace<'a> {
    pub fn submission(
        submission: &'a Submission,
        registry: &'a AddressRegistry,
        verbose: bool,
    ) -> Self {
        Self {
            subject: Subject::Submission(submission),
            registry,
            verbose,
        }
    }

    pub fn encoder(
        stream: &'a Stream<EncoderCmd>,
        registry: &'a AddressRegistry,
        verbose: bool,
    ) -> Self {
        Self {
            subject: Subject::Encoder(stream),
            registry,
            verbose,
        }
    }
}

impl Display for Trace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer {
            out: f,
            registry: self.registry,
            verbose: self.verbose,
            indent: 0,
        };
        match self.subject {
            Subject::Submission(s) => printer.submission(s),
            Subject::Encoder(s) => printer.stream("Encoder", s, Printer::encoder_command),
        }
    }
}
