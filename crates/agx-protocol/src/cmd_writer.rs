//! Command stream builders for hand-assembled submissions.
//!
//! Used by tests and tooling that need canonical encoder and pipeline
//! streams. Every command goes through its [`RecordLayout`] so the fixed tag
//! bits always match what the decoder looks for.

use crate::layouts::{
    Primitive, AUX_SHADER, BIND_PIPELINE, BIND_PIPELINE_PAD, BIND_SAMPLER, BIND_TEXTURE,
    BIND_UNIFORM, DRAW, INDEXED_DRAW, LAUNCH, RECORD, RENDER_TARGET, SET_SHADER, STREAM_END,
};
use crate::pack::{FieldValue, PackError, Record, RecordLayout};

/// Packs `ptr` into the low 40 bits above a 3-byte tag, the form shared by
/// out-of-line records and resource binds.
pub fn make_ptr40(tag0: u8, tag1: u8, tag2: u8, ptr: u64) -> Result<u64, PackError> {
    if ptr >> 40 != 0 {
        return Err(PackError::ValueTooWide {
            layout: "PTR40",
            field: "ptr",
            value: ptr,
            width: 40,
        });
    }
    Ok(u64::from(tag0) | u64::from(tag1) << 8 | u64::from(tag2) << 16 | ptr << 24)
}

/// Framebuffer alignment the hardware needs. At 64 bytes the first 0x40
/// bytes are skipped.
pub const FRAMEBUFFER_ALIGNMENT: u64 = 128;

/// Render target descriptor for a `width × height` framebuffer, bound to a
/// fragment pipeline with [`PipelineWriter::bind_texture`]. The unknown
/// words take the values seen in captures.
pub fn render_target(width: u32, height: u32, framebuffer: u64) -> Result<Vec<u8>, PackError> {
    if framebuffer % FRAMEBUFFER_ALIGNMENT != 0 {
        return Err(PackError::Misaligned {
            layout: RENDER_TARGET.name,
            field: "address",
            value: framebuffer,
            align: FRAMEBUFFER_ALIGNMENT,
        });
    }
    RENDER_TARGET.pack(&[
        ("unknown_0", 0x00C6_0A22u32.into()),
        ("width", width.into()),
        ("height", height.into()),
        ("address", framebuffer.into()),
        ("unknown_112", 0x1000u32.into()),
        ("unknown_192", 0xFFFF_FFFF_0000_0000u64.into()),
    ])
}

#[derive(Debug, Default, Clone)]
struct StreamBuf {
    buf: Vec<u8>,
}

impl StreamBuf {
    fn append_raw(&mut self, bytes: &[u8]) -> usize {
        let offset = self.buf.len();
        self.buf.extend_from_slice(bytes);
        offset
    }

    fn append(
        &mut self,
        layout: &'static RecordLayout,
        values: &[(&str, FieldValue)],
    ) -> Result<usize, PackError> {
        let bytes = layout.pack(values)?;
        Ok(self.append_raw(&bytes))
    }

    /// All-zero word that ends a stream.
    fn terminate(&mut self) {
        self.append_raw(&[0; 8]);
    }
}

/// Top-level encoder stream builder.
#[derive(Debug, Default, Clone)]
pub struct EncoderWriter {
    stream: StreamBuf,
}

impl EncoderWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.stream.buf
    }

    pub fn len(&self) -> usize {
        self.stream.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.stream.buf
    }

    /// Appends an already built command, e.g. one with unknown fields set.
    pub fn push_record(&mut self, record: &Record) -> usize {
        self.stream.append_raw(&record.to_bytes())
    }

    pub fn launch(
        &mut self,
        pipeline: u32,
        group_count: [u32; 3],
        local_size: [u32; 3],
    ) -> Result<usize, PackError> {
        self.stream.append(
            &LAUNCH,
            &[
                ("pipeline", pipeline.into()),
                ("group_count_x", group_count[0].into()),
                ("group_count_y", group_count[1].into()),
                ("group_count_z", group_count[2].into()),
                ("local_size_x", local_size[0].into()),
                ("local_size_y", local_size[1].into()),
                ("local_size_z", local_size[2].into()),
            ],
        )
    }

    /// Binds the vertex pipeline at `pipeline` and writes the pad byte that
    /// follows it.
    pub fn bind_pipeline(&mut self, pipeline: u32, outputs: u8) -> Result<usize, PackError> {
        let offset = self.stream.append(
            &BIND_PIPELINE,
            &[
                ("unknown_32", 0x1002u32.into()),
                ("pipeline", pipeline.into()),
                ("output_count_1", outputs.into()),
                ("output_count_2", outputs.into()),
            ],
        )?;
        self.stream.append_raw(&[0; BIND_PIPELINE_PAD]);
        Ok(offset)
    }

    /// Out-of-line payload of `size_words` words at `data`.
    pub fn record(&mut self, size_words: u8, data: u64) -> Result<usize, PackError> {
        self.stream.append(
            &RECORD,
            &[("size_words", size_words.into()), ("data", data.into())],
        )
    }

    pub fn draw(
        &mut self,
        primitive: Primitive,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
    ) -> Result<usize, PackError> {
        self.stream.append(
            &DRAW,
            &[
                ("primitive", (primitive as u8).into()),
                ("vertex_start", vertex_start.into()),
                ("vertex_count", vertex_count.into()),
                ("instance_count", instance_count.into()),
            ],
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn indexed_draw(
        &mut self,
        primitive: Primitive,
        index_buffer: u64,
        index_size: u8,
        first_index: u32,
        index_count: u32,
        instance_count: u32,
        base_vertex: u32,
    ) -> Result<usize, PackError> {
        self.stream.append(
            &INDEXED_DRAW,
            &[
                ("primitive", (primitive as u8).into()),
                ("index_buffer", index_buffer.into()),
                ("index_size", index_size.into()),
                ("first_index", first_index.into()),
                ("index_count", index_count.into()),
                ("instance_count", instance_count.into()),
                ("base_vertex", base_vertex.into()),
            ],
        )
    }

    /// Explicit end-of-stream command.
    pub fn stream_end(&mut self) -> usize {
        self.push_record(&STREAM_END.record())
    }

    /// All-zero terminator word.
    pub fn terminate(&mut self) {
        self.stream.terminate();
    }
}

/// Builder for a pipeline object's state stream.
#[derive(Debug, Default, Clone)]
pub struct PipelineWriter {
    stream: StreamBuf,
}

impl PipelineWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.stream.buf
    }

    pub fn len(&self) -> usize {
        self.stream.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.buf.is_empty()
    }

    /// Terminates the stream and returns its bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.stream.terminate();
        self.stream.buf
    }

    pub fn push_record(&mut self, record: &Record) -> usize {
        self.stream.append_raw(&record.to_bytes())
    }

    /// Points the stage at shader code. The unknown words take the values
    /// seen with vertex shaders.
    pub fn set_shader(&mut self, code: u32) -> Result<usize, PackError> {
        self.stream.append(
            &SET_SHADER,
            &[
                ("unknown_8", 0x90u32.into()),
                ("unknown_32", 0x80du32.into()),
                ("code", code.into()),
                ("unknown_80", 0x28du32.into()),
                ("unknown_96", 0x0038_0100u32.into()),
            ],
        )
    }

    pub fn aux_shader(&mut self, code: u32) -> Result<usize, PackError> {
        self.stream.append(&AUX_SHADER, &[("code", code.into())])
    }

    /// Binds `count` texture descriptors starting at slot `start`.
    pub fn bind_texture(&mut self, start: u8, count: u8, buffer: u64) -> Result<usize, PackError> {
        self.stream.append(
            &BIND_TEXTURE,
            &[
                ("start", start.into()),
                ("count", count.into()),
                ("buffer", buffer.into()),
            ],
        )
    }

    pub fn bind_sampler(&mut self, start: u8, count: u8, buffer: u64) -> Result<usize, PackError> {
        self.stream.append(
            &BIND_SAMPLER,
            &[
                ("start", start.into()),
                ("count", count.into()),
                ("buffer", buffer.into()),
            ],
        )
    }

    pub fn bind_uniform(
        &mut self,
        start_halfs: u8,
        size_halfs: u8,
        buffer: u64,
    ) -> Result<usize, PackError> {
        self.stream.append(
            &BIND_UNIFORM,
            &[
                ("start_halfs", start_halfs.into()),
                ("size_halfs", size_halfs.into()),
                ("buffer", buffer.into()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ptr40_layout() {
        assert_eq!(
            make_ptr40(0x1d, 0x00, 0x80, 0x12_3456_7890).unwrap(),
            0x12_3456_7890_80_00_1d
        );
        assert!(make_ptr40(0, 0, 0, 1 << 40).is_err());
    }

    #[test]
    fn record_matches_ptr40() {
        let mut w = EncoderWriter::new();
        w.record(5, 0x1_0000_4000).unwrap();
        let word = u64::from_le_bytes(w.as_bytes().try_into().unwrap());
        assert_eq!(word, make_ptr40(5, 0, 0, 0x1_0000_4000).unwrap());
    }

    #[test]
    fn bind_pipeline_is_followed_by_pad_byte() {
        let mut w = EncoderWriter::new();
        assert_eq!(w.bind_pipeline(0x4000_0000, 5).unwrap(), 0);
        assert_eq!(w.len(), 17);
        assert_eq!(&w.as_bytes()[..4], &[0x2e, 0x00, 0x00, 0x40]);
        assert_eq!(&w.as_bytes()[4..8], &[0x02, 0x10, 0x00, 0x00]);
        assert_eq!(&w.as_bytes()[12..14], &[0x05, 0x05]);

        // The next command starts unaligned.
        assert_eq!(w.draw(Primitive::Triangles, 0, 3, 1).unwrap(), 17);
    }

    #[test]
    fn pipeline_stream_is_zero_terminated() {
        let mut p = PipelineWriter::new();
        p.set_shader(0x4000_0100).unwrap();
        p.aux_shader(0x4000_0200).unwrap();
        p.bind_uniform(0, 4, 0x4000_0300).unwrap();
        let bytes = p.finish();
        assert_eq!(bytes.len(), 16 + 8 + 8 + 8);
        assert_eq!(bytes[0], 0x4d);
        assert_eq!(&bytes[16..18], &[0x80, 0xc0]);
        assert_eq!(bytes[24], 0x1d);
        assert!(bytes[32..].iter().all(|&b| b == 0));
    }

    #[test]
    fn render_target_places_size_and_framebuffer() {
        let bytes = render_target(800, 600, 0x1_0000_0080).unwrap();
        assert_eq!(bytes.len(), 56);
        let rt = RENDER_TARGET.unpack(&bytes).unwrap();
        assert_eq!(rt.get("width"), Some(800));
        assert_eq!(rt.get("height"), Some(600));
        assert_eq!(rt.address("address"), Some(0x1_0000_0080));
        assert_eq!(&bytes[..3], &[0x22, 0x0a, 0xc6]);
        assert_eq!(&bytes[28..32], &[0xff; 4]);

        assert!(matches!(
            render_target(800, 600, 0x1_0000_0040),
            Err(PackError::Misaligned { align: 128, .. })
        ));
        assert!(matches!(
            render_target(0, 600, 0x1_0000_0080),
            Err(PackError::OutOfRange { field: "width", .. })
        ));
    }

    #[test]
    fn oversized_values_are_rejected() {
        let mut p = PipelineWriter::new();
        assert!(matches!(
            p.bind_texture(0, 16, 0),
            Err(PackError::ValueTooWide { field: "count", .. })
        ));
        assert!(p.is_empty());
    }
}
