//! Descriptor and command layouts observed in captured driver output.
//!
//! Fields whose meaning is not known are named `unknown_<bit>` and carried
//! through as hex.

use crate::pack::{field, fixed, FieldKind::*, RecordLayout};

/// Primitive topology used by draw commands.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Points = 0,
    Lines = 1,
    LineStrip = 3,
    LineLoop = 5,
    Triangles = 6,
    TriangleStrip = 9,
    TriangleFan = 10,
    Quads = 14,
    QuadStrip = 15,
}

pub static PRIMITIVES: &[(u64, &str)] = &[
    (0, "points"),
    (1, "lines"),
    (3, "line_strip"),
    (5, "line_loop"),
    (6, "triangles"),
    (9, "triangle_strip"),
    (10, "triangle_fan"),
    (14, "quads"),
    (15, "quad_strip"),
];

pub static DIMENSIONS: &[(u64, &str)] = &[
    (0, "1d"),
    (1, "1d_array"),
    (2, "2d"),
    (3, "2d_array"),
    (4, "2d_ms"),
    (5, "3d"),
    (6, "cube"),
    (7, "cube_array"),
];

pub static TEXTURE_LAYOUTS: &[(u64, &str)] = &[(0, "linear"), (3, "tiled_64x64")];

pub static TEXTURE_TYPES: &[(u64, &str)] = &[
    (0, "unorm"),
    (1, "snorm"),
    (2, "uint"),
    (3, "sint"),
    (4, "float"),
];

pub static SWIZZLES: &[(u64, &str)] = &[
    (0, "r"),
    (1, "g"),
    (2, "b"),
    (3, "a"),
    (4, "0"),
    (5, "1"),
];

pub static MIP_FILTERS: &[(u64, &str)] = &[(0, "none"), (1, "nearest"), (2, "linear")];

pub static WRAP_MODES: &[(u64, &str)] = &[
    (0, "repeat"),
    (1, "mirrored_repeat"),
    (2, "clamp_to_edge"),
    (3, "clamp_to_border"),
    (4, "mirrored_clamp_to_edge"),
];

/// Command buffer header. `encoder` points at the first encoder command.
pub static IOGPU_HEADER: RecordLayout = RecordLayout {
    name: "IOGPU_HEADER",
    length: 64,
    fixed: &[],
    fields: &[
        field("unknown_0", 0, 32, Hex),
        field("total_size", 32, 32, Uint),
        field("unknown_64", 64, 32, Hex),
        field("unknown_256", 256, 32, Hex),
        field("unknown_288", 288, 32, Hex),
        field("unknown_320", 320, 32, Hex),
        field("unknown_352", 352, 32, Hex),
        field("unknown_384", 384, 32, Hex),
        field("unknown_416", 416, 32, Hex),
        field("encoder", 448, 64, Address { shift: 0 }),
    ],
};

/// Compute dispatch.
pub static LAUNCH: RecordLayout = RecordLayout {
    name: "LAUNCH",
    length: 36,
    fixed: &[fixed(0, 32, 0x0000_1002)],
    fields: &[
        field("pipeline", 32, 32, Address { shift: 0 }),
        field("unknown_64", 64, 32, Hex),
        field("group_count_x", 96, 32, Uint),
        field("group_count_y", 128, 32, Uint),
        field("group_count_z", 160, 32, Uint),
        field("local_size_x", 192, 32, Uint),
        field("local_size_y", 224, 32, Uint),
        field("local_size_z", 256, 32, Uint),
    ],
};

/// Vertex pipeline bind. Always followed by one pad byte in the stream.
pub static BIND_PIPELINE: RecordLayout = RecordLayout {
    name: "BIND_PIPELINE",
    length: 16,
    fixed: &[fixed(0, 32, 0x4000_002E)],
    fields: &[
        field("unknown_32", 32, 32, Hex),
        field("pipeline", 64, 32, Address { shift: 0 }),
        field("output_count_1", 96, 8, Uint),
        field("output_count_2", 104, 8, Uint),
        field("unknown_112", 112, 16, Hex),
    ],
};

/// Bytes between a `BIND_PIPELINE` and the next command.
pub const BIND_PIPELINE_PAD: usize = 1;

pub static DRAW: RecordLayout = RecordLayout {
    name: "DRAW",
    length: 16,
    fixed: &[fixed(8, 16, 0x61C0)],
    fields: &[
        field("primitive", 0, 8, Enum(PRIMITIVES)),
        field("vertex_count", 24, 32, Uint),
        field("instance_count", 56, 32, Uint),
        field("vertex_start", 88, 32, Uint),
        field("unknown_120", 120, 8, Hex),
    ],
};

pub static INDEXED_DRAW: RecordLayout = RecordLayout {
    name: "INDEXED_DRAW",
    length: 32,
    fixed: &[fixed(8, 16, 0x65C0)],
    fields: &[
        field("primitive", 0, 8, Enum(PRIMITIVES)),
        field("index_count", 24, 32, Uint),
        field("instance_count", 56, 32, Uint),
        field("first_index", 88, 32, Uint),
        field("unknown_120", 120, 8, Hex),
        field("index_buffer", 128, 40, Address { shift: 0 }),
        field("index_size", 168, 8, Uint),
        field("base_vertex", 192, 32, Uint),
        field("unknown_224", 224, 32, Hex),
    ],
};

/// Pointer to an out-of-line payload of `size_words` 32-bit words.
pub static RECORD: RecordLayout = RecordLayout {
    name: "RECORD",
    length: 8,
    fixed: &[fixed(8, 16, 0)],
    fields: &[
        field("size_words", 0, 8, Uint),
        field("data", 24, 40, Address { shift: 0 }),
    ],
};

pub static STREAM_END: RecordLayout = RecordLayout {
    name: "STREAM_END",
    length: 20,
    fixed: &[fixed(0, 32, 0x00C0_0000)],
    fields: &[],
};

pub static VIEWPORT: RecordLayout = RecordLayout {
    name: "VIEWPORT",
    length: 40,
    fixed: &[fixed(0, 32, 0x0000_0C00)],
    fields: &[
        field("unknown_32", 32, 32, Hex),
        field("unknown_64", 64, 32, Hex),
        field("unknown_96", 96, 32, Hex),
        field("translate_x", 128, 32, Float),
        field("scale_x", 160, 32, Float),
        field("translate_y", 192, 32, Float),
        field("scale_y", 224, 32, Float),
        field("min_z", 256, 32, Float),
        field("max_z", 288, 32, Float),
    ],
};

/// Varying linkage between the vertex and fragment stages.
pub static LINKAGE: RecordLayout = RecordLayout {
    name: "LINKAGE",
    length: 16,
    fixed: &[fixed(0, 32, 0x0C02_0000)],
    fields: &[
        field("unknown_32", 32, 32, Hex),
        field("unknown_64", 64, 32, Hex),
        field("unknown_96", 96, 32, Hex),
    ],
};

pub static BIND_FRAGMENT_PIPELINE: RecordLayout = RecordLayout {
    name: "BIND_FRAGMENT_PIPELINE",
    length: 16,
    fixed: &[fixed(0, 32, 0x0080_0000)],
    fields: &[
        field("unknown_32", 32, 32, Hex),
        field("pipeline", 64, 32, Address { shift: 0 }),
        field("unknown_96", 96, 32, Hex),
    ],
};

pub static SET_SHADER: RecordLayout = RecordLayout {
    name: "SET_SHADER",
    length: 16,
    fixed: &[fixed(0, 8, 0x4D)],
    fields: &[
        field("unknown_8", 8, 24, Hex),
        field("unknown_32", 32, 16, Hex),
        field("code", 48, 32, Address { shift: 0 }),
        field("unknown_80", 80, 16, Hex),
        field("unknown_96", 96, 32, Hex),
    ],
};

pub static AUX_SHADER: RecordLayout = RecordLayout {
    name: "AUX_SHADER",
    length: 8,
    fixed: &[fixed(0, 16, 0xC080)],
    fields: &[
        field("code", 16, 32, Address { shift: 0 }),
        field("unknown_48", 48, 16, Hex),
    ],
};

pub static BIND_TEXTURE: RecordLayout = RecordLayout {
    name: "BIND_TEXTURE",
    length: 8,
    fixed: &[fixed(0, 8, 0xDD)],
    fields: &[
        field("start", 8, 8, Uint),
        field("unknown_16", 16, 4, Hex),
        field("count", 20, 4, Uint),
        field("buffer", 24, 40, Address { shift: 0 }),
    ],
};

pub static BIND_SAMPLER: RecordLayout = RecordLayout {
    name: "BIND_SAMPLER",
    length: 8,
    fixed: &[fixed(0, 8, 0x9D)],
    fields: &[
        field("start", 8, 8, Uint),
        field("unknown_16", 16, 4, Hex),
        field("count", 20, 4, Uint),
        field("buffer", 24, 40, Address { shift: 0 }),
    ],
};

/// Uniform upload. Sizes count 16-bit halves.
pub static BIND_UNIFORM: RecordLayout = RecordLayout {
    name: "BIND_UNIFORM",
    length: 8,
    fixed: &[fixed(0, 8, 0x1D)],
    fields: &[
        field("start_halfs", 8, 8, Uint),
        field("unknown_16", 16, 4, Hex),
        field("size_halfs", 20, 4, Uint),
        field("buffer", 24, 40, Address { shift: 0 }),
    ],
};

pub static TEXTURE: RecordLayout = RecordLayout {
    name: "TEXTURE",
    length: 24,
    fixed: &[],
    fields: &[
        field("dimension", 0, 4, Enum(DIMENSIONS)),
        field("layout", 4, 2, Enum(TEXTURE_LAYOUTS)),
        field("channels", 6, 7, Hex),
        field("type", 13, 3, Enum(TEXTURE_TYPES)),
        field("swizzle_r", 16, 3, Enum(SWIZZLES)),
        field("swizzle_g", 19, 3, Enum(SWIZZLES)),
        field("swizzle_b", 22, 3, Enum(SWIZZLES)),
        field("swizzle_a", 25, 3, Enum(SWIZZLES)),
        field("width", 28, 14, MinusOne),
        field("height", 42, 14, MinusOne),
        field("levels", 56, 4, MinusOne),
        field("unknown_60", 60, 4, Hex),
        field("address", 64, 36, Address { shift: 4 }),
        field("unknown_100", 100, 28, Hex),
        field("unknown_128", 128, 64, Hex),
    ],
};

pub static SAMPLER: RecordLayout = RecordLayout {
    name: "SAMPLER",
    length: 8,
    fixed: &[],
    fields: &[
        field("magnify_linear", 0, 1, Bool),
        field("unknown_1", 1, 1, Hex),
        field("minify_linear", 2, 1, Bool),
        field("unknown_3", 3, 3, Hex),
        field("mip_filter", 6, 2, Enum(MIP_FILTERS)),
        field("wrap_s", 8, 3, Enum(WRAP_MODES)),
        field("wrap_t", 11, 3, Enum(WRAP_MODES)),
        field("wrap_r", 14, 3, Enum(WRAP_MODES)),
        field("unknown_17", 17, 15, Hex),
        field("unknown_32", 32, 32, Hex),
    ],
};

pub static RENDER_TARGET: RecordLayout = RecordLayout {
    name: "RENDER_TARGET",
    length: 56,
    fixed: &[],
    fields: &[
        field("unknown_0", 0, 24, Hex),
        field("width", 24, 14, MinusOne),
        field("height", 38, 14, MinusOne),
        field("unknown_52", 52, 12, Hex),
        field("address", 64, 36, Address { shift: 4 }),
        field("unknown_100", 100, 12, Hex),
        field("unknown_112", 112, 16, Hex),
        field("unknown_128", 128, 64, Hex),
        field("unknown_192", 192, 64, Hex),
    ],
};

/// Memory map header. Entries follow at byte [`MAP_ENTRIES_OFFSET`].
pub static MAP_HEADER: RecordLayout = RecordLayout {
    name: "MAP_HEADER",
    length: 64,
    fixed: &[],
    fields: &[
        field("cmdbuf_id", 0, 64, Hex),
        field("unknown_64", 64, 32, Hex),
        field("unknown_96", 96, 32, Hex),
        field("encoder_id", 128, 64, Hex),
        field("unknown_192", 192, 32, Hex),
        field("unknown_224", 224, 32, Hex),
        field("entry_count", 256, 32, Uint),
        field("entry_count_2", 288, 32, Uint),
        field("unknown_320", 320, 32, Hex),
    ],
};

pub const MAP_ENTRIES_OFFSET: usize = 0x40;

pub static MAP_ENTRY: RecordLayout = RecordLayout {
    name: "MAP_ENTRY",
    length: 64,
    fixed: &[],
    fields: &[
        field("flags", 0, 32, Hex),
        field("unknown_192", 192, 32, Hex),
        field("unknown_288", 288, 32, Hex),
        field("index", 320, 32, Uint),
    ],
};

/// `MAP_ENTRY.flags` of a resident allocation.
pub const MAP_ENTRY_RESIDENT: u64 = 0x20;
/// `MAP_ENTRY.flags` of the entry that ends the list.
pub const MAP_ENTRY_SENTINEL: u64 = 0x40;

pub static ALL_LAYOUTS: &[&RecordLayout] = &[
    &IOGPU_HEADER,
    &LAUNCH,
    &BIND_PIPELINE,
    &DRAW,
    &INDEXED_DRAW,
    &RECORD,
    &STREAM_END,
    &VIEWPORT,
    &LINKAGE,
    &BIND_FRAGMENT_PIPELINE,
    &SET_SHADER,
    &AUX_SHADER,
    &BIND_TEXTURE,
    &BIND_SAMPLER,
    &BIND_UNIFORM,
    &TEXTURE,
    &SAMPLER,
    &RENDER_TARGET,
    &MAP_HEADER,
    &MAP_ENTRY,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_texture_descriptor() {
        let bytes = [
            0x32, 0x0a, 0x0a, 0xf6, 0x31, 0x5c, 0x09, 0x00, 0x00, 0x60, 0x02, 0x40, 0x85, 0x40,
            0x0c, 0x80, 0x00, 0x73, 0x02, 0x50, 0x01, 0x00, 0x00, 0x00,
        ];
        let tex = TEXTURE.unpack(&bytes).unwrap();
        assert_eq!(tex.get("dimension"), Some(2));
        assert_eq!(tex.get("layout"), Some(3));
        assert_eq!(tex.get("width"), Some(800));
        assert_eq!(tex.get("height"), Some(600));
        assert_eq!(tex.get("levels"), Some(1));
        assert_eq!(tex.get("swizzle_r"), Some(2));
        assert_eq!(tex.get("swizzle_g"), Some(1));
        assert_eq!(tex.get("swizzle_b"), Some(0));
        assert_eq!(tex.get("swizzle_a"), Some(3));
        assert_eq!(tex.to_bytes(), bytes.to_vec());
    }

    #[test]
    fn render_target_size_fields() {
        let mut rt = RENDER_TARGET.record();
        rt.set("width", 800u32)
            .unwrap()
            .set("height", 600u32)
            .unwrap()
            .set("address", 0x1_0000_0080u64)
            .unwrap();
        let bytes = rt.to_bytes();
        let word0 = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        assert_eq!((word0 >> 24) & 0x3FFF, 799);
        assert_eq!((word0 >> 38) & 0x3FFF, 599);
        let word1 = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(word1 & 0xF_FFFF_FFFF, 0x1_0000_0080 >> 4);
    }

    #[test]
    fn viewport_floats() {
        let bytes = VIEWPORT
            .pack(&[
                ("unknown_32", 0x18u32.into()),
                ("translate_x", 400.0f32.into()),
                ("scale_y", (-300.0f32).into()),
                ("max_z", 1.0f32.into()),
            ])
            .unwrap();
        assert_eq!(&bytes[..4], &[0x00, 0x0c, 0x00, 0x00]);
        assert_eq!(&bytes[16..20], &400.0f32.to_le_bytes());
        let vp = VIEWPORT.unpack(&bytes).unwrap();
        assert_eq!(vp.float("scale_y"), Some(-300.0));
        assert!(vp.to_string().contains("translate_x: 400.000000"));
    }

    #[test]
    fn draw_matches_captured_bytes() {
        let bytes = DRAW
            .pack(&[
                ("primitive", (Primitive::Triangles as u8).into()),
                ("vertex_count", 3u32.into()),
                ("instance_count", 1u32.into()),
            ])
            .unwrap();
        assert_eq!(
            bytes,
            [0x06, 0xc0, 0x61, 0x03, 0x00, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert!(DRAW.unpack(&bytes).unwrap().to_string().starts_with("primitive: triangles\n"));
    }
}
