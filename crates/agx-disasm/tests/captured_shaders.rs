use agx_disasm::{decode_one, disassemble, Opcode};
use proptest::prelude::*;

const STOP: [u8; 18] = [
    0x88, 0x00, 0x08, 0x00, 0x08, 0x00, 0x08, 0x00, 0x08, 0x00, 0x08, 0x00, 0x08, 0x00, 0x08,
    0x00, 0x08, 0x00,
];

fn with_stop(body: &[u8]) -> Vec<u8> {
    let mut code = body.to_vec();
    code.extend_from_slice(&STOP);
    code
}

// Vertex shader: imad, iadd, load, wait, two fmuls, two movs and four
// varying stores.
const VERTEX_BODY: &[u8] = &[
    0x9e, 0x03, 0x4a, 0x02, 0x02, 0x80, 0x01, 0x00, //
    0x0e, 0x05, 0xc2, 0x22, 0x18, 0x00, 0x00, 0x00, //
    0x05, 0x01, 0x00, 0x05, 0x00, 0xc4, 0x32, 0x00, //
    0x38, 0x00, //
    0x1a, 0x89, 0xc0, 0x82, 0x18, 0x00, //
    0x1a, 0x81, 0xc2, 0xa2, 0x18, 0x00, //
    0x62, 0x11, 0x00, 0x00, 0x00, 0x00, //
    0x62, 0x05, 0x00, 0x00, 0x80, 0x3f, //
    0x11, 0x10, 0x82, 0x80, //
    0x11, 0x04, 0x83, 0x80, //
    0x11, 0x08, 0x80, 0x80, //
    0x91, 0x00, 0x81, 0x80,
];

// Solid colour fragment shader followed by a blend.
const FRAGMENT_BODY: &[u8] = &[
    0x62, 0x00, 0x87, 0x3A, //
    0x62, 0x02, 0x05, 0x31, //
    0x62, 0x04, 0x05, 0x31, //
    0x62, 0x06, 0x00, 0x3c, //
    0x48, 0x00, 0xc2, 0x00, //
    0x48, 0x0c, 0x00, 0x00, //
    0x09, 0x00, 0x00, 0x04, 0xf0, 0xfc, 0x80, 0x03,
];

#[test]
fn vertex_shader_decodes_to_stop() {
    let code = with_stop(VERTEX_BODY);
    let d = disassemble(&code);

    assert!(d.stopped);
    assert!(!d.truncated);
    assert_eq!(d.instructions.len(), 13);
    assert_eq!(d.consumed, VERTEX_BODY.len() + 4);

    let opcodes: Vec<_> = d.instructions.iter().map(|(_, i)| i.opcode).collect();
    assert_eq!(
        opcodes,
        vec![
            Some(Opcode::Imad),
            Some(Opcode::Iadd),
            Some(Opcode::Load),
            Some(Opcode::Wait),
            Some(Opcode::Fmul32),
            Some(Opcode::Fmul32),
            Some(Opcode::Movi),
            Some(Opcode::Movi),
            Some(Opcode::StVar),
            Some(Opcode::StVar),
            Some(Opcode::StVar),
            Some(Opcode::StVar),
            Some(Opcode::Stop),
        ]
    );

    let listing = d.listing(false).to_string();
    assert!(listing.contains("\n-movi w8, #0x0\n"));
    assert!(listing.contains("\n-movi w2, #0x3F800000\n"));
    assert!(listing.contains("\n-st_var w8, index:2\n"));
    assert!(listing.contains("\n+st_var w0, index:1\n"));
    assert!(!listing.contains("stop instruction not found"));
}

#[test]
fn fragment_shader_decodes_to_stop() {
    let code = with_stop(FRAGMENT_BODY);
    let d = disassemble(&code);

    assert!(d.stopped);
    assert_eq!(d.instructions.len(), 8);
    assert_eq!(d.consumed, FRAGMENT_BODY.len() + 4);

    let offsets: Vec<_> = d.instructions.iter().map(|(o, _)| *o).collect();
    assert_eq!(offsets, vec![0, 4, 8, 12, 16, 20, 24, 32]);

    let listing = d.listing(false).to_string();
    let expected_head = "-movi h0, #0x3A87\n-movi h1, #0x3105\n-movi h2, #0x3105\n-movi h3, #0x3C00\n";
    assert!(listing.starts_with(expected_head), "{listing}");
    assert!(listing.contains("# 09 00 00 04 F0 FC 80 03\n-blend"));
}

#[test]
fn stop_instruction_offset_is_reported() {
    let code = [0x38, 0x00, 0x38, 0x00, 0x88, 0x00, 0x08, 0x00, 0xff, 0xff];
    let d = disassemble(&code);
    assert!(d.stopped);
    assert_eq!(d.consumed, 8);
}

proptest! {
    #[test]
    fn decode_always_makes_progress(bytes in proptest::collection::vec(any::<u8>(), 8..32)) {
        let inst = decode_one(&bytes);
        prop_assert!(inst.length >= 2);
        prop_assert!(inst.length <= 12);
    }

    #[test]
    fn disassembly_never_overruns(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let d = disassemble(&bytes);
        prop_assert!(d.consumed <= bytes.len());
        let mut expected = 0usize;
        for (offset, inst) in &d.instructions {
            prop_assert_eq!(*offset, expected);
            expected += usize::from(inst.length);
        }
        if d.stopped && !d.truncated {
            let (offset, last) = d.instructions.last().unwrap();
            prop_assert_eq!(d.consumed, offset + usize::from(last.length));
        }
    }
}
