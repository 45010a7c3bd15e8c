use std::fs;
use std::path::Path;

use agx_protocol::layouts::{Primitive, IOGPU_HEADER};
use agx_protocol::{BumpArena, EncoderWriter, MapBuilder, PipelineWriter};
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

const BASE: u64 = 0x2000_0000;

/// `movi h0, #0x3A87; stop`
const SHADER: [u8; 8] = [0x62, 0x00, 0x87, 0x3A, 0x88, 0x00, 0x08, 0x00];

/// Writes a heap, command buffer and memory map plus a manifest naming them.
fn write_capture(dir: &Path, with_handles: bool) -> std::path::PathBuf {
    let mut arena = BumpArena::new(BASE, 0x400);
    let shader = arena.upload(&SHADER).unwrap();
    let mut pipeline = PipelineWriter::new();
    pipeline.set_shader(shader as u32).unwrap();
    let pipeline = arena.upload(&pipeline.finish()).unwrap();

    let mut enc = EncoderWriter::new();
    enc.bind_pipeline(pipeline as u32, 1).unwrap();
    enc.draw(Primitive::TriangleStrip, 0, 4, 1).unwrap();
    enc.terminate();
    let encoder = arena.upload(&enc.finish()).unwrap();

    let header = IOGPU_HEADER.pack(&[("encoder", encoder.into())]).unwrap();
    let mut map = MapBuilder::new(1, 2);
    map.push(3);

    fs::write(dir.join("heap.bin"), arena.as_bytes()).unwrap();
    fs::write(dir.join("cmdbuf.bin"), header).unwrap();
    fs::write(dir.join("map.bin"), map.build().unwrap()).unwrap();

    let handles = if with_handles {
        r#", "cmdbuf": 5, "map": 6"#
    } else {
        ""
    };
    let manifest = format!(
        r#"{{
            "allocations": [
                {{"kind": "regular", "index": 3, "gpu_va": {BASE}, "name": "heap", "file": "heap.bin"}},
                {{"kind": "command_buffer", "index": 5, "file": "cmdbuf.bin"}},
                {{"kind": "memory_map", "index": 6, "file": "map.bin"}}
            ]{handles}
        }}"#
    );
    let path = dir.join("capture.json");
    fs::write(&path, manifest).unwrap();
    path
}

#[test]
fn decode_writes_trace_file() {
    let dir = tempdir().unwrap();
    let manifest = write_capture(dir.path(), true);
    let base = dir.path().join("trace");

    cargo_bin_cmd!("agx-dump")
        .args([
            "decode",
            manifest.to_str().unwrap(),
            "--dump-file",
            base.to_str().unwrap(),
        ])
        .env_remove("AGXDECODE_VERBOSE")
        .assert()
        .success()
        .stdout(predicate::str::contains("trace.0000"));

    let trace = fs::read_to_string(dir.path().join("trace.0000")).unwrap();
    for expected in [
        "slot 0: allocation 3 (heap)",
        "BindPipeline:",
        "Pipeline at heap + 128:",
        "Shader at heap:",
        "-movi h0, #0x3A87",
        "primitive: triangle_strip",
        "vertex_count: 4",
    ] {
        assert!(trace.contains(expected), "missing {expected:?} in\n{trace}");
    }
}

#[test]
fn decode_to_stderr_with_explicit_handles() {
    let dir = tempdir().unwrap();
    let manifest = write_capture(dir.path(), false);

    cargo_bin_cmd!("agx-dump")
        .args([
            "decode",
            manifest.to_str().unwrap(),
            "--cmdbuf",
            "5",
            "--map",
            "6",
            "--dump-file",
            "stderr",
            "--verbose",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Encoder at heap + 256:"))
        .stderr(predicate::str::contains("000000  "));
}

#[test]
fn decode_without_handles_fails() {
    let dir = tempdir().unwrap();
    let manifest = write_capture(dir.path(), false);

    cargo_bin_cmd!("agx-dump")
        .args(["decode", manifest.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--cmdbuf"));
}

#[test]
fn decode_reports_missing_command_buffer() {
    let dir = tempdir().unwrap();
    let manifest = write_capture(dir.path(), true);

    cargo_bin_cmd!("agx-dump")
        .args([
            "decode",
            manifest.to_str().unwrap(),
            "--cmdbuf",
            "42",
            "--dump-file",
            "stderr",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no command buffer allocation with handle 42"));
}

#[test]
fn missing_manifest_names_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.json");

    cargo_bin_cmd!("agx-dump")
        .args(["decode", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
}

#[test]
fn detile_writes_png() {
    let dir = tempdir().unwrap();
    let tiled = dir.path().join("fb.bin");
    let out = dir.path().join("fb.png");
    fs::write(&tiled, vec![0x7f; 64 * 64 * 4]).unwrap();

    cargo_bin_cmd!("agx-dump")
        .args([
            "detile",
            tiled.to_str().unwrap(),
            "--width",
            "32",
            "--height",
            "16",
            "-o",
            out.to_str().unwrap(),
            "--swap-rb",
        ])
        .assert()
        .success();

    let png = fs::read(&out).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    assert_eq!(&png[12..16], b"IHDR");
    assert_eq!(u32::from_be_bytes(png[16..20].try_into().unwrap()), 32);
    assert_eq!(u32::from_be_bytes(png[20..24].try_into().unwrap()), 16);
}

#[test]
fn detile_rejects_short_capture() {
    let dir = tempdir().unwrap();
    let tiled = dir.path().join("fb.bin");
    fs::write(&tiled, vec![0; 64]).unwrap();

    cargo_bin_cmd!("agx-dump")
        .args([
            "detile",
            tiled.to_str().unwrap(),
            "--width",
            "64",
            "--height",
            "64",
            "-o",
            dir.path().join("fb.png").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fb.bin"));
}
