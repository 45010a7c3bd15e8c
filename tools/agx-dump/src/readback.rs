//! Framebuffer readback: tiled 32bpp capture to PNG.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use agx_tiling::{detile, tiled_len, Region};
use anyhow::{bail, Context};

/// Detiles a `width × height` 32bpp image. Pixels come back as their
/// little-endian bytes, optionally with the first and third channels
/// swapped (BGRA captures).
pub fn detile_rgba(tiled: &[u8], width: u32, height: u32, swap_rb: bool) -> anyhow::Result<Vec<u8>> {
    if tiled.len() % 4 != 0 {
        bail!("tiled buffer length {} is not a whole number of pixels", tiled.len());
    }
    let needed = tiled_len(width, height);
    if tiled.len() / 4 < needed {
        bail!(
            "capture holds {} pixels but a {width}x{height} tiled image needs {needed}",
            tiled.len() / 4
        );
    }
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .context("image size overflows")?;
    let tiled: Vec<u32> = tiled
        .chunks_exact(4)
        .map(|px| u32::from_le_bytes([px[0], px[1], px[2], px[3]]))
        .collect();
    let mut linear = vec![0u32; pixels];
    detile(&tiled, &mut linear, width, 4, width, Region::full(width, height))
        .context("detile framebuffer")?;

    let mut rgba = Vec::with_capacity(linear.len() * 4);
    for px in linear {
        let mut bytes = px.to_le_bytes();
        if swap_rb {
            bytes.swap(0, 2);
        }
        rgba.extend_from_slice(&bytes);
    }
    Ok(rgba)
}

pub fn write_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .with_context(|| format!("write PNG header to {}", path.display()))?;
    writer
        .write_image_data(rgba)
        .with_context(|| format!("write PNG data to {}", path.display()))?;
    writer
        .finish()
        .with_context(|| format!("finish {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agx_tiling::tile;

    #[test]
    fn detile_undoes_tile_and_swaps() {
        let (w, h) = (8u32, 4u32);
        let linear: Vec<u32> = (0..w * h).map(|i| 0xff00_0000 | (i + 100) << 16 | 0x80 << 8 | i).collect();
        let mut tiled = vec![0u32; tiled_len(w, h)];
        tile(&mut tiled, &linear, w, 4, w, Region::full(w, h)).unwrap();
        let tiled_bytes: Vec<u8> = tiled.iter().flat_map(|px| px.to_le_bytes()).collect();

        let plain = detile_rgba(&tiled_bytes, w, h, false).unwrap();
        assert_eq!(plain.len(), (w * h * 4) as usize);
        assert_eq!(&plain[4 * 5..4 * 6], &[5, 0x80, 105, 0xff]);

        let swapped = detile_rgba(&tiled_bytes, w, h, true).unwrap();
        assert_eq!(&swapped[4 * 5..4 * 6], &[105, 0x80, 5, 0xff]);
    }

    #[test]
    fn short_capture_is_an_error() {
        assert!(detile_rgba(&[0; 16], 64, 64, false).is_err());
        assert!(detile_rgba(&[0; 6], 1, 1, false).is_err());
    }

    #[test]
    fn huge_dimensions_fail_before_allocating() {
        let err = detile_rgba(&[0; 16], u32::MAX, u32::MAX, false).unwrap_err();
        assert!(err.to_string().contains("tiled image needs"), "{err}");
    }
}
