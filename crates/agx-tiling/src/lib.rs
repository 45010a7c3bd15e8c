//! Conversion between linear images and the GPU's tiled framebuffer layout.
//!
//! The tiled layout is a row-major grid of 64×64 tiles. Inside a tile, pixels
//! are ordered along a Z-order curve:
//!
//! ```text
//! [y5][x5][y4][x4][y3][x3][y2][x2][y1][x1][y0][x0]
//! ```
//!
//! Walking along a row only needs to increment the x bits in place. With
//! `mask` covering the x bit positions, `(offset - mask) & mask` fills the
//! holes with ones so the carry skips over them, then clears them again.

#![forbid(unsafe_code)]

pub const TILE_SIZE: u32 = 64;
const TILE_SHIFT: u32 = 6;
const TILE_MASK: u32 = TILE_SIZE - 1;
const TILE_PIXELS: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// In-tile bit positions used by the x coordinate.
const SPACE_MASK: usize = 0x555;

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TilingError {
    #[error("unsupported pixel size {0} bytes (only 4 is supported)")]
    UnsupportedPixelSize(u32),

    #[error("region {region:?} is not inside an image {width} pixels wide with stride {stride}")]
    InvalidRegion {
        region: Region,
        width: u32,
        stride: u32,
    },

    #[error("tiled buffer holds {len} pixels but the region needs {needed}")]
    TiledTooSmall { len: usize, needed: usize },

    #[error("linear buffer holds {len} pixels but the region needs {needed}")]
    LinearTooSmall { len: usize, needed: usize },
}

fn tiles_per_row(width: u32) -> usize {
    width.div_ceil(TILE_SIZE) as usize
}

/// Pixels needed to hold a `width × height` image in tiled form. Saturates
/// instead of wrapping for sizes no buffer can hold.
pub fn tiled_len(width: u32, height: u32) -> usize {
    let tile_rows = height.div_ceil(TILE_SIZE) as usize;
    tiles_per_row(width)
        .saturating_mul(tile_rows)
        .saturating_mul(TILE_PIXELS)
}

/// Spreads the low 6 bits of `v` into the even bit positions.
fn space_bits(v: u32) -> usize {
    let v = (v & TILE_MASK) as usize;
    (v & 1) | ((v & 2) << 1) | ((v & 4) << 2) | ((v & 8) << 3) | ((v & 16) << 4) | ((v & 32) << 5)
}

fn next_x(offset: usize) -> usize {
    offset.wrapping_sub(SPACE_MASK) & SPACE_MASK
}

fn next_y(offset: usize) -> usize {
    next_x(offset >> 1) << 1
}

/// Copies `region` from the tiled buffer into `linear`, where pixel `(x, y)`
/// lives at `linear[y * linear_stride + x]`.
pub fn detile(
    tiled: &[u32],
    linear: &mut [u32],
    width: u32,
    bytes_per_pixel: u32,
    linear_stride: u32,
    region: Region,
) -> Result<(), TilingError> {
    check(tiled.len(), linear.len(), width, bytes_per_pixel, linear_stride, region)?;
    walk(width, linear_stride, region, |t, l| linear[l] = tiled[t]);
    Ok(())
}

/// Inverse of [`detile`]: writes `region` of `linear` into the tiled buffer.
pub fn tile(
    tiled: &mut [u32],
    linear: &[u32],
    width: u32,
    bytes_per_pixel: u32,
    linear_stride: u32,
    region: Region,
) -> Result<(), TilingError> {
    check(tiled.len(), linear.len(), width, bytes_per_pixel, linear_stride, region)?;
    walk(width, linear_stride, region, |t, l| tiled[t] = linear[l]);
    Ok(())
}

fn check(
    tiled_len_px: usize,
    linear_len_px: usize,
    width: u32,
    bytes_per_pixel: u32,
    stride: u32,
    region: Region,
) -> Result<(), TilingError> {
    if bytes_per_pixel != 4 {
        return Err(TilingError::UnsupportedPixelSize(bytes_per_pixel));
    }
    if region.x0 > region.x1 || region.y0 > region.y1 || region.x1 > width || region.x1 > stride {
        return Err(TilingError::InvalidRegion {
            region,
            width,
            stride,
        });
    }
    if region.is_empty() {
        return Ok(());
    }

    let needed = tiled_len(width, region.y1);
    if tiled_len_px < needed {
        return Err(TilingError::TiledTooSmall {
            len: tiled_len_px,
            needed,
        });
    }
    let needed = (region.y1 as usize - 1)
        .saturating_mul(stride as usize)
        .saturating_add(region.x1 as usize);
    if linear_len_px < needed {
        return Err(TilingError::LinearTooSmall {
            len: linear_len_px,
            needed,
        });
    }
    Ok(())
}

/// Calls `copy(tiled_index, linear_index)` for every pixel of `region`.
///
/// Columns up to the first tile boundary and after the last one go through
/// the per-pixel path; whole tile columns in between use the tile loop.
fn walk(width: u32, stride: u32, region: Region, mut copy: impl FnMut(usize, usize)) {
    if region.is_empty() {
        return;
    }
    let tiles_per_row = tiles_per_row(width);
    let stride = stride as usize;

    let aligned_start = region
        .x0
        .checked_next_multiple_of(TILE_SIZE)
        .map_or(region.x1, |x| x.min(region.x1));
    let aligned_end = (region.x1 & !TILE_MASK).max(aligned_start);

    unaligned_columns(tiles_per_row, stride, region, region.x0, aligned_start, &mut copy);
    aligned_columns(tiles_per_row, stride, region, aligned_start, aligned_end, &mut copy);
    unaligned_columns(tiles_per_row, stride, region, aligned_end, region.x1, &mut copy);
}

fn unaligned_columns(
    tiles_per_row: usize,
    stride: usize,
    region: Region,
    sx: u32,
    ex: u32,
    copy: &mut impl FnMut(usize, usize),
) {
    if sx >= ex {
        return;
    }
    let x_offs_start = space_bits(sx);
    let mut y_offs = space_bits(region.y0) << 1;

    for y in region.y0..region.y1 {
        let tile_row = (y >> TILE_SHIFT) as usize * tiles_per_row;
        let row = y as usize * stride;
        let mut x_offs = x_offs_start;
        for x in sx..ex {
            let tile_base = (tile_row + (x >> TILE_SHIFT) as usize) * TILE_PIXELS;
            copy(tile_base + y_offs + x_offs, row + x as usize);
            x_offs = next_x(x_offs);
        }
        y_offs = next_y(y_offs);
    }
}

/// `sx` and `ex` are multiples of the tile width.
fn aligned_columns(
    tiles_per_row: usize,
    stride: usize,
    region: Region,
    sx: u32,
    ex: u32,
    copy: &mut impl FnMut(usize, usize),
) {
    if sx >= ex {
        return;
    }
    let mut y_offs = space_bits(region.y0) << 1;

    for y in region.y0..region.y1 {
        let tile_row = (y >> TILE_SHIFT) as usize * tiles_per_row;
        let row = y as usize * stride;
        for tile_x in (sx..ex).step_by(TILE_SIZE as usize) {
            let tile_base = (tile_row + (tile_x >> TILE_SHIFT) as usize) * TILE_PIXELS + y_offs;
            let linear_base = row + tile_x as usize;
            let mut x_offs = 0;
            for j in 0..TILE_SIZE as usize {
                copy(tile_base + x_offs, linear_base + j);
                x_offs = next_x(x_offs);
            }
        }
        y_offs = next_y(y_offs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_bits_interleaves() {
        assert_eq!(space_bits(0), 0);
        assert_eq!(space_bits(1), 1);
        assert_eq!(space_bits(2), 4);
        assert_eq!(space_bits(3), 5);
        assert_eq!(space_bits(63), SPACE_MASK);
    }

    #[test]
    fn masked_increment_matches_space_bits() {
        let mut x = 0;
        let mut y = 0;
        for i in 0..TILE_SIZE {
            assert_eq!(x, space_bits(i));
            assert_eq!(y, space_bits(i) << 1);
            x = next_x(x);
            y = next_y(y);
        }
        // Both wrap at the tile edge.
        assert_eq!(x, 0);
        assert_eq!(y, 0);
    }

    #[test]
    fn tiled_len_rounds_up_to_whole_tiles() {
        assert_eq!(tiled_len(64, 64), 4096);
        assert_eq!(tiled_len(65, 1), 2 * 4096);
        assert_eq!(tiled_len(800, 600), 13 * 10 * 4096);
        assert_eq!(tiled_len(u32::MAX, 1), (1 << 26) * 4096);
    }

    #[test]
    fn huge_width_is_rejected_without_overflow() {
        let tiled = vec![0u32; 4096];
        let mut linear = vec![0u32; 64];
        assert!(matches!(
            detile(&tiled, &mut linear, u32::MAX, 4, u32::MAX, Region::new(0, 0, 1, 1)),
            Err(TilingError::TiledTooSmall { len: 4096, .. })
        ));
        assert!(matches!(
            detile(&tiled, &mut linear, 64, 4, u32::MAX, Region::new(0, 0, 64, 2)),
            Err(TilingError::LinearTooSmall { len: 64, .. })
        ));
    }

    #[test]
    fn rejects_bad_arguments() {
        let tiled = vec![0u32; 4096];
        let mut linear = vec![0u32; 64 * 64];
        assert_eq!(
            detile(&tiled, &mut linear, 64, 2, 64, Region::full(64, 64)),
            Err(TilingError::UnsupportedPixelSize(2))
        );
        assert!(matches!(
            detile(&tiled, &mut linear, 64, 4, 64, Region::new(10, 0, 5, 1)),
            Err(TilingError::InvalidRegion { .. })
        ));
        assert!(matches!(
            detile(&tiled, &mut linear, 64, 4, 64, Region::full(64, 65)),
            Err(TilingError::TiledTooSmall { .. })
        ));
        assert!(matches!(
            detile(&tiled, &mut linear[..100], 64, 4, 64, Region::full(64, 2)),
            Err(TilingError::LinearTooSmall { .. })
        ));
        assert_eq!(
            detile(&[], &mut [], 64, 4, 64, Region::new(3, 3, 3, 9)),
            Ok(())
        );
    }

    #[test]
    fn second_tile_row_starts_after_full_row_of_tiles() {
        // 100 pixels wide: two tiles per row.
        let mut tiled = vec![0u32; tiled_len(100, 70)];
        let mut linear = vec![0u32; 100 * 70];
        linear[65 * 100 + 66] = 0xdead_beef;
        tile(&mut tiled, &linear, 100, 4, 100, Region::full(100, 70)).unwrap();

        // Tile (1, 1), in-tile (2, 1): x bits even, y bits odd.
        let index = 3 * TILE_PIXELS + space_bits(2) + (space_bits(1) << 1);
        assert_eq!(tiled[index], 0xdead_beef);
        assert_eq!(tiled.iter().filter(|&&p| p != 0).count(), 1);
    }
}
