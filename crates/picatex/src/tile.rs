//! PICA200 8x8 tile layout.
//!
//! Tiles are stored in row-major order starting at the top-left of the image. Texels inside a
//! tile follow a Morton (Z-order) curve built from 4x4 sub-tiles.
#![expect(clippy::identity_op, reason = "seq expanded code")]

use seq_macro::seq;

/// Width and height of a tile, in texels.
pub const TILE_SIZE: usize = 8;
pub const TEXELS_PER_TILE: usize = TILE_SIZE * TILE_SIZE;

/// Position of each texel of a 4x4 sub-tile, indexed by `x + 4 * y`.
pub const TILE_ORDER: [usize; 16] = [0, 1, 4, 5, 2, 3, 6, 7, 8, 9, 12, 13, 10, 11, 14, 15];

/// Index of the texel at `(x, y)` inside its 8x8 tile.
#[inline(always)]
pub const fn tile_offset(x: usize, y: usize) -> usize {
    TILE_ORDER[x % 4 + (y % 4) * 4] + 16 * ((x / 4) % 2) + 32 * ((y / 4) % 2)
}

/// Index of the texel at `(x, y)` in a tiled image `width` texels wide.
#[inline(always)]
pub const fn texel_index(width: usize, x: usize, y: usize) -> usize {
    let tiles_per_row = width / TILE_SIZE;
    let tile = (y / TILE_SIZE) * tiles_per_row + x / TILE_SIZE;
    tile * TEXELS_PER_TILE + tile_offset(x, y)
}

/// Writes a `width` x `height` image into `out` in tiled order. Dimensions must be multiples of
/// the tile size and `out` must hold `width * height * bpp` bytes.
pub fn encode(
    width: usize,
    height: usize,
    bpp: usize,
    out: &mut [u8],
    get: impl Fn(usize, usize) -> u32,
) {
    debug_assert!(width % TILE_SIZE == 0 && height % TILE_SIZE == 0);
    debug_assert!(out.len() >= width * height * bpp);

    let tiles_per_row = width / TILE_SIZE;
    let tiles_per_column = height / TILE_SIZE;
    for tile_y in 0..tiles_per_column {
        for tile_x in 0..tiles_per_row {
            let tile = tile_y * tiles_per_row + tile_x;
            let tile_data = &mut out[tile * TEXELS_PER_TILE * bpp..][..TEXELS_PER_TILE * bpp];

            let base_x = tile_x * TILE_SIZE;
            let base_y = tile_y * TILE_SIZE;
            seq! {
                Y in 0..8 {
                    seq! {
                        X in 0..8 {
                            let value = get(base_x + X, base_y + Y).to_le_bytes();
                            let offset = tile_offset(X, Y) * bpp;
                            tile_data[offset..][..bpp].copy_from_slice(&value[..bpp]);
                        }
                    }
                }
            }
        }
    }
}

/// Inverse of [`encode`]: returns the image in row-major order.
pub fn untile(width: usize, height: usize, bpp: usize, data: &[u8]) -> Vec<u8> {
    debug_assert!(width % TILE_SIZE == 0 && height % TILE_SIZE == 0);

    let mut linear = vec![0; width * height * bpp];
    for y in 0..height {
        for x in 0..width {
            let src = texel_index(width, x, y) * bpp;
            let dst = (y * width + x) * bpp;
            linear[dst..][..bpp].copy_from_slice(&data[src..][..bpp]);
        }
    }

    linear
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn morton_order() {
        // first row of a tile
        let row: Vec<_> = (0..8).map(|x| tile_offset(x, 0)).collect();
        assert_eq!(row, [0, 1, 4, 5, 16, 17, 20, 21]);

        // first column of a tile
        let column: Vec<_> = (0..8).map(|y| tile_offset(0, y)).collect();
        assert_eq!(column, [0, 2, 8, 10, 32, 34, 40, 42]);

        assert_eq!(tile_offset(7, 7), 63);
    }

    #[test]
    fn tile_offsets_are_a_permutation() {
        let mut seen = [false; TEXELS_PER_TILE];
        for y in 0..TILE_SIZE {
            for x in 0..TILE_SIZE {
                let offset = tile_offset(x, y);
                assert!(!seen[offset]);
                seen[offset] = true;
            }
        }
    }

    #[test]
    fn tiles_are_row_major() {
        assert_eq!(texel_index(16, 8, 0), 64);
        assert_eq!(texel_index(16, 0, 8), 128);
        assert_eq!(texel_index(16, 9, 9), 192 + 3);
    }

    #[test]
    fn untile_inverts_encode() {
        let (width, height) = (16, 8);
        let mut data = vec![0; width * height * 2];
        encode(width, height, 2, &mut data, |x, y| (y * width + x) as u32);

        let linear = untile(width, height, 2, &data);
        for (i, chunk) in linear.chunks_exact(2).enumerate() {
            assert_eq!(u16::from_le_bytes([chunk[0], chunk[1]]) as usize, i);
        }
    }
}
