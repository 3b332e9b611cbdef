//! Tile-wise contrast-limited histogram equalization (CLAHE).
//!
//! The frame is split into a grid of tiles and each tile is equalized
//! with its own clipped histogram. Unlike full CLAHE there is no
//! bilinear blending between neighbouring tile mappings: tile seams can
//! be visible, but the cost is a single pass over the pixels plus one
//! 256-entry table per tile.
//!
//! Only the R channel is read, so the stage is meant for grayscale
//! input; on a raw color capture R acts as a cheap luminance proxy.

use std::ops::Range;

use crate::types::PixelBuffer;

/// Number of gray levels.
const LEVELS: usize = 256;

/// Per-tile 256-bucket histogram.
///
/// Transient working state: built, clipped, turned into a lookup table
/// and dropped within a single [`clahe`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: [u32; LEVELS],
}

impl Histogram {
    /// Count the R values of every pixel in `tile`.
    #[must_use]
    pub fn from_tile(image: &PixelBuffer, tile: &Tile) -> Self {
        let mut counts = [0u32; LEVELS];
        for y in tile.rows.clone() {
            for x in tile.cols.clone() {
                counts[usize::from(image.get_pixel(x, y).0[0])] += 1;
            }
        }
        Self { counts }
    }

    /// Count of pixels at `level`.
    #[must_use]
    pub const fn count(&self, level: u8) -> u32 {
        self.counts[level as usize]
    }

    /// Sum of all buckets.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Clamp every bucket to `limit` and spread the clipped mass back.
    ///
    /// Each bucket receives `excess / 256` (integer division), so up to
    /// 255 counts of the excess are dropped. Returns the total excess
    /// that was clipped.
    pub fn clip(&mut self, limit: u32) -> u64 {
        let mut excess = 0u64;
        for bucket in &mut self.counts {
            if *bucket > limit {
                excess += u64::from(*bucket - limit);
                *bucket = limit;
            }
        }

        // excess <= tile area, so the share fits in u32.
        let increment = u32::try_from(excess / LEVELS as u64).unwrap_or(u32::MAX);
        for bucket in &mut self.counts {
            *bucket = bucket.saturating_add(increment);
        }
        excess
    }

    /// Build the equalization table for a tile covering `area` pixels.
    ///
    /// Level `i` maps to `round((cdf[i] - cdf[0]) / (area - cdf[0]) * 255)`.
    /// When `area == cdf[0]` the normalization is undefined; this only
    /// happens when every pixel of the tile is level 0, and the identity
    /// table is returned so those pixels stay at 0.
    #[must_use]
    pub fn lookup_table(&self, area: u64) -> [u8; LEVELS] {
        let mut cdf = [0u64; LEVELS];
        let mut running = 0u64;
        for (slot, &count) in cdf.iter_mut().zip(&self.counts) {
            running += u64::from(count);
            *slot = running;
        }

        let cdf_min = cdf[0];
        let mut lut = [0u8; LEVELS];
        if area <= cdf_min {
            for (level, entry) in (0..=u8::MAX).zip(lut.iter_mut()) {
                *entry = level;
            }
            return lut;
        }

        #[allow(clippy::cast_precision_loss)]
        let denom = (area - cdf_min) as f64;
        for (entry, &c) in lut.iter_mut().zip(&cdf) {
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let mapped = ((c.saturating_sub(cdf_min)) as f64 / denom * 255.0)
                .round()
                .clamp(0.0, 255.0) as u8;
            *entry = mapped;
        }
        lut
    }
}

/// A rectangular tile of the CLAHE grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Column range (half-open).
    pub cols: Range<u32>,
    /// Row range (half-open).
    pub rows: Range<u32>,
}

impl Tile {
    /// Pixel count of the tile.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.cols.end - self.cols.start) * u64::from(self.rows.end - self.rows.start)
    }
}

/// Partition a `width`×`height` frame into CLAHE tiles.
///
/// The grid is `max(1, width / tile_size)` × `max(1, height / tile_size)`
/// tiles with boundaries at `floor(i * dimension / count)`, so edge
/// tiles absorb the remainder and may be larger. A `tile_size` of zero
/// is treated as one.
#[must_use]
pub fn tile_grid(width: u32, height: u32, tile_size: u32) -> Vec<Tile> {
    let tile_size = tile_size.max(1);
    let nx = (width / tile_size).max(1);
    let ny = (height / tile_size).max(1);

    let mut tiles = Vec::with_capacity(usize::try_from(nx * ny).unwrap_or(0));
    for ty in 0..ny {
        let rows = boundary(ty, height, ny)..boundary(ty + 1, height, ny);
        for tx in 0..nx {
            let cols = boundary(tx, width, nx)..boundary(tx + 1, width, nx);
            tiles.push(Tile {
                cols,
                rows: rows.clone(),
            });
        }
    }
    tiles
}

/// `floor(index * dimension / count)` without intermediate overflow.
fn boundary(index: u32, dimension: u32, count: u32) -> u32 {
    let b = u64::from(index) * u64::from(dimension) / u64::from(count);
    // b <= dimension because index <= count.
    u32::try_from(b).unwrap_or(dimension)
}

/// Equalize each tile with its own contrast-limited histogram.
///
/// Output R = G = B = mapped level; alpha is copied from the input.
/// Tiles are equalized independently and not blended.
#[must_use = "returns the equalized buffer"]
pub fn clahe(image: &PixelBuffer, tile_size: u32, clip_limit: u32) -> PixelBuffer {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    if w == 0 || h == 0 {
        return out;
    }

    for tile in tile_grid(w, h, tile_size) {
        let mut hist = Histogram::from_tile(image, &tile);
        hist.clip(clip_limit);
        let lut = hist.lookup_table(tile.area());

        for y in tile.rows.clone() {
            for x in tile.cols.clone() {
                let v = lut[usize::from(image.get_pixel(x, y).0[0])];
                let p = out.get_pixel_mut(x, y);
                p.0 = [v, v, v, p.0[3]];
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn gray(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> PixelBuffer {
        PixelBuffer::from_fn(w, h, |x, y| {
            let v = f(x, y);
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn clip_clamps_bucket_and_drops_remainder() {
        // 16x16 tile: 200 pixels at level 10, 56 at level 200.
        let img = gray(16, 16, |x, y| if y * 16 + x < 200 { 10 } else { 200 });
        let tile = Tile {
            cols: 0..16,
            rows: 0..16,
        };
        let mut hist = Histogram::from_tile(&img, &tile);
        let before = hist.total();
        assert_eq!(before, 256);
        assert_eq!(hist.count(10), 200);

        let limit = 40;
        let excess = hist.clip(limit);
        // (200 - 40) + (56 - 40) = 176, less than 256, so nothing is
        // redistributed.
        assert_eq!(excess, 176);
        assert_eq!(hist.count(10), limit);
        assert_eq!(hist.total(), before - excess % 256);
        assert_eq!(hist.total(), 80);
    }

    #[test]
    fn clip_redistributes_whole_multiples_of_256() {
        // 32x32 tile, all at level 0: excess = 1024 - 40 = 984.
        let img = gray(32, 32, |_, _| 0);
        let tile = Tile {
            cols: 0..32,
            rows: 0..32,
        };
        let mut hist = Histogram::from_tile(&img, &tile);
        let before = hist.total();
        let excess = hist.clip(40);
        assert_eq!(excess, 984);
        // 984 / 256 = 3 per bucket; 984 % 256 = 216 is lost.
        assert_eq!(hist.count(0), 43);
        assert_eq!(hist.count(255), 3);
        assert_eq!(hist.total(), before - excess % 256);
    }

    #[test]
    fn clip_below_limit_is_noop() {
        let img = gray(4, 4, |x, y| u8::try_from(x * 4 + y).unwrap_or(0));
        let tile = Tile {
            cols: 0..4,
            rows: 0..4,
        };
        let mut hist = Histogram::from_tile(&img, &tile);
        let snapshot = hist.clone();
        assert_eq!(hist.clip(40), 0);
        assert_eq!(hist, snapshot);
    }

    #[test]
    fn grid_covers_frame_without_gaps() {
        let tiles = tile_grid(21, 10, 8);
        // 21 / 8 = 2 columns, 10 / 8 = 1 row.
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].cols, 0..10);
        assert_eq!(tiles[1].cols, 10..21);
        assert_eq!(tiles[0].rows, 0..10);
        let area: u64 = tiles.iter().map(Tile::area).sum();
        assert_eq!(area, 210);
    }

    #[test]
    fn grid_has_at_least_one_tile() {
        let tiles = tile_grid(3, 2, 8);
        assert_eq!(
            tiles,
            vec![Tile {
                cols: 0..3,
                rows: 0..2
            }]
        );
    }

    #[test]
    fn grid_treats_zero_tile_size_as_one() {
        assert_eq!(tile_grid(3, 2, 0).len(), 6);
    }

    #[test]
    fn lookup_table_stretches_two_levels() {
        // Tile of 4 pixels: two at 50, two at 150, limit high enough to
        // leave the histogram alone. cdf[0] = 0, area = 4.
        let img = gray(2, 2, |x, _| if x == 0 { 50 } else { 150 });
        let tile = Tile {
            cols: 0..2,
            rows: 0..2,
        };
        let mut hist = Histogram::from_tile(&img, &tile);
        hist.clip(40);
        let lut = hist.lookup_table(tile.area());
        assert_eq!(lut[0], 0);
        assert_eq!(lut[50], 128); // round(2/4 * 255) = round(127.5)
        assert_eq!(lut[150], 255);
    }

    #[test]
    fn degenerate_tile_keeps_identity() {
        // All-black 4x4 tile: cdf[0] = area = 16.
        let img = gray(4, 4, |_, _| 0);
        let tile = Tile {
            cols: 0..4,
            rows: 0..4,
        };
        let hist = Histogram::from_tile(&img, &tile);
        let lut = hist.lookup_table(tile.area());
        assert_eq!(lut[0], 0);
        assert_eq!(lut[77], 77);

        let out = clahe(&img, 8, 40);
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn uniform_frame_maps_to_clipped_level() {
        // 8x8 at 200: hist[200] = 64 -> clipped to 40, excess 24 lost.
        // cdf[0] = 0, cdf[200] = 40, area = 64 -> round(40/64*255) = 159.
        let out = clahe(&gray(8, 8, |_, _| 200), 8, 40);
        assert!(out.pixels().all(|p| p.0 == [159, 159, 159, 255]));
    }

    #[test]
    fn alpha_is_preserved() {
        let img = PixelBuffer::from_fn(8, 8, |x, _| {
            let v = u8::try_from(x * 30).unwrap_or(0);
            Rgba([v, v, v, 42])
        });
        for p in clahe(&img, 8, 40).pixels() {
            assert_eq!(p.0[3], 42);
        }
    }

    #[test]
    fn tiles_are_equalized_independently() {
        // Left tile dark, right tile bright: each stretches to its own
        // range instead of sharing one mapping.
        let img = gray(16, 8, |x, y| {
            let base = if x < 8 { 10 } else { 200 };
            base + u8::try_from((x % 8 + y) % 2).unwrap_or(0) * 20
        });
        // Each tile: 32 pixels at the low level, 32 at low + 20, so the
        // low level maps to round(32/64 * 255) = 128 in both tiles.
        let out = clahe(&img, 8, 1000);
        assert_eq!(out.get_pixel(0, 0).0[0], 128);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
        assert_eq!(out.get_pixel(8, 0).0[0], 128);
        assert_eq!(out.get_pixel(9, 0).0[0], 255);
    }

    #[test]
    fn dimensions_preserved() {
        let out = clahe(&gray(19, 23, |_, _| 9), 8, 40);
        assert_eq!(out.dimensions(), (19, 23));
    }

    #[test]
    fn zero_area_is_noop() {
        assert_eq!(clahe(&PixelBuffer::new(0, 9), 8, 40).dimensions(), (0, 9));
    }
}
