//! First-layer kernel snapshots
//!
//! The filter groups of the first convolution are concatenated on the output
//! axis, reordered to `[out, kh, kw, in]` and min-max normalized over the
//! whole tensor. Each snapshot is written twice under a directory:
//! `result%04d.npy` with the normalized tensor and `result%04d.png` with one
//! tile per output channel and an epoch caption.

use crate::error::{Result, TrainError};
use crate::export::canvas::{Canvas, BLACK, WHITE};
use crate::export::npy::write_npy;
use crate::model::FilterBank;
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const TILE_PIXELS: u32 = 44;
const GAP: u32 = 2;
const CAPTION_HEIGHT: u32 = 28;

/// Tile layout of the rendered snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelGrid {
    pub rows: usize,
    pub cols: usize,
}

impl Default for KernelGrid {
    fn default() -> Self {
        Self { rows: 6, cols: 16 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelSnapshot {
    /// `[out, kh, kw, in]`
    shape: [usize; 4],
    values: Vec<f32>,
}

/// Min-max normalization to [0, 1]; a constant tensor maps to zeros.
pub fn min_max_normalize(values: &mut [f32]) {
    let (lo, hi) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    if !(span > 0.0) || !span.is_finite() {
        values.fill(0.0);
        return;
    }
    for v in values.iter_mut() {
        *v = (*v - lo) / span;
    }
}

impl KernelSnapshot {
    pub fn from_groups(groups: &[FilterBank]) -> Result<Self> {
        let first = groups
            .first()
            .ok_or_else(|| TrainError::precondition("no first-layer filter groups"))?;
        let [_, in_c, kh, kw] = first.shape;
        if groups.iter().any(|g| g.shape[1..] != first.shape[1..]) {
            return Err(TrainError::precondition(
                "first-layer filter groups differ in kernel shape",
            ));
        }
        for g in groups {
            if g.values.len() != g.shape.iter().product::<usize>() {
                return Err(TrainError::precondition("filter values do not match their shape"));
            }
        }

        // OIHW groups concatenate on O by appending.
        let oihw: Vec<f32> = groups.iter().flat_map(|g| g.values.iter().copied()).collect();
        let out_c: usize = groups.iter().map(|g| g.shape[0]).sum();

        let mut values = vec![0.0f32; oihw.len()];
        for o in 0..out_c {
            for i in 0..in_c {
                for y in 0..kh {
                    for x in 0..kw {
                        let src = ((o * in_c + i) * kh + y) * kw + x;
                        let dst = ((o * kh + y) * kw + x) * in_c + i;
                        values[dst] = oihw[src];
                    }
                }
            }
        }
        min_max_normalize(&mut values);

        Ok(Self {
            shape: [out_c, kh, kw, in_c],
            values,
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    pub fn png_path(dir: &Path, epoch: usize) -> PathBuf {
        dir.join(format!("result{epoch:04}.png"))
    }

    pub fn npy_path(dir: &Path, epoch: usize) -> PathBuf {
        dir.join(format!("result{epoch:04}.npy"))
    }

    /// Renders the tile grid with an `EPOCH <epoch>` caption.
    pub fn render(&self, epoch: usize, grid: KernelGrid) -> Result<Canvas> {
        let [out_c, kh, kw, in_c] = self.shape;
        if grid.rows * grid.cols != out_c {
            return Err(TrainError::precondition(format!(
                "kernel grid {}x{} cannot hold {out_c} channels",
                grid.rows, grid.cols
            )));
        }
        if in_c != 1 && in_c != 3 {
            return Err(TrainError::precondition(format!(
                "cannot render kernels with {in_c} input channels"
            )));
        }

        let scale = (TILE_PIXELS / kh.max(kw) as u32).max(1);
        let tile_w = kw as u32 * scale;
        let tile_h = kh as u32 * scale;
        let width = grid.cols as u32 * (tile_w + GAP) + GAP;
        let height = CAPTION_HEIGHT + grid.rows as u32 * (tile_h + GAP) + GAP;
        let mut canvas = Canvas::new(width, height, WHITE);

        let caption = format!("EPOCH {epoch}");
        let caption_x = (width as i64 - Canvas::text_width(&caption, 2) as i64) / 2;
        canvas.text(caption_x, 7, &caption, 2, BLACK);

        let channel_len = kh * kw * in_c;
        for (o, kernel) in self.values.chunks_exact(channel_len).enumerate() {
            let tile_x = (GAP + (o % grid.cols) as u32 * (tile_w + GAP)) as i64;
            let tile_y = (CAPTION_HEIGHT + GAP + (o / grid.cols) as u32 * (tile_h + GAP)) as i64;
            for y in 0..kh {
                for x in 0..kw {
                    let px = &kernel[(y * kw + x) * in_c..(y * kw + x + 1) * in_c];
                    let level = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                    let color = if in_c == 3 {
                        Rgb([level(px[0]), level(px[1]), level(px[2])])
                    } else {
                        let g = level(px[0]);
                        Rgb([g, g, g])
                    };
                    canvas.fill_rect(
                        tile_x + (x as u32 * scale) as i64,
                        tile_y + (y as u32 * scale) as i64,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
        Ok(canvas)
    }

    /// Writes `result<epoch>.png` and `result<epoch>.npy` into `dir`,
    /// replacing earlier files of the same epoch.
    pub fn export(&self, dir: &Path, epoch: usize, grid: KernelGrid) -> Result<()> {
        let canvas = self.render(epoch, grid)?;
        fs::create_dir_all(dir).map_err(|e| TrainError::io(dir, e))?;
        canvas.save(&Self::png_path(dir, epoch))?;
        write_npy(&Self::npy_path(dir, epoch), &self.shape, &self.values)
    }
}
