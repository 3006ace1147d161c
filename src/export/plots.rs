//! Loss and accuracy curves rendered as PNG line plots

use crate::error::Result;
use crate::export::canvas::{Canvas, BLACK, GRID, WHITE};
use crate::training::MetricHistory;
use image::Rgb;
use std::path::Path;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const MARGIN_LEFT: i64 = 70;
const MARGIN_RIGHT: i64 = 20;
const MARGIN_TOP: i64 = 40;
const MARGIN_BOTTOM: i64 = 50;
const TICKS: usize = 5;

const BLUE: Rgb<u8> = Rgb([31, 119, 180]);
const ORANGE: Rgb<u8> = Rgb([255, 127, 14]);

pub struct Series<'a> {
    pub label: &'a str,
    pub xs: &'a [f32],
    pub ys: &'a [f32],
    pub color: Rgb<u8>,
}

pub struct LinePlot<'a> {
    pub title: &'a str,
    pub x_label: &'a str,
    pub series: Vec<Series<'a>>,
}

/// Data range padded so that flat or single-point series still get an axis.
fn range(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        (0.0, 1.0)
    } else if (hi - lo).abs() < f32::EPSILON {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo, hi)
    }
}

fn tick_label(value: f32, span: f32) -> String {
    if span >= 10.0 {
        format!("{value:.0}")
    } else if span >= 1.0 {
        format!("{value:.1}")
    } else {
        format!("{value:.3}")
    }
}

impl LinePlot<'_> {
    pub fn render(&self) -> Canvas {
        let mut canvas = Canvas::new(WIDTH, HEIGHT, WHITE);
        let left = MARGIN_LEFT;
        let right = WIDTH as i64 - MARGIN_RIGHT;
        let top = MARGIN_TOP;
        let bottom = HEIGHT as i64 - MARGIN_BOTTOM;

        let (x_lo, x_hi) = range(self.series.iter().flat_map(|s| s.xs.iter().copied()));
        let (y_lo, y_hi) = range(self.series.iter().flat_map(|s| s.ys.iter().copied()));
        let to_px = |x: f32, y: f32| -> (i64, i64) {
            let px = left as f32 + (x - x_lo) / (x_hi - x_lo) * (right - left) as f32;
            let py = bottom as f32 - (y - y_lo) / (y_hi - y_lo) * (bottom - top) as f32;
            (px.round() as i64, py.round() as i64)
        };

        for i in 0..=TICKS {
            let t = i as f32 / TICKS as f32;
            let x_value = x_lo + t * (x_hi - x_lo);
            let y_value = y_lo + t * (y_hi - y_lo);
            let (gx, _) = to_px(x_value, y_lo);
            let (_, gy) = to_px(x_lo, y_value);
            canvas.line((gx, top), (gx, bottom), 1, GRID);
            canvas.line((left, gy), (right, gy), 1, GRID);

            let x_text = tick_label(x_value, x_hi - x_lo);
            let x_offset = Canvas::text_width(&x_text, 1) as i64 / 2;
            canvas.text(gx - x_offset, bottom + 6, &x_text, 1, BLACK);
            let y_text = tick_label(y_value, y_hi - y_lo);
            let y_offset = Canvas::text_width(&y_text, 1) as i64 + 6;
            canvas.text(left - y_offset, gy - 3, &y_text, 1, BLACK);
        }

        canvas.line((left, top), (left, bottom), 1, BLACK);
        canvas.line((left, bottom), (right, bottom), 1, BLACK);
        canvas.line((right, top), (right, bottom), 1, BLACK);
        canvas.line((left, top), (right, top), 1, BLACK);

        for series in &self.series {
            let points: Vec<(i64, i64)> = series
                .xs
                .iter()
                .zip(series.ys)
                .filter(|(_, y)| y.is_finite())
                .map(|(&x, &y)| to_px(x, y))
                .collect();
            for pair in points.windows(2) {
                canvas.line(pair[0], pair[1], 2, series.color);
            }
            if let [only] = points.as_slice() {
                canvas.fill_rect(only.0 - 2, only.1 - 2, 5, 5, series.color);
            }
        }

        let title_width = Canvas::text_width(self.title, 2) as i64;
        canvas.text((WIDTH as i64 - title_width) / 2, 12, self.title, 2, BLACK);
        let label_width = Canvas::text_width(self.x_label, 1) as i64;
        canvas.text((left + right - label_width) / 2, bottom + 26, self.x_label, 1, BLACK);

        let mut legend_y = top + 8;
        for series in &self.series {
            let text_width = Canvas::text_width(series.label, 1) as i64;
            let x = right - text_width - 30;
            canvas.fill_rect(x, legend_y + 2, 16, 3, series.color);
            canvas.text(x + 22, legend_y, series.label, 1, BLACK);
            legend_y += 14;
        }

        canvas
    }
}

/// Writes the sampled batch losses against iteration number.
pub fn export_loss_plot(history: &MetricHistory, path: &Path) -> Result<()> {
    let xs = history.loss_axis();
    LinePlot {
        title: "LOSS",
        x_label: "ITERATION",
        series: vec![Series {
            label: "LOSS",
            xs: &xs,
            ys: history.losses(),
            color: BLUE,
        }],
    }
    .render()
    .save(path)
}

/// Writes validation and training accuracy against epoch number.
pub fn export_accuracy_plot(history: &MetricHistory, path: &Path) -> Result<()> {
    let xs = history.acc_axis();
    LinePlot {
        title: "ACCURACY",
        x_label: "EPOCH",
        series: vec![
            Series {
                label: "TEST",
                xs: &xs,
                ys: history.val_acc(),
                color: BLUE,
            },
            Series {
                label: "TRAIN",
                xs: &xs,
                ys: history.train_acc(),
                color: ORANGE,
            },
        ],
    }
    .render()
    .save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_padding() {
        assert_eq!(range([3.0f32].into_iter()), (2.0, 4.0));
        assert_eq!(range(std::iter::empty()), (0.0, 1.0));
        assert_eq!(range([1.0f32, 5.0, f32::NAN].into_iter()), (1.0, 5.0));
    }

    #[test]
    fn test_series_is_drawn() {
        let plot = LinePlot {
            title: "LOSS",
            x_label: "ITERATION",
            series: vec![Series {
                label: "LOSS",
                xs: &[1.0, 11.0],
                ys: &[2.0, 1.0],
                color: BLUE,
            }],
        };
        let canvas = plot.render();
        assert_eq!(canvas.width(), WIDTH);
        // first point sits on the top-left corner of the plot area
        let pixel = *canvas.image().get_pixel(MARGIN_LEFT as u32 + 1, MARGIN_TOP as u32 + 1);
        assert_eq!(pixel, BLUE);
    }
}
