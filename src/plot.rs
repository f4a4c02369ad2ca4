//! Raster map of the hex grid.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use _model::GridCell;
use anyhow::{bail, Context, Result};
use geo::{BoundingRect, Coord, Line, Rect};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point as Pixel;
use tracing::{debug, info};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const SKY_BLUE: Rgb<u8> = Rgb([135, 206, 235]);
const DIM_GREY: Rgb<u8> = Rgb([105, 105, 105]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const CELL_ALPHA: f64 = 0.67;
/// Blank border around the grid, as a fraction of the image size.
const MARGIN: f64 = 0.02;

/// Maps working-CRS coordinates onto a square image, preserving aspect.
struct Frame {
    bounds: Rect<f64>,
    scale: f64,
    offset: (f64, f64),
}

impl Frame {
    fn new(bounds: Rect<f64>, size: u32) -> Self {
        let usable = size as f64 * (1.0 - 2.0 * MARGIN);
        let scale = (usable / bounds.width()).min(usable / bounds.height());
        let offset = (
            (size as f64 - bounds.width() * scale) / 2.0,
            (size as f64 - bounds.height() * scale) / 2.0,
        );
        Self {
            bounds,
            scale,
            offset,
        }
    }

    /// Fractional pixel position of a world coordinate; y grows downward.
    fn pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.offset.0 + (x - self.bounds.min().x) * self.scale,
            self.offset.1 + (self.bounds.max().y - y) * self.scale,
        )
    }

    fn segment(&self, line: &Line<f64>) -> ((f32, f32), (f32, f32)) {
        let (x0, y0) = self.pixel(line.start.x, line.start.y);
        let (x1, y1) = self.pixel(line.end.x, line.end.y);
        ((x0 as f32, y0 as f32), (x1 as f32, y1 as f32))
    }

    /// Open pixel ring of a cell, or `None` if it collapses to fewer than three
    /// distinct pixels.
    fn ring(&self, cell: &GridCell) -> Option<Vec<Pixel<i32>>> {
        let mut ring: Vec<Pixel<i32>> = Vec::new();
        for c in cell.geometry.exterior().coords() {
            let (x, y) = self.pixel(c.x, c.y);
            let pixel = Pixel::new(x.round() as i32, y.round() as i32);
            if ring.last() != Some(&pixel) {
                ring.push(pixel);
            }
        }
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        (ring.len() >= 3).then_some(ring)
    }
}

/// Draws every cell shaded sky blue with dim grey edges, and the boundaries
/// between subdivisions (and the outline of the grid) in black.
pub fn render_grid(cells: &[GridCell], size: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(size, size, WHITE);
    let bounds = cells
        .iter()
        .filter_map(|x| x.geometry.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        });
    let Some(bounds) = bounds else {
        return image;
    };
    if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        return image;
    }
    let frame = Frame::new(bounds, size);

    let fill = blend(SKY_BLUE, CELL_ALPHA);
    let mut skipped = 0usize;
    for cell in cells {
        match frame.ring(cell) {
            Some(ring) => draw_polygon_mut(&mut image, &ring, fill),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, "cells smaller than a pixel were not filled");
    }

    for line in cells.iter().flat_map(|x| x.geometry.exterior().lines()) {
        let (start, end) = frame.segment(&line);
        draw_line_segment_mut(&mut image, start, end, DIM_GREY);
    }
    for line in subdivision_outlines(cells) {
        let (start, end) = frame.segment(&line);
        draw_line_segment_mut(&mut image, start, end, BLACK);
    }
    image
}

/// An undirected edge, with its ends rounded to the millimetre.
type EdgeKey = [(i64, i64); 2];

fn edge_key(line: &Line<f64>) -> EdgeKey {
    let round = |c: Coord<f64>| ((c.x * 1e3).round() as i64, (c.y * 1e3).round() as i64);
    let mut key = [round(line.start), round(line.end)];
    key.sort_unstable();
    key
}

/// Cell edges that no other cell of the same subdivision shares. Together
/// they trace each subdivision's outline.
fn subdivision_outlines(cells: &[GridCell]) -> Vec<Line<f64>> {
    let mut counts: HashMap<(&str, EdgeKey), usize> = HashMap::new();
    for cell in cells {
        for line in cell.geometry.exterior().lines() {
            *counts
                .entry((cell.subdivision.as_str(), edge_key(&line)))
                .or_default() += 1;
        }
    }

    let mut output = Vec::new();
    for cell in cells {
        for line in cell.geometry.exterior().lines() {
            if counts[&(cell.subdivision.as_str(), edge_key(&line))] == 1 {
                output.push(line);
            }
        }
    }
    output
}

/// `colour` drawn at `alpha` over white.
fn blend(colour: Rgb<u8>, alpha: f64) -> Rgb<u8> {
    Rgb(colour.0.map(|c| (alpha * c as f64 + (1.0 - alpha) * 255.0).round() as u8))
}

/// Saves `image` as `<destination>/<filename>.png`, creating the directory.
pub fn save_figure(image: &RgbImage, filename: &str, destination: &Path) -> Result<PathBuf> {
    if filename.is_empty() {
        bail!("Figure needs a file name");
    }
    fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create {destination:?}"))?;

    let mut filename = filename.to_string();
    if !filename.ends_with(".png") {
        filename.push_str(".png");
    }
    let path = destination.join(filename);
    image
        .save(&path)
        .with_context(|| format!("Failed to save figure to {path:?}"))?;

    info!("Figure saved to {path:?}");
    Ok(path)
}
