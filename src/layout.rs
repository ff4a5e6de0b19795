//! Placement planning for the wrapping-paper sheet.
//!
//! Pure geometry: given sheet dimensions, an arrangement, a density and the
//! number of usable subject images, produce the ordered placement list the
//! renderer draws. Grid and diagonal plans are fully deterministic; scatter
//! takes the caller's RNG so tests can pin a seed.

use rand::Rng;

use crate::config::{Density, LayoutKind};

/// Draw size along a subject's longer dimension, in pixels at preview DPI.
pub const SUBJECT_SIZE: u32 = 150;

/// Drop-shadow parameters attached to a placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    /// Black at this opacity.
    pub opacity: f32,
}

impl Shadow {
    const SCATTER: Self = Self {
        blur: 10.0,
        offset_x: 5.0,
        offset_y: 5.0,
        opacity: 0.20,
    };
    const GRID: Self = Self {
        blur: 5.0,
        offset_x: 3.0,
        offset_y: 3.0,
        opacity: 0.15,
    };
}

/// One subject's resolved position for a single render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Index into the render pass's usable-image list.
    pub image_index: usize,
    /// Center of the drawn subject.
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub shadow: Option<Shadow>,
}

/// Plan placements for a `width`×`height` sheet.
///
/// `image_count == 0` yields an empty plan for every arrangement; the
/// diagonal index arithmetic is never reached with a zero divisor.
pub fn plan(
    width: u32,
    height: u32,
    layout: LayoutKind,
    density: Density,
    image_count: usize,
    rng: &mut impl Rng,
) -> Vec<Placement> {
    if image_count == 0 {
        return Vec::new();
    }
    let gap = density.gap();
    match layout {
        LayoutKind::Scatter => plan_cells(width, height, gap, image_count, |cell| Placement {
            image_index: cell.index,
            x: cell.x + rng.random_range(-0.2 * gap..=0.2 * gap),
            y: cell.y + rng.random_range(-0.2 * gap..=0.2 * gap),
            rotation: rng.random_range(-0.25..=0.25),
            shadow: Some(Shadow::SCATTER),
        }),
        LayoutKind::Grid => plan_cells(width, height, gap, image_count, |cell| Placement {
            image_index: cell.index,
            x: cell.x,
            y: cell.y,
            rotation: 0.0,
            shadow: Some(Shadow::GRID),
        }),
        LayoutKind::Diagonal => plan_diagonal(width, height, gap, image_count),
    }
}

struct Cell {
    index: usize,
    x: f32,
    y: f32,
}

/// Shared cell tiling for scatter and grid: `ceil(dim/gap)` cells per axis,
/// centers at cell midpoints, subjects cycled round-robin.
fn plan_cells(
    width: u32,
    height: u32,
    gap: f32,
    image_count: usize,
    mut place: impl FnMut(Cell) -> Placement,
) -> Vec<Placement> {
    let cols = (width as f32 / gap).ceil() as usize;
    let rows = (height as f32 / gap).ceil() as usize;
    let mut out = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            out.push(place(Cell {
                index: (r * cols + c) % image_count,
                x: c as f32 * gap + gap / 2.0,
                y: r as f32 * gap + gap / 2.0,
            }));
        }
    }
    out
}

/// Brick-offset tiling: one extra row/column on each side so the half-gap
/// shift never exposes a bare edge, odd rows shifted by `gap/2`, every
/// placement tilted by a fixed -0.1 radians, no shadow.
fn plan_diagonal(width: u32, height: u32, gap: f32, image_count: usize) -> Vec<Placement> {
    let cols = (width as f32 / gap).ceil() as i64 + 2;
    let rows = (height as f32 / gap).ceil() as i64 + 2;
    let mut out = Vec::with_capacity((rows as usize + 1) * (cols as usize + 1));
    for r in -1..rows {
        for c in -1..cols {
            let index = ((r * cols + c).unsigned_abs() as usize) % image_count;
            let shift = (r % 2) as f32 * (gap / 2.0);
            out.push(Placement {
                image_index: index,
                x: c as f32 * gap + shift,
                y: r as f32 * gap,
                rotation: -0.1,
                shadow: None,
            });
        }
    }
    out
}

/// Uniform scale factor that fits `(w, h)` to [`SUBJECT_SIZE`] along the
/// longer side.
pub fn subject_scale(w: u32, h: u32) -> f32 {
    SUBJECT_SIZE as f32 / w.max(h).max(1) as f32
}
