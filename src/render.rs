//! Sheet compositing: pattern fill plus planned subject placements.
//!
//! A render is best-effort and idempotent; nothing in here surfaces to the
//! user. Individual subject decode failures drop that image from the current
//! pass only, and a render superseded by a newer snapshot abandons itself
//! silently instead of racing the replacement to the surface.

use std::sync::Arc;

use image::{Rgba, RgbaImage, imageops};
use rand::Rng;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use crate::cutout;
use crate::layout::{self, Placement, Shadow};
use crate::state::Snapshot;

/// Fallback sheet fill when no pattern has been generated yet (#FBF8F3).
pub const FALLBACK_FILL: Rgba<u8> = Rgba([0xFB, 0xF8, 0xF3, 0xFF]);

/// Composite one sheet from an immutable snapshot.
///
/// `superseded` is polled after every suspension point; once it reports true
/// the pass returns `None` without drawing further. A sheet with only the
/// background fill is a valid result when no subject is usable.
pub async fn compose<R, F>(snapshot: &Snapshot, rng: &mut R, superseded: F) -> Option<RgbaImage>
where
    R: Rng,
    F: Fn() -> bool,
{
    let (width, height) = snapshot.settings.paper_size.pixel_dims();
    let mut sheet = fill_background(width, height, snapshot.pattern.clone()).await;
    if superseded() {
        return None;
    }

    let eligible: Vec<Arc<Vec<u8>>> = snapshot
        .subjects
        .iter()
        .filter(|s| s.is_ready())
        .filter_map(|s| s.processed.clone())
        .collect();

    let mut images: Vec<RgbaImage> = Vec::with_capacity(eligible.len());
    for bytes in eligible {
        let decoded =
            spawn_blocking(move || cutout::decode_cutout(&bytes, cutout::DEFAULT_TOLERANCE)).await;
        if superseded() {
            return None;
        }
        match decoded {
            Ok(Ok(img)) => images.push(img),
            Ok(Err(err)) => {
                // Dropped from this pass only; failure marking stays with the
                // processing step.
                warn!(error = %err, "skipping undecodable subject image");
            }
            Err(err) => {
                warn!(error = %err, "subject decode task failed");
            }
        }
    }

    if images.is_empty() {
        return Some(sheet);
    }

    let placements = layout::plan(
        width,
        height,
        snapshot.settings.layout,
        snapshot.settings.density,
        images.len(),
        rng,
    );
    debug!(
        placements = placements.len(),
        subjects = images.len(),
        "drawing sheet"
    );

    let drawn = spawn_blocking(move || {
        for placement in &placements {
            draw_placement(&mut sheet, &images[placement.image_index], placement);
        }
        sheet
    })
    .await;
    if superseded() {
        return None;
    }
    match drawn {
        Ok(sheet) => Some(sheet),
        Err(err) => {
            warn!(error = %err, "draw task failed");
            None
        }
    }
}

/// Fill the sheet with a repeating pattern tile, or the cream fallback when
/// no pattern exists or its bytes do not decode.
async fn fill_background(width: u32, height: u32, pattern: Option<Arc<Vec<u8>>>) -> RgbaImage {
    let tile = match pattern {
        Some(bytes) => {
            let decoded = spawn_blocking(move || image::load_from_memory(&bytes)).await;
            match decoded {
                Ok(Ok(img)) => Some(img.to_rgba8()),
                Ok(Err(err)) => {
                    warn!(error = %err, "pattern tile undecodable; using fallback fill");
                    None
                }
                Err(err) => {
                    warn!(error = %err, "pattern decode task failed; using fallback fill");
                    None
                }
            }
        }
        None => None,
    };

    let mut sheet = RgbaImage::from_pixel(width, height, FALLBACK_FILL);
    if let Some(tile) = tile {
        let (tw, th) = tile.dimensions();
        if tw > 0 && th > 0 {
            for y in (0..height).step_by(th as usize) {
                for x in (0..width).step_by(tw as usize) {
                    imageops::replace(&mut sheet, &tile, i64::from(x), i64::from(y));
                }
            }
        }
    }
    sheet
}

/// Draw one placement: optional soft shadow first, then the rotated subject
/// stamp, both alpha-composited and centered on the placement position.
/// Nothing leaks between placements; each works on its own stamp buffer.
fn draw_placement(sheet: &mut RgbaImage, img: &RgbaImage, placement: &Placement) {
    let (w, h) = img.dimensions();
    let scale = layout::subject_scale(w, h);
    let stamp = rasterize_stamp(img, scale, placement.rotation);
    let (sw, sh) = stamp.dimensions();
    let left = (placement.x - sw as f32 / 2.0).round() as i64;
    let top = (placement.y - sh as f32 / 2.0).round() as i64;

    if let Some(shadow) = &placement.shadow {
        let (cast, pad) = cast_shadow(&stamp, shadow);
        imageops::overlay(
            sheet,
            &cast,
            left + shadow.offset_x.round() as i64 - i64::from(pad),
            top + shadow.offset_y.round() as i64 - i64::from(pad),
        );
    }
    imageops::overlay(sheet, &stamp, left, top);
}

/// Resample a subject into its rotated, scaled stamp. Inverse mapping with
/// bilinear sampling; pixels outside the source stay transparent.
fn rasterize_stamp(img: &RgbaImage, scale: f32, rotation: f32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let sw = w as f32 * scale;
    let sh = h as f32 * scale;
    let (sin, cos) = rotation.sin_cos();
    let out_w = (sw * cos.abs() + sh * sin.abs()).ceil().max(1.0) as u32;
    let out_h = (sw * sin.abs() + sh * cos.abs()).ceil().max(1.0) as u32;

    let mut out = RgbaImage::new(out_w, out_h);
    for (px, py, dst) in out.enumerate_pixels_mut() {
        let dx = px as f32 + 0.5 - out_w as f32 / 2.0;
        let dy = py as f32 + 0.5 - out_h as f32 / 2.0;
        // Inverse rotation back into the unrotated, scaled frame.
        let ux = dx * cos + dy * sin;
        let uy = -dx * sin + dy * cos;
        let sx = (ux + sw / 2.0) / scale - 0.5;
        let sy = (uy + sh / 2.0) / scale - 0.5;
        *dst = bilinear_sample(img, sx, sy);
    }
    out
}

fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let (w, h) = img.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |ix: f32, iy: f32| -> [f32; 4] {
        if ix < 0.0 || iy < 0.0 || ix >= w as f32 || iy >= h as f32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(ix as u32, iy as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1.0, y0);
    let p01 = fetch(x0, y0 + 1.0);
    let p11 = fetch(x0 + 1.0, y0 + 1.0);

    let mut px = [0u8; 4];
    for (i, out) in px.iter_mut().enumerate() {
        let top = p00[i] * (1.0 - fx) + p10[i] * fx;
        let bottom = p01[i] * (1.0 - fx) + p11[i] * fx;
        *out = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(px)
}

/// Build the blurred black silhouette for a stamp. Returns the shadow image
/// and the padding added on each side so the blur has room to spread.
fn cast_shadow(stamp: &RgbaImage, shadow: &Shadow) -> (RgbaImage, u32) {
    let pad = shadow.blur.ceil().max(1.0) as u32;
    let (w, h) = stamp.dimensions();
    let mut silhouette = RgbaImage::new(w + 2 * pad, h + 2 * pad);
    for (x, y, px) in stamp.enumerate_pixels() {
        let alpha = (px[3] as f32 * shadow.opacity).round() as u8;
        silhouette.put_pixel(x + pad, y + pad, Rgba([0, 0, 0, alpha]));
    }
    // shadowBlur is a diameter-ish canvas notion; halve it for a sigma.
    let cast = imageops::blur(&silhouette, shadow.blur / 2.0);
    (cast, pad)
}
