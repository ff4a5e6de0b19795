//! Near-white background removal for generated subject images.
//!
//! The generation service is asked for a pure white backdrop; this pass turns
//! it transparent so subjects composite as cutouts. The threshold is a hard
//! cutoff, so anti-aliased edges from the generator keep a visible fringe.

use image::RgbaImage;

use crate::error::Error;

/// Default channel tolerance used by the render pass.
pub const DEFAULT_TOLERANCE: u8 = 30;

/// Make every pixel whose red, green and blue channels all exceed
/// `255 - tolerance` fully transparent. Color channels are left untouched;
/// pixels below the threshold keep their alpha.
pub fn strip_white_background(img: &mut RgbaImage, tolerance: u8) {
    let cutoff = 255 - tolerance;
    for px in img.pixels_mut() {
        if px[0] > cutoff && px[1] > cutoff && px[2] > cutoff {
            px[3] = 0;
        }
    }
}

/// Decode encoded image bytes and strip the near-white background.
///
/// # Errors
/// Returns [`Error::Decode`] when the bytes are not a decodable image; the
/// caller decides whether that drops the image from the current render.
pub fn decode_cutout(bytes: &[u8], tolerance: u8) -> Result<RgbaImage, Error> {
    let decoded = image::load_from_memory(bytes)?;
    let mut rgba = decoded.to_rgba8();
    strip_white_background(&mut rgba, tolerance);
    Ok(rgba)
}
