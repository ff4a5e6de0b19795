//! Preview surface: owns the most recent composited sheet and presents it.
//!
//! The pixel buffer keeps the sheet's full preview resolution; fitting into
//! the viewport is display-only scaling and never touches the buffer.

use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::config::Viewport;
use crate::error::Error;

#[derive(Debug)]
pub struct PreviewSurface {
    output_path: PathBuf,
    viewport: Viewport,
    frame: Option<RgbaImage>,
}

impl PreviewSurface {
    pub fn new(output_path: PathBuf, viewport: Viewport) -> Self {
        Self {
            output_path,
            viewport,
            frame: None,
        }
    }

    /// True until the first frame arrives; callers show the placeholder state
    /// instead of a sheet.
    pub fn is_placeholder(&self) -> bool {
        self.frame.is_none()
    }

    pub fn frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Display size for a `w`×`h` sheet inside the viewport: scaled down to
    /// fit, aspect ratio preserved, never scaled up.
    pub fn fitted_size(&self, w: u32, h: u32) -> (u32, u32) {
        let sw = self.viewport.max_width as f32 / w.max(1) as f32;
        let sh = self.viewport.max_height as f32 / h.max(1) as f32;
        let scale = sw.min(sh).min(1.0);
        (
            ((w as f32 * scale).round() as u32).max(1),
            ((h as f32 * scale).round() as u32).max(1),
        )
    }

    /// Top-left offset that centers a fitted frame in the viewport.
    pub fn centered_offset(&self, fitted_w: u32, fitted_h: u32) -> (u32, u32) {
        let ox = self.viewport.max_width.saturating_sub(fitted_w) / 2;
        let oy = self.viewport.max_height.saturating_sub(fitted_h) / 2;
        (ox, oy)
    }

    /// Take ownership of a finished frame and write it to the output path.
    ///
    /// # Errors
    /// [`Error::SurfaceUnavailable`] when the target directory does not
    /// exist; the compositor treats that as a no-op render, not a failure
    /// worth surfacing.
    pub fn present(&mut self, frame: RgbaImage) -> Result<(), Error> {
        if let Some(parent) = self.output_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.is_dir()
        {
            return Err(Error::SurfaceUnavailable(self.output_path.clone()));
        }
        frame
            .save_with_format(&self.output_path, image::ImageFormat::Png)
            .map_err(|e| match e {
                image::ImageError::IoError(io) => Error::Io(io),
                other => Error::Decode(other),
            })?;
        self.frame = Some(frame);
        Ok(())
    }
}
