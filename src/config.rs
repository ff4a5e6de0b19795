use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::Error;
use crate::state::SubjectOptions;

/// Fixed preview resolution; a print export path would use a higher DPI.
pub const PREVIEW_DPI: u32 = 72;

/// Paper roll sizes, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperSize {
    Roll24x36,
    Roll30x40,
    Roll36x48,
}

impl PaperSize {
    const ALL: &'static [Self] = &[Self::Roll24x36, Self::Roll30x40, Self::Roll36x48];
    const NAMES: &'static [&'static str] = &["24x36", "30x40", "36x48"];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Roll24x36 => "24x36",
            Self::Roll30x40 => "30x40",
            Self::Roll36x48 => "36x48",
        }
    }

    pub fn inches(&self) -> (u32, u32) {
        match self {
            Self::Roll24x36 => (24, 36),
            Self::Roll30x40 => (30, 40),
            Self::Roll36x48 => (36, 48),
        }
    }

    /// Pixel dimensions of the sheet at the preview DPI.
    pub fn pixel_dims(&self) -> (u32, u32) {
        let (w, h) = self.inches();
        (w * PREVIEW_DPI, h * PREVIEW_DPI)
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaperSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        for size in Self::ALL {
            if raw == size.as_str() {
                return Ok(*size);
            }
        }
        Err(de::Error::unknown_variant(&raw, Self::NAMES))
    }
}

/// Spacing preset between placement cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Density {
    Sparse,
    Medium,
    Dense,
}

impl Density {
    /// Cell gap in pixels at the preview DPI.
    pub fn gap(&self) -> f32 {
        match self {
            Self::Sparse => 350.0,
            Self::Medium => 250.0,
            Self::Dense => 180.0,
        }
    }
}

/// Arrangement strategy for placing subjects on the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutKind {
    Scatter,
    Grid,
    Diagonal,
}

/// User-facing sheet settings; consumed as an immutable snapshot per render.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SheetSettings {
    pub paper_size: PaperSize,
    pub density: Density,
    pub layout: LayoutKind,
    pub pattern_prompt: String,
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::Roll24x36,
            density: Density::Medium,
            layout: LayoutKind::Scatter,
            pattern_prompt: "Elegant golden snowflakes and holly berries".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Viewport {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            max_width: 1280,
            max_height: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GenerationConfig {
    /// Model used for both pattern generation and subject edits.
    pub model: String,
    /// Environment variable holding the API credential.
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-image".to_owned(),
            api_key_env: "GEMINI_API_KEY".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Directory watched for uploaded subject photos.
    pub photo_inbox_path: PathBuf,
    /// File the composited sheet is presented to.
    pub output_path: PathBuf,
    pub viewport: Viewport,
    /// Quiet window between a state change and the render it triggers.
    #[serde(with = "humantime_serde")]
    pub render_debounce: Duration,
    pub sheet: SheetSettings,
    /// Options applied to newly uploaded subjects.
    pub subject_defaults: SubjectOptions,
    pub generation: GenerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            photo_inbox_path: PathBuf::from("photos"),
            output_path: PathBuf::from("wrap-preview.png"),
            viewport: Viewport::default(),
            render_debounce: Duration::from_millis(150),
            sheet: SheetSettings::default(),
            subject_defaults: SubjectOptions::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.photo_inbox_path.is_dir() {
            return Err(Error::BadInbox(self.photo_inbox_path.clone()));
        }
        if self.viewport.max_width == 0 || self.viewport.max_height == 0 {
            return Err(Error::Config(serde::de::Error::custom(
                "viewport dimensions must be non-zero",
            )));
        }
        Ok(())
    }
}

/// Load a [`Config`] from a YAML file.
pub fn from_yaml_file(path: &Path) -> Result<Config, Error> {
    let text = std::fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&text)?;
    Ok(cfg)
}
