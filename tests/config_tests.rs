use std::time::Duration;

use wrap_studio::config::{self, Density, LayoutKind, PaperSize};
use wrap_studio::state::HatType;

fn write_config(dir: &tempfile::TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn parses_full_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
photo-inbox-path: /tmp/photos
output-path: /tmp/preview.png
render-debounce: 250ms
viewport:
  max-width: 1600
  max-height: 1000
sheet:
  paper-size: 30x40
  density: dense
  layout: diagonal
  pattern-prompt: candy canes on cream
subject-defaults:
  add-hat: false
  hat-type: winter-beanie
  remove-background: false
generation:
  model: test-model
  api-key-env: TEST_KEY
"#,
    );
    let cfg = config::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.photo_inbox_path, std::path::PathBuf::from("/tmp/photos"));
    assert_eq!(cfg.render_debounce, Duration::from_millis(250));
    assert_eq!(cfg.viewport.max_width, 1600);
    assert_eq!(cfg.sheet.paper_size, PaperSize::Roll30x40);
    assert_eq!(cfg.sheet.density, Density::Dense);
    assert_eq!(cfg.sheet.layout, LayoutKind::Diagonal);
    assert_eq!(cfg.sheet.pattern_prompt, "candy canes on cream");
    assert!(!cfg.subject_defaults.add_hat);
    assert_eq!(cfg.subject_defaults.hat_type, HatType::WinterBeanie);
    assert!(!cfg.subject_defaults.remove_background);
    assert_eq!(cfg.generation.model, "test-model");
    assert_eq!(cfg.generation.api_key_env, "TEST_KEY");
}

#[test]
fn defaults_fill_missing_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "photo-inbox-path: ./photos\n");
    let cfg = config::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.sheet.paper_size, PaperSize::Roll24x36);
    assert_eq!(cfg.sheet.density, Density::Medium);
    assert_eq!(cfg.sheet.layout, LayoutKind::Scatter);
    assert_eq!(
        cfg.sheet.pattern_prompt,
        "Elegant golden snowflakes and holly berries"
    );
    assert!(cfg.subject_defaults.add_hat);
    assert_eq!(cfg.subject_defaults.hat_type, HatType::SantaHat);
    assert_eq!(cfg.generation.api_key_env, "GEMINI_API_KEY");
    assert_eq!(cfg.render_debounce, Duration::from_millis(150));
}

#[test]
fn rejects_unknown_paper_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "sheet:\n  paper-size: 11x17\n");
    assert!(config::from_yaml_file(&path).is_err());
}

#[test]
fn paper_sizes_map_to_preview_pixels() {
    assert_eq!(PaperSize::Roll24x36.pixel_dims(), (1728, 2592));
    assert_eq!(PaperSize::Roll30x40.pixel_dims(), (2160, 2880));
    assert_eq!(PaperSize::Roll36x48.pixel_dims(), (2592, 3456));
}

#[test]
fn density_gaps_match_presets() {
    assert_eq!(Density::Sparse.gap(), 350.0);
    assert_eq!(Density::Medium.gap(), 250.0);
    assert_eq!(Density::Dense.gap(), 180.0);
}

#[test]
fn validate_requires_existing_inbox() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config::Config::default();
    cfg.photo_inbox_path = dir.path().join("missing");
    assert!(cfg.validate().is_err());
    cfg.photo_inbox_path = dir.path().to_path_buf();
    assert!(cfg.validate().is_ok());
}
