use image::{Rgba, RgbaImage};
use wrap_studio::Error;
use wrap_studio::config::Viewport;
use wrap_studio::surface::PreviewSurface;

fn viewport() -> Viewport {
    Viewport {
        max_width: 1280,
        max_height: 900,
    }
}

#[test]
fn fit_preserves_aspect_ratio_and_never_upscales() {
    let surface = PreviewSurface::new("preview.png".into(), viewport());

    // Tall 24x36 sheet constrained by viewport height.
    let (w, h) = surface.fitted_size(1728, 2592);
    assert_eq!((w, h), (600, 900));

    // Small frames are left at native size.
    assert_eq!(surface.fitted_size(320, 200), (320, 200));

    // Wide frames are constrained by width.
    let (w, h) = surface.fitted_size(4000, 1000);
    assert_eq!(w, 1280);
    assert_eq!(h, 320);
}

#[test]
fn fitted_frame_is_centered_in_the_viewport() {
    let surface = PreviewSurface::new("preview.png".into(), viewport());
    let (w, h) = surface.fitted_size(1728, 2592);
    assert_eq!(surface.centered_offset(w, h), ((1280 - 600) / 2, 0));
}

#[test]
fn present_writes_the_frame_and_clears_the_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preview.png");
    let mut surface = PreviewSurface::new(path.clone(), viewport());
    assert!(surface.is_placeholder());

    let frame = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]));
    surface.present(frame).unwrap();
    assert!(!surface.is_placeholder());
    assert_eq!(surface.frame().unwrap().dimensions(), (8, 8));

    let reread = image::open(&path).unwrap().to_rgba8();
    assert_eq!(*reread.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
}

#[test]
fn present_into_a_missing_directory_reports_surface_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone").join("preview.png");
    let mut surface = PreviewSurface::new(path, viewport());
    let frame = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
    match surface.present(frame) {
        Err(Error::SurfaceUnavailable(_)) => {}
        other => panic!("expected SurfaceUnavailable, got {other:?}"),
    }
    // Degraded present leaves the placeholder in place.
    assert!(surface.is_placeholder());
}
