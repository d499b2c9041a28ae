use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_text_mut},
    rect::Rect,
};
use thiserror::Error;
use tracing::{error, warn};

const BANNER_HEIGHT: u32 = 60;
const BANNER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const FONT_SIZE: f32 = 40.0;
const TEXT_ORIGIN: (i32, i32) = (10, 10);

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("failed to read font: {0}")]
    FontIo(#[from] std::io::Error),
    #[error("invalid font: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// DejaVu Sans, used when no font is configured or the configured one is unusable.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Burns a label banner into the top of an image.
#[derive(Clone)]
pub struct Annotator {
    font: FontArc,
}

impl Annotator {
    pub fn new(font: FontArc) -> Self {
        Self { font }
    }

    pub fn with_bundled_font() -> Result<Self, AnnotateError> {
        Ok(Self::new(FontArc::try_from_slice(BUNDLED_FONT)?))
    }

    /// Uses the font at `path` when it loads, the bundled font otherwise.
    pub fn from_font_path(path: Option<&Path>) -> Result<Self, AnnotateError> {
        let Some(path) = path else {
            return Self::with_bundled_font();
        };
        match load_font(path) {
            Ok(font) => Ok(Self::new(font)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "banner font unavailable, using bundled font");
                Self::with_bundled_font()
            }
        }
    }

    /// Writes the annotated copy of `source` to `destination`. Failures are logged, not raised.
    pub fn annotate(&self, source: &Path, label: &str, destination: &Path) -> bool {
        match self.try_annotate(source, label, destination) {
            Ok(()) => true,
            Err(err) => {
                error!(
                    source = %source.display(),
                    destination = %destination.display(),
                    error = %err,
                    "annotation failed"
                );
                false
            }
        }
    }

    fn try_annotate(&self, source: &Path, label: &str, destination: &Path) -> Result<(), AnnotateError> {
        let mut canvas = image::open(source)?.to_rgb8();
        self.draw_banner(&mut canvas, label);
        canvas.save(destination)?;
        Ok(())
    }

    fn draw_banner(&self, canvas: &mut RgbImage, label: &str) {
        let (width, height) = canvas.dimensions();
        let banner_height = BANNER_HEIGHT.min(height);
        if width == 0 || banner_height == 0 {
            return;
        }

        draw_filled_rect_mut(canvas, Rect::at(0, 0).of_size(width, banner_height), BANNER_COLOR);

        let (x, y) = TEXT_ORIGIN;
        draw_text_mut(canvas, TEXT_COLOR, x, y, PxScale::from(FONT_SIZE), &self.font, label);
    }
}

fn load_font(path: &Path) -> Result<FontArc, AnnotateError> {
    let bytes = std::fs::read(path)?;
    Ok(FontArc::try_from_vec(bytes)?)
}

/// Banner text, e.g. `Leaf Blight (87.5%)`.
pub fn banner_label(disease: &str, confidence: f32) -> String {
    format!("{} ({:.1}%)", disease, confidence * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use tempfile::TempDir;

    fn write_source(dir: &TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(width, height, Rgb([0, 128, 0]))
            .save(&path)
            .unwrap();
        path
    }

    fn annotator() -> Annotator {
        Annotator::with_bundled_font().unwrap()
    }

    fn banner_pixels_off_color(image: &RgbImage) -> usize {
        let (width, height) = image.dimensions();
        (0..BANNER_HEIGHT.min(height))
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x, y) != BANNER_COLOR)
            .count()
    }

    #[test]
    fn banner_covers_top_rows_only() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "leaf.png", 224, 224);
        let destination = dir.path().join("annotated_leaf.png");

        assert!(annotator().annotate(&source, "", &destination));

        let out = image::open(&destination).unwrap();
        assert_eq!(out.dimensions(), (224, 224));
        let rgb = out.to_rgb8();
        assert_eq!(*rgb.get_pixel(0, 0), BANNER_COLOR);
        assert_eq!(*rgb.get_pixel(223, 59), BANNER_COLOR);
        assert_eq!(*rgb.get_pixel(100, 60), Rgb([0, 128, 0]));
        assert_eq!(banner_pixels_off_color(&rgb), 0);
    }

    #[test]
    fn label_is_drawn_inside_banner() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "leaf.png", 400, 200);
        let destination = dir.path().join("annotated_leaf.png");

        assert!(annotator().annotate(&source, "Tomato Late Blight (91.0%)", &destination));

        let rgb = image::open(&destination).unwrap().to_rgb8();
        assert!(banner_pixels_off_color(&rgb) > 0);
        assert!(rgb.pixels().any(|p| *p == TEXT_COLOR));
        assert_eq!(*rgb.get_pixel(399, 199), Rgb([0, 128, 0]));
    }

    #[test]
    fn short_images_are_fully_covered() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "strip.png", 50, 20);
        let destination = dir.path().join("annotated_strip.png");

        assert!(annotator().annotate(&source, "", &destination));
        let rgb = image::open(&destination).unwrap().to_rgb8();
        assert!(rgb.pixels().all(|p| *p == BANNER_COLOR));
    }

    #[test]
    fn corrupt_source_reports_failure() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("broken.png");
        std::fs::write(&source, b"definitely not a png").unwrap();

        assert!(!annotator().annotate(&source, "x", &dir.path().join("out.png")));
    }

    #[test]
    fn unwritable_destination_reports_failure() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "leaf.png", 10, 10);
        let destination = dir.path().join("missing").join("out.png");

        assert!(!annotator().annotate(&source, "x", &destination));
    }

    #[test]
    fn missing_font_falls_back_to_bundled_and_still_draws_text() {
        let annotator = Annotator::from_font_path(Some(Path::new("/nonexistent/arial.ttf"))).unwrap();
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "leaf.png", 400, 200);
        let destination = dir.path().join("annotated_leaf.png");

        assert!(annotator.annotate(&source, "Tomato Late Blight (91.0%)", &destination));

        let rgb = image::open(&destination).unwrap().to_rgb8();
        assert!(banner_pixels_off_color(&rgb) > 0);
    }

    #[test]
    fn configured_font_file_is_used() {
        let dir = TempDir::new().unwrap();
        let font_path = dir.path().join("custom.ttf");
        std::fs::write(&font_path, BUNDLED_FONT).unwrap();

        assert!(load_font(&font_path).is_ok());
        assert!(Annotator::from_font_path(Some(&font_path)).is_ok());
    }

    #[test]
    fn garbage_font_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let font_path = dir.path().join("broken.ttf");
        std::fs::write(&font_path, b"not a font").unwrap();

        assert!(matches!(load_font(&font_path), Err(AnnotateError::Font(_))));
    }

    #[test]
    fn label_shows_percentage() {
        assert_eq!(banner_label("Leaf Blight", 0.875), "Leaf Blight (87.5%)");
    }
}
