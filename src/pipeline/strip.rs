//! Stacks panel images into one vertical strip.

use std::path::Path;

use image::RgbImage;
use tracing::{error, info};

use crate::error::ComicError;

/// Pixel size of an assembled strip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripSize {
    /// Widest panel
    pub width: u32,
    /// All panels stacked
    pub height: u32,
}

/// Pastes each image under the previous one, left-aligned, and saves the result.
///
/// Every image has to open; one bad file fails the whole strip.
pub fn assemble_strip<P: AsRef<Path>>(
    image_paths: &[P],
    output_path: &Path,
) -> Result<StripSize, ComicError> {
    let mut images = Vec::with_capacity(image_paths.len());
    for path in image_paths {
        let path = path.as_ref();
        match image::open(path) {
            Ok(image) => images.push(image.to_rgb8()),
            Err(err) => {
                error!("Error opening image {}: {}", path.display(), err);
                return Err(ComicError::Assembly(format!(
                    "could not open {}: {err}",
                    path.display()
                )));
            }
        }
    }
    if images.is_empty() {
        return Err(ComicError::Assembly("no images to assemble".to_string()));
    }

    let width = images.iter().map(RgbImage::width).max().unwrap_or(0);
    let height = images.iter().map(RgbImage::height).sum();
    let mut strip = RgbImage::new(width, height);
    let mut y_offset: u32 = 0;
    for image in &images {
        image::imageops::replace(&mut strip, image, 0, i64::from(y_offset));
        y_offset += image.height();
    }

    strip
        .save(output_path)
        .map_err(|err| ComicError::Assembly(format!("{}: {err}", output_path.display())))?;
    info!("Comic assembled and saved: {}", output_path.display());
    Ok(StripSize { width, height })
}
