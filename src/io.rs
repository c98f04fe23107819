//! Conversion between decoded images and sheet buffers, file loading and
//! saving, and the debug overlay.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageReader, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use tracing::debug;

use crate::buffer::{black_max, BitDepth, PixelBuffer, BLACK, WHITE};
use crate::error::Result;
use crate::geometry::Rect;

const MASK_COLOR: Rgb<u8> = Rgb([220, 30, 30]);
const BORDER_COLOR: Rgb<u8> = Rgb([30, 60, 220]);

/// Wrap a decoded image. Alpha is dropped.
///
/// Gray images whose samples are all pure black or white are treated as
/// one-bit sheets, so they are binarized again on output.
pub fn from_dynamic(image: DynamicImage, background: u8) -> Result<PixelBuffer> {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => {
            let gray = image.into_luma8();
            let bitdepth = if gray.pixels().all(|p| p[0] == BLACK || p[0] == WHITE) {
                BitDepth::One
            } else {
                BitDepth::Eight
            };
            PixelBuffer::from_gray(gray, bitdepth, background)
        }
        other => PixelBuffer::from_rgb(other.into_rgb8(), background),
    }
}

/// Encode-ready copy of a buffer. One-bit buffers are binarized: a pixel
/// becomes black when its grayscale is below `255 * (1 - black_threshold)`.
pub fn to_dynamic(buffer: &PixelBuffer, black_threshold: f32) -> DynamicImage {
    let (width, height) = buffer.dimensions();
    if buffer.bitdepth() == BitDepth::One {
        let cutoff = black_max(black_threshold);
        let binary = GrayImage::from_fn(width, height, |x, y| {
            let value = buffer.grayscale(x as i32, y as i32);
            Luma([if value < cutoff { BLACK } else { WHITE }])
        });
        return DynamicImage::ImageLuma8(binary);
    }
    match (buffer.as_gray(), buffer.as_rgb()) {
        (Some(gray), _) => DynamicImage::ImageLuma8(gray.clone()),
        (_, Some(rgb)) => DynamicImage::ImageRgb8(rgb.clone()),
        _ => DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
            Luma([buffer.grayscale(x as i32, y as i32)])
        })),
    }
}

/// Decode an image file into a sheet buffer.
pub fn load(path: &Path, background: u8) -> Result<PixelBuffer> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "page loaded"
    );
    from_dynamic(image, background)
}

/// Encode a sheet buffer; the format follows the file extension.
pub fn save(buffer: &PixelBuffer, path: &Path, black_threshold: f32) -> Result<()> {
    to_dynamic(buffer, black_threshold).save(path)?;
    debug!(path = %path.display(), "page saved");
    Ok(())
}

/// RGB copy of `buffer` with mask outlines in red and border outlines in
/// blue. Rectangles without bounds are skipped.
pub fn render_overlay(buffer: &PixelBuffer, masks: &[Rect], borders: &[Rect]) -> RgbImage {
    let mut overlay = buffer.to_rgb();
    let outlines = masks
        .iter()
        .map(|r| (r, MASK_COLOR))
        .chain(borders.iter().map(|r| (r, BORDER_COLOR)));
    for (rect, color) in outlines {
        if !rect.is_valid() {
            continue;
        }
        let outline = imageproc::rect::Rect::at(rect.left, rect.top)
            .of_size(rect.width() as u32, rect.height() as u32);
        draw_hollow_rect_mut(&mut overlay, outline, color);
    }
    overlay
}
