//! Synthetic scan fixtures drawn with imageproc.
#![allow(dead_code)]

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use sheetfix::{BitDepth, PixelBuffer};

pub const INK: Luma<u8> = Luma([0]);
pub const PAPER: Luma<u8> = Luma([255]);
pub const NAVY: Rgb<u8> = Rgb([10, 20, 60]);

pub fn paper(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, PAPER)
}

pub fn to_buffer(image: GrayImage) -> PixelBuffer {
    PixelBuffer::from_gray(image, BitDepth::Eight, 255).unwrap()
}

/// A page with solid ink blocks at the given `(x, y, width, height)` positions.
pub fn blocks(width: u32, height: u32, blocks: &[(i32, i32, u32, u32)]) -> PixelBuffer {
    let mut image = paper(width, height);
    for &(x, y, w, h) in blocks {
        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), INK);
    }
    to_buffer(image)
}

/// Corners of a `size` rectangle centred on `center`, turned clockwise on
/// screen by `degrees`.
fn turned_corners(center: (f64, f64), size: (f64, f64), degrees: f64) -> Vec<Point<i32>> {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (hw, hh) = (size.0 / 2.0, size.1 / 2.0);
    [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
        .iter()
        .map(|&(dx, dy)| {
            // Clockwise in image coordinates, where y grows downward.
            let x = center.0 + dx * cos - dy * sin;
            let y = center.1 + dx * sin + dy * cos;
            Point::new(x.round() as i32, y.round() as i32)
        })
        .collect()
}

/// A page with a solid block of `size` centred on `center`, turned
/// clockwise on screen by `degrees`.
pub fn rotated_block(
    width: u32,
    height: u32,
    center: (f64, f64),
    size: (f64, f64),
    degrees: f64,
) -> PixelBuffer {
    let mut image = paper(width, height);
    draw_polygon_mut(&mut image, &turned_corners(center, size, degrees), INK);
    to_buffer(image)
}

/// A colour scan: a navy block turned by `degrees` in the middle of the
/// page and a near-black scanner edge `band` pixels wide on the left.
pub fn color_scan(width: u32, height: u32, band: u32, degrees: f64) -> PixelBuffer {
    let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let center = (width as f64 / 2.0, height as f64 / 2.0);
    let size = (width as f64 / 2.0, height as f64 * 5.0 / 8.0);
    draw_polygon_mut(&mut image, &turned_corners(center, size, degrees), NAVY);
    draw_filled_rect_mut(&mut image, Rect::at(0, 0).of_size(band, height), Rgb([4, 0, 8]));
    PixelBuffer::from_rgb(image, 255).unwrap()
}

/// Pixels at or below the default black cutoff.
pub fn dark_pixels(buffer: &PixelBuffer) -> u64 {
    buffer.count_pixels_in(buffer.bounds(), 0, 170)
}

pub fn dark_pixels_in(buffer: &PixelBuffer, rect: sheetfix::Rect) -> u64 {
    buffer.count_pixels_in(rect, 0, 170)
}
