use image::Rgb;

use crate::buffer::PixelBuffer;
use crate::error::{Error, Result};
use crate::geometry::{rotate_offset, rotation_matrix, Directions, Point};

/// Rotate `source` by `radians` around its centre into `target`, sampling
/// nearest neighbours. Positive angles turn content clockwise on screen.
///
/// Target pixels are visited once per quadrant around the centre, sharing a
/// single matrix product between the four symmetric positions. Odd and even
/// sizes are handled by the separate `half` (lower) and `mid` (upper) centres.
pub fn rotate(source: &PixelBuffer, target: &mut PixelBuffer, radians: f64) {
    let (w, h) = (source.width() as i32, source.height() as i32);
    let (half_x, half_y) = ((w - 1) / 2, (h - 1) / 2);
    let (mid_x, mid_y) = (w / 2, h / 2);
    let mid_max = mid_x.max(mid_y);
    let matrix = rotation_matrix(radians);

    for dy in 0..=mid_max {
        for dx in 0..=mid_max {
            let (diff_x, diff_y) = rotate_offset(&matrix, dx, dy);

            // I
            let (x, y) = (mid_x + dx, mid_y - dy);
            if x < w && y >= 0 {
                target.set(x, y, source.get(mid_x + diff_x, mid_y - diff_y));
            }
            // II
            let (x, y) = (half_x - dy, mid_y - dx);
            if x >= 0 && y >= 0 {
                target.set(x, y, source.get(half_x - diff_y, mid_y - diff_x));
            }
            // III
            let (x, y) = (half_x - dx, half_y + dy);
            if x >= 0 && y < h {
                target.set(x, y, source.get(half_x - diff_x, half_y + diff_y));
            }
            // IV
            let (x, y) = (mid_x + dy, half_y + dx);
            if x < w && y < h {
                target.set(x, y, source.get(mid_x + diff_y, half_y + diff_x));
            }
        }
    }
}

/// Upsample by two, replicating every pixel into a 2x2 block.
pub fn to_qpixels(image: &PixelBuffer) -> Result<PixelBuffer> {
    let mut qpixels = image.blank_like(image.width() * 2, image.height() * 2)?;
    for y in 0..image.height() as i32 {
        for x in 0..image.width() as i32 {
            let pixel = image.get(x, y);
            for (qx, qy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                qpixels.set(x * 2 + qx, y * 2 + qy, pixel);
            }
        }
    }
    Ok(qpixels)
}

/// Downsample by two, averaging every 2x2 block per channel.
pub fn from_qpixels(qpixels: &PixelBuffer) -> Result<PixelBuffer> {
    let (width, height) = (qpixels.width() / 2, qpixels.height() / 2);
    let mut image = qpixels.blank_like(width, height)?;
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let block = [
                qpixels.get(x * 2, y * 2),
                qpixels.get(x * 2 + 1, y * 2),
                qpixels.get(x * 2, y * 2 + 1),
                qpixels.get(x * 2 + 1, y * 2 + 1),
            ];
            image.set(x, y, average(&block));
        }
    }
    Ok(image)
}

fn average(pixels: &[Rgb<u8>]) -> Rgb<u8> {
    let mut sum = [0u32; 3];
    for p in pixels {
        for (s, &c) in sum.iter_mut().zip(p.0.iter()) {
            *s += c as u32;
        }
    }
    let n = pixels.len().max(1) as u32;
    Rgb(sum.map(|s| (s / n) as u8))
}

/// Stretch to exactly `width` x `height`.
///
/// Shrinking averages blocks of source pixels, spreading the remainder of
/// the integer ratio evenly over the output. Enlarging maps every output
/// pixel to a single source pixel.
pub fn stretch(image: PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
    if (width, height) == image.dimensions() {
        return Ok(image);
    }
    let mut target = image.blank_like(width, height)?;
    let (sw, sh) = (image.width() as i64, image.height() as i64);
    let (w, h) = (width as i64, height as i64);
    let (block_w, block_h) = (sw / w, sh / h);
    let rest_w = if w <= sw { sw % w } else { w };
    let rest_h = if h <= sh { sh % h } else { h };

    let mut block = Vec::new();
    let mut matrix_y = 0;
    let mut fill_index_h = 0;
    for y in 0..h {
        let matrix_h = block_h + next_fill(y, rest_h, h, &mut fill_index_h);
        if block_h == 0 {
            matrix_y = y * sh / h;
        }
        let mut matrix_x = 0;
        let mut fill_index_w = 0;
        for x in 0..w {
            let matrix_w = block_w + next_fill(x, rest_w, w, &mut fill_index_w);
            if block_w == 0 {
                matrix_x = x * sw / w;
            }
            let pixel = if matrix_w == 1 && matrix_h == 1 {
                image.get(matrix_x as i32, matrix_y as i32)
            } else {
                block.clear();
                for yy in matrix_y..matrix_y + matrix_h {
                    for xx in matrix_x..matrix_x + matrix_w {
                        block.push(image.get(xx as i32, yy as i32));
                    }
                }
                average(&block)
            };
            target.set(x as i32, y as i32, pixel);
            if block_w > 0 {
                matrix_x += matrix_w;
            }
        }
        if block_h > 0 {
            matrix_y += matrix_h;
        }
    }
    Ok(target)
}

/// One extra source pixel goes to output index `i` whenever the scaled
/// remainder reaches the next fill index. An even ratio has no remainder.
fn next_fill(i: i64, rest: i64, size: i64, fill_index: &mut i64) -> i64 {
    if rest > 0 && i * rest / size == *fill_index {
        *fill_index += 1;
        1
    } else {
        0
    }
}

/// Stretch both dimensions by `factor`.
pub fn zoom(image: PixelBuffer, factor: f32) -> Result<PixelBuffer> {
    let width = (image.width() as f32 * factor) as i64;
    let height = (image.height() as f32 * factor) as i64;
    if width <= 0 || height <= 0 {
        return Err(Error::geometry(width, height));
    }
    stretch(image, width as u32, height as u32)
}

/// Fit the content into `width` x `height` keeping its aspect ratio, centred
/// on the sheet background.
pub fn resize(image: PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
    let (sw, sh) = (image.width() as u64, image.height() as u64);
    let w_ratio = width as f32 / sw as f32;
    let h_ratio = height as f32 / sh as f32;
    let (ww, hh) = if w_ratio < h_ratio {
        (width, (sh * width as u64 / sw) as u32)
    } else if h_ratio < w_ratio {
        ((sw * height as u64 / sh) as u32, height)
    } else {
        (width, height)
    };
    let stretched = stretch(image, ww, hh)?;
    let mut target = stretched.blank_like(width, height)?;
    let into = target.bounds();
    stretched.center_into(into, &mut target);
    Ok(target)
}

/// Move the content by `(dx, dy)`, filling the uncovered area with background.
pub fn shift(image: PixelBuffer, dx: i32, dy: i32) -> Result<PixelBuffer> {
    if dx == 0 && dy == 0 {
        return Ok(image);
    }
    let mut target = image.blank_like(image.width(), image.height())?;
    image.copy_into(Point::new(dx, dy), &mut target);
    Ok(target)
}

/// Mirror in place along the given directions.
pub fn mirror(image: &mut PixelBuffer, directions: Directions) {
    if directions.is_empty() {
        return;
    }
    let (w, h) = (image.width() as i32, image.height() as i32);
    // Each pair is swapped from whichever of its pixels comes first.
    for y in 0..h {
        let yy = if directions.vertical { h - y - 1 } else { y };
        for x in 0..w {
            let xx = if directions.horizontal { w - x - 1 } else { x };
            if (yy, xx) <= (y, x) {
                continue;
            }
            let (a, b) = (image.get(x, y), image.get(xx, yy));
            image.set(x, y, b);
            image.set(xx, yy, a);
        }
    }
}

/// Rotate by 90 degrees: clockwise for a positive `direction`, otherwise
/// anti-clockwise.
pub fn flip_rotate(image: PixelBuffer, direction: i32) -> Result<PixelBuffer> {
    let direction = direction.signum();
    let (w, h) = (image.width() as i32, image.height() as i32);
    let mut target = image.blank_like(image.height(), image.width())?;
    for y in 0..h {
        let xx = if direction > 0 { h - 1 } else { 0 } - y * direction;
        for x in 0..w {
            let yy = if direction < 0 { w - 1 } else { 0 } + x * direction;
            target.set(xx, yy, image.get(x, y));
        }
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{gray_pixel, BitDepth, BLACK, WHITE};
    use crate::geometry::Rect;

    fn sheet(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::new(w, h, BitDepth::Eight, false, WHITE).unwrap()
    }

    fn pattern(w: u32, h: u32) -> PixelBuffer {
        let mut img = PixelBuffer::new(w, h, BitDepth::Eight, true, WHITE).unwrap();
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                img.set(x, y, Rgb([(x * 20) as u8, (y * 30) as u8, ((x + y) * 7) as u8]));
            }
        }
        img
    }

    fn same_pixels(a: &PixelBuffer, b: &PixelBuffer) -> bool {
        a.dimensions() == b.dimensions()
            && (0..a.height() as i32)
                .all(|y| (0..a.width() as i32).all(|x| a.get(x, y) == b.get(x, y)))
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        for (w, h) in [(7, 5), (8, 6), (1, 1), (9, 9)] {
            let src = pattern(w, h);
            let mut dst = src.blank_like(w, h).unwrap();
            rotate(&src, &mut dst, 0.0);
            assert!(same_pixels(&src, &dst), "{}x{}", w, h);
        }
    }

    #[test]
    fn test_rotate_positive_turns_clockwise() {
        let mut src = sheet(101, 101);
        src.fill_rect(Rect::new(0, 50, 100, 50), BLACK);
        let mut dst = src.blank_like(101, 101).unwrap();
        rotate(&src, &mut dst, 0.1);
        assert_eq!(dst.grayscale(50, 50), BLACK);
        assert_eq!(dst.grayscale(100, 55), BLACK);
        assert_eq!(dst.grayscale(100, 50), WHITE);
    }

    #[test]
    fn test_qpixels_round_trip() {
        let img = pattern(5, 3);
        let q = to_qpixels(&img).unwrap();
        assert_eq!(q.dimensions(), (10, 6));
        assert_eq!(q.get(9, 5), img.get(4, 2));
        assert!(same_pixels(&from_qpixels(&q).unwrap(), &img));
    }

    #[test]
    fn test_from_qpixels_averages_blocks() {
        let mut q = sheet(2, 2);
        q.set(0, 0, gray_pixel(0));
        q.set(1, 1, gray_pixel(1));
        let img = from_qpixels(&q).unwrap();
        assert_eq!(img.grayscale(0, 0), ((255 * 2 + 1) / 4) as u8);
    }

    #[test]
    fn test_stretch_shrink_and_enlarge() {
        let mut img = sheet(10, 2);
        img.fill_rect(Rect::new(0, 0, 2, 1), BLACK);
        let small = stretch(img, 4, 1).unwrap();
        assert_eq!(small.dimensions(), (4, 1));
        // Blocks are 3, 2, 3, 2 pixels wide.
        assert_eq!(small.grayscale(0, 0), BLACK);
        assert_eq!(small.grayscale(1, 0), WHITE);

        let mut img = sheet(2, 2);
        img.set(1, 1, gray_pixel(BLACK));
        let big = stretch(img, 4, 4).unwrap();
        assert_eq!(big.grayscale(3, 3), BLACK);
        assert_eq!(big.grayscale(2, 2), BLACK);
        assert_eq!(big.grayscale(1, 1), WHITE);
    }

    #[test]
    fn test_zoom_rejects_empty_result() {
        assert!(matches!(zoom(sheet(4, 4), 0.1), Err(Error::InvalidGeometry { .. })));
        assert_eq!(zoom(sheet(4, 4), 0.5).unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn test_resize_keeps_aspect() {
        let mut img = sheet(20, 10);
        img.fill_rect(img.bounds(), BLACK);
        let out = resize(img, 10, 10).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        // Content is 10x5, centred vertically.
        assert_eq!(out.grayscale(5, 1), WHITE);
        assert_eq!(out.grayscale(5, 2), BLACK);
        assert_eq!(out.grayscale(5, 6), BLACK);
        assert_eq!(out.grayscale(5, 7), WHITE);
    }

    #[test]
    fn test_shift_fills_background() {
        let mut img = sheet(5, 5);
        img.fill_rect(img.bounds(), BLACK);
        let out = shift(img, 2, -1).unwrap();
        assert_eq!(out.grayscale(0, 0), WHITE);
        assert_eq!(out.grayscale(2, 0), BLACK);
        assert_eq!(out.grayscale(4, 4), WHITE);
        assert_eq!(out.count_pixels_in(out.bounds(), 0, 0), 12);
    }

    #[test]
    fn test_mirror_both_directions() {
        let img = pattern(5, 3);
        let mut mirrored = img.clone();
        mirror(&mut mirrored, Directions::BOTH);
        assert_eq!(mirrored.get(0, 0), img.get(4, 2));
        assert_eq!(mirrored.get(2, 1), img.get(2, 1));
        assert_eq!(mirrored.get(1, 1), img.get(3, 1));
        mirror(&mut mirrored, Directions::BOTH);
        assert!(same_pixels(&mirrored, &img));

        let mut flipped = img.clone();
        mirror(&mut flipped, Directions::HORIZONTAL);
        assert_eq!(flipped.get(0, 2), img.get(4, 2));
    }

    #[test]
    fn test_flip_rotate_clockwise() {
        let img = pattern(3, 2);
        let rotated = flip_rotate(img.clone(), 1).unwrap();
        assert_eq!(rotated.dimensions(), (2, 3));
        // Top-left goes to top-right.
        assert_eq!(rotated.get(1, 0), img.get(0, 0));
        assert_eq!(rotated.get(0, 2), img.get(2, 1));
        let back = flip_rotate(rotated, -1).unwrap();
        assert!(same_pixels(&back, &img));
    }
}
