use image::Rgb;
use tracing::warn;

use crate::buffer::{grayscale, PixelBuffer};
use crate::geometry::Point;

/// Grayscale range of pixels that belong to the region being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillRange {
    pub min: u8,
    pub max: u8,
}

impl FillRange {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u8) -> bool {
        value >= self.min && value <= self.max
    }
}

const DIRECTIONS: [(i32, i32); 4] = [(-1, 0), (0, -1), (1, 0), (0, 1)];

/// Bounded flood fill starting at `seed`.
///
/// From every in-range seed a cross of four lines is painted, each line
/// tolerating up to `intensity - 1` consecutive out-of-range pixels. The
/// pixels directly beside every painted line pixel then become new seeds.
/// Seeds are kept on an explicit stack and visited in the same depth-first
/// order a recursive fill would use. Regions joined only through tendrils
/// narrower than the side probe may be missed.
///
/// Returns the number of pixels whose value changed.
pub fn flood_fill(
    image: &mut PixelBuffer,
    seed: Point,
    color: Rgb<u8>,
    range: FillRange,
    intensity: u32,
) -> u64 {
    if range.contains(grayscale(color)) {
        warn!(
            min = range.min,
            max = range.max,
            "flood fill colour lies inside its own fill range, skipping"
        );
        return 0;
    }

    let mut changed = 0;
    let mut stack = vec![seed];
    let mut probes = Vec::new();
    while let Some(p) = stack.pop() {
        if !range.contains(image.grayscale(p.x, p.y)) {
            continue;
        }
        if image.set(p.x, p.y, color) {
            changed += 1;
        }
        let mut lengths = [0; 4];
        for (length, &(sx, sy)) in lengths.iter_mut().zip(DIRECTIONS.iter()) {
            let (distance, painted) = fill_line(image, p, (sx, sy), color, range, intensity);
            *length = distance;
            changed += painted;
        }

        probes.clear();
        for (&distance, &(sx, sy)) in lengths.iter().zip(DIRECTIONS.iter()) {
            let (mut x, mut y) = (p.x, p.y);
            for _ in 0..distance {
                x += sx;
                y += sy;
                if sx != 0 {
                    probes.push(Point::new(x, y + 1));
                    probes.push(Point::new(x, y - 1));
                } else {
                    probes.push(Point::new(x + 1, y));
                    probes.push(Point::new(x - 1, y));
                }
            }
        }
        stack.extend(probes.drain(..).rev());
    }
    changed
}

/// Paint outward from `start` (exclusive) along `step` until more than
/// `intensity - 1` consecutive pixels fall outside `range` or the sheet ends.
///
/// Returns the painted line length and how many of its pixels changed.
fn fill_line(
    image: &mut PixelBuffer,
    start: Point,
    step: (i32, i32),
    color: Rgb<u8>,
    range: FillRange,
    intensity: u32,
) -> (u32, u64) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let (mut x, mut y) = (start.x, start.y);
    let mut distance = 0;
    let mut changed = 0;
    // The first pixel must match.
    let mut tolerance = 1i64;
    loop {
        x += step.0;
        y += step.1;
        if range.contains(image.grayscale(x, y)) {
            tolerance = intensity as i64;
        } else {
            tolerance -= 1;
        }
        if tolerance > 0 && x >= 0 && x < width && y >= 0 && y < height {
            if image.set(x, y, color) {
                changed += 1;
            }
            distance += 1;
        } else {
            return (distance, changed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{gray_pixel, BitDepth, BLACK, WHITE, WHITE_PIXEL};
    use crate::geometry::Rect;

    fn sheet() -> PixelBuffer {
        PixelBuffer::new(30, 30, BitDepth::Eight, false, WHITE).unwrap()
    }

    #[test]
    fn test_fills_solid_block() {
        let mut img = sheet();
        let block = Rect::new(5, 5, 14, 12);
        img.fill_rect(block, BLACK);
        let range = FillRange::new(0, 170);
        let changed = flood_fill(&mut img, Point::new(9, 9), WHITE_PIXEL, range, 1);
        assert_eq!(changed, block.area() as u64);
        assert_eq!(img.count_pixels_in(img.bounds(), 0, 170), 0);
    }

    #[test]
    fn test_out_of_range_seed_is_noop() {
        let mut img = sheet();
        img.fill_rect(Rect::new(0, 0, 3, 3), BLACK);
        let range = FillRange::new(0, 170);
        assert_eq!(flood_fill(&mut img, Point::new(20, 20), WHITE_PIXEL, range, 5), 0);
        assert_eq!(img.count_pixels_in(img.bounds(), 0, 170), 16);
    }

    #[test]
    fn test_disconnected_region_survives() {
        let mut img = sheet();
        img.fill_rect(Rect::new(2, 2, 6, 6), BLACK);
        img.fill_rect(Rect::new(20, 20, 24, 24), BLACK);
        flood_fill(&mut img, Point::new(3, 3), WHITE_PIXEL, FillRange::new(0, 170), 1);
        assert_eq!(img.count_pixels_in(img.bounds(), 0, 170), 25);
    }

    #[test]
    fn test_intensity_bridges_light_gap() {
        let mut img = sheet();
        img.fill_rect(Rect::new(2, 10, 8, 10), BLACK);
        img.fill_rect(Rect::new(11, 10, 16, 10), BLACK);
        // Gap of two white pixels at x = 9, 10.
        let mut bridged = img.clone();
        flood_fill(&mut bridged, Point::new(2, 10), WHITE_PIXEL, FillRange::new(0, 170), 3);
        assert_eq!(bridged.count_pixels_in(bridged.bounds(), 0, 170), 0);

        flood_fill(&mut img, Point::new(2, 10), WHITE_PIXEL, FillRange::new(0, 170), 1);
        assert_eq!(img.count_pixels_in(img.bounds(), 0, 170), 6);
    }

    #[test]
    fn test_colour_inside_range_is_rejected() {
        let mut img = sheet();
        img.fill_rect(Rect::new(2, 2, 4, 4), BLACK);
        let range = FillRange::new(0, 170);
        assert_eq!(flood_fill(&mut img, Point::new(3, 3), gray_pixel(10), range, 2), 0);
    }
}
