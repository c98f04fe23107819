use tracing::debug;

use crate::buffer::{black_max, white_min, PixelBuffer, WHITE, WHITE_PIXEL};
use crate::config::{BlackFilterConfig, BlurFilterConfig, GrayFilterConfig, NoiseFilterConfig};
use crate::flood::{flood_fill, FillRange};
use crate::geometry::{Point, Rect};

/// Remove solidly black areas such as photocopier smears.
///
/// Strips of `size` x `depth` are moved across the sheet in the enabled
/// directions. Where a strip's average darkness reaches the threshold and
/// the strip does not overlap an excluded area, every black pixel reachable
/// from it is flood-filled white.
///
/// Returns the number of pixels changed.
pub fn black_filter(
    image: &mut PixelBuffer,
    config: &BlackFilterConfig,
    exclude: &[Rect],
    black_threshold: f32,
) -> u64 {
    let mut changed = 0;
    if config.directions.horizontal {
        changed += black_filter_scan(
            image,
            config,
            exclude,
            black_threshold,
            (config.step.horizontal.max(1) as i32, 0),
            config.size.horizontal as i32,
            config.depth.horizontal as i32,
        );
    }
    if config.directions.vertical {
        changed += black_filter_scan(
            image,
            config,
            exclude,
            black_threshold,
            (0, config.step.vertical.max(1) as i32),
            config.size.vertical as i32,
            config.depth.vertical as i32,
        );
    }
    debug!(changed, "black filter");
    changed
}

fn black_filter_scan(
    image: &mut PixelBuffer,
    config: &BlackFilterConfig,
    exclude: &[Rect],
    black_threshold: f32,
    step: (i32, i32),
    size: i32,
    depth: i32,
) -> u64 {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let range = FillRange::new(0, black_max(black_threshold));
    let needed = WHITE as f32 * config.threshold;

    // Stripes run along the scan direction and are stacked across it.
    let (mut stripe, shift) = if step.0 != 0 {
        (Rect::new(0, 0, size - 1, depth - 1), (0, depth))
    } else {
        (Rect::new(0, 0, depth - 1, size - 1), (depth, 0))
    };

    let mut changed = 0;
    while stripe.left < width && stripe.top < height {
        let mut strip = stripe;
        // The last stripe is pulled back inside the sheet on the axis it overruns.
        let overrun = ((strip.right - width + 1).max(0), (strip.bottom - height + 1).max(0));
        strip = strip.translate(-overrun.0, -overrun.1);
        while strip.left < width && strip.top < height {
            let blackness = WHITE - image.average_darkness_inverse(strip);
            if blackness as f32 >= needed && !strip.overlaps_any(exclude) {
                for y in strip.top..=strip.bottom {
                    for x in strip.left..=strip.right {
                        changed += flood_fill(
                            image,
                            Point::new(x, y),
                            WHITE_PIXEL,
                            range,
                            config.intensity,
                        );
                    }
                }
            }
            strip = strip.translate(step.0, step.1);
        }
        stripe = stripe.translate(shift.0, shift.1);
    }
    changed
}

/// Remove isolated clusters of at most `intensity` dark pixels.
///
/// Returns the number of pixels cleared.
pub fn noise_filter(
    image: &mut PixelBuffer,
    config: &NoiseFilterConfig,
    white_threshold: f32,
) -> u64 {
    let white_min = white_min(white_threshold);
    let intensity = config.intensity as i32;
    let (width, height) = (image.width() as i32, image.height() as i32);
    let mut cleared = 0;
    for y in 0..height {
        for x in 0..width {
            if image.darkness_inverse(x, y) >= white_min {
                continue;
            }
            if count_neighbors(image, x, y, intensity, white_min) <= intensity as u64 {
                cleared += clear_neighbors(image, x, y, white_min);
            }
        }
    }
    debug!(cleared, "noise filter");
    cleared
}

/// Pixels on the square ring at L-infinity distance `level` around `(x, y)`.
fn ring(x: i32, y: i32, level: i32) -> impl Iterator<Item = (i32, i32)> {
    let rows = (x - level..=x + level).flat_map(move |xx| [(xx, y - level), (xx, y + level)]);
    let cols = (y - level + 1..y + level).flat_map(move |yy| [(x - level, yy), (x + level, yy)]);
    rows.chain(cols)
}

/// Dark pixels reachable from `(x, y)` ring by ring, stopping at the first
/// empty ring or after `intensity` rings. The start pixel counts as one.
fn count_neighbors(image: &PixelBuffer, x: i32, y: i32, intensity: i32, white_min: u8) -> u64 {
    let mut count = 1;
    for level in 1..=intensity {
        let ring_count = ring(x, y, level)
            .filter(|&(xx, yy)| image.lightness(xx, yy) < white_min)
            .count() as u64;
        if ring_count == 0 {
            break;
        }
        count += ring_count;
    }
    count
}

/// Clear `(x, y)` and its dark rings up to the first empty one.
fn clear_neighbors(image: &mut PixelBuffer, x: i32, y: i32, white_min: u8) -> u64 {
    let mut cleared = image.clear(x, y) as u64;
    for level in 1.. {
        let mut found = false;
        for (xx, yy) in ring(x, y, level) {
            if image.lightness(xx, yy) < white_min {
                found = true;
                cleared += image.clear(xx, yy) as u64;
            }
        }
        if !found {
            break;
        }
    }
    cleared
}

/// Clear windows that stay sparse even when shaken diagonally by one step.
///
/// Returns the number of pixels cleared.
pub fn blur_filter(
    image: &mut PixelBuffer,
    config: &BlurFilterConfig,
    white_threshold: f32,
) -> u64 {
    let white_min = white_min(white_threshold);
    let (width, height) = (image.width() as i32, image.height() as i32);
    let (size_x, size_y) = (config.size.horizontal as i32, config.size.vertical as i32);
    let (step_x, step_y) = (
        config.step.horizontal.max(1) as i32,
        config.step.vertical.max(1) as i32,
    );
    let total = (size_x as i64 * size_y as i64) as f32;

    let mut window = Rect::new(0, 0, size_x - 1, size_y - 1);
    let mut cleared = 0;
    loop {
        let max = [(0, 0), (-1, -1), (1, -1), (-1, 1), (1, 1)]
            .iter()
            .map(|&(sx, sy)| {
                image.count_pixels_in(window.translate(sx * step_x, sy * step_y), 0, white_min)
            })
            .max()
            .unwrap_or(0);
        if max as f32 / total <= config.intensity {
            cleared += image.count_pixels(window, 0, white_min, true);
        }

        if window.right < width {
            window = window.translate(step_x, 0);
        } else if window.bottom >= height {
            break;
        } else {
            window = Rect::new(0, window.top + step_y, size_x - 1, window.bottom + step_y);
        }
    }
    debug!(cleared, "blur filter");
    cleared
}

/// Clear windows that hold no black pixel and only a faint shade of gray.
///
/// Returns the number of pixels changed.
pub fn gray_filter(
    image: &mut PixelBuffer,
    config: &GrayFilterConfig,
    black_threshold: f32,
) -> u64 {
    let black_max = black_max(black_threshold);
    let threshold = (WHITE as f32 * config.threshold) as i32;
    let (width, height) = (image.width() as i32, image.height() as i32);
    let (size_x, size_y) = (config.size.horizontal as i32, config.size.vertical as i32);
    let (step_x, step_y) = (
        config.step.horizontal.max(1) as i32,
        config.step.vertical.max(1) as i32,
    );

    let mut window = Rect::new(0, 0, size_x - 1, size_y - 1);
    let mut changed = 0;
    loop {
        if image.count_pixels_in(window, 0, black_max) == 0 {
            let deficit = WHITE as i32 - image.average_lightness(window) as i32;
            if deficit < threshold {
                changed += image.fill_rect(window, WHITE);
            }
        }

        if window.left < width {
            window = window.translate(step_x, 0);
        } else if window.bottom >= height {
            break;
        } else {
            window = Rect::new(0, window.top + step_y, size_x - 1, window.bottom + step_y);
        }
    }
    debug!(changed, "gray filter");
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BitDepth, BLACK};
    use crate::geometry::{Axes, Directions};

    fn sheet(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::new(w, h, BitDepth::Eight, false, WHITE).unwrap()
    }

    fn dark_pixels(img: &PixelBuffer) -> u64 {
        img.count_pixels_in(img.bounds(), 0, 170)
    }

    fn black_config() -> BlackFilterConfig {
        BlackFilterConfig {
            directions: Directions::HORIZONTAL,
            size: Axes::both(20),
            depth: Axes::both(20),
            step: Axes::both(5),
            threshold: 0.95,
            exclude: Vec::new(),
            intensity: 20,
        }
    }

    #[test]
    fn test_black_filter_clears_solid_square() {
        let mut img = sheet(200, 200);
        img.fill_rect(Rect::new(20, 20, 39, 39), BLACK);
        let changed = black_filter(&mut img, &black_config(), &[], 0.33);
        assert_eq!(changed, 400);
        assert_eq!(dark_pixels(&img), 0);
    }

    #[test]
    fn test_black_filter_respects_exclusion() {
        let mut img = sheet(200, 200);
        img.fill_rect(Rect::new(20, 20, 39, 39), BLACK);
        let changed = black_filter(&mut img, &black_config(), &[Rect::new(10, 10, 50, 50)], 0.33);
        assert_eq!(changed, 0);
        assert_eq!(dark_pixels(&img), 400);
    }

    #[test]
    fn test_black_filter_ignores_thin_lines() {
        let mut img = sheet(200, 200);
        img.fill_rect(Rect::new(0, 100, 199, 101), BLACK);
        assert_eq!(black_filter(&mut img, &BlackFilterConfig::default(), &[], 0.33), 0);
    }

    #[test]
    fn test_noise_filter_removes_small_speckle() {
        let mut img = sheet(50, 50);
        img.fill_rect(Rect::new(10, 10, 11, 11), BLACK);
        let cleared = noise_filter(&mut img, &NoiseFilterConfig { intensity: 4 }, 0.9);
        assert_eq!(cleared, 4);
        assert_eq!(dark_pixels(&img), 0);
    }

    #[test]
    fn test_noise_filter_keeps_larger_cluster() {
        let mut img = sheet(50, 50);
        img.fill_rect(Rect::new(10, 10, 13, 11), BLACK);
        let cleared = noise_filter(&mut img, &NoiseFilterConfig { intensity: 2 }, 0.9);
        assert_eq!(cleared, 0);
        assert_eq!(dark_pixels(&img), 8);
    }

    #[test]
    fn test_noise_filter_measures_clusters_by_rings() {
        let mut img = sheet(50, 50);
        // 5x5 block: the rings around any of its pixels hold more than four.
        img.fill_rect(Rect::new(10, 10, 14, 14), BLACK);
        img.fill_rect(Rect::new(35, 35, 36, 36), BLACK);
        img.fill_rect(Rect::new(5, 45, 8, 45), BLACK);
        let cleared = noise_filter(&mut img, &NoiseFilterConfig { intensity: 4 }, 0.9);
        assert_eq!(cleared, 8);
        assert_eq!(dark_pixels(&img), 25);
        assert_eq!(img.count_pixels_in(Rect::new(10, 10, 14, 14), 0, 170), 25);
    }

    #[test]
    fn test_ring_covers_square_perimeter() {
        let mut points: Vec<_> = ring(0, 0, 1).collect();
        points.sort();
        assert_eq!(points.len(), 8);
        assert!(!points.contains(&(0, 0)));
        assert_eq!(ring(5, 5, 2).count(), 16);
    }

    #[test]
    fn test_blur_filter_clears_sparse_dots() {
        let mut img = sheet(300, 300);
        img.fill_rect(Rect::new(80, 80, 119, 119), BLACK);
        img.fill_rect(Rect::new(250, 250, 252, 252), BLACK);
        let cleared = blur_filter(&mut img, &BlurFilterConfig::default(), 0.9);
        assert_eq!(cleared, 9);
        assert_eq!(dark_pixels(&img), 1600);
    }

    #[test]
    fn test_gray_filter_clears_faint_patch_only() {
        let mut img = sheet(100, 100);
        img.fill_rect(Rect::new(10, 10, 29, 29), 200);
        img.fill_rect(Rect::new(60, 60, 79, 79), BLACK);
        let changed = gray_filter(&mut img, &GrayFilterConfig::default(), 0.33);
        assert_eq!(changed, 400);
        assert_eq!(img.count_pixels_in(img.bounds(), 0, 254), 400);
        assert_eq!(img.grayscale(65, 65), BLACK);
    }
}
