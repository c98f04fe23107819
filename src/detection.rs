use tracing::debug;

use crate::buffer::{black_max, PixelBuffer, WHITE};
use crate::config::{BorderScanConfig, MaskScanConfig};
use crate::error::Result;
use crate::geometry::{Axes, Border, Edges, Point, Rect, Shift};

/// Result of a mask scan around one seed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedMask {
    pub rect: Rect,
    /// False if the detected size was out of bounds and `rect` is the
    /// fallback rectangle around the seed.
    pub found: bool,
}

/// Slide a scan bar outward from `start` by `shift` until its blackness
/// drops below `threshold` times the running average, or to zero.
///
/// `shift` moves along one axis only. The bar is `size` wide along the shift
/// and `depth` long across it; a `None` depth spans the sheet.
///
/// Returns the number of steps taken, including the final one.
pub fn detect_edge(
    image: &PixelBuffer,
    start: Point,
    shift: (i32, i32),
    size: u32,
    depth: Option<u32>,
    threshold: f32,
) -> i32 {
    let half = size as i32 / 2;
    let mut bar = if shift.1 == 0 {
        let half_depth = depth.unwrap_or(image.height()) as i32 / 2;
        Rect::new(
            start.x - half,
            start.y - half_depth,
            start.x + half,
            start.y + half_depth,
        )
    } else {
        let half_depth = depth.unwrap_or(image.width()) as i32 / 2;
        Rect::new(
            start.x - half_depth,
            start.y - half,
            start.x + half_depth,
            start.y + half,
        )
    };

    let mut total: i64 = 0;
    let mut count = 0;
    loop {
        let blackness = (WHITE - image.average_grayscale(bar)) as i64;
        total += blackness;
        count += 1;
        // Everything outside the sheet reads white, so this always ends.
        if (blackness as f32) < threshold * total as f32 / count as f32 || blackness == 0 {
            return count;
        }
        bar = bar.translate(shift.0, shift.1);
    }
}

/// Find the content rectangle around `point` by scanning outward in the
/// configured directions. Disabled directions span the whole sheet.
pub fn detect_mask(image: &PixelBuffer, point: Point, config: &MaskScanConfig) -> DetectedMask {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let half = Axes::new(
        config.size.horizontal as i32 / 2,
        config.size.vertical as i32 / 2,
    );
    let step = Axes::new(
        config.step.horizontal as i32,
        config.step.vertical as i32,
    );
    let mut rect = Rect::sheet(image.width(), image.height());

    if config.directions.horizontal {
        let scan = |dx| {
            detect_edge(
                image,
                point,
                (dx, 0),
                config.size.horizontal,
                config.depth.horizontal,
                config.threshold.horizontal,
            )
        };
        rect.left = point.x - step.horizontal * scan(-step.horizontal) - half.horizontal;
        rect.right = point.x + step.horizontal * scan(step.horizontal) + half.horizontal;
    }
    if config.directions.vertical {
        let scan = |dy| {
            detect_edge(
                image,
                point,
                (0, dy),
                config.size.vertical,
                config.depth.vertical,
                config.threshold.vertical,
            )
        };
        rect.top = point.y - step.vertical * scan(-step.vertical) - half.vertical;
        rect.bottom = point.y + step.vertical * scan(step.vertical) + half.vertical;
    }

    let mut found = true;
    let out_of_bounds = |extent: i32, min: Option<u32>, max: Option<u32>| {
        min.is_some_and(|min| extent < min as i32) || max.is_some_and(|max| extent > max as i32)
    };
    if out_of_bounds(
        rect.right - rect.left,
        config.minimum.horizontal,
        config.maximum.horizontal,
    ) {
        let half_width = config.maximum.horizontal.map_or(width, |m| m as i32) / 2;
        rect.left = point.x - half_width;
        rect.right = point.x + half_width;
        found = false;
    }
    if out_of_bounds(
        rect.bottom - rect.top,
        config.minimum.vertical,
        config.maximum.vertical,
    ) {
        let half_height = config.maximum.vertical.map_or(height, |m| m as i32) / 2;
        rect.top = point.y - half_height;
        rect.bottom = point.y + half_height;
        found = false;
    }
    debug!(x = point.x, y = point.y, ?rect, found, "mask scan");
    DetectedMask { rect, found }
}

/// Detect a mask around every seed point, keeping the ones with bounds.
pub fn detect_masks(
    image: &PixelBuffer,
    points: &[Point],
    config: &MaskScanConfig,
) -> Vec<DetectedMask> {
    if config.directions.is_empty() {
        return Vec::new();
    }
    points
        .iter()
        .map(|&p| detect_mask(image, p, config))
        .filter(|m| m.rect.is_valid())
        .collect()
}

/// Width of the blank band on one side of `outside`, scanning inward by
/// `step` with bands of `size`. Zero if no band reaches `threshold` dark pixels.
pub fn detect_border_edge(
    image: &PixelBuffer,
    outside: Rect,
    step: (i32, i32),
    size: i32,
    threshold: u32,
    black_max: u8,
) -> i32 {
    let (mut band, max) = if step.1 == 0 {
        let band = if step.0 > 0 {
            Rect::new(outside.left, outside.top, outside.left + size, outside.bottom)
        } else {
            Rect::new(outside.right - size, outside.top, outside.right, outside.bottom)
        };
        (band, outside.right - outside.left)
    } else {
        let band = if step.1 > 0 {
            Rect::new(outside.left, outside.top, outside.right, outside.top + size)
        } else {
            Rect::new(outside.left, outside.bottom - size, outside.right, outside.bottom)
        };
        (band, outside.bottom - outside.top)
    };

    let advance = (step.0 + step.1).abs();
    let mut result = 0;
    while result < max {
        if image.count_pixels_in(band, 0, black_max) >= threshold as u64 {
            return result;
        }
        band = band.translate(step.0, step.1);
        result += advance;
    }
    0
}

/// Blank border around the content inside `outside`.
pub fn detect_border(
    image: &PixelBuffer,
    outside: Rect,
    config: &BorderScanConfig,
    black_threshold: f32,
) -> Border {
    let mut border = Border {
        left: outside.left,
        top: outside.top,
        right: image.width() as i32 - outside.right,
        bottom: image.height() as i32 - outside.bottom,
    };
    let black_max = black_max(black_threshold);
    if config.directions.horizontal {
        let (step, size) = (config.step.horizontal as i32, config.size.horizontal as i32);
        let threshold = config.threshold.horizontal;
        border.left += detect_border_edge(image, outside, (step, 0), size, threshold, black_max);
        border.right += detect_border_edge(image, outside, (-step, 0), size, threshold, black_max);
    }
    if config.directions.vertical {
        let (step, size) = (config.step.vertical as i32, config.size.vertical as i32);
        let threshold = config.threshold.vertical;
        border.top += detect_border_edge(image, outside, (0, step), size, threshold, black_max);
        border.bottom += detect_border_edge(image, outside, (0, -step), size, threshold, black_max);
    }
    debug!(?border, "border scan");
    border
}

/// Move the pixels of `mask` to `(x, y)`, clearing the old location to the
/// sheet background first.
fn move_area(image: &mut PixelBuffer, mask: Rect, x: i32, y: i32) -> Result<()> {
    let mut scratch = image.blank_like(mask.width() as u32, mask.height() as u32)?;
    image.copy_area(mask, Point::new(0, 0), &mut scratch);
    let background = image.background();
    image.fill_rect(mask, background);
    scratch.copy_into(Point::new(x, y), image);
    Ok(())
}

/// Centre the content of `mask` on `center`.
///
/// Returns the applied displacement; nothing moves, and zero is returned,
/// if the centred rectangle would not fit on the sheet.
pub fn center_mask(image: &mut PixelBuffer, center: Point, mask: Rect) -> Result<Shift> {
    let (width, height) = (mask.width(), mask.height());
    let target_x = center.x - width / 2;
    let target_y = center.y - height / 2;
    let fits = target_x >= 0
        && target_y >= 0
        && target_x + width <= image.width() as i32
        && target_y + height <= image.height() as i32;
    if !fits {
        debug!(?mask, "centred mask does not fit on the sheet, not moved");
        return Ok(Shift::default());
    }
    move_area(image, mask, target_x, target_y)?;
    Ok(Shift::new(target_x - mask.left, target_y - mask.top))
}

/// Align the content of `mask` against the `align` edges of `outside`,
/// keeping `margin` away from them. Axes without an edge are centred.
pub fn align_mask(
    image: &mut PixelBuffer,
    mask: Rect,
    outside: Rect,
    align: Edges,
    margin: Axes<i32>,
) -> Result<Shift> {
    let (width, height) = (mask.width(), mask.height());
    let target_x = if align.left {
        outside.left + margin.horizontal
    } else if align.right {
        outside.right - width - margin.horizontal
    } else {
        (outside.left + outside.right - width) / 2
    };
    let target_y = if align.top {
        outside.top + margin.vertical
    } else if align.bottom {
        outside.bottom - height - margin.vertical
    } else {
        (outside.top + outside.bottom - height) / 2
    };
    move_area(image, mask, target_x, target_y)?;
    Ok(Shift::new(target_x - mask.left, target_y - mask.top))
}

/// Set every pixel outside all `masks` to `value`. No masks means no change.
pub fn apply_masks(image: &mut PixelBuffer, masks: &[Rect], value: u8) -> u64 {
    if masks.is_empty() {
        return 0;
    }
    let (width, height) = (image.width() as i32, image.height() as i32);
    let mut changed = 0;
    for y in 0..height {
        for x in 0..width {
            let p = Point::new(x, y);
            if !masks.iter().any(|m| m.contains(p)) && image.set_black_or_white(x, y, value) {
                changed += 1;
            }
        }
    }
    changed
}

/// Fill every wipe area with `value`.
pub fn apply_wipes(image: &mut PixelBuffer, wipes: &[Rect], value: u8) -> u64 {
    wipes.iter().map(|&w| image.fill_rect(w, value)).sum()
}

/// Fill the border band around the sheet with `value`.
pub fn apply_border(image: &mut PixelBuffer, border: Border, value: u8) -> u64 {
    if border.is_empty() {
        return 0;
    }
    let mask = border.to_mask(image.width(), image.height());
    apply_masks(image, &[mask], value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BitDepth, BLACK};
    use crate::geometry::Directions;

    fn sheet(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::new(w, h, BitDepth::Eight, false, WHITE).unwrap()
    }

    fn dark_pixels(img: &PixelBuffer, rect: Rect) -> u64 {
        img.count_pixels_in(rect, 0, 170)
    }

    fn scan_config() -> MaskScanConfig {
        MaskScanConfig {
            directions: Directions::BOTH,
            size: Axes::both(10),
            depth: Axes::both(None),
            step: Axes::both(1),
            threshold: Axes::both(0.5),
            minimum: Axes::both(None),
            maximum: Axes::both(None),
            points: Vec::new(),
        }
    }

    #[test]
    fn test_detect_edge_stops_on_blank() {
        let img = sheet(50, 50);
        assert_eq!(detect_edge(&img, Point::new(25, 25), (1, 0), 10, None, 0.5), 1);
    }

    #[test]
    fn test_detect_mask_finds_centered_block() {
        let mut img = sheet(200, 200);
        img.fill_rect(Rect::new(80, 80, 119, 119), BLACK);
        let mask = detect_mask(&img, Point::new(100, 100), &scan_config());
        assert!(mask.found);
        assert!((mask.rect.left - 80).abs() <= 10, "{:?}", mask.rect);
        assert!((mask.rect.right - 119).abs() <= 10, "{:?}", mask.rect);
        assert!((mask.rect.top - 80).abs() <= 10, "{:?}", mask.rect);
        assert!((mask.rect.bottom - 119).abs() <= 10, "{:?}", mask.rect);
    }

    #[test]
    fn test_detect_mask_falls_back_when_too_small() {
        let img = sheet(200, 100);
        let config = MaskScanConfig {
            minimum: Axes::both(Some(50)),
            maximum: Axes::new(Some(120), None),
            ..scan_config()
        };
        let mask = detect_mask(&img, Point::new(100, 50), &config);
        assert!(!mask.found);
        assert_eq!(mask.rect, Rect::new(40, 0, 160, 100));
    }

    #[test]
    fn test_detect_masks_without_directions_is_empty() {
        let img = sheet(20, 20);
        let config = MaskScanConfig {
            directions: Directions::NONE,
            ..scan_config()
        };
        assert!(detect_masks(&img, &[Point::new(10, 10)], &config).is_empty());
    }

    #[test]
    fn test_detect_border_around_block() {
        let mut img = sheet(100, 100);
        img.fill_rect(Rect::new(30, 30, 69, 69), BLACK);
        let config = BorderScanConfig {
            directions: Directions::BOTH,
            ..BorderScanConfig::default()
        };
        let border = detect_border(&img, img.bounds(), &config, 0.33);
        assert_eq!(
            border,
            Border {
                left: 25,
                top: 25,
                right: 26,
                bottom: 26
            }
        );
        let mask = border.to_mask(100, 100);
        assert!(mask.contains(Point::new(30, 30)) && mask.contains(Point::new(69, 69)));
    }

    #[test]
    fn test_detect_border_edge_blank_sheet_is_zero() {
        let img = sheet(60, 60);
        assert_eq!(detect_border_edge(&img, img.bounds(), (5, 0), 5, 5, 170), 0);
    }

    #[test]
    fn test_center_mask_moves_content() {
        let mut img = sheet(100, 100);
        let block = Rect::new(10, 10, 19, 19);
        img.fill_rect(block, BLACK);
        let shift = center_mask(&mut img, Point::new(50, 50), block).unwrap();
        assert_eq!(shift, Shift::new(35, 35));
        assert_eq!(dark_pixels(&img, Rect::new(45, 45, 54, 54)), 100);
        assert_eq!(dark_pixels(&img, img.bounds()), 100);
    }

    #[test]
    fn test_center_mask_that_does_not_fit_is_noop() {
        let mut img = sheet(100, 100);
        let block = Rect::new(0, 0, 59, 59);
        img.fill_rect(block, BLACK);
        let shift = center_mask(&mut img, Point::new(10, 10), block).unwrap();
        assert_eq!(shift, Shift::default());
        assert_eq!(dark_pixels(&img, block), 3600);
    }

    #[test]
    fn test_align_mask_left_top_and_centre() {
        let mut img = sheet(100, 100);
        let block = Rect::new(10, 10, 19, 19);
        img.fill_rect(block, BLACK);
        let bounds = img.bounds();
        let shift = align_mask(
            &mut img,
            block,
            bounds,
            Edges::new(true, true, false, false),
            Axes::both(0),
        )
        .unwrap();
        assert_eq!(shift, Shift::new(-10, -10));
        assert_eq!(dark_pixels(&img, Rect::new(0, 0, 9, 9)), 100);

        let moved = Rect::new(0, 0, 9, 9);
        let bounds = img.bounds();
        let shift = align_mask(&mut img, moved, bounds, Edges::NONE, Axes::both(0)).unwrap();
        assert_eq!(shift, Shift::new(44, 44));
        assert_eq!(dark_pixels(&img, Rect::new(44, 44, 53, 53)), 100);
    }

    #[test]
    fn test_apply_masks_and_wipes() {
        let mut img = sheet(10, 10);
        img.fill_rect(img.bounds(), BLACK);
        let changed = apply_masks(&mut img, &[Rect::new(0, 0, 4, 9)], WHITE);
        assert_eq!(changed, 50);
        assert_eq!(apply_masks(&mut img, &[], WHITE), 0);
        assert_eq!(apply_wipes(&mut img, &[Rect::new(0, 0, 1, 1)], WHITE), 4);
        let border = Border {
            left: 1,
            top: 0,
            right: 0,
            bottom: 0,
        };
        // Only column 0 lies outside; two of its pixels were already wiped.
        assert_eq!(apply_border(&mut img, border, WHITE), 8);
    }
}
