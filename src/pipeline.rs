use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::buffer::{BitDepth, PixelBuffer};
use crate::config::{Layout, SheetConfig, SizeStages, Stage};
use crate::deskew::{detect_rotation, rotate_area};
use crate::detection::{
    align_mask, apply_border, apply_masks, apply_wipes, center_mask, detect_border, detect_masks,
    DetectedMask,
};
use crate::error::{Error, Result};
use crate::filters::{black_filter, blur_filter, gray_filter, noise_filter};
use crate::geometry::{Axes, Border, Point, Rect, Shift};
use crate::transform::{flip_rotate, from_qpixels, mirror, resize, shift, stretch, to_qpixels, zoom};

/// The decoded pages of one sheet. `None` stands for a blank page.
#[derive(Debug, Default)]
pub struct SheetInput {
    pub pages: Vec<Option<PixelBuffer>>,
}

impl SheetInput {
    pub fn single(page: PixelBuffer) -> Self {
        Self {
            pages: vec![Some(page)],
        }
    }
}

/// Pixels changed by each filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub black: u64,
    pub noise: u64,
    pub blur: u64,
    pub gray: u64,
}

/// What happened to one sheet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SheetReport {
    pub sheet: u32,
    pub width: u32,
    pub height: u32,
    /// Sheet size when masks and borders were detected.
    pub scan_size: (u32, u32),
    pub filtered: FilterCounts,
    /// Content masks, in the coordinates after the last detection.
    pub masks: Vec<Rect>,
    /// Per mask, whether its size was within bounds.
    pub masks_found: Vec<bool>,
    /// Correction applied per mask, in degrees; positive turns clockwise.
    pub rotations: Vec<f64>,
    pub borders: Vec<Border>,
    /// Total displacement from centring and border alignment.
    pub drift: Shift,
}

impl SheetReport {
    /// Masks and border areas moved onto output page `page` of `count`.
    ///
    /// Only meaningful when no post stage moved or resized the sheet.
    pub fn page_outlines(&self, page: usize, count: usize) -> (Vec<Rect>, Vec<Rect>) {
        let (width, height) = self.scan_size;
        let offset = -(width as i32 * page as i32 / count.max(1) as i32);
        let masks = self.masks.iter().map(|r| r.translate(offset, 0)).collect();
        let borders = self
            .borders
            .iter()
            .map(|b| b.to_mask(width, height).translate(offset, 0))
            .collect();
        (masks, borders)
    }
}

#[derive(Debug)]
pub struct SheetOutput {
    pub pages: Vec<PixelBuffer>,
    pub report: SheetReport,
}

/// Size and format of a finished sheet, reused when a later sheet has no
/// pages to measure.
#[derive(Debug, Clone, Copy)]
struct SheetShape {
    width: u32,
    height: u32,
    bitdepth: BitDepth,
    color: bool,
}

/// Seeds, protected areas and border regions for one sheet, from the
/// configuration or the layout defaults.
#[derive(Debug)]
struct LayoutAreas {
    points: Vec<Point>,
    exclude: Vec<Rect>,
    outside: Vec<Rect>,
    mask_maximum: Axes<Option<u32>>,
    wipes: Vec<Rect>,
}

impl LayoutAreas {
    fn new(config: &SheetConfig, width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        let mut areas = Self {
            points: config.mask_scan.points.clone(),
            exclude: config.black_filter.exclude.clone(),
            outside: config.border_scan.outside.clone(),
            mask_maximum: config.mask_scan.maximum,
            wipes: config.wipe.clone(),
        };
        let maximum = match config.layout {
            Layout::Single => {
                if areas.points.is_empty() {
                    areas.points.push(Point::new(w / 2, h / 2));
                }
                if areas.exclude.is_empty() {
                    areas
                        .exclude
                        .push(Rect::new(w / 4, h / 4, w / 2 + w / 4, h / 2 + h / 4));
                }
                if areas.outside.is_empty() {
                    areas.outside.push(Rect::sheet(width, height));
                }
                Axes::new(width, height)
            }
            Layout::Double => {
                if areas.points.is_empty() {
                    areas.points.push(Point::new(w / 4, h / 2));
                    areas.points.push(Point::new(w - w / 4, h / 2));
                }
                let [left, right] = config.middle_wipe;
                if left > 0 || right > 0 {
                    areas
                        .wipes
                        .push(Rect::new(w / 2 - left, 0, w / 2 + right, h - 1));
                }
                if areas.exclude.is_empty() {
                    areas.exclude.push(Rect::new(
                        w / 8,
                        h / 4,
                        w / 4 + w / 8,
                        h / 2 + h / 4,
                    ));
                    areas.exclude.push(Rect::new(
                        w / 2 + w / 8,
                        h / 4,
                        w / 2 + w / 4 + w / 8,
                        h / 2 + h / 4,
                    ));
                }
                if areas.outside.is_empty() {
                    areas.outside.push(Rect::new(0, 0, w / 2, h - 1));
                    areas.outside.push(Rect::new(w / 2, 0, w - 1, h - 1));
                }
                Axes::new(width / 2, height)
            }
            Layout::None => Axes::new(width, height),
        };
        areas.mask_maximum = Axes::new(
            areas.mask_maximum.horizontal.or(Some(maximum.horizontal)),
            areas.mask_maximum.vertical.or(Some(maximum.vertical)),
        );
        areas
    }
}

/// Runs sheets through the correction stages one at a time.
///
/// The only state kept between sheets is the shape of the previous sheet,
/// used when a sheet consists of blank pages only.
#[derive(Debug)]
pub struct SheetProcessor {
    config: SheetConfig,
    previous: Option<SheetShape>,
}

impl SheetProcessor {
    pub fn new(config: SheetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            previous: None,
        })
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    /// Process sheet number `sheet` (1-based).
    #[instrument(skip_all, fields(sheet = sheet))]
    pub fn process(&mut self, sheet: u32, input: SheetInput) -> Result<SheetOutput> {
        let mut image = self.assemble(input)?;
        let config = &self.config;
        let skip = |stage: Stage| config.skip.skips(stage, sheet);

        let mut report = SheetReport {
            sheet,
            ..SheetReport::default()
        };
        let background = config.background;
        let black_threshold = config.black_threshold;

        mirror(&mut image, config.pre.mirror);
        image = shift(image, config.pre.shift.horizontal, config.pre.shift.vertical)?;
        apply_masks(&mut image, &config.pre_mask, background);
        image = rescale(image, &config.pre)?;

        let areas = LayoutAreas::new(config, image.width(), image.height());
        let mut mask_scan = config.mask_scan.clone();
        mask_scan.maximum = areas.mask_maximum;
        debug!(?areas, "layout");

        if !skip(Stage::Wipe) {
            apply_wipes(&mut image, &config.pre_wipe, background);
        }
        if !skip(Stage::Border) {
            apply_border(&mut image, config.pre_border, background);
        }

        if !skip(Stage::BlackFilter) {
            report.filtered.black =
                black_filter(&mut image, &config.black_filter, &areas.exclude, black_threshold);
        }
        if !skip(Stage::NoiseFilter) {
            report.filtered.noise =
                noise_filter(&mut image, &config.noise_filter, config.white_threshold);
        }
        if !skip(Stage::BlurFilter) {
            report.filtered.blur =
                blur_filter(&mut image, &config.blur_filter, config.white_threshold);
        }

        let mut masks: Vec<DetectedMask> = Vec::new();
        if !skip(Stage::MaskScan) {
            masks = detect_masks(&image, &areas.points, &mask_scan);
        }

        if !skip(Stage::GrayFilter) {
            report.filtered.gray = gray_filter(&mut image, &config.gray_filter, black_threshold);
        }

        if !skip(Stage::Deskew) {
            if !skip(Stage::MaskScan) {
                masks = detect_masks(&image, &areas.points, &mask_scan);
            }
            let (deskewed, rotations) = self.deskew(image, &masks)?;
            image = deskewed;
            report.rotations = rotations;
        }

        let centring = config.layout != Layout::None && masks.len() == areas.points.len();
        if !skip(Stage::MaskCenter) && centring {
            if !skip(Stage::MaskScan) {
                masks = detect_masks(&image, &areas.points, &mask_scan);
            }
            for (mask, &point) in masks.iter().zip(areas.points.iter()) {
                report.drift += center_mask(&mut image, point, mask.rect)?;
            }
        }
        report.masks = masks.iter().map(|m| m.rect).collect();
        report.masks_found = masks.iter().map(|m| m.found).collect();
        report.scan_size = image.dimensions();

        if !skip(Stage::Wipe) {
            apply_wipes(&mut image, &areas.wipes, background);
        }
        if !skip(Stage::Border) {
            apply_border(&mut image, config.border, background);
        }

        if !skip(Stage::BorderScan) {
            let (width, height) = image.dimensions();
            report.borders = areas
                .outside
                .iter()
                .map(|&outside| {
                    detect_border(&image, outside, &config.border_scan, black_threshold)
                })
                .collect();
            let border_masks: Vec<Rect> = report
                .borders
                .iter()
                .map(|b| b.to_mask(width, height))
                .collect();
            apply_masks(&mut image, &border_masks, background);
            if !skip(Stage::BorderAlign) {
                for (&mask, &outside) in border_masks.iter().zip(areas.outside.iter()) {
                    report.drift += align_mask(
                        &mut image,
                        mask,
                        outside,
                        config.border_scan.align,
                        config.border_scan.margin,
                    )?;
                }
            }
        }

        if !skip(Stage::Wipe) {
            apply_wipes(&mut image, &config.post_wipe, background);
        }
        if !skip(Stage::Border) {
            apply_border(&mut image, config.post_border, background);
        }

        mirror(&mut image, config.post.mirror);
        image = shift(image, config.post.shift.horizontal, config.post.shift.vertical)?;
        if config.post.rotate != 0 {
            image = flip_rotate(image, config.post.rotate.signum())?;
        }
        image = rescale(image, &config.post)?;

        if let Some(depth) = config.output_depth {
            image.set_bitdepth(depth);
        }
        report.width = image.width();
        report.height = image.height();
        info!(
            width = report.width,
            height = report.height,
            drift_x = report.drift.dx,
            drift_y = report.drift.dy,
            "sheet processed"
        );

        let pages = split(image, config.output_pages)?;
        Ok(SheetOutput { pages, report })
    }

    /// Place the input pages side by side on a new sheet, after the
    /// pre-rotation, and remember the sheet's shape.
    fn assemble(&mut self, input: SheetInput) -> Result<PixelBuffer> {
        let config = &self.config;
        let count = config.input_pages as usize;
        if input.pages.len() > count {
            return Err(Error::PageCount {
                expected: count,
                actual: input.pages.len(),
            });
        }

        let mut pages = Vec::with_capacity(count);
        for page in input.pages {
            pages.push(match page {
                Some(page) if config.pre.rotate != 0 => {
                    Some(flip_rotate(page, config.pre.rotate.signum())?)
                }
                page => page,
            });
        }
        pages.resize_with(count, || None);

        let first = pages.iter().flatten().next();
        let shape = match first {
            Some(first) => SheetShape {
                width: config
                    .sheet_size
                    .horizontal
                    .unwrap_or(first.width() * count as u32),
                height: config.sheet_size.vertical.unwrap_or(first.height()),
                bitdepth: if pages.iter().flatten().any(|p| p.bitdepth() == BitDepth::Eight) {
                    BitDepth::Eight
                } else {
                    BitDepth::One
                },
                color: pages.iter().flatten().any(|p| p.is_color()),
            },
            None => match (
                config.sheet_size.horizontal,
                config.sheet_size.vertical,
                self.previous,
            ) {
                (Some(width), Some(height), previous) => SheetShape {
                    width,
                    height,
                    bitdepth: config
                        .output_depth
                        .or(previous.map(|p| p.bitdepth))
                        .unwrap_or(BitDepth::Eight),
                    color: previous.is_some_and(|p| p.color),
                },
                (_, _, Some(previous)) => {
                    warn!("sheet has only blank pages, reusing the previous sheet size");
                    previous
                }
                _ => return Err(Error::UnresolvableSheetSize),
            },
        };
        self.previous = Some(shape);

        if count == 1 {
            if let Some(page) = pages.pop().flatten() {
                if page.dimensions() == (shape.width, shape.height) {
                    let mut page = page;
                    page.set_background(config.background);
                    return Ok(page);
                }
                pages.push(Some(page));
            }
        }

        let mut sheet = PixelBuffer::new(
            shape.width,
            shape.height,
            shape.bitdepth,
            shape.color,
            config.background,
        )?;
        let (w, h) = (shape.width as i32, shape.height as i32);
        let n = count as i32;
        for (j, page) in pages.iter().enumerate() {
            if let Some(page) = page {
                let into = Rect::from_size(w * j as i32 / n, 0, w / n, h);
                page.center_into(into, &mut sheet);
            }
        }
        Ok(sheet)
    }

    /// Detect and correct the rotation of every mask.
    ///
    /// With qpixels enabled, all angles are measured on the unrotated sheet
    /// and the corrections are applied on a 2x upsampled copy.
    fn deskew(
        &self,
        mut image: PixelBuffer,
        masks: &[DetectedMask],
    ) -> Result<(PixelBuffer, Vec<f64>)> {
        let config = &self.config.deskew;
        if !self.config.qpixels {
            let mut rotations = Vec::with_capacity(masks.len());
            for mask in masks {
                let rotation = -detect_rotation(&image, mask.rect, config);
                if rotation != 0.0 {
                    rotate_area(&mut image, mask.rect, rotation)?;
                }
                rotations.push(rotation);
            }
            return Ok((image, rotations));
        }

        let rotations: Vec<f64> = masks
            .iter()
            .map(|mask| -detect_rotation(&image, mask.rect, config))
            .collect();
        if rotations.iter().all(|&r| r == 0.0) {
            return Ok((image, rotations));
        }
        let mut qpixels = to_qpixels(&image)?;
        drop(image);
        for (mask, &rotation) in masks.iter().zip(rotations.iter()) {
            if rotation != 0.0 {
                rotate_area(&mut qpixels, mask.rect.scaled(2), rotation)?;
            }
        }
        Ok((from_qpixels(&qpixels)?, rotations))
    }
}

/// Apply the stretch, zoom and size stages in that order.
fn rescale(mut image: PixelBuffer, stages: &SizeStages) -> Result<PixelBuffer> {
    if stages.stretch.horizontal.is_some() || stages.stretch.vertical.is_some() {
        let width = stages.stretch.horizontal.unwrap_or(image.width());
        let height = stages.stretch.vertical.unwrap_or(image.height());
        image = stretch(image, width, height)?;
    }
    if let Some(factor) = stages.zoom.filter(|&f| f != 1.0) {
        image = zoom(image, factor)?;
    }
    if stages.size.horizontal.is_some() || stages.size.vertical.is_some() {
        let width = stages.size.horizontal.unwrap_or(image.width());
        let height = stages.size.vertical.unwrap_or(image.height());
        image = resize(image, width, height)?;
    }
    Ok(image)
}

/// Cut the sheet into `count` pages of equal width.
fn split(image: PixelBuffer, count: u32) -> Result<Vec<PixelBuffer>> {
    if count <= 1 {
        return Ok(vec![image]);
    }
    let (w, h) = (image.width() as i32, image.height() as i32);
    let n = count as i32;
    (0..n)
        .map(|j| {
            let mut page = image.blank_like((w / n) as u32, h as u32)?;
            image.copy_area(
                Rect::from_size(w * j / n, 0, w / n, h),
                Point::new(0, 0),
                &mut page,
            );
            Ok(page)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BLACK, WHITE};

    fn sheet(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::new(w, h, BitDepth::Eight, false, WHITE).unwrap()
    }

    #[test]
    fn test_page_outlines_follow_split() {
        let report = SheetReport {
            width: 400,
            height: 100,
            scan_size: (400, 100),
            masks: vec![Rect::new(20, 10, 80, 90), Rect::new(220, 10, 280, 90)],
            borders: vec![
                Border {
                    left: 5,
                    top: 5,
                    right: 205,
                    bottom: 5,
                },
                Border {
                    left: 205,
                    top: 5,
                    right: 5,
                    bottom: 5,
                },
            ],
            ..SheetReport::default()
        };
        let (masks, borders) = report.page_outlines(1, 2);
        assert_eq!(masks[1], Rect::new(20, 10, 80, 90));
        assert_eq!(borders[1], Rect::new(5, 5, 194, 94));
        let (masks, _) = report.page_outlines(0, 1);
        assert_eq!(masks[0], Rect::new(20, 10, 80, 90));
    }

    #[test]
    fn test_layout_defaults_single() {
        let areas = LayoutAreas::new(&SheetConfig::default(), 200, 100);
        assert_eq!(areas.points, vec![Point::new(100, 50)]);
        assert_eq!(areas.exclude, vec![Rect::new(50, 25, 150, 75)]);
        assert_eq!(areas.outside, vec![Rect::new(0, 0, 199, 99)]);
        assert_eq!(areas.mask_maximum, Axes::new(Some(200), Some(100)));
    }

    #[test]
    fn test_layout_defaults_double_with_middle_wipe() {
        let config = SheetConfig {
            layout: Layout::Double,
            middle_wipe: [5, 3],
            ..SheetConfig::default()
        };
        let areas = LayoutAreas::new(&config, 400, 100);
        assert_eq!(areas.points, vec![Point::new(100, 50), Point::new(300, 50)]);
        assert_eq!(areas.wipes, vec![Rect::new(195, 0, 203, 99)]);
        assert_eq!(areas.exclude.len(), 2);
        assert_eq!(areas.outside[1], Rect::new(200, 0, 399, 99));
        assert_eq!(areas.mask_maximum, Axes::new(Some(200), Some(100)));
    }

    #[test]
    fn test_two_input_pages_are_placed_side_by_side() {
        let config = SheetConfig {
            input_pages: 2,
            ..SheetConfig::default()
        };
        let mut processor = SheetProcessor::new(config).unwrap();
        let mut right = sheet(10, 20);
        right.fill_rect(right.bounds(), BLACK);
        let image = processor
            .assemble(SheetInput {
                pages: vec![Some(sheet(10, 20)), Some(right)],
            })
            .unwrap();
        assert_eq!(image.dimensions(), (20, 20));
        assert_eq!(image.grayscale(5, 5), WHITE);
        assert_eq!(image.grayscale(15, 5), BLACK);
    }

    #[test]
    fn test_blank_sheet_reuses_previous_shape() {
        let mut processor = SheetProcessor::new(SheetConfig::default()).unwrap();
        assert!(matches!(
            processor.assemble(SheetInput { pages: vec![None] }),
            Err(Error::UnresolvableSheetSize)
        ));
        processor.assemble(SheetInput::single(sheet(30, 40))).unwrap();
        let blank = processor.assemble(SheetInput { pages: vec![None] }).unwrap();
        assert_eq!(blank.dimensions(), (30, 40));
    }

    #[test]
    fn test_too_many_pages_rejected() {
        let mut processor = SheetProcessor::new(SheetConfig::default()).unwrap();
        let input = SheetInput {
            pages: vec![Some(sheet(5, 5)), Some(sheet(5, 5))],
        };
        assert!(matches!(
            processor.assemble(input),
            Err(Error::PageCount { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_split_into_two_pages() {
        let mut image = sheet(20, 10);
        image.fill_rect(Rect::new(10, 0, 19, 9), BLACK);
        let pages = split(image, 2).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].dimensions(), (10, 10));
        assert_eq!(pages[0].grayscale(9, 0), WHITE);
        assert_eq!(pages[1].grayscale(0, 0), BLACK);
    }
}
