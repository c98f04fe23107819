use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::buffer::{black_max, white_min, BitDepth, WHITE};
use crate::error::{Error, Result};
use crate::geometry::{Axes, Border, Directions, Edges, Point, Rect};

/// How many logical pages a sheet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// No automatic seeds, exclusions or border regions.
    None,
    #[default]
    Single,
    Double,
}

/// A selection of sheet numbers (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetSet {
    #[default]
    None,
    All,
    /// Inclusive `(first, last)` ranges; a single sheet is `(n, n)`.
    Sheets(Vec<(u32, u32)>),
}

impl SheetSet {
    pub fn contains(&self, sheet: u32) -> bool {
        match self {
            SheetSet::None => false,
            SheetSet::All => true,
            SheetSet::Sheets(ranges) => ranges
                .iter()
                .any(|&(first, last)| (first..=last).contains(&sheet)),
        }
    }

    /// Parse `"all"` or a list of numbers and ranges such as `"1,3-5"`.
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let s = s.trim();
        if s.is_empty() || s == "all" {
            return Ok(SheetSet::All);
        }
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            let parse = |v: &str| {
                v.trim()
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid sheet number: {}", v))
            };
            match part.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (parse(start)?, parse(end)?);
                    if start > end {
                        return Err(format!("Invalid sheet range: {}", part));
                    }
                    ranges.push((start, end));
                }
                None => {
                    let sheet = parse(part)?;
                    ranges.push((sheet, sheet));
                }
            }
        }
        Ok(SheetSet::Sheets(ranges))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackFilterConfig {
    pub directions: Directions,
    pub size: Axes<u32>,
    pub depth: Axes<u32>,
    pub step: Axes<u32>,
    /// Minimum average darkness (0..1) of a strip to count as solid black.
    pub threshold: f32,
    /// Protected areas; empty means the layout default.
    pub exclude: Vec<Rect>,
    /// Flood-fill tolerance for light gaps.
    pub intensity: u32,
}

impl Default for BlackFilterConfig {
    fn default() -> Self {
        Self {
            directions: Directions::BOTH,
            size: Axes::both(20),
            depth: Axes::both(500),
            step: Axes::both(5),
            threshold: 0.95,
            exclude: Vec::new(),
            intensity: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFilterConfig {
    /// Largest cluster (and search radius) that counts as noise.
    pub intensity: u32,
}

impl Default for NoiseFilterConfig {
    fn default() -> Self {
        Self { intensity: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurFilterConfig {
    pub size: Axes<u32>,
    pub step: Axes<u32>,
    /// Maximum ratio of dark pixels for a window to be cleared.
    pub intensity: f32,
}

impl Default for BlurFilterConfig {
    fn default() -> Self {
        Self {
            size: Axes::both(100),
            step: Axes::both(50),
            intensity: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrayFilterConfig {
    pub size: Axes<u32>,
    pub step: Axes<u32>,
    /// Maximum average darkness (0..1) of a window without black pixels.
    pub threshold: f32,
}

impl Default for GrayFilterConfig {
    fn default() -> Self {
        Self {
            size: Axes::both(50),
            step: Axes::both(20),
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskScanConfig {
    pub directions: Directions,
    pub size: Axes<u32>,
    /// Length of the scan bar across the scan direction; `None` spans the sheet.
    pub depth: Axes<Option<u32>>,
    pub step: Axes<u32>,
    pub threshold: Axes<f32>,
    /// Minimum mask width (horizontal) and height (vertical).
    pub minimum: Axes<Option<u32>>,
    /// Maximum mask width and height; `None` means the layout default.
    pub maximum: Axes<Option<u32>>,
    /// Seed points; empty means the layout default.
    pub points: Vec<Point>,
}

impl Default for MaskScanConfig {
    fn default() -> Self {
        Self {
            directions: Directions::HORIZONTAL,
            size: Axes::both(50),
            depth: Axes::both(None),
            step: Axes::both(5),
            threshold: Axes::both(0.1),
            minimum: Axes::both(Some(100)),
            maximum: Axes::both(None),
            points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewConfig {
    pub edges: Edges,
    /// Sample points on the virtual scan line; `None` spans the region.
    pub size: Option<u32>,
    /// Darkness budget, in fully black scan lines, before a scan stops.
    pub depth: f32,
    /// Largest angle tried, in degrees.
    pub range: f32,
    /// Angle increment, in degrees.
    pub step: f32,
    /// Largest accepted disagreement between edges, in degrees.
    pub deviation: f32,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            edges: Edges::HORIZONTAL_PAIR,
            size: Some(1500),
            depth: 0.5,
            range: 5.0,
            step: 0.1,
            deviation: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderScanConfig {
    pub directions: Directions,
    pub size: Axes<u32>,
    pub step: Axes<u32>,
    /// Dark pixels a band needs to count as content.
    pub threshold: Axes<u32>,
    /// Edges to align the content against; none centres it.
    pub align: Edges,
    pub margin: Axes<i32>,
    /// Outer regions to scan; empty means the layout default.
    pub outside: Vec<Rect>,
}

impl Default for BorderScanConfig {
    fn default() -> Self {
        Self {
            directions: Directions::VERTICAL,
            size: Axes::both(5),
            step: Axes::both(5),
            threshold: Axes::both(5),
            align: Edges::NONE,
            margin: Axes::both(0),
            outside: Vec::new(),
        }
    }
}

/// Size-changing stages run before filtering or after output preparation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeStages {
    /// Rotate by 90 or -90 degrees.
    pub rotate: i32,
    pub mirror: Directions,
    pub shift: Axes<i32>,
    /// Stretch to width/height; unset axes keep the current size.
    pub stretch: Axes<Option<u32>>,
    pub zoom: Option<f32>,
    /// Resize keeping the aspect ratio, centred on a sheet of this size.
    pub size: Axes<Option<u32>>,
}

impl SizeStages {
    /// Whether these stages move or resize the sheet's content.
    pub fn moves_content(&self) -> bool {
        self.rotate != 0
            || !self.mirror.is_empty()
            || self.shift != Axes::both(0)
            || self.stretch != Axes::both(None)
            || self.zoom.is_some_and(|factor| factor != 1.0)
            || self.size != Axes::both(None)
    }
}

/// Stages that can be switched off for individual sheets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSkips {
    pub black_filter: SheetSet,
    pub noise_filter: SheetSet,
    pub blur_filter: SheetSet,
    pub gray_filter: SheetSet,
    pub mask_scan: SheetSet,
    pub mask_center: SheetSet,
    pub deskew: SheetSet,
    pub wipe: SheetSet,
    pub border: SheetSet,
    pub border_scan: SheetSet,
    pub border_align: SheetSet,
    /// Sheets for which every skippable stage is off.
    pub ignore: SheetSet,
}

/// The stages a [`StageSkips`] entry controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BlackFilter,
    NoiseFilter,
    BlurFilter,
    GrayFilter,
    MaskScan,
    MaskCenter,
    Deskew,
    Wipe,
    Border,
    BorderScan,
    BorderAlign,
}

impl StageSkips {
    pub fn skips(&self, stage: Stage, sheet: u32) -> bool {
        let set = match stage {
            Stage::BlackFilter => &self.black_filter,
            Stage::NoiseFilter => &self.noise_filter,
            Stage::BlurFilter => &self.blur_filter,
            Stage::GrayFilter => &self.gray_filter,
            Stage::MaskScan => &self.mask_scan,
            Stage::MaskCenter => &self.mask_center,
            Stage::Deskew => &self.deskew,
            Stage::Wipe => &self.wipe,
            Stage::Border => &self.border,
            Stage::BorderScan => &self.border_scan,
            Stage::BorderAlign => &self.border_align,
        };
        self.ignore.contains(sheet) || set.contains(sheet)
    }
}

/// Everything one sheet run needs. Passed by reference into each stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub layout: Layout,
    /// Fixed sheet size; unset axes follow the input.
    pub sheet_size: Axes<Option<u32>>,
    pub background: u8,
    pub input_pages: u32,
    pub output_pages: u32,
    pub output_depth: Option<BitDepth>,
    /// Fraction of white a pixel needs to count as light.
    pub white_threshold: f32,
    /// Fraction of darkness a pixel needs to count as black.
    pub black_threshold: f32,
    /// Rotate on a 2x upsampled sheet.
    pub qpixels: bool,
    pub pre: SizeStages,
    pub post: SizeStages,
    pub pre_mask: Vec<Rect>,
    pub pre_wipe: Vec<Rect>,
    pub wipe: Vec<Rect>,
    pub post_wipe: Vec<Rect>,
    /// Double layout only: wipe `[left, right]` pixels around the centre line.
    pub middle_wipe: [i32; 2],
    pub pre_border: Border,
    pub border: Border,
    pub post_border: Border,
    pub black_filter: BlackFilterConfig,
    pub noise_filter: NoiseFilterConfig,
    pub blur_filter: BlurFilterConfig,
    pub gray_filter: GrayFilterConfig,
    pub mask_scan: MaskScanConfig,
    pub deskew: DeskewConfig,
    pub border_scan: BorderScanConfig,
    pub skip: StageSkips,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Single,
            sheet_size: Axes::both(None),
            background: WHITE,
            input_pages: 1,
            output_pages: 1,
            output_depth: None,
            white_threshold: 0.9,
            black_threshold: 0.33,
            qpixels: true,
            pre: SizeStages::default(),
            post: SizeStages::default(),
            pre_mask: Vec::new(),
            pre_wipe: Vec::new(),
            wipe: Vec::new(),
            post_wipe: Vec::new(),
            middle_wipe: [0, 0],
            pre_border: Border::default(),
            border: Border::default(),
            post_border: Border::default(),
            black_filter: BlackFilterConfig::default(),
            noise_filter: NoiseFilterConfig::default(),
            blur_filter: BlurFilterConfig::default(),
            gray_filter: GrayFilterConfig::default(),
            mask_scan: MaskScanConfig::default(),
            deskew: DeskewConfig::default(),
            border_scan: BorderScanConfig::default(),
            skip: StageSkips::default(),
        }
    }
}

impl SheetConfig {
    /// Load a (partial) JSON configuration; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|err| Error::InvalidConfig(format!("{}: {}", path.display(), err)))
    }

    /// Gray value at or below which a pixel counts as black.
    pub fn black_max(&self) -> u8 {
        black_max(self.black_threshold)
    }

    /// Gray value below which a pixel counts as non-white.
    pub fn white_min(&self) -> u8 {
        white_min(self.white_threshold)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(Error::InvalidConfig(what.to_string()));
        let positive = |axes: Axes<u32>| axes.horizontal > 0 && axes.vertical > 0;
        let fraction = |v: f32| (0.0..=1.0).contains(&v);

        if !(1..=2).contains(&self.input_pages) || !(1..=2).contains(&self.output_pages) {
            return invalid("input and output page counts must be 1 or 2");
        }
        for (name, v) in [
            ("white threshold", self.white_threshold),
            ("black threshold", self.black_threshold),
            ("black filter threshold", self.black_filter.threshold),
            ("blur filter intensity", self.blur_filter.intensity),
            ("gray filter threshold", self.gray_filter.threshold),
            ("horizontal mask scan threshold", self.mask_scan.threshold.horizontal),
            ("vertical mask scan threshold", self.mask_scan.threshold.vertical),
        ] {
            if !fraction(v) {
                return invalid(&format!("{} must be within 0..1, got {}", name, v));
            }
        }
        let bf = &self.black_filter;
        if !positive(bf.size) || !positive(bf.depth) || !positive(bf.step) {
            return invalid("black filter size, depth and step must be positive");
        }
        let blur = &self.blur_filter;
        if !positive(blur.size) || !positive(blur.step) {
            return invalid("blur filter size and step must be positive");
        }
        let gray = &self.gray_filter;
        if !positive(gray.size) || !positive(gray.step) {
            return invalid("gray filter size and step must be positive");
        }
        if !positive(self.mask_scan.size) || !positive(self.mask_scan.step) {
            return invalid("mask scan size and step must be positive");
        }
        if !positive(self.border_scan.size) || !positive(self.border_scan.step) {
            return invalid("border scan size and step must be positive");
        }
        let deskew = &self.deskew;
        if deskew.step <= 0.0 || deskew.range < 0.0 || deskew.range >= 90.0 {
            return invalid("deskew step must be positive and range within 0..90 degrees");
        }
        if deskew.size == Some(0) {
            return invalid("deskew scan size must be positive");
        }
        for stages in [&self.pre, &self.post] {
            if ![0, 90, -90].contains(&stages.rotate) {
                return invalid("rotation must be 0, 90 or -90");
            }
            if stages.zoom.is_some_and(|z| z <= 0.0) {
                return invalid("zoom factor must be positive");
            }
        }
        Ok(())
    }
}
