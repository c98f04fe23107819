use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::buffer::BitDepth;
use crate::config::{Layout, SheetConfig, SheetSet};
use crate::geometry::{Axes, Directions, Edges};

/// Input token standing for a missing page.
pub const BLANK_PAGE: &str = "<blank>";

#[derive(Parser, Debug)]
#[command(name = "sheetfix")]
#[command(
    version,
    about = "Clean up scanned sheets: filter noise, detect content, deskew and center"
)]
pub struct Cli {
    /// Input images; every --input-pages inputs form one sheet. Use <blank> for a missing page
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Output directory [default: next to each input, as <stem>_clean.png]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON configuration file; command-line flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Page layout: none, single or double
    #[arg(short, long, value_parser = parse_layout)]
    pub layout: Option<Layout>,

    /// Fixed sheet size (e.g. "2480x3508")
    #[arg(long, value_parser = parse_size)]
    pub sheet_size: Option<Axes<u32>>,

    /// Double layout: wipe "LEFT,RIGHT" pixels around the centre line
    #[arg(long, value_parser = parse_pair)]
    pub middle_wipe: Option<[i32; 2]>,

    /// Gray value used to fill uncovered areas
    #[arg(long)]
    pub background: Option<u8>,

    /// Pages combined into one sheet (1 or 2)
    #[arg(long)]
    pub input_pages: Option<u32>,

    /// Pages each sheet is split into on output (1 or 2)
    #[arg(long)]
    pub output_pages: Option<u32>,

    /// Output bit depth: 1 or 8
    #[arg(long, value_parser = parse_depth)]
    pub depth: Option<BitDepth>,

    /// Fraction of white a pixel needs to count as light (0..1)
    #[arg(long)]
    pub white_threshold: Option<f32>,

    /// Fraction of darkness a pixel needs to count as black (0..1)
    #[arg(long)]
    pub black_threshold: Option<f32>,

    /// Largest speckle removed by the noise filter
    #[arg(long)]
    pub noise_intensity: Option<u32>,

    /// Largest dark-pixel ratio of a window cleared by the blur filter
    #[arg(long)]
    pub blur_intensity: Option<f32>,

    /// Largest darkness of a window cleared by the gray filter
    #[arg(long)]
    pub gray_threshold: Option<f32>,

    /// Directions scanned by mask detection (e.g. "h", "v", "h,v")
    #[arg(long, value_parser = Directions::parse)]
    pub mask_directions: Option<Directions>,

    /// Edges measured by deskew (e.g. "left,right")
    #[arg(long, value_parser = Edges::parse)]
    pub deskew_edges: Option<Edges>,

    /// Largest rotation tried by deskew, in degrees
    #[arg(long)]
    pub deskew_range: Option<f32>,

    /// Deskew angle increment, in degrees
    #[arg(long)]
    pub deskew_step: Option<f32>,

    /// Largest accepted disagreement between deskew edges, in degrees
    #[arg(long)]
    pub deskew_deviation: Option<f32>,

    /// Edges to align detected content against instead of centering it
    #[arg(long, value_parser = Edges::parse)]
    pub border_align: Option<Edges>,

    /// Rotate input pages by 90 or -90 degrees before processing
    #[arg(long, allow_hyphen_values = true)]
    pub pre_rotate: Option<i32>,

    /// Rotate the finished sheet by 90 or -90 degrees
    #[arg(long, allow_hyphen_values = true)]
    pub post_rotate: Option<i32>,

    /// Rotate on the sheet directly instead of a 2x upsampled copy
    #[arg(long)]
    pub no_qpixels: bool,

    /// Skip the black filter [all, or sheets such as "1,3-5"]
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_black_filter: Option<SheetSet>,

    /// Skip the noise filter
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_noise_filter: Option<SheetSet>,

    /// Skip the blur filter
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_blur_filter: Option<SheetSet>,

    /// Skip the gray filter
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_gray_filter: Option<SheetSet>,

    /// Skip mask detection
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_mask_scan: Option<SheetSet>,

    /// Skip centering of detected masks
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_mask_center: Option<SheetSet>,

    /// Skip deskewing
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_deskew: Option<SheetSet>,

    /// Skip wiping
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_wipe: Option<SheetSet>,

    /// Skip fixed borders
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_border: Option<SheetSet>,

    /// Skip border detection
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_border_scan: Option<SheetSet>,

    /// Skip alignment after border detection
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub no_border_align: Option<SheetSet>,

    /// Skip every optional stage for these sheets
    #[arg(long, num_args = 0..=1, default_missing_value = "all", value_parser = SheetSet::parse)]
    pub ignore: Option<SheetSet>,

    /// Show processing details
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write <stem>_overlay.png with detected masks and borders outlined
    #[arg(long)]
    pub debug_overlay: bool,

    /// Print a JSON report line per sheet on stdout
    #[arg(long)]
    pub report: bool,
}

impl Cli {
    /// Built-in defaults, then the JSON file, then explicit flags.
    pub fn sheet_config(&self) -> Result<SheetConfig> {
        let mut config = match &self.config {
            Some(path) => SheetConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration: {:?}", path))?,
            None => SheetConfig::default(),
        };

        set(&mut config.layout, self.layout);
        if let Some(size) = self.sheet_size {
            config.sheet_size = Axes::new(Some(size.horizontal), Some(size.vertical));
        }
        set(&mut config.middle_wipe, self.middle_wipe);
        set(&mut config.background, self.background);
        set(&mut config.input_pages, self.input_pages);
        set(&mut config.output_pages, self.output_pages);
        if self.depth.is_some() {
            config.output_depth = self.depth;
        }
        set(&mut config.white_threshold, self.white_threshold);
        set(&mut config.black_threshold, self.black_threshold);
        set(&mut config.noise_filter.intensity, self.noise_intensity);
        set(&mut config.blur_filter.intensity, self.blur_intensity);
        set(&mut config.gray_filter.threshold, self.gray_threshold);
        set(&mut config.mask_scan.directions, self.mask_directions);
        set(&mut config.deskew.edges, self.deskew_edges);
        set(&mut config.deskew.range, self.deskew_range);
        set(&mut config.deskew.step, self.deskew_step);
        set(&mut config.deskew.deviation, self.deskew_deviation);
        set(&mut config.border_scan.align, self.border_align);
        set(&mut config.pre.rotate, self.pre_rotate);
        set(&mut config.post.rotate, self.post_rotate);
        if self.no_qpixels {
            config.qpixels = false;
        }

        let skip = &mut config.skip;
        set(&mut skip.black_filter, self.no_black_filter.clone());
        set(&mut skip.noise_filter, self.no_noise_filter.clone());
        set(&mut skip.blur_filter, self.no_blur_filter.clone());
        set(&mut skip.gray_filter, self.no_gray_filter.clone());
        set(&mut skip.mask_scan, self.no_mask_scan.clone());
        set(&mut skip.mask_center, self.no_mask_center.clone());
        set(&mut skip.deskew, self.no_deskew.clone());
        set(&mut skip.wipe, self.no_wipe.clone());
        set(&mut skip.border, self.no_border.clone());
        set(&mut skip.border_scan, self.no_border_scan.clone());
        set(&mut skip.border_align, self.no_border_align.clone());
        set(&mut skip.ignore, self.ignore.clone());
        Ok(config)
    }

    /// Group the inputs into sheets of `input_pages` pages; `None` marks a blank page.
    pub fn sheets(&self, input_pages: usize) -> Vec<Vec<Option<PathBuf>>> {
        self.inputs
            .chunks(input_pages.max(1))
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|input| (input != BLANK_PAGE).then(|| PathBuf::from(input)))
                    .collect()
            })
            .collect()
    }

    /// Where page `page` (1-based, `None` when the sheet is not split) of a
    /// sheet is written. Sheets without any input file are named by number.
    pub fn output_path(&self, input: Option<&Path>, sheet: u32, page: Option<usize>) -> PathBuf {
        self.sibling_path(input, sheet, &match page {
            Some(n) => format!("clean_{}", n),
            None => "clean".to_string(),
        })
    }

    /// Where the debug overlay of a sheet's page is written.
    pub fn overlay_path(&self, input: Option<&Path>, sheet: u32, page: Option<usize>) -> PathBuf {
        self.sibling_path(input, sheet, &match page {
            Some(n) => format!("overlay_{}", n),
            None => "overlay".to_string(),
        })
    }

    fn sibling_path(&self, input: Option<&Path>, sheet: u32, suffix: &str) -> PathBuf {
        let stem = match input {
            Some(path) => path.file_stem().unwrap_or_default().to_string_lossy().into_owned(),
            None => format!("sheet_{}", sheet),
        };
        let parent = match (&self.output, input) {
            (Some(dir), _) => dir.as_path(),
            (None, Some(path)) => path.parent().unwrap_or(Path::new(".")),
            (None, None) => Path::new("."),
        };
        parent.join(format!("{}_{}.png", stem, suffix))
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn parse_layout(s: &str) -> Result<Layout, String> {
    match s {
        "none" => Ok(Layout::None),
        "single" => Ok(Layout::Single),
        "double" => Ok(Layout::Double),
        _ => Err(format!("Invalid layout '{}', expected none, single or double", s)),
    }
}

fn parse_size(s: &str) -> Result<Axes<u32>, String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("Invalid size format '{}', expected WxH", s))?;
    let width: u32 = w
        .parse()
        .map_err(|_| format!("Invalid width value: {}", w))?;
    let height: u32 = h
        .parse()
        .map_err(|_| format!("Invalid height value: {}", h))?;
    if width == 0 || height == 0 {
        return Err("Size values must be positive".to_string());
    }
    Ok(Axes::new(width, height))
}

fn parse_pair(s: &str) -> Result<[i32; 2], String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("Invalid pair '{}', expected N,M", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<i32>()
            .map_err(|_| format!("Invalid value: {}", v))
    };
    Ok([parse(a)?, parse(b)?])
}

fn parse_depth(s: &str) -> Result<BitDepth, String> {
    match s {
        "1" => Ok(BitDepth::One),
        "8" => Ok(BitDepth::Eight),
        _ => Err(format!("Invalid bit depth '{}', expected 1 or 8", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sheetfix").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--layout",
            "double",
            "--sheet-size",
            "200x100",
            "--no-deskew",
            "--no-blur-filter",
            "2-3",
            "--post-rotate",
            "-90",
            "scan.png",
        ]);
        let config = cli.sheet_config().unwrap();
        assert_eq!(config.layout, Layout::Double);
        assert_eq!(config.sheet_size, Axes::new(Some(200), Some(100)));
        assert_eq!(config.skip.deskew, SheetSet::All);
        assert_eq!(config.skip.blur_filter, SheetSet::Sheets(vec![(2, 3)]));
        assert_eq!(config.skip.noise_filter, SheetSet::None);
        assert_eq!(config.post.rotate, -90);
        assert!(config.qpixels);
    }

    #[test]
    fn test_json_config_is_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let json = r#"{ "layout": "none", "noise_filter": { "intensity": 7 } }"#;
        std::fs::write(&path, json).unwrap();
        let cli = parse(&["--config", path.to_str().unwrap(), "--layout", "single", "a.png"]);
        let config = cli.sheet_config().unwrap();
        assert_eq!(config.layout, Layout::Single);
        assert_eq!(config.noise_filter.intensity, 7);
    }

    #[test]
    fn test_sheets_group_pages_with_blanks() {
        let cli = parse(&["a.png", "<blank>", "c.png"]);
        let sheets = cli.sheets(2);
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0], vec![Some(PathBuf::from("a.png")), None]);
        assert_eq!(sheets[1], vec![Some(PathBuf::from("c.png"))]);
    }

    #[test]
    fn test_output_paths() {
        let cli = parse(&["scans/page.png"]);
        let input = Path::new("scans/page.png");
        assert_eq!(cli.output_path(Some(input), 1, None), PathBuf::from("scans/page_clean.png"));
        assert_eq!(
            cli.output_path(Some(input), 1, Some(2)),
            PathBuf::from("scans/page_clean_2.png")
        );
        let cli = parse(&["-o", "out", "<blank>"]);
        assert_eq!(cli.output_path(None, 3, None), PathBuf::from("out/sheet_3_clean.png"));
        assert_eq!(cli.overlay_path(None, 3, None), PathBuf::from("out/sheet_3_overlay.png"));
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_size("30x40"), Ok(Axes::new(30, 40)));
        assert!(parse_size("30").is_err());
        assert!(parse_size("0x5").is_err());
        assert_eq!(parse_pair("5, 3"), Ok([5, 3]));
        assert_eq!(parse_depth("1"), Ok(BitDepth::One));
        assert!(parse_layout("triple").is_err());
    }
}
