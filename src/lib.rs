pub mod buffer;
pub mod cli;
pub mod config;
pub mod deskew;
pub mod detection;
pub mod error;
pub mod filters;
pub mod flood;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod transform;

pub use buffer::{BitDepth, PixelBuffer};
pub use cli::Cli;
pub use config::{Layout, SheetConfig, SheetSet, Stage};
pub use error::{Error, Result};
pub use geometry::{Border, Point, Rect, Shift};
pub use pipeline::{SheetInput, SheetOutput, SheetProcessor, SheetReport};
