use thiserror::Error;

/// Errors that abort processing of a sheet.
///
/// Detection that finds no usable signal is not an error: detectors fall
/// back to an identity result and report it through their return values.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid geometry: {width}x{height}")]
    InvalidGeometry { width: i64, height: i64 },

    #[error(
        "sheet size cannot be resolved: no size configured, no input page and no previous sheet"
    )]
    UnresolvableSheetSize,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("too many input pages: expected at most {expected}, got {actual}")]
    PageCount { expected: usize, actual: usize },

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn geometry(width: impl Into<i64>, height: impl Into<i64>) -> Self {
        Error::InvalidGeometry {
            width: width.into(),
            height: height.into(),
        }
    }
}
