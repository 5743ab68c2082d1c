//! Error types for the viewer runtime
//!
//! Every failure inside the runtime is scoped to the single request that
//! caused it and surfaced through logging. These types carry enough context
//! for that log line; none of them is fatal to the viewer.

use thiserror::Error;

use crate::assets::ModelFormat;

/// Malformed or unsupported model binary.
#[derive(Error, Debug)]
pub enum AssetDecodeError {
    #[error("could not retrieve model source: {0}")]
    Fetch(#[from] FetchError),

    #[error("{format} decode failed: {message}")]
    Malformed { format: ModelFormat, message: String },

    #[error("{0} models are not supported by this build")]
    Unsupported(ModelFormat),

    #[error("model contains no triangle meshes")]
    Empty,

    #[error("decode task was cancelled")]
    Cancelled,
}

impl AssetDecodeError {
    pub fn malformed(format: ModelFormat, message: impl ToString) -> Self {
        Self::Malformed {
            format,
            message: message.to_string(),
        }
    }
}

/// Image fetch or decode failure for a texture request.
#[derive(Error, Debug)]
pub enum TextureFetchError {
    #[error("could not retrieve image: {0}")]
    Fetch(#[from] FetchError),

    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has zero size")]
    EmptyImage,

    #[error("texture task was cancelled")]
    Cancelled,
}

/// A texture or tiling request arrived while nothing is selected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no mesh is selected; {request} request dropped")]
pub struct MissingSelectionError {
    pub request: &'static str,
}

/// Render-target or device failure while resolving a pick.
#[derive(Error, Debug)]
pub enum PickerDeviceError {
    #[error("pick target has zero size ({width}x{height})")]
    ZeroSizedTarget { width: u32, height: u32 },

    #[error("pick coordinate ({x}, {y}) outside {width}x{height} target")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("pick readback failed: {0}")]
    Readback(String),
}

/// Transport failure while retrieving bytes.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Settings file could not be read or parsed.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bookmark export/import failure.
#[derive(Error, Debug)]
pub enum BookmarkIoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
