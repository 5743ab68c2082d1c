//! # Vitrine Prelude
//!
//! Commonly used types for embedding the viewer.
//!
//! ```no_run
//! use vitrine::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = AppConfig::default();
//!     config.models.extend(LoadedModel::from_locator("chair.glb"));
//!     let session = VitrineApp::new(config)?.run()?;
//!     println!("{} bookmarks", session.bookmarks.len());
//!     Ok(())
//! }
//! ```

// Application and orchestration
pub use crate::app::{AppConfig, VitrineApp};
pub use crate::session::ViewerSession;
pub use crate::settings::{LightSettings, ViewerSettings};
pub use crate::viewer::{FrameReport, Viewer};

// Models
pub use crate::assets::{AssetFetcher, AssetSource, FetchConfig, LoadedModel, ModelFormat};

// Camera, picking and bookmarks
pub use crate::bookmarks::{BookmarkManager, CameraBookmark, Orientation};
pub use crate::gfx::camera::{CameraMode, CameraPose, MovementKeys, PointerKind};
pub use crate::gfx::picking::{SelectionChange, SelectionState};

// Texturing
pub use crate::texturing::{TextureOutcome, TextureRequest};

// Errors
pub use crate::error::{
    AssetDecodeError, MissingSelectionError, PickerDeviceError, TextureFetchError,
};
