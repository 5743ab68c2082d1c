//! # Model assets
//!
//! Everything between "the user supplied a model" and "its meshes are in the
//! scene":
//!
//! - [`LoadedModel`] describes a model the embedding application wants shown
//! - [`fetch`] retrieves the bytes of local files, in-memory blobs and URLs
//! - [`decode`] turns obj, glTF/glb, stl and (optionally) fbx bytes into a
//!   format-neutral [`DecodedModel`]
//! - [`lifecycle`] reconciles the desired model list with the scene

pub mod decode;
pub mod fetch;
pub mod lifecycle;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use decode::{decode_model, DecodedMaterial, DecodedMesh, DecodedModel, DecodedNode};
pub use fetch::{AssetFetcher, FetchConfig, FetchedAsset};
pub use lifecycle::{
    FramedModel, ModelDecoder, ModelInstance, ModelLifecycleManager, ThreadPoolDecoder,
    MIN_FRAMING_DISTANCE, FRAMING_FACTOR,
};

/// Model file formats the viewer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Obj,
    Fbx,
    Gltf,
    Stl,
}

impl ModelFormat {
    /// Format for a file extension, case-insensitive. `glb` is glTF.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "obj" => Some(Self::Obj),
            "fbx" => Some(Self::Fbx),
            "gltf" | "glb" => Some(Self::Gltf),
            "stl" => Some(Self::Stl),
            _ => None,
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Obj => "obj",
            Self::Fbx => "fbx",
            Self::Gltf => "gltf",
            Self::Stl => "stl",
        })
    }
}

/// Where the bytes of a model or image come from
#[derive(Debug, Clone, PartialEq)]
pub enum AssetSource {
    /// Local file; read directly, never through the proxy
    Path(PathBuf),
    /// Bytes already in memory (a dropped file, a pre-fetched download)
    Bytes(Arc<[u8]>),
    /// Remote resource; fetched through the proxy when one is configured
    Url(String),
}

impl AssetSource {
    /// Interprets `locator` as a URL when it has an http(s) or file scheme,
    /// otherwise as a local path
    pub fn from_locator(locator: &str) -> Self {
        match url::Url::parse(locator) {
            Ok(url) if matches!(url.scheme(), "http" | "https" | "file") => {
                Self::Url(locator.to_string())
            }
            _ => Self::Path(PathBuf::from(locator)),
        }
    }

    /// Directory sibling resources (mtl files, external textures) are
    /// resolved against
    pub fn base_dir(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => path.parent(),
            _ => None,
        }
    }
}

/// A model the embedding application wants in the scene. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub id: String,
    pub source: AssetSource,
    pub format: ModelFormat,
    pub filename: String,
}

impl LoadedModel {
    pub fn new(id: &str, source: AssetSource, format: ModelFormat, filename: &str) -> Self {
        Self {
            id: id.to_string(),
            source,
            format,
            filename: filename.to_string(),
        }
    }

    /// Builds a model from a path or URL, inferring the format from the file
    /// name. The id is the file name.
    pub fn from_locator(locator: &str) -> Option<Self> {
        let source = AssetSource::from_locator(locator);
        let filename = match &source {
            AssetSource::Url(url) => url::Url::parse(url)
                .ok()
                .and_then(|u| u.path_segments()?.next_back().map(str::to_string))?,
            _ => Path::new(locator).file_name()?.to_str()?.to_string(),
        };
        let format = ModelFormat::from_filename(&filename)?;
        Some(Self::new(&filename, source, format, &filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ModelFormat::from_filename("chair.OBJ"), Some(ModelFormat::Obj));
        assert_eq!(ModelFormat::from_filename("scene.glb"), Some(ModelFormat::Gltf));
        assert_eq!(ModelFormat::from_filename("part.stl"), Some(ModelFormat::Stl));
        assert_eq!(ModelFormat::from_filename("rig.fbx"), Some(ModelFormat::Fbx));
        assert_eq!(ModelFormat::from_filename("notes.txt"), None);
        assert_eq!(ModelFormat::from_filename("no_extension"), None);
    }

    #[test]
    fn test_locator_classification() {
        assert!(matches!(
            AssetSource::from_locator("https://example.com/a.glb"),
            AssetSource::Url(_)
        ));
        assert!(matches!(
            AssetSource::from_locator("models/a.glb"),
            AssetSource::Path(_)
        ));
        // Windows drive letters parse as a URL scheme but are paths
        assert!(matches!(
            AssetSource::from_locator("C:\\models\\a.glb"),
            AssetSource::Path(_)
        ));
    }

    #[test]
    fn test_model_from_locator() {
        let model = LoadedModel::from_locator("https://example.com/assets/chair.obj?v=2").unwrap();
        assert_eq!(model.id, "chair.obj");
        assert_eq!(model.format, ModelFormat::Obj);

        let model = LoadedModel::from_locator("./data/bracket.stl").unwrap();
        assert_eq!(model.filename, "bracket.stl");
        assert_eq!(model.source.base_dir(), Some(Path::new("./data")));

        assert!(LoadedModel::from_locator("readme.md").is_none());
    }
}
