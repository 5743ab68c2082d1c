//! # Texture Application Pipeline
//!
//! Re-textures the selected mesh. Images are fetched and decoded off the
//! frame thread by an [`ImageLoader`]; the [`TexturePipeline`] keeps a single
//! request in flight and applies its result on the frame thread.
//!
//! Every change is written to both the live material and the selection's
//! bookkept original so that reselecting a mesh shows what was applied. The
//! first change to a mesh records a base snapshot that `Reset` returns to.

pub mod loader;
pub mod pipeline;

pub use loader::{decode_image, ImageLoader, ThreadPoolImageLoader};
pub use pipeline::{TextureOutcome, TexturePipeline, TextureRequest, DEFAULT_TILING};
