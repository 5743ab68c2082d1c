use std::collections::HashMap;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use super::loader::ImageLoader;
use crate::assets::AssetSource;
use crate::error::{MissingSelectionError, TextureFetchError};
use crate::gfx::picking::SelectionState;
use crate::gfx::resources::{MaterialId, TextureId, TextureImage};
use crate::gfx::scene::{MeshId, Scene};

/// Repeat density of a freshly applied image
pub const DEFAULT_TILING: [f32; 2] = [5.0, 5.0];

/// A one-shot request against the current selection
#[derive(Debug, Clone, PartialEq)]
pub enum TextureRequest {
    /// Fetch, decode and apply an image as the diffuse map
    Apply(AssetSource),
    /// Put back the diffuse map and tiling the mesh had before any change
    Reset,
}

impl TextureRequest {
    fn kind(&self) -> &'static str {
        match self {
            Self::Apply(_) => "texture",
            Self::Reset => "reset",
        }
    }
}

/// What the last [`TexturePipeline::poll`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureOutcome {
    Idle,
    Pending,
    Applied(MeshId),
    Failed(MeshId),
    Discarded(MeshId),
}

struct InFlight {
    mesh: MeshId,
    load: LocalBoxFuture<'static, Result<TextureImage, TextureFetchError>>,
}

/// Applies, resets and re-tiles the selected mesh's diffuse map.
///
/// Holds at most one in-flight image; a newer request replaces it. The mesh
/// a request targets is fixed when it is submitted.
pub struct TexturePipeline {
    loader: Box<dyn ImageLoader>,
    in_flight: Option<InFlight>,
    /// Texture each mesh currently shows because of this pipeline
    generated: HashMap<MeshId, TextureId>,
}

impl TexturePipeline {
    pub fn new(loader: Box<dyn ImageLoader>) -> Self {
        Self {
            loader,
            in_flight: None,
            generated: HashMap::new(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn generated_texture(&self, mesh: MeshId) -> Option<TextureId> {
        self.generated.get(&mesh).copied()
    }

    /// Consumes `request`. Image requests start loading; a reset is applied
    /// immediately. Both replace any image still loading.
    pub fn submit(
        &mut self,
        request: TextureRequest,
        scene: &mut Scene,
        selection: &mut SelectionState,
    ) -> Result<(), MissingSelectionError> {
        let Some(mesh) = selection.selected_mesh() else {
            let error = MissingSelectionError {
                request: request.kind(),
            };
            log::warn!("{}", error);
            return Err(error);
        };

        if let Some(previous) = self.in_flight.take() {
            log::debug!("Texture request for {} superseded", previous.mesh);
        }

        match request {
            TextureRequest::Apply(source) => {
                log::debug!("Loading texture for {}", mesh);
                self.in_flight = Some(InFlight {
                    mesh,
                    load: self.loader.load(&source),
                });
            }
            TextureRequest::Reset => self.reset(scene, selection, mesh),
        }
        Ok(())
    }

    /// Sets tiling and offset on the selected mesh
    pub fn set_tiling(
        &mut self,
        tiling: [f32; 2],
        offset: [f32; 2],
        scene: &mut Scene,
        selection: &mut SelectionState,
    ) -> Result<(), MissingSelectionError> {
        let Some(mesh) = selection.selected_mesh() else {
            let error = MissingSelectionError { request: "tiling" };
            log::warn!("{}", error);
            return Err(error);
        };

        selection.capture_snapshot(scene, mesh);
        for material in Self::targets(scene, selection, mesh) {
            if let Some(material) = scene.materials.get_mut(material) {
                material.tiling = tiling;
                material.offset = offset;
            }
        }
        Ok(())
    }

    /// Applies the loaded image once it is ready
    pub fn poll(&mut self, scene: &mut Scene, selection: &mut SelectionState) -> TextureOutcome {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return TextureOutcome::Idle;
        };
        let Some(result) = in_flight.load.as_mut().now_or_never() else {
            return TextureOutcome::Pending;
        };
        let mesh = in_flight.mesh;
        self.in_flight = None;

        if !scene.contains_mesh(mesh) {
            log::debug!("Discarding texture for removed {}", mesh);
            return TextureOutcome::Discarded(mesh);
        }

        match result {
            Ok(image) => {
                self.apply(scene, selection, mesh, image);
                TextureOutcome::Applied(mesh)
            }
            Err(e) => {
                log::error!("Texture for {} failed: {}", mesh, e);
                TextureOutcome::Failed(mesh)
            }
        }
    }

    /// Materials that mirror every diffuse change of `mesh`
    fn targets(scene: &Scene, selection: &SelectionState, mesh: MeshId) -> Vec<MaterialId> {
        if selection.selected_mesh() == Some(mesh) {
            selection.diffuse_targets(scene)
        } else {
            scene.mesh_material(mesh).into_iter().collect()
        }
    }

    fn apply(&mut self, scene: &mut Scene, selection: &mut SelectionState, mesh: MeshId, image: TextureImage) {
        selection.capture_snapshot(scene, mesh);

        let label = scene
            .mesh(mesh)
            .map(|m| format!("{} diffuse", m.identifier))
            .unwrap_or_default();
        let texture = scene.textures.create(&label, image);

        for material in Self::targets(scene, selection, mesh) {
            if let Some(material) = scene.materials.get_mut(material) {
                material.diffuse_map = Some(texture);
                material.tiling = DEFAULT_TILING;
            }
        }

        if let Some(previous) = self.generated.insert(mesh, texture) {
            Self::release_if_unused(scene, previous);
        }

        if selection.selected_mesh() == Some(mesh) {
            selection.collapse_highlight(scene);
        }
        log::debug!("Applied {} to {}", texture, mesh);
    }

    fn reset(&mut self, scene: &mut Scene, selection: &mut SelectionState, mesh: MeshId) {
        // Never mutated before: the snapshot is the current state
        let Some(snapshot) = selection.capture_snapshot(scene, mesh) else {
            return;
        };

        for material in Self::targets(scene, selection, mesh) {
            if let Some(material) = scene.materials.get_mut(material) {
                material.diffuse_map = snapshot.map;
                material.tiling = snapshot.tiling;
                material.offset = snapshot.offset;
            }
        }

        if let Some(generated) = self.generated.remove(&mesh) {
            Self::release_if_unused(scene, generated);
        }
        log::debug!("Reset diffuse of {}", mesh);
    }

    fn release_if_unused(scene: &mut Scene, texture: TextureId) {
        if !scene.materials.references_texture(texture) {
            scene.textures.destroy(texture);
        }
    }

    /// Called before meshes leave the scene
    pub fn forget_meshes(&mut self, scene: &mut Scene, meshes: &[MeshId]) {
        if self.in_flight.as_ref().is_some_and(|f| meshes.contains(&f.mesh)) {
            self.in_flight = None;
        }
        for mesh in meshes {
            if let Some(texture) = self.generated.remove(mesh) {
                scene.textures.destroy(texture);
            }
        }
    }

    /// Releases every generated texture and drops the pending load
    pub fn teardown(&mut self, scene: &mut Scene) {
        self.in_flight = None;
        for (_, texture) in self.generated.drain() {
            scene.textures.destroy(texture);
        }
    }
}
