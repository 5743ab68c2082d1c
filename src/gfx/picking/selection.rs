//! Selection state and highlight bookkeeping
//!
//! At most one mesh is selected. While it is highlighted it draws with a
//! cloned material carrying [`SELECTION_GLOW`]; the pre-highlight material is
//! kept as `original_material` and put back when the selection moves on.
//! Clones are destroyed explicitly the moment they stop being used.

use std::collections::HashMap;

use futures::channel::mpsc;

use crate::gfx::resources::{MaterialId, TextureId};
use crate::gfx::scene::{MeshId, Scene};

/// Emissive color of the highlight clone
pub const SELECTION_GLOW: [f32; 3] = [0.15, 0.35, 0.9];

/// Diffuse map and UV transform of a mesh before its first texture mutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseDiffuseSnapshot {
    pub map: Option<TextureId>,
    pub tiling: [f32; 2],
    pub offset: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub mesh: MeshId,
    pub original_material: MaterialId,
    /// `None` once a texture application collapsed the glow
    pub highlight_material: Option<MaterialId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    Unchanged,
    Selected(MeshId),
    Cleared,
}

/// The single active selection, base snapshots and selection observers
#[derive(Default)]
pub struct SelectionState {
    current: Option<Selection>,
    snapshots: HashMap<MeshId, BaseDiffuseSnapshot>,
    observers: Vec<mpsc::UnboundedSender<Option<String>>>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives the identifier of every new selection, `None` on clear
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Option<String>> {
        let (tx, rx) = mpsc::unbounded();
        self.observers.push(tx);
        rx
    }

    pub fn current(&self) -> Option<&Selection> {
        self.current.as_ref()
    }

    pub fn selected_mesh(&self) -> Option<MeshId> {
        self.current.map(|s| s.mesh)
    }

    fn publish(&mut self, identifier: Option<String>) {
        self.observers
            .retain(|tx| tx.unbounded_send(identifier.clone()).is_ok());
    }

    /// Applies the outcome of a pick
    pub fn apply_pick(&mut self, scene: &mut Scene, picked: Option<MeshId>) -> SelectionChange {
        match picked {
            Some(mesh) if self.selected_mesh() == Some(mesh) => SelectionChange::Unchanged,
            Some(mesh) => {
                if self.select(scene, mesh) {
                    SelectionChange::Selected(mesh)
                } else {
                    SelectionChange::Unchanged
                }
            }
            None if self.current.is_some() => {
                self.clear(scene);
                SelectionChange::Cleared
            }
            None => SelectionChange::Unchanged,
        }
    }

    /// Moves the selection to `mesh`, highlighting it. Returns false when the
    /// mesh does not exist.
    fn select(&mut self, scene: &mut Scene, mesh: MeshId) -> bool {
        let Some(original) = scene.mesh_material(mesh) else {
            log::warn!("Picked {} which is not in the scene", mesh);
            return false;
        };

        self.restore_current(scene);

        let highlight = scene
            .materials
            .duplicate(original, "selection highlight");
        if let Some(highlight) = highlight {
            if let Some(material) = scene.materials.get_mut(highlight) {
                material.emissive = SELECTION_GLOW;
            }
            scene.set_mesh_material(mesh, highlight);
        }

        self.current = Some(Selection {
            mesh,
            original_material: original,
            highlight_material: highlight,
        });

        let identifier = scene.mesh(mesh).map(|m| m.identifier.clone());
        log::debug!("Selected {:?}", identifier);
        self.publish(identifier);
        true
    }

    /// Restores the original material and clears the selection
    pub fn clear(&mut self, scene: &mut Scene) {
        if self.current.is_none() {
            return;
        }
        self.restore_current(scene);
        log::debug!("Selection cleared");
        self.publish(None);
    }

    /// Puts the original material back on the selected mesh and destroys the
    /// highlight clone; the selection itself is kept
    pub fn collapse_highlight(&mut self, scene: &mut Scene) {
        let Some(selection) = self.current.as_mut() else {
            return;
        };
        if let Some(highlight) = selection.highlight_material.take() {
            scene.set_mesh_material(selection.mesh, selection.original_material);
            scene.materials.destroy(highlight);
        }
    }

    fn restore_current(&mut self, scene: &mut Scene) {
        self.collapse_highlight(scene);
        self.current = None;
    }

    /// Records the mesh's current diffuse state the first time it is about
    /// to be mutated; later calls return the first snapshot unchanged
    pub fn capture_snapshot(&mut self, scene: &Scene, mesh: MeshId) -> Option<BaseDiffuseSnapshot> {
        if let Some(snapshot) = self.snapshots.get(&mesh) {
            return Some(*snapshot);
        }

        // The original material is the pre-highlight appearance
        let material_id = match self.current {
            Some(selection) if selection.mesh == mesh => selection.original_material,
            _ => scene.mesh_material(mesh)?,
        };
        let material = scene.materials.get(material_id)?;
        let snapshot = BaseDiffuseSnapshot {
            map: material.diffuse_map,
            tiling: material.tiling,
            offset: material.offset,
        };
        self.snapshots.insert(mesh, snapshot);
        Some(snapshot)
    }

    pub fn snapshot(&self, mesh: MeshId) -> Option<&BaseDiffuseSnapshot> {
        self.snapshots.get(&mesh)
    }

    /// Materials that must receive every diffuse change of the selected
    /// mesh: the live one and, while highlighted, the bookkept original
    pub fn diffuse_targets(&self, scene: &Scene) -> Vec<MaterialId> {
        let Some(selection) = self.current else {
            return Vec::new();
        };
        let mut targets = Vec::with_capacity(2);
        if let Some(live) = scene.mesh_material(selection.mesh) {
            targets.push(live);
        }
        if !targets.contains(&selection.original_material) {
            targets.push(selection.original_material);
        }
        targets
    }

    /// Called before meshes leave the scene: drops their snapshots and, if
    /// one of them is selected, clears the selection first
    pub fn forget_meshes(&mut self, scene: &mut Scene, meshes: &[MeshId]) {
        if self.selected_mesh().is_some_and(|m| meshes.contains(&m)) {
            self.clear(scene);
        }
        for mesh in meshes {
            self.snapshots.remove(mesh);
        }
    }

    /// Releases the highlight clone without notifying observers
    pub fn teardown(&mut self, scene: &mut Scene) {
        self.restore_current(scene);
        self.snapshots.clear();
        self.observers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::picking::tests::add_quad;
    use cgmath::Vector3;
    use futures::{FutureExt, StreamExt};

    fn scene_with_two_meshes() -> (Scene, MeshId, MeshId) {
        let mut scene = Scene::new();
        let (_, a) = add_quad(&mut scene, "a", Vector3::new(-3.0, 0.0, 0.0));
        let (_, b) = add_quad(&mut scene, "b", Vector3::new(3.0, 0.0, 0.0));
        (scene, a, b)
    }

    fn highlighted_count(scene: &Scene, selection: &SelectionState) -> usize {
        scene
            .meshes()
            .filter(|m| {
                selection
                    .current()
                    .is_some_and(|s| s.highlight_material == Some(m.material))
            })
            .count()
    }

    #[test]
    fn test_at_most_one_highlight_for_any_pick_sequence() {
        let (mut scene, a, b) = scene_with_two_meshes();
        let mut selection = SelectionState::new();
        let materials_before = scene.materials.len();

        let picks = [Some(a), Some(b), Some(b), None, Some(a), None, None, Some(b), Some(a)];
        for pick in picks {
            selection.apply_pick(&mut scene, pick);

            assert!(highlighted_count(&scene, &selection) <= 1);
            let clones = scene.materials.len() - materials_before;
            assert_eq!(clones, usize::from(selection.current().is_some()));
        }
    }

    #[test]
    fn test_highlight_uses_glow_on_a_clone() {
        let (mut scene, a, _) = scene_with_two_meshes();
        let mut selection = SelectionState::new();
        let original = scene.mesh_material(a).unwrap();

        assert_eq!(selection.apply_pick(&mut scene, Some(a)), SelectionChange::Selected(a));

        let live = scene.mesh_material(a).unwrap();
        assert_ne!(live, original);
        assert_eq!(scene.materials.get(live).unwrap().emissive, SELECTION_GLOW);
        assert_eq!(scene.materials.get(original).unwrap().emissive, [0.0, 0.0, 0.0]);
        assert_eq!(selection.current().unwrap().original_material, original);
    }

    #[test]
    fn test_deselect_restores_original_by_identity() {
        let (mut scene, a, _) = scene_with_two_meshes();
        let mut selection = SelectionState::new();
        let original = scene.mesh_material(a).unwrap();

        selection.apply_pick(&mut scene, Some(a));
        let highlight = scene.mesh_material(a).unwrap();
        assert_eq!(selection.apply_pick(&mut scene, None), SelectionChange::Cleared);

        assert_eq!(scene.mesh_material(a), Some(original));
        assert!(!scene.materials.contains(highlight));
        assert!(selection.current().is_none());
    }

    #[test]
    fn test_reclicking_selected_mesh_is_a_noop() {
        let (mut scene, a, _) = scene_with_two_meshes();
        let mut selection = SelectionState::new();

        selection.apply_pick(&mut scene, Some(a));
        let live = scene.mesh_material(a);
        let count = scene.materials.len();

        assert_eq!(selection.apply_pick(&mut scene, Some(a)), SelectionChange::Unchanged);
        assert_eq!(scene.mesh_material(a), live);
        assert_eq!(scene.materials.len(), count);
    }

    #[test]
    fn test_observers_receive_identifiers_and_closed_ones_are_pruned() {
        let (mut scene, a, b) = scene_with_two_meshes();
        let mut selection = SelectionState::new();
        let mut rx = selection.subscribe();
        let dropped = selection.subscribe();
        drop(dropped);

        selection.apply_pick(&mut scene, Some(a));
        selection.apply_pick(&mut scene, Some(b));
        selection.apply_pick(&mut scene, None);

        assert_eq!(rx.next().now_or_never(), Some(Some(Some("model/a".to_string()))));
        assert_eq!(rx.next().now_or_never(), Some(Some(Some("model/b".to_string()))));
        assert_eq!(rx.next().now_or_never(), Some(Some(None)));
        assert_eq!(selection.observers.len(), 1);
    }

    #[test]
    fn test_snapshot_is_taken_once_from_original() {
        let (mut scene, a, _) = scene_with_two_meshes();
        let mut selection = SelectionState::new();
        selection.apply_pick(&mut scene, Some(a));

        let first = selection.capture_snapshot(&scene, a).unwrap();
        let original = selection.current().unwrap().original_material;
        scene.materials.get_mut(original).unwrap().tiling = [5.0, 5.0];

        // Select/deselect churn does not replace it
        selection.apply_pick(&mut scene, None);
        selection.apply_pick(&mut scene, Some(a));
        let again = selection.capture_snapshot(&scene, a).unwrap();

        assert_eq!(first, again);
        assert_eq!(first.tiling, [1.0, 1.0]);
    }

    #[test]
    fn test_collapse_keeps_selection() {
        let (mut scene, a, _) = scene_with_two_meshes();
        let mut selection = SelectionState::new();
        selection.apply_pick(&mut scene, Some(a));
        let original = selection.current().unwrap().original_material;

        selection.collapse_highlight(&mut scene);

        assert_eq!(selection.selected_mesh(), Some(a));
        assert_eq!(selection.current().unwrap().highlight_material, None);
        assert_eq!(scene.mesh_material(a), Some(original));
        assert_eq!(selection.diffuse_targets(&scene), vec![original]);
    }

    #[test]
    fn test_forget_selected_mesh_clears_selection() {
        let (mut scene, a, b) = scene_with_two_meshes();
        let mut selection = SelectionState::new();
        let mut rx = selection.subscribe();
        selection.apply_pick(&mut scene, Some(a));
        selection.capture_snapshot(&scene, a);

        selection.forget_meshes(&mut scene, &[b]);
        assert_eq!(selection.selected_mesh(), Some(a));

        selection.forget_meshes(&mut scene, &[a]);
        assert!(selection.current().is_none());
        assert!(selection.snapshot(a).is_none());
        rx.next().now_or_never();
        assert_eq!(rx.next().now_or_never(), Some(Some(None)));
    }
}
