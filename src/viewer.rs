//! Frame-driven orchestrator
//!
//! [`Viewer`] owns the scene and every subsystem that mutates it and runs
//! them in a fixed order once per frame. Input callbacks only record what
//! happened (drag deltas, clicks, requests); the scene changes inside
//! [`Viewer::update`] or synchronously inside the call that asked for it.

use futures::channel::mpsc::UnboundedReceiver;
use futures::executor::ThreadPool;

use crate::assets::{
    AssetFetcher, FramedModel, LoadedModel, ModelDecoder, ModelLifecycleManager, ThreadPoolDecoder,
};
use crate::bookmarks::{camera_channel, BookmarkManager};
use crate::error::MissingSelectionError;
use crate::gfx::camera::{CameraController, CameraPose, CameraUniform, MovementKeys, PointerKind, Projection};
use crate::gfx::picking::{ClickTracker, Picker, RayPicker, SelectionChange, SelectionState};
use crate::gfx::rendering::RenderEngine;
use crate::gfx::scene::Scene;
use crate::session::ViewerSession;
use crate::settings::ViewerSettings;
use crate::texturing::{ImageLoader, TextureOutcome, TexturePipeline, TextureRequest, ThreadPoolImageLoader};

/// What happened during one [`Viewer::update`]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameReport {
    pub framed: Vec<FramedModel>,
    pub texture: Option<TextureOutcome>,
    pub bookmarks_added: usize,
}

pub struct Viewer {
    scene: Scene,
    camera: CameraController,
    projection: Projection,
    viewport: (u32, u32),
    settings: ViewerSettings,
    models: ModelLifecycleManager,
    desired: Vec<LoadedModel>,
    picker: Box<dyn Picker>,
    clicks: ClickTracker,
    selection: SelectionState,
    texturing: TexturePipeline,
    bookmarks: BookmarkManager,
}

impl Viewer {
    pub fn new(
        settings: ViewerSettings,
        session: ViewerSession,
        decoder: Box<dyn ModelDecoder>,
        images: Box<dyn ImageLoader>,
        picker: Box<dyn Picker>,
    ) -> Self {
        let mut scene = Scene::new();
        let (sender, receiver) = camera_channel();
        let camera = CameraController::new(&mut scene.graph, &settings, &session.initial_pose(), receiver);

        Self {
            scene,
            camera,
            projection: Projection::default(),
            viewport: (0, 0),
            settings,
            models: ModelLifecycleManager::new(decoder),
            desired: Vec::new(),
            picker,
            clicks: ClickTracker::new(),
            selection: SelectionState::new(),
            texturing: TexturePipeline::new(images),
            bookmarks: BookmarkManager::new(sender, session.bookmarks),
        }
    }

    /// Worker-pool decoding and image loading through `fetcher`, CPU picking
    pub fn with_fetcher(
        settings: ViewerSettings,
        session: ViewerSession,
        fetcher: AssetFetcher,
    ) -> Result<Self, std::io::Error> {
        let pool = ThreadPool::builder().name_prefix("vitrine-worker-").create()?;
        Ok(Self::new(
            settings,
            session,
            Box::new(ThreadPoolDecoder::with_pool(pool.clone(), fetcher.clone())),
            Box::new(ThreadPoolImageLoader::new(pool, fetcher)),
            Box::new(RayPicker::default()),
        ))
    }

    /// Swaps the picker, e.g. for the GPU picker once a device exists
    pub fn set_picker(&mut self, picker: Box<dyn Picker>) {
        self.picker = picker;
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn camera_pose(&self) -> CameraPose {
        self.camera.pose(&self.scene.graph)
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn subscribe_selection(&mut self) -> UnboundedReceiver<Option<String>> {
        self.selection.subscribe()
    }

    pub fn bookmarks(&self) -> &BookmarkManager {
        &self.bookmarks
    }

    pub fn bookmarks_mut(&mut self) -> &mut BookmarkManager {
        &mut self.bookmarks
    }

    pub fn models(&self) -> &ModelLifecycleManager {
        &self.models
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: ViewerSettings) {
        self.camera.apply_settings(&settings);
        self.settings = settings;
    }

    /// Replaces the desired model list. Removed models are destroyed before
    /// this returns; new ones attach on a later update.
    pub fn set_models(&mut self, models: Vec<LoadedModel>) {
        self.desired = models;
        let selection = &mut self.selection;
        let texturing = &mut self.texturing;
        self.models
            .reconcile(&self.desired, &mut self.scene, |scene, instance| {
                selection.forget_meshes(scene, &instance.meshes);
                texturing.forget_meshes(scene, &instance.meshes);
            });
    }

    pub fn desired_models(&self) -> &[LoadedModel] {
        &self.desired
    }

    /// Canvas size in device pixels
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.projection.resize(width, height);
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    pub fn pointer_pressed(&mut self, kind: PointerKind, x: f32, y: f32, over_ui: bool) {
        self.clicks.press(kind, x, y, over_ui);
        self.camera.input_mut().set_dragging(!over_ui);
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        let Some(kind) = self.clicks.pointer_kind() else {
            return;
        };
        let dragging = self.camera.input_mut().is_dragging();
        if let Some((dx, dy)) = self.clicks.motion(x, y) {
            if dragging {
                self.camera.input_mut().drag(kind, dx, dy);
            }
        }
    }

    /// Ends a press; a press that qualifies as a click picks at `(x, y)`
    pub fn pointer_released(&mut self, x: f32, y: f32) -> Option<SelectionChange> {
        self.camera.input_mut().set_dragging(false);
        let (cx, cy) = self.clicks.release(x, y)?;
        Some(self.pick_at(cx, cy))
    }

    /// Abandons the press without picking
    pub fn pointer_cancelled(&mut self) {
        self.clicks.cancel();
        self.camera.input_mut().set_dragging(false);
    }

    /// A second finger turns the press into a pinch
    pub fn pinch(&mut self, delta: f32) {
        self.pointer_cancelled();
        self.camera.input_mut().pinch(delta);
    }

    pub fn wheel(&mut self, lines: f32) {
        self.camera.input_mut().wheel(lines);
    }

    pub fn set_movement_keys(&mut self, keys: MovementKeys) {
        self.camera.input_mut().keys = keys;
    }

    /// Resolves the pixel against the current camera and updates the
    /// selection. Picker failures leave the selection alone.
    pub fn pick_at(&mut self, x: f32, y: f32) -> SelectionChange {
        let (width, height) = self.viewport;
        self.picker.ensure_size(width, height);

        let camera_world = self.scene.graph.world_matrix(self.camera.rig().camera());
        let view_proj = self.projection.view_proj(&camera_world);

        match self
            .picker
            .pick(&self.scene, &view_proj, x.max(0.0) as u32, y.max(0.0) as u32)
        {
            Ok(picked) => self.selection.apply_pick(&mut self.scene, picked),
            Err(e) => {
                log::warn!("Pick at ({}, {}) failed: {}", x, y, e);
                SelectionChange::Unchanged
            }
        }
    }

    // ------------------------------------------------------------------
    // Texture requests
    // ------------------------------------------------------------------

    pub fn request_texture(&mut self, request: TextureRequest) -> Result<(), MissingSelectionError> {
        self.texturing
            .submit(request, &mut self.scene, &mut self.selection)
    }

    pub fn set_tiling(&mut self, tiling: [f32; 2], offset: [f32; 2]) -> Result<(), MissingSelectionError> {
        self.texturing
            .set_tiling(tiling, offset, &mut self.scene, &mut self.selection)
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Advances everything by `dt` seconds
    pub fn update(&mut self, dt: f32) -> FrameReport {
        let framed = self.models.poll(&mut self.scene);
        for model in &framed {
            self.camera.set_orbit_distance(model.orbit_distance);
        }

        let texture = match self.texturing.poll(&mut self.scene, &mut self.selection) {
            TextureOutcome::Idle => None,
            outcome => Some(outcome),
        };

        let obstacles = if self.settings.tour_mode && self.settings.collision_enabled {
            self.scene.all_mesh_world_bounds()
        } else {
            Vec::new()
        };
        self.camera.update(dt, &mut self.scene.graph, &obstacles);

        // Captures are answered by the camera update above
        let bookmarks_added = self.bookmarks.poll_captures();

        FrameReport {
            framed,
            texture,
            bookmarks_added,
        }
    }

    pub fn camera_uniform(&self) -> CameraUniform {
        let camera_world = self.scene.graph.world_matrix(self.camera.rig().camera());
        CameraUniform::new(&camera_world, &self.projection)
    }

    /// Pushes settings and camera to `engine` and draws the scene
    pub fn render(&mut self, engine: &mut RenderEngine) -> Result<(), wgpu::SurfaceError> {
        engine.set_background(self.settings.background_color);
        engine.update(self.camera_uniform(), &self.settings.light);
        engine.render_frame(&mut self.scene)
    }

    /// Releases every material, texture and model the viewer created
    pub(crate) fn release_all(&mut self) {
        self.selection.teardown(&mut self.scene);
        self.texturing.teardown(&mut self.scene);
        self.models.destroy_all(&mut self.scene, |_, _| {});
        self.scene.destroy_all();
    }

    /// Tears the viewer down and hands back the session with the final
    /// camera pose and bookmark list
    pub fn shutdown(mut self) -> ViewerSession {
        let last_pose = self.camera_pose();
        self.release_all();
        log::info!("Viewer shut down");

        ViewerSession {
            last_pose: Some(last_pose),
            bookmarks: self.bookmarks.into_bookmarks(),
        }
    }
}
