//! Desktop shell: a winit window driving a [`Viewer`]
//!
//! Window, pointer, touch and keyboard events are translated into viewer
//! calls; every redraw runs one viewer update followed by a render.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, MouseScrollDelta, Touch, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

use crate::assets::{AssetFetcher, AssetSource, LoadedModel, ModelFormat};
use crate::gfx::camera::input::PIXELS_PER_LINE;
use crate::gfx::camera::{MovementKeys, PointerKind};
use crate::gfx::picking::GpuPicker;
use crate::gfx::rendering::RenderEngine;
use crate::session::ViewerSession;
use crate::settings::ViewerSettings;
use crate::texturing::TextureRequest;
use crate::viewer::Viewer;

/// Everything the shell needs to start a viewer
#[derive(Clone, Default)]
pub struct AppConfig {
    pub settings: ViewerSettings,
    pub session: ViewerSession,
    pub models: Vec<LoadedModel>,
    /// Where `E` exports the bookmark list
    pub bookmarks_path: Option<PathBuf>,
    pub fetcher: AssetFetcher,
}

pub struct VitrineApp {
    event_loop: Option<EventLoop<()>>,
    app_state: AppState,
}

struct AppState {
    window: Option<Arc<Window>>,
    render_engine: Option<RenderEngine>,
    viewer: Option<Viewer>,
    bookmarks_path: Option<PathBuf>,
    session: Option<ViewerSession>,
    cursor: (f32, f32),
    keys: MovementKeys,
    touches: HashMap<u64, (f32, f32)>,
    last_frame: Instant,
}

impl VitrineApp {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new()?;

        let AppConfig {
            settings,
            session,
            models,
            bookmarks_path,
            fetcher,
        } = config;
        let mut viewer = Viewer::with_fetcher(settings, session, fetcher)?;
        viewer.set_models(models);

        Ok(Self {
            event_loop: Some(event_loop),
            app_state: AppState {
                window: None,
                render_engine: None,
                viewer: Some(viewer),
                bookmarks_path,
                session: None,
                cursor: (0.0, 0.0),
                keys: MovementKeys::default(),
                touches: HashMap::new(),
                last_frame: Instant::now(),
            },
        })
    }

    /// Runs the event loop until the window closes and returns the session
    /// of the viewer that ran
    pub fn run(mut self) -> anyhow::Result<ViewerSession> {
        let event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| anyhow::anyhow!("Event loop already consumed"))?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self.app_state)?;

        self.app_state.shutdown();
        Ok(self.app_state.session.take().unwrap_or_default())
    }
}

impl AppState {
    fn shutdown(&mut self) {
        if let Some(viewer) = self.viewer.take() {
            self.session = Some(viewer.shutdown());
        }
        if let Some(mut engine) = self.render_engine.take() {
            engine.destroy();
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode, pressed: bool) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        match key {
            KeyCode::KeyW | KeyCode::ArrowUp => self.keys.forward = pressed,
            KeyCode::KeyS | KeyCode::ArrowDown => self.keys.backward = pressed,
            KeyCode::KeyA | KeyCode::ArrowLeft => self.keys.left = pressed,
            KeyCode::KeyD | KeyCode::ArrowRight => self.keys.right = pressed,
            _ if !pressed => return,
            KeyCode::Escape => event_loop.exit(),
            KeyCode::KeyT => {
                let mut settings = viewer.settings().clone();
                settings.tour_mode = !settings.tour_mode;
                viewer.set_settings(settings);
            }
            KeyCode::KeyB => viewer.bookmarks_mut().request_capture(),
            KeyCode::KeyR => {
                // Missing selection is already logged
                let _ = viewer.request_texture(TextureRequest::Reset);
            }
            KeyCode::KeyE => {
                if let Some(path) = &self.bookmarks_path {
                    match viewer.bookmarks().export_to_file(path) {
                        Ok(()) => log::info!("Exported bookmarks to {}", path.display()),
                        Err(e) => log::error!("Bookmark export failed: {}", e),
                    }
                }
            }
            code => {
                if let Some(index) = digit(code) {
                    let id = viewer.bookmarks().list().get(index).map(|b| b.id.clone());
                    if let Some(id) = id {
                        viewer.bookmarks().restore(&id);
                    }
                }
            }
        }
        viewer.set_movement_keys(self.keys);
    }

    fn handle_drop(&mut self, path: &Path) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        let Some(locator) = path.to_str() else {
            return;
        };

        if let Some(model) = LoadedModel::from_locator(locator) {
            let mut models = viewer.desired_models().to_vec();
            models.retain(|m| m.id != model.id);
            models.push(model);
            viewer.set_models(models);
        } else if ModelFormat::from_filename(locator).is_none() {
            // Anything else is treated as an image for the selected mesh
            let _ = viewer.request_texture(TextureRequest::Apply(AssetSource::Path(path.to_path_buf())));
        }
    }

    fn handle_touch(&mut self, touch: Touch) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        let position = (touch.location.x as f32, touch.location.y as f32);

        match touch.phase {
            TouchPhase::Started => {
                self.touches.insert(touch.id, position);
                match self.touches.len() {
                    1 => viewer.pointer_pressed(PointerKind::Touch, position.0, position.1, false),
                    _ => viewer.pinch(0.0),
                }
            }
            TouchPhase::Moved => {
                if self.touches.len() >= 2 {
                    let before = pinch_span(&self.touches);
                    self.touches.insert(touch.id, position);
                    // Fingers closing moves the camera away
                    viewer.pinch(before - pinch_span(&self.touches));
                } else {
                    self.touches.insert(touch.id, position);
                    viewer.pointer_moved(position.0, position.1);
                }
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                let was_single = self.touches.len() == 1;
                self.touches.remove(&touch.id);
                if was_single && touch.phase == TouchPhase::Ended {
                    viewer.pointer_released(position.0, position.1);
                } else {
                    viewer.pointer_cancelled();
                }
            }
        }
    }
}

fn digit(code: KeyCode) -> Option<usize> {
    let digits = [
        KeyCode::Digit1,
        KeyCode::Digit2,
        KeyCode::Digit3,
        KeyCode::Digit4,
        KeyCode::Digit5,
        KeyCode::Digit6,
        KeyCode::Digit7,
        KeyCode::Digit8,
        KeyCode::Digit9,
    ];
    digits.iter().position(|d| *d == code)
}

/// Distance between the first two touches
fn pinch_span(touches: &HashMap<u64, (f32, f32)>) -> f32 {
    let mut points = touches.values();
    match (points.next(), points.next()) {
        (Some(a), Some(b)) => ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt(),
        _ => 0.0,
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match event_loop.create_window(
            WindowAttributes::default()
                .with_title("vitrine")
                .with_inner_size(winit::dpi::LogicalSize::new(1200, 800)),
        ) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        let (width, height) = window.inner_size().into();
        let renderer = match pollster::block_on(RenderEngine::new(window, width, height)) {
            Ok(renderer) => renderer,
            Err(e) => {
                log::error!("Failed to initialise the renderer: {:#}", e);
                event_loop.exit();
                return;
            }
        };

        if let Some(viewer) = self.viewer.as_mut() {
            viewer.resize(width, height);
            viewer.set_picker(Box::new(GpuPicker::new(
                renderer.device().clone(),
                renderer.queue().clone(),
            )));
        }
        self.render_engine = Some(renderer);
        self.last_frame = Instant::now();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    winit::event::KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, key_code, state == ElementState::Pressed),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.pointer_moved(self.cursor.0, self.cursor.1);
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(viewer) = self.viewer.as_mut() {
                    let (x, y) = self.cursor;
                    match state {
                        ElementState::Pressed => viewer.pointer_pressed(PointerKind::Mouse, x, y, false),
                        ElementState::Released => {
                            viewer.pointer_released(x, y);
                        }
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                if let Some(viewer) = self.viewer.as_mut() {
                    // Scrolling up moves closer
                    viewer.wheel(-lines);
                }
            }
            WindowEvent::Touch(touch) => self.handle_touch(touch),
            WindowEvent::DroppedFile(path) => self.handle_drop(&path),
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(engine) = self.render_engine.as_mut() {
                    engine.resize(width, height);
                }
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.resize(width, height);
                }
            }
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                let (Some(viewer), Some(engine)) = (self.viewer.as_mut(), self.render_engine.as_mut())
                else {
                    return;
                };

                let now = Instant::now();
                let dt = now.duration_since(self.last_frame).as_secs_f32();
                self.last_frame = now;

                viewer.update(dt);
                match viewer.render(engine) {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => engine.reconfigure(),
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Surface out of memory");
                        event_loop.exit();
                    }
                    Err(e) => log::warn!("Frame skipped: {}", e),
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
