use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use glam::Vec3;
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    camera_feed::CameraError,
    capture::CaptureError,
    config::ViewerConfig,
    formats::ParsedModel,
    import::{ImportError, ImportOutcome, ImportPipeline},
    math::{bounds::AABB, normalize},
    pose::{RotationAxis, TransformController},
    scene_graph::{
        node::MeshHandle,
        scene::{DrawItem, Scene},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    CameraAcquiring,
    CameraReady,
    RenderActive,
    CameraError,
    TornDown,
}

/// User-facing error slot contents. Latest wins, one at a time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UserError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("could not read file: {0}")]
    FileRead(String),
    #[error("unsupported model format: '{0}'")]
    UnsupportedFormat(String),
    #[error("could not parse model: {0}")]
    Parse(String),
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
}

impl From<ImportError> for UserError {
    fn from(error: ImportError) -> Self {
        match error {
            ImportError::UnsupportedFormat { extension } => {
                UserError::UnsupportedFormat(extension)
            }
            error @ ImportError::FileRead { .. } => UserError::FileRead(error.to_string()),
            ImportError::Parse(parse) => UserError::Parse(parse.to_string()),
        }
    }
}

impl From<CameraError> for UserError {
    fn from(error: CameraError) -> Self {
        UserError::CameraUnavailable(error.to_string())
    }
}

/// Observable state of the viewer, logged whenever it changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub scale: f32,
    pub rotation: Vec3,
    pub model_loaded: bool,
    pub loading: bool,
    pub error: Option<UserError>,
    pub camera_ready: bool,
    pub ar_active: bool,
}

/// Seam for platform AR sessions. The desktop build ships the no-op
/// implementation; the hooks fire on explicit session toggles inside
/// `RenderActive`.
pub trait ArSessionHook {
    fn on_enter(&mut self);
    fn on_exit(&mut self);
}

pub struct NullArSession;

impl ArSessionHook for NullArSession {
    fn on_enter(&mut self) {}
    fn on_exit(&mut self) {}
}

/// Owns the scene, the transform controller and the import pipeline, and
/// tracks the camera/render lifecycle. The window layer feeds events in and
/// reads draw items out.
pub struct Viewer {
    config: ViewerConfig,
    scene: Scene,
    pub controller: TransformController,
    imports: ImportPipeline,
    state: LifecycleState,
    error: Option<UserError>,
    model_loaded: bool,
    alive: Arc<AtomicBool>,
    ar_session: Box<dyn ArSessionHook>,
    ar_session_active: bool,
    last_published: Option<ViewModel>,
}

impl Viewer {
    pub fn new(config: ViewerConfig) -> Viewer {
        Self::with_ar_session(config, Box::new(NullArSession))
    }

    pub fn with_ar_session(config: ViewerConfig, ar_session: Box<dyn ArSessionHook>) -> Viewer {
        Viewer {
            config,
            scene: Scene::new(),
            controller: TransformController::new(),
            imports: ImportPipeline::new(),
            state: LifecycleState::Uninitialized,
            error: None,
            model_loaded: false,
            alive: Arc::new(AtomicBool::new(true)),
            ar_session,
            ar_session_active: false,
            last_published: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn error(&self) -> Option<&UserError> {
        self.error.as_ref()
    }

    pub fn model_loaded(&self) -> bool {
        self.model_loaded
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn camera_ready(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::CameraReady | LifecycleState::RenderActive
        )
    }

    fn set_state(&mut self, next: LifecycleState) {
        if self.state != next {
            info!("Lifecycle {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    pub fn begin_startup(&mut self) {
        if self.state == LifecycleState::Uninitialized {
            self.set_state(LifecycleState::CameraAcquiring);
        }
    }

    pub fn on_camera_frame(&mut self) {
        if !self.is_alive() {
            return;
        }

        if self.state == LifecycleState::CameraAcquiring {
            self.set_state(LifecycleState::CameraReady);
        }
    }

    /// A dead camera is terminal for the camera lifecycle. Rendering carries
    /// on over black.
    pub fn on_camera_failed(&mut self, error: CameraError) {
        if !self.is_alive() || self.state == LifecycleState::TornDown {
            return;
        }

        warn!("Camera failed: {error}");
        self.error = Some(UserError::from(error));
        self.set_state(LifecycleState::CameraError);
    }

    pub fn on_rendered(&mut self) {
        if self.state == LifecycleState::CameraReady {
            self.set_state(LifecycleState::RenderActive);
        }
    }

    pub fn on_file_selected(&mut self, path: &Path) {
        if !self.is_alive() || self.state == LifecycleState::TornDown {
            return;
        }

        // Starting an import clears any stale error. If this one fails, its
        // own error lands in the slot.
        self.error = None;

        info!("Importing {}", path.display());
        if let Err(error) = self.imports.begin(path) {
            warn!("Import rejected: {error}");
            self.error = Some(error.into());
        }
    }

    pub fn poll_import(&mut self) -> Option<ImportOutcome> {
        if !self.is_alive() {
            return None;
        }

        self.imports.poll()
    }

    pub fn is_loading(&self) -> bool {
        self.imports.is_loading()
    }

    /// Installs a freshly imported model: normalization from its bounds, pose
    /// reset, scene subtree replaced. The caller has already uploaded the GPU
    /// meshes behind `handles`.
    pub fn commit_model(&mut self, model: &ParsedModel, handles: &[MeshHandle]) {
        let bounds = model
            .bounds()
            .unwrap_or(AABB::new(Vec3::ZERO, Vec3::ZERO));
        let fit = normalize::fit(&bounds, self.config.target_size, self.config.fit_policy);

        self.scene.attach_model(handles, &fit);
        self.controller.reset();
        self.model_loaded = true;

        info!(
            "Model ready: {} meshes, fit scale {:.3}",
            handles.len(),
            fit.scale
        );
    }

    /// The previous model stays on screen. Failure only touches the error
    /// slot.
    pub fn fail_import(&mut self, error: ImportError) {
        warn!("Import failed: {error}");
        self.error = Some(error.into());
    }

    pub fn on_scale_changed(&mut self, scale: f32) {
        self.controller.set_scale(scale);
    }

    pub fn on_rotation_changed(&mut self, axis: RotationAxis, degrees: f32) {
        self.controller.set_rotation(axis, degrees);
    }

    pub fn on_reset(&mut self) {
        self.controller.reset();
    }

    pub fn on_toggle_compass(&mut self) {
        let enable = !self.controller.compass_enabled();
        self.controller.set_compass(enable);
        info!("Compass {}", if enable { "on" } else { "off" });
    }

    pub fn set_heading(&mut self, heading_deg: f32) {
        self.controller.set_heading(heading_deg);
    }

    pub fn toggle_ar_session(&mut self) {
        if self.state != LifecycleState::RenderActive {
            return;
        }

        if self.ar_session_active {
            self.ar_session.on_exit();
            self.ar_session_active = false;
            info!("AR session ended");
        } else {
            self.ar_session.on_enter();
            self.ar_session_active = true;
            info!("AR session started");
        }
    }

    pub fn ar_session_active(&self) -> bool {
        self.ar_session_active
    }

    pub fn can_capture(&self) -> bool {
        self.state == LifecycleState::RenderActive
    }

    pub fn capture_unavailable(&mut self, detail: &str) {
        warn!("Capture unavailable: {detail}");
        self.error = Some(UserError::CaptureUnavailable(detail.to_string()));
    }

    pub fn on_capture_result(&mut self, result: Result<PathBuf, CaptureError>) {
        if !self.is_alive() {
            return;
        }

        match result {
            Ok(path) => info!("Saved capture to {}", path.display()),
            Err(error) => self.capture_unavailable(&error.to_string()),
        }
    }

    /// Pushes the controller pose into the scene and refreshes world
    /// matrices. Runs once per frame before draw items are collected.
    pub fn update_scene(&mut self) {
        self.scene.set_model_pose(&self.controller.pose());
        self.scene.update_transforms();
    }

    pub fn draw_items(&self) -> Vec<DrawItem> {
        self.scene.draw_items()
    }

    /// Safe to call more than once. After teardown every deferred completion
    /// is dropped.
    pub fn teardown(&mut self) {
        if self.state == LifecycleState::TornDown {
            return;
        }

        info!("Tearing down");
        self.alive.store(false, Ordering::Relaxed);

        if self.ar_session_active {
            self.ar_session.on_exit();
            self.ar_session_active = false;
        }

        self.scene.clear_model();
        self.model_loaded = false;
        self.set_state(LifecycleState::TornDown);
    }

    pub fn view_model(&self) -> ViewModel {
        let pose = self.controller.pose();

        ViewModel {
            scale: pose.scale,
            rotation: pose.rotation_deg,
            model_loaded: self.model_loaded(),
            loading: self.is_loading(),
            error: self.error().cloned(),
            camera_ready: self.camera_ready(),
            ar_active: self.ar_session_active(),
        }
    }

    pub fn publish(&mut self) {
        let current = self.view_model();
        if self.last_published.as_ref() != Some(&current) {
            debug!(
                "View: scale {:.2}, rotation ({:.1}, {:.1}, {:.1}), model {}, loading {}, camera {}, ar {}, error {:?}",
                current.scale,
                current.rotation.x,
                current.rotation.y,
                current.rotation.z,
                current.model_loaded,
                current.loading,
                current.camera_ready,
                current.ar_active,
                current.error,
            );
            self.last_published = Some(current);
        }
    }
}
