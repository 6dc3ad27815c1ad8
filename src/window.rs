use std::sync::Arc;

use anyhow::Context;
use glam::Vec2;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent},
    event_loop::EventLoop,
    keyboard::{Key, NamedKey},
    window::Window,
};

use crate::{
    camera_feed::{CameraEvent, CameraFeed},
    capture,
    config::ViewerConfig,
    pose::RotationAxis,
    rendering::renderer::Renderer,
    view::{LifecycleState, Viewer},
};

/// Mouse drags share the one-finger gesture path under a reserved pointer id.
const MOUSE_POINTER_ID: u64 = u64::MAX;
const HEADING_STEP_DEG: f32 = 5.0;
const SCALE_STEP: f32 = 0.1;
const ROTATION_STEP_DEG: f32 = 15.0;

const MODEL_EXTENSIONS: [&str; 6] = ["gltf", "glb", "fbx", "obj", "stl", "ply"];

struct App {
    config: ViewerConfig,
    renderer: Option<Renderer>,
    viewer: Viewer,
    camera: Option<CameraFeed>,
    pending_resize: Option<PhysicalSize<u32>>,
    mouse_pos: Vec2,
    mouse_down: bool,
    heading_deg: f32,
}

impl App {
    fn from_config(config: ViewerConfig) -> Self {
        let viewer = Viewer::new(config.clone());

        Self {
            config,
            renderer: None,
            viewer,
            camera: None,
            pending_resize: None,
            mouse_pos: Vec2::ZERO,
            mouse_down: false,
            heading_deg: 0.0,
        }
    }

    fn open_file_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("3D models", &MODEL_EXTENSIONS)
            .pick_file()
        else {
            return;
        };

        self.viewer.on_file_selected(&path);
    }

    fn handle_key(&mut self, key: Key<&str>, event_loop: &winit::event_loop::ActiveEventLoop) {
        match key {
            Key::Character("o" | "O") => self.open_file_dialog(),
            Key::Character("r" | "R") => self.viewer.on_reset(),
            Key::Character("c" | "C") => self.capture(),
            Key::Character("g" | "G") => self.viewer.on_toggle_compass(),
            Key::Character("a" | "A") => self.viewer.toggle_ar_session(),
            Key::Character("x" | "X") => self.step_rotation(RotationAxis::X),
            Key::Character("y" | "Y") => self.step_rotation(RotationAxis::Y),
            Key::Character("z" | "Z") => self.step_rotation(RotationAxis::Z),
            Key::Named(NamedKey::ArrowUp) => {
                let scale = self.viewer.controller.pose().scale;
                self.viewer.on_scale_changed(scale + SCALE_STEP);
            }
            Key::Named(NamedKey::ArrowDown) => {
                let scale = self.viewer.controller.pose().scale;
                self.viewer.on_scale_changed(scale - SCALE_STEP);
            }
            Key::Named(NamedKey::ArrowLeft) => {
                self.heading_deg -= HEADING_STEP_DEG;
                self.viewer.set_heading(self.heading_deg);
            }
            Key::Named(NamedKey::ArrowRight) => {
                self.heading_deg += HEADING_STEP_DEG;
                self.viewer.set_heading(self.heading_deg);
            }
            Key::Named(NamedKey::Escape) => self.shutdown(event_loop),
            _ => (),
        }
    }

    fn step_rotation(&mut self, axis: RotationAxis) {
        let rotation = self.viewer.controller.pose().rotation_deg;
        let current = match axis {
            RotationAxis::X => rotation.x,
            RotationAxis::Y => rotation.y,
            RotationAxis::Z => rotation.z,
        };
        self.viewer.on_rotation_changed(axis, current + ROTATION_STEP_DEG);
    }

    /// Tears the viewer down, releases the camera feed and GPU meshes, and
    /// quits. Safe to hit twice; teardown is idempotent.
    fn shutdown(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        self.viewer.teardown();
        self.camera = None;
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.clear_model();
        }
        event_loop.exit();
    }

    fn capture(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        if !self.viewer.can_capture() {
            self.viewer.capture_unavailable("viewer is not rendering yet");
            return;
        }

        self.viewer.update_scene();
        let items = self.viewer.draw_items();
        let result = renderer
            .capture(&items)
            .and_then(|image| capture::save_png(&image, &self.config.capture_dir));

        self.viewer.on_capture_result(result);
    }

    fn frame(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        // Queued redraws can still arrive while the loop is exiting
        if self.viewer.state() == LifecycleState::TornDown {
            return;
        }

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        renderer.window.request_redraw();

        if let Some(camera) = self.camera.as_mut() {
            match camera.poll() {
                Some(CameraEvent::Frame(frame)) => {
                    renderer.update_camera_frame(&frame);
                    self.viewer.on_camera_frame();
                }
                Some(CameraEvent::Failed(error)) => {
                    self.viewer.on_camera_failed(error);
                }
                None => (),
            }
        }

        if let Some(outcome) = self.viewer.poll_import() {
            match outcome.result {
                Ok(model) => {
                    let handles = renderer.set_model(&model.meshes);
                    self.viewer.commit_model(&model, &handles);
                }
                Err(error) => {
                    // The previous model and its GPU meshes stay untouched.
                    self.viewer.fail_import(error);
                }
            }
        }

        if let Some(new_size) = self.pending_resize.take() {
            renderer.resize(new_size);
        }

        self.viewer.update_scene();
        let items = self.viewer.draw_items();

        match renderer.render(&items) {
            Ok(()) => {
                self.viewer.on_rendered();
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                renderer.resize(renderer.size);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of memory");
                event_loop.exit();
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timeout");
            }
            Err(other) => {
                log::error!("Unexpected error: {:?}", other);
            }
        }

        self.viewer.publish();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes().with_title("arview");
        let window = event_loop.create_window(window_attributes).unwrap();
        let renderer = pollster::block_on(Renderer::new(Arc::new(window))).unwrap();
        renderer.window.request_redraw();
        self.renderer = Some(renderer);

        self.viewer.begin_startup();
        self.camera = Some(CameraFeed::open(self.config.camera_index));
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Resized(new_size) => {
                // Coalesced; only the newest size is applied, once per frame.
                self.pending_resize = Some(new_size);
            }
            WindowEvent::DroppedFile(path) => {
                self.viewer.on_file_selected(&path);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    self.handle_key(event.logical_key.as_ref(), event_loop);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse_pos = Vec2::new(position.x as f32, position.y as f32);
                if self.mouse_down {
                    self.viewer
                        .controller
                        .touch_moved(MOUSE_POINTER_ID, self.mouse_pos);
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    self.mouse_down = true;
                    self.viewer
                        .controller
                        .touch_started(MOUSE_POINTER_ID, self.mouse_pos);
                }
                ElementState::Released => {
                    self.mouse_down = false;
                    self.viewer.controller.touch_ended(MOUSE_POINTER_ID);
                }
            },
            WindowEvent::MouseWheel { delta, .. } => {
                let factor = match delta {
                    MouseScrollDelta::LineDelta(_, y) => 1.0 + y * 0.1,
                    MouseScrollDelta::PixelDelta(position) => 1.0 + position.y as f32 * 0.001,
                };
                self.viewer.controller.zoom_by(factor);
            }
            WindowEvent::Touch(touch) => {
                let position = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                match touch.phase {
                    TouchPhase::Started => {
                        self.viewer.controller.touch_started(touch.id, position)
                    }
                    TouchPhase::Moved => self.viewer.controller.touch_moved(touch.id, position),
                    TouchPhase::Ended => self.viewer.controller.touch_ended(touch.id),
                    TouchPhase::Cancelled => self.viewer.controller.touch_cancelled(touch.id),
                }
            }
            WindowEvent::RedrawRequested => {
                self.frame(event_loop);
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            renderer.window.request_redraw();
        }
    }
}

pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::from_config(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
