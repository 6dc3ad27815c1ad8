use std::sync::{mpsc, Arc};

use anyhow::Context;
use image::RgbaImage;
use wgpu::CommandEncoderDescriptor;
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    camera_feed::CameraFrame,
    capture::{self, CaptureError},
    formats::MeshData,
    rendering::{
        camera_background::BackgroundPass,
        mesh::GpuMesh,
        model_pass::{ModelPass, SceneUniform},
        texture::{CameraTexture, DepthTexture},
    },
    scene_graph::{node::MeshHandle, scene::DrawItem},
};

pub struct Renderer {
    pub window: Arc<Window>,
    pub size: PhysicalSize<u32>,

    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    depth_texture: DepthTexture,
    camera_texture: Option<CameraTexture>,

    background_pass: BackgroundPass,
    model_pass: ModelPass,

    meshes: Vec<GpuMesh>,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Renderer> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No compatible graphics adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to create device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        let depth_texture = DepthTexture::new(&device, &config, "Depth texture");
        let background_pass = BackgroundPass::new(&device, config.format);
        let model_pass = ModelPass::new(&device, config.format);
        model_pass.update(&queue, SceneUniform::new(config.width, config.height));

        Ok(Self {
            window: window.clone(),
            size,
            surface,
            device,
            queue,
            config,
            depth_texture,
            camera_texture: None,
            background_pass,
            model_pass,
            meshes: Vec::new(),
        })
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture.resize(&self.device, &self.config);
            self.model_pass
                .update(&self.queue, SceneUniform::new(new_size.width, new_size.height));
            self.refresh_background_uv();
        }
    }

    /// Uploads the newest camera frame, recreating the texture when the feed
    /// resolution changes.
    pub fn update_camera_frame(&mut self, frame: &CameraFrame) {
        let needs_new_texture = !self
            .camera_texture
            .as_ref()
            .is_some_and(|texture| texture.matches(frame));

        if needs_new_texture {
            let texture = CameraTexture::new(&self.device, frame.width, frame.height);
            self.background_pass
                .set_camera_texture(&self.device, &texture);
            self.camera_texture = Some(texture);
            self.refresh_background_uv();
        }

        if let Some(texture) = &self.camera_texture {
            texture.upload(&self.queue, frame);
        }
    }

    fn refresh_background_uv(&self) {
        if let Some(texture) = &self.camera_texture {
            let (scale, offset) = capture::cover_uv_transform(
                texture.width,
                texture.height,
                self.config.width,
                self.config.height,
            );
            self.background_pass
                .update_uv_transform(&self.queue, scale, offset);
        }
    }

    /// Replaces the resident model wholesale. Buffers of the previous model
    /// are released on drop.
    pub fn set_model(&mut self, meshes: &[MeshData]) -> Vec<MeshHandle> {
        self.meshes = meshes
            .iter()
            .enumerate()
            .map(|(index, data)| GpuMesh::upload(&self.device, data, index))
            .collect();

        (0..self.meshes.len()).map(MeshHandle).collect()
    }

    pub fn clear_model(&mut self) {
        self.meshes.clear();
    }

    fn encode_passes(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        items: &[DrawItem],
    ) {
        for item in items {
            if let Some(mesh) = self.meshes.get(item.mesh.0) {
                mesh.write_instance(&self.queue, item.world);
            }
        }

        self.background_pass.render(encoder, color_view);

        self.model_pass
            .render(encoder, color_view, depth_view, |render_pass| {
                for item in items {
                    let Some(mesh) = self.meshes.get(item.mesh.0) else {
                        continue;
                    };

                    render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    render_pass.set_vertex_buffer(1, mesh.instance_buffer.slice(..));
                    render_pass
                        .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            });
    }

    pub fn render(&mut self, items: &[DrawItem]) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Render encoder"),
            });

        self.encode_passes(&mut encoder, &view, &self.depth_texture.view(), items);

        let command_buffer = encoder.finish();
        self.queue.submit([command_buffer]);

        output.present();

        Ok(())
    }

    /// Renders the current composite offscreen and reads it back as RGBA.
    /// Blocks until the GPU finishes.
    pub fn capture(&mut self, items: &[DrawItem]) -> Result<RgbaImage, CaptureError> {
        let width = self.config.width;
        let height = self.config.height;

        let target = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Capture target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.config.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = 4 * width;
        let padded_bytes_per_row =
            unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
                * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture readback buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Capture encoder"),
            });

        self.encode_passes(&mut encoder, &target_view, &self.depth_texture.view(), items);

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit([encoder.finish()]);

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| CaptureError::Readback(err.to_string()))?;

        rx.recv()
            .map_err(|_| CaptureError::Readback("map callback never ran".to_string()))?
            .map_err(|err| CaptureError::Readback(err.to_string()))?;

        let mut pixels = Vec::with_capacity((4 * width * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
            }
        }
        readback.unmap();

        match self.config.format {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {}
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
                for pixel in pixels.chunks_exact_mut(4) {
                    pixel.swap(0, 2);
                }
            }
            other => {
                return Err(CaptureError::Format(format!(
                    "surface format {other:?} is not an 8-bit RGBA variant"
                )));
            }
        }

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| CaptureError::Readback("pixel buffer size mismatch".to_string()))
    }
}
