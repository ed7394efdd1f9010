//! Meshview plugin: owns the renderer and implements ViewerBackend for the
//! host.

use meshview_renderer::{CreateDescriptor, Renderer, RendererConfig};
use render_api::{BlobLoader, FrameView, SelectionInfo, ViewerBackend};

/// What to load and how large to render. Paths are loader-relative.
#[derive(Clone, Debug)]
pub struct ViewerAssets {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Prefix of the packed mesh asset and its companion files.
    pub mesh_file_prefix: String,
    /// Top-level job-pipeline document.
    pub pipeline_file_path: String,
}

/// Owns the wgpu device/queue and the renderer; implements ViewerBackend.
pub struct MeshViewerPlugin {
    renderer: Renderer,
}

impl MeshViewerPlugin {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        assets: &ViewerAssets,
        loader: &dyn BlobLoader,
    ) -> Result<Self, String> {
        // Shared non-filtering sampler; the engine's float32 targets cannot
        // be filtered.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shared_sampler"),
            ..Default::default()
        });
        let renderer = Renderer::setup(CreateDescriptor {
            device,
            queue,
            screen_width: assets.screen_width,
            screen_height: assets.screen_height,
            mesh_file_prefix: assets.mesh_file_prefix.clone(),
            pipeline_file_path: assets.pipeline_file_path.clone(),
            sampler,
            loader,
            config: RendererConfig::default(),
        })
        .map_err(|e| e.to_string())?;
        Ok(Self { renderer })
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn device(&self) -> &wgpu::Device {
        self.renderer.device()
    }

    pub fn queue(&self) -> &wgpu::Queue {
        self.renderer.queue()
    }
}

impl ViewerBackend for MeshViewerPlugin {
    fn draw_frame(&mut self, view: &FrameView) -> Result<(), String> {
        self.renderer.draw(view).map_err(|e| e.to_string())
    }

    fn highlight_selected_mesh(&mut self, x: i32, y: i32) {
        self.renderer.highlight_selected_mesh(x, y);
    }

    fn set_explosion_multiplier(&mut self, value: f32) {
        self.renderer.set_explosion_multiplier(value);
    }

    fn selection_info(&self) -> SelectionInfo {
        self.renderer.selection_info()
    }

    fn set_buffer_data(&mut self, buffer: &str, data: &[u8], offset: u64) -> Result<(), String> {
        self.renderer
            .set_buffer_data(buffer, data, offset)
            .map_err(|e| e.to_string())
    }

    fn set_job_buffer_data(
        &mut self,
        job: &str,
        buffer: &str,
        data: &[u8],
        offset: u64,
    ) -> Result<(), String> {
        self.renderer
            .set_job_buffer_data(job, buffer, data, offset)
            .map_err(|e| e.to_string())
    }

    fn num_meshes(&self) -> u32 {
        self.renderer.num_meshes()
    }

    fn frame_index(&self) -> u32 {
        self.renderer.frame_index()
    }
}
