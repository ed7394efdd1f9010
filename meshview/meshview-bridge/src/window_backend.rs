//! Window-capable backend: created from a window, implements
//! ViewerBackendWindow. The engine renders at a fixed size into its composite
//! texture; this backend blits that texture onto the window surface. The
//! surface is recreated each frame from the raw handles, so the backend never
//! holds a reference into the host's window across events.

use log::warn;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use render_api::{BlobLoader, FrameView, SelectionInfo, ViewerBackend, ViewerBackendWindow};
use wgpu::SurfaceTargetUnsafe;

use crate::blit::BlitPass;
use crate::plugin::{MeshViewerPlugin, ViewerAssets};

pub struct MeshViewerWindowBackend {
    instance: wgpu::Instance,
    plugin: MeshViewerPlugin,
    surface_format: wgpu::TextureFormat,
    blit: Option<BlitPass>,
}

impl MeshViewerWindowBackend {
    /// Create a window-capable backend. The window is only used for adapter
    /// selection; each frame the host passes its raw handles to
    /// `draw_frame_to_window`.
    pub fn from_window(
        window: &(impl HasWindowHandle + HasDisplayHandle),
        assets: ViewerAssets,
        loader: &dyn BlobLoader,
    ) -> Result<Box<dyn ViewerBackendWindow>, String> {
        let (raw_window, raw_display) = {
            let wh = window.window_handle().map_err(|e| e.to_string())?;
            let dh = window.display_handle().map_err(|e| e.to_string())?;
            (wh.as_raw(), dh.as_raw())
        };
        let backend = pollster::block_on(Self::from_raw_handles_async(
            raw_window,
            raw_display,
            assets,
            loader,
        ))?;
        Ok(Box::new(backend))
    }

    async fn from_raw_handles_async(
        raw_window_handle: raw_window_handle::RawWindowHandle,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        assets: ViewerAssets,
        loader: &dyn BlobLoader,
    ) -> Result<Self, String> {
        let instance = wgpu::Instance::default();
        let target = SurfaceTargetUnsafe::RawHandle {
            raw_window_handle,
            raw_display_handle,
        };
        let surface = unsafe {
            instance
                .create_surface_unsafe(target)
                .map_err(|e| e.to_string())?
        };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or("No adapter")?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("meshview_device"),
                    required_features: wgpu::Features::MULTI_DRAW_INDIRECT
                        | wgpu::Features::MULTI_DRAW_INDIRECT_COUNT,
                    required_limits: wgpu::Limits {
                        max_buffer_size: 1_000_000_000,
                        ..wgpu::Limits::default()
                    },
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| e.to_string())?;
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .first()
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);
        let plugin = MeshViewerPlugin::new(device, queue, &assets, loader)?;
        drop(surface);
        Ok(Self {
            instance,
            plugin,
            surface_format,
            blit: None,
        })
    }

    fn surface_config(
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> wgpu::SurfaceConfiguration {
        wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        }
    }
}

impl ViewerBackend for MeshViewerWindowBackend {
    fn draw_frame(&mut self, view: &FrameView) -> Result<(), String> {
        self.plugin.draw_frame(view)
    }

    fn highlight_selected_mesh(&mut self, x: i32, y: i32) {
        self.plugin.highlight_selected_mesh(x, y);
    }

    fn set_explosion_multiplier(&mut self, value: f32) {
        self.plugin.set_explosion_multiplier(value);
    }

    fn selection_info(&self) -> SelectionInfo {
        self.plugin.selection_info()
    }

    fn set_buffer_data(&mut self, buffer: &str, data: &[u8], offset: u64) -> Result<(), String> {
        self.plugin.set_buffer_data(buffer, data, offset)
    }

    fn set_job_buffer_data(
        &mut self,
        job: &str,
        buffer: &str,
        data: &[u8],
        offset: u64,
    ) -> Result<(), String> {
        self.plugin.set_job_buffer_data(job, buffer, data, offset)
    }

    fn num_meshes(&self) -> u32 {
        self.plugin.num_meshes()
    }

    fn frame_index(&self) -> u32 {
        self.plugin.frame_index()
    }
}

impl ViewerBackendWindow for MeshViewerWindowBackend {
    fn draw_frame_to_window(
        &mut self,
        view: &FrameView,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
    ) -> Result<(), String> {
        let target = SurfaceTargetUnsafe::RawHandle {
            raw_window_handle,
            raw_display_handle,
        };
        let surface = unsafe {
            self.instance
                .create_surface_unsafe(target)
                .map_err(|e| e.to_string())?
        };
        let (width, height) = view.viewport_size;
        let config = Self::surface_config(self.surface_format, width.max(1), height.max(1));
        surface.configure(self.plugin.device(), &config);

        // Render the frame first; a dropped frame skips presentation too.
        self.plugin.draw_frame(view)?;

        let frame = match surface.get_current_texture() {
            Ok(f) => f,
            Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                surface.configure(self.plugin.device(), &config);
                surface.get_current_texture().map_err(|e| e.to_string())?
            }
            Err(e) => {
                warn!("surface unavailable, skipping present: {e}");
                return Ok(());
            }
        };

        let source = self
            .plugin
            .renderer()
            .swap_chain_texture()
            .ok_or("renderer has no swap-chain output configured")?
            .create_view(&Default::default());
        let target_view = frame.texture.create_view(&Default::default());

        if self.blit.as_ref().map(|b| b.format()) != Some(config.format) {
            self.blit = Some(BlitPass::new(self.plugin.device(), config.format));
        }
        let blit = self.blit.as_ref().ok_or("blit pass missing")?;

        let mut encoder =
            self.plugin
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("present_blit"),
                });
        blit.encode(self.plugin.device(), &mut encoder, &source, &target_view);
        self.plugin.queue().submit([encoder.finish()]);
        frame.present();
        Ok(())
    }
}
