//! Meshview renderer: a data-driven wgpu render graph for an interactive mesh
//! viewer. A declarative job pipeline (JSON) is compiled into graphics,
//! compute, and copy passes with their bind groups wired across jobs; each
//! frame the executor updates the shared uniforms, records every pass in
//! declared order, and services the asynchronous mesh-selection read-back.

pub mod asset;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod graph;
pub mod job;
pub mod plan;
pub mod readback;
pub mod registry;
pub mod uniforms;

use bytemuck::{Pod, Zeroable};
use log::{info, warn};
use render_api::{BlobLoader, FrameView, SelectionInfo};

use asset::{MeshAsset, Vertex};
pub use config::RendererConfig;
pub use error::RenderError;
use error::Result;
use frame::FrameContext;
use job::Job;
use readback::{SelectMeshInfo, SelectionReadback, SelectionStep};
use registry::ResourceRegistry;
use uniforms::{DefaultUniformData, FrameConstants};

/// Everything the host supplies to bring the renderer up.
pub struct CreateDescriptor<'a> {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Asset path prefix; the renderer loads `<prefix>-triangles.bin`,
    /// `<prefix>.mid`, and `<prefix>.mat` through the loader.
    pub mesh_file_prefix: String,
    /// Path of the top-level job-pipeline document.
    pub pipeline_file_path: String,
    /// Shared non-filtering sampler bound into every pipeline that samples.
    pub sampler: wgpu::Sampler,
    pub loader: &'a dyn BlobLoader,
    pub config: RendererConfig,
}

/// Uniform written into the culling and deferred jobs: mesh count plus the
/// explode-animation multiplier.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ExplodeUniform {
    num_meshes: u32,
    multiplier: f32,
}

/// Uniform driving the selection shader: the currently selected mesh id and
/// the cursor coordinate still being probed (-1 when idle).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SelectionUniform {
    selected_mesh: i32,
    x: i32,
    y: i32,
}

/// Job indices the executor resolved once from the configured names.
struct WellKnownJobs {
    culling: Option<usize>,
    deferred: Option<usize>,
    selection: Option<usize>,
    swap_chain: Option<usize>,
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RendererConfig,
    screen: (u32, u32),

    registry: ResourceRegistry,
    jobs: Vec<Job>,
    order: Vec<String>,
    known: WellKnownJobs,

    num_meshes: u32,
    frame: u32,

    explosion_multiplier: f32,
    explosion_dirty: bool,

    light_radiance: [f32; 4],
    light_direction: [f32; 4],
    ambient_occlusion_distance_threshold: f32,

    readback: SelectionReadback,
}

impl Renderer {
    /// Load the mesh asset, create the global buffers, and compile the whole
    /// job graph. Every configuration problem surfaces here, before the first
    /// frame.
    pub fn setup(desc: CreateDescriptor) -> Result<Self> {
        let CreateDescriptor {
            device,
            queue,
            screen_width,
            screen_height,
            mesh_file_prefix,
            pipeline_file_path,
            sampler,
            loader,
            config,
        } = desc;
        let screen = (screen_width, screen_height);

        let mesh_bytes = loader.load(&format!("{mesh_file_prefix}-triangles.bin"))?;
        let mesh = MeshAsset::parse(&mesh_bytes)?;
        let num_meshes = mesh.num_meshes();
        info!(
            "mesh asset: {} meshes, {} vertices, {} triangles",
            num_meshes,
            mesh.vertices.len(),
            mesh.indices.len() / 3
        );

        let material_ids = loader.load(&format!("{mesh_file_prefix}.mid"))?;
        let materials = loader.load(&format!("{mesh_file_prefix}.mat"))?;

        let mut registry = ResourceRegistry::new();
        create_global_buffers(
            &device,
            &queue,
            &mut registry,
            &mesh,
            &material_ids,
            &materials,
        )?;

        let assembled = {
            let default_uniform = registry
                .buffer(registry::DEFAULT_UNIFORM_BUFFER)
                .ok_or_else(|| RenderError::config("default uniform buffer missing"))?;
            graph::assemble(
                &device,
                loader,
                &pipeline_file_path,
                screen,
                &registry,
                default_uniform,
                &sampler,
            )?
        };
        let jobs = assembled.jobs;
        let order = assembled.order;

        let known = resolve_well_known(&jobs, &config)?;

        // Seed the culling uniform so the first frame culls with sane values
        // even before the host touches the explode multiplier.
        if let Some(cull) = known.culling {
            if let Some(buffer) = jobs[cull].resource_buffer(&config.culling_uniform) {
                let seed = ExplodeUniform {
                    num_meshes,
                    multiplier: 1.0,
                };
                queue.write_buffer(buffer, 0, bytemuck::bytes_of(&seed));
            }
        }

        let readback = SelectionReadback::new(&device);

        Ok(Self {
            device,
            queue,
            config,
            screen,
            registry,
            jobs,
            order,
            known,
            num_meshes,
            frame: 0,
            explosion_multiplier: 0.0,
            explosion_dirty: false,
            light_radiance: [1.0, 1.0, 1.0, 1.0],
            light_direction: [0.3, -0.8, 0.5, 1.0],
            ambient_occlusion_distance_threshold: 0.0,
            readback,
        })
    }

    /// Render one frame. A failed frame is dropped whole (nothing partial is
    /// submitted) and the frame counter still advances.
    pub fn draw(&mut self, view: &FrameView) -> Result<()> {
        let result = self.draw_inner(view);
        if let Err(e) = &result {
            warn!("frame {} dropped: {e}", self.frame);
        }
        self.frame += 1;
        result
    }

    fn draw_inner(&mut self, view: &FrameView) -> Result<()> {
        // 1. Per-frame uniforms.
        let constants = FrameConstants {
            screen: self.screen,
            frame: self.frame,
            num_meshes: self.num_meshes,
            rand: [
                rand::random::<f32>(),
                rand::random::<f32>(),
                rand::random::<f32>(),
                rand::random::<f32>(),
            ],
            light_radiance: self.light_radiance,
            light_direction: self.light_direction,
            ambient_occlusion_distance_threshold: self.ambient_occlusion_distance_threshold,
        };
        let uniform: DefaultUniformData = uniforms::compose(view, &constants);
        let default_uniform = self
            .registry
            .buffer(registry::DEFAULT_UNIFORM_BUFFER)
            .ok_or_else(|| RenderError::config("default uniform buffer missing"))?;
        self.queue
            .write_buffer(default_uniform, 0, bytemuck::bytes_of(&uniform));

        // 2. Reset the GPU-written draw counter.
        if let Some(cull) = self.known.culling {
            if let Some(counter) =
                self.jobs[cull].output_buffer(&self.config.draw_count_attachment)
            {
                self.queue.write_buffer(counter, 0, &[0u8; 16]);
            }
        }

        // 3. Deferred uniform fan-out.
        if self.explosion_dirty {
            if let Some(buffer) = self
                .known
                .deferred
                .and_then(|i| self.jobs[i].resource_buffer(&self.config.indirect_uniform))
            {
                let data = ExplodeUniform {
                    num_meshes: self.num_meshes,
                    multiplier: self.explosion_multiplier,
                };
                self.queue.write_buffer(buffer, 0, bytemuck::bytes_of(&data));
                self.explosion_dirty = false;
            }
        }
        match self.readback.tracker.begin_frame() {
            SelectionStep::BeginProbe { x, y } => {
                self.write_selection_uniform(SelectionUniform {
                    selected_mesh: -1,
                    x,
                    y,
                });
            }
            SelectionStep::Collect => {
                self.readback.collect_lossy(&self.device);
                let info = self.readback.tracker.info();
                self.write_selection_uniform(SelectionUniform {
                    selected_mesh: info.mesh_id,
                    x: -1,
                    y: -1,
                });
            }
            SelectionStep::None => {}
        }

        // 4. Record every job in declared order.
        let vertex_buffer = self
            .registry
            .buffer(registry::VERTEX_BUFFER)
            .ok_or_else(|| RenderError::config("vertex buffer missing"))?;
        let index_buffer = self
            .registry
            .buffer(registry::INDEX_BUFFER)
            .ok_or_else(|| RenderError::config("index buffer missing"))?;
        let full_screen_triangle = self
            .registry
            .buffer(registry::FULL_SCREEN_TRIANGLE)
            .ok_or_else(|| RenderError::config("full-screen triangle buffer missing"))?;
        let draw_calls = self.known.culling.and_then(|i| {
            let job = &self.jobs[i];
            Some((
                job.output_buffer(&self.config.draw_calls_attachment)?,
                job.output_buffer(&self.config.draw_count_attachment)?,
            ))
        });
        let ctx = FrameContext {
            screen: self.screen,
            num_meshes: self.num_meshes,
            vertex_buffer,
            index_buffer,
            full_screen_triangle,
            draw_calls,
        };
        let mut command_buffers = frame::record_frame(&self.device, &self.jobs, &ctx)?;

        // 5. Append the selection read-back copy.
        if self.readback.tracker.wants_copy() {
            let source = self
                .known
                .selection
                .and_then(|i| self.jobs[i].resource_buffer(&self.config.selection_result_buffer));
            if let Some(source) = source {
                let mut encoder =
                    self.device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("Selection Copy"),
                        });
                self.readback.record_copy(&mut encoder, source);
                command_buffers.push(encoder.finish());
                self.readback.tracker.copy_recorded();
            } else {
                warn!("selection requested but no selection job is configured");
                self.readback.tracker.fail();
            }
        }

        // 6. Submit everything at once.
        self.queue.submit(command_buffers);
        Ok(())
    }

    fn write_selection_uniform(&self, data: SelectionUniform) {
        let buffer = self
            .known
            .selection
            .and_then(|i| self.jobs[i].resource_buffer(&self.config.selection_uniform));
        if let Some(buffer) = buffer {
            self.queue.write_buffer(buffer, 0, bytemuck::bytes_of(&data));
        }
    }

    /// The final composite texture the host blits to its surface.
    pub fn swap_chain_texture(&self) -> Option<&wgpu::Texture> {
        self.known
            .swap_chain
            .and_then(|i| self.jobs[i].output_texture(&self.config.swap_chain_attachment))
    }

    /// Write into a named global buffer (e.g. `visibilityFlags`).
    pub fn set_buffer_data(&self, buffer: &str, data: &[u8], offset: u64) -> Result<()> {
        let target = self
            .registry
            .buffer(buffer)
            .ok_or_else(|| RenderError::config(format!("no global buffer {buffer:?}")))?;
        self.queue.write_buffer(target, offset, data);
        Ok(())
    }

    /// Write into a job's shader-resource buffer.
    pub fn set_job_buffer_data(
        &self,
        job: &str,
        buffer: &str,
        data: &[u8],
        offset: u64,
    ) -> Result<()> {
        let target = self
            .jobs
            .iter()
            .find(|j| j.name == job)
            .and_then(|j| j.resource_buffer(buffer))
            .ok_or_else(|| {
                RenderError::config(format!("no buffer {buffer:?} in job {job:?}"))
            })?;
        self.queue.write_buffer(target, offset, data);
        Ok(())
    }

    /// Begin a selection probe at the given framebuffer coordinate.
    pub fn highlight_selected_mesh(&mut self, x: i32, y: i32) {
        self.readback.tracker.request(x, y);
    }

    /// Schedule the explode multiplier for the next frame's uniform fan-out.
    pub fn set_explosion_multiplier(&mut self, value: f32) {
        self.explosion_multiplier = value;
        self.explosion_dirty = true;
    }

    pub fn set_light(&mut self, direction: [f32; 3], radiance: [f32; 3]) {
        self.light_direction = [direction[0], direction[1], direction[2], 1.0];
        self.light_radiance = [radiance[0], radiance[1], radiance[2], 1.0];
    }

    pub fn set_ambient_occlusion_distance_threshold(&mut self, value: f32) {
        self.ambient_occlusion_distance_threshold = value;
    }

    /// Latest completed selection, in host terms (-1 means background).
    pub fn selection_info(&self) -> SelectionInfo {
        let info: SelectMeshInfo = self.readback.tracker.info();
        SelectionInfo {
            mesh_id: info.mesh_id,
            coord: (info.selection_x, info.selection_y),
            min_position: info.min_position,
            max_position: info.max_position,
        }
    }

    pub fn num_meshes(&self) -> u32 {
        self.num_meshes
    }

    pub fn frame_index(&self) -> u32 {
        self.frame
    }

    /// Job names in execution order.
    pub fn ordered_jobs(&self) -> &[String] {
        &self.order
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

fn create_global_buffers(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    registry: &mut ResourceRegistry,
    mesh: &MeshAsset,
    material_ids: &[u8],
    materials: &[u8],
) -> Result<()> {
    let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);

    let buffer = registry.create_buffer(
        device,
        registry::VERTEX_BUFFER,
        vertex_bytes.len() as u64,
        wgpu::BufferUsages::VERTEX | storage,
    )?;
    queue.write_buffer(buffer, 0, vertex_bytes);

    let buffer = registry.create_buffer(
        device,
        registry::INDEX_BUFFER,
        index_bytes.len() as u64,
        wgpu::BufferUsages::INDEX | storage,
    )?;
    queue.write_buffer(buffer, 0, index_bytes);

    let ranges: &[u8] = bytemuck::cast_slice(&mesh.triangle_ranges);
    let buffer = registry.create_buffer(
        device,
        registry::MESH_TRIANGLE_RANGES,
        ranges.len() as u64,
        storage,
    )?;
    queue.write_buffer(buffer, 0, ranges);

    let extents: &[u8] = bytemuck::cast_slice(&mesh.extents);
    let buffer =
        registry.create_buffer(device, registry::MESH_EXTENTS, extents.len() as u64, storage)?;
    queue.write_buffer(buffer, 0, extents);

    let buffer = registry.create_buffer(
        device,
        registry::MESH_MATERIAL_IDS,
        material_ids.len() as u64,
        storage,
    )?;
    queue.write_buffer(buffer, 0, material_ids);

    let buffer = registry.create_buffer(
        device,
        registry::MESH_MATERIALS,
        materials.len() as u64,
        storage,
    )?;
    queue.write_buffer(buffer, 0, materials);

    // Every sub-mesh starts visible; the host flips flags through
    // `set_buffer_data`.
    let visibility = vec![1u32; mesh.num_meshes() as usize];
    let buffer = registry.create_buffer(
        device,
        registry::VISIBILITY_FLAGS,
        (visibility.len() * 4) as u64,
        storage,
    )?;
    queue.write_buffer(buffer, 0, bytemuck::cast_slice(&visibility));

    registry.create_buffer(
        device,
        registry::DEFAULT_UNIFORM_BUFFER,
        uniforms::DEFAULT_UNIFORM_SIZE,
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    )?;

    let triangle = full_screen_triangle();
    let triangle_bytes: &[u8] = bytemuck::cast_slice(&triangle);
    let buffer = registry.create_buffer(
        device,
        registry::FULL_SCREEN_TRIANGLE,
        triangle_bytes.len() as u64,
        wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    )?;
    queue.write_buffer(buffer, 0, triangle_bytes);

    registry.create_buffer(
        device,
        registry::BLUE_NOISE_BUFFER,
        256 * 8,
        storage,
    )?;

    Ok(())
}

/// A single clip-space triangle covering the screen, with UVs continuing past
/// the visible edge so the fragment stage sees [0,1] across the viewport.
fn full_screen_triangle() -> [Vertex; 3] {
    [
        Vertex {
            position: [-1.0, 3.0, 0.0, 1.0],
            uv: [0.0, -1.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0, 1.0],
        },
        Vertex {
            position: [-1.0, -1.0, 0.0, 1.0],
            uv: [0.0, 1.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0, 1.0],
        },
        Vertex {
            position: [3.0, -1.0, 0.0, 1.0],
            uv: [2.0, 1.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0, 1.0],
        },
    ]
}

fn resolve_well_known(jobs: &[Job], config: &RendererConfig) -> Result<WellKnownJobs> {
    let find = |name: &str| jobs.iter().position(|j| j.name == name);
    let known = WellKnownJobs {
        culling: find(&config.culling_job),
        deferred: find(&config.deferred_job),
        selection: find(&config.selection_job),
        swap_chain: find(&config.swap_chain_job),
    };

    let needs_culling = jobs.iter().any(|j| {
        matches!(
            j.pass,
            descriptor::PassKind::DrawMeshes | descriptor::PassKind::DepthPrepass
        )
    });
    if needs_culling {
        let cull = known.culling.ok_or_else(|| {
            RenderError::config(format!(
                "pipeline draws meshes but has no culling job {:?}",
                config.culling_job
            ))
        })?;
        let job = &jobs[cull];
        if job.output_buffer(&config.draw_calls_attachment).is_none()
            || job.output_buffer(&config.draw_count_attachment).is_none()
        {
            return Err(RenderError::config(format!(
                "culling job {:?} lacks {:?} or {:?} outputs",
                config.culling_job, config.draw_calls_attachment, config.draw_count_attachment
            )));
        }
    }
    Ok(known)
}
