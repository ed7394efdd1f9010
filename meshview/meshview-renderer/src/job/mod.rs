//! Job builder: two-phase construction of render jobs. Phase 1 allocates the
//! job's own output textures and buffers from its descriptor; phase 2 resolves
//! inputs against the sibling list, builds bind groups from the binding plan,
//! and creates the graphics or compute pipeline. Recording is only possible on
//! a finalized `Job`.

use std::num::NonZeroU64;

use crate::descriptor::{
    AttachmentKind, JobDescriptor, JobKind, LoadOp, PassKind, ShaderResourceUsage, StoreOp,
};
use crate::error::{RenderError, Result};
use crate::plan::{self, BindingPlan, BindingSource, CopyPair, PlannedKind};
use crate::registry::{BufferProvider, TextureProvider};

const OUTPUT_TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::STORAGE_BINDING);

/// Clear color for every color attachment.
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.3,
    a: 0.0,
};

/// A job after phase 1: outputs exist, nothing is wired yet.
pub struct PendingJob {
    pub desc: JobDescriptor,
    /// Output textures in declared order, plus the implicit depth texture for
    /// graphics jobs.
    textures: Vec<(String, wgpu::Texture)>,
    /// Output buffers in declared order.
    buffers: Vec<(String, wgpu::Buffer, u64)>,
    /// Shader-resource buffers allocated from declared sizes.
    resource_buffers: Vec<(String, wgpu::Buffer, u64)>,
    /// Views of the declared texture outputs, the job's color targets.
    color_views: Vec<wgpu::TextureView>,
}

impl PendingJob {
    /// Phase 1: copy the descriptor state and create every output resource.
    pub fn create_outputs(
        device: &wgpu::Device,
        desc: JobDescriptor,
        screen: (u32, u32),
    ) -> Result<Self> {
        let mut textures = Vec::new();
        let mut buffers = Vec::new();
        let mut color_views = Vec::new();

        for attachment in &desc.attachments {
            match attachment.kind {
                AttachmentKind::TextureOutput => {
                    let format = attachment.format.texture_format();
                    let texture = device.create_texture(&wgpu::TextureDescriptor {
                        label: Some(&attachment.name),
                        size: wgpu::Extent3d {
                            width: screen.0,
                            height: screen.1,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format,
                        usage: OUTPUT_TEXTURE_USAGE,
                        view_formats: &[format],
                    });
                    color_views.push(texture.create_view(&Default::default()));
                    textures.push((attachment.name.clone(), texture));
                }
                AttachmentKind::BufferOutput => {
                    let mut usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
                    if attachment.indirect {
                        usage |= wgpu::BufferUsages::INDIRECT;
                    }
                    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(&attachment.name),
                        size: attachment.size as u64,
                        usage,
                        mapped_at_creation: false,
                    });
                    buffers.push((attachment.name.clone(), buffer, attachment.size as u64));
                }
                AttachmentKind::TextureInput | AttachmentKind::BufferInput => {}
            }
        }

        // Graphics jobs own a depth target regardless of the declared depth
        // state; siblings may consume it by its well-known name.
        if desc.kind == JobKind::Graphics {
            let depth = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{} Depth", desc.name)),
                size: wgpu::Extent3d {
                    width: screen.0,
                    height: screen.1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Depth32Float,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[wgpu::TextureFormat::Depth32Float],
            });
            textures.push((plan::DEPTH_TEXTURE.to_string(), depth));
        }

        let mut resource_buffers = Vec::new();
        for resource in &desc.shader_resources {
            let Some(size) = resource.size else {
                continue;
            };
            let usage = match resource.usage {
                ShaderResourceUsage::Uniform => {
                    wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
                }
                ShaderResourceUsage::ReadOnlyStorage => {
                    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
                }
                ShaderResourceUsage::ReadWriteStorage => {
                    wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_DST
                        | wgpu::BufferUsages::COPY_SRC
                }
            };
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&resource.name),
                size: size as u64,
                usage,
                mapped_at_creation: false,
            });
            resource_buffers.push((resource.name.clone(), buffer, size as u64));
        }

        Ok(Self {
            desc,
            textures,
            buffers,
            resource_buffers,
            color_views,
        })
    }

    pub fn texture(&self, name: &str) -> Option<&wgpu::Texture> {
        self.textures
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    pub fn buffer(&self, name: &str) -> Option<(&wgpu::Buffer, u64)> {
        self.buffers
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, b, s)| (b, *s))
    }

    pub fn resource_buffer(&self, name: &str) -> Option<(&wgpu::Buffer, u64)> {
        self.resource_buffers
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, b, s)| (b, *s))
    }
}

/// Everything phase 2 produces on top of the phase-1 outputs.
pub struct FinalizedState {
    pub bind_groups: Vec<wgpu::BindGroup>,
    pub render_pipeline: Option<wgpu::RenderPipeline>,
    pub compute_pipeline: Option<wgpu::ComputePipeline>,
    pub copy_pairs: Vec<CopyPair>,
}

/// Shared resources phase 2 binds into every job.
pub struct FinalizeContext<'a> {
    pub device: &'a wgpu::Device,
    pub registry: &'a dyn BufferProvider,
    pub textures: &'a dyn TextureProvider,
    pub default_uniform: &'a wgpu::Buffer,
    pub sampler: &'a wgpu::Sampler,
}

/// Phase 2 for the job at `index`: resolve inputs, realize the binding plan,
/// compile the shader, and build the pipeline. Only borrows the sibling list,
/// so jobs may resolve against parents declared before or after them.
pub fn finalize(
    ctx: &FinalizeContext,
    pendings: &[PendingJob],
    index: usize,
    shader_source: Option<&str>,
) -> Result<FinalizedState> {
    let pending = &pendings[index];
    let desc = &pending.desc;
    let descs: Vec<&JobDescriptor> = pendings.iter().map(|p| &p.desc).collect();
    let inputs = plan::resolve_inputs(&descs, index)?;

    if desc.kind == JobKind::Copy {
        return Ok(FinalizedState {
            bind_groups: Vec::new(),
            render_pipeline: None,
            compute_pipeline: None,
            copy_pairs: plan::copy_pairs(desc, &inputs)?,
        });
    }

    let source = shader_source.ok_or_else(|| RenderError::PipelineBuild {
        job: desc.name.clone(),
        reason: "no shader source".into(),
    })?;
    let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{} Shader Module", desc.name)),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let binding_plan = plan::binding_plan(desc, &inputs);
    let (bind_groups, layouts) = realize_bind_groups(ctx, pendings, index, &binding_plan)?;

    let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().collect();
    let pipeline_layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", desc.name)),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

    let mut state = FinalizedState {
        bind_groups,
        render_pipeline: None,
        compute_pipeline: None,
        copy_pairs: Vec::new(),
    };

    match desc.kind {
        JobKind::Graphics => {
            let targets: Vec<Option<wgpu::ColorTargetState>> = desc
                .color_formats()
                .into_iter()
                .map(|f| {
                    Some(wgpu::ColorTargetState {
                        format: f.texture_format(),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })
                })
                .collect();
            let pipeline = ctx
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&format!("{} Pipeline", desc.name)),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_main"),
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: 48,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &[
                                wgpu::VertexAttribute {
                                    offset: 0,
                                    shader_location: 0,
                                    format: wgpu::VertexFormat::Float32x4,
                                },
                                wgpu::VertexAttribute {
                                    offset: 16,
                                    shader_location: 1,
                                    format: wgpu::VertexFormat::Float32x4,
                                },
                                wgpu::VertexAttribute {
                                    offset: 32,
                                    shader_location: 2,
                                    format: wgpu::VertexFormat::Float32x4,
                                },
                            ],
                        }],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: Some("fs_main"),
                        targets: &targets,
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        strip_index_format: None,
                        front_face: desc.raster.front_face,
                        cull_mode: desc.raster.cull_mode,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: wgpu::TextureFormat::Depth32Float,
                        depth_write_enabled: desc.depth.write_enabled,
                        depth_compare: desc.depth.compare,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState {
                            constant: -1,
                            slope_scale: 0.5,
                            clamp: 1.0,
                        },
                    }),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                });
            state.render_pipeline = Some(pipeline);
        }
        JobKind::Compute => {
            let pipeline = ctx
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(&format!("{} Compute Pipeline", desc.name)),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some("cs_main"),
                    compilation_options: Default::default(),
                    cache: None,
                });
            state.compute_pipeline = Some(pipeline);
        }
        JobKind::Copy => unreachable!("copy jobs return early"),
    }

    Ok(state)
}

fn realize_bind_groups(
    ctx: &FinalizeContext,
    pendings: &[PendingJob],
    index: usize,
    binding_plan: &BindingPlan,
) -> Result<(Vec<wgpu::BindGroup>, Vec<wgpu::BindGroupLayout>)> {
    let pending = &pendings[index];
    let desc = &pending.desc;
    let mut bind_groups = Vec::with_capacity(2);
    let mut layouts = Vec::with_capacity(2);

    for (group_index, group) in [&binding_plan.group0, &binding_plan.group1]
        .into_iter()
        .enumerate()
    {
        let mut layout_entries = Vec::with_capacity(group.len());
        // Views must outlive the bind-group entries referencing them.
        let mut views: Vec<wgpu::TextureView> = Vec::new();

        let unresolved = |binding: &plan::PlannedBinding| RenderError::UnresolvedAttachment {
            job: desc.name.clone(),
            attachment: binding.name.clone(),
            parent: "resource registry".into(),
        };

        enum Bound<'r> {
            Buffer(&'r wgpu::Buffer, u64),
            View(usize),
            Sampler,
        }
        let mut bound: Vec<Bound> = Vec::with_capacity(group.len());

        for planned in group {
            let slot = match &planned.source {
                BindingSource::InputTexture { parent } => {
                    let texture = pendings[*parent]
                        .texture(&planned.name)
                        .ok_or_else(|| unresolved(planned))?;
                    views.push(texture.create_view(&Default::default()));
                    Bound::View(views.len() - 1)
                }
                BindingSource::OwnTexture => {
                    let texture = pending
                        .texture(&planned.name)
                        .ok_or_else(|| unresolved(planned))?;
                    views.push(texture.create_view(&Default::default()));
                    Bound::View(views.len() - 1)
                }
                BindingSource::InputBuffer { parent } => {
                    let (buffer, size) = pendings[*parent]
                        .buffer(&planned.name)
                        .ok_or_else(|| unresolved(planned))?;
                    Bound::Buffer(buffer, size)
                }
                BindingSource::OwnBuffer => {
                    let (buffer, size) = pending
                        .buffer(&planned.name)
                        .ok_or_else(|| unresolved(planned))?;
                    Bound::Buffer(buffer, size)
                }
                BindingSource::OwnResourceBuffer => {
                    let (buffer, size) = pending
                        .resource_buffer(&planned.name)
                        .ok_or_else(|| unresolved(planned))?;
                    Bound::Buffer(buffer, size)
                }
                BindingSource::RegistryBuffer => {
                    let (buffer, size) = ctx
                        .registry
                        .resolve(&planned.name)
                        .ok_or_else(|| unresolved(planned))?;
                    Bound::Buffer(buffer, size)
                }
                BindingSource::RegistryTexture => {
                    let texture = ctx
                        .textures
                        .resolve_texture(&planned.name)
                        .ok_or_else(|| unresolved(planned))?;
                    views.push(texture.create_view(&Default::default()));
                    Bound::View(views.len() - 1)
                }
                BindingSource::DefaultUniform => {
                    Bound::Buffer(ctx.default_uniform, ctx.default_uniform.size())
                }
                BindingSource::SharedSampler => Bound::Sampler,
            };

            let ty = match (&planned.kind, &slot) {
                (PlannedKind::Texture { filterable }, _) => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float {
                        filterable: *filterable,
                    },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                (PlannedKind::Buffer { ty, min_size }, slot) => {
                    let actual = match slot {
                        Bound::Buffer(_, size) => *size,
                        _ => 0,
                    };
                    // The planned minimum is capped by the bound buffer so
                    // small outputs (e.g. a 16-byte counter) stay bindable.
                    let min = min_size.map_or(actual, |m| m.min(actual));
                    wgpu::BindingType::Buffer {
                        ty: *ty,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(min),
                    }
                }
                (PlannedKind::Sampler, _) => {
                    wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering)
                }
            };
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: planned.binding,
                visibility: planned.visibility,
                ty,
                count: None,
            });
            bound.push(slot);
        }

        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Bind Group Layout {group_index}", desc.name)),
                entries: &layout_entries,
            });

        let entries: Vec<wgpu::BindGroupEntry> = group
            .iter()
            .zip(&bound)
            .map(|(planned, slot)| wgpu::BindGroupEntry {
                binding: planned.binding,
                resource: match slot {
                    Bound::Buffer(buffer, _) => buffer.as_entire_binding(),
                    Bound::View(i) => wgpu::BindingResource::TextureView(&views[*i]),
                    Bound::Sampler => wgpu::BindingResource::Sampler(ctx.sampler),
                },
            })
            .collect();

        bind_groups.push(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group {group_index}", desc.name)),
            layout: &layout,
            entries: &entries,
        }));
        layouts.push(layout);
    }

    Ok((bind_groups, layouts))
}

/// A finalized job, ready for per-frame recording.
pub struct Job {
    pub name: String,
    pub kind: JobKind,
    pub pass: PassKind,
    pub dispatch: [u32; 3],
    pub load_op: LoadOp,
    pub store_op: StoreOp,

    textures: Vec<(String, wgpu::Texture)>,
    buffers: Vec<(String, wgpu::Buffer, u64)>,
    resource_buffers: Vec<(String, wgpu::Buffer, u64)>,
    color_views: Vec<wgpu::TextureView>,
    depth_view: Option<wgpu::TextureView>,

    pub bind_groups: Vec<wgpu::BindGroup>,
    pub render_pipeline: Option<wgpu::RenderPipeline>,
    pub compute_pipeline: Option<wgpu::ComputePipeline>,
    pub copy_pairs: Vec<CopyPair>,
}

impl Job {
    pub fn from_parts(pending: PendingJob, state: FinalizedState) -> Self {
        let depth_view = pending
            .texture(plan::DEPTH_TEXTURE)
            .map(|t| t.create_view(&Default::default()));
        Self {
            name: pending.desc.name.clone(),
            kind: pending.desc.kind,
            pass: pending.desc.pass,
            dispatch: pending.desc.dispatch,
            load_op: pending.desc.raster.load_op,
            store_op: pending.desc.raster.store_op,
            textures: pending.textures,
            buffers: pending.buffers,
            resource_buffers: pending.resource_buffers,
            color_views: pending.color_views,
            depth_view,
            bind_groups: state.bind_groups,
            render_pipeline: state.render_pipeline,
            compute_pipeline: state.compute_pipeline,
            copy_pairs: state.copy_pairs,
        }
    }

    pub fn output_texture(&self, name: &str) -> Option<&wgpu::Texture> {
        self.textures
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    pub fn output_buffer(&self, name: &str) -> Option<&wgpu::Buffer> {
        self.buffers
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, b, _)| b)
    }

    pub fn resource_buffer(&self, name: &str) -> Option<&wgpu::Buffer> {
        self.resource_buffers
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, b, _)| b)
    }

    /// Color attachments for this frame, pre-filled with the declared ops and
    /// the fixed clear color.
    pub fn color_attachments(&self) -> Vec<Option<wgpu::RenderPassColorAttachment<'_>>> {
        self.color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match self.load_op {
                            LoadOp::Clear => wgpu::LoadOp::Clear(CLEAR_COLOR),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: match self.store_op {
                            StoreOp::Store => wgpu::StoreOp::Store,
                            StoreOp::Discard => wgpu::StoreOp::Discard,
                        },
                    },
                })
            })
            .collect()
    }

    pub fn depth_attachment(&self) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
        self.depth_view
            .as_ref()
            .map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: match self.load_op {
                        LoadOp::Clear => wgpu::LoadOp::Clear(1.0),
                        LoadOp::Load => wgpu::LoadOp::Load,
                    },
                    store: match self.store_op {
                        StoreOp::Store => wgpu::StoreOp::Store,
                        StoreOp::Discard => wgpu::StoreOp::Discard,
                    },
                }),
                stencil_ops: None,
            })
    }
}
