//! Per-frame command recording. Every job gets one command encoder; passes are
//! recorded in declared order and submitted together, so a failed frame never
//! reaches the queue half-built.

use crate::descriptor::{JobKind, PassKind};
use crate::error::{RenderError, Result};
use crate::job::Job;

/// Frame-wide inputs the recorder needs besides the job itself.
pub struct FrameContext<'a> {
    pub screen: (u32, u32),
    pub num_meshes: u32,
    pub vertex_buffer: &'a wgpu::Buffer,
    pub index_buffer: &'a wgpu::Buffer,
    /// Clip-space triangle bound instead of the mesh vertices for
    /// screen-covering passes.
    pub full_screen_triangle: &'a wgpu::Buffer,
    /// Indirect draw stream and its GPU-written counter, from the culling job.
    pub draw_calls: Option<(&'a wgpu::Buffer, &'a wgpu::Buffer)>,
}

/// Record every job into its own command buffer, in declared order.
pub fn record_frame(
    device: &wgpu::Device,
    jobs: &[Job],
    ctx: &FrameContext,
) -> Result<Vec<wgpu::CommandBuffer>> {
    let mut buffers = Vec::with_capacity(jobs.len());
    for job in jobs {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&job.name),
        });
        match job.kind {
            JobKind::Graphics => record_graphics(&mut encoder, job, ctx)?,
            JobKind::Compute => record_compute(&mut encoder, job)?,
            JobKind::Copy => record_copy(&mut encoder, job, jobs)?,
        }
        buffers.push(encoder.finish());
    }
    Ok(buffers)
}

fn record_graphics(
    encoder: &mut wgpu::CommandEncoder,
    job: &Job,
    ctx: &FrameContext,
) -> Result<()> {
    let Some(pipeline) = &job.render_pipeline else {
        return Err(RenderError::PipelineBuild {
            job: job.name.clone(),
            reason: "graphics job has no pipeline".into(),
        });
    };
    let color_attachments = job.color_attachments();
    let depth_attachment = job.depth_attachment();
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(&job.name),
        color_attachments: &color_attachments,
        depth_stencil_attachment: depth_attachment,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.push_debug_group(&job.name);
    for (group, bind_group) in job.bind_groups.iter().enumerate() {
        pass.set_bind_group(group as u32, bind_group, &[]);
    }
    pass.set_pipeline(pipeline);
    pass.set_index_buffer(ctx.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    let vertex_buffer = match job.pass {
        PassKind::FullTriangle | PassKind::SwapChain => ctx.full_screen_triangle,
        _ => ctx.vertex_buffer,
    };
    pass.set_vertex_buffer(0, vertex_buffer.slice(..));
    pass.set_scissor_rect(0, 0, ctx.screen.0, ctx.screen.1);
    pass.set_viewport(
        0.0,
        0.0,
        ctx.screen.0 as f32,
        ctx.screen.1 as f32,
        0.0,
        1.0,
    );

    match job.pass {
        PassKind::DrawMeshes | PassKind::DepthPrepass => {
            let (draw_calls, num_draw_calls) =
                ctx.draw_calls.ok_or_else(|| RenderError::config(
                    "draw-meshes pass recorded without a culling job",
                ))?;
            pass.multi_draw_indexed_indirect_count(
                draw_calls,
                0,
                num_draw_calls,
                0,
                ctx.num_meshes,
            );
        }
        PassKind::FullTriangle | PassKind::SwapChain => {
            pass.draw(0..3, 0..1);
        }
        PassKind::Compute | PassKind::Copy => {}
    }

    pass.pop_debug_group();
    Ok(())
}

fn record_compute(encoder: &mut wgpu::CommandEncoder, job: &Job) -> Result<()> {
    let Some(pipeline) = &job.compute_pipeline else {
        return Err(RenderError::PipelineBuild {
            job: job.name.clone(),
            reason: "compute job has no pipeline".into(),
        });
    };
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(&job.name),
        timestamp_writes: None,
    });
    pass.push_debug_group(&job.name);
    for (group, bind_group) in job.bind_groups.iter().enumerate() {
        pass.set_bind_group(group as u32, bind_group, &[]);
    }
    pass.set_pipeline(pipeline);
    let [x, y, z] = job.dispatch;
    pass.dispatch_workgroups(x, y, z);
    pass.pop_debug_group();
    Ok(())
}

fn record_copy(encoder: &mut wgpu::CommandEncoder, job: &Job, jobs: &[Job]) -> Result<()> {
    encoder.push_debug_group(&job.name);
    for pair in &job.copy_pairs {
        let missing = || RenderError::UnresolvedAttachment {
            job: job.name.clone(),
            attachment: pair.name.clone(),
            parent: jobs[pair.parent].name.clone(),
        };
        let source = jobs[pair.parent]
            .output_texture(&pair.name)
            .ok_or_else(missing)?;
        let destination = job.output_texture(&pair.name).ok_or_else(missing)?;
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: source,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: destination,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: source.width(),
                height: source.height(),
                depth_or_array_layers: 1,
            },
        );
    }
    encoder.pop_debug_group();
    Ok(())
}
