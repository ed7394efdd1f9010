//! Graph assembler: streams the job-pipeline document, runs phase 1 for every
//! declared job in order, then re-runs phase 2 with the full sibling list.
//! Declaration order is execution order; an input may reference a job declared
//! earlier or later because every output already exists when wiring starts.

use log::debug;
use render_api::BlobLoader;

use crate::descriptor::{self, JobKind};
use crate::error::{RenderError, Result};
use crate::job::{self, FinalizeContext, Job, PendingJob};
use crate::plan;
use crate::registry::ResourceRegistry;

pub struct AssembledGraph {
    /// Finalized jobs in execution order.
    pub jobs: Vec<Job>,
    /// Job names in execution order, matching `jobs`.
    pub order: Vec<String>,
}

pub fn assemble(
    device: &wgpu::Device,
    loader: &dyn BlobLoader,
    job_set_path: &str,
    screen: (u32, u32),
    registry: &ResourceRegistry,
    default_uniform: &wgpu::Buffer,
    sampler: &wgpu::Sampler,
) -> Result<AssembledGraph> {
    let entries = descriptor::parse_job_set(&loader.load(job_set_path)?)?;
    let order = plan::execution_order(&entries);

    let mut pendings = Vec::with_capacity(entries.len());
    for entry in &entries {
        let pipeline_bytes = loader.load(&format!("render-jobs/{}", entry.pipeline))?;
        let desc = descriptor::parse_pipeline(entry, &pipeline_bytes)?;
        debug!(
            "job {:?}: {:?}/{:?}, {} attachments, {} shader resources",
            desc.name,
            desc.kind,
            desc.pass,
            desc.attachments.len(),
            desc.shader_resources.len()
        );
        pendings.push(PendingJob::create_outputs(device, desc, screen)?);
    }

    let ctx = FinalizeContext {
        device,
        registry,
        textures: registry,
        default_uniform,
        sampler,
    };

    let mut finalized = Vec::with_capacity(pendings.len());
    for index in 0..pendings.len() {
        let desc = &pendings[index].desc;
        let shader_source = match (&desc.shader, desc.kind) {
            (_, JobKind::Copy) => None,
            (Some(shader), _) => {
                let bytes = loader.load(&format!("shaders/{shader}"))?;
                let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
                let source = std::str::from_utf8(&bytes[..end]).map_err(|_| {
                    RenderError::PipelineBuild {
                        job: desc.name.clone(),
                        reason: format!("shader {shader:?} is not valid UTF-8"),
                    }
                })?;
                Some(source.to_string())
            }
            (None, _) => None,
        };
        finalized.push(job::finalize(&ctx, &pendings, index, shader_source.as_deref())?);
    }

    let jobs: Vec<Job> = pendings
        .into_iter()
        .zip(finalized)
        .map(|(pending, state)| Job::from_parts(pending, state))
        .collect();
    debug!("assembled {} jobs: {:?}", jobs.len(), order);

    Ok(AssembledGraph { jobs, order })
}
