//! Pure planning layer: resolves input attachments against sibling jobs and
//! lays out the two bind groups of every pipeline, without touching the GPU.
//! The job builder realizes these plans into wgpu objects; keeping the logic
//! here keeps resolution and layout rules testable.

use crate::descriptor::{
    AttachmentKind, JobDescriptor, JobEntry, JobKind, ShaderResourceKind, ShaderResourceUsage,
};
use crate::error::{RenderError, Result};
use crate::uniforms::DEFAULT_UNIFORM_SIZE;

/// Implicit texture output every graphics job exposes alongside its declared
/// attachments (the depth target allocated by the job builder).
pub const DEPTH_TEXTURE: &str = "Depth-Texture";

/// An input attachment resolved to the sibling that owns the matching output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedInput {
    pub name: String,
    pub kind: AttachmentKind,
    pub parent: usize,
}

/// One texture copy of a Copy job: parent's output into the same-named own
/// output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyPair {
    pub parent: usize,
    pub name: String,
}

/// Where a binding's resource comes from at realization time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingSource {
    /// A sibling job's output texture.
    InputTexture { parent: usize },
    /// This job's own output texture.
    OwnTexture,
    /// A sibling job's output buffer.
    InputBuffer { parent: usize },
    /// This job's own output buffer.
    OwnBuffer,
    /// A shader-resource buffer this job allocated from its declared size.
    OwnResourceBuffer,
    /// A global buffer resolved by name through the registry.
    RegistryBuffer,
    /// A global texture resolved by name through the registry.
    RegistryTexture,
    /// The shared per-frame uniform buffer.
    DefaultUniform,
    /// The shared sampler.
    SharedSampler,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlannedKind {
    Texture { filterable: bool },
    /// `min_size: None` means "use the resolved buffer's actual size".
    Buffer {
        ty: wgpu::BufferBindingType,
        min_size: Option<u64>,
    },
    Sampler,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedBinding {
    pub binding: u32,
    pub name: String,
    pub visibility: wgpu::ShaderStages,
    pub kind: PlannedKind,
    pub source: BindingSource,
}

/// The fixed two-group scheme: group 0 carries the pass attachments in
/// declared order (graphics jobs exclude texture outputs, which become color
/// attachments), group 1 carries the shader resources in declared order
/// followed by the default uniform buffer and, when the job binds any
/// texture, the shared sampler.
#[derive(Clone, Debug, Default)]
pub struct BindingPlan {
    pub group0: Vec<PlannedBinding>,
    pub group1: Vec<PlannedBinding>,
}

/// Declared order is execution order; the assembler never reorders.
pub fn execution_order(entries: &[JobEntry]) -> Vec<String> {
    entries.iter().map(|e| e.name.clone()).collect()
}

/// Resolve every input attachment of `job` against the full sibling list.
/// Parents may be declared before or after the consumer; both are valid
/// because phase 1 has created all outputs before any phase 2 runs.
pub fn resolve_inputs<D: std::borrow::Borrow<JobDescriptor>>(
    descs: &[D],
    job: usize,
) -> Result<Vec<ResolvedInput>> {
    let descs: Vec<&JobDescriptor> = descs.iter().map(|d| d.borrow()).collect();
    let desc = descs[job];
    let mut resolved = Vec::new();
    for attachment in &desc.attachments {
        if !attachment.kind.is_input() {
            continue;
        }
        let parent_name = attachment.parent_job.as_deref().unwrap_or_default();
        let unresolved = || RenderError::UnresolvedAttachment {
            job: desc.name.clone(),
            attachment: attachment.name.clone(),
            parent: parent_name.to_string(),
        };
        let parent = descs
            .iter()
            .position(|d| d.name == parent_name)
            .ok_or_else(unresolved)?;
        let output = descs[parent].output_attachment(&attachment.name);
        let compatible = match output {
            Some(out) => out.kind.is_texture() == attachment.kind.is_texture(),
            None => {
                attachment.kind == AttachmentKind::TextureInput
                    && attachment.name == DEPTH_TEXTURE
                    && descs[parent].kind == JobKind::Graphics
            }
        };
        if !compatible {
            return Err(unresolved());
        }
        resolved.push(ResolvedInput {
            name: attachment.name.clone(),
            kind: attachment.kind,
            parent,
        });
    }
    Ok(resolved)
}

/// Pair each texture input of a Copy job with its same-named own output.
pub fn copy_pairs(desc: &JobDescriptor, inputs: &[ResolvedInput]) -> Result<Vec<CopyPair>> {
    let mut pairs = Vec::new();
    for input in inputs {
        if input.kind != AttachmentKind::TextureInput {
            continue;
        }
        if desc.output_attachment(&input.name).is_none() {
            return Err(RenderError::UnresolvedAttachment {
                job: desc.name.clone(),
                attachment: input.name.clone(),
                parent: desc.name.clone(),
            });
        }
        pairs.push(CopyPair {
            parent: input.parent,
            name: input.name.clone(),
        });
    }
    Ok(pairs)
}

fn stage_visibility(kind: JobKind) -> wgpu::ShaderStages {
    match kind {
        JobKind::Compute => wgpu::ShaderStages::COMPUTE,
        _ => wgpu::ShaderStages::VERTEX_FRAGMENT,
    }
}

/// Lay out both bind groups of a job. Copy jobs have no bindings.
pub fn binding_plan(desc: &JobDescriptor, inputs: &[ResolvedInput]) -> BindingPlan {
    if desc.kind == JobKind::Copy {
        return BindingPlan::default();
    }
    let visibility = stage_visibility(desc.kind);

    let mut group0 = Vec::new();
    for attachment in &desc.attachments {
        if desc.kind == JobKind::Graphics && attachment.kind == AttachmentKind::TextureOutput {
            continue;
        }
        let parent = |name: &str| {
            inputs
                .iter()
                .find(|i| i.name == name)
                .map(|i| i.parent)
                .unwrap_or_default()
        };
        let (kind, source) = match attachment.kind {
            AttachmentKind::TextureInput => (
                PlannedKind::Texture { filterable: true },
                BindingSource::InputTexture {
                    parent: parent(&attachment.name),
                },
            ),
            AttachmentKind::TextureOutput => (
                PlannedKind::Texture { filterable: false },
                BindingSource::OwnTexture,
            ),
            AttachmentKind::BufferInput => (
                PlannedKind::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    min_size: Some(256),
                },
                BindingSource::InputBuffer {
                    parent: parent(&attachment.name),
                },
            ),
            AttachmentKind::BufferOutput => (
                PlannedKind::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    min_size: Some(256),
                },
                BindingSource::OwnBuffer,
            ),
        };
        group0.push(PlannedBinding {
            binding: group0.len() as u32,
            name: attachment.name.clone(),
            visibility,
            kind,
            source,
        });
    }

    let mut group1 = Vec::new();
    for resource in &desc.shader_resources {
        let (kind, source, vis) = match resource.kind {
            ShaderResourceKind::Texture => (
                PlannedKind::Texture { filterable: true },
                BindingSource::RegistryTexture,
                visibility,
            ),
            ShaderResourceKind::Buffer => {
                let source = if resource.size.is_some() {
                    BindingSource::OwnResourceBuffer
                } else {
                    BindingSource::RegistryBuffer
                };
                match resource.usage {
                    ShaderResourceUsage::Uniform => (
                        PlannedKind::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            min_size: resource.size.map(u64::from),
                        },
                        source,
                        visibility,
                    ),
                    ShaderResourceUsage::ReadOnlyStorage => (
                        PlannedKind::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            min_size: Some(256),
                        },
                        source,
                        visibility,
                    ),
                    ShaderResourceUsage::ReadWriteStorage => {
                        // Writable storage from a graphics pipeline is a
                        // fragment-stage capability.
                        let vis = if desc.kind == JobKind::Graphics {
                            wgpu::ShaderStages::FRAGMENT
                        } else {
                            visibility
                        };
                        (
                            PlannedKind::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: false },
                                min_size: Some(256),
                            },
                            source,
                            vis,
                        )
                    }
                }
            }
        };
        group1.push(PlannedBinding {
            binding: group1.len() as u32,
            name: resource.name.clone(),
            visibility: vis,
            kind,
            source,
        });
    }

    group1.push(PlannedBinding {
        binding: group1.len() as u32,
        name: "default-uniform-buffer".into(),
        visibility,
        kind: PlannedKind::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            min_size: Some(DEFAULT_UNIFORM_SIZE),
        },
        source: BindingSource::DefaultUniform,
    });

    let binds_textures = desc
        .attachments
        .iter()
        .any(|a| a.kind == AttachmentKind::TextureOutput)
        || desc
            .shader_resources
            .iter()
            .any(|r| r.kind == ShaderResourceKind::Texture);
    if binds_textures {
        group1.push(PlannedBinding {
            binding: group1.len() as u32,
            name: "sampler".into(),
            visibility: wgpu::ShaderStages::FRAGMENT,
            kind: PlannedKind::Sampler,
            source: BindingSource::SharedSampler,
        });
    }

    BindingPlan { group0, group1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{parse_job_set, parse_pipeline};

    fn parse_jobs(docs: &[(&str, &str)]) -> Vec<JobDescriptor> {
        let jobs: Vec<String> = docs
            .iter()
            .map(|(entry, _)| entry.to_string())
            .collect();
        let set = format!("{{ \"Jobs\": [{}] }}", jobs.join(","));
        let entries = parse_job_set(set.as_bytes()).unwrap();
        entries
            .iter()
            .zip(docs)
            .map(|(entry, (_, pipeline))| parse_pipeline(entry, pipeline.as_bytes()).unwrap())
            .collect()
    }

    const CULL_ENTRY: &str = r#"{ "Name": "Cull", "Type": "Compute", "PassType": "Compute",
        "Pipeline": "cull.json", "Dispatch": [64, 1, 1] }"#;
    const CULL_PIPELINE: &str = r#"{
        "Shader": "cull.wgsl",
        "Attachments": [
            { "Name": "Counter", "Type": "BufferOutput", "Size": 16, "Usage": "Indirect" }
        ],
        "ShaderResources": [
            { "name": "uniformBuffer", "type": "buffer", "usage": "uniform", "size": 16 },
            { "name": "meshExtents", "type": "buffer", "usage": "read_only_storage" }
        ]
    }"#;
    const DRAW_ENTRY: &str = r#"{ "Name": "Draw", "Type": "Graphics", "PassType": "Draw Meshes",
        "Pipeline": "draw.json" }"#;
    const DRAW_PIPELINE: &str = r#"{
        "Shader": "draw.wgsl",
        "Attachments": [
            { "Name": "Color Output", "Type": "TextureOutput" },
            { "Name": "Counter", "Type": "BufferInput", "ParentJob": "Cull" }
        ],
        "ShaderResources": [
            { "name": "probe", "type": "buffer", "usage": "read_write_storage", "size": 256 }
        ]
    }"#;

    fn cull_and_draw() -> Vec<JobDescriptor> {
        parse_jobs(&[(CULL_ENTRY, CULL_PIPELINE), (DRAW_ENTRY, DRAW_PIPELINE)])
    }

    #[test]
    fn declared_order_is_execution_order() {
        let set = format!("{{ \"Jobs\": [{CULL_ENTRY},{DRAW_ENTRY}] }}");
        let entries = parse_job_set(set.as_bytes()).unwrap();
        assert_eq!(execution_order(&entries), vec!["Cull", "Draw"]);
    }

    #[test]
    fn input_resolves_to_parent() {
        let descs = cull_and_draw();
        let inputs = resolve_inputs(&descs, 1).unwrap();
        assert_eq!(
            inputs,
            vec![ResolvedInput {
                name: "Counter".into(),
                kind: AttachmentKind::BufferInput,
                parent: 0,
            }]
        );
    }

    #[test]
    fn parent_declared_later_resolves() {
        let descs = parse_jobs(&[(DRAW_ENTRY, DRAW_PIPELINE), (CULL_ENTRY, CULL_PIPELINE)]);
        let inputs = resolve_inputs(&descs, 0).unwrap();
        assert_eq!(inputs[0].parent, 1);
    }

    #[test]
    fn missing_parent_names_ghost() {
        let draw = DRAW_PIPELINE.replace("\"Cull\"", "\"Ghost\"");
        let docs = [(CULL_ENTRY, CULL_PIPELINE), (DRAW_ENTRY, draw.as_str())];
        let descs = parse_jobs(&docs);
        match resolve_inputs(&descs, 1) {
            Err(RenderError::UnresolvedAttachment { job, parent, .. }) => {
                assert_eq!(job, "Draw");
                assert_eq!(parent, "Ghost");
            }
            other => panic!("expected UnresolvedAttachment, got {other:?}"),
        }
    }

    #[test]
    fn missing_parent_output_is_unresolved() {
        let draw = DRAW_PIPELINE.replace("\"Name\": \"Counter\"", "\"Name\": \"Absent\"");
        let docs = [(CULL_ENTRY, CULL_PIPELINE), (DRAW_ENTRY, draw.as_str())];
        let descs = parse_jobs(&docs);
        assert!(matches!(
            resolve_inputs(&descs, 1),
            Err(RenderError::UnresolvedAttachment { .. })
        ));
    }

    #[test]
    fn kind_mismatch_is_unresolved() {
        // Buffer input pointing at a texture output of the same name.
        let cull = CULL_PIPELINE.replace(
            r#"{ "Name": "Counter", "Type": "BufferOutput", "Size": 16, "Usage": "Indirect" }"#,
            r#"{ "Name": "Counter", "Type": "TextureOutput" }"#,
        );
        let docs = [(CULL_ENTRY, cull.as_str()), (DRAW_ENTRY, DRAW_PIPELINE)];
        let descs = parse_jobs(&docs);
        assert!(matches!(
            resolve_inputs(&descs, 1),
            Err(RenderError::UnresolvedAttachment { .. })
        ));
    }

    #[test]
    fn depth_texture_resolves_against_graphics_parent() {
        let consumer_entry = r#"{ "Name": "AO", "Type": "Graphics", "PassType": "Full Triangle",
            "Pipeline": "ao.json" }"#;
        let consumer = r#"{
            "Shader": "ao.wgsl",
            "Attachments": [
                { "Name": "AO Output", "Type": "TextureOutput" },
                { "Name": "Depth-Texture", "Type": "TextureInput", "ParentJob": "Draw" }
            ]
        }"#;
        let docs = [
            (CULL_ENTRY, CULL_PIPELINE),
            (DRAW_ENTRY, DRAW_PIPELINE),
            (consumer_entry, consumer),
        ];
        let descs = parse_jobs(&docs);
        let inputs = resolve_inputs(&descs, 2).unwrap();
        assert_eq!(inputs[0].parent, 1);
    }

    #[test]
    fn compute_group0_keeps_outputs_in_order() {
        let descs = cull_and_draw();
        let plan = binding_plan(&descs[0], &[]);
        assert_eq!(plan.group0.len(), 1);
        assert_eq!(plan.group0[0].name, "Counter");
        assert_eq!(plan.group0[0].source, BindingSource::OwnBuffer);
        assert_eq!(plan.group0[0].visibility, wgpu::ShaderStages::COMPUTE);
        // uniformBuffer, meshExtents, default uniform; no textures, no sampler.
        assert_eq!(plan.group1.len(), 3);
        assert_eq!(plan.group1[0].name, "uniformBuffer");
        assert_eq!(plan.group1[0].source, BindingSource::OwnResourceBuffer);
        assert_eq!(
            plan.group1[0].kind,
            PlannedKind::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                min_size: Some(16),
            }
        );
        assert_eq!(plan.group1[1].source, BindingSource::RegistryBuffer);
        assert_eq!(
            plan.group1[1].kind,
            PlannedKind::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                min_size: Some(256),
            }
        );
        assert_eq!(plan.group1[2].source, BindingSource::DefaultUniform);
        let bindings: Vec<u32> = plan.group1.iter().map(|b| b.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2]);
    }

    #[test]
    fn graphics_group0_excludes_texture_outputs() {
        let descs = cull_and_draw();
        let inputs = resolve_inputs(&descs, 1).unwrap();
        let plan = binding_plan(&descs[1], &inputs);
        assert_eq!(plan.group0.len(), 1);
        assert_eq!(plan.group0[0].name, "Counter");
        assert_eq!(plan.group0[0].source, BindingSource::InputBuffer { parent: 0 });
        assert_eq!(
            plan.group0[0].visibility,
            wgpu::ShaderStages::VERTEX_FRAGMENT
        );
    }

    #[test]
    fn graphics_group1_sampler_and_storage_visibility() {
        let descs = cull_and_draw();
        let inputs = resolve_inputs(&descs, 1).unwrap();
        let plan = binding_plan(&descs[1], &inputs);
        // probe, default uniform, sampler (the job has a texture output).
        assert_eq!(plan.group1.len(), 3);
        assert_eq!(plan.group1[0].visibility, wgpu::ShaderStages::FRAGMENT);
        assert_eq!(
            plan.group1[0].kind,
            PlannedKind::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                min_size: Some(256),
            }
        );
        assert_eq!(plan.group1[1].source, BindingSource::DefaultUniform);
        assert_eq!(plan.group1[2].kind, PlannedKind::Sampler);
        assert_eq!(plan.group1[2].visibility, wgpu::ShaderStages::FRAGMENT);
    }

    #[test]
    fn copy_job_pairs_and_has_no_bindings() {
        let copy_entry = r#"{ "Name": "Capture", "Type": "Copy", "PassType": "Copy",
            "Pipeline": "capture.json" }"#;
        let copy = r#"{
            "Attachments": [
                { "Name": "Color Output", "Type": "TextureInput", "ParentJob": "Draw" },
                { "Name": "Color Output", "Type": "TextureOutput" }
            ]
        }"#;
        let docs = [
            (CULL_ENTRY, CULL_PIPELINE),
            (DRAW_ENTRY, DRAW_PIPELINE),
            (copy_entry, copy),
        ];
        let descs = parse_jobs(&docs);
        let inputs = resolve_inputs(&descs, 2).unwrap();
        let pairs = copy_pairs(&descs[2], &inputs).unwrap();
        assert_eq!(
            pairs,
            vec![CopyPair {
                parent: 1,
                name: "Color Output".into(),
            }]
        );
        let plan = binding_plan(&descs[2], &inputs);
        assert!(plan.group0.is_empty());
        assert!(plan.group1.is_empty());
    }

    #[test]
    fn copy_without_matching_output_is_unresolved() {
        let copy_entry = r#"{ "Name": "Capture", "Type": "Copy", "PassType": "Copy",
            "Pipeline": "capture.json" }"#;
        let copy = r#"{
            "Attachments": [
                { "Name": "Color Output", "Type": "TextureInput", "ParentJob": "Draw" }
            ]
        }"#;
        let docs = [
            (CULL_ENTRY, CULL_PIPELINE),
            (DRAW_ENTRY, DRAW_PIPELINE),
            (copy_entry, copy),
        ];
        let descs = parse_jobs(&docs);
        let inputs = resolve_inputs(&descs, 2).unwrap();
        assert!(matches!(
            copy_pairs(&descs[2], &inputs),
            Err(RenderError::UnresolvedAttachment { .. })
        ));
    }
}
