//! Pipeline descriptor parsing: job-set and per-job pipeline JSON documents
//! into typed, validated descriptors. Unknown keys are tolerated; missing
//! mandatory keys fail with a config error. All defaults are applied here so
//! the rest of the engine never sees an absent field.

use serde::Deserialize;

use crate::error::{RenderError, Result};

/// What kind of GPU work a job performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum JobKind {
    Graphics,
    Compute,
    Copy,
}

/// Recording hint: how the frame executor turns the job into commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum PassKind {
    Compute,
    #[serde(rename = "Draw Meshes")]
    DrawMeshes,
    #[serde(rename = "Full Triangle")]
    FullTriangle,
    Copy,
    #[serde(rename = "Swap Chain")]
    SwapChain,
    #[serde(rename = "Depth Prepass")]
    DepthPrepass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum AttachmentKind {
    TextureOutput,
    TextureInput,
    BufferOutput,
    BufferInput,
}

impl AttachmentKind {
    pub fn is_input(self) -> bool {
        matches!(self, AttachmentKind::TextureInput | AttachmentKind::BufferInput)
    }
    pub fn is_texture(self) -> bool {
        matches!(self, AttachmentKind::TextureInput | AttachmentKind::TextureOutput)
    }
}

/// Color formats a texture output may declare.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum AttachmentFormat {
    #[default]
    #[serde(rename = "rgba32float")]
    Rgba32Float,
    #[serde(rename = "rgba16float")]
    Rgba16Float,
    #[serde(rename = "rg16float")]
    Rg16Float,
    #[serde(rename = "r32float")]
    R32Float,
}

impl AttachmentFormat {
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            AttachmentFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            AttachmentFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            AttachmentFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
            AttachmentFormat::R32Float => wgpu::TextureFormat::R32Float,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ShaderResourceKind {
    #[serde(rename = "texture")]
    Texture,
    #[serde(rename = "buffer")]
    Buffer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ShaderResourceUsage {
    #[serde(rename = "uniform")]
    Uniform,
    #[serde(rename = "read_only_storage")]
    ReadOnlyStorage,
    #[serde(rename = "read_write_storage")]
    ReadWriteStorage,
}

/// One attachment of a job, fully defaulted.
#[derive(Clone, Debug)]
pub struct AttachmentDesc {
    pub name: String,
    pub kind: AttachmentKind,
    pub format: AttachmentFormat,
    /// Byte size, buffer outputs only.
    pub size: u32,
    /// Buffer outputs: also usable as an indirect-draw argument source.
    pub indirect: bool,
    /// Inputs: the declared parent job owning the matching output.
    pub parent_job: Option<String>,
}

/// One group-1 shader resource of a job.
#[derive(Clone, Debug)]
pub struct ShaderResourceDesc {
    pub name: String,
    pub kind: ShaderResourceKind,
    pub usage: ShaderResourceUsage,
    /// Declared byte size; the job allocates the buffer itself. Absent means
    /// the name resolves against the global resource registry.
    pub size: Option<u32>,
}

#[derive(Clone, Copy, Debug)]
pub struct DepthState {
    pub enable: bool,
    pub write_enabled: bool,
    pub compare: wgpu::CompareFunction,
    pub stencil_enable: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            enable: false,
            write_enabled: false,
            compare: wgpu::CompareFunction::Always,
            stencil_enable: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
}

#[derive(Clone, Copy, Debug)]
pub struct RasterState {
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
        }
    }
}

/// One entry of the top-level job list.
#[derive(Clone, Debug)]
pub struct JobEntry {
    pub name: String,
    pub kind: JobKind,
    pub pass: PassKind,
    /// Pipeline document path, relative to the render-jobs directory.
    pub pipeline: String,
    pub dispatch: [u32; 3],
}

/// A fully parsed and validated job description.
#[derive(Clone, Debug)]
pub struct JobDescriptor {
    pub name: String,
    pub kind: JobKind,
    pub pass: PassKind,
    /// Shader file name, relative to the shaders directory. Copy jobs omit it.
    pub shader: Option<String>,
    pub attachments: Vec<AttachmentDesc>,
    pub shader_resources: Vec<ShaderResourceDesc>,
    pub depth: DepthState,
    pub raster: RasterState,
    pub dispatch: [u32; 3],
}

impl JobDescriptor {
    /// Output texture formats in declared order (the fragment targets).
    pub fn color_formats(&self) -> Vec<AttachmentFormat> {
        self.attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::TextureOutput)
            .map(|a| a.format)
            .collect()
    }

    pub fn output_attachment(&self, name: &str) -> Option<&AttachmentDesc> {
        self.attachments
            .iter()
            .find(|a| !a.kind.is_input() && a.name == name)
    }
}

// Raw serde shapes. These mirror the hand-authored JSON as-is; conversion to
// the typed descriptors above applies defaults and validation.

#[derive(Deserialize)]
struct JobSetDoc {
    #[serde(rename = "Jobs")]
    jobs: Vec<JobEntryDoc>,
}

#[derive(Deserialize)]
struct JobEntryDoc {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    kind: JobKind,
    #[serde(rename = "PassType")]
    pass: Option<PassKind>,
    #[serde(rename = "Pipeline")]
    pipeline: String,
    #[serde(rename = "Dispatch")]
    dispatch: Option<[u32; 3]>,
}

#[derive(Deserialize)]
struct PipelineDoc {
    #[serde(rename = "Shader")]
    shader: Option<String>,
    #[serde(rename = "Attachments")]
    attachments: Vec<AttachmentEntryDoc>,
    #[serde(rename = "ShaderResources", default)]
    shader_resources: Vec<ShaderResourceEntryDoc>,
    #[serde(rename = "DepthStencilState")]
    depth_stencil: Option<DepthStencilDoc>,
    #[serde(rename = "RasterState")]
    raster: Option<RasterDoc>,
}

#[derive(Deserialize)]
struct AttachmentEntryDoc {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    kind: AttachmentKind,
    #[serde(rename = "Format")]
    format: Option<AttachmentFormat>,
    #[serde(rename = "Size")]
    size: Option<u32>,
    #[serde(rename = "Usage")]
    usage: Option<String>,
    #[serde(rename = "ParentJob")]
    parent_job: Option<String>,
}

#[derive(Deserialize)]
struct ShaderResourceEntryDoc {
    name: String,
    #[serde(rename = "type")]
    kind: ShaderResourceKind,
    usage: ShaderResourceUsage,
    size: Option<u32>,
    /// Informational only; the engine derives visibility from the job kind.
    #[serde(rename = "shader_stage")]
    _shader_stage: Option<String>,
}

#[derive(Deserialize)]
struct DepthStencilDoc {
    #[serde(rename = "DepthEnable")]
    depth_enable: Option<String>,
    #[serde(rename = "DepthWriteMask")]
    depth_write_mask: Option<String>,
    #[serde(rename = "DepthFunc")]
    depth_func: Option<String>,
    #[serde(rename = "StencilEnable")]
    stencil_enable: Option<String>,
}

#[derive(Deserialize)]
struct RasterDoc {
    #[serde(rename = "CullMode")]
    cull_mode: Option<String>,
    #[serde(rename = "FrontFace")]
    front_face: Option<String>,
    #[serde(rename = "LoadOp")]
    load_op: Option<String>,
    #[serde(rename = "StoreOp")]
    store_op: Option<String>,
}

/// Strip a trailing NUL (C-style text blobs) and parse JSON.
fn from_json_bytes<'a, T: Deserialize<'a>>(bytes: &'a [u8], what: &str) -> Result<T> {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    serde_json::from_slice(&bytes[..end])
        .map_err(|e| RenderError::config(format!("{what}: {e}")))
}

/// Parse the top-level job list. Job names must be unique.
pub fn parse_job_set(bytes: &[u8]) -> Result<Vec<JobEntry>> {
    let doc: JobSetDoc = from_json_bytes(bytes, "job set")?;
    let mut entries = Vec::with_capacity(doc.jobs.len());
    for job in doc.jobs {
        let pass = job.pass.unwrap_or(match job.kind {
            JobKind::Graphics => PassKind::FullTriangle,
            JobKind::Compute => PassKind::Compute,
            JobKind::Copy => PassKind::Copy,
        });
        entries.push(JobEntry {
            name: job.name,
            kind: job.kind,
            pass,
            pipeline: job.pipeline,
            dispatch: job.dispatch.unwrap_or([1, 1, 1]),
        });
    }
    for (i, entry) in entries.iter().enumerate() {
        if entries[..i].iter().any(|e| e.name == entry.name) {
            return Err(RenderError::duplicate(&entry.name));
        }
    }
    Ok(entries)
}

/// Parse one per-job pipeline document and validate it against the job entry.
pub fn parse_pipeline(entry: &JobEntry, bytes: &[u8]) -> Result<JobDescriptor> {
    let doc: PipelineDoc =
        from_json_bytes(bytes, &format!("pipeline for job {:?}", entry.name))?;

    let mut attachments = Vec::with_capacity(doc.attachments.len());
    for a in doc.attachments {
        if a.kind == AttachmentKind::BufferOutput && a.size.is_none() {
            return Err(RenderError::config(format!(
                "job {:?}: buffer output {:?} has no Size",
                entry.name, a.name
            )));
        }
        if a.kind.is_input() && a.parent_job.is_none() {
            return Err(RenderError::config(format!(
                "job {:?}: input attachment {:?} has no ParentJob",
                entry.name, a.name
            )));
        }
        attachments.push(AttachmentDesc {
            name: a.name,
            kind: a.kind,
            format: a.format.unwrap_or_default(),
            size: a.size.unwrap_or(0),
            indirect: a.usage.as_deref() == Some("Indirect"),
            parent_job: a.parent_job,
        });
    }

    let shader_resources = doc
        .shader_resources
        .into_iter()
        .map(|r| ShaderResourceDesc {
            name: r.name,
            kind: r.kind,
            usage: r.usage,
            size: r.size,
        })
        .collect();

    let desc = JobDescriptor {
        name: entry.name.clone(),
        kind: entry.kind,
        pass: entry.pass,
        shader: doc.shader,
        attachments,
        shader_resources,
        depth: doc.depth_stencil.map(parse_depth_state).unwrap_or_default(),
        raster: doc.raster.map(parse_raster_state).unwrap_or_default(),
        dispatch: entry.dispatch,
    };
    validate(&desc)?;
    Ok(desc)
}

fn parse_depth_state(doc: DepthStencilDoc) -> DepthState {
    let compare = match doc.depth_func.as_deref() {
        Some("Never") => wgpu::CompareFunction::Never,
        Some("Less") => wgpu::CompareFunction::Less,
        Some("Equal") => wgpu::CompareFunction::Equal,
        Some("LessEqual") => wgpu::CompareFunction::LessEqual,
        Some("Greater") => wgpu::CompareFunction::Greater,
        Some("NotEqual") => wgpu::CompareFunction::NotEqual,
        Some("GreaterEqual") => wgpu::CompareFunction::GreaterEqual,
        _ => wgpu::CompareFunction::Always,
    };
    DepthState {
        enable: doc.depth_enable.as_deref() == Some("True"),
        write_enabled: doc.depth_write_mask.as_deref() == Some("One"),
        compare,
        stencil_enable: doc.stencil_enable.as_deref() == Some("True"),
    }
}

fn parse_raster_state(doc: RasterDoc) -> RasterState {
    let cull_mode = match doc.cull_mode.as_deref() {
        Some("Back") => Some(wgpu::Face::Back),
        Some("Front") => Some(wgpu::Face::Front),
        _ => None,
    };
    let front_face = match doc.front_face.as_deref() {
        Some("Clockwise") => wgpu::FrontFace::Cw,
        _ => wgpu::FrontFace::Ccw,
    };
    let load_op = match doc.load_op.as_deref() {
        Some("Load") => LoadOp::Load,
        _ => LoadOp::Clear,
    };
    let store_op = match doc.store_op.as_deref() {
        Some("Discard") => StoreOp::Discard,
        _ => StoreOp::Store,
    };
    RasterState {
        cull_mode,
        front_face,
        load_op,
        store_op,
    }
}

/// Name-uniqueness rules. Attachment names are unique per direction; an
/// input/output pair sharing a name is the Copy-job pairing mechanism and is
/// rejected everywhere else. Shader-resource names are unique outright.
fn validate(desc: &JobDescriptor) -> Result<()> {
    for (i, a) in desc.attachments.iter().enumerate() {
        for b in &desc.attachments[..i] {
            if a.name != b.name {
                continue;
            }
            if a.kind.is_input() == b.kind.is_input() {
                return Err(RenderError::duplicate(&a.name));
            }
            if desc.kind != JobKind::Copy {
                return Err(RenderError::duplicate(&a.name));
            }
        }
    }
    for (i, r) in desc.shader_resources.iter().enumerate() {
        if desc.shader_resources[..i].iter().any(|p| p.name == r.name) {
            return Err(RenderError::duplicate(&r.name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB_SET: &str = r#"{
        "Jobs": [
            { "Name": "Cull", "Type": "Compute", "PassType": "Compute",
              "Pipeline": "cull.json", "Dispatch": [64, 1, 1] },
            { "Name": "Draw", "Type": "Graphics", "PassType": "Draw Meshes",
              "Pipeline": "draw.json" }
        ]
    }"#;

    #[test]
    fn job_set_order_and_defaults() {
        let entries = parse_job_set(JOB_SET.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Cull");
        assert_eq!(entries[0].dispatch, [64, 1, 1]);
        assert_eq!(entries[1].pass, PassKind::DrawMeshes);
        assert_eq!(entries[1].dispatch, [1, 1, 1]);
    }

    #[test]
    fn job_set_trailing_nul_tolerated() {
        let mut bytes = JOB_SET.as_bytes().to_vec();
        bytes.push(0);
        assert!(parse_job_set(&bytes).is_ok());
    }

    #[test]
    fn duplicate_job_name_rejected() {
        let doc = r#"{ "Jobs": [
            { "Name": "A", "Type": "Compute", "Pipeline": "a.json" },
            { "Name": "A", "Type": "Compute", "Pipeline": "b.json" }
        ] }"#;
        match parse_job_set(doc.as_bytes()) {
            Err(RenderError::DuplicateResource { name }) => assert_eq!(name, "A"),
            other => panic!("expected DuplicateResource, got {other:?}"),
        }
    }

    #[test]
    fn missing_name_is_config_error() {
        let doc = r#"{ "Jobs": [ { "Type": "Compute", "Pipeline": "a.json" } ] }"#;
        assert!(matches!(
            parse_job_set(doc.as_bytes()),
            Err(RenderError::Config(_))
        ));
    }

    fn graphics_entry() -> JobEntry {
        JobEntry {
            name: "Draw".into(),
            kind: JobKind::Graphics,
            pass: PassKind::DrawMeshes,
            pipeline: "draw.json".into(),
            dispatch: [1, 1, 1],
        }
    }

    #[test]
    fn pipeline_defaults() {
        let doc = r#"{
            "Shader": "draw.wgsl",
            "Attachments": [
                { "Name": "Color Output", "Type": "TextureOutput" },
                { "Name": "Velocity Output", "Type": "TextureOutput", "Format": "rg16float" }
            ]
        }"#;
        let desc = parse_pipeline(&graphics_entry(), doc.as_bytes()).unwrap();
        assert_eq!(desc.attachments[0].format, AttachmentFormat::Rgba32Float);
        assert_eq!(desc.attachments[1].format, AttachmentFormat::Rg16Float);
        assert_eq!(desc.raster.load_op, LoadOp::Clear);
        assert_eq!(desc.raster.store_op, StoreOp::Store);
        assert_eq!(desc.raster.front_face, wgpu::FrontFace::Ccw);
        assert!(desc.raster.cull_mode.is_none());
        assert!(!desc.depth.enable);
        assert_eq!(desc.depth.compare, wgpu::CompareFunction::Always);
        assert_eq!(
            desc.color_formats(),
            vec![AttachmentFormat::Rgba32Float, AttachmentFormat::Rg16Float]
        );
    }

    #[test]
    fn pipeline_states_parsed() {
        let doc = r#"{
            "Shader": "draw.wgsl",
            "Attachments": [ { "Name": "Out", "Type": "TextureOutput" } ],
            "ShaderResources": [
                { "name": "uniformBuffer", "type": "buffer", "usage": "uniform",
                  "size": 16, "shader_stage": "vertex" },
                { "name": "meshExtents", "type": "buffer", "usage": "read_only_storage" }
            ],
            "DepthStencilState": {
                "DepthEnable": "True", "DepthWriteMask": "One",
                "DepthFunc": "LessEqual", "StencilEnable": "False"
            },
            "RasterState": {
                "CullMode": "Back", "FrontFace": "Clockwise",
                "LoadOp": "Load", "StoreOp": "Discard"
            }
        }"#;
        let desc = parse_pipeline(&graphics_entry(), doc.as_bytes()).unwrap();
        assert!(desc.depth.enable);
        assert!(desc.depth.write_enabled);
        assert_eq!(desc.depth.compare, wgpu::CompareFunction::LessEqual);
        assert_eq!(desc.raster.cull_mode, Some(wgpu::Face::Back));
        assert_eq!(desc.raster.front_face, wgpu::FrontFace::Cw);
        assert_eq!(desc.raster.load_op, LoadOp::Load);
        assert_eq!(desc.raster.store_op, StoreOp::Discard);
        assert_eq!(desc.shader_resources[0].size, Some(16));
        assert_eq!(desc.shader_resources[1].size, None);
        assert_eq!(
            desc.shader_resources[1].usage,
            ShaderResourceUsage::ReadOnlyStorage
        );
    }

    #[test]
    fn unknown_keys_tolerated() {
        let doc = r#"{
            "Shader": "draw.wgsl",
            "Comment": "future field",
            "Attachments": [
                { "Name": "Out", "Type": "TextureOutput", "Hint": "ignored" }
            ]
        }"#;
        assert!(parse_pipeline(&graphics_entry(), doc.as_bytes()).is_ok());
    }

    #[test]
    fn missing_attachments_is_config_error() {
        let doc = r#"{ "Shader": "draw.wgsl" }"#;
        assert!(matches!(
            parse_pipeline(&graphics_entry(), doc.as_bytes()),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn buffer_output_requires_size() {
        let doc = r#"{
            "Attachments": [ { "Name": "Counter", "Type": "BufferOutput" } ]
        }"#;
        assert!(matches!(
            parse_pipeline(&graphics_entry(), doc.as_bytes()),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn input_requires_parent_job() {
        let doc = r#"{
            "Attachments": [ { "Name": "Color Output", "Type": "TextureInput" } ]
        }"#;
        assert!(matches!(
            parse_pipeline(&graphics_entry(), doc.as_bytes()),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn indirect_usage_flag() {
        let doc = r#"{
            "Attachments": [
                { "Name": "Draw Calls", "Type": "BufferOutput", "Size": 1024, "Usage": "Indirect" },
                { "Name": "Scratch", "Type": "BufferOutput", "Size": 256 }
            ]
        }"#;
        let entry = JobEntry {
            kind: JobKind::Compute,
            pass: PassKind::Compute,
            ..graphics_entry()
        };
        let desc = parse_pipeline(&entry, doc.as_bytes()).unwrap();
        assert!(desc.attachments[0].indirect);
        assert!(!desc.attachments[1].indirect);
    }

    #[test]
    fn duplicate_attachment_name_rejected() {
        let doc = r#"{
            "Attachments": [
                { "Name": "Out", "Type": "TextureOutput" },
                { "Name": "Out", "Type": "TextureOutput" }
            ]
        }"#;
        assert!(matches!(
            parse_pipeline(&graphics_entry(), doc.as_bytes()),
            Err(RenderError::DuplicateResource { .. })
        ));
    }

    #[test]
    fn copy_pairing_allows_shared_name() {
        let doc = r#"{
            "Attachments": [
                { "Name": "Composite Output", "Type": "TextureInput", "ParentJob": "Composite" },
                { "Name": "Composite Output", "Type": "TextureOutput" }
            ]
        }"#;
        let entry = JobEntry {
            kind: JobKind::Copy,
            pass: PassKind::Copy,
            ..graphics_entry()
        };
        assert!(parse_pipeline(&entry, doc.as_bytes()).is_ok());
        // The same pair on a non-copy job is a name clash.
        assert!(matches!(
            parse_pipeline(&graphics_entry(), doc.as_bytes()),
            Err(RenderError::DuplicateResource { .. })
        ));
    }

    #[test]
    fn duplicate_shader_resource_rejected() {
        let doc = r#"{
            "Attachments": [ { "Name": "Out", "Type": "TextureOutput" } ],
            "ShaderResources": [
                { "name": "uniformBuffer", "type": "buffer", "usage": "uniform", "size": 16 },
                { "name": "uniformBuffer", "type": "buffer", "usage": "uniform", "size": 16 }
            ]
        }"#;
        assert!(matches!(
            parse_pipeline(&graphics_entry(), doc.as_bytes()),
            Err(RenderError::DuplicateResource { .. })
        ));
    }
}
