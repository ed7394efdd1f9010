//! Renderer configuration: the well-known job, attachment, and buffer names
//! the frame executor needs to find inside the declared pipeline. Defaults
//! match the shipped `render-jobs/mesh-viewer.json`.

/// Names the executor resolves to job indices during setup. A pipeline may
/// rename its jobs freely as long as the configuration follows.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Compute job that fills the indirect draw stream.
    pub culling_job: String,
    /// The culling job's indirect draw-argument output buffer.
    pub draw_calls_attachment: String,
    /// The culling job's atomic draw-count output buffer.
    pub draw_count_attachment: String,
    /// The culling job's own uniform (mesh count + explode multiplier).
    pub culling_uniform: String,

    /// Graphics job issuing the multi-draw of visible sub-meshes.
    pub deferred_job: String,
    /// The deferred job's uniform receiving (mesh count, explode multiplier).
    pub indirect_uniform: String,

    /// Graphics job probing the cursor for the hovered sub-mesh.
    pub selection_job: String,
    /// The selection job's uniform receiving (selected id, cursor x, cursor y).
    pub selection_uniform: String,
    /// The selection job's read-write storage buffer the shader fills with the
    /// `SelectMeshInfo` record; source of the read-back copy.
    pub selection_result_buffer: String,

    /// Job whose output the host blits to the swap chain.
    pub swap_chain_job: String,
    /// The attachment of `swap_chain_job` to present.
    pub swap_chain_attachment: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            culling_job: "Mesh Culling Compute".into(),
            draw_calls_attachment: "Draw Calls".into(),
            draw_count_attachment: "Num Draw Calls".into(),
            culling_uniform: "uniformBuffer".into(),
            deferred_job: "Deferred Indirect Graphics".into(),
            indirect_uniform: "indirectUniformData".into(),
            selection_job: "Mesh Selection Graphics".into(),
            selection_uniform: "uniformBuffer".into(),
            selection_result_buffer: "selectedMesh".into(),
            swap_chain_job: "Composite Graphics".into(),
            swap_chain_attachment: "Composite Output".into(),
        }
    }
}
