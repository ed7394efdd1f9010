//! Per-frame data the host hands to the backend: camera matrices and pose.
//! Matrices are column-major 4x4 (WGSL/wgpu convention, index [col*4+row]).

/// View/camera data for the current frame. The host owns all camera math;
/// the backend only consumes the finished matrices.
#[derive(Clone, Debug)]
pub struct FrameView {
    pub view_matrix: [f32; 16],
    pub projection_matrix: [f32; 16],
    pub view_projection_matrix: [f32; 16],
    pub prev_view_projection_matrix: [f32; 16],
    pub camera_position: [f32; 3],
    pub camera_look_at: [f32; 3],
    pub viewport_size: (u32, u32),
}

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

impl Default for FrameView {
    fn default() -> Self {
        Self {
            view_matrix: IDENTITY,
            projection_matrix: IDENTITY,
            view_projection_matrix: IDENTITY,
            prev_view_projection_matrix: IDENTITY,
            camera_position: [0.0, 0.0, 0.0],
            camera_look_at: [0.0, 0.0, -1.0],
            viewport_size: (512, 512),
        }
    }
}

/// Result of a mesh-selection probe. `mesh_id` is -1 when the cursor hit
/// background, otherwise the zero-based sub-mesh index; min/max span the
/// selected sub-mesh's bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SelectionInfo {
    pub mesh_id: i32,
    pub coord: (i32, i32),
    pub min_position: [f32; 4],
    pub max_position: [f32; 4],
}
