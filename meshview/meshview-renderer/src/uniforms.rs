//! The shared per-frame uniform structure bound at the end of group 1 of
//! every pipeline. Layout must match the WGSL `DefaultUniformData` declared
//! by every shader in the pipeline set.

use bytemuck::{Pod, Zeroable};
use render_api::FrameView;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct DefaultUniformData {
    pub screen_width: i32,
    pub screen_height: i32,
    pub frame: i32,
    pub num_meshes: u32,

    pub rand0: f32,
    pub rand1: f32,
    pub rand2: f32,
    pub rand3: f32,

    pub view_projection_matrix: [f32; 16],
    pub prev_view_projection_matrix: [f32; 16],
    pub view_matrix: [f32; 16],
    pub projection_matrix: [f32; 16],

    pub jittered_view_projection_matrix: [f32; 16],
    pub prev_jittered_view_projection_matrix: [f32; 16],

    pub camera_position: [f32; 4],
    pub camera_look_dir: [f32; 4],

    pub light_radiance: [f32; 4],
    pub light_direction: [f32; 4],

    pub ambient_occlusion_distance_threshold: f32,
    pub _pad: [f32; 3],
}

pub const DEFAULT_UNIFORM_SIZE: u64 = std::mem::size_of::<DefaultUniformData>() as u64;

/// Per-frame inputs that do not come from the host's `FrameView`.
pub struct FrameConstants {
    pub screen: (u32, u32),
    pub frame: u32,
    pub num_meshes: u32,
    pub rand: [f32; 4],
    pub light_radiance: [f32; 4],
    pub light_direction: [f32; 4],
    pub ambient_occlusion_distance_threshold: f32,
}

/// Compose the uniform contents for one frame. The jittered matrices mirror
/// the unjittered ones; the engine does not apply a projection jitter.
pub fn compose(view: &FrameView, constants: &FrameConstants) -> DefaultUniformData {
    let [px, py, pz] = view.camera_position;
    let [lx, ly, lz] = view.camera_look_at;
    DefaultUniformData {
        screen_width: constants.screen.0 as i32,
        screen_height: constants.screen.1 as i32,
        frame: constants.frame as i32,
        num_meshes: constants.num_meshes,
        rand0: constants.rand[0],
        rand1: constants.rand[1],
        rand2: constants.rand[2],
        rand3: constants.rand[3],
        view_projection_matrix: view.view_projection_matrix,
        prev_view_projection_matrix: view.prev_view_projection_matrix,
        view_matrix: view.view_matrix,
        projection_matrix: view.projection_matrix,
        jittered_view_projection_matrix: view.view_projection_matrix,
        prev_jittered_view_projection_matrix: view.prev_view_projection_matrix,
        camera_position: [px, py, pz, 1.0],
        camera_look_dir: [lx, ly, lz, 1.0],
        light_radiance: constants.light_radiance,
        light_direction: constants.light_direction,
        ambient_occlusion_distance_threshold: constants.ambient_occlusion_distance_threshold,
        _pad: [0.0; 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_wgsl() {
        // Scalar block, then six mat4x4f, then four vec4f, then one f32 + pad.
        assert_eq!(size_of::<DefaultUniformData>(), 496);
        assert_eq!(offset_of!(DefaultUniformData, rand0), 16);
        assert_eq!(offset_of!(DefaultUniformData, view_projection_matrix), 32);
        assert_eq!(offset_of!(DefaultUniformData, camera_position), 416);
        assert_eq!(offset_of!(DefaultUniformData, light_radiance), 448);
        assert_eq!(
            offset_of!(DefaultUniformData, ambient_occlusion_distance_threshold),
            480
        );
    }

    #[test]
    fn jitter_mirrors_unjittered() {
        let mut view = FrameView::default();
        view.view_projection_matrix[0] = 2.0;
        view.prev_view_projection_matrix[5] = 3.0;
        let constants = FrameConstants {
            screen: (512, 512),
            frame: 7,
            num_meshes: 9,
            rand: [0.1, 0.2, 0.3, 0.4],
            light_radiance: [1.0; 4],
            light_direction: [0.0, -1.0, 0.0, 1.0],
            ambient_occlusion_distance_threshold: 0.0,
        };
        let data = compose(&view, &constants);
        assert_eq!(
            data.jittered_view_projection_matrix,
            data.view_projection_matrix
        );
        assert_eq!(
            data.prev_jittered_view_projection_matrix,
            data.prev_view_projection_matrix
        );
        assert_eq!(data.frame, 7);
        assert_eq!(data.num_meshes, 9);
        assert_eq!(data.camera_position[3], 1.0);
    }
}
