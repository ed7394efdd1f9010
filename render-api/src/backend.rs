//! Trait for viewer backends. Host uses this to drive the renderer uniformly
//! without depending on the GPU crate directly.

use crate::{FrameView, SelectionInfo};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Backend the host drives each frame. Draw submits work internally; the
/// caller never touches command buffers.
pub trait ViewerBackend: Send {
    /// Render one frame from the given view. Non-fatal draw errors are
    /// reported but the backend stays usable for the next frame.
    fn draw_frame(&mut self, view: &FrameView) -> Result<(), String>;

    /// Start a selection probe at the given framebuffer coordinate. The
    /// result becomes observable through `selection_info` a few frames later.
    fn highlight_selected_mesh(&mut self, x: i32, y: i32);

    /// Schedule the explode-animation multiplier for the next frame.
    fn set_explosion_multiplier(&mut self, value: f32);

    /// Latest completed selection result.
    fn selection_info(&self) -> SelectionInfo;

    /// Write into a named global buffer (e.g. per-mesh visibility flags).
    fn set_buffer_data(&mut self, buffer: &str, data: &[u8], offset: u64) -> Result<(), String>;

    /// Write into a named buffer owned by one job.
    fn set_job_buffer_data(
        &mut self,
        job: &str,
        buffer: &str,
        data: &[u8],
        offset: u64,
    ) -> Result<(), String>;

    fn num_meshes(&self) -> u32;
    fn frame_index(&self) -> u32;
}

/// Extension for backends that can present to a window. Host passes raw
/// handles (e.g. from winit); the backend owns surface configuration and
/// performs get_current_texture + present internally.
pub trait ViewerBackendWindow: ViewerBackend + Send {
    /// Render one frame and present it to the window identified by the given
    /// raw handles. The backend configures the surface from
    /// `view.viewport_size`.
    fn draw_frame_to_window(
        &mut self,
        view: &FrameView,
        raw_window_handle: RawWindowHandle,
        raw_display_handle: RawDisplayHandle,
    ) -> Result<(), String>;
}
