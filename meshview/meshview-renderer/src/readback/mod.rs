//! Selection read-back: a recycled staging buffer plus the bounded handshake
//! that carries the shader-written selection record back to the host. The
//! handshake itself is a pure state machine so the frame bound and the id
//! mapping are testable without a device; the async map is the engine's only
//! suspension point.

use bytemuck::{Pod, Zeroable};
use log::warn;

use crate::error::{RenderError, Result};

/// Shader-written selection record. The shader stores `mesh index + 1` so 0
/// can mean "no mesh"; `SelectionTracker::complete` undoes the offset.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SelectMeshInfo {
    pub mesh_id: i32,
    pub selection_x: i32,
    pub selection_y: i32,
    pub padding: i32,
    pub min_position: [f32; 4],
    pub max_position: [f32; 4],
}

/// Bytes copied from the selection uniform into the staging buffer and mapped
/// back. Covers the whole record with slack for alignment.
pub const READBACK_RANGE: u64 = 64;

const STAGING_SIZE: u64 = 1024;

/// What the frame executor must do for the selection cycle this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStep {
    /// Nothing pending.
    None,
    /// Write `(selected = -1, x, y)` into the selection uniform so the shader
    /// starts probing; the copy into the staging buffer follows at the end of
    /// this frame.
    BeginProbe { x: i32, y: i32 },
    /// The copy from the previous frame has landed; map the staging buffer
    /// and collect the record.
    Collect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Requested,
    AwaitingCopy,
    Copied,
}

/// Pure handshake driven once per frame by the executor.
pub struct SelectionTracker {
    state: State,
    coord: (i32, i32),
    info: SelectMeshInfo,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self {
            state: State::Idle,
            coord: (-1, -1),
            info: SelectMeshInfo {
                mesh_id: -1,
                selection_x: -1,
                selection_y: -1,
                ..Default::default()
            },
        }
    }
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host request: probe the given framebuffer coordinate.
    pub fn request(&mut self, x: i32, y: i32) {
        self.coord = (x, y);
        self.info.mesh_id = 0;
        self.state = State::Requested;
    }

    pub fn pending(&self) -> bool {
        self.state != State::Idle
    }

    /// Advance the handshake at the start of a frame.
    pub fn begin_frame(&mut self) -> SelectionStep {
        match self.state {
            State::Idle | State::AwaitingCopy => SelectionStep::None,
            State::Requested => {
                let (x, y) = self.coord;
                self.coord = (-1, -1);
                self.state = State::AwaitingCopy;
                SelectionStep::BeginProbe { x, y }
            }
            State::Copied => SelectionStep::Collect,
        }
    }

    /// The executor appended the staging copy for this frame.
    pub fn copy_recorded(&mut self) {
        if self.state == State::AwaitingCopy {
            self.state = State::Copied;
        }
    }

    pub fn wants_copy(&self) -> bool {
        self.state == State::AwaitingCopy
    }

    /// Apply a collected record: shift the id back to zero-based (-1 means
    /// background) and clear the pending flag.
    pub fn complete(&mut self, mut raw: SelectMeshInfo) -> SelectMeshInfo {
        raw.mesh_id -= 1;
        self.info = raw;
        self.state = State::Idle;
        self.info
    }

    /// Map failure: keep the previous selection, clear the pending flag.
    pub fn fail(&mut self) {
        self.state = State::Idle;
    }

    pub fn info(&self) -> SelectMeshInfo {
        self.info
    }
}

/// Staging buffer plus tracker; owns the GPU half of the handshake.
pub struct SelectionReadback {
    staging: wgpu::Buffer,
    pub tracker: SelectionTracker,
}

impl SelectionReadback {
    pub fn new(device: &wgpu::Device) -> Self {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Selection Read Back Buffer"),
            size: STAGING_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            staging,
            tracker: SelectionTracker::new(),
        }
    }

    /// Append the copy from the selection job's result buffer into the
    /// staging buffer.
    pub fn record_copy(&self, encoder: &mut wgpu::CommandEncoder, source: &wgpu::Buffer) {
        encoder.copy_buffer_to_buffer(source, 0, &self.staging, 0, READBACK_RANGE);
    }

    /// Map the staging range and read the record. Blocks on the device until
    /// the map callback fires; this is the engine's only suspension point.
    pub fn collect(&mut self, device: &wgpu::Device) -> Result<SelectMeshInfo> {
        let slice = self.staging.slice(0..READBACK_RANGE);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {
                let raw = {
                    let mapped = slice.get_mapped_range();
                    bytemuck::pod_read_unaligned::<SelectMeshInfo>(
                        &mapped[..std::mem::size_of::<SelectMeshInfo>()],
                    )
                };
                self.staging.unmap();
                Ok(self.tracker.complete(raw))
            }
            Ok(Err(e)) => {
                self.tracker.fail();
                Err(RenderError::Readback(e.to_string()))
            }
            Err(_) => {
                self.tracker.fail();
                Err(RenderError::Readback("map callback dropped".into()))
            }
        }
    }

    /// Non-fatal collect: failures are logged and the previous selection is
    /// retained.
    pub fn collect_lossy(&mut self, device: &wgpu::Device) {
        if let Err(e) = self.collect(device) {
            warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_info(mesh_id: i32) -> SelectMeshInfo {
        SelectMeshInfo {
            mesh_id,
            selection_x: 256,
            selection_y: 300,
            padding: 0,
            min_position: [-1.0, -1.0, -1.0, 1.0],
            max_position: [1.0, 1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn record_layout() {
        assert_eq!(std::mem::size_of::<SelectMeshInfo>(), 48);
        assert!(std::mem::size_of::<SelectMeshInfo>() as u64 <= READBACK_RANGE);
    }

    #[test]
    fn lifecycle_completes_within_bound() {
        let mut tracker = SelectionTracker::new();
        assert_eq!(tracker.info().mesh_id, -1);

        tracker.request(256, 300);
        assert!(tracker.pending());

        // Frame 1: the probe coordinates go out, the copy is appended.
        assert_eq!(
            tracker.begin_frame(),
            SelectionStep::BeginProbe { x: 256, y: 300 }
        );
        assert!(tracker.wants_copy());
        tracker.copy_recorded();

        // Frame 2: collect and finish. Well inside the four-frame bound.
        assert_eq!(tracker.begin_frame(), SelectionStep::Collect);
        let info = tracker.complete(raw_info(43));
        assert_eq!(info.mesh_id, 42);
        assert!(!tracker.pending());
        assert_eq!(tracker.begin_frame(), SelectionStep::None);
    }

    #[test]
    fn shader_zero_means_background() {
        let mut tracker = SelectionTracker::new();
        tracker.request(10, 10);
        tracker.begin_frame();
        tracker.copy_recorded();
        tracker.begin_frame();
        let info = tracker.complete(raw_info(0));
        assert_eq!(info.mesh_id, -1);
    }

    #[test]
    fn failure_retains_previous_selection() {
        let mut tracker = SelectionTracker::new();
        tracker.request(10, 10);
        tracker.begin_frame();
        tracker.copy_recorded();
        tracker.begin_frame();
        tracker.complete(raw_info(5));
        assert_eq!(tracker.info().mesh_id, 4);

        tracker.request(20, 20);
        tracker.begin_frame();
        tracker.copy_recorded();
        tracker.begin_frame();
        tracker.fail();
        assert!(!tracker.pending());
        assert_eq!(tracker.info().mesh_id, 4);
    }

    #[test]
    fn copy_only_after_probe_frame() {
        let mut tracker = SelectionTracker::new();
        assert!(!tracker.wants_copy());
        tracker.request(1, 2);
        assert!(!tracker.wants_copy());
        tracker.begin_frame();
        assert!(tracker.wants_copy());
        tracker.copy_recorded();
        assert!(!tracker.wants_copy());
    }
}
