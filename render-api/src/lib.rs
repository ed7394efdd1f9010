//! Shared viewer API for the mesh viewer.
//! Defines the per-frame view types, the selection record surfaced to the host,
//! the blob-loading contract, and the ViewerBackend trait so the host can drive
//! any backend with the same code path (draw + select + explode).

mod backend;
mod loader;
mod view;

pub use backend::{ViewerBackend, ViewerBackendWindow};
pub use loader::{BlobLoader, DirLoader};
pub use view::{FrameView, SelectionInfo};
pub use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
