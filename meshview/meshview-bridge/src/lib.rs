//! Meshview bridge: implements the render-api viewer traits on top of the
//! meshview renderer and owns everything presentation-side (wgpu instance,
//! surface, swap-chain blit).

mod blit;
pub mod plugin;
pub mod window_backend;

pub use plugin::{MeshViewerPlugin, ViewerAssets};
pub use window_backend::MeshViewerWindowBackend;
