//! Global resource registry: name-keyed buffers and textures shared across
//! jobs, with byte sizes for bind-group min-size bookkeeping. Names are
//! claimed once; re-registering is an error and nothing is ever re-allocated.

use std::collections::HashMap;

use crate::error::{RenderError, Result};

/// Well-known buffer names created during renderer setup.
pub const VERTEX_BUFFER: &str = "vertex-buffer";
pub const INDEX_BUFFER: &str = "index-buffer";
pub const MESH_TRIANGLE_RANGES: &str = "meshTriangleIndexRanges";
pub const MESH_EXTENTS: &str = "meshExtents";
pub const MESH_MATERIAL_IDS: &str = "meshMaterialIDs";
pub const MESH_MATERIALS: &str = "meshMaterials";
pub const VISIBILITY_FLAGS: &str = "visibilityFlags";
pub const DEFAULT_UNIFORM_BUFFER: &str = "default-uniform-buffer";
pub const FULL_SCREEN_TRIANGLE: &str = "full-screen-triangle";
pub const BLUE_NOISE_BUFFER: &str = "blueNoiseBuffer";

/// Read-only lookup jobs use to bind global buffers they do not own.
pub trait BufferProvider {
    fn resolve(&self, name: &str) -> Option<(&wgpu::Buffer, u64)>;
}

/// Companion lookup for globally registered textures.
pub trait TextureProvider {
    fn resolve_texture(&self, name: &str) -> Option<&wgpu::Texture>;
}

#[derive(Default)]
pub struct ResourceRegistry {
    buffers: HashMap<String, (wgpu::Buffer, u64)>,
    textures: HashMap<String, wgpu::Texture>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a buffer in one step, returning it for the initial
    /// upload.
    pub fn create_buffer(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> Result<&wgpu::Buffer> {
        match self.buffers.entry(name.to_string()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(RenderError::duplicate(name))
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(name),
                    size,
                    usage,
                    mapped_at_creation: false,
                });
                Ok(&slot.insert((buffer, size)).0)
            }
        }
    }

    pub fn insert_texture(&mut self, name: &str, texture: wgpu::Texture) -> Result<()> {
        if self.textures.contains_key(name) {
            return Err(RenderError::duplicate(name));
        }
        self.textures.insert(name.to_string(), texture);
        Ok(())
    }

    pub fn buffer(&self, name: &str) -> Option<&wgpu::Buffer> {
        self.buffers.get(name).map(|(b, _)| b)
    }

    pub fn buffer_size(&self, name: &str) -> Option<u64> {
        self.buffers.get(name).map(|(_, s)| *s)
    }
}

impl BufferProvider for ResourceRegistry {
    fn resolve(&self, name: &str) -> Option<(&wgpu::Buffer, u64)> {
        self.buffers.get(name).map(|(b, s)| (b, *s))
    }
}

impl TextureProvider for ResourceRegistry {
    fn resolve_texture(&self, name: &str) -> Option<&wgpu::Texture> {
        self.textures.get(name)
    }
}
