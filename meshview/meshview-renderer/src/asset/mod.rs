//! Packed mesh asset codec. Little-endian, tightly packed:
//! five u32 counts, per-mesh triangle ranges, per-mesh extents plus one
//! trailing aggregate extent, vertices (position/uv/normal as vec4 each),
//! and u32 triangle indices.

use bytemuck::{Pod, Zeroable};

use crate::error::{RenderError, Result};

/// One mesh vertex as stored in the asset and in the GPU vertex buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub uv: [f32; 4],
    pub normal: [f32; 4],
}

/// Half-open triangle-index range [start, end) of one sub-mesh.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshTriangleRange {
    pub start: u32,
    pub end: u32,
}

/// Axis-aligned bounding box of one sub-mesh.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshExtent {
    pub min_position: [f32; 4],
    pub max_position: [f32; 4],
}

/// A parsed mesh asset. `extents` holds one record per sub-mesh plus the
/// aggregate bounding box as its final element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshAsset {
    pub triangle_ranges: Vec<MeshTriangleRange>,
    pub extents: Vec<MeshExtent>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub triangle_start_offset: u32,
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn read<T: Pod>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let end = self.offset + size;
        if end > self.bytes.len() {
            return Err(RenderError::config("mesh asset truncated"));
        }
        let value = bytemuck::pod_read_unaligned(&self.bytes[self.offset..end]);
        self.offset = end;
        Ok(value)
    }

    fn read_vec<T: Pod>(&mut self, count: usize) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read::<T>()?);
        }
        Ok(out)
    }
}

impl MeshAsset {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader { bytes, offset: 0 };
        let num_meshes = r.read::<u32>()? as usize;
        let num_vertices = r.read::<u32>()? as usize;
        let num_triangles = r.read::<u32>()? as usize;
        let vertex_stride = r.read::<u32>()?;
        let triangle_start_offset = r.read::<u32>()?;

        if vertex_stride as usize != std::mem::size_of::<Vertex>() {
            return Err(RenderError::config(format!(
                "mesh asset declares vertex stride {vertex_stride}, expected {}",
                std::mem::size_of::<Vertex>()
            )));
        }

        let triangle_ranges = r.read_vec::<MeshTriangleRange>(num_meshes)?;
        let extents = r.read_vec::<MeshExtent>(num_meshes + 1)?;
        let vertices = r.read_vec::<Vertex>(num_vertices)?;
        let indices = r.read_vec::<u32>(num_triangles * 3)?;

        Ok(Self {
            triangle_ranges,
            extents,
            vertices,
            indices,
            triangle_start_offset,
        })
    }

    /// Serialize back into the packed binary layout. Parsing the result
    /// reproduces this asset byte for byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let header = [
            self.num_meshes(),
            self.vertices.len() as u32,
            (self.indices.len() / 3) as u32,
            std::mem::size_of::<Vertex>() as u32,
            self.triangle_start_offset,
        ];
        out.extend_from_slice(bytemuck::cast_slice(&header));
        out.extend_from_slice(bytemuck::cast_slice(&self.triangle_ranges));
        out.extend_from_slice(bytemuck::cast_slice(&self.extents));
        out.extend_from_slice(bytemuck::cast_slice(&self.vertices));
        out.extend_from_slice(bytemuck::cast_slice(&self.indices));
        out
    }

    pub fn num_meshes(&self) -> u32 {
        self.triangle_ranges.len() as u32
    }

    /// Aggregate bounding box over all sub-meshes (the trailing extent).
    pub fn total_extent(&self) -> MeshExtent {
        self.extents.last().copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> MeshAsset {
        MeshAsset {
            triangle_ranges: vec![
                MeshTriangleRange { start: 0, end: 3 },
                MeshTriangleRange { start: 3, end: 9 },
            ],
            extents: vec![
                MeshExtent {
                    min_position: [-1.0, -1.0, -1.0, 1.0],
                    max_position: [0.0, 0.0, 0.0, 1.0],
                },
                MeshExtent {
                    min_position: [0.0, 0.0, 0.0, 1.0],
                    max_position: [2.0, 2.0, 2.0, 1.0],
                },
                MeshExtent {
                    min_position: [-1.0, -1.0, -1.0, 1.0],
                    max_position: [2.0, 2.0, 2.0, 1.0],
                },
            ],
            vertices: (0..4)
                .map(|i| Vertex {
                    position: [i as f32, 0.0, 0.0, 1.0],
                    uv: [0.0, 1.0, 0.0, 0.0],
                    normal: [0.0, 0.0, 1.0, 1.0],
                })
                .collect(),
            indices: vec![0, 1, 2, 1, 2, 3, 0, 2, 3],
            triangle_start_offset: 0,
        }
    }

    #[test]
    fn round_trip() {
        let asset = sample_asset();
        let bytes = asset.to_bytes();
        let parsed = MeshAsset::parse(&bytes).unwrap();
        assert_eq!(parsed, asset);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn counts() {
        let asset = sample_asset();
        assert_eq!(asset.num_meshes(), 2);
        assert_eq!(asset.total_extent().max_position, [2.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn truncated_fails() {
        let bytes = sample_asset().to_bytes();
        assert!(matches!(
            MeshAsset::parse(&bytes[..bytes.len() - 4]),
            Err(RenderError::Config(_))
        ));
        assert!(matches!(
            MeshAsset::parse(&bytes[..8]),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn bad_stride_fails() {
        let mut bytes = sample_asset().to_bytes();
        bytes[12..16].copy_from_slice(&24u32.to_le_bytes());
        assert!(matches!(
            MeshAsset::parse(&bytes),
            Err(RenderError::Config(_))
        ));
    }
}
