//! Mesh geometry types.

use bytemuck::{Pod, Zeroable};

/// A single vertex as laid out in the packed vertex region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0; 2],
            color: [1.0; 4],
        }
    }
}

/// CPU-side mesh data.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn vertex_bytes(&self) -> u64 {
        self.vertices.len() as u64 * Vertex::STRIDE
    }

    pub fn index_bytes(&self) -> u64 {
        self.indices.len() as u64 * std::mem::size_of::<u32>() as u64
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// A unit quad in the XY plane, useful for tests and simple scenes.
    pub fn quad() -> Self {
        let vertices = vec![
            Vertex {
                position: [-0.5, -0.5, 0.0],
                uv: [0.0, 1.0],
                ..Vertex::default()
            },
            Vertex {
                position: [0.5, -0.5, 0.0],
                uv: [1.0, 1.0],
                ..Vertex::default()
            },
            Vertex {
                position: [0.5, 0.5, 0.0],
                uv: [1.0, 0.0],
                ..Vertex::default()
            },
            Vertex {
                position: [-0.5, 0.5, 0.0],
                uv: [0.0, 0.0],
                ..Vertex::default()
            },
        ];
        let indices = vec![0, 1, 2, 2, 3, 0];
        Self { vertices, indices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout() {
        // Shader-side layout expects tightly packed 48-byte vertices
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
        assert_eq!(Vertex::STRIDE, 48);
    }

    #[test]
    fn mesh_byte_sizes() {
        let mesh = Mesh::quad();
        assert_eq!(mesh.vertex_bytes(), 4 * 48);
        assert_eq!(mesh.index_bytes(), 6 * 4);
        assert_eq!(mesh.index_count(), 6);
    }
}
