//! Renderable objects and their GPU-visible uniform blocks.

use crate::mesh::Mesh;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use lucent_gpu::ResourceId;

/// Per-object transform block, written into the packed uniform region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelUniform {
    pub model: Mat4,
}

impl ModelUniform {
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;
}

impl Default for ModelUniform {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
        }
    }
}

/// Per-object material block, written into the packed material region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub _padding: [f32; 2],
}

impl MaterialData {
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
            metallic: 0.0,
            roughness: 0.5,
            _padding: [0.0; 2],
        }
    }
}

/// Byte offsets assigned to an object inside the shared packed buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectOffsets {
    pub vertex: u64,
    pub index: u64,
    pub uniform: u64,
    pub material: u64,
}

/// A renderable object.
///
/// The buffer id and offsets are unset until the scene allocates its
/// generation of the shared buffer.
#[derive(Debug, Default)]
pub struct Object {
    pub mesh: Mesh,
    pub transform: Mat4,
    pub material: MaterialData,
    pub buffer_id: Option<ResourceId>,
    pub offsets: ObjectOffsets,
}

impl Object {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            transform: Mat4::IDENTITY,
            material: MaterialData::default(),
            buffer_id: None,
            offsets: ObjectOffsets::default(),
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: MaterialData) -> Self {
        self.material = material;
        self
    }

    /// Uniform block for the current transform.
    pub fn model_uniform(&self) -> ModelUniform {
        ModelUniform {
            model: self.transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_layout() {
        assert_eq!(std::mem::size_of::<ModelUniform>(), 64);
        assert_eq!(std::mem::size_of::<MaterialData>(), 32);
    }

    #[test]
    fn new_object_has_no_buffer() {
        let object = Object::new(Mesh::quad());
        assert!(object.buffer_id.is_none());
        assert_eq!(object.offsets, ObjectOffsets::default());
    }
}
