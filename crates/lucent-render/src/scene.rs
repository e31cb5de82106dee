//! Shared scene buffer management.
//!
//! All meshes, per-object uniforms, and material blocks live in one packed
//! buffer per generation. Re-allocating the scene rebuilds the whole buffer:
//! the previous generation is released through the registry before the new
//! one is created.

use crate::layout::{
    PackedLayout, Region, REGION_INDICES, REGION_MATERIALS, REGION_UNIFORMS, REGION_VERTICES,
};
use crate::object::{MaterialData, ModelUniform, Object, ObjectOffsets};
use ash::vk;
use lucent_gpu::{GpuContext, GpuError, ResourceId, Result};

/// Build the packed layout for a set of objects.
///
/// Regions in order: vertices, indices, uniforms (region base aligned to the
/// device's minimum uniform-buffer offset alignment), materials. Uniform
/// blocks pack tightly within their region; only the region base is aligned.
pub fn build_scene_layout(objects: &[Object], min_uniform_alignment: u64) -> PackedLayout {
    let vertex_bytes: u64 = objects.iter().map(|o| o.mesh.vertex_bytes()).sum();
    let index_bytes: u64 = objects.iter().map(|o| o.mesh.index_bytes()).sum();
    let count = objects.len() as u64;

    PackedLayout::new(&[
        Region::packed(REGION_VERTICES, vertex_bytes),
        Region::packed(REGION_INDICES, index_bytes),
        Region::new(
            REGION_UNIFORMS,
            count * ModelUniform::STRIDE,
            min_uniform_alignment.max(1),
        ),
        Region::packed(REGION_MATERIALS, count * MaterialData::STRIDE),
    ])
}

/// Compute each object's byte offsets from the shared layout.
///
/// Geometry packs in object order inside the vertex and index regions;
/// uniform and material blocks are strided by object index.
pub fn compute_object_offsets(objects: &[Object], layout: &PackedLayout) -> Vec<ObjectOffsets> {
    let vertex_base = layout.offset(REGION_VERTICES).unwrap_or(0);
    let index_base = layout.offset(REGION_INDICES).unwrap_or(0);
    let uniform_base = layout.offset(REGION_UNIFORMS).unwrap_or(0);
    let material_base = layout.offset(REGION_MATERIALS).unwrap_or(0);

    let mut offsets = Vec::with_capacity(objects.len());
    let mut vertex_cursor = vertex_base;
    let mut index_cursor = index_base;

    for (i, object) in objects.iter().enumerate() {
        offsets.push(ObjectOffsets {
            vertex: vertex_cursor,
            index: index_cursor,
            uniform: uniform_base + i as u64 * ModelUniform::STRIDE,
            material: material_base + i as u64 * MaterialData::STRIDE,
        });
        vertex_cursor += object.mesh.vertex_bytes();
        index_cursor += object.mesh.index_bytes();
    }

    offsets
}

/// Rebuild the shared scene buffer for the given objects.
///
/// Releases each object's reference to the previous generation (destroying
/// it once the last reference drops), allocates one packed buffer, writes
/// the geometry regions, flushes only those regions, seeds the uniform and
/// material blocks, and registers the buffer with one reference per object.
pub fn allocate_models_buffers(gpu: &GpuContext, objects: &mut [Object]) -> Result<ResourceId> {
    if objects.is_empty() {
        return Err(GpuError::InvalidState(
            "cannot allocate scene buffer for zero objects".to_string(),
        ));
    }

    // Release the previous generation before building the new one.
    for object in objects.iter_mut() {
        if let Some(id) = object.buffer_id.take() {
            gpu.release_buffer(id)?;
        }
    }

    let min_uniform_alignment = gpu.allocator().lock().min_uniform_offset_alignment();
    let layout = build_scene_layout(objects, min_uniform_alignment);
    let offsets = compute_object_offsets(objects, &layout);

    let buffer = gpu.allocator().lock().create_buffer(
        layout.total_size(),
        vk::BufferUsageFlags::VERTEX_BUFFER
            | vk::BufferUsageFlags::INDEX_BUFFER
            | vk::BufferUsageFlags::UNIFORM_BUFFER,
        lucent_gpu::BufferClass::Generic,
        "scene_models",
    )?;

    for (object, object_offsets) in objects.iter().zip(&offsets) {
        buffer.write_range(object_offsets.vertex, &object.mesh.vertices)?;
        buffer.write_range(object_offsets.index, &object.mesh.indices)?;
        buffer.write_range(object_offsets.uniform, &[object.model_uniform()])?;
        buffer.write_range(object_offsets.material, &[object.material])?;
    }

    // Geometry is written once per generation; only that range needs an
    // explicit flush. Uniform and material blocks are rewritten and flushed
    // by the per-frame updates.
    let atom_size = gpu.capabilities().non_coherent_atom_size;
    let geometry_bytes = layout.offset(REGION_UNIFORMS).unwrap_or(0);
    if geometry_bytes > 0 {
        unsafe { buffer.flush(gpu.device(), 0, geometry_bytes, atom_size)? };
    }

    let id = gpu
        .buffer_registry()
        .lock()
        .register_with_count(buffer, objects.len() as u32);

    for (object, object_offsets) in objects.iter_mut().zip(offsets) {
        object.buffer_id = Some(id);
        object.offsets = object_offsets;
    }

    tracing::debug!(
        id,
        objects = objects.len(),
        bytes = layout.total_size(),
        "scene buffer rebuilt"
    );

    Ok(id)
}

/// Write an object's current transform into its uniform block.
///
/// The written range is flushed; scene buffers may live on non-coherent
/// host-visible memory.
pub fn update_object_uniform(gpu: &GpuContext, object: &Object) -> Result<()> {
    let id = object
        .buffer_id
        .ok_or_else(|| GpuError::InvalidState("object has no scene buffer".to_string()))?;

    let registry = gpu.buffer_registry().lock();
    let buffer = registry.get(id)?;
    buffer.write_range(object.offsets.uniform, &[object.model_uniform()])?;
    unsafe {
        buffer.flush(
            gpu.device(),
            object.offsets.uniform,
            ModelUniform::STRIDE,
            gpu.capabilities().non_coherent_atom_size,
        )
    }
}

/// Write an object's current material into its material block.
///
/// Flushes like [`update_object_uniform`].
pub fn update_object_material(gpu: &GpuContext, object: &Object) -> Result<()> {
    let id = object
        .buffer_id
        .ok_or_else(|| GpuError::InvalidState("object has no scene buffer".to_string()))?;

    let registry = gpu.buffer_registry().lock();
    let buffer = registry.get(id)?;
    buffer.write_range(object.offsets.material, &[object.material])?;
    unsafe {
        buffer.flush(
            gpu.device(),
            object.offsets.material,
            MaterialData::STRIDE,
            gpu.capabilities().non_coherent_atom_size,
        )
    }
}

/// Descriptor info for a registered buffer range.
pub fn buffer_descriptor(
    gpu: &GpuContext,
    id: ResourceId,
    offset: u64,
    range: u64,
) -> Result<vk::DescriptorBufferInfo> {
    let registry = gpu.buffer_registry().lock();
    let buffer = registry.get(id)?;

    Ok(vk::DescriptorBufferInfo::default()
        .buffer(buffer.buffer)
        .offset(offset)
        .range(range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Mesh, Vertex};
    use lucent_core::math::align_up;

    fn object_with_vertices(count: usize) -> Object {
        let vertices = vec![Vertex::default(); count];
        let indices: Vec<u32> = (0..count as u32).collect();
        Object::new(Mesh::new(vertices, indices))
    }

    #[test]
    fn layout_offsets_for_three_meshes() {
        let objects = [
            object_with_vertices(10),
            object_with_vertices(20),
            object_with_vertices(30),
        ];
        let layout = build_scene_layout(&objects, 256);

        let vertex_bytes = 60 * Vertex::STRIDE;
        let index_bytes = 60 * 4;

        assert_eq!(layout.offset(REGION_VERTICES), Some(0));
        assert_eq!(layout.offset(REGION_INDICES), Some(vertex_bytes));
        let uniform_offset = layout.offset(REGION_UNIFORMS).unwrap();
        assert_eq!(uniform_offset, align_up(vertex_bytes + index_bytes, 256));
        assert_eq!(
            layout.offset(REGION_MATERIALS),
            Some(uniform_offset + 3 * ModelUniform::STRIDE)
        );
    }

    #[test]
    fn object_offsets_pack_geometry_in_order() {
        let objects = [
            object_with_vertices(10),
            object_with_vertices(20),
            object_with_vertices(30),
        ];
        let layout = build_scene_layout(&objects, 256);
        let offsets = compute_object_offsets(&objects, &layout);

        assert_eq!(offsets[0].vertex, 0);
        assert_eq!(offsets[1].vertex, 10 * Vertex::STRIDE);
        assert_eq!(offsets[2].vertex, 30 * Vertex::STRIDE);

        let index_base = layout.offset(REGION_INDICES).unwrap();
        assert_eq!(offsets[0].index, index_base);
        assert_eq!(offsets[1].index, index_base + 10 * 4);
        assert_eq!(offsets[2].index, index_base + 30 * 4);
    }

    #[test]
    fn uniform_blocks_pack_tightly_from_aligned_base() {
        let objects = [
            object_with_vertices(10),
            object_with_vertices(20),
            object_with_vertices(30),
        ];
        let layout = build_scene_layout(&objects, 256);
        let offsets = compute_object_offsets(&objects, &layout);

        // Only the region base is aligned; blocks are strided by their size.
        let base = layout.offset(REGION_UNIFORMS).unwrap();
        assert_eq!(base % 256, 0);
        assert_eq!(offsets[0].uniform, base);
        assert_eq!(offsets[1].uniform, base + ModelUniform::STRIDE);
        assert_eq!(offsets[2].uniform, base + 2 * ModelUniform::STRIDE);

        // 60 vertices + 60 indices round up to the next 256-byte boundary.
        assert_eq!(base, 3328);
        assert_eq!(offsets[1].uniform, 3392);
    }

    #[test]
    fn uniform_flush_range_covers_the_block() {
        use lucent_gpu::alloc::atom_aligned_range;

        let objects = [
            object_with_vertices(10),
            object_with_vertices(20),
            object_with_vertices(30),
        ];
        let layout = build_scene_layout(&objects, 256);
        let offsets = compute_object_offsets(&objects, &layout);

        // A matching atom flushes exactly one block.
        let (start, size) = atom_aligned_range(offsets[1].uniform, ModelUniform::STRIDE, 64);
        assert_eq!((start, size), (offsets[1].uniform, ModelUniform::STRIDE));

        // A coarser atom widens the range but still covers the block.
        let (start, size) = atom_aligned_range(offsets[1].uniform, ModelUniform::STRIDE, 256);
        assert!(start <= offsets[1].uniform);
        assert!(start + size >= offsets[1].uniform + ModelUniform::STRIDE);
    }
}
