//! Packed buffer layout.
//!
//! A [`PackedLayout`] is computed once per buffer generation and shared by
//! the write path and the offset-assignment path, so the two can never
//! disagree about where a region lives.

use lucent_core::math::align_up;

/// Names of the regions a scene buffer carries, in packing order.
pub const REGION_VERTICES: &str = "vertices";
pub const REGION_INDICES: &str = "indices";
pub const REGION_UNIFORMS: &str = "uniforms";
pub const REGION_MATERIALS: &str = "materials";

/// One region request: a name, its byte size, and its alignment.
///
/// An alignment of zero or one means the region packs directly after its
/// predecessor.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub name: &'static str,
    pub size: u64,
    pub align: u64,
}

impl Region {
    pub const fn new(name: &'static str, size: u64, align: u64) -> Self {
        Self { name, size, align }
    }

    pub const fn packed(name: &'static str, size: u64) -> Self {
        Self {
            name,
            size,
            align: 0,
        }
    }
}

/// Resolved byte offsets for an ordered set of regions.
#[derive(Debug, Clone)]
pub struct PackedLayout {
    regions: Vec<(Region, u64)>,
    total_size: u64,
}

impl PackedLayout {
    /// Compute offsets for the given regions in order.
    pub fn new(regions: &[Region]) -> Self {
        let mut resolved = Vec::with_capacity(regions.len());
        let mut cursor = 0u64;

        for &region in regions {
            if region.align > 1 {
                cursor = align_up(cursor, region.align);
            }
            resolved.push((region, cursor));
            cursor += region.size;
        }

        Self {
            regions: resolved,
            total_size: cursor,
        }
    }

    /// Byte offset of a named region.
    pub fn offset(&self, name: &str) -> Option<u64> {
        self.regions
            .iter()
            .find(|(region, _)| region.name == name)
            .map(|&(_, offset)| offset)
    }

    /// Byte size of a named region.
    pub fn size(&self, name: &str) -> Option<u64> {
        self.regions
            .iter()
            .find(|(region, _)| region.name == name)
            .map(|&(region, _)| region.size)
    }

    /// Total buffer size covering every region.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_regions_are_contiguous() {
        let layout = PackedLayout::new(&[
            Region::packed("a", 100),
            Region::packed("b", 50),
            Region::packed("c", 8),
        ]);

        assert_eq!(layout.offset("a"), Some(0));
        assert_eq!(layout.offset("b"), Some(100));
        assert_eq!(layout.offset("c"), Some(150));
        assert_eq!(layout.total_size(), 158);
    }

    #[test]
    fn aligned_region_rounds_up() {
        let layout = PackedLayout::new(&[
            Region::packed("geometry", 100),
            Region::new("uniforms", 64, 256),
        ]);

        assert_eq!(layout.offset("uniforms"), Some(256));
        assert_eq!(layout.total_size(), 320);
    }

    #[test]
    fn already_aligned_region_stays() {
        let layout = PackedLayout::new(&[
            Region::packed("geometry", 256),
            Region::new("uniforms", 64, 256),
        ]);

        assert_eq!(layout.offset("uniforms"), Some(256));
    }

    #[test]
    fn unknown_region_is_none() {
        let layout = PackedLayout::new(&[Region::packed("a", 4)]);
        assert_eq!(layout.offset("missing"), None);
        assert_eq!(layout.size("missing"), None);
    }

    #[test]
    fn empty_layout() {
        let layout = PackedLayout::new(&[]);
        assert_eq!(layout.total_size(), 0);
    }
}
