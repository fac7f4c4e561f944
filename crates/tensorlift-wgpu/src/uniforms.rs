//! Uniform-parameter packing.
//!
//! A [`UniformBlock`] is an ordered sequence of typed scalar groups that
//! serializes to the exact byte layout the shader's parameter struct expects.
//! The group order is part of the wire contract with the shader source and
//! must never be reordered independently of it.

use crate::geometry::PoolGeometry;

/// One contiguous group of uniform scalars, tagged with its element type.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformGroup {
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl UniformGroup {
    pub fn len(&self) -> usize {
        match self {
            UniformGroup::I32(v) => v.len(),
            UniformGroup::U32(v) => v.len(),
            UniformGroup::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn extend_bytes(&self, out: &mut Vec<u8>) {
        match self {
            UniformGroup::I32(v) => out.extend_from_slice(bytemuck::cast_slice(v)),
            UniformGroup::U32(v) => out.extend_from_slice(bytemuck::cast_slice(v)),
            UniformGroup::F32(v) => out.extend_from_slice(bytemuck::cast_slice(v)),
        }
    }
}

/// Ordered uniform groups with a stable byte serialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UniformBlock {
    groups: Vec<UniformGroup>,
}

impl UniformBlock {
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    pub fn push(&mut self, group: UniformGroup) {
        self.groups.push(group);
    }

    pub fn push_i32(&mut self, values: impl Into<Vec<i32>>) {
        self.groups.push(UniformGroup::I32(values.into()));
    }

    pub fn groups(&self) -> &[UniformGroup] {
        &self.groups
    }

    pub fn scalar_count(&self) -> usize {
        self.groups.iter().map(UniformGroup::len).sum()
    }

    pub fn byte_len(&self) -> usize {
        self.scalar_count() * 4
    }

    /// Serialize all groups, in order, to the shader's parameter-block bytes.
    /// All supported scalar types are 4 bytes wide, so the layout is the
    /// plain concatenation of the groups.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for group in &self.groups {
            group.extend_bytes(&mut out);
        }
        out
    }
}

/// Number of groups in the pooling wire schema.
pub const POOL_UNIFORM_GROUPS: usize = 5;

/// Pack the shader-agreed pooling parameter groups: stride(h,w),
/// pad-offset(top,left), dilation(h,w), input-size(h,w),
/// effective-filter-size(h,w). Deterministic; the order mirrors the `Params`
/// struct in the pool shaders.
pub fn pack_pool_uniforms(geometry: &PoolGeometry) -> UniformBlock {
    let mut block = UniformBlock::new();
    block.push_i32([geometry.stride_h as i32, geometry.stride_w as i32]);
    block.push_i32([geometry.pad_top as i32, geometry.pad_left as i32]);
    block.push_i32([geometry.dilation_h as i32, geometry.dilation_w as i32]);
    block.push_i32([geometry.in_h as i32, geometry.in_w as i32]);
    block.push_i32([
        geometry.effective_filter_h as i32,
        geometry.effective_filter_w as i32,
    ]);
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::resolve;
    use tensorlift_api::PadMode;

    fn sample_geometry() -> PoolGeometry {
        resolve(&[1, 5, 5, 1], [3, 3], [2, 2], PadMode::Same, [1, 1]).expect("resolve")
    }

    #[test]
    fn pool_schema_has_five_pair_groups() {
        let block = pack_pool_uniforms(&sample_geometry());
        assert_eq!(block.groups().len(), POOL_UNIFORM_GROUPS);
        for group in block.groups() {
            assert!(matches!(group, UniformGroup::I32(v) if v.len() == 2));
        }
        assert_eq!(block.byte_len(), 40);
    }

    #[test]
    fn byte_layout_is_stable_and_ordered() {
        let block = pack_pool_uniforms(&sample_geometry());
        let bytes = block.to_bytes();
        let scalars: &[i32] = bytemuck::cast_slice(&bytes);
        // stride, pad, dilation, in size, effective filter
        assert_eq!(scalars, &[2, 2, 1, 1, 1, 1, 5, 5, 3, 3]);
    }

    #[test]
    fn mixed_groups_concatenate_in_push_order() {
        let mut block = UniformBlock::new();
        block.push(UniformGroup::U32(vec![7]));
        block.push(UniformGroup::F32(vec![1.5]));
        block.push_i32([-1]);
        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 7);
        assert_eq!(f32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1.5);
        assert_eq!(i32::from_le_bytes(bytes[8..12].try_into().unwrap()), -1);
    }

    #[test]
    fn packing_is_deterministic() {
        let geom = sample_geometry();
        assert_eq!(pack_pool_uniforms(&geom), pack_pool_uniforms(&geom));
    }
}
