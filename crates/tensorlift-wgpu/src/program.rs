//! Compute program descriptors for the pooling passes.
//!
//! A [`Pool2dProgram`] bundles everything the engine needs to run one pass:
//! generated shader source, an ordered binding schema, the expected uniform
//! group schema, and a stable cache tag. Uniform validation happens here,
//! before any device work is recorded.

use tensorlift_api::{ElemType, KernelError};

use crate::config;
use crate::geometry::PoolGeometry;
use crate::shaders::pool2d::pool2d_shader;
use crate::types::{PoolKind, PoolOutput};
use crate::uniforms::{UniformBlock, UniformGroup, POOL_UNIFORM_GROUPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    StorageRead,
    StorageReadWrite,
    Uniform,
}

/// One slot in a program's bind group, in shader declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDecl {
    pub binding: u32,
    pub kind: BindingKind,
}

/// Scalar type of one expected uniform group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformGroupType {
    I32,
    U32,
    F32,
}

impl UniformGroupType {
    fn matches(&self, group: &UniformGroup) -> bool {
        matches!(
            (self, group),
            (UniformGroupType::I32, UniformGroup::I32(_))
                | (UniformGroupType::U32, UniformGroup::U32(_))
                | (UniformGroupType::F32, UniformGroup::F32(_))
        )
    }
}

/// Immutable description of one pooling compute pass.
#[derive(Debug, Clone)]
pub struct Pool2dDescriptor {
    pub kind: PoolKind,
    pub output: PoolOutput,
    pub workgroup_size: u32,
}

impl Pool2dDescriptor {
    pub fn new(kind: PoolKind, output: PoolOutput) -> Self {
        Self::with_workgroup_size(kind, output, config::effective_workgroup_size())
    }

    pub fn with_workgroup_size(kind: PoolKind, output: PoolOutput, workgroup_size: u32) -> Self {
        Self {
            kind,
            output,
            workgroup_size,
        }
    }
}

pub struct Pool2dProgram {
    descriptor: Pool2dDescriptor,
    shader_source: String,
    layout_tag: String,
    bindings: Vec<BindingDecl>,
    expected_uniforms: Vec<(UniformGroupType, usize)>,
}

impl Pool2dProgram {
    pub fn new(descriptor: Pool2dDescriptor) -> Self {
        let shader_source = pool2d_shader(
            descriptor.kind,
            descriptor.output,
            descriptor.workgroup_size,
        );
        let layout_tag = format!(
            "tensorlift-pool2d-{}-{}",
            descriptor.kind.label(),
            descriptor.output.label()
        );

        let mut bindings = vec![BindingDecl {
            binding: 0,
            kind: BindingKind::StorageRead,
        }];
        let mut next = 1u32;
        for _ in 0..descriptor.output.output_count() {
            bindings.push(BindingDecl {
                binding: next,
                kind: BindingKind::StorageReadWrite,
            });
            next += 1;
        }
        bindings.push(BindingDecl {
            binding: next,
            kind: BindingKind::Uniform,
        });

        // Five caller-packed pair groups plus the appended out-dims group.
        let mut expected_uniforms = vec![(UniformGroupType::I32, 2); POOL_UNIFORM_GROUPS];
        expected_uniforms.push((UniformGroupType::I32, 4));

        Self {
            descriptor,
            shader_source,
            layout_tag,
            bindings,
            expected_uniforms,
        }
    }

    pub fn descriptor(&self) -> &Pool2dDescriptor {
        &self.descriptor
    }

    pub fn shader_source(&self) -> &str {
        &self.shader_source
    }

    pub fn layout_tag(&self) -> &str {
        &self.layout_tag
    }

    pub fn bindings(&self) -> &[BindingDecl] {
        &self.bindings
    }

    /// Element types of the output buffers, in binding order.
    pub fn output_dtypes(&self) -> Vec<ElemType> {
        let mut out = Vec::with_capacity(self.descriptor.output.output_count());
        if self.descriptor.output.emits_values() {
            out.push(ElemType::F32);
        }
        if self.descriptor.output.emits_indices() {
            out.push(ElemType::I32);
        }
        out
    }

    /// Append the output-dims group and check the result against the
    /// program's expected schema. Runs before any buffer is written or any
    /// pass is recorded, so a mismatched block never reaches the device.
    pub fn finalize_uniforms(
        &self,
        mut block: UniformBlock,
        geometry: &PoolGeometry,
    ) -> Result<UniformBlock, KernelError> {
        block.push_i32([
            geometry.batch as i32,
            geometry.out_h as i32,
            geometry.out_w as i32,
            geometry.channels as i32,
        ]);

        if block.groups().len() != self.expected_uniforms.len() {
            return Err(KernelError::BindingMismatch {
                program: self.layout_tag.clone(),
                detail: format!(
                    "expected {} uniform groups, got {}",
                    self.expected_uniforms.len(),
                    block.groups().len()
                ),
            });
        }
        for (i, (expected, group)) in self
            .expected_uniforms
            .iter()
            .zip(block.groups())
            .enumerate()
        {
            if !expected.0.matches(group) || expected.1 != group.len() {
                return Err(KernelError::BindingMismatch {
                    program: self.layout_tag.clone(),
                    detail: format!(
                        "uniform group {i} expected {:?} x{}, got {} scalars",
                        expected.0,
                        expected.1,
                        group.len()
                    ),
                });
            }
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::resolve;
    use crate::uniforms::pack_pool_uniforms;
    use tensorlift_api::PadMode;

    fn sample_geometry() -> PoolGeometry {
        resolve(&[1, 4, 4, 1], [2, 2], [2, 2], PadMode::Valid, [1, 1]).expect("resolve")
    }

    #[test]
    fn binding_schema_follows_output_variant() {
        let values = Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Max, PoolOutput::Values));
        assert_eq!(
            values.bindings(),
            &[
                BindingDecl {
                    binding: 0,
                    kind: BindingKind::StorageRead
                },
                BindingDecl {
                    binding: 1,
                    kind: BindingKind::StorageReadWrite
                },
                BindingDecl {
                    binding: 2,
                    kind: BindingKind::Uniform
                },
            ]
        );

        let combined = Pool2dProgram::new(Pool2dDescriptor::new(
            PoolKind::Max,
            PoolOutput::ValuesAndIndices {
                include_batch: false,
            },
        ));
        assert_eq!(combined.bindings().len(), 4);
        assert_eq!(combined.bindings()[3].kind, BindingKind::Uniform);
        assert_eq!(combined.output_dtypes(), vec![ElemType::F32, ElemType::I32]);
    }

    #[test]
    fn finalize_appends_out_dims_group() {
        let program = Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Max, PoolOutput::Values));
        let geom = sample_geometry();
        let block = program
            .finalize_uniforms(pack_pool_uniforms(&geom), &geom)
            .expect("finalize");
        assert_eq!(block.groups().len(), POOL_UNIFORM_GROUPS + 1);
        assert_eq!(block.byte_len(), 56);
        let bytes = block.to_bytes();
        let scalars: &[i32] = bytemuck::cast_slice(&bytes);
        assert_eq!(&scalars[10..], &[1, 2, 2, 1]);
    }

    #[test]
    fn mismatched_uniform_block_is_rejected_before_dispatch() {
        let program = Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Max, PoolOutput::Values));
        let geom = sample_geometry();

        let short = UniformBlock::new();
        let err = program.finalize_uniforms(short, &geom).unwrap_err();
        assert!(matches!(err, KernelError::BindingMismatch { .. }));

        let mut wrong_type = UniformBlock::new();
        for _ in 0..POOL_UNIFORM_GROUPS - 1 {
            wrong_type.push_i32([0, 0]);
        }
        wrong_type.push(UniformGroup::F32(vec![0.0, 0.0]));
        let err = program.finalize_uniforms(wrong_type, &geom).unwrap_err();
        match err {
            KernelError::BindingMismatch { detail, .. } => {
                assert!(detail.contains("uniform group 4"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn layout_tags_distinguish_variants() {
        let a = Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Max, PoolOutput::Values));
        let b = Pool2dProgram::new(Pool2dDescriptor::new(
            PoolKind::Max,
            PoolOutput::Indices {
                include_batch: true,
            },
        ));
        let c = Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Avg, PoolOutput::Values));
        assert_ne!(a.layout_tag(), b.layout_tag());
        assert_ne!(a.layout_tag(), c.layout_tag());
        assert!(a.layout_tag().starts_with("tensorlift-pool2d-"));
    }
}
