//! `MaxPoolWithArgmax`: max pooling that also reports the flattened offset
//! of each window's winning input element.
//!
//! The registered kernel runs as two passes over the same geometry, one
//! producing values and one producing indices; [`run_fused`] does the same
//! work in a single combined pass for callers that want one scan.

use tensorlift_api::{ElemType, KernelError, MaxPoolWithArgmaxAttrs, TensorHandle};

use crate::engine::WgpuEngine;
use crate::geometry::{self, PoolGeometry};
use crate::program::{Pool2dDescriptor, Pool2dProgram};
use crate::types::{PoolKind, PoolOutput};
use crate::uniforms::pack_pool_uniforms;

pub const KERNEL_NAME: &str = "MaxPoolWithArgmax";

fn resolve_geometry(
    input: &TensorHandle,
    attrs: &MaxPoolWithArgmaxAttrs,
) -> Result<PoolGeometry, KernelError> {
    // dilation is fixed to one for this operation
    geometry::resolve(&input.shape, attrs.filter_size, attrs.strides, attrs.pad, [1, 1])
}

/// Two-pass form: values first, then indices, both against the same input
/// and geometry. Output order is fixed as `[values, indices]`.
pub fn run(
    engine: &WgpuEngine,
    input: &TensorHandle,
    attrs: &MaxPoolWithArgmaxAttrs,
) -> Result<[TensorHandle; 2], KernelError> {
    let geom = resolve_geometry(input, attrs)?;
    let uniforms = pack_pool_uniforms(&geom);

    let values_program =
        Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Max, PoolOutput::Values));
    let indices_program = Pool2dProgram::new(Pool2dDescriptor::new(
        PoolKind::Max,
        PoolOutput::Indices {
            include_batch: attrs.include_batch_in_index,
        },
    ));

    let mut values = engine.run_compute_program(
        &values_program,
        &geom,
        &[input],
        &[ElemType::F32],
        uniforms.clone(),
    )?;
    let mut indices = engine.run_compute_program(
        &indices_program,
        &geom,
        &[input],
        &[ElemType::I32],
        uniforms,
    )?;
    Ok([values.remove(0), indices.remove(0)])
}

/// Single-pass form: one scan writes both buffers.
pub fn run_fused(
    engine: &WgpuEngine,
    input: &TensorHandle,
    attrs: &MaxPoolWithArgmaxAttrs,
) -> Result<[TensorHandle; 2], KernelError> {
    let geom = resolve_geometry(input, attrs)?;
    let uniforms = pack_pool_uniforms(&geom);

    let program = Pool2dProgram::new(Pool2dDescriptor::new(
        PoolKind::Max,
        PoolOutput::ValuesAndIndices {
            include_batch: attrs.include_batch_in_index,
        },
    ));

    let mut outputs = engine.run_compute_program(
        &program,
        &geom,
        &[input],
        &[ElemType::F32, ElemType::I32],
        uniforms,
    )?;
    let indices = outputs.remove(1);
    let values = outputs.remove(0);
    Ok([values, indices])
}
