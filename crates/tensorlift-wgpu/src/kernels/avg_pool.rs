//! `AvgPool`: mean pooling over in-bounds window cells.

use tensorlift_api::{AvgPoolAttrs, ElemType, KernelError, TensorHandle};

use crate::engine::WgpuEngine;
use crate::geometry;
use crate::program::{Pool2dDescriptor, Pool2dProgram};
use crate::types::{PoolKind, PoolOutput};
use crate::uniforms::pack_pool_uniforms;

pub const KERNEL_NAME: &str = "AvgPool";

pub fn run(
    engine: &WgpuEngine,
    input: &TensorHandle,
    attrs: &AvgPoolAttrs,
) -> Result<TensorHandle, KernelError> {
    let geom = geometry::resolve(&input.shape, attrs.filter_size, attrs.strides, attrs.pad, [1, 1])?;
    let uniforms = pack_pool_uniforms(&geom);
    let program = Pool2dProgram::new(Pool2dDescriptor::new(PoolKind::Avg, PoolOutput::Values));
    let mut outputs =
        engine.run_compute_program(&program, &geom, &[input], &[ElemType::F32], uniforms)?;
    Ok(outputs.remove(0))
}
