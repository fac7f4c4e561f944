//! Kernel adapters: thin shims between the registry's untyped call surface
//! and the typed engine operations.

pub mod avg_pool;
pub mod max_pool_with_argmax;

use std::sync::Arc;

use tensorlift_api::{register_kernel, KernelConfig, KernelError, OpAttrs, TensorHandle};

use crate::engine::WgpuEngine;

pub const BACKEND_NAME: &str = "wgpu";

/// Register every kernel this backend provides against the given engine.
pub fn register_kernels(engine: &'static WgpuEngine) {
    register_kernel(KernelConfig {
        kernel_name: max_pool_with_argmax::KERNEL_NAME,
        backend_name: BACKEND_NAME,
        kernel_func: Arc::new(move |inputs: &[TensorHandle], attrs: &OpAttrs| {
            let input = single_input(inputs, max_pool_with_argmax::KERNEL_NAME)?;
            let OpAttrs::MaxPoolWithArgmax(attrs) = attrs else {
                return Err(KernelError::InvalidArgument(format!(
                    "{}: wrong attribute record {attrs:?}",
                    max_pool_with_argmax::KERNEL_NAME
                )));
            };
            let [values, indices] = max_pool_with_argmax::run(engine, input, attrs)?;
            Ok(vec![values, indices])
        }),
    });
    register_kernel(KernelConfig {
        kernel_name: avg_pool::KERNEL_NAME,
        backend_name: BACKEND_NAME,
        kernel_func: Arc::new(move |inputs: &[TensorHandle], attrs: &OpAttrs| {
            let input = single_input(inputs, avg_pool::KERNEL_NAME)?;
            let OpAttrs::AvgPool(attrs) = attrs else {
                return Err(KernelError::InvalidArgument(format!(
                    "{}: wrong attribute record {attrs:?}",
                    avg_pool::KERNEL_NAME
                )));
            };
            Ok(vec![avg_pool::run(engine, input, attrs)?])
        }),
    });
}

fn single_input<'a>(
    inputs: &'a [TensorHandle],
    kernel: &str,
) -> Result<&'a TensorHandle, KernelError> {
    match inputs {
        [input] => Ok(input),
        other => Err(KernelError::InvalidArgument(format!(
            "{kernel}: expected 1 input, got {}",
            other.len()
        ))),
    }
}
