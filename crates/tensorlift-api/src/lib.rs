//! Backend-neutral surface shared between tensor-producing frontends and the
//! compute backends that execute kernels for them.
//!
//! This crate owns the plain-data types that cross the backend boundary:
//! tensor handles, element types, host transfer views, operation attribute
//! records, the kernel error taxonomy, and the named kernel registration
//! table that routes an operation name to a backend implementation.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Element type of a GPU-resident tensor buffer.
///
/// Pooling inputs and value outputs are `F32`; argmax index outputs are
/// always `I32` regardless of the input dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemType {
    F32,
    I32,
}

impl ElemType {
    pub fn size_bytes(&self) -> usize {
        match self {
            ElemType::F32 | ElemType::I32 => 4,
        }
    }
}

/// Opaque reference to a GPU-resident buffer plus its logical shape and
/// element type. The owning backend keeps the buffer table; handles are plain
/// data and can be cloned and serialized freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorHandle {
    pub shape: Vec<usize>,
    pub dtype: ElemType,
    pub device_id: u32,
    pub buffer_id: u64,
}

impl TensorHandle {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Borrowed host-side tensor used for uploads.
#[derive(Debug, Clone, Copy)]
pub struct HostTensorView<'a> {
    pub data: &'a [f32],
    pub shape: &'a [usize],
}

/// Host-side payload of a downloaded tensor, decoded per element type.
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl HostData {
    pub fn len(&self) -> usize {
        match self {
            HostData::F32(v) => v.len(),
            HostData::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned host-side tensor returned by downloads.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensorOwned {
    pub data: HostData,
    pub shape: Vec<usize>,
}

impl HostTensorOwned {
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            HostData::F32(v) => Some(v),
            HostData::I32(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            HostData::I32(v) => Some(v),
            HostData::F32(_) => None,
        }
    }
}

/// Error taxonomy for the kernel dispatch path.
///
/// The first three kinds are raised synchronously before any GPU work is
/// enqueued. `DeviceSubmission` surfaces an underlying device failure to the
/// caller without retrying: GPU work is not safe to silently resubmit.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("input must be rank {expected} but got rank {actual}")]
    InvalidRank { expected: usize, actual: usize },

    #[error(
        "either strides or dilations must be 1; got strides [{stride_h}, {stride_w}] \
         and dilations [{dilation_h}, {dilation_w}]"
    )]
    InvalidStrideDilation {
        stride_h: usize,
        stride_w: usize,
        dilation_h: usize,
        dilation_w: usize,
    },

    /// A program's declared bindings do not match the supplied buffers. This
    /// is an internal programming defect, not a user-recoverable condition.
    #[error("binding mismatch in {program}: {detail}")]
    BindingMismatch { program: String, detail: String },

    #[error("device submission failed: {0}")]
    DeviceSubmission(String),

    #[error("{0}")]
    InvalidArgument(String),
}

/// Fails with a descriptive [`KernelError::InvalidArgument`] when the
/// predicate does not hold. The message closure is only invoked on failure.
pub fn assert_that(condition: bool, message: impl FnOnce() -> String) -> Result<(), KernelError> {
    if condition {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument(message()))
    }
}

/// Implicit-padding policy applied around the input before pooling windows
/// are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PadMode {
    /// No padding; windows must fit entirely inside the input.
    Valid,
    /// Pad so the output spatial size is `ceil(input / stride)`.
    Same,
    /// Caller-specified padding on each edge.
    Explicit {
        top: usize,
        bottom: usize,
        left: usize,
        right: usize,
    },
}

/// Attributes of the `MaxPoolWithArgmax` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPoolWithArgmaxAttrs {
    pub filter_size: [usize; 2],
    pub strides: [usize; 2],
    pub pad: PadMode,
    pub include_batch_in_index: bool,
}

/// Attributes of the plain `AvgPool` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvgPoolAttrs {
    pub filter_size: [usize; 2],
    pub strides: [usize; 2],
    pub pad: PadMode,
}

/// Structured attribute record attached to a kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpAttrs {
    MaxPoolWithArgmax(MaxPoolWithArgmaxAttrs),
    AvgPool(AvgPoolAttrs),
}

/// A registered kernel implementation. Inputs arrive in operation order;
/// outputs are returned in the order fixed by the operation's contract.
pub type KernelFunc =
    Arc<dyn Fn(&[TensorHandle], &OpAttrs) -> Result<Vec<TensorHandle>, KernelError> + Send + Sync>;

/// A named entry in the kernel dispatch table.
#[derive(Clone)]
pub struct KernelConfig {
    pub kernel_name: &'static str,
    pub backend_name: &'static str,
    pub kernel_func: KernelFunc,
}

impl std::fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelConfig")
            .field("kernel_name", &self.kernel_name)
            .field("backend_name", &self.backend_name)
            .finish()
    }
}

type RegistryKey = (String, String);

static KERNELS: Lazy<RwLock<HashMap<RegistryKey, KernelConfig>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Install a kernel entry; a later registration for the same
/// (operation, backend) pair replaces the earlier one.
pub fn register_kernel(config: KernelConfig) {
    if let Ok(mut guard) = KERNELS.write() {
        guard.insert(
            (config.kernel_name.to_string(), config.backend_name.to_string()),
            config,
        );
    }
}

/// Look up the implementation registered for an operation name and backend.
pub fn kernel_for(kernel_name: &str, backend_name: &str) -> Option<KernelConfig> {
    KERNELS.read().ok().and_then(|guard| {
        guard
            .get(&(kernel_name.to_string(), backend_name.to_string()))
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_handle() -> TensorHandle {
        TensorHandle {
            shape: vec![1, 2, 2, 1],
            dtype: ElemType::F32,
            device_id: 0,
            buffer_id: 7,
        }
    }

    #[test]
    fn assert_that_is_lazy_and_descriptive() {
        assert!(assert_that(true, || unreachable!()).is_ok());
        let err = assert_that(false, || "pooling window is empty".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "pooling window is empty");
    }

    #[test]
    fn error_messages_name_the_offending_values() {
        let rank = KernelError::InvalidRank {
            expected: 4,
            actual: 3,
        };
        assert_eq!(rank.to_string(), "input must be rank 4 but got rank 3");

        let sd = KernelError::InvalidStrideDilation {
            stride_h: 2,
            stride_w: 2,
            dilation_h: 2,
            dilation_w: 1,
        };
        assert!(sd.to_string().contains("strides [2, 2]"));
        assert!(sd.to_string().contains("dilations [2, 1]"));
    }

    #[test]
    fn registry_routes_by_name_and_backend() {
        let func: KernelFunc = Arc::new(|inputs, _attrs| Ok(inputs.to_vec()));
        register_kernel(KernelConfig {
            kernel_name: "MaxPoolWithArgmax",
            backend_name: "test-backend",
            kernel_func: func,
        });

        assert!(kernel_for("MaxPoolWithArgmax", "other-backend").is_none());
        let config = kernel_for("MaxPoolWithArgmax", "test-backend").expect("registered");
        let attrs = OpAttrs::MaxPoolWithArgmax(MaxPoolWithArgmaxAttrs {
            filter_size: [2, 2],
            strides: [2, 2],
            pad: PadMode::Valid,
            include_batch_in_index: false,
        });
        let outputs = (config.kernel_func)(&[dummy_handle()], &attrs).expect("invoke");
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].buffer_id, 7);
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let first: KernelFunc = Arc::new(|_, _| Ok(Vec::new()));
        let second: KernelFunc = Arc::new(|inputs, _| Ok(inputs.to_vec()));
        register_kernel(KernelConfig {
            kernel_name: "AvgPool",
            backend_name: "test-backend",
            kernel_func: first,
        });
        register_kernel(KernelConfig {
            kernel_name: "AvgPool",
            backend_name: "test-backend",
            kernel_func: second,
        });
        let config = kernel_for("AvgPool", "test-backend").expect("registered");
        let attrs = OpAttrs::AvgPool(AvgPoolAttrs {
            filter_size: [2, 2],
            strides: [1, 1],
            pad: PadMode::Same,
        });
        let outputs = (config.kernel_func)(&[dummy_handle()], &attrs).expect("invoke");
        assert_eq!(outputs.len(), 1);
    }
}
