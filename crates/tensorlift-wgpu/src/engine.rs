//! The wgpu compute engine: device ownership, the buffer handle table, and
//! the pooling dispatch path.
//!
//! Submission is non-blocking; completion is observed through
//! `on_submitted_work_done` and a monotonic watermark. Downloads are the only
//! blocking operation, and they drain the queue first, so a downloaded
//! tensor always reflects every pass submitted against it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use futures::channel::oneshot;
use wgpu::util::DeviceExt;

use tensorlift_api::{
    ElemType, HostData, HostTensorOwned, HostTensorView, KernelError, TensorHandle,
};

use crate::bindings::build_program_bgl;
use crate::cache::key::compute_pipeline_hash_bytes;
use crate::cache::registry::PipelineRegistry;
use crate::config;
use crate::geometry::PoolGeometry;
use crate::metrics::EngineMetrics;
use crate::program::Pool2dProgram;
use crate::residency::{BufferResidency, BufferUsageClass, CheckoutGuard, SubmissionTracker};
use crate::uniforms::UniformBlock;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

struct BufferEntry {
    buffer: Arc<wgpu::Buffer>,
    len: usize,
    dtype: ElemType,
    usage: BufferUsageClass,
    last_submission: u64,
}

pub struct WgpuEngine {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    buffers: Mutex<HashMap<u64, BufferEntry>>,
    next_buffer_id: AtomicU64,
    pipelines: PipelineRegistry,
    layouts: Mutex<HashMap<String, Arc<wgpu::BindGroupLayout>>>,
    residency: BufferResidency,
    submissions: Arc<SubmissionTracker>,
    metrics: EngineMetrics,
    device_id: u32,
}

impl WgpuEngine {
    pub fn new(opts: EngineOptions) -> Result<Self> {
        pollster::block_on(Self::new_async(opts))
    }

    async fn new_async(opts: EngineOptions) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: opts.power_preference,
                force_fallback_adapter: opts.force_fallback_adapter,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("wgpu: no compatible adapter found"))?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tensorlift-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                },
                None,
            )
            .await?;

        log::info!(
            "tensorlift: wgpu adapter '{}' ({:?}) ready, workgroup_size={}",
            adapter_info.name,
            adapter_info.backend,
            config::effective_workgroup_size()
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            buffers: Mutex::new(HashMap::new()),
            next_buffer_id: AtomicU64::new(1),
            pipelines: PipelineRegistry::new(),
            layouts: Mutex::new(HashMap::new()),
            residency: BufferResidency::new(config::RESIDENCY_MAX_PER_KEY),
            submissions: Arc::new(SubmissionTracker::new()),
            metrics: EngineMetrics::new(),
            device_id: 0,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn residency(&self) -> &BufferResidency {
        &self.residency
    }

    /// Copy host data into a fresh device buffer and register a handle.
    pub fn upload(&self, view: &HostTensorView<'_>) -> Result<TensorHandle, KernelError> {
        let (data, shape) = (view.data, view.shape);
        let expected: usize = shape.iter().product();
        tensorlift_api::assert_that(data.len() == expected, || {
            format!(
                "upload: shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )
        })?;
        let buffer = if data.is_empty() {
            self.residency.acquire(
                &self.device,
                BufferUsageClass::Generic,
                0,
                ElemType::F32.size_bytes(),
                "tensorlift-upload",
            )
        } else {
            Arc::new(
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("tensorlift-upload"),
                        contents: bytemuck::cast_slice(data),
                        usage: wgpu::BufferUsages::STORAGE
                            | wgpu::BufferUsages::COPY_SRC
                            | wgpu::BufferUsages::COPY_DST,
                    }),
            )
        };
        Ok(self.register_buffer(buffer, shape.to_vec(), ElemType::F32, BufferUsageClass::Generic))
    }

    /// Map a device buffer back to the host. Blocks until the copy and every
    /// submission that wrote the buffer have completed.
    pub fn download(&self, handle: &TensorHandle) -> Result<HostTensorOwned, KernelError> {
        let (buffer, len, dtype) = {
            let guard = self
                .buffers
                .lock()
                .map_err(|_| KernelError::DeviceSubmission("buffer table poisoned".into()))?;
            let entry = guard.get(&handle.buffer_id).ok_or_else(|| {
                KernelError::InvalidArgument(format!("unknown buffer id {}", handle.buffer_id))
            })?;
            (entry.buffer.clone(), entry.len, entry.dtype)
        };

        if len == 0 {
            let data = match dtype {
                ElemType::F32 => HostData::F32(Vec::new()),
                ElemType::I32 => HostData::I32(Vec::new()),
            };
            return Ok(HostTensorOwned {
                data,
                shape: handle.shape.clone(),
            });
        }

        let byte_len = (len * dtype.size_bytes()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tensorlift-download-staging"),
            size: byte_len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tensorlift-download"),
            });
        encoder.copy_buffer_to_buffer(&buffer, 0, &staging, 0, byte_len);
        let submission = self.submit(encoder);

        let slice = staging.slice(..);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        self.submissions.mark_complete(submission);
        self.residency.reclaim(&self.submissions);

        match pollster::block_on(rx) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(KernelError::DeviceSubmission(format!(
                    "download map failed: {e:?}"
                )))
            }
            Err(_) => {
                return Err(KernelError::DeviceSubmission(
                    "download map_async callback dropped".into(),
                ))
            }
        }

        let mapped = slice.get_mapped_range();
        let data = match dtype {
            ElemType::F32 => HostData::F32(bytemuck::cast_slice(&mapped).to_vec()),
            ElemType::I32 => HostData::I32(bytemuck::cast_slice(&mapped).to_vec()),
        };
        drop(mapped);
        staging.unmap();

        Ok(HostTensorOwned {
            data,
            shape: handle.shape.clone(),
        })
    }

    /// Drop a handle and hand its buffer to the residency pool. Buffers still
    /// bound to an in-flight submission are parked, not reused.
    pub fn free(&self, handle: &TensorHandle) -> Result<(), KernelError> {
        let entry = {
            let mut guard = self
                .buffers
                .lock()
                .map_err(|_| KernelError::DeviceSubmission("buffer table poisoned".into()))?;
            guard.remove(&handle.buffer_id).ok_or_else(|| {
                KernelError::InvalidArgument(format!("unknown buffer id {}", handle.buffer_id))
            })?
        };
        self.residency.release_after(
            entry.usage,
            entry.len,
            entry.buffer,
            entry.last_submission,
            &self.submissions,
        );
        self.residency.reclaim(&self.submissions);
        Ok(())
    }

    /// Run one pooling pass and register its outputs, values before indices.
    /// Binding and uniform validation fail before anything touches the
    /// queue; an empty output skips the dispatch entirely.
    pub fn run_compute_program(
        &self,
        program: &Pool2dProgram,
        geometry: &PoolGeometry,
        inputs: &[&TensorHandle],
        output_dtypes: &[ElemType],
        uniforms: UniformBlock,
    ) -> Result<Vec<TensorHandle>, KernelError> {
        let [input] = inputs else {
            return Err(KernelError::BindingMismatch {
                program: program.layout_tag().to_string(),
                detail: format!("program binds 1 input, got {}", inputs.len()),
            });
        };
        let out_dtypes = program.output_dtypes();
        if output_dtypes != out_dtypes.as_slice() {
            return Err(KernelError::BindingMismatch {
                program: program.layout_tag().to_string(),
                detail: format!(
                    "program declares outputs {out_dtypes:?}, caller supplied {output_dtypes:?}"
                ),
            });
        }

        let input_entry = {
            let guard = self
                .buffers
                .lock()
                .map_err(|_| KernelError::DeviceSubmission("buffer table poisoned".into()))?;
            let entry = guard.get(&input.buffer_id).ok_or_else(|| {
                KernelError::InvalidArgument(format!("unknown buffer id {}", input.buffer_id))
            })?;
            if entry.dtype != ElemType::F32 {
                return Err(KernelError::BindingMismatch {
                    program: program.layout_tag().to_string(),
                    detail: format!("input must be F32, got {:?}", entry.dtype),
                });
            }
            if entry.len != geometry.in_elements() {
                return Err(KernelError::BindingMismatch {
                    program: program.layout_tag().to_string(),
                    detail: format!(
                        "input has {} elements, geometry expects {}",
                        entry.len,
                        geometry.in_elements()
                    ),
                });
            }
            entry.buffer.clone()
        };

        let uniforms = program.finalize_uniforms(uniforms, geometry)?;
        let out_shape = geometry.out_shape().to_vec();
        let out_len = geometry.out_elements();

        if out_len == 0 {
            let handles = out_dtypes
                .iter()
                .map(|dtype| {
                    let usage = usage_for(*dtype);
                    let buffer = self.residency.acquire(
                        &self.device,
                        usage,
                        0,
                        dtype.size_bytes(),
                        "tensorlift-pool2d-empty",
                    );
                    self.register_buffer(buffer, out_shape.clone(), *dtype, usage)
                })
                .collect();
            return Ok(handles);
        }

        let wg = program.descriptor().workgroup_size;
        let workgroups = (out_len as u64).div_ceil(wg as u64);
        if workgroups > config::MAX_DISPATCH_WORKGROUPS as u64 {
            return Err(KernelError::InvalidArgument(format!(
                "pool2d: {out_len} output elements need {workgroups} workgroups of {wg}, limit is {}",
                config::MAX_DISPATCH_WORKGROUPS
            )));
        }

        let mut out_guards: Vec<CheckoutGuard<'_>> = out_dtypes
            .iter()
            .map(|dtype| {
                let usage = usage_for(*dtype);
                let buffer = self.residency.acquire(
                    &self.device,
                    usage,
                    out_len,
                    dtype.size_bytes(),
                    "tensorlift-pool2d-out",
                );
                CheckoutGuard::new(&self.residency, usage, out_len, buffer)
            })
            .collect();

        let uniform_bytes = uniforms.to_bytes();
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tensorlift-pool2d-params"),
                contents: &uniform_bytes,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let layout = self.layout_for(program);
        let pipeline = self.pipeline_for(program, &layout);

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: input_entry.as_ref().as_entire_binding(),
        }];
        for (i, guard) in out_guards.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (i + 1) as u32,
                resource: guard.buffer().as_ref().as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: (out_guards.len() + 1) as u32,
            resource: params_buffer.as_entire_binding(),
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tensorlift-pool2d-bind"),
            layout: &layout,
            entries: &entries,
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tensorlift-pool2d"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(program.layout_tag()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups as u32, 1, 1);
        }
        let submission = self.submit(encoder);
        self.metrics.inc_dispatch();
        // the pass reads the input, so a free() must not pool it before the
        // submission completes either
        self.set_last_submission(input.buffer_id, submission);

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(KernelError::DeviceSubmission(format!(
                "{}: {err}",
                program.layout_tag()
            )));
        }

        self.residency.reclaim(&self.submissions);

        let handles = out_guards
            .drain(..)
            .zip(out_dtypes)
            .map(|(guard, dtype)| {
                let usage = usage_for(dtype);
                let buffer = guard.commit();
                let handle = self.register_buffer(buffer, out_shape.clone(), dtype, usage);
                self.set_last_submission(handle.buffer_id, submission);
                handle
            })
            .collect();
        Ok(handles)
    }

    /// Submit one encoder and return its tracking id. Completion is recorded
    /// from the queue callback; nothing here blocks.
    fn submit(&self, encoder: wgpu::CommandEncoder) -> u64 {
        let submission = self.submissions.begin();
        self.queue.submit(std::iter::once(encoder.finish()));
        let tracker = Arc::clone(&self.submissions);
        self.queue.on_submitted_work_done(move || {
            log::trace!("tensorlift: submission {submission} complete");
            tracker.mark_complete(submission);
        });
        submission
    }

    fn layout_for(&self, program: &Pool2dProgram) -> Arc<wgpu::BindGroupLayout> {
        if let Ok(guard) = self.layouts.lock() {
            if let Some(layout) = guard.get(program.layout_tag()) {
                return layout.clone();
            }
        }
        let layout = Arc::new(build_program_bgl(
            &self.device,
            program.bindings(),
            program.layout_tag(),
        ));
        if let Ok(mut guard) = self.layouts.lock() {
            guard.insert(program.layout_tag().to_string(), layout.clone());
        }
        layout
    }

    fn pipeline_for(
        &self,
        program: &Pool2dProgram,
        layout: &wgpu::BindGroupLayout,
    ) -> Arc<wgpu::ComputePipeline> {
        let key = compute_pipeline_hash_bytes(
            program.shader_source().as_bytes(),
            program.layout_tag(),
            Some(program.descriptor().workgroup_size),
        );
        if let Some(pipeline) = self.pipelines.get(&key) {
            self.metrics.inc_hit();
            return pipeline;
        }
        self.metrics.inc_miss();

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.layout_tag()),
                source: wgpu::ShaderSource::Wgsl(program.shader_source().into()),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(program.layout_tag()),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
        let pipeline = Arc::new(self.device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(program.layout_tag()),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: "main",
            },
        ));
        self.pipelines.insert(key, pipeline.clone());
        pipeline
    }

    fn register_buffer(
        &self,
        buffer: Arc<wgpu::Buffer>,
        shape: Vec<usize>,
        dtype: ElemType,
        usage: BufferUsageClass,
    ) -> TensorHandle {
        let id = self.next_buffer_id.fetch_add(1, Ordering::SeqCst);
        let len: usize = shape.iter().product();
        if let Ok(mut guard) = self.buffers.lock() {
            guard.insert(
                id,
                BufferEntry {
                    buffer,
                    len,
                    dtype,
                    usage,
                    last_submission: 0,
                },
            );
        }
        TensorHandle {
            shape,
            dtype,
            device_id: self.device_id,
            buffer_id: id,
        }
    }

    fn set_last_submission(&self, buffer_id: u64, submission: u64) {
        if let Ok(mut guard) = self.buffers.lock() {
            if let Some(entry) = guard.get_mut(&buffer_id) {
                entry.last_submission = submission;
            }
        }
    }
}

fn usage_for(dtype: ElemType) -> BufferUsageClass {
    match dtype {
        ElemType::F32 => BufferUsageClass::PoolValues,
        ElemType::I32 => BufferUsageClass::PoolIndices,
    }
}
