//! wgpu compute backend for the tensorlift kernel registry.
//!
//! The engine owns the device, queue, buffer table and pipeline caches;
//! kernel adapters translate registry calls into typed engine dispatches.

pub mod bindings;
pub mod cache;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod host;
pub mod kernels;
pub mod metrics;
pub mod program;
pub mod residency;
pub mod shaders;
pub mod types;
pub mod uniforms;

#[cfg(test)]
mod tests;

use anyhow::Result;
use once_cell::sync::OnceCell;

pub use engine::{EngineOptions, WgpuEngine};

/// Initialize the process-wide engine once and register its kernels.
/// Subsequent calls return the same instance regardless of options.
pub fn register_wgpu_engine(opts: EngineOptions) -> Result<&'static WgpuEngine> {
    static INSTANCE: OnceCell<&'static WgpuEngine> = OnceCell::new();
    INSTANCE
        .get_or_try_init(move || {
            let engine = WgpuEngine::new(opts)?;
            let leaked: &'static WgpuEngine = Box::leak(Box::new(engine));
            kernels::register_kernels(leaked);
            Ok(leaked)
        })
        .map(|e| *e)
}

/// Best-effort initialization: `None` when no adapter is available, so
/// callers can fall back to host execution instead of failing.
pub fn ensure_wgpu_engine() -> Result<Option<&'static WgpuEngine>> {
    match register_wgpu_engine(EngineOptions::default()) {
        Ok(engine) => Ok(Some(engine)),
        Err(e) => {
            log::warn!("tensorlift: wgpu engine initialization failed: {e}");
            Ok(None)
        }
    }
}
