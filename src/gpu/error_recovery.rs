//! GPU error monitoring
//!
//! wgpu reports most failures asynchronously. The monitor installs an
//! uncaptured-error handler that logs them and flags out-of-memory, and
//! [`with_validation_scope`] turns validation failures during kernel creation
//! into ordinary `Result`s.

use crate::error::{GradientError, GradientResult};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Device-wide error counters fed by the uncaptured-error handler
#[derive(Clone, Default)]
pub struct GpuErrorMonitor {
    out_of_memory: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl GpuErrorMonitor {
    /// Install the handler on `device` and return the monitor watching it
    pub fn install(device: &wgpu::Device) -> Self {
        let monitor = Self::default();
        let out_of_memory = Arc::clone(&monitor.out_of_memory);
        let error_count = Arc::clone(&monitor.error_count);

        device.on_uncaptured_error(Box::new(move |error| {
            error_count.fetch_add(1, Ordering::Relaxed);
            if let wgpu::Error::OutOfMemory { .. } = error {
                log::error!("[GpuErrorMonitor] GPU out of memory!");
                out_of_memory.store(true, Ordering::Relaxed);
            } else {
                log::error!("[GpuErrorMonitor] Uncaptured GPU error: {}", error);
            }
        }));

        monitor
    }

    /// Monitor with no handler behind it; its flags stay clear
    pub fn detached() -> Self {
        Self::default()
    }

    /// Set once an out-of-memory error escaped every error scope
    pub fn saw_out_of_memory(&self) -> bool {
        self.out_of_memory.load(Ordering::Relaxed)
    }

    /// Clear the out-of-memory flag, returning its previous value
    pub fn take_out_of_memory(&self) -> bool {
        self.out_of_memory.swap(false, Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// Run `create` under a validation error scope
///
/// Any validation error raised while creating the kernel's shader module or
/// pipeline becomes a `ShaderCompilation` error naming `kernel`.
pub fn with_validation_scope<R, F>(device: &wgpu::Device, kernel: &str, create: F) -> GradientResult<R>
where
    F: FnOnce() -> R,
{
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let created = create();

    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(created),
        Some(error) => {
            log::error!(
                "[with_validation_scope] Kernel '{}' failed validation: {}",
                kernel,
                error
            );
            Err(GradientError::ShaderCompilation {
                kernel: kernel.to_string(),
                error: error.to_string(),
            })
        }
    }
}

/// Extension trait for Result types to add GPU error context
pub trait GpuResultExt<T> {
    fn gpu_context(self, label: &str) -> GradientResult<T>;
}

impl<T, E: std::fmt::Display> GpuResultExt<T> for Result<T, E> {
    fn gpu_context(self, label: &str) -> GradientResult<T> {
        self.map_err(|e| GradientError::ReadbackFailed {
            label: label.to_string(),
            error: e.to_string(),
        })
    }
}
