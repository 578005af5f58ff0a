//! Device memory allocation behind the buffer pool

use super::buffer_pool_data::StorageClass;
use crate::error::{GradientError, GradientResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of fresh blocks for a `BufferPool`
pub trait BlockAllocator: Send + Sync + 'static {
    type Block: Send + 'static;

    /// Allocate exactly `size` bytes of `class` memory
    fn allocate(&self, size: u64, class: StorageClass, label: &str)
        -> GradientResult<Self::Block>;
}

/// Allocates `wgpu::Buffer`s, detecting out-of-memory through an error scope
///
/// Error scopes are a per-device stack, so allocations are serialized to
/// keep one thread's scope from catching another thread's error.
pub struct WgpuBlockAllocator {
    device: Arc<wgpu::Device>,
    scope_lock: Mutex<()>,
}

impl WgpuBlockAllocator {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            scope_lock: Mutex::new(()),
        }
    }

    fn check_limits(&self, size: u64, class: StorageClass) -> GradientResult<()> {
        let limits = self.device.limits();

        if size > limits.max_buffer_size {
            return Err(GradientError::AllocationFailed {
                size,
                class: class.to_string(),
                reason: format!("exceeds max_buffer_size {}", limits.max_buffer_size),
            });
        }

        let binding_limit = limits.max_storage_buffer_binding_size as u64;
        if class.is_storage() && size > binding_limit {
            return Err(GradientError::AllocationFailed {
                size,
                class: class.to_string(),
                reason: format!(
                    "exceeds max_storage_buffer_binding_size {}",
                    binding_limit
                ),
            });
        }

        Ok(())
    }
}

impl BlockAllocator for WgpuBlockAllocator {
    type Block = wgpu::Buffer;

    fn allocate(
        &self,
        size: u64,
        class: StorageClass,
        label: &str,
    ) -> GradientResult<wgpu::Buffer> {
        self.check_limits(size, class)?;

        let scope = self.scope_lock.lock();
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: class.usages(),
            mapped_at_creation: false,
        });
        let scope_error = pollster::block_on(self.device.pop_error_scope());
        drop(scope);

        if let Some(error) = scope_error {
            log::warn!(
                "[WgpuBlockAllocator::allocate] {} bytes of {} memory failed: {}",
                size,
                class,
                error
            );
            return Err(GradientError::AllocationFailed {
                size,
                class: class.to_string(),
                reason: error.to_string(),
            });
        }

        log::debug!(
            "[WgpuBlockAllocator::allocate] Allocated '{}' ({} bytes, {})",
            label,
            size,
            class
        );
        Ok(buffer)
    }
}
