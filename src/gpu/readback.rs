//! Host-side inspection of device buffers
//!
//! Diagnostics and tests only; nothing on the per-frame path reads back.
//! Raw bytes are only ever turned into records through bounds-checked
//! `bytemuck` casts.

use super::error_recovery::GpuResultExt;
use crate::error::{GradientError, GradientResult};
use crate::memory::{GpuBufferPool, StorageClass};
use bytemuck::Pod;
use std::mem::size_of;

/// Borrow the first `count` records of `bytes` as `&[T]`
///
/// Fails when the bytes are too short or misaligned for `T`.
pub fn typed_view<T: Pod>(bytes: &[u8], count: usize) -> GradientResult<&[T]> {
    let needed = byte_len::<T>(count)?;
    let prefix = bytes.get(..needed).ok_or(GradientError::BufferView {
        requested: needed,
        available: bytes.len(),
    })?;

    bytemuck::try_cast_slice(prefix).map_err(|e| {
        log::debug!("[typed_view] Cast rejected: {}", e);
        GradientError::BufferView {
            requested: needed,
            available: bytes.len(),
        }
    })
}

/// Copy the first `count` records out of `bytes`, tolerating any alignment
pub fn read_elements<T: Pod>(bytes: &[u8], count: usize) -> GradientResult<Vec<T>> {
    let needed = byte_len::<T>(count)?;
    let prefix = bytes.get(..needed).ok_or(GradientError::BufferView {
        requested: needed,
        available: bytes.len(),
    })?;

    Ok(prefix
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

fn byte_len<T>(count: usize) -> GradientResult<usize> {
    count
        .checked_mul(size_of::<T>())
        .ok_or(GradientError::BufferView {
            requested: usize::MAX,
            available: 0,
        })
}

/// Copy `count` records of `T` from `source` into host memory
///
/// Blocks until the copy has finished. The staging block comes from the
/// pool's readback class and goes straight back afterwards.
pub fn read_buffer<T: Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pool: &GpuBufferPool,
    source: &wgpu::Buffer,
    count: usize,
    label: &str,
) -> GradientResult<Vec<T>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let bytes = byte_len::<T>(count)? as u64;
    if bytes > source.size() {
        return Err(GradientError::BufferView {
            requested: bytes as usize,
            available: source.size() as usize,
        });
    }

    let staging = pool.acquire_labeled(bytes, StorageClass::Readback, "gradient-mesh::readback")?;

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, staging.block(), 0, bytes);
    queue.submit(std::iter::once(encoder.finish()));

    let (sender, receiver) = std::sync::mpsc::channel();
    let slice = staging.block().slice(0..bytes);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    receiver.recv().gpu_context(label)?.gpu_context(label)?;

    let records = {
        let mapped = slice.get_mapped_range();
        read_elements::<T>(&mapped, count)
    };
    staging.block().unmap();

    // The copy and the mapping have both completed
    pool.release(staging);
    records
}
