//! Memory Module - pooled device memory
//!
//! Per-frame tessellation needs four sizeable buffers. Allocating them fresh
//! every frame stalls the driver, so blocks are recycled through a pool that
//! only takes them back after the GPU has finished with them.

pub mod block_allocator;
pub mod buffer_pool_data;
pub mod buffer_pool_operations;

pub use block_allocator::{BlockAllocator, WgpuBlockAllocator};
pub use buffer_pool_data::{
    BlockId, BlockRequest, BufferPool, PoolStats, PooledBlock, StorageClass,
};
pub use buffer_pool_operations::aligned_block_size;

/// Pool of `wgpu::Buffer`s
pub type GpuBufferPool = BufferPool<WgpuBlockAllocator>;

/// Checked-out `wgpu::Buffer`
pub type PooledBuffer = PooledBlock<wgpu::Buffer>;
