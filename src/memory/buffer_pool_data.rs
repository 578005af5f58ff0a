//! Buffer Pool Data - Pure DOP
//!
//! Types describing pooled device memory. The pool handle itself lives here;
//! every transformation on it is in buffer_pool_operations.rs

use super::block_allocator::BlockAllocator;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Device-memory placement policy for a pooled block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageClass {
    /// Written and read only by GPU work
    DevicePrivate,
    /// Bindable as storage, written from the host through queue uploads
    HostShared,
    /// Mappable by the host for reading, copy destination only
    Readback,
}

impl StorageClass {
    pub fn usages(self) -> wgpu::BufferUsages {
        match self {
            StorageClass::DevicePrivate | StorageClass::HostShared => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST
            }
            StorageClass::Readback => wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        }
    }

    /// Whether blocks of this class can be bound to a compute kernel
    pub fn is_storage(self) -> bool {
        !matches!(self, StorageClass::Readback)
    }

    pub fn name(self) -> &'static str {
        match self {
            StorageClass::DevicePrivate => "device-private",
            StorageClass::HostShared => "host-shared",
            StorageClass::Readback => "readback",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of one underlying block, stable across reuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

/// Exclusive ownership of a block for one in-flight frame
///
/// Hand it back with `BufferPool::release` (or `release_on_completion`) once
/// the GPU work reading it has finished. Dropping it instead retires the
/// block: the memory is freed and never recycled.
pub struct PooledBlock<B> {
    pub(crate) id: BlockId,
    pub(crate) class: StorageClass,
    pub(crate) capacity: u64,
    pub(crate) requested: u64,
    pub(crate) block: B,
    pub(crate) guard: CheckoutGuard,
}

impl<B> PooledBlock<B> {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn class(&self) -> StorageClass {
        self.class
    }

    /// Bytes actually backing the block (may exceed the request)
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes asked for by the current owner
    pub fn requested_size(&self) -> u64 {
        self.requested
    }

    pub fn block(&self) -> &B {
        &self.block
    }
}

impl<B> fmt::Debug for PooledBlock<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBlock")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("capacity", &self.capacity)
            .field("requested", &self.requested)
            .finish()
    }
}

/// One entry of an all-or-nothing checkout, see `BufferPool::acquire_set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest<'a> {
    pub size: u64,
    pub class: StorageClass,
    /// Names the block if a fresh one must be allocated
    pub label: &'a str,
}

impl<'a> BlockRequest<'a> {
    pub fn new(size: u64, class: StorageClass, label: &'a str) -> Self {
        Self { size, class, label }
    }
}

/// Tracks one checkout; counts a retirement when dropped unreleased
pub(crate) struct CheckoutGuard {
    pub(crate) counters: Arc<PoolCounters>,
    pub(crate) id: BlockId,
    pub(crate) released: bool,
}

impl Drop for CheckoutGuard {
    fn drop(&mut self) {
        self.counters.checked_out.fetch_sub(1, Ordering::AcqRel);
        if !self.released {
            self.counters.retired.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "[BufferPool::retire] Block {:?} dropped while checked out, freeing instead of recycling",
                self.id
            );
        }
    }
}

/// Block waiting in the pool for its next owner
pub(crate) struct IdleBlock<B> {
    pub(crate) id: BlockId,
    pub(crate) capacity: u64,
    /// Release order; older blocks win ties
    pub(crate) idle_since: u64,
    pub(crate) block: B,
}

#[derive(Default)]
pub(crate) struct PoolCounters {
    pub(crate) checked_out: AtomicUsize,
    pub(crate) allocations: AtomicU64,
    pub(crate) reuses: AtomicU64,
    pub(crate) retired: AtomicU64,
}

pub(crate) struct IdleList<B> {
    pub(crate) by_class: FxHashMap<StorageClass, Vec<IdleBlock<B>>>,
    pub(crate) release_sequence: u64,
}

pub(crate) struct PoolShared<A: BlockAllocator> {
    pub(crate) allocator: A,
    /// Single lock serializing acquire, release and completion callbacks
    pub(crate) idle: Mutex<IdleList<A::Block>>,
    pub(crate) counters: Arc<PoolCounters>,
    pub(crate) next_id: AtomicU64,
}

/// Reusable fixed-size device memory blocks keyed by (size, storage class)
///
/// Cloning yields another handle to the same pool.
pub struct BufferPool<A: BlockAllocator> {
    pub(crate) shared: Arc<PoolShared<A>>,
}

impl<A: BlockAllocator> Clone for BufferPool<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: BlockAllocator> fmt::Debug for BufferPool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub idle_blocks: usize,
    pub idle_bytes: u64,
    pub checked_out: usize,
    pub allocations: u64,
    pub reuses: u64,
    pub retired: u64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BufferPool: {} idle ({} bytes), {} checked out, {} allocations, {} reuses, {} retired",
            self.idle_blocks,
            self.idle_bytes,
            self.checked_out,
            self.allocations,
            self.reuses,
            self.retired
        )
    }
}
