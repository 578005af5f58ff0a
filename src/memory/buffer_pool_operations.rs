//! Buffer Pool Operations
//!
//! Acquire/release discipline for pooled device memory. A block is either
//! idle in the pool or owned by exactly one frame; it only goes back to the
//! idle list once the GPU work reading it has completed.

use super::block_allocator::BlockAllocator;
use super::buffer_pool_data::{
    BlockId, BlockRequest, BufferPool, CheckoutGuard, IdleBlock, IdleList, PoolCounters,
    PoolShared, PoolStats, PooledBlock, StorageClass,
};
use crate::error::{GradientError, GradientResult};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const DEFAULT_LABEL: &str = "gradient-mesh::pooled-block";

/// Round a request up to the copy alignment; zero-byte blocks are rejected
pub fn aligned_block_size(size: u64, class: StorageClass) -> GradientResult<u64> {
    if size == 0 {
        return Err(GradientError::AllocationFailed {
            size,
            class: class.to_string(),
            reason: "zero-sized block requested".to_string(),
        });
    }

    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    size.checked_add(align - 1)
        .map(|padded| padded / align * align)
        .ok_or_else(|| GradientError::AllocationFailed {
            size,
            class: class.to_string(),
            reason: "size overflows alignment".to_string(),
        })
}

/// Index of the smallest idle block covering `size`, oldest first on ties
pub(crate) fn select_idle_block<B>(blocks: &[IdleBlock<B>], size: u64) -> Option<usize> {
    blocks
        .iter()
        .enumerate()
        .filter(|(_, idle)| idle.capacity >= size)
        .min_by_key(|(_, idle)| (idle.capacity, idle.idle_since))
        .map(|(index, _)| index)
}

impl<A: BlockAllocator> BufferPool<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                allocator,
                idle: Mutex::new(IdleList {
                    by_class: FxHashMap::default(),
                    release_sequence: 0,
                }),
                counters: Arc::new(PoolCounters::default()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn allocator(&self) -> &A {
        &self.shared.allocator
    }

    /// Check out a block of at least `size` bytes of `class` memory
    pub fn acquire(&self, size: u64, class: StorageClass) -> GradientResult<PooledBlock<A::Block>> {
        self.acquire_labeled(size, class, DEFAULT_LABEL)
    }

    /// Like `acquire`; `label` names the block if a fresh one must be allocated
    pub fn acquire_labeled(
        &self,
        size: u64,
        class: StorageClass,
        label: &str,
    ) -> GradientResult<PooledBlock<A::Block>> {
        let aligned = aligned_block_size(size, class)?;

        let reused = {
            let mut idle = self.shared.idle.lock();
            idle.by_class.get_mut(&class).and_then(|blocks| {
                select_idle_block(blocks, aligned).map(|index| blocks.remove(index))
            })
        };

        if let Some(idle) = reused {
            self.shared.counters.reuses.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "[BufferPool::acquire] Reusing block {:?} ({} bytes) for {} byte {} request",
                idle.id,
                idle.capacity,
                size,
                class
            );
            return Ok(self.check_out(idle.id, class, idle.capacity, size, idle.block));
        }

        // Allocation happens outside the lock so callbacks can keep releasing
        let block = self.shared.allocator.allocate(aligned, class, label)?;
        let id = BlockId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.counters.allocations.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "[BufferPool::acquire] Allocated block {:?} ({} bytes, {})",
            id,
            aligned,
            class
        );

        Ok(self.check_out(id, class, aligned, size, block))
    }

    /// Check out one block per request, in request order, or none at all
    ///
    /// When any request fails, the blocks already taken for earlier requests
    /// go straight back to the idle list. Nothing can have been submitted
    /// against them yet.
    pub fn acquire_set(
        &self,
        requests: &[BlockRequest<'_>],
    ) -> GradientResult<Vec<PooledBlock<A::Block>>> {
        let mut acquired = Vec::with_capacity(requests.len());

        for request in requests {
            match self.acquire_labeled(request.size, request.class, request.label) {
                Ok(block) => acquired.push(block),
                Err(e) => {
                    log::warn!(
                        "[BufferPool::acquire_set] '{}' unavailable, returning {} blocks: {}",
                        request.label,
                        acquired.len(),
                        e
                    );
                    self.release_all(acquired);
                    return Err(e);
                }
            }
        }

        Ok(acquired)
    }

    fn check_out(
        &self,
        id: BlockId,
        class: StorageClass,
        capacity: u64,
        requested: u64,
        block: A::Block,
    ) -> PooledBlock<A::Block> {
        self.shared
            .counters
            .checked_out
            .fetch_add(1, Ordering::AcqRel);

        PooledBlock {
            id,
            class,
            capacity,
            requested,
            block,
            guard: CheckoutGuard {
                counters: Arc::clone(&self.shared.counters),
                id,
                released: false,
            },
        }
    }

    /// Return a block to the idle list
    ///
    /// Only call this once every GPU command reading or writing the block has
    /// completed; use `release_on_completion` when that is not yet known.
    pub fn release(&self, pooled: PooledBlock<A::Block>) {
        let PooledBlock {
            id,
            class,
            capacity,
            block,
            mut guard,
            ..
        } = pooled;
        guard.released = true;

        let mut idle = self.shared.idle.lock();
        let idle_since = idle.release_sequence;
        idle.release_sequence += 1;
        idle.by_class.entry(class).or_default().push(IdleBlock {
            id,
            capacity,
            idle_since,
            block,
        });
        drop(idle);

        log::debug!(
            "[BufferPool::release] Block {:?} ({} bytes, {}) back in pool",
            id,
            capacity,
            class
        );
    }

    pub fn release_all<I>(&self, blocks: I)
    where
        I: IntoIterator<Item = PooledBlock<A::Block>>,
    {
        for block in blocks {
            self.release(block);
        }
    }

    /// Release `blocks` once all work submitted to `queue` so far has finished
    ///
    /// wgpu fires the notification while the device is polled, so the owner
    /// must keep calling `Device::poll` for blocks to come back.
    pub fn release_on_completion(
        &self,
        queue: &wgpu::Queue,
        blocks: Vec<PooledBlock<A::Block>>,
    ) {
        if blocks.is_empty() {
            return;
        }

        let pool = self.clone();
        log::debug!(
            "[BufferPool::release_on_completion] {} blocks waiting on GPU completion",
            blocks.len()
        );
        queue.on_submitted_work_done(move || {
            pool.release_all(blocks);
        });
    }

    /// Drop every idle block, returning the bytes freed
    pub fn purge_idle(&self) -> u64 {
        let drained: Vec<IdleBlock<A::Block>> = {
            let mut idle = self.shared.idle.lock();
            idle.by_class
                .values_mut()
                .flat_map(|blocks| blocks.drain(..))
                .collect()
        };

        let freed = drained.iter().map(|idle| idle.capacity).sum();
        if !drained.is_empty() {
            log::info!(
                "[BufferPool::purge_idle] Freed {} idle blocks ({} bytes)",
                drained.len(),
                freed
            );
        }
        freed
    }

    pub fn stats(&self) -> PoolStats {
        let (idle_blocks, idle_bytes) = {
            let idle = self.shared.idle.lock();
            idle.by_class
                .values()
                .flatten()
                .fold((0usize, 0u64), |(count, bytes), block| {
                    (count + 1, bytes + block.capacity)
                })
        };

        let counters = &self.shared.counters;
        PoolStats {
            idle_blocks,
            idle_bytes,
            checked_out: counters.checked_out.load(Ordering::Acquire),
            allocations: counters.allocations.load(Ordering::Relaxed),
            reuses: counters.reuses.load(Ordering::Relaxed),
            retired: counters.retired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU64;

    /// Host-memory stand-in for device blocks
    #[derive(Debug)]
    pub(crate) struct FakeBlock {
        pub(crate) serial: u64,
        pub(crate) size: u64,
    }

    #[derive(Default)]
    pub(crate) struct CountingAllocator {
        pub(crate) allocations: AtomicU64,
        pub(crate) fail_above: Option<u64>,
    }

    impl BlockAllocator for CountingAllocator {
        type Block = FakeBlock;

        fn allocate(
            &self,
            size: u64,
            class: StorageClass,
            _label: &str,
        ) -> GradientResult<FakeBlock> {
            if let Some(limit) = self.fail_above {
                if size > limit {
                    return Err(GradientError::AllocationFailed {
                        size,
                        class: class.to_string(),
                        reason: "fake device out of memory".to_string(),
                    });
                }
            }
            let serial = self.allocations.fetch_add(1, Ordering::Relaxed);
            Ok(FakeBlock { serial, size })
        }
    }

    fn pool() -> BufferPool<CountingAllocator> {
        BufferPool::new(CountingAllocator::default())
    }

    #[test]
    fn test_release_then_acquire_reuses_block() {
        let pool = pool();
        let first = pool.acquire(1024, StorageClass::DevicePrivate).unwrap();
        let first_id = first.id();
        let first_serial = first.block().serial;
        pool.release(first);

        let second = pool.acquire(1024, StorageClass::DevicePrivate).unwrap();
        assert_eq!(second.id(), first_id);
        assert_eq!(second.block().serial, first_serial);
        assert_eq!(pool.allocator().allocations.load(Ordering::Relaxed), 1);

        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.checked_out, 1);
    }

    #[test]
    fn test_larger_request_allocates_fresh() {
        let pool = pool();
        let small = pool.acquire(256, StorageClass::DevicePrivate).unwrap();
        let small_id = small.id();
        pool.release(small);

        let large = pool.acquire(4096, StorageClass::DevicePrivate).unwrap();
        assert_ne!(large.id(), small_id);
        assert_eq!(large.block().size, 4096);

        // The small block is still idle and untouched
        let stats = pool.stats();
        assert_eq!(stats.idle_blocks, 1);
        assert_eq!(stats.idle_bytes, 256);
    }

    #[test]
    fn test_smallest_fitting_block_wins() {
        let pool = pool();
        let big = pool.acquire(8192, StorageClass::DevicePrivate).unwrap();
        let medium = pool.acquire(2048, StorageClass::DevicePrivate).unwrap();
        let tiny = pool.acquire(64, StorageClass::DevicePrivate).unwrap();
        let medium_id = medium.id();
        pool.release_all(vec![big, medium, tiny]);

        let chosen = pool.acquire(1000, StorageClass::DevicePrivate).unwrap();
        assert_eq!(chosen.id(), medium_id);
        // Oversized blocks are handed out whole, never shrunk
        assert_eq!(chosen.capacity(), 2048);
        assert_eq!(chosen.requested_size(), 1000);
    }

    #[test]
    fn test_storage_classes_do_not_mix() {
        let pool = pool();
        let private = pool.acquire(512, StorageClass::DevicePrivate).unwrap();
        let private_id = private.id();
        pool.release(private);

        let shared = pool.acquire(512, StorageClass::HostShared).unwrap();
        assert_ne!(shared.id(), private_id);
        assert_eq!(shared.class(), StorageClass::HostShared);
    }

    #[test]
    fn test_checked_out_block_is_never_handed_out_twice() {
        let pool = pool();
        let frame_one = pool.acquire(1024, StorageClass::DevicePrivate).unwrap();
        let frame_two = pool.acquire(1024, StorageClass::DevicePrivate).unwrap();
        assert_ne!(frame_one.id(), frame_two.id());
        assert_eq!(pool.stats().checked_out, 2);
    }

    #[test]
    fn test_dropped_block_is_retired() {
        let pool = pool();
        let block = pool.acquire(128, StorageClass::DevicePrivate).unwrap();
        drop(block);

        let stats = pool.stats();
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.retired, 1);
        assert_eq!(stats.idle_blocks, 0);
    }

    #[test]
    fn test_alignment_and_zero_size() {
        assert_eq!(aligned_block_size(1, StorageClass::DevicePrivate).unwrap(), 4);
        assert_eq!(aligned_block_size(8, StorageClass::DevicePrivate).unwrap(), 8);
        assert!(aligned_block_size(0, StorageClass::DevicePrivate).is_err());
        assert!(pool().acquire(0, StorageClass::DevicePrivate).is_err());
    }

    #[test]
    fn test_allocation_failure_leaves_pool_intact() {
        let pool = BufferPool::new(CountingAllocator {
            allocations: AtomicU64::new(0),
            fail_above: Some(4096),
        });
        let ok = pool.acquire(1024, StorageClass::DevicePrivate).unwrap();
        pool.release(ok);

        let err = pool.acquire(1 << 20, StorageClass::DevicePrivate).unwrap_err();
        assert!(err.is_recoverable());

        let stats = pool.stats();
        assert_eq!(stats.idle_blocks, 1);
        assert_eq!(stats.checked_out, 0);
    }

    #[test]
    fn test_failed_set_returns_blocks_already_taken() {
        let pool = BufferPool::new(CountingAllocator {
            allocations: AtomicU64::new(0),
            fail_above: Some(4096),
        });

        // Shaped like a frame: the dense block is the first that cannot fit
        let frame = [
            BlockRequest::new(512, StorageClass::HostShared, "control-points"),
            BlockRequest::new(2048, StorageClass::DevicePrivate, "coefficients"),
            BlockRequest::new(1 << 20, StorageClass::DevicePrivate, "dense-vertices"),
            BlockRequest::new(1 << 22, StorageClass::DevicePrivate, "triangles"),
        ];
        let err = pool.acquire_set(&frame).unwrap_err();
        assert!(matches!(err, GradientError::AllocationFailed { .. }));

        let stats = pool.stats();
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.idle_blocks, 2);
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.retired, 0);

        let smaller = [
            BlockRequest::new(256, StorageClass::HostShared, "control-points"),
            BlockRequest::new(1024, StorageClass::DevicePrivate, "coefficients"),
        ];
        let blocks = pool.acquire_set(&smaller).unwrap();
        assert_eq!(blocks[0].class(), StorageClass::HostShared);
        assert_eq!(blocks[1].capacity(), 2048);

        let stats = pool.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.reuses, 2);
        assert_eq!(stats.idle_blocks, 0);
        assert_eq!(stats.checked_out, 2);
    }

    #[test]
    fn test_set_comes_back_in_request_order() {
        let pool = pool();
        let requests = [
            BlockRequest::new(64, StorageClass::HostShared, "a"),
            BlockRequest::new(4096, StorageClass::DevicePrivate, "b"),
            BlockRequest::new(128, StorageClass::DevicePrivate, "c"),
        ];
        let blocks = pool.acquire_set(&requests).unwrap();
        let sizes: Vec<u64> = blocks.iter().map(|block| block.requested_size()).collect();
        assert_eq!(sizes, vec![64, 4096, 128]);
        assert!(pool.acquire_set(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_purge_idle() {
        let pool = pool();
        let a = pool.acquire(100, StorageClass::DevicePrivate).unwrap();
        let b = pool.acquire(200, StorageClass::HostShared).unwrap();
        pool.release_all(vec![a, b]);

        assert_eq!(pool.purge_idle(), 100 + 200);
        assert_eq!(pool.stats().idle_blocks, 0);
    }

    #[test]
    fn test_concurrent_cycling_never_shares_blocks() {
        let pool = pool();
        let live: Arc<PlMutex<HashSet<BlockId>>> = Arc::new(PlMutex::new(HashSet::new()));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let pool = pool.clone();
                let live = Arc::clone(&live);
                std::thread::spawn(move || {
                    for round in 0..200u64 {
                        let size = 256 * (1 + (worker + round) % 4);
                        let block = pool.acquire(size, StorageClass::DevicePrivate).unwrap();
                        assert!(
                            live.lock().insert(block.id()),
                            "block {:?} handed to two owners",
                            block.id()
                        );
                        std::thread::yield_now();
                        assert!(live.lock().remove(&block.id()));
                        pool.release(block);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.allocations + stats.reuses, 8 * 200);
        assert_eq!(stats.idle_blocks as u64, stats.allocations);
    }
}
