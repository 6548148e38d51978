//! Size-class memory pool for image and audio buffers.
//!
//! Blocks are grouped into power-of-two size classes (256 bytes to 1 GiB by
//! default). A released block goes back onto the free list of the class it
//! was carved for, never to the allocator, so steady-state playback reuses
//! the same handful of blocks frame after frame. Idle blocks are only
//! returned to the system by [`MemoryPool::purge`] or when the pool itself
//! is dropped.
//!
//! Every class has its own lock; the lock covers the free-list push/pop
//! only, never the carving of a new block.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StrataError};

/// Bytes reserved per block for bookkeeping; a request of `n` bytes is
/// served from the smallest class of at least `n + HEADER_SIZE` bytes.
pub const HEADER_SIZE: usize = 16;

/// Storage unit of a block. Gives every block 16-byte alignment so sample
/// and pixel data can be viewed as wider types.
#[repr(C, align(16))]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Chunk([u8; 16]);

const CHUNK: usize = std::mem::size_of::<Chunk>();

type Block = Box<[Chunk]>;

/// Size class range of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// log2 of the smallest block size.
    pub min_class_log2: u32,
    /// log2 of the largest block size.
    pub max_class_log2: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_class_log2: 8,
            max_class_log2: 30,
        }
    }
}

/// Usage figures of one size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    /// Block size including the header.
    pub block_size: usize,
    /// Blocks carved for this class since creation.
    pub allocated: usize,
    /// Blocks waiting on the free list.
    pub idle: usize,
    /// Blocks currently held by callers.
    pub in_use: usize,
}

struct SizeClass {
    size: usize,
    free: Mutex<Vec<Block>>,
    allocated: AtomicUsize,
    in_use: AtomicUsize,
}

impl SizeClass {
    fn new(size: usize) -> Self {
        Self {
            size,
            free: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.size - HEADER_SIZE
    }

    /// Pop a free block or carve a new one.
    fn fetch(&self) -> Result<Block> {
        let recycled = self.free.lock().pop();
        let block = match recycled {
            Some(block) => block,
            None => {
                let block = carve(self.capacity())?;
                self.allocated.fetch_add(1, Ordering::Relaxed);
                block
            }
        };
        self.in_use.fetch_add(1, Ordering::Relaxed);
        Ok(block)
    }

    fn give_back(&self, block: Block) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        self.free.lock().push(block);
    }

    fn stats(&self) -> ClassStats {
        ClassStats {
            block_size: self.size,
            allocated: self.allocated.load(Ordering::Relaxed),
            idle: self.free.lock().len(),
            in_use: self.in_use.load(Ordering::Relaxed),
        }
    }
}

fn carve(bytes: usize) -> Result<Block> {
    let chunks = bytes.div_ceil(CHUNK);
    let mut storage: Vec<Chunk> = Vec::new();
    storage
        .try_reserve_exact(chunks)
        .map_err(|e| StrataError::OutOfMemory(format!("{} byte block: {}", bytes, e)))?;
    storage.resize(chunks, Chunk::zeroed());
    Ok(storage.into_boxed_slice())
}

struct PoolInner {
    config: PoolConfig,
    classes: Vec<Arc<SizeClass>>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        for class in &self.classes {
            let stats = class.stats();
            if stats.allocated > 0 {
                debug!(
                    block_size = stats.block_size,
                    allocated = stats.allocated,
                    returned = stats.idle,
                    outstanding = stats.in_use,
                    "closing pool size class"
                );
            }
        }
    }
}

/// Shared handle on a set of size-class free lists.
///
/// Construct one per process (or per test) and hand it to every service
/// and frame that allocates buffers.
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    /// Create a pool with the default 256 B .. 1 GiB classes.
    pub fn new() -> Self {
        Self::build(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Result<Self> {
        let max_log2 = usize::BITS - 2;
        if config.min_class_log2 < 5
            || config.min_class_log2 > config.max_class_log2
            || config.max_class_log2 > max_log2
        {
            return Err(StrataError::InvalidParameter(format!(
                "pool classes 2^{}..2^{}",
                config.min_class_log2, config.max_class_log2
            )));
        }
        Ok(Self::build(config))
    }

    fn build(config: PoolConfig) -> Self {
        let classes = (config.min_class_log2..=config.max_class_log2)
            .map(|log2| Arc::new(SizeClass::new(1usize << log2)))
            .collect();
        Self {
            inner: Arc::new(PoolInner { config, classes }),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.inner.config
    }

    fn class_for(&self, size: usize) -> Result<&Arc<SizeClass>> {
        let needed = size.saturating_add(HEADER_SIZE);
        self.inner
            .classes
            .iter()
            .find(|class| class.size >= needed)
            .ok_or_else(|| {
                StrataError::OutOfMemory(format!(
                    "{} bytes exceeds the largest pool block",
                    size
                ))
            })
    }

    /// Block size (header included) that serves a request of `size` bytes.
    pub fn class_size(&self, size: usize) -> Option<usize> {
        self.class_for(size).ok().map(|class| class.size)
    }

    /// Allocate at least `size` bytes.
    ///
    /// Contents of a recycled block are whatever its previous holder left.
    pub fn alloc(&self, size: usize) -> Result<PoolBuffer> {
        let class = self.class_for(size)?;
        let block = class.fetch()?;
        Ok(PoolBuffer {
            block: Some(block),
            len: size,
            origin: Arc::downgrade(class),
        })
    }

    /// Allocate `size` zeroed bytes.
    pub fn alloc_zeroed(&self, size: usize) -> Result<PoolBuffer> {
        let mut buffer = self.alloc(size)?;
        buffer.as_mut_slice().fill(0);
        Ok(buffer)
    }

    /// Return a buffer to its origin class. Equivalent to dropping it.
    pub fn release(&self, buffer: PoolBuffer) {
        drop(buffer);
    }

    /// Resize a buffer, keeping its first `min(old, new)` bytes.
    ///
    /// A buffer whose block can hold the new size is returned as is.
    pub fn realloc(&self, mut buffer: PoolBuffer, size: usize) -> Result<PoolBuffer> {
        if size <= buffer.capacity() {
            buffer.len = size;
            return Ok(buffer);
        }
        let mut grown = self.alloc(size)?;
        let keep = buffer.len.min(size);
        grown.as_mut_slice()[..keep].copy_from_slice(&buffer.as_slice()[..keep]);
        Ok(grown)
    }

    /// Free every idle block. Blocks held by callers are unaffected.
    /// Returns the number of blocks freed.
    pub fn purge(&self) -> usize {
        let mut freed = 0;
        for class in &self.inner.classes {
            let idle = std::mem::take(&mut *class.free.lock());
            freed += idle.len();
        }
        if freed > 0 {
            debug!(blocks = freed, "purged idle pool blocks");
        }
        freed
    }

    /// Free-list length of the class serving `size` byte requests.
    pub fn idle_count(&self, size: usize) -> usize {
        self.class_for(size)
            .map(|class| class.free.lock().len())
            .unwrap_or(0)
    }

    /// Stats for every size class, smallest first.
    pub fn stats(&self) -> Vec<ClassStats> {
        self.inner.classes.iter().map(|c| c.stats()).collect()
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("config", &self.inner.config)
            .finish()
    }
}

/// A block on loan from a [`MemoryPool`].
///
/// The buffer remembers the class it came from; dropping it pushes the
/// block back onto that class's free list. If the pool is gone by then the
/// block is freed directly.
pub struct PoolBuffer {
    block: Option<Block>,
    len: usize,
    origin: Weak<SizeClass>,
}

impl PoolBuffer {
    /// Number of bytes requested.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Usable bytes in the underlying block.
    pub fn capacity(&self) -> usize {
        self.block
            .as_ref()
            .map(|b| b.len() * CHUNK)
            .unwrap_or(0)
    }

    /// Shrink or grow within the block's capacity.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.capacity() {
            return Err(StrataError::InvalidParameter(format!(
                "length {} exceeds block capacity {}",
                len,
                self.capacity()
            )));
        }
        self.len = len;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.block {
            Some(block) => &bytemuck::cast_slice::<Chunk, u8>(block)[..self.len],
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len;
        match &mut self.block {
            Some(block) => &mut bytemuck::cast_slice_mut::<Chunk, u8>(block)[..len],
            None => &mut [],
        }
    }

    /// View the buffer as a slice of `T` (e.g. `i16` audio samples).
    pub fn cast<T: Pod>(&self) -> &[T] {
        let count = self.len / std::mem::size_of::<T>().max(1);
        match &self.block {
            Some(block) => &bytemuck::cast_slice::<Chunk, T>(block)[..count],
            None => &[],
        }
    }

    pub fn cast_mut<T: Pod>(&mut self) -> &mut [T] {
        let count = self.len / std::mem::size_of::<T>().max(1);
        match &mut self.block {
            Some(block) => &mut bytemuck::cast_slice_mut::<Chunk, T>(block)[..count],
            None => &mut [],
        }
    }

    /// Address of the first byte; stable for the life of the block.
    pub fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    /// Copy into a fresh block of the same class.
    pub fn try_clone(&self) -> Result<PoolBuffer> {
        let (block, origin) = match self.origin.upgrade() {
            Some(class) => (class.fetch()?, Arc::downgrade(&class)),
            None => (carve(self.capacity())?, Weak::new()),
        };
        let mut copy = PoolBuffer {
            block: Some(block),
            len: self.len,
            origin,
        };
        copy.as_mut_slice().copy_from_slice(self.as_slice());
        Ok(copy)
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        match self.origin.upgrade() {
            Some(class) => class.give_back(block),
            None => debug!(
                bytes = block.len() * CHUNK,
                "pool block outlived its pool; freeing directly"
            ),
        }
    }
}

impl std::fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
