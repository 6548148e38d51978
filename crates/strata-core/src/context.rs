//! Process-wide resources handed to every service constructor.

use crate::pool::{MemoryPool, PoolConfig};
use crate::profile::{Profile, ProfileHandle};
use crate::error::Result;

/// The memory pool and output profile a graph is built against.
///
/// Create one before constructing any service and drop it after every
/// service is closed. Cloning shares both resources.
#[derive(Clone, Debug, Default)]
pub struct Context {
    pool: MemoryPool,
    profile: ProfileHandle,
}

impl Context {
    pub fn new(profile: Profile) -> Self {
        Self {
            pool: MemoryPool::new(),
            profile: ProfileHandle::new(profile),
        }
    }

    pub fn with_pool_config(profile: Profile, config: PoolConfig) -> Result<Self> {
        Ok(Self {
            pool: MemoryPool::with_config(config)?,
            profile: ProfileHandle::new(profile),
        })
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn profile(&self) -> &ProfileHandle {
        &self.profile
    }
}
