//! Storage budget for backing stores
//!
//! Tracks how many bytes have been handed to backing stores and rejects
//! writes that would exceed an optional cap.

use crate::core::error::Error;
use crate::core::types::Result;

/// Byte budget shared by all backing stores of one octree
#[derive(Clone, Debug, Default)]
pub struct StorageBudget {
    /// Maximum bytes allowed, None = unbounded
    limit_bytes: Option<usize>,
    /// Bytes reserved so far
    used_bytes: usize,
}

impl StorageBudget {
    /// Create a budget
    ///
    /// # Arguments
    /// * `limit_bytes` - Cap in bytes, or None for no cap
    pub fn new(limit_bytes: Option<usize>) -> Self {
        Self { limit_bytes, used_bytes: 0 }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Reserve `bytes`, failing without side effects when over the cap
    pub fn reserve(&mut self, bytes: usize) -> Result<()> {
        if let Some(available) = self.available() {
            if bytes > available {
                return Err(Error::BudgetExceeded { requested: bytes, available });
            }
        }
        self.used_bytes = self.used_bytes.saturating_add(bytes);
        Ok(())
    }

    /// Return previously reserved bytes
    pub fn release(&mut self, bytes: usize) {
        self.used_bytes = self.used_bytes.saturating_sub(bytes);
    }

    // --- Query methods ---

    pub fn used(&self) -> usize {
        self.used_bytes
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit_bytes
    }

    /// Bytes still available, None when unbounded
    pub fn available(&self) -> Option<usize> {
        self.limit_bytes.map(|limit| limit.saturating_sub(self.used_bytes))
    }

    /// Usage as a fraction of the cap (0.0 when unbounded)
    pub fn usage_fraction(&self) -> f32 {
        match self.limit_bytes {
            Some(0) => 1.0,
            Some(limit) => self.used_bytes as f32 / limit as f32,
            None => 0.0,
        }
    }
}
