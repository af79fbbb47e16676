// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-budgeted scratch pool for background parse jobs.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ParseError;

#[derive(Debug)]
struct PoolInner {
    capacity: usize,
    in_use: Mutex<usize>,
}

/// A fixed budget of bytes that background jobs copy their payload into.
///
/// Clones share the same budget.
#[derive(Debug, Clone)]
pub struct ScratchPool {
    inner: Arc<PoolInner>,
}

impl ScratchPool {
    /// Creates a pool holding at most `capacity` bytes at once.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                in_use: Mutex::new(0),
            }),
        }
    }

    /// Copies `data` into a buffer charged against the pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolExhausted` if the remaining budget is too small.
    pub fn copy_from(&self, data: &[u8]) -> Result<ScratchBuffer, ParseError> {
        {
            let mut in_use = self.inner.in_use.lock();
            let available = self.inner.capacity.saturating_sub(*in_use);
            if data.len() > available {
                return Err(ParseError::PoolExhausted {
                    requested: data.len(),
                    available,
                });
            }
            *in_use += data.len();
        }
        Ok(ScratchBuffer {
            data: data.to_vec(),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Returns the total budget.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns the bytes currently held by live buffers.
    #[must_use]
    pub fn in_use(&self) -> usize {
        *self.inner.in_use.lock()
    }

    /// Returns the bytes still available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.capacity.saturating_sub(self.in_use())
    }
}

/// A payload copy owned by exactly one job.
///
/// Its bytes return to the pool when it is dropped, whichever side of the
/// queue drops it.
pub struct ScratchBuffer {
    data: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl ScratchBuffer {
    /// Returns the payload.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        let mut in_use = self.pool.in_use.lock();
        *in_use = in_use.saturating_sub(self.data.len());
    }
}

impl fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}
