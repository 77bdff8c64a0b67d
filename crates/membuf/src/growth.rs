// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use nm::{Event, Magnitude};
use tracing::{Level, event};

use crate::constants::DEFAULT_MAX_CAPACITY;
use crate::{BufferError, Result};

/// Controls how an expandable buffer grows when it runs out of capacity.
///
/// Capacity grows geometrically: starting from the larger of the current capacity and
/// the initial capacity, each step adds half of the previous value, until the requested
/// capacity is reached. The result never exceeds the maximum capacity; a request above
/// it fails with [`BufferError::CapacityExceeded`] and leaves the buffer untouched.
///
/// # Example
///
/// ```
/// use membuf::GrowthPolicy;
///
/// let policy = GrowthPolicy::new()
///     .with_initial_capacity(16)
///     .with_max_capacity(1024);
///
/// assert_eq!(policy.next_capacity(0, 10).unwrap(), 16);
/// assert_eq!(policy.next_capacity(16, 17).unwrap(), 24);
/// assert!(policy.next_capacity(16, 2048).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrowthPolicy {
    initial_capacity: usize,
    max_capacity: usize,
}

impl GrowthPolicy {
    /// Initial capacity used when none is configured.
    pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

    /// Creates a policy with the default initial and maximum capacity.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_capacity: Self::DEFAULT_INITIAL_CAPACITY,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }

    /// Sets the smallest capacity the buffer grows to, regardless of how little was requested.
    #[must_use]
    pub const fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Sets the hard limit on the capacity of the buffer.
    #[must_use]
    pub const fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// The smallest capacity the buffer grows to.
    #[must_use]
    pub const fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// The hard limit on the capacity of the buffer.
    #[must_use]
    pub const fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Calculates the capacity a buffer of `current` capacity must grow to in order to hold
    /// `required` bytes.
    ///
    /// Returns `current` if no growth is needed.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::CapacityExceeded`] if `required` exceeds the maximum capacity.
    #[cfg_attr(test, mutants::skip)] // Mutating the growth step can make the loop spin forever.
    pub fn next_capacity(&self, current: usize, required: usize) -> Result<usize> {
        if required <= current {
            return Ok(current);
        }

        if required > self.max_capacity {
            event!(
                Level::DEBUG,
                message = "buffer growth rejected",
                current,
                required,
                max = self.max_capacity
            );

            return Err(BufferError::CapacityExceeded {
                requested: required,
                max: self.max_capacity,
            });
        }

        let mut capacity = current.max(self.initial_capacity).max(1);

        while capacity < required {
            capacity = capacity.saturating_add((capacity / 2).max(1));
        }

        let capacity = capacity.min(self.max_capacity);

        GROWTH_NEW_CAPACITY.with(|e| e.observe(capacity));

        Ok(capacity)
    }
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self::new()
    }
}

const CAPACITY_BUCKETS: &[Magnitude] = &[64, 1024, 16_384, 262_144, 4_194_304, 67_108_864];

thread_local! {
    static GROWTH_NEW_CAPACITY: Event = Event::builder()
        .name("membuf_growth_new_capacity")
        .histogram(CAPACITY_BUCKETS)
        .build();
}
