// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because buffer contents can no longer be trusted";

/// Largest capacity any expandable buffer may reach unless configured otherwise.
///
/// Matches the 32-bit block length limit of the memory layer, so a single backend
/// region never exceeds what a `u32` length can describe.
pub const DEFAULT_MAX_CAPACITY: usize = u32::MAX as usize;

/// Composite buffers keep up to this many children inline before spilling to the heap.
pub(crate) const MAX_INLINE_CHILDREN: usize = 4;

/// Chunk size used when bytes are staged through a temporary during bulk copies.
pub(crate) const STAGING_CHUNK_LEN: usize = 4096;

/// Size of the stack chunk used by the default byte-fill implementation.
pub(crate) const FILL_CHUNK_LEN: usize = 256;
