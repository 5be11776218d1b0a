//! # Ringbolt: Fixed-Capacity Lock-Free MPMC Queues
//!
//! Ringbolt is a family of bounded, lock-free multi-producer/multi-consumer
//! (MPMC) queues for message passing between threads on cache-coherent
//! shared-memory hardware. The queue is the sole coordination primitive:
//! no broker, no persistence, no cross-process transport.
//!
//! ## Features
//!
//! - **Lock-free operation**: wait-free ticket claim (one fetch-add) plus a
//!   lock-free per-slot handshake
//! - **Two slot protocols**: a universal state-tagged slot and a compact
//!   nil-sentinel atomic slot
//! - **Cache-line aware**: padded cursors and an index shuffle that scatters
//!   adjacent tickets across distinct cache lines
//! - **Compile-time tuning**: total-order cursor advances, speculative spin
//!   under contention, and a single-producer/single-consumer mode, all
//!   selected by const generics
//! - **Zero allocation** on the hot path; optional compile-time capacity
//!   with no heap allocation at all
//!
//! ## Queue Types
//!
//! ### 1. Tagged Queue ([`TaggedQueue`])
//! The universal variant. Works for any `T: Send`; each slot carries a
//! four-state tag next to the value:
//!
//! ```rust
//! use ringbolt::{
//!     tagged::queue,
//!     traits::{QueueConsumer, QueueProducer},
//! };
//!
//! # fn main() -> Result<(), ringbolt::QueueError> {
//! let (producer, consumer) = queue::<u64>().capacity(1024).channels()?;
//!
//! producer.push(42)?;
//! assert_eq!(consumer.pop()?, 42);
//! # Ok(())
//! # }
//! ```
//!
//! ### 2. Sentinel Queue ([`SentinelQueue`])
//! The compact variant. Each slot is a single lock-free atomic cell; a
//! caller-chosen `nil` value marks an empty slot, so `nil` itself can never
//! be enqueued:
//!
//! ```rust
//! use ringbolt::{
//!     sentinel::sentinel_queue,
//!     traits::{QueueConsumer, QueueProducer},
//! };
//!
//! # fn main() -> Result<(), ringbolt::QueueError> {
//! let (producer, consumer) = sentinel_queue::<u32>(0).capacity(64).channels()?;
//!
//! producer.push(7)?;
//! assert_eq!(consumer.pop()?, 7);
//! # Ok(())
//! # }
//! ```
//!
//! ### 3. Pointer Queue ([`PointerQueue`])
//! Store non-`Copy` types by wrapping them in `Arc<T>`; the queue moves raw
//! pointers through a sentinel queue whose `nil` is the null pointer:
//!
//! ```rust
//! use ringbolt::{
//!     pointer::pointer_queue,
//!     traits::{QueueConsumer, QueueProducer},
//! };
//! use std::sync::Arc;
//!
//! #[derive(Debug, PartialEq)]
//! struct Message {
//!     id: u64,
//!     data: Vec<u8>,
//! }
//!
//! # fn main() -> Result<(), ringbolt::QueueError> {
//! let (producer, consumer) = pointer_queue::<Message>().capacity(512).channels()?;
//!
//! let msg = Arc::new(Message {
//!     id: 1,
//!     data: vec![1, 2, 3],
//! });
//! producer.push(msg.clone())?;
//! assert_eq!(consumer.pop()?, msg);
//! # Ok(())
//! # }
//! ```
//!
//! ### 4. Queue Pack ([`QueuePack`])
//! Horizontal scaling across several independent tagged queues; producers
//! are pinned to a home queue and consumers scan:
//!
//! ```rust
//! use ringbolt::{
//!     pack::queue_pack,
//!     traits::{QueueConsumer, QueueProducer},
//! };
//!
//! # fn main() -> Result<(), ringbolt::QueueError> {
//! // 4 queues, rotate the consumer's preference every 16 pops
//! let (producer, consumer) = queue_pack::<u64, 4, 16>().queue_capacity(256).channels()?;
//!
//! producer.push(100)?;
//! assert_eq!(consumer.pop()?, 100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Blocking and non-blocking operations
//!
//! `push`/`pop` spin (with escalating back-off) until they complete: a
//! producer on a full queue parks inside the claimed slot until the lagging
//! consumer empties it, so the queue never overflows and never drops.
//! `try_push`/`try_pop` claim a ticket only when the occupancy allows it
//! and return [`QueueError::Full`]/[`QueueError::Empty`] instead of
//! waiting.
//!
//! ## Ordering guarantees
//!
//! Pushes by one producer are observed in order; pops by one consumer
//! happen in order; a pop of an element happens-after the push that stored
//! it. With `TOTAL_ORDER` enabled, cursor advances are sequentially
//! consistent, which linearizes the global commit sequence at the cost of a
//! stronger fence on some architectures.
//!
//! ## Memory layout
//!
//! Both cursors live on their own cache lines. Slots are dense; the index
//! remap permutes low ticket bits so that neighbouring tickets touch
//! different cache lines instead of fighting over one. Cursors are
//! `usize`-wide and never wrap within a realistic lifetime on 64-bit
//! targets; on 32-bit targets the wrap horizon is about 2³² operations.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! Ringbolt requires Rust 1.88 or later.
#![deny(
    missing_docs,
    unused_imports,
    unused_variables,
    dead_code,
    unreachable_code,
    unused_must_use
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::inline_always,
    clippy::type_complexity
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Sharded queue pack distributing load across independent queues.
///
/// This module provides [`QueuePack`] which spreads producers over several
/// tagged queues to reduce cursor contention in high-throughput scenarios.
///
/// [`QueuePack`]: pack::QueuePack
pub mod pack;

/// Lock-free MPMC queue for non-`Copy` types using `Arc<T>` storage.
///
/// This module provides [`PointerQueue`] which moves `Arc<T>` values as raw
/// pointers through a nil-sentinel queue, the null pointer serving as the
/// sentinel.
///
/// [`PointerQueue`]: pointer::PointerQueue
pub mod pointer;

/// Nil-sentinel MPMC queue over lock-free primitive atomics.
///
/// This module provides [`SentinelQueue`], the compact slot variant: one
/// atomic cell per slot, a reserved `nil` value marking it empty.
///
/// [`SentinelQueue`]: sentinel::SentinelQueue
pub mod sentinel;

/// State-tagged MPMC queue, the universal slot variant.
///
/// This module provides [`TaggedQueue`] and its builder, producer and
/// consumer handles, and convenience constructors.
///
/// [`TaggedQueue`]: tagged::TaggedQueue
pub mod tagged;

/// Common traits for queue producers, consumers, and factories.
///
/// This module defines the abstractions shared by all queue flavors:
/// [`QueueProducer`], [`QueueConsumer`], and [`QueueFactory`].
///
/// [`QueueProducer`]: traits::QueueProducer
/// [`QueueConsumer`]: traits::QueueConsumer
/// [`QueueFactory`]: traits::QueueFactory
pub mod traits;

mod cursor;
mod storage;

pub use pack::QueuePack;
pub use pointer::PointerQueue;
pub use sentinel::SentinelQueue;
pub use tagged::TaggedQueue;

use thiserror::Error;

/// Errors that can occur during queue construction and operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has reached its capacity and cannot accept more elements.
    ///
    /// Returned by `try_push` only. Blocking `push` does not fail on a full
    /// queue; it waits inside the claimed slot until a consumer empties it.
    #[error("queue is full")]
    Full,

    /// The queue contains no elements to consume.
    ///
    /// Returned by `try_pop` only. Blocking `pop` waits for the matching
    /// push to complete instead.
    #[error("queue is empty")]
    Empty,

    /// The requested capacity is invalid.
    ///
    /// Capacity must be at least 1 and small enough that rounding up to the
    /// next power of two stays within half the cursor range. Static
    /// capacities must themselves be powers of two.
    #[error("invalid capacity: must be in 1..=usize::MAX / 2")]
    InvalidCapacity,

    /// The runtime capacity does not match the compile-time capacity.
    ///
    /// When building with a const generic capacity parameter, the runtime
    /// capacity passed to the builder must equal it exactly.
    #[error("capacity mismatch for compile-time queue")]
    CapacityMismatch,

    /// The pushed value equals the queue's nil sentinel.
    ///
    /// A [`SentinelQueue`] encodes "slot empty" as the sentinel value, so
    /// the sentinel itself can never travel through the queue.
    #[error("value is reserved as the nil sentinel")]
    ReservedSentinel,

    /// The element type has no lock-free atomic representation.
    ///
    /// The nil-sentinel protocol requires a genuinely lock-free atomic
    /// cell; this is checked at construction.
    #[error("atomic cell for this element type is not lock-free")]
    NotLockFree,
}

/// Cache line size assumed for padding and index shuffling.
///
/// Matches the alignment `crossbeam_utils::CachePadded` uses on the same
/// targets.
#[cfg(any(target_arch = "aarch64", target_arch = "powerpc64"))]
pub(crate) const CACHE_LINE: usize = 128;
/// Cache line size assumed for padding and index shuffling.
#[cfg(not(any(target_arch = "aarch64", target_arch = "powerpc64")))]
pub(crate) const CACHE_LINE: usize = 64;

/// Largest power of two less than or equal to `x`; 0 for `x == 0`.
pub(crate) const fn prev_pow2(x: usize) -> usize {
    if x == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - x.leading_zeros())
    }
}

/// Swap the low `bits` bits of `index` with the next `bits` bits.
///
/// Sequential tickets index consecutive slots, which would put neighbouring
/// producers on the same cache line. The swap scatters `2^bits` consecutive
/// tickets across `2^bits` distinct lines at the cost of a couple of XORs.
/// With `bits == 0` this is the identity.
///
/// The transformation is an involution, hence a permutation of any
/// `0..2^k` domain with `k >= 2 * bits`.
#[inline(always)]
pub(crate) const fn remap_index(index: usize, bits: u32) -> usize {
    if bits == 0 {
        return index;
    }
    let mask = (1usize << bits) - 1;
    let mix = (index ^ (index >> bits)) & mask;
    index ^ mix ^ (mix << bits)
}

/// Number of index bits to shuffle for a ring of `n_prime` slots whose
/// synchronization cells are `stride` bytes apart on lines of `cache_line`
/// bytes.
///
/// Shuffling only helps when several cells share a line (`per_line > 1`)
/// and the ring is large enough that the swapped bit group stays in range
/// (`n_prime >= per_line * per_line`); otherwise 0.
pub(crate) const fn shuffle_bits(n_prime: usize, stride: usize, cache_line: usize) -> u32 {
    if stride == 0 || stride >= cache_line {
        return 0;
    }
    let per_line = prev_pow2(cache_line / stride);
    if per_line > 1 && n_prime >= per_line * per_line {
        per_line.trailing_zeros()
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn prev_pow2_boundaries() {
        assert_eq!(prev_pow2(0), 0);
        assert_eq!(prev_pow2(1), 1);
        assert_eq!(prev_pow2(2), 2);
        assert_eq!(prev_pow2(3), 2);
        assert_eq!(prev_pow2(64), 64);
        assert_eq!(prev_pow2(65), 64);
    }

    #[test]
    fn remap_zero_bits_is_identity() {
        for i in 0..1024 {
            assert_eq!(remap_index(i, 0), i);
        }
    }

    #[test]
    fn remap_is_a_permutation() {
        for bits in 1..=4u32 {
            let n = 1usize << (2 * bits + 2);
            let mapped: HashSet<usize> = (0..n).map(|i| remap_index(i, bits)).collect();
            assert_eq!(mapped.len(), n);
            assert!(mapped.iter().all(|&i| i < n));
        }
    }

    #[test]
    fn remap_is_an_involution() {
        for i in 0..4096 {
            assert_eq!(remap_index(remap_index(i, 3), 3), i);
        }
    }

    #[test]
    fn remap_scatters_adjacent_tickets() {
        // With 8 cells per line, tickets 0..8 must land on 8 distinct lines.
        let per_line = 8usize;
        let bits = per_line.trailing_zeros();
        let lines: HashSet<usize> = (0..per_line)
            .map(|i| remap_index(i, bits) / per_line)
            .collect();
        assert_eq!(lines.len(), per_line);
    }

    #[test]
    fn shuffle_bits_thresholds() {
        // 8-byte cells on 64-byte lines: 8 per line, needs a 64-slot ring.
        assert_eq!(shuffle_bits(64, 8, 64), 3);
        assert_eq!(shuffle_bits(32, 8, 64), 0);
        // 1-byte cells: 64 per line, needs 4096 slots.
        assert_eq!(shuffle_bits(4096, 1, 64), 6);
        assert_eq!(shuffle_bits(2048, 1, 64), 0);
        // Cell as large as the line: nothing to scatter.
        assert_eq!(shuffle_bits(1 << 20, 64, 64), 0);
        assert_eq!(shuffle_bits(1 << 20, 128, 64), 0);
        // Degenerate stride.
        assert_eq!(shuffle_bits(1024, 0, 64), 0);
    }
}
