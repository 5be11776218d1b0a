use crate::{
    CACHE_LINE, QueueError,
    cursor::Cursors,
    remap_index, shuffle_bits,
    storage::Storage,
    traits::{QueueConsumer, QueueFactory, QueueProducer},
};
use crossbeam_utils::Backoff;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

mod sealed {
    pub trait Sealed {}
}

/// Primitive element types with a lock-free atomic cell.
///
/// The nil-sentinel protocol stores the element itself in an atomic, so it
/// is only available for integer primitives whose atomic representation
/// can be certified lock-free at construction time. The cells come from
/// `portable-atomic`, which provides genuine 128-bit atomics where the
/// target has them.
///
/// This trait is sealed; it is implemented for the unsigned and signed
/// integer primitives up to 128 bits plus `usize`/`isize`.
pub trait Primitive: Copy + Eq + Send + Sync + sealed::Sealed + 'static {
    /// The atomic cell type backing one slot.
    type Atomic: Send + Sync;

    /// Wrap a value in a fresh atomic cell.
    fn atomic(value: Self) -> Self::Atomic;

    /// Atomic load from a cell.
    fn load(cell: &Self::Atomic, order: Ordering) -> Self;

    /// Atomic store into a cell.
    fn store(cell: &Self::Atomic, value: Self, order: Ordering);

    /// Atomic swap, returning the prior value.
    fn swap(cell: &Self::Atomic, value: Self, order: Ordering) -> Self;

    /// Atomic compare-exchange.
    fn compare_exchange(
        cell: &Self::Atomic,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;

    /// Whether the atomic cell is lock-free on this target.
    fn is_lock_free() -> bool;
}

macro_rules! impl_primitive {
    ($($ty:ty => $atomic:ty),+ $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Primitive for $ty {
                type Atomic = $atomic;

                #[inline(always)]
                fn atomic(value: Self) -> Self::Atomic {
                    <$atomic>::new(value)
                }

                #[inline(always)]
                fn load(cell: &Self::Atomic, order: Ordering) -> Self {
                    cell.load(order)
                }

                #[inline(always)]
                fn store(cell: &Self::Atomic, value: Self, order: Ordering) {
                    cell.store(value, order);
                }

                #[inline(always)]
                fn swap(cell: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    cell.swap(value, order)
                }

                #[inline(always)]
                fn compare_exchange(
                    cell: &Self::Atomic,
                    current: Self,
                    new: Self,
                    success: Ordering,
                    failure: Ordering,
                ) -> Result<Self, Self> {
                    cell.compare_exchange(current, new, success, failure)
                }

                #[inline(always)]
                fn is_lock_free() -> bool {
                    <$atomic>::is_lock_free()
                }
            }
        )+
    };
}

impl_primitive! {
    u8 => portable_atomic::AtomicU8,
    u16 => portable_atomic::AtomicU16,
    u32 => portable_atomic::AtomicU32,
    u64 => portable_atomic::AtomicU64,
    u128 => portable_atomic::AtomicU128,
    usize => portable_atomic::AtomicUsize,
    i8 => portable_atomic::AtomicI8,
    i16 => portable_atomic::AtomicI16,
    i32 => portable_atomic::AtomicI32,
    i64 => portable_atomic::AtomicI64,
    i128 => portable_atomic::AtomicI128,
    isize => portable_atomic::AtomicIsize,
}

/// Bounded lock-free MPMC queue with nil-sentinel slots.
///
/// The compact variant: each slot is a single atomic cell, and a
/// caller-chosen `nil` value encodes "slot empty". A producer commits with
/// one `nil -> value` compare-exchange, a consumer takes with one
/// `swap(nil)`; there is no separate state word and no transitional
/// states. The price is that `nil` itself can never travel through the
/// queue (pushes of it are rejected with
/// [`QueueError::ReservedSentinel`]), and the element type must have a
/// lock-free atomic cell — checked at construction.
///
/// The `N` / `TOTAL_ORDER` / `MAX_THROUGHPUT` / `SPSC` parameters behave
/// exactly as on [`TaggedQueue`](crate::tagged::TaggedQueue), as do the
/// blocking semantics of `push`/`pop` versus `try_push`/`try_pop`.
pub struct SentinelQueue<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> where
    T: Primitive,
{
    storage: Storage<T::Atomic, N>,
    nil: T,
    cursors: Cursors,
    capacity: usize,
    mask: usize,
    shuffle: u32,
    pub(crate) writers: AtomicUsize,
    pub(crate) readers: AtomicUsize,
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    fmt::Debug for SentinelQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("is_empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}

/// Builder for nil-sentinel queues.
///
/// Obtained from [`sentinel_queue`] or [`sentinel_queue_with_flags`],
/// which take the sentinel value up front since every queue needs one.
///
/// # Examples
///
/// ```
/// use ringbolt::{
///     sentinel::sentinel_queue,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, consumer) = sentinel_queue::<u64>(u64::MAX).capacity(32).channels()?;
///
/// producer.push(9)?;
/// assert_eq!(consumer.pop()?, 9);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SentinelBuilder<
    T,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> where
    T: Primitive,
{
    capacity: Option<usize>,
    nil: T,
}

impl<T, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    SentinelBuilder<T, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    /// Create a new builder with the given nil sentinel
    pub const fn new(nil: T) -> Self {
        Self {
            capacity: None,
            nil,
        }
    }

    /// Set the queue capacity (rounded up to the next power of two)
    #[must_use]
    pub const fn capacity(mut self, cap: usize) -> Self {
        self.capacity = Some(cap);
        self
    }

    /// Build a dynamic queue
    pub fn build(
        self,
    ) -> Result<Arc<SentinelQueue<T, 0, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>, QueueError> {
        let capacity = self.capacity.ok_or(QueueError::InvalidCapacity)?;
        Ok(Arc::new(SentinelQueue::new(capacity, self.nil)?))
    }

    /// Build a static queue with compile-time capacity
    pub fn build_static<const N: usize>(
        self,
    ) -> Result<Arc<SentinelQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>, QueueError> {
        let capacity = self.capacity.unwrap_or(N);
        Ok(Arc::new(SentinelQueue::new(capacity, self.nil)?))
    }

    /// Create producer/consumer pair
    pub fn channels(
        self,
    ) -> Result<
        (
            SentinelProducer<T, 0, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>,
            SentinelConsumer<T, 0, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>,
        ),
        QueueError,
    > {
        let queue = self.build()?;
        Ok((queue.producer(), queue.consumer()))
    }

    /// Create producer/consumer pair with static capacity
    pub fn channels_static<const N: usize>(
        self,
    ) -> Result<
        (
            SentinelProducer<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>,
            SentinelConsumer<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>,
        ),
        QueueError,
    > {
        let queue = self.build_static::<N>()?;
        Ok((queue.producer(), queue.consumer()))
    }
}

/// Convenience function for creating nil-sentinel queues with the default
/// flags.
///
/// `nil` is the reserved value that marks an empty slot; it can never be
/// pushed.
///
/// # Examples
///
/// ```
/// use ringbolt::{sentinel::sentinel_queue, traits::QueueProducer};
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, _consumer) = sentinel_queue::<u32>(0).capacity(64).channels()?;
///
/// producer.push(1)?;
/// assert!(producer.push(0).is_err());
/// # Ok(())
/// # }
/// ```
pub const fn sentinel_queue<T>(nil: T) -> SentinelBuilder<T>
where
    T: Primitive,
{
    SentinelBuilder::new(nil)
}

/// Convenience function for creating nil-sentinel queues with explicit
/// flags.
///
/// # Type Parameters
///
/// * `T` - The element type (a [`Primitive`])
/// * `TOTAL_ORDER` - Sequentially consistent cursor advances
/// * `MAX_THROUGHPUT` - Speculative relaxed re-read before CAS retries
/// * `SPSC` - Single-producer/single-consumer mode
pub const fn sentinel_queue_with_flags<
    T,
    const TOTAL_ORDER: bool,
    const MAX_THROUGHPUT: bool,
    const SPSC: bool,
>(
    nil: T,
) -> SentinelBuilder<T, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    SentinelBuilder::new(nil)
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    SentinelQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    /// Create a new queue with the specified capacity and nil sentinel
    pub(crate) fn new(capacity: usize, nil: T) -> Result<Self, QueueError> {
        if !T::is_lock_free() {
            return Err(QueueError::NotLockFree);
        }
        if capacity == 0 || capacity > usize::MAX >> 1 {
            return Err(QueueError::InvalidCapacity);
        }
        if N > 0 {
            if !N.is_power_of_two() {
                return Err(QueueError::InvalidCapacity);
            }
            if capacity != N {
                return Err(QueueError::CapacityMismatch);
            }
        }

        let capacity = capacity.next_power_of_two();

        Ok(Self {
            storage: Storage::with(capacity, |_| T::atomic(nil)),
            nil,
            cursors: Cursors::new(),
            capacity,
            mask: capacity - 1,
            shuffle: shuffle_bits(capacity, size_of::<T::Atomic>(), CACHE_LINE),
            writers: AtomicUsize::new(0),
            readers: AtomicUsize::new(0),
        })
    }

    /// Get the capacity of the queue
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the nil sentinel this queue reserves
    pub const fn nil(&self) -> T {
        self.nil
    }

    /// Get the approximate number of elements in the queue
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Check if the queue appears empty
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Check if the queue appears full
    pub fn is_full(&self) -> bool {
        self.cursors.is_full(self.capacity)
    }

    #[inline(always)]
    fn slot(&self, ticket: usize) -> &T::Atomic {
        self.storage.get(remap_index(ticket & self.mask, self.shuffle))
    }

    /// Producer half of the slot protocol: a `nil -> value` CAS with
    /// Release on success publishes the element in one step.
    fn store_slot(&self, cell: &T::Atomic, value: T) {
        let backoff = Backoff::new();

        if SPSC {
            // Sole producer: only the consumer can turn the cell back to
            // nil, so polling plus a plain Release store suffices.
            while T::load(cell, Ordering::Acquire) != self.nil {
                backoff.snooze();
            }
            T::store(cell, value, Ordering::Release);
            return;
        }

        while T::compare_exchange(cell, self.nil, value, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            if MAX_THROUGHPUT {
                while T::load(cell, Ordering::Relaxed) != self.nil {
                    backoff.snooze();
                }
            } else {
                backoff.snooze();
            }
        }
    }

    /// Consumer half: `swap(nil)` with Acquire both takes the element and
    /// re-empties the slot.
    fn load_slot(&self, cell: &T::Atomic) -> T {
        let backoff = Backoff::new();

        if SPSC {
            loop {
                let value = T::load(cell, Ordering::Acquire);
                if value != self.nil {
                    T::store(cell, self.nil, Ordering::Release);
                    return value;
                }
                backoff.snooze();
            }
        }

        loop {
            let value = T::swap(cell, self.nil, Ordering::Acquire);
            if value != self.nil {
                return value;
            }
            if MAX_THROUGHPUT {
                while T::load(cell, Ordering::Relaxed) == self.nil {
                    backoff.snooze();
                }
            } else {
                backoff.snooze();
            }
        }
    }

    #[inline(always)]
    fn debug_assert_single_producer(&self) {
        if SPSC {
            debug_assert!(
                self.writers.load(Ordering::Relaxed) <= 1,
                "SPSC queue driven from more than one producer handle"
            );
        }
    }

    #[inline(always)]
    fn debug_assert_single_consumer(&self) {
        if SPSC {
            debug_assert!(
                self.readers.load(Ordering::Relaxed) <= 1,
                "SPSC queue driven from more than one consumer handle"
            );
        }
    }

    /// Push a value, spinning in the claimed slot until it frees up.
    ///
    /// The only failure is pushing the nil sentinel itself.
    pub fn push(&self, value: T) -> Result<(), QueueError> {
        if value == self.nil {
            return Err(QueueError::ReservedSentinel);
        }
        self.debug_assert_single_producer();
        let ticket = self.cursors.claim_write::<TOTAL_ORDER, SPSC>();
        self.store_slot(self.slot(ticket), value);
        Ok(())
    }

    /// Try to push a value without waiting for space.
    ///
    /// The occupancy check and the ticket claim are one compare-exchange,
    /// so a failed try-push never disturbs the cursors. A successful claim
    /// can still wait briefly on a slot whose previous consumer is
    /// mid-exchange.
    pub fn try_push(&self, value: T) -> Result<(), (T, QueueError)> {
        if value == self.nil {
            return Err((value, QueueError::ReservedSentinel));
        }
        self.debug_assert_single_producer();
        match self.cursors.try_claim_write::<TOTAL_ORDER, SPSC>(self.capacity) {
            Some(ticket) => {
                self.store_slot(self.slot(ticket), value);
                Ok(())
            },
            None => Err((value, QueueError::Full)),
        }
    }

    /// Pop a value, spinning until the matching push commits.
    pub fn pop(&self) -> Result<T, QueueError> {
        self.debug_assert_single_consumer();
        let ticket = self.cursors.claim_read::<TOTAL_ORDER, SPSC>();
        Ok(self.load_slot(self.slot(ticket)))
    }

    /// Try to pop a value without waiting for one.
    ///
    /// Strictly non-blocking at the cursor step, like
    /// [`try_push`](Self::try_push); may wait briefly on a slot whose
    /// producer has claimed but not yet committed.
    pub fn try_pop(&self) -> Result<T, QueueError> {
        self.debug_assert_single_consumer();
        match self.cursors.try_claim_read::<TOTAL_ORDER, SPSC>() {
            Some(ticket) => Ok(self.load_slot(self.slot(ticket))),
            None => Err(QueueError::Empty),
        }
    }
}

// Type aliases for common configurations

/// Convenient type alias for [`SentinelProducerHandle`].
///
/// This simplifies the type signatures when using producer handles with
/// default configuration parameters.
pub type SentinelProducer<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> = SentinelProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>;

/// Convenient type alias for [`SentinelConsumerHandle`].
///
/// This simplifies the type signatures when using consumer handles with
/// default configuration parameters.
pub type SentinelConsumer<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> = SentinelConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>;

/// Producer handle for the nil-sentinel queue.
///
/// Cloneable; each clone shares the same queue via `Arc`. Under `SPSC` a
/// debug assertion rejects a second live handle.
pub struct SentinelProducerHandle<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> where
    T: Primitive,
{
    queue: Arc<SentinelQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>,
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    fmt::Debug for SentinelProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelProducerHandle")
            .field("queue", &self.queue)
            .finish()
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Clone
    for SentinelProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn clone(&self) -> Self {
        self.queue.writers.fetch_add(1, Ordering::Relaxed);
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Drop
    for SentinelProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn drop(&mut self) {
        self.queue.writers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    QueueProducer<T> for SentinelProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn push(&self, value: T) -> Result<(), QueueError> {
        self.queue.push(value)
    }

    fn try_push(&self, value: T) -> Result<(), (T, QueueError)> {
        self.queue.try_push(value)
    }
}

/// Consumer handle for the nil-sentinel queue.
///
/// Cloneable; each clone shares the same queue via `Arc`. Under `SPSC` a
/// debug assertion rejects a second live handle.
pub struct SentinelConsumerHandle<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> where
    T: Primitive,
{
    queue: Arc<SentinelQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>,
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    fmt::Debug for SentinelConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelConsumerHandle")
            .field("queue", &self.queue)
            .finish()
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Clone
    for SentinelConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn clone(&self) -> Self {
        self.queue.readers.fetch_add(1, Ordering::Relaxed);
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Drop
    for SentinelConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn drop(&mut self) {
        self.queue.readers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    QueueConsumer<T> for SentinelConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Primitive,
{
    fn pop(&self) -> Result<T, QueueError> {
        self.queue.pop()
    }

    fn try_pop(&self) -> Result<T, QueueError> {
        self.queue.try_pop()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    QueueFactory<T> for Arc<SentinelQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>
where
    T: Primitive,
{
    type Producer = SentinelProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>;
    type Consumer = SentinelConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>;

    fn producer(&self) -> Self::Producer {
        self.writers.fetch_add(1, Ordering::Relaxed);
        SentinelProducerHandle {
            queue: self.clone(),
        }
    }

    fn consumer(&self) -> Self::Consumer {
        self.readers.fetch_add(1, Ordering::Relaxed);
        SentinelConsumerHandle {
            queue: self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn nonzero_values_fill_and_drain() {
        let q = sentinel_queue::<u32>(0).capacity(64).build().unwrap();

        for i in 1..=64u32 {
            q.push(i).unwrap();
        }
        assert!(q.is_full());

        for i in 1..=64u32 {
            assert_eq!(q.pop().unwrap(), i);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn pushing_the_sentinel_is_rejected() {
        let q = sentinel_queue::<u32>(0).capacity(8).build().unwrap();

        assert_eq!(q.push(0), Err(QueueError::ReservedSentinel));
        assert_eq!(q.try_push(0), Err((0, QueueError::ReservedSentinel)));
        assert!(q.is_empty());

        // A nonzero sentinel reserves that value instead.
        let q = sentinel_queue::<u64>(u64::MAX).capacity(8).build().unwrap();
        assert!(q.push(0).is_ok());
        assert_eq!(q.push(u64::MAX), Err(QueueError::ReservedSentinel));
    }

    #[test]
    fn try_variants_at_the_boundary() {
        let q = sentinel_queue::<u32>(0).capacity(2).build().unwrap();

        assert!(q.try_push(10).is_ok());
        assert!(q.try_push(20).is_ok());
        assert_eq!(q.try_push(30), Err((30, QueueError::Full)));

        assert_eq!(q.try_pop().unwrap(), 10);
        assert!(q.try_push(30).is_ok());
        assert_eq!(q.try_pop().unwrap(), 20);
        assert_eq!(q.try_pop().unwrap(), 30);
        assert_eq!(q.try_pop().unwrap_err(), QueueError::Empty);
    }

    #[test]
    fn static_capacity_and_nil_accessor() {
        let q = sentinel_queue::<u32>(0)
            .capacity(16)
            .build_static::<16>()
            .unwrap();
        assert_eq!(q.capacity(), 16);
        assert_eq!(q.nil(), 0);
    }

    #[test]
    fn spsc_flags_preserve_order() {
        let (producer, consumer) = sentinel_queue_with_flags::<u32, false, true, true>(0)
            .capacity(4)
            .channels()
            .unwrap();

        let push_side = thread::spawn(move || {
            for i in 1..=32u32 {
                producer.push(i).unwrap();
            }
        });

        let pop_side = thread::spawn(move || {
            for i in 1..=32u32 {
                assert_eq!(consumer.pop().unwrap(), i);
            }
        });

        push_side.join().unwrap();
        pop_side.join().unwrap();
    }

    #[test]
    fn mpmc_multiset_equality() {
        let producers = 2usize;
        let consumers = 2usize;
        let items_per_producer = 20_000usize;
        let total = producers * items_per_producer;

        let q = sentinel_queue::<u64>(0).capacity(256).build().unwrap();
        let consumed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for pid in 0..producers {
            let producer = q.producer();
            handles.push(thread::spawn(move || {
                for i in 0..items_per_producer {
                    // Nonzero by construction: the payload starts at 1.
                    let val = ((pid as u64) << 32) | (i as u64 + 1);
                    producer.push(val).unwrap();
                }
            }));
        }

        let mut collectors = Vec::new();
        for _ in 0..consumers {
            let consumer = q.consumer();
            let consumed = consumed.clone();
            collectors.push(thread::spawn(move || {
                let mut got = Vec::new();
                loop {
                    if consumed.load(Ordering::Relaxed) >= total {
                        break;
                    }
                    if let Ok(val) = consumer.try_pop() {
                        consumed.fetch_add(1, Ordering::Relaxed);
                        got.push(val);
                    } else {
                        std::hint::spin_loop();
                    }
                }
                got
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let mut all: Vec<u64> = collectors
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total, "no value lost, none duplicated");
    }
}
