use crate::{
    CACHE_LINE, QueueError,
    cursor::Cursors,
    remap_index, shuffle_bits,
    storage::Storage,
    traits::{QueueConsumer, QueueFactory, QueueProducer},
};
use crossbeam_utils::Backoff;
use std::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    mem::MaybeUninit,
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicUsize, Ordering},
    },
};

/// Slot holds no element and no claim.
const EMPTY: u8 = 0;
/// A producer owns the slot and has not yet committed its element.
const STORING: u8 = 1;
/// A committed element is present.
const FULL: u8 = 2;
/// A consumer owns the slot and has not yet finished reading.
const LOADING: u8 = 3;

/// One ring cell: a four-state tag beside the (plain) element storage.
///
/// The tag cycles `EMPTY -> STORING -> FULL -> LOADING -> EMPTY` forever.
/// Exactly one thread can win each claiming transition, so the value cell
/// is only ever touched by the slot's current owner.
///
/// Slots are deliberately dense (no per-slot padding); the index shuffle in
/// the queue facade keeps neighbouring tickets off each other's cache
/// lines.
#[repr(C)]
struct Slot<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

// Safety: the value cell is only accessed by the thread that won the state
// transition guarding it; T moving between threads requires T: Send.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Producer half of the slot handshake.
    ///
    /// Claims the slot with an `EMPTY -> STORING` CAS (Acquire on success),
    /// writes the element, then publishes with a Release store of `FULL`.
    /// While the slot is still occupied by an element a full ring behind
    /// us, the producer waits here; with `MAX_THROUGHPUT` the wait is a
    /// relaxed re-read loop so the failing CAS does not keep broadcasting
    /// read-for-ownership traffic.
    fn store<const MAX_THROUGHPUT: bool, const SPSC: bool>(&self, value: T) {
        let backoff = Backoff::new();

        if SPSC {
            // Sole producer: the CAS cannot be contended, polling suffices.
            while self.state.load(Ordering::Acquire) != EMPTY {
                backoff.snooze();
            }
        } else {
            while self
                .state
                .compare_exchange(EMPTY, STORING, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                if MAX_THROUGHPUT {
                    while self.state.load(Ordering::Relaxed) != EMPTY {
                        backoff.snooze();
                    }
                } else {
                    backoff.snooze();
                }
            }
        }

        // Safety: winning the claim gives us exclusive access to the cell.
        unsafe { (*self.value.get()).write(value) };
        self.state.store(FULL, Ordering::Release);
    }

    /// Consumer half of the slot handshake, symmetric to [`Slot::store`].
    fn load<const MAX_THROUGHPUT: bool, const SPSC: bool>(&self) -> T {
        let backoff = Backoff::new();

        if SPSC {
            while self.state.load(Ordering::Acquire) != FULL {
                backoff.snooze();
            }
        } else {
            while self
                .state
                .compare_exchange(FULL, LOADING, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                if MAX_THROUGHPUT {
                    while self.state.load(Ordering::Relaxed) != FULL {
                        backoff.snooze();
                    }
                } else {
                    backoff.snooze();
                }
            }
        }

        // Safety: the claim above transfers exclusive access, and the
        // producer's Release store of FULL makes its write visible.
        let value = unsafe { (*self.value.get()).assume_init_read() };
        self.state.store(EMPTY, Ordering::Release);
        value
    }
}

/// Bounded lock-free MPMC queue with state-tagged slots.
///
/// This is the universal variant: it stores any `T: Send` and reserves no
/// element values. Each operation claims a ticket with one fetch-add on a
/// cache-padded cursor, maps it to a slot through the cache-line shuffle,
/// and runs the slot handshake.
///
/// # Type Parameters
///
/// * `T` - The element type (must be `Send`)
/// * `N` - Compile-time capacity (0 = dynamic allocation, >0 = static
///   allocation; static capacities must be powers of two)
/// * `TOTAL_ORDER` - Sequentially consistent cursor advances, yielding a
///   single global order of pushes and pops (default: off, Acquire)
/// * `MAX_THROUGHPUT` - Contended spinners re-read the slot state with a
///   relaxed load before retrying the CAS, avoiding cache-line ping-pong
///   (default: on)
/// * `SPSC` - Exactly one producer and one consumer ever exist; cursors
///   advance with plain load/store and slots skip the CAS (default: off).
///   Driving an SPSC queue from more than one handle per side is a
///   contract violation caught by a debug assertion.
///
/// # Blocking semantics
///
/// `push` never fails: on a full ring the producer has already claimed its
/// ticket and waits inside the slot until the lagging consumer empties it.
/// Symmetrically `pop` waits on an empty ring. `try_push`/`try_pop` claim
/// a ticket through a compare-exchange conditioned on the occupancy, so a
/// failed try-call never moves the cursors and a successful one waits at
/// most for a peer that is mid-transition on the same slot.
pub struct TaggedQueue<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> where
    T: Send,
{
    storage: Storage<Slot<T>, N>,
    cursors: Cursors,
    capacity: usize,
    mask: usize,
    shuffle: u32,
    pub(crate) writers: AtomicUsize,
    pub(crate) readers: AtomicUsize,
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    fmt::Debug for TaggedQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("is_empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}

/// Builder for state-tagged queues.
///
/// Provides a fluent API for constructing queues with validated
/// parameters. The concurrency flags live on the builder's const generics;
/// use [`queue`], [`queue_with_flags`], or [`spsc_queue`] to obtain one.
///
/// # Examples
///
/// ```
/// use ringbolt::{
///     tagged::queue,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, consumer) = queue::<u32>().capacity(64).channels()?;
///
/// producer.push(100)?;
/// assert_eq!(consumer.pop()?, 100);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TaggedBuilder<
    T,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> where
    T: Send,
{
    capacity: Option<usize>,
    _phantom: PhantomData<T>,
}

impl<T, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Default
    for TaggedBuilder<T, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    TaggedBuilder<T, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    /// Create a new queue builder
    pub const fn new() -> Self {
        Self {
            capacity: None,
            _phantom: PhantomData,
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
    ) -> Result<Arc<TaggedQueue<T, 0, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>, QueueError> {
        let capacity = self.capacity.ok_or(QueueError::InvalidCapacity)?;
        Ok(Arc::new(TaggedQueue::new(capacity)?))
    }

    /// Build a static queue with compile-time capacity
    pub fn build_static<const N: usize>(
        self,
    ) -> Result<Arc<TaggedQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>, QueueError> {
        let capacity = self.capacity.unwrap_or(N);
        Ok(Arc::new(TaggedQueue::new(capacity)?))
    }

    /// Create producer/consumer pair
    pub fn channels(
        self,
    ) -> Result<
        (
            Producer<T, 0, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>,
            Consumer<T, 0, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>,
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
            Producer<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>,
            Consumer<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>,
        ),
        QueueError,
    > {
        let queue = self.build_static::<N>()?;
        Ok((queue.producer(), queue.consumer()))
    }
}

/// Convenience function for creating queues with the default flags
/// (Acquire cursor advances, speculative spin on, MPMC).
///
/// # Examples
///
/// ```
/// use ringbolt::{tagged::queue, traits::QueueProducer};
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, _consumer) = queue::<u64>().capacity(128).channels()?;
///
/// producer.push(42)?;
/// # Ok(())
/// # }
/// ```
pub const fn queue<T>() -> TaggedBuilder<T>
where
    T: Send,
{
    TaggedBuilder::new()
}

/// Convenience function for creating queues with explicit flags.
///
/// # Type Parameters
///
/// * `T` - The element type
/// * `TOTAL_ORDER` - Sequentially consistent cursor advances
/// * `MAX_THROUGHPUT` - Speculative relaxed re-read before CAS retries
/// * `SPSC` - Single-producer/single-consumer mode
///
/// # Examples
///
/// ```
/// use ringbolt::{
///     tagged::queue_with_flags,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// // One globally ordered commit sequence across all producers.
/// let (producer, consumer) = queue_with_flags::<u64, true, true, false>()
///     .capacity(8)
///     .channels()?;
///
/// producer.push(1)?;
/// assert_eq!(consumer.pop()?, 1);
/// # Ok(())
/// # }
/// ```
pub const fn queue_with_flags<
    T,
    const TOTAL_ORDER: bool,
    const MAX_THROUGHPUT: bool,
    const SPSC: bool,
>() -> TaggedBuilder<T, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    TaggedBuilder::new()
}

/// Convenience function for the single-producer/single-consumer mode.
///
/// The returned queue replaces cursor fetch-adds with plain load/store and
/// the slot CAS with acquire polling. Exactly one producer handle and one
/// consumer handle may be live at a time; a debug assertion enforces it.
///
/// # Examples
///
/// ```
/// use ringbolt::{
///     tagged::spsc_queue,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, consumer) = spsc_queue::<u32>().capacity(4).channels()?;
///
/// producer.push(5)?;
/// assert_eq!(consumer.pop()?, 5);
/// # Ok(())
/// # }
/// ```
pub const fn spsc_queue<T>() -> TaggedBuilder<T, false, true, true>
where
    T: Send,
{
    TaggedBuilder::new()
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    TaggedQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    /// Create a new queue with the specified capacity
    pub(crate) fn new(capacity: usize) -> Result<Self, QueueError> {
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
            storage: Storage::with(capacity, |_| Slot::new()),
            cursors: Cursors::new(),
            capacity,
            mask: capacity - 1,
            shuffle: shuffle_bits(capacity, size_of::<Slot<T>>(), CACHE_LINE),
            writers: AtomicUsize::new(0),
            readers: AtomicUsize::new(0),
        })
    }

    /// Get the capacity of the queue (the requested capacity rounded up to
    /// a power of two)
    pub const fn capacity(&self) -> usize {
        self.capacity
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
    fn slot(&self, ticket: usize) -> &Slot<T> {
        self.storage.get(remap_index(ticket & self.mask, self.shuffle))
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
    /// Never fails: a producer ahead of the lagging consumer serializes on
    /// it instead of overflowing the ring.
    pub fn push(&self, value: T) -> Result<(), QueueError> {
        self.debug_assert_single_producer();
        let ticket = self.cursors.claim_write::<TOTAL_ORDER, SPSC>();
        self.slot(ticket).store::<MAX_THROUGHPUT, SPSC>(value);
        Ok(())
    }

    /// Try to push a value without waiting for space.
    ///
    /// The occupancy check and the ticket claim are one compare-exchange,
    /// so a failed try-push never disturbs the cursors. A successful claim
    /// can still wait briefly on a slot whose previous consumer is
    /// mid-read; that wait is bounded by the peer's progress.
    pub fn try_push(&self, value: T) -> Result<(), (T, QueueError)> {
        self.debug_assert_single_producer();
        match self.cursors.try_claim_write::<TOTAL_ORDER, SPSC>(self.capacity) {
            Some(ticket) => {
                self.slot(ticket).store::<MAX_THROUGHPUT, SPSC>(value);
                Ok(())
            },
            None => Err((value, QueueError::Full)),
        }
    }

    /// Pop a value, spinning until the matching push commits.
    pub fn pop(&self) -> Result<T, QueueError> {
        self.debug_assert_single_consumer();
        let ticket = self.cursors.claim_read::<TOTAL_ORDER, SPSC>();
        Ok(self.slot(ticket).load::<MAX_THROUGHPUT, SPSC>())
    }

    /// Try to pop a value without waiting for one.
    ///
    /// Strictly non-blocking at the cursor step, like
    /// [`try_push`](Self::try_push); may wait briefly on a slot whose
    /// producer has claimed but not yet committed.
    pub fn try_pop(&self) -> Result<T, QueueError> {
        self.debug_assert_single_consumer();
        match self.cursors.try_claim_read::<TOTAL_ORDER, SPSC>() {
            Some(ticket) => Ok(self.slot(ticket).load::<MAX_THROUGHPUT, SPSC>()),
            None => Err(QueueError::Empty),
        }
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Drop
    for TaggedQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn drop(&mut self) {
        // Exclusive access: release every committed element still in the
        // ring. Transitional states cannot survive their owning thread.
        for index in 0..self.capacity {
            let slot = self.storage.get(index);
            if slot.state.load(Ordering::Relaxed) == FULL {
                unsafe { (*slot.value.get()).assume_init_drop() };
            }
        }
    }
}

// Type aliases for common configurations

/// Convenient type alias for [`TaggedProducerHandle`].
///
/// This simplifies the type signatures when using producer handles with
/// default configuration parameters.
pub type Producer<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> = TaggedProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>;

/// Convenient type alias for [`TaggedConsumerHandle`].
///
/// This simplifies the type signatures when using consumer handles with
/// default configuration parameters.
pub type Consumer<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> = TaggedConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>;

/// Producer handle for the state-tagged queue.
///
/// A lightweight, cloneable handle that allows pushing items to the queue.
/// Multiple producer handles can be created for the same queue, enabling
/// multi-producer scenarios; under `SPSC` a debug assertion rejects a
/// second live handle. Each clone shares the same underlying queue via
/// `Arc`.
pub struct TaggedProducerHandle<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> where
    T: Send,
{
    queue: Arc<TaggedQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>,
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    fmt::Debug for TaggedProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedProducerHandle")
            .field("queue", &self.queue)
            .finish()
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Clone
    for TaggedProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn clone(&self) -> Self {
        self.queue.writers.fetch_add(1, Ordering::Relaxed);
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Drop
    for TaggedProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn drop(&mut self) {
        self.queue.writers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    QueueProducer<T> for TaggedProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn push(&self, value: T) -> Result<(), QueueError> {
        self.queue.push(value)
    }

    fn try_push(&self, value: T) -> Result<(), (T, QueueError)> {
        self.queue.try_push(value)
    }
}

/// Consumer handle for the state-tagged queue.
///
/// A lightweight, cloneable handle that allows popping items from the
/// queue. Multiple consumer handles can be created for the same queue,
/// enabling multi-consumer scenarios; under `SPSC` a debug assertion
/// rejects a second live handle. Each clone shares the same underlying
/// queue via `Arc`.
pub struct TaggedConsumerHandle<
    T,
    const N: usize = 0,
    const TOTAL_ORDER: bool = false,
    const MAX_THROUGHPUT: bool = true,
    const SPSC: bool = false,
> where
    T: Send,
{
    queue: Arc<TaggedQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>,
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    fmt::Debug for TaggedConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedConsumerHandle")
            .field("queue", &self.queue)
            .finish()
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Clone
    for TaggedConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn clone(&self) -> Self {
        self.queue.readers.fetch_add(1, Ordering::Relaxed);
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool> Drop
    for TaggedConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
{
    fn drop(&mut self) {
        self.queue.readers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<T, const N: usize, const TOTAL_ORDER: bool, const MAX_THROUGHPUT: bool, const SPSC: bool>
    QueueConsumer<T> for TaggedConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>
where
    T: Send,
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
    QueueFactory<T> for Arc<TaggedQueue<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>>
where
    T: Send,
{
    type Producer = TaggedProducerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>;
    type Consumer = TaggedConsumerHandle<T, N, TOTAL_ORDER, MAX_THROUGHPUT, SPSC>;

    fn producer(&self) -> Self::Producer {
        self.writers.fetch_add(1, Ordering::Relaxed);
        TaggedProducerHandle {
            queue: self.clone(),
        }
    }

    fn consumer(&self) -> Self::Consumer {
        self.readers.fetch_add(1, Ordering::Relaxed);
        TaggedConsumerHandle {
            queue: self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_basic() {
        let q = queue::<u32>().capacity(8).build().unwrap();

        assert_eq!(q.capacity(), 8);
        assert_eq!(q.len(), 0);

        let (producer, consumer) = q.channel();
        producer.push(10).unwrap();
        assert_eq!(consumer.pop().unwrap(), 10);
    }

    #[test]
    fn static_basic() {
        let q = queue::<u32>().capacity(4).build_static::<4>().unwrap();
        assert_eq!(q.capacity(), 4);

        let (producer, consumer) = q.channel();
        producer.push(7).unwrap();
        assert_eq!(consumer.pop().unwrap(), 7);
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        let q = queue::<u8>().capacity(5).build().unwrap();
        assert_eq!(q.capacity(), 8);
    }

    #[test]
    fn invalid_capacities_are_rejected() {
        assert_eq!(
            queue::<u8>().capacity(0).build().unwrap_err(),
            QueueError::InvalidCapacity
        );
        assert_eq!(
            queue::<u8>().build().unwrap_err(),
            QueueError::InvalidCapacity
        );
        assert_eq!(
            queue::<u8>().capacity(6).build_static::<6>().unwrap_err(),
            QueueError::InvalidCapacity
        );
        assert_eq!(
            queue::<u8>().capacity(8).build_static::<16>().unwrap_err(),
            QueueError::CapacityMismatch
        );
    }

    #[test]
    fn total_order_round_trip_in_order() {
        let q = queue_with_flags::<i32, true, false, false>()
            .capacity(8)
            .build()
            .unwrap();

        for i in 1..=4 {
            q.push(i).unwrap();
        }
        for i in 1..=4 {
            assert_eq!(q.pop().unwrap(), i);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn try_variants_at_the_boundary() {
        let q = queue::<u32>().capacity(2).build().unwrap();

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
    fn failed_try_push_leaves_cursors_untouched() {
        let q = queue::<u32>().capacity(2).build().unwrap();
        q.push(1).unwrap();
        q.push(2).unwrap();

        let before = q.len();
        assert!(q.try_push(3).is_err());
        assert_eq!(q.len(), before);
        assert_eq!(q.pop().unwrap(), 1);
    }

    #[test]
    fn capacity_one_queue() {
        let q = queue::<u64>().capacity(1).build().unwrap();
        assert_eq!(q.capacity(), 1);

        for round in 0..100 {
            q.push(round).unwrap();
            assert!(q.is_full());
            assert_eq!(q.pop().unwrap(), round);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn wrap_around_preserves_fifo() {
        let q = queue::<usize>().capacity(8).build().unwrap();

        for round in 0..10 {
            for i in 0..8 {
                q.push(round * 100 + i).unwrap();
            }
            for i in 0..8 {
                assert_eq!(q.pop().unwrap(), round * 100 + i);
            }
        }
    }

    #[test]
    fn non_copy_elements_move_through() {
        let q = queue::<String>().capacity(4).build().unwrap();
        q.push("first".to_string()).unwrap();
        q.push("second".to_string()).unwrap();
        assert_eq!(q.pop().unwrap(), "first");
        assert_eq!(q.pop().unwrap(), "second");
    }

    #[test]
    fn dropping_queue_releases_elements() {
        use std::sync::atomic::AtomicUsize;

        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let q = queue::<Tracked>().capacity(8).build().unwrap();
            for _ in 0..5 {
                q.push(Tracked(drops.clone())).unwrap();
            }
            let popped = q.pop().unwrap();
            drop(popped);
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn spsc_fill_and_drain() {
        use std::thread;

        let (producer, consumer) = spsc_queue::<u32>().capacity(4).channels().unwrap();

        let push_side = thread::spawn(move || {
            // Spins on a full ring whenever the consumer lags.
            for i in 0..16 {
                producer.push(i).unwrap();
            }
        });

        let pop_side = thread::spawn(move || {
            for i in 0..16 {
                assert_eq!(consumer.pop().unwrap(), i);
            }
            assert!(consumer.is_empty());
        });

        push_side.join().unwrap();
        pop_side.join().unwrap();
    }

    use crate::traits::{QueueConsumer, QueueFactory, QueueProducer};
    use std::{
        collections::HashSet,
        sync::atomic::AtomicUsize,
        time::Instant,
    };
    use tokio::{
        task,
        time::{Duration, sleep},
    };

    /// Multi-producer / multi-consumer stress test: every pushed value is
    /// popped exactly once.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn mpmc_stress_dynamic() {
        let producers = 4usize;
        let consumers = 4usize;
        let items_per_producer = 50_000usize;
        let capacity = 1024usize;

        let total = producers * items_per_producer;

        let (producer, consumer) = queue::<u64>().capacity(capacity).channels().unwrap();

        let seen = Arc::new(tokio::sync::Mutex::new(HashSet::<u64>::with_capacity(
            total,
        )));
        let consumed = Arc::new(AtomicUsize::new(0));

        let mut consumer_handles = Vec::with_capacity(consumers);
        for _ in 0..consumers {
            let seen_cl = seen.clone();
            let consumed_cl = consumed.clone();
            let consumer = consumer.clone();
            let h = task::spawn(async move {
                loop {
                    if consumed_cl.load(Ordering::SeqCst) >= total {
                        break;
                    }
                    match consumer.try_pop() {
                        Ok(val) => {
                            let inserted = seen_cl.lock().await.insert(val);
                            assert!(inserted, "duplicate value observed: {val}");
                            consumed_cl.fetch_add(1, Ordering::SeqCst);
                        },
                        Err(QueueError::Empty) => {
                            task::yield_now().await;
                        },
                        Err(e) => {
                            panic!("unexpected queue error in consumer: {e:?}");
                        },
                    }
                }
            });
            consumer_handles.push(h);
        }

        let mut producer_handles = Vec::with_capacity(producers);
        let start = Instant::now();
        for pid in 0..producers {
            let producer = producer.clone();
            let h = task::spawn(async move {
                for i in 0..items_per_producer {
                    let val = ((pid as u64) << 32) | (i as u64);
                    loop {
                        match producer.try_push(val) {
                            Ok(()) => break,
                            Err((_, QueueError::Full)) => {
                                task::yield_now().await;
                            },
                            Err((_, e)) => {
                                panic!("unexpected queue error in producer: {e:?}");
                            },
                        }
                    }
                }
            });
            producer_handles.push(h);
        }

        for h in producer_handles {
            h.await.expect("producer join");
        }

        while consumed.load(Ordering::SeqCst) < total {
            sleep(Duration::from_millis(1)).await;
        }

        for h in consumer_handles {
            h.await.expect("consumer join");
        }

        let elapsed = start.elapsed();
        let throughput = (total as f64) / elapsed.as_secs_f64();

        let seen_len = { seen.lock().await.len() };
        assert_eq!(seen_len, total, "expected all items consumed once");

        println!(
            "tagged stress: producers={producers} consumers={consumers} items/producer={items_per_producer} capacity={capacity} => total={total} elapsed={elapsed:?} throughput={throughput:.0} ops/sec"
        );
    }
}
