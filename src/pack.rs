use crate::{
    QueueError,
    tagged::TaggedQueue,
    traits::{QueueConsumer, QueueFactory, QueueProducer},
};
use crossbeam_utils::Backoff;
use std::{
    fmt,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// A collection of tagged queues that distributes load across multiple
/// rings for better performance.
///
/// `QueuePack` provides horizontal scaling by sharding one logical queue
/// over several independent rings, each with its own cursor pair. This
/// reduces fetch-add contention on the cursors — the same pressure the
/// sharded-cursor design trades against — at the cost of FIFO order across
/// shards.
///
/// # Architecture
///
/// - **Producers**: assigned to a home ring via round-robin on creation
/// - **Consumers**: sweep the rings from a preferred starting point,
///   following the work and rotating after `K` pops from one ring
///
/// # Type Parameters
///
/// * `T` - The element type (must be `Send`)
/// * `G` - Number of rings in the pack (const generic, default: 4)
/// * `K` - Pops between preference rotations (default: 16)
/// * `N` - Individual ring capacity (0 = dynamic, >0 = static, default: 0)
///
/// # Examples
///
/// ```
/// use ringbolt::{
///     pack::queue_pack,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// // Create a pack with 4 rings, each with capacity 256
/// let (producer, consumer) = queue_pack::<u64, 4, 16>().queue_capacity(256).channels()?;
///
/// producer.push(100)?;
/// assert_eq!(consumer.pop()?, 100);
///
/// // Check pack statistics
/// let stats = consumer.scan_stats();
/// println!("Pack has {} rings", stats.len());
/// # Ok(())
/// # }
/// ```
pub struct QueuePack<T, const G: usize = 4, const K: usize = 16, const N: usize = 0>
where
    T: Send,
{
    queues: Vec<Arc<TaggedQueue<T, N>>>,
    writer_counter: AtomicUsize,
    reader_counter: AtomicUsize,
}

impl<T, const G: usize, const K: usize, const N: usize> fmt::Debug for QueuePack<T, G, K, N>
where
    T: Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuePack")
            .field("queue_count", &G)
            .field("rotate_every", &K)
            .field("queue_capacity", &self.queue_capacity())
            .field("total_len", &self.len())
            .field("total_capacity", &self.capacity())
            .finish()
    }
}

/// Builder for creating queue packs.
///
/// The number of rings and the rotation threshold are const generics; the
/// builder configures the capacity of each individual ring.
///
/// # Examples
///
/// ```
/// use ringbolt::{
///     pack::queue_pack,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// // Create a pack with 8 rings, each with capacity 512
/// let (producer, consumer) = queue_pack::<u32, 8, 16>().queue_capacity(512).channels()?;
///
/// producer.push(42)?;
/// assert_eq!(consumer.pop()?, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QueuePackBuilder<T, const G: usize = 4, const K: usize = 16>
where
    T: Send,
{
    queue_capacity: Option<usize>,
    _phantom: PhantomData<T>,
}

impl<T, const G: usize, const K: usize> Default for QueuePackBuilder<T, G, K>
where
    T: Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const G: usize, const K: usize> QueuePackBuilder<T, G, K>
where
    T: Send,
{
    /// Create a new queue pack builder
    pub const fn new() -> Self {
        Self {
            queue_capacity: None,
            _phantom: PhantomData,
        }
    }

    /// Set the capacity of each individual ring
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Build a dynamic queue pack
    pub fn build(self) -> Result<Arc<QueuePack<T, G, K>>, QueueError> {
        let capacity = self.queue_capacity.ok_or(QueueError::InvalidCapacity)?;
        Ok(Arc::new(QueuePack::new(capacity)?))
    }

    /// Build a static queue pack with compile-time ring capacity
    pub fn build_static<const N: usize>(self) -> Result<Arc<QueuePack<T, G, K, N>>, QueueError> {
        let capacity = self.queue_capacity.unwrap_or(N);
        Ok(Arc::new(QueuePack::new(capacity)?))
    }

    /// Create producer/consumer pair
    pub fn channels(self) -> Result<(PackProducer<T, G, K>, PackConsumer<T, G, K>), QueueError> {
        let pack = self.build()?;
        Ok((pack.producer(), pack.consumer()))
    }

    /// Create producer/consumer pair with static capacity
    pub fn channels_static<const N: usize>(
        self,
    ) -> Result<(PackProducer<T, G, K, N>, PackConsumer<T, G, K, N>), QueueError> {
        let pack = self.build_static::<N>()?;
        Ok((pack.producer(), pack.consumer()))
    }
}

/// Convenience function for creating queue packs.
///
/// # Type Parameters
///
/// * `T` - The element type
/// * `G` - Number of rings in the pack (const generic)
/// * `K` - Pops between consumer preference rotations (const generic)
///
/// # Examples
///
/// ```
/// use ringbolt::{
///     pack::queue_pack,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, consumer) = queue_pack::<i64, 4, 16>().queue_capacity(128).channels()?;
///
/// for i in 0..10 {
///     producer.push(i)?;
/// }
///
/// let sum: i64 = (0..10).map(|_| consumer.pop().unwrap()).sum();
/// assert_eq!(sum, 45);
/// # Ok(())
/// # }
/// ```
pub fn queue_pack<T, const G: usize, const K: usize>() -> QueuePackBuilder<T, G, K>
where
    T: Send,
{
    QueuePackBuilder::new()
}

impl<T, const G: usize, const K: usize, const N: usize> QueuePack<T, G, K, N>
where
    T: Send,
{
    /// Create a new queue pack with the specified individual ring capacity
    pub fn new(queue_capacity: usize) -> Result<Self, QueueError> {
        if G == 0 {
            return Err(QueueError::InvalidCapacity);
        }

        let mut queues = Vec::with_capacity(G);
        for _ in 0..G {
            queues.push(Arc::new(TaggedQueue::new(queue_capacity)?));
        }

        Ok(Self {
            queues,
            writer_counter: AtomicUsize::new(0),
            reader_counter: AtomicUsize::new(0),
        })
    }

    /// Get the number of rings in this pack
    pub const fn queue_count() -> usize {
        G
    }

    /// Get the number of pops between consumer preference rotations
    pub const fn rotate_every() -> usize {
        K
    }

    /// Get the capacity of each individual ring
    pub fn queue_capacity(&self) -> usize {
        self.queues[0].capacity()
    }

    /// Get total capacity across all rings
    pub fn capacity(&self) -> usize {
        self.queues.len() * self.queue_capacity()
    }

    /// Get approximate total number of elements across all rings
    pub fn len(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    /// Check if all rings in the pack are empty
    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }

    /// Check if all rings in the pack are full
    pub fn is_full(&self) -> bool {
        self.queues.iter().all(|q| q.is_full())
    }

    /// Get statistics for each ring
    pub fn queue_stats(&self) -> Vec<QueueStats> {
        self.queues
            .iter()
            .enumerate()
            .map(|(index, queue)| QueueStats {
                index,
                len: queue.len(),
                capacity: queue.capacity(),
                is_empty: queue.is_empty(),
                is_full: queue.is_full(),
            })
            .collect()
    }

    /// Try to push to a specific ring by index
    pub fn try_push_to(&self, queue_index: usize, value: T) -> Result<(), (T, QueueError)> {
        if queue_index >= G {
            return Err((value, QueueError::InvalidCapacity));
        }
        self.queues[queue_index].try_push(value)
    }

    /// Try to pop from a specific ring by index
    pub fn try_pop_from(&self, queue_index: usize) -> Result<T, QueueError> {
        if queue_index >= G {
            return Err(QueueError::InvalidCapacity);
        }
        self.queues[queue_index].try_pop()
    }
}

/// Statistics for a single ring within the pack.
///
/// A racy snapshot of a ring's state, useful for monitoring load
/// distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// The index of this ring within the pack (0 to G-1)
    pub index: usize,
    /// Current number of elements in this ring
    pub len: usize,
    /// Maximum capacity of this ring
    pub capacity: usize,
    /// Whether this ring is currently empty
    pub is_empty: bool,
    /// Whether this ring is currently full
    pub is_full: bool,
}

// Type aliases for common configurations

/// Convenient type alias for [`PackProducerHandle`].
///
/// This simplifies the type signatures when using pack producer handles
/// with default configuration parameters (4 rings, rotate every 16 pops,
/// dynamic capacity).
pub type PackProducer<T, const G: usize = 4, const K: usize = 16, const N: usize = 0> =
    PackProducerHandle<T, G, K, N>;

/// Convenient type alias for [`PackConsumerHandle`].
///
/// This simplifies the type signatures when using pack consumer handles
/// with default configuration parameters (4 rings, rotate every 16 pops,
/// dynamic capacity).
pub type PackConsumer<T, const G: usize = 4, const K: usize = 16, const N: usize = 0> =
    PackConsumerHandle<T, G, K, N>;

/// Producer handle for the queue pack.
///
/// Each producer is assigned to a specific ring for cache locality and
/// reduced cursor contention. Producers are assigned via round-robin when
/// created; cloning creates a new producer with the next assignment.
///
/// # Examples
///
/// ```
/// use ringbolt::{pack::queue_pack, traits::QueueProducer};
/// use std::thread;
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, _consumer) = queue_pack::<u64, 4, 16>().queue_capacity(128).channels()?;
///
/// // Each clone gets assigned to a different ring
/// let producers: Vec<_> = (0..4).map(|_| producer.clone()).collect();
///
/// let handles: Vec<_> = producers
///     .into_iter()
///     .enumerate()
///     .map(|(id, p)| {
///         thread::spawn(move || {
///             for i in 0..100 {
///                 p.push((id as u64) * 1000 + i).unwrap();
///             }
///         })
///     })
///     .collect();
///
/// for h in handles {
///     h.join().unwrap();
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PackProducerHandle<T, const G: usize = 4, const K: usize = 16, const N: usize = 0>
where
    T: Send,
{
    pack: Arc<QueuePack<T, G, K, N>>,
    queue_index: usize,
}

impl<T, const G: usize, const K: usize, const N: usize> Clone for PackProducerHandle<T, G, K, N>
where
    T: Send,
{
    fn clone(&self) -> Self {
        // A new producer with the next round-robin assignment.
        self.pack.producer()
    }
}

impl<T, const G: usize, const K: usize, const N: usize> PackProducerHandle<T, G, K, N>
where
    T: Send,
{
    /// Get the index of the ring this producer writes to
    pub const fn queue_index(&self) -> usize {
        self.queue_index
    }

    /// Get statistics for the assigned ring
    pub fn queue_stats(&self) -> QueueStats {
        let queue = &self.pack.queues[self.queue_index];
        QueueStats {
            index: self.queue_index,
            len: queue.len(),
            capacity: queue.capacity(),
            is_empty: queue.is_empty(),
            is_full: queue.is_full(),
        }
    }
}

impl<T, const G: usize, const K: usize, const N: usize> QueueProducer<T>
    for PackProducerHandle<T, G, K, N>
where
    T: Send,
{
    fn push(&self, value: T) -> Result<(), QueueError> {
        self.pack.queues[self.queue_index].push(value)
    }

    fn try_push(&self, value: T) -> Result<(), (T, QueueError)> {
        self.pack.queues[self.queue_index].try_push(value)
    }
}

/// Consumer handle for the queue pack.
///
/// Every pop sweeps the rings once, starting at the consumer's preferred
/// ring. Finding work on another ring moves the preference there; a
/// streak of `K` pops from the same ring advances the preference by one
/// so no ring starves or monopolizes.
///
/// # Examples
///
/// ```
/// use ringbolt::{
///     pack::queue_pack,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, consumer) = queue_pack::<u32, 4, 16>().queue_capacity(1024).channels()?;
///
/// for i in 0..1000 {
///     producer.push(i)?;
/// }
///
/// // Consumer automatically scans all rings
/// let mut sum = 0;
/// for _ in 0..1000 {
///     sum += consumer.pop()?;
/// }
/// assert_eq!(sum, (0..1000).sum());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PackConsumerHandle<T, const G: usize = 4, const K: usize = 16, const N: usize = 0>
where
    T: Send,
{
    pack: Arc<QueuePack<T, G, K, N>>,
    preferred_queue_index: AtomicUsize,
    pop_count: AtomicUsize,
}

impl<T, const G: usize, const K: usize, const N: usize> Clone for PackConsumerHandle<T, G, K, N>
where
    T: Send,
{
    fn clone(&self) -> Self {
        // A new consumer with the next round-robin preference.
        self.pack.consumer()
    }
}

impl<T, const G: usize, const K: usize, const N: usize> PackConsumerHandle<T, G, K, N>
where
    T: Send,
{
    /// Get the preferred ring index for this consumer
    pub fn preferred_queue_index(&self) -> usize {
        self.preferred_queue_index.load(Ordering::Relaxed)
    }

    /// Scan all rings and return statistics
    pub fn scan_stats(&self) -> Vec<QueueStats> {
        self.pack.queue_stats()
    }

    /// One sweep over the rings, starting from the current preference.
    fn scan_pop(&self) -> Result<T, QueueError> {
        let home = self.preferred_queue_index.load(Ordering::Relaxed);

        for offset in 0..G {
            let ring = (home + offset) % G;
            match self.pack.queues[ring].try_pop() {
                Ok(value) => {
                    self.settle_preference(ring, offset);
                    return Ok(value);
                },
                Err(QueueError::Empty) => {},
                Err(e) => return Err(e),
            }
        }

        Err(QueueError::Empty)
    }

    /// Preference bookkeeping after a successful pop.
    ///
    /// A hit away from the home ring adopts that ring; a streak of `K`
    /// hits on the home ring advances the preference by one so a busy
    /// ring cannot monopolize this consumer.
    fn settle_preference(&self, ring: usize, offset: usize) {
        if offset != 0 {
            self.preferred_queue_index.store(ring, Ordering::Relaxed);
            self.pop_count.store(1, Ordering::Relaxed);
            return;
        }
        let streak = self.pop_count.fetch_add(1, Ordering::Relaxed) + 1;
        if streak >= K {
            self.pop_count.store(0, Ordering::Relaxed);
            self.preferred_queue_index
                .store((ring + 1) % G, Ordering::Relaxed);
        }
    }
}

impl<T, const G: usize, const K: usize, const N: usize> QueueConsumer<T>
    for PackConsumerHandle<T, G, K, N>
where
    T: Send,
{
    fn pop(&self) -> Result<T, QueueError> {
        let backoff = Backoff::new();
        loop {
            match self.scan_pop() {
                Ok(value) => return Ok(value),
                Err(QueueError::Empty) => backoff.snooze(),
                Err(e) => return Err(e),
            }
        }
    }

    fn try_pop(&self) -> Result<T, QueueError> {
        self.scan_pop()
    }

    fn is_empty(&self) -> bool {
        self.pack.is_empty()
    }

    fn size(&self) -> usize {
        self.pack.len()
    }
}

impl<T, const G: usize, const K: usize, const N: usize> QueueFactory<T>
    for Arc<QueuePack<T, G, K, N>>
where
    T: Send,
{
    type Producer = PackProducerHandle<T, G, K, N>;
    type Consumer = PackConsumerHandle<T, G, K, N>;

    fn producer(&self) -> Self::Producer {
        let assignment = self.writer_counter.fetch_add(1, Ordering::Relaxed) % G;
        PackProducerHandle {
            pack: self.clone(),
            queue_index: assignment,
        }
    }

    fn consumer(&self) -> Self::Consumer {
        let assignment = self.reader_counter.fetch_add(1, Ordering::Relaxed) % G;
        PackConsumerHandle {
            pack: self.clone(),
            preferred_queue_index: AtomicUsize::new(assignment),
            pop_count: AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_push_pop() {
        let (producer, consumer) = queue_pack::<u32, 4, 16>()
            .queue_capacity(16)
            .channels()
            .unwrap();

        producer.push(42).unwrap();
        assert_eq!(consumer.pop().unwrap(), 42);
        assert!(consumer.is_empty());
    }

    #[test]
    fn producers_round_robin_across_rings() {
        let pack = queue_pack::<u32, 4, 16>()
            .queue_capacity(16)
            .build()
            .unwrap();

        let assignments: Vec<usize> = (0..8).map(|_| pack.producer().queue_index()).collect();
        assert_eq!(assignments, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn consumer_scans_other_rings() {
        let pack = queue_pack::<u32, 4, 16>()
            .queue_capacity(16)
            .build()
            .unwrap();

        // Deposit directly into ring 2; a consumer preferring ring 0 must
        // still find it.
        pack.try_push_to(2, 99).unwrap();
        let consumer = pack.consumer();
        assert_eq!(consumer.preferred_queue_index(), 0);
        assert_eq!(consumer.try_pop().unwrap(), 99);
        assert_eq!(consumer.preferred_queue_index(), 2);
    }

    #[test]
    fn stats_reflect_distribution() {
        let pack = queue_pack::<u32, 2, 16>()
            .queue_capacity(8)
            .build()
            .unwrap();

        pack.try_push_to(0, 1).unwrap();
        pack.try_push_to(0, 2).unwrap();
        pack.try_push_to(1, 3).unwrap();

        let stats = pack.queue_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].len, 2);
        assert_eq!(stats[1].len, 1);
        assert_eq!(pack.len(), 3);
        assert!(!pack.is_empty());
        assert!(!pack.is_full());
    }

    #[test]
    fn out_of_range_ring_is_rejected() {
        let pack = queue_pack::<u32, 2, 16>()
            .queue_capacity(8)
            .build()
            .unwrap();

        assert!(matches!(
            pack.try_push_to(2, 1),
            Err((1, QueueError::InvalidCapacity))
        ));
        assert_eq!(pack.try_pop_from(2), Err(QueueError::InvalidCapacity));
    }

    #[test]
    fn all_values_survive_the_scan() {
        let (producer, consumer) = queue_pack::<u64, 4, 4>()
            .queue_capacity(64)
            .channels()
            .unwrap();

        // Spread pushes over all rings via cloned producers.
        let producers: Vec<_> = (0..4).map(|_| producer.clone()).collect();
        for (ring, p) in producers.iter().enumerate() {
            for i in 0..32u64 {
                p.push((ring as u64) * 100 + i).unwrap();
            }
        }

        let mut got = Vec::new();
        for _ in 0..4 * 32 {
            got.push(consumer.pop().unwrap());
        }
        got.sort_unstable();
        got.dedup();
        assert_eq!(got.len(), 4 * 32);
        assert!(consumer.is_empty());
    }

    #[test]
    fn threaded_pack_smoke() {
        use std::thread;

        let (producer, consumer) = queue_pack::<u64, 2, 8>()
            .queue_capacity(64)
            .channels()
            .unwrap();

        let total = 10_000u64;
        let push_side = {
            let producer = producer.clone();
            thread::spawn(move || {
                for i in 0..total {
                    producer.push(i).unwrap();
                }
            })
        };

        let pop_side = thread::spawn(move || {
            let mut sum = 0u64;
            for _ in 0..total {
                sum += consumer.pop().unwrap();
            }
            sum
        });

        push_side.join().unwrap();
        let sum = pop_side.join().unwrap();
        assert_eq!(sum, total * (total - 1) / 2);
    }
}
