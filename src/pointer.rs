use crate::{
    QueueError,
    sentinel::{SentinelBuilder, SentinelQueue, sentinel_queue},
    traits::{QueueConsumer, QueueFactory, QueueProducer},
};
use std::{fmt, marker::PhantomData, sync::Arc};

/// A lock-free MPMC queue that stores `Arc<T>` values by converting them to
/// raw pointers internally.
///
/// This queue enables storing non-`Copy` types while keeping the
/// single-atomic slot protocol of the nil-sentinel variant. It achieves
/// this by:
/// 1. Converting `Arc<T>` to raw pointers (`usize`) for storage
/// 2. Moving the pointers through a [`SentinelQueue<usize>`] whose nil is
///    the null pointer — `Arc::into_raw` never yields null, so no
///    legitimate element collides with the sentinel
/// 3. Reconstructing `Arc<T>` on retrieval
///
/// # Memory Management
///
/// The queue properly manages `Arc` reference counts:
/// - `push()` consumes an `Arc<T>` and converts it to a raw pointer
/// - `pop()` reconstructs the `Arc<T>` from the raw pointer
/// - dropping the queue drains and releases any elements still inside
///
/// # Examples
///
/// ```
/// use ringbolt::pointer::pointer_queue;
/// use std::sync::Arc;
///
/// #[derive(Debug, PartialEq)]
/// struct Data {
///     id: u64,
///     payload: Vec<u8>,
/// }
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// use ringbolt::traits::{QueueConsumer, QueueProducer};
/// let (producer, consumer) = pointer_queue::<Data>().capacity(128).channels()?;
///
/// let data = Arc::new(Data {
///     id: 1,
///     payload: vec![1, 2, 3],
/// });
///
/// producer.push(data.clone())?;
/// assert_eq!(consumer.pop()?, data);
/// # Ok(())
/// # }
/// ```
pub struct PointerQueue<T, const N: usize = 0>
where
    T: Send + Sync,
{
    queue: Arc<SentinelQueue<usize, N>>,
    _phantom: PhantomData<T>,
}

impl<T, const N: usize> fmt::Debug for PointerQueue<T, N>
where
    T: Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

/// Builder for pointer queues.
///
/// Wraps the underlying `SentinelBuilder<usize>` (nil = null) to provide
/// type-safe construction of queues that store `Arc<T>`.
///
/// # Examples
///
/// ```
/// use ringbolt::pointer::pointer_queue;
/// use std::sync::Arc;
///
/// #[derive(Clone)]
/// struct Message {
///     text: String,
/// }
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// use ringbolt::traits::QueueProducer;
/// let (producer, _consumer) = pointer_queue::<Message>().capacity(256).channels()?;
///
/// let msg = Arc::new(Message {
///     text: "Hello".to_string(),
/// });
/// producer.push(msg)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PointerQueueBuilder<T>
where
    T: Send + Sync,
{
    inner: SentinelBuilder<usize>,
    _phantom: PhantomData<T>,
}

impl<T> Default for PointerQueueBuilder<T>
where
    T: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PointerQueueBuilder<T>
where
    T: Send + Sync,
{
    /// Create a new pointer queue builder
    pub const fn new() -> Self {
        Self {
            inner: sentinel_queue::<usize>(0),
            _phantom: PhantomData,
        }
    }

    /// Set the queue capacity (rounded up to the next power of two)
    #[must_use]
    pub const fn capacity(mut self, cap: usize) -> Self {
        self.inner = self.inner.capacity(cap);
        self
    }

    /// Build a dynamic pointer queue
    pub fn build(self) -> Result<Arc<PointerQueue<T>>, QueueError> {
        let queue = self.inner.build()?;
        Ok(Arc::new(PointerQueue {
            queue,
            _phantom: PhantomData,
        }))
    }

    /// Build a static pointer queue with compile-time capacity
    pub fn build_static<const N: usize>(self) -> Result<Arc<PointerQueue<T, N>>, QueueError> {
        let queue = self.inner.build_static::<N>()?;
        Ok(Arc::new(PointerQueue {
            queue,
            _phantom: PhantomData,
        }))
    }

    /// Create producer/consumer pair
    pub fn channels(self) -> Result<(PointerProducer<T>, PointerConsumer<T>), QueueError> {
        let queue = self.build()?;
        Ok((queue.producer(), queue.consumer()))
    }

    /// Create producer/consumer pair with static capacity
    pub fn channels_static<const N: usize>(
        self,
    ) -> Result<(PointerProducer<T, N>, PointerConsumer<T, N>), QueueError> {
        let queue = self.build_static::<N>()?;
        Ok((queue.producer(), queue.consumer()))
    }
}

/// Convenience function for creating pointer queues.
///
/// This is the primary entry point for creating `Arc`-based MPMC queues.
/// Returns a builder that allows configuring capacity.
///
/// # Examples
///
/// ```
/// use ringbolt::pointer::pointer_queue;
/// use std::sync::Arc;
///
/// #[derive(Debug, PartialEq)]
/// struct Task {
///     id: usize,
///     data: Vec<u8>,
/// }
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// use ringbolt::traits::{QueueConsumer, QueueProducer};
/// let (producer, consumer) = pointer_queue::<Task>().capacity(512).channels()?;
///
/// let task = Arc::new(Task {
///     id: 1,
///     data: vec![0; 100],
/// });
/// producer.push(task.clone())?;
/// assert_eq!(consumer.pop()?, task);
/// # Ok(())
/// # }
/// ```
pub const fn pointer_queue<T>() -> PointerQueueBuilder<T>
where
    T: Send + Sync,
{
    PointerQueueBuilder::new()
}

impl<T, const N: usize> PointerQueue<T, N>
where
    T: Send + Sync,
{
    /// Get the capacity of the queue
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Get the approximate number of elements in the queue
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue appears empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if the queue appears full
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Try to push an Arc without waiting for space
    pub fn try_push(&self, arc: Arc<T>) -> Result<(), (Arc<T>, QueueError)> {
        let raw_ptr = Arc::into_raw(arc) as usize;

        match self.queue.try_push(raw_ptr) {
            Ok(()) => Ok(()),
            Err((ptr, err)) => {
                // Reconstruct the Arc to avoid leaking.
                let recovered = unsafe { Arc::from_raw(ptr as *const T) };
                Err((recovered, err))
            },
        }
    }

    /// Push an Arc, spinning until a slot frees up
    pub fn push(&self, arc: Arc<T>) -> Result<(), QueueError> {
        // Arc::into_raw never returns null, so the sentinel check in the
        // underlying queue cannot fire.
        let raw_ptr = Arc::into_raw(arc) as usize;
        self.queue.push(raw_ptr)
    }

    /// Try to pop an Arc without waiting for one
    pub fn try_pop(&self) -> Result<Arc<T>, QueueError> {
        match self.queue.try_pop() {
            Ok(raw_ptr) => {
                let arc = unsafe { Arc::from_raw(raw_ptr as *const T) };
                Ok(arc)
            },
            Err(e) => Err(e),
        }
    }

    /// Pop an Arc, spinning until the matching push commits
    pub fn pop(&self) -> Result<Arc<T>, QueueError> {
        match self.queue.pop() {
            Ok(raw_ptr) => {
                let arc = unsafe { Arc::from_raw(raw_ptr as *const T) };
                Ok(arc)
            },
            Err(e) => Err(e),
        }
    }
}

// Type aliases for common configurations

/// Convenient type alias for [`PointerProducerHandle`].
///
/// This simplifies the type signatures when using pointer queue producer
/// handles with default configuration parameters.
pub type PointerProducer<T, const N: usize = 0> = PointerProducerHandle<T, N>;

/// Convenient type alias for [`PointerConsumerHandle`].
///
/// This simplifies the type signatures when using pointer queue consumer
/// handles with default configuration parameters.
pub type PointerConsumer<T, const N: usize = 0> = PointerConsumerHandle<T, N>;

/// Producer handle for the pointer queue.
///
/// A lightweight, cloneable handle that allows pushing `Arc<T>` items to
/// the queue. Multiple producer handles can be created for the same queue,
/// enabling multi-producer scenarios.
///
/// # Examples
///
/// ```
/// use ringbolt::{pointer::pointer_queue, traits::QueueProducer};
/// use std::{sync::Arc, thread};
///
/// struct Event {
///     id: u64,
///     message: String,
/// }
///
/// # fn main() -> Result<(), ringbolt::QueueError> {
/// let (producer, _consumer) = pointer_queue::<Event>().capacity(256).channels()?;
///
/// // Clone producer for another thread
/// let producer2 = producer.clone();
/// let handle = thread::spawn(move || {
///     let event = Arc::new(Event {
///         id: 1,
///         message: "Hello".to_string(),
///     });
///     producer2.push(event).unwrap();
/// });
///
/// handle.join().unwrap();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PointerProducerHandle<T, const N: usize = 0>
where
    T: Send + Sync,
{
    queue: Arc<PointerQueue<T, N>>,
}

impl<T, const N: usize> Clone for PointerProducerHandle<T, N>
where
    T: Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T, const N: usize> QueueProducer<Arc<T>> for PointerProducerHandle<T, N>
where
    T: Send + Sync,
{
    fn push(&self, arc: Arc<T>) -> Result<(), QueueError> {
        self.queue.push(arc)
    }

    fn try_push(&self, arc: Arc<T>) -> Result<(), (Arc<T>, QueueError)> {
        self.queue.try_push(arc)
    }
}

/// Consumer handle for the pointer queue.
///
/// A lightweight, cloneable handle that allows popping `Arc<T>` items from
/// the queue. Multiple consumer handles can be created for the same queue,
/// enabling multi-consumer scenarios. All operations properly manage `Arc`
/// reference counts.
#[derive(Debug)]
pub struct PointerConsumerHandle<T, const N: usize = 0>
where
    T: Send + Sync,
{
    queue: Arc<PointerQueue<T, N>>,
}

impl<T, const N: usize> Clone for PointerConsumerHandle<T, N>
where
    T: Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T, const N: usize> QueueConsumer<Arc<T>> for PointerConsumerHandle<T, N>
where
    T: Send + Sync,
{
    fn pop(&self) -> Result<Arc<T>, QueueError> {
        self.queue.pop()
    }

    fn try_pop(&self) -> Result<Arc<T>, QueueError> {
        self.queue.try_pop()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}

impl<T, const N: usize> QueueFactory<Arc<T>> for Arc<PointerQueue<T, N>>
where
    T: Send + Sync,
{
    type Producer = PointerProducerHandle<T, N>;
    type Consumer = PointerConsumerHandle<T, N>;

    fn producer(&self) -> Self::Producer {
        PointerProducerHandle {
            queue: self.clone(),
        }
    }

    fn consumer(&self) -> Self::Consumer {
        PointerConsumerHandle {
            queue: self.clone(),
        }
    }
}

// Safety: the queue only stores raw pointers derived from Arc<T> and
// manages ownership correctly.
unsafe impl<T, const N: usize> Send for PointerQueue<T, N> where T: Send + Sync {}
unsafe impl<T, const N: usize> Sync for PointerQueue<T, N> where T: Send + Sync {}

impl<T, const N: usize> Drop for PointerQueue<T, N>
where
    T: Send + Sync,
{
    fn drop(&mut self) {
        // Clean up remaining items
        while self.try_pop().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Instant,
    };

    #[derive(Debug, Clone, PartialEq)]
    struct LargeData {
        id: u64,
        data: Vec<u8>,
        name: String,
    }

    impl LargeData {
        fn new(id: u64, size: usize) -> Self {
            Self {
                id,
                data: vec![0u8; size],
                name: format!("item_{id}"),
            }
        }
    }

    #[test]
    fn test_builder_pattern() {
        let queue = pointer_queue::<LargeData>().capacity(16).build().unwrap();

        assert_eq!(queue.capacity(), 16);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_channels() {
        let (producer, consumer) = pointer_queue::<LargeData>().capacity(8).channels().unwrap();

        let data1 = Arc::new(LargeData::new(1, 1024));
        let data2 = Arc::new(LargeData::new(2, 2048));

        producer.push(data1.clone()).unwrap();
        producer.push(data2.clone()).unwrap();

        let popped1 = consumer.pop().unwrap();
        let popped2 = consumer.pop().unwrap();

        assert_eq!(*popped1, *data1);
        assert_eq!(*popped2, *data2);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_try_operations() {
        let queue = pointer_queue::<LargeData>().capacity(2).build().unwrap();

        let data1 = Arc::new(LargeData::new(1, 128));
        let data2 = Arc::new(LargeData::new(2, 128));
        let data3 = Arc::new(LargeData::new(3, 128));

        assert!(queue.try_push(data1.clone()).is_ok());
        assert!(queue.try_push(data2).is_ok());

        assert!(queue.is_full());

        // Next push should fail and return the Arc
        match queue.try_push(data3.clone()) {
            Err((returned_arc, QueueError::Full)) => {
                assert_eq!(*returned_arc, *data3);
            },
            _ => panic!("Expected full queue error"),
        }

        let popped = queue.try_pop().unwrap();
        assert_eq!(*popped, *data1);
    }

    #[test]
    fn test_reference_counting() {
        let queue = pointer_queue::<LargeData>().capacity(4).build().unwrap();

        let data = Arc::new(LargeData::new(123, 64));

        assert_eq!(Arc::strong_count(&data), 1);

        queue.push(data.clone()).unwrap();

        // After push, queue owns one reference, we still have one
        assert_eq!(Arc::strong_count(&data), 2);

        let popped = queue.pop().unwrap();

        // Still 2: original + popped
        assert_eq!(Arc::strong_count(&data), 2);

        drop(popped);

        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[test]
    fn test_drop_drains_unread_values() {
        let data = Arc::new(LargeData::new(7, 32));
        {
            let queue = pointer_queue::<LargeData>().capacity(4).build().unwrap();
            queue.push(data.clone()).unwrap();
            assert_eq!(Arc::strong_count(&data), 2);
        }
        // The queue released its reference on drop.
        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stress_test() {
        const CAPACITY: usize = 128;
        const PRODUCERS: usize = 2;
        const CONSUMERS: usize = 2;
        const ITEMS_PER_PRODUCER: usize = 10_000;

        let (producer, consumer) = pointer_queue::<LargeData>()
            .capacity(CAPACITY)
            .channels()
            .unwrap();

        let total_items = PRODUCERS * ITEMS_PER_PRODUCER;
        let consumed_count = Arc::new(AtomicUsize::new(0));

        let mut consumer_handles = Vec::new();
        for _ in 0..CONSUMERS {
            let consumer = consumer.clone();
            let consumed_clone = consumed_count.clone();

            let handle = tokio::task::spawn(async move {
                loop {
                    if consumed_clone.load(Ordering::SeqCst) >= total_items {
                        break;
                    }

                    match consumer.try_pop() {
                        Ok(_data) => {
                            consumed_clone.fetch_add(1, Ordering::SeqCst);
                        },
                        Err(QueueError::Empty) => {
                            tokio::task::yield_now().await;
                        },
                        Err(e) => panic!("Unexpected error: {e:?}"),
                    }
                }
            });
            consumer_handles.push(handle);
        }

        let mut producer_handles = Vec::new();
        let start = Instant::now();

        for producer_id in 0..PRODUCERS {
            let producer = producer.clone();

            let handle = tokio::task::spawn(async move {
                for item_id in 0..ITEMS_PER_PRODUCER {
                    let data = Arc::new(LargeData::new(
                        (producer_id * ITEMS_PER_PRODUCER + item_id) as u64,
                        64,
                    ));

                    loop {
                        match producer.try_push(data.clone()) {
                            Ok(()) => break,
                            Err((_, QueueError::Full)) => {
                                tokio::task::yield_now().await;
                            },
                            Err((_, e)) => panic!("Unexpected error: {e:?}"),
                        }
                    }
                }
            });
            producer_handles.push(handle);
        }

        for handle in producer_handles {
            handle.await.unwrap();
        }

        while consumed_count.load(Ordering::SeqCst) < total_items {
            tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        }

        for handle in consumer_handles {
            handle.await.unwrap();
        }

        let elapsed = start.elapsed();
        let throughput = (total_items as f64) / elapsed.as_secs_f64();

        println!(
            "Pointer queue stress test: {PRODUCERS} producers, {CONSUMERS} consumers, {ITEMS_PER_PRODUCER} items each = {total_items} total in {elapsed:?} ({throughput:.0} ops/sec)"
        );

        assert_eq!(consumed_count.load(Ordering::SeqCst), total_items);
    }
}
