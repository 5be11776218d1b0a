use crate::QueueError;

/// Trait for queue producers that can push items into a queue.
///
/// This trait provides a consistent interface for all producer types,
/// whether they're direct queue references, dedicated producer handles,
/// or pack-based producers.
pub trait QueueProducer<T> {
    /// Push a value into the queue, spinning until a slot frees up.
    ///
    /// # Arguments
    /// * `value` - The value to push
    ///
    /// # Returns
    /// `Ok(())` once the value is committed. Queues with a reserved
    /// sentinel reject the sentinel value itself; no other failure exists.
    fn push(&self, value: T) -> Result<(), QueueError>;

    /// Push a value into the queue without waiting for space.
    ///
    /// # Arguments
    /// * `value` - The value to push
    ///
    /// # Returns
    /// `Ok(())` on success, or the value handed back together with the
    /// `QueueError` when the queue is full or the value is reserved.
    fn try_push(&self, value: T) -> Result<(), (T, QueueError)>;
}

/// Trait for queue consumers that can pop items from a queue.
///
/// This trait provides a consistent interface for all consumer types,
/// whether they're direct queue references, dedicated consumer handles,
/// or pack-based consumers.
pub trait QueueConsumer<T> {
    /// Pop a value from the queue, spinning until one is available.
    ///
    /// # Returns
    /// The popped value; blocks (spins) on an empty queue until a producer
    /// commits an element.
    fn pop(&self) -> Result<T, QueueError>;

    /// Pop a value from the queue without waiting for one.
    ///
    /// # Returns
    /// The popped value on success, or `QueueError::Empty` if the queue is
    /// empty.
    fn try_pop(&self) -> Result<T, QueueError>;

    /// Check if the queue appears empty.
    /// Note: In concurrent scenarios, this may race with other operations.
    ///
    /// # Returns
    /// `true` if the queue appears empty
    fn is_empty(&self) -> bool;

    /// Get approximate queue size.
    /// Note: In concurrent scenarios, this may not be exact.
    ///
    /// # Returns
    /// Approximate number of elements in the queue
    fn size(&self) -> usize;
}

/// Trait for queues that can create producers and consumers.
///
/// This provides a consistent API for obtaining producer and consumer
/// handles across all queue flavors.
pub trait QueueFactory<T> {
    /// The type of producers this queue creates
    type Producer: QueueProducer<T>;

    /// The type of consumers this queue creates
    type Consumer: QueueConsumer<T>;

    /// Create both producer and consumer handles in one call.
    ///
    /// This is a convenience method equivalent to calling both `producer()`
    /// and `consumer()`.
    ///
    /// # Returns
    /// A tuple containing `(producer, consumer)` handles
    fn channel(&self) -> (Self::Producer, Self::Consumer) {
        (self.producer(), self.consumer())
    }

    /// Create a new producer handle for this queue.
    ///
    /// # Returns
    /// A producer that can push items to this queue
    fn producer(&self) -> Self::Producer;

    /// Create a new consumer handle for this queue.
    ///
    /// # Returns
    /// A consumer that can pop items from this queue
    fn consumer(&self) -> Self::Consumer;
}
