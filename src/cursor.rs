use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The pair of monotonic cursors driving a ring.
///
/// `write` counts initiated pushes, `read` counts initiated pops; their
/// difference is the occupancy. Each cursor sits on its own cache line so
/// producers and consumers do not invalidate each other's line on every
/// claim.
///
/// Cursors are `usize`-wide and only ever advance. On 64-bit targets they
/// cannot wrap within a realistic lifetime; on 32-bit targets the wrap
/// horizon is about 2³² operations per side.
pub(crate) struct Cursors {
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
}

impl Cursors {
    pub(crate) fn new() -> Self {
        Self {
            write: CachePadded::new(AtomicUsize::new(0)),
            read: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Claim the next producer ticket unconditionally, returning the prior
    /// cursor value.
    ///
    /// With `TOTAL_ORDER` the fetch-add is sequentially consistent, giving
    /// a single global order of all cursor advances; otherwise Acquire,
    /// which is enough for the slot handshake but admits reordering between
    /// unrelated push/pop pairs. Under `SPSC` there is no rival producer,
    /// so a relaxed load and store replace the atomic RMW entirely.
    #[inline(always)]
    pub(crate) fn claim_write<const TOTAL_ORDER: bool, const SPSC: bool>(&self) -> usize {
        if SPSC {
            let prior = self.write.load(Ordering::Relaxed);
            self.write.store(prior.wrapping_add(1), Ordering::Relaxed);
            prior
        } else {
            self.write.fetch_add(1, Self::claim_order(TOTAL_ORDER))
        }
    }

    /// Claim the next consumer ticket unconditionally, returning the prior
    /// cursor value.
    #[inline(always)]
    pub(crate) fn claim_read<const TOTAL_ORDER: bool, const SPSC: bool>(&self) -> usize {
        if SPSC {
            let prior = self.read.load(Ordering::Relaxed);
            self.read.store(prior.wrapping_add(1), Ordering::Relaxed);
            prior
        } else {
            self.read.fetch_add(1, Self::claim_order(TOTAL_ORDER))
        }
    }

    /// Claim a producer ticket only while the ring holds fewer than
    /// `n_prime` elements.
    ///
    /// The occupancy check and the advance are one compare-exchange, so a
    /// failed try-push never moves the cursor. A claimed ticket may still
    /// find its slot mid-transition (the previous occupant's consumer has
    /// claimed but not finished); that wait is bounded by the peer's
    /// progress, unlike the unbounded full-queue wait of the blocking
    /// path.
    #[inline]
    pub(crate) fn try_claim_write<const TOTAL_ORDER: bool, const SPSC: bool>(
        &self,
        n_prime: usize,
    ) -> Option<usize> {
        if SPSC {
            let write = self.write.load(Ordering::Relaxed);
            let read = self.read.load(Ordering::Relaxed);
            if write.wrapping_sub(read) as isize >= n_prime as isize {
                return None;
            }
            self.write.store(write.wrapping_add(1), Ordering::Relaxed);
            return Some(write);
        }

        let mut write = self.write.load(Ordering::Relaxed);
        loop {
            let read = self.read.load(Ordering::Relaxed);
            // A negative distance means consumers are parked waiting, so
            // there is certainly room.
            if write.wrapping_sub(read) as isize >= n_prime as isize {
                return None;
            }
            match self.write.compare_exchange_weak(
                write,
                write.wrapping_add(1),
                Self::claim_order(TOTAL_ORDER),
                Ordering::Relaxed,
            ) {
                Ok(prior) => return Some(prior),
                Err(actual) => write = actual,
            }
        }
    }

    /// Claim a consumer ticket only while the ring holds at least one
    /// element; the mirror of [`try_claim_write`](Self::try_claim_write).
    #[inline]
    pub(crate) fn try_claim_read<const TOTAL_ORDER: bool, const SPSC: bool>(
        &self,
    ) -> Option<usize> {
        if SPSC {
            let read = self.read.load(Ordering::Relaxed);
            let write = self.write.load(Ordering::Relaxed);
            if write.wrapping_sub(read) as isize <= 0 {
                return None;
            }
            self.read.store(read.wrapping_add(1), Ordering::Relaxed);
            return Some(read);
        }

        let mut read = self.read.load(Ordering::Relaxed);
        loop {
            let write = self.write.load(Ordering::Relaxed);
            if write.wrapping_sub(read) as isize <= 0 {
                return None;
            }
            match self.read.compare_exchange_weak(
                read,
                read.wrapping_add(1),
                Self::claim_order(TOTAL_ORDER),
                Ordering::Relaxed,
            ) {
                Ok(prior) => return Some(prior),
                Err(actual) => read = actual,
            }
        }
    }

    const fn claim_order(total_order: bool) -> Ordering {
        if total_order {
            Ordering::SeqCst
        } else {
            Ordering::Acquire
        }
    }

    /// Approximate occupancy under relaxed loads.
    ///
    /// A pathological interleaving can observe `read` ahead of `write`;
    /// the negative intermediate is clamped to 0. Advisory only.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Relaxed);
        let diff = write.wrapping_sub(read) as isize;
        if diff < 0 { 0 } else { diff as usize }
    }

    /// Whether the ring appears empty: equal cursors, unmasked.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.write.load(Ordering::Relaxed) == self.read.load(Ordering::Relaxed)
    }

    /// Whether the ring appears full: `write - read >= n_prime` on the
    /// unmasked counters.
    ///
    /// Masking before the comparison would misreport a consumer lagging by
    /// exactly `n_prime` as an empty ring. `>=` rather than `==` because
    /// blocking producers claim tickets past the boundary before parking
    /// in the slot protocol.
    #[inline]
    pub(crate) fn is_full(&self, n_prime: usize) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Relaxed);
        let diff = write.wrapping_sub(read) as isize;
        diff >= 0 && diff as usize >= n_prime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_return_prior_values() {
        let cursors = Cursors::new();
        assert_eq!(cursors.claim_write::<false, false>(), 0);
        assert_eq!(cursors.claim_write::<false, false>(), 1);
        assert_eq!(cursors.claim_read::<false, false>(), 0);
        assert_eq!(cursors.len(), 1);
    }

    #[test]
    fn spsc_claims_advance_without_rmw() {
        let cursors = Cursors::new();
        for expected in 0..8 {
            assert_eq!(cursors.claim_write::<false, true>(), expected);
        }
        for expected in 0..8 {
            assert_eq!(cursors.claim_read::<false, true>(), expected);
        }
        assert!(cursors.is_empty());
    }

    #[test]
    fn try_claims_respect_the_boundaries() {
        let cursors = Cursors::new();
        assert_eq!(cursors.try_claim_read::<false, false>(), None);

        assert_eq!(cursors.try_claim_write::<false, false>(2), Some(0));
        assert_eq!(cursors.try_claim_write::<false, false>(2), Some(1));
        assert_eq!(cursors.try_claim_write::<false, false>(2), None);

        assert_eq!(cursors.try_claim_read::<false, false>(), Some(0));
        assert_eq!(cursors.try_claim_write::<false, false>(2), Some(2));
        assert_eq!(cursors.try_claim_read::<false, false>(), Some(1));
        assert_eq!(cursors.try_claim_read::<false, false>(), Some(2));
        assert_eq!(cursors.try_claim_read::<false, false>(), None);
    }

    #[test]
    fn try_claim_write_sees_parked_consumers_as_room() {
        let cursors = Cursors::new();
        // Two blocking pops parked on an empty ring.
        cursors.claim_read::<false, false>();
        cursors.claim_read::<false, false>();

        // Occupancy is negative, so a bounded ring of 1 still has room for
        // the parked pops plus one committed element.
        assert_eq!(cursors.try_claim_write::<false, false>(1), Some(0));
        assert_eq!(cursors.try_claim_write::<false, false>(1), Some(1));
        assert_eq!(cursors.try_claim_write::<false, false>(1), Some(2));
        assert_eq!(cursors.try_claim_write::<false, false>(1), None);
    }

    #[test]
    fn len_clamps_negative_intermediate() {
        let cursors = Cursors::new();
        // A consumer claim racing ahead of the producer cursor.
        cursors.claim_read::<false, false>();
        assert_eq!(cursors.len(), 0);
        assert!(!cursors.is_full(1));
    }

    #[test]
    fn full_uses_unmasked_distance() {
        let cursors = Cursors::new();
        for _ in 0..4 {
            cursors.claim_write::<true, false>();
        }
        assert!(cursors.is_full(4));
        assert!(!cursors.is_full(8));
        cursors.claim_read::<true, false>();
        assert!(!cursors.is_full(4));
    }
}
