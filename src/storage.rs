use crossbeam_utils::CachePadded;
use std::mem::ManuallyDrop;
use std::ptr;

/// One cache line worth of backing memory.
///
/// The dynamic slot buffer is allocated as a `Vec` of these so the array
/// base lands on a cache-line boundary without padding individual slots.
#[cfg(any(target_arch = "aarch64", target_arch = "powerpc64"))]
#[repr(C, align(128))]
struct CacheLine {
    _pad: [u8; 128],
}

/// One cache line worth of backing memory.
#[cfg(not(any(target_arch = "aarch64", target_arch = "powerpc64")))]
#[repr(C, align(64))]
struct CacheLine {
    _pad: [u8; 64],
}

/// Dense, cache-line-aligned heap buffer of slot cells.
///
/// Backed by a `Vec<CacheLine>` whose buffer is reinterpreted as slots; the
/// `Vec` is reconstructed with length 0 on drop to release the allocation
/// with the layout it was created with.
pub(crate) struct AlignedBuf<S> {
    ptr: *mut S,
    len: usize,
    blocks: usize,
}

impl<S> AlignedBuf<S> {
    fn with(len: usize, mut init: impl FnMut(usize) -> S) -> Self {
        const {
            assert!(size_of::<S>() > 0, "slot cells are never zero-sized");
            assert!(align_of::<S>() <= align_of::<CacheLine>());
        }

        let blocks = (len * size_of::<S>()).div_ceil(size_of::<CacheLine>()).max(1);
        let mut vec = ManuallyDrop::new(Vec::<CacheLine>::with_capacity(blocks));
        let ptr = vec.as_mut_ptr().cast::<S>();
        for index in 0..len {
            // Safety: index < len and len * size_of::<S>() bytes fit in the
            // reserved blocks.
            unsafe { ptr.add(index).write(init(index)) };
        }

        Self { ptr, len, blocks }
    }

    #[inline(always)]
    fn get(&self, index: usize) -> &S {
        debug_assert!(index < self.len);
        // Safety: every index below len was initialized in `with` and the
        // buffer lives as long as self.
        unsafe { &*self.ptr.add(index) }
    }
}

// Safety: the buffer is an owned allocation of S cells; transferring or
// sharing it is exactly transferring or sharing those cells.
unsafe impl<S: Send> Send for AlignedBuf<S> {}
unsafe impl<S: Sync> Sync for AlignedBuf<S> {}

impl<S> Drop for AlignedBuf<S> {
    fn drop(&mut self) {
        unsafe {
            for index in 0..self.len {
                ptr::drop_in_place(self.ptr.add(index));
            }
            // Reclaim the allocation under its original CacheLine layout.
            let _ = Vec::from_raw_parts(self.ptr.cast::<CacheLine>(), 0, self.blocks);
        }
    }
}

/// Slot storage that can be either statically or dynamically sized.
///
/// The const generic `N` selects the arm:
/// - `N = 0`: dynamic allocation at construction time
/// - `N > 0`: the slot array is embedded in the queue itself
///
/// Both arms start on a cache-line boundary: the static arm through its
/// `CachePadded` wrapper, the dynamic arm through its block allocation.
pub(crate) enum Storage<S, const N: usize> {
    /// Compile-time sized slot array, no heap indirection.
    Static(CachePadded<[S; N]>),
    /// Runtime sized slot buffer.
    Dynamic(AlignedBuf<S>),
}

impl<S, const N: usize> Storage<S, N> {
    /// Build storage for `len` slots, initializing each with `init`.
    ///
    /// Callers guarantee `len == N` whenever `N > 0`.
    pub(crate) fn with(len: usize, init: impl FnMut(usize) -> S) -> Self {
        if N > 0 {
            debug_assert_eq!(len, N);
            Self::Static(CachePadded::new(std::array::from_fn(init)))
        } else {
            Self::Dynamic(AlignedBuf::with(len, init))
        }
    }

    /// Shared reference to the slot cell at `index`.
    #[inline(always)]
    pub(crate) fn get(&self, index: usize) -> &S {
        match self {
            Self::Static(cells) => &cells[index],
            Self::Dynamic(buf) => buf.get(index),
        }
    }
}
