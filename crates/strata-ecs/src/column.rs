//! Raw byte column.
//!
//! A growable, aligned buffer of fixed-size elements whose type is only known
//! by its [`Layout`]. Components are `Copy`, so elements are moved with plain
//! memory copies and never dropped. Values cross the type-erased boundary as
//! [`RawValue`]s, which carry their own layout so size mismatches are caught
//! where the bytes are written.

use std::{alloc::Layout, fmt, marker::PhantomData, ptr::NonNull};

/// A borrowed, type-erased pointer to one component value.
#[derive(Clone, Copy)]
pub struct RawValue<'a> {
    ptr: NonNull<u8>,
    layout: Layout,
    _marker: PhantomData<&'a u8>,
}

impl<'a> RawValue<'a> {
    /// Borrow a typed value.
    #[must_use]
    pub fn of<T>(value: &'a T) -> Self {
        Self {
            ptr: NonNull::from(value).cast(),
            layout: Layout::new::<T>(),
            _marker: PhantomData,
        }
    }

    /// Wrap a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and valid for reads of `layout.size()` bytes for
    /// the lifetime `'a`.
    #[must_use]
    pub const unsafe fn from_raw(ptr: *const u8, layout: Layout) -> Self {
        Self {
            // SAFETY: caller guarantees the pointer is non-null.
            ptr: unsafe { NonNull::new_unchecked(ptr.cast_mut()) },
            layout,
            _marker: PhantomData,
        }
    }

    /// Pointer to the value.
    #[must_use]
    pub const fn as_ptr(self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Layout of the value.
    #[must_use]
    pub const fn layout(self) -> Layout {
        self.layout
    }

    /// Read the value back as `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T`'s layout differs from the recorded one.
    ///
    /// # Safety
    ///
    /// The pointee must be a valid `T`.
    #[must_use]
    pub unsafe fn read<T: Copy>(self) -> T {
        assert_eq!(Layout::new::<T>().size(), self.layout.size(), "layout mismatch reading RawValue");
        // SAFETY: caller guarantees the pointee is a `T`; the read tolerates
        // byte-aligned sources.
        unsafe { std::ptr::read_unaligned(self.ptr.as_ptr().cast::<T>()) }
    }
}

impl fmt::Debug for RawValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawValue")
            .field("ptr", &self.ptr)
            .field("size", &self.layout.size())
            .finish()
    }
}

/// A contiguous array of elements sharing one layout.
pub struct ByteColumn {
    /// Pointer to the data array (aligned dangling while unallocated).
    data: NonNull<u8>,
    /// Number of elements stored.
    len: usize,
    /// Allocated capacity, in elements.
    capacity: usize,
    /// Layout of a single element.
    layout: Layout,
}

// SAFETY: the column owns its allocation and only ever holds `Copy` component
// data, which is `Send + Sync` by the `Component` bound.
unsafe impl Send for ByteColumn {}
unsafe impl Sync for ByteColumn {}

#[cold]
fn capacity_overflow() -> ! {
    panic!("byte column capacity overflow")
}

impl ByteColumn {
    /// Create an empty column for elements of `layout`.
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self {
            // An aligned dangling pointer keeps empty typed views valid.
            data: NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling()),
            len: 0,
            capacity: if layout.size() == 0 { usize::MAX } else { 0 },
            layout,
        }
    }

    /// Create a column with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(layout: Layout, capacity: usize) -> Self {
        let mut column = Self::new(layout);
        column.reserve(capacity);
        column
    }

    /// Number of elements stored.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the column is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated capacity, in elements.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Layout of one element.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.layout.size()
    }

    /// Pointer to the first element.
    #[must_use]
    pub const fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Mutable pointer to the first element.
    #[must_use]
    pub const fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// The element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> RawValue<'_> {
        assert!(index < self.len, "byte column index {index} out of bounds");
        // SAFETY: the element is in bounds and initialised; it lives as long
        // as the shared borrow of the column.
        unsafe { RawValue::from_raw(self.slot_ptr(index), self.layout) }
    }

    /// View the column as a typed slice.
    ///
    /// # Safety
    ///
    /// `T` must have exactly the column's layout and every element must hold
    /// a valid `T`.
    #[must_use]
    pub unsafe fn as_slice<T>(&self) -> &[T] {
        debug_assert_eq!(Layout::new::<T>(), self.layout, "layout mismatch in ByteColumn");
        // SAFETY: caller guarantees layout and validity; `data` is aligned for
        // the column's layout.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr().cast::<T>(), self.len) }
    }

    /// View the column as a mutable typed slice.
    ///
    /// # Safety
    ///
    /// Same as [`Self::as_slice`].
    #[must_use]
    pub unsafe fn as_mut_slice<T>(&mut self) -> &mut [T] {
        debug_assert_eq!(Layout::new::<T>(), self.layout, "layout mismatch in ByteColumn");
        // SAFETY: as above, and the borrow is unique.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr().cast::<T>(), self.len) }
    }

    /// Append one element.
    pub fn push(&mut self, value: RawValue<'_>) {
        self.insert(self.len, value);
    }

    /// Insert one element at `index`, shifting the tail up by one.
    ///
    /// # Panics
    ///
    /// Panics if `index > len` or the value's size differs from the column's.
    pub fn insert(&mut self, index: usize, value: RawValue<'_>) {
        let size = self.layout.size();
        assert_eq!(value.layout().size(), size, "element size mismatch in ByteColumn::insert");
        assert!(index <= self.len, "insert index {index} out of bounds");

        self.reserve(1);
        if size > 0 {
            // SAFETY: capacity covers `len + 1` elements. The tail move uses
            // `copy` because source and destination overlap; the value comes
            // from a different allocation or a live borrow, never the tail.
            unsafe {
                let at = self.data.as_ptr().add(index * size);
                std::ptr::copy(at, at.add(size), (self.len - index) * size);
                std::ptr::copy_nonoverlapping(value.as_ptr(), at, size);
            }
        }
        self.len += 1;
    }

    /// Overwrite the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or the value's size differs.
    pub fn write(&mut self, index: usize, value: RawValue<'_>) {
        let size = self.layout.size();
        assert_eq!(value.layout().size(), size, "element size mismatch in ByteColumn::write");
        assert!(index < self.len, "byte column index {index} out of bounds");
        // SAFETY: the slot is in bounds; `copy` tolerates a value that
        // points into this column.
        unsafe {
            std::ptr::copy(value.as_ptr(), self.data.as_ptr().add(index * size), size);
        }
    }

    /// Swap two elements.
    pub fn swap(&mut self, a: usize, b: usize) {
        debug_assert!(a < self.len && b < self.len, "swap out of bounds");
        let size = self.layout.size();
        if a == b || size == 0 {
            return;
        }
        // SAFETY: both indices are in bounds and distinct, so the ranges do
        // not overlap.
        unsafe {
            std::ptr::swap_nonoverlapping(self.slot_ptr(a), self.slot_ptr(b), size);
        }
    }

    /// Shorten the column to `len` elements.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Remove every element, keeping the allocation.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Reserve capacity for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        let required = self
            .len
            .checked_add(additional)
            .unwrap_or_else(|| capacity_overflow());

        if required <= self.capacity {
            return;
        }

        self.grow(required);
    }

    fn slot_ptr(&self, index: usize) -> *mut u8 {
        // SAFETY: callers only pass indices below `capacity`.
        unsafe { self.data.as_ptr().add(index * self.layout.size()) }
    }

    /// Grow to at least `min_capacity`, doubling like a `Vec`.
    fn grow(&mut self, min_capacity: usize) {
        let new_capacity = self
            .capacity
            .checked_mul(2)
            .unwrap_or(min_capacity)
            .max(min_capacity)
            .max(4);

        let new_layout = self.array_layout(new_capacity);

        // SAFETY: zero-sized columns start with unbounded capacity and never
        // get here, so `new_layout` has a non-zero size.
        let new_data = unsafe {
            if self.capacity == 0 {
                std::alloc::alloc(new_layout)
            } else {
                let old_layout = self.array_layout(self.capacity);
                std::alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size())
            }
        };

        self.data =
            NonNull::new(new_data).unwrap_or_else(|| std::alloc::handle_alloc_error(new_layout));
        self.capacity = new_capacity;
    }

    fn array_layout(&self, count: usize) -> Layout {
        let size = self
            .layout
            .size()
            .checked_mul(count)
            .unwrap_or_else(|| capacity_overflow());
        Layout::from_size_align(size, self.layout.align()).unwrap_or_else(|_| capacity_overflow())
    }
}

impl Clone for ByteColumn {
    fn clone(&self) -> Self {
        let mut column = Self::with_capacity(self.layout, self.len);
        // SAFETY: capacity covers `len` elements and the buffers are distinct.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.data.as_ptr(),
                column.data.as_ptr(),
                self.len * self.layout.size(),
            );
        }
        column.len = self.len;
        column
    }
}

impl Drop for ByteColumn {
    fn drop(&mut self) {
        if self.capacity > 0 && self.layout.size() > 0 {
            let layout = self.array_layout(self.capacity);
            // SAFETY: data was allocated with this layout.
            unsafe {
                std::alloc::dealloc(self.data.as_ptr(), layout);
            }
        }
    }
}

impl fmt::Debug for ByteColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteColumn")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("element_size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}
