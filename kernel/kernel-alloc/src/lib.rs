//! # Physical Memory Allocation for the Kernel
//!
//! This crate provides the concrete [`memprotect::arch::PhysFrameAlloc`] and
//! [`memprotect::arch::PhysMapper`] implementations that `memprotect` and
//! `kernel-pmp` are generic over. It owns no paging logic itself — that lives
//! in `memprotect` (MMU targets) and `kernel-pmp` (no-MMU targets) — it only
//! answers "where do free frames come from" and "how do I touch a physical
//! address from kernel code".
//!
//! ## Core Components
//!
//! ### Physical Frame Allocator ([`frame_alloc`])
//!
//! Manages the allocation and deallocation of 4KiB physical memory frames:
//! * **Bitmap Management**: Efficient tracking of free/used frames using bit arrays
//! * **No-Heap Design**: Self-contained implementation requiring no dynamic allocation
//! * **Fixed Region**: Manages a predefined region of physical memory (currently 64 MiB)
//! * **Early Boot Support**: Suitable for use before full memory management is available
//!
//! ### Physical Mapper ([`phys_mapper`])
//!
//! Provides safe conversion between physical addresses and virtual pointers:
//! * **HHDM Support**: Higher Half Direct Mapping for efficient address translation
//! * **Safe Abstractions**: Type-safe pointer conversions with lifetime management
//! * **Page Table Access**: Enables manipulation of physical page table structures
//!
//! ## Usage Patterns
//!
//! ```rust
//! use kernel_alloc::frame_alloc::BitmapFrameAlloc;
//! use memprotect::arch::PhysFrameAlloc;
//!
//! let mut allocator = BitmapFrameAlloc::new();
//! if let Some(frame) = allocator.alloc_frame(false) {
//!     // Use the physical frame
//!     allocator.free_frame(frame);
//! }
//! ```
//!
//! ```rust,no_run
//! use kernel_alloc::HhdmFrameAlloc;
//! use memprotect::arch::PhysFrameAlloc;
//!
//! let mut allocator = HhdmFrameAlloc::default();
//! // `zero: true` is now honored: the returned frame really is all-zero.
//! let frame = allocator.alloc_frame(true);
//! ```
//!
//! ## Integration Points
//!
//! This crate integrates with several other kernel components:
//! * **memprotect**: consumes the `PhysFrameAlloc`/`PhysMapper` impls defined here
//! * **kernel-info**: memory layout constants (`HHDM_BASE`) and configuration
#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod frame_alloc;
pub mod phys_mapper;

use frame_alloc::BitmapFrameAlloc;
use kernel_memory_addresses::{PhysicalPage, Size4K};
use memprotect::arch::{PhysFrameAlloc, PhysMapper};
use phys_mapper::HhdmPhysMapper;

const PAGE_BYTES: usize = 4096;

/// Pairs a [`PhysFrameAlloc`] with a [`PhysMapper`] so `alloc_frame(zero:
/// true)` actually clears the frame before handing it out.
///
/// [`BitmapFrameAlloc`] alone has no way to dereference the frame it just
/// carved out of its bitmap — it only knows physical addresses, and physical
/// addresses aren't directly dereferenceable. `ZeroingFrameAlloc` closes that
/// gap by delegating the raw allocation to `F` and then, when asked to zero,
/// writing through `M` the same way `mapper`/`splitter` write page-table
/// entries.
pub struct ZeroingFrameAlloc<F, M> {
    inner: F,
    mapper: M,
}

impl<F: PhysFrameAlloc, M: PhysMapper> ZeroingFrameAlloc<F, M> {
    pub const fn new(inner: F, mapper: M) -> Self {
        Self { inner, mapper }
    }
}

impl<F: PhysFrameAlloc> ZeroingFrameAlloc<F, HhdmPhysMapper> {
    /// Build a [`ZeroingFrameAlloc`] over the kernel's HHDM.
    pub const fn with_hhdm(inner: F) -> Self {
        Self::new(inner, HhdmPhysMapper)
    }
}

impl<F: PhysFrameAlloc, M: PhysMapper> PhysFrameAlloc for ZeroingFrameAlloc<F, M> {
    fn alloc_frame(&mut self, zero: bool) -> Option<PhysicalPage<Size4K>> {
        let frame = self.inner.alloc_frame(false)?;
        if zero {
            // SAFETY: `frame` was just carved out of `inner`'s free list and
            // is not yet visible to anyone else; `M` covers it by contract.
            unsafe {
                *self.mapper.phys_to_mut::<[u8; PAGE_BYTES]>(frame.base()) = [0u8; PAGE_BYTES];
            }
        }
        Some(frame)
    }

    fn free_frame(&mut self, frame: PhysicalPage<Size4K>) {
        self.inner.free_frame(frame);
    }
}

/// [`ZeroingFrameAlloc`] over the kernel's real HHDM, backed by
/// [`BitmapFrameAlloc`] by default — the allocator production code should
/// reach for whenever a zeroed frame is needed.
pub type HhdmFrameAlloc<F = BitmapFrameAlloc> = ZeroingFrameAlloc<F, HhdmPhysMapper>;

impl Default for HhdmFrameAlloc<BitmapFrameAlloc> {
    fn default() -> Self {
        Self::with_hhdm(BitmapFrameAlloc::new())
    }
}
