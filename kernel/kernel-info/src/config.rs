//! # Memory-protection core configuration
//!
//! The handful of compile-time knobs shared by the `memprotect` paging
//! engine and the `kernel-pmp` no-MMU engine, kept here rather than in
//! either crate so that both (and the top-level `kernel` binary that wires
//! them together) agree on the same values without a circular dependency.
//!
//! Per-architecture paging knobs (`PAGESIZE`, `LEVELS`, `BITS_PER_LEVEL`,
//! `SUPPORTS_SUPERPAGES`) live on `memprotect::arch::PagingArch` instead,
//! since they differ between the `x86_64` and `riscv64` Cargo features;
//! the constants below are architecture-independent.

/// Number of PMP descriptors in a compiled context. 16 on the common
/// "PMP-lite" profile; some RISC-V implementations expose 64.
pub const PMP_COUNT: usize = 16;

/// Index of the first process-controlled PMP descriptor; lower indices are
/// reserved for firmware/kernel protections and are never touched by
/// [`crate`]'s consumers.
pub const PMP_START: usize = 4;

/// Upper bound on the number of live (non-master) address-space contexts
/// the [`ContextRegistry`](../../memprotect/struct.ContextRegistry.html)
/// tracks. Sized generously for a small kernel; the registry is a fixed
/// slab rather than a heap allocation since this crate has no global
/// allocator.
pub const MAX_CONTEXTS: usize = 64;

const _: () = {
    assert!(PMP_START < PMP_COUNT);
    assert!(MAX_CONTEXTS > 0);
};
