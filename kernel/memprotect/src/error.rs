//! # Error taxonomy
//!
//! Per §7: invalid input is a plain failure value, not an error type; only
//! out-of-memory during intermediate-table allocation gets a `Result`, and
//! even that path ends in [`fatal_corruption`]/[`fatal_oom`] rather than
//! unwinding, since the spec marks it FATAL.

use kernel_memory_addresses::PhysicalAddress;
use log::error;

/// Failure modes of [`crate::mapper::map`] / [`crate::mapper::unmap`] that
/// are reported rather than causing a halt.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    /// `flags` had none of {R,W,X} set.
    #[error("leaf flags must set at least one of R/W/X, and W implies R")]
    InvalidFlags,
    /// `[vpn, vpn+pages)` left the canonical range, or crossed the boundary
    /// between the two canonical halves.
    #[error("virtual range is not wholly canonical")]
    NonCanonical,
}

/// Halts the kernel after logging the offending PTE. Page-table corruption
/// is unrecoverable: the walker or splitter found a shape that cannot arise
/// from a correctly operating Mapper.
#[cold]
pub fn fatal_corruption(pte_paddr: PhysicalAddress, vaddr: u64, reason: &str) -> ! {
    error!("page table corruption: {reason} at pte={pte_paddr} vaddr={vaddr:#018x}");
    panic!("page table corruption: {reason} at pte={pte_paddr} vaddr={vaddr:#018x}");
}

/// Halts the kernel after logging. Out-of-memory during intermediate-table
/// allocation is FATAL per §7 — this is boot-critical code, and callers are
/// expected to pre-reserve enough memory that this never fires.
#[cold]
pub fn fatal_oom(vaddr: u64) -> ! {
    error!("out of memory allocating an intermediate page table for vaddr={vaddr:#018x}");
    panic!("out of memory allocating intermediate page table for vaddr={vaddr:#018x}");
}
