//! # Component B — SuperpageSplitter
//!
//! Breaks a leaf superpage PTE into a table of next-lower-level PTEs,
//! preserving flags. See §4.B.

use crate::arch::{DecodedPte, PagingArch, PhysFrameAlloc, PhysMapper};
use crate::error::fatal_oom;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use log::debug;

/// Split the superpage leaf `original` (found at `level`, stored at
/// `pte_paddr`) into a freshly allocated table of level-`level - 1` leaves
/// covering the same physical range with the same flags, then overwrites
/// `pte_paddr` with a non-leaf pointer to that table.
///
/// # Panics
/// Halts the kernel if `A::SUPPORTS_SUPERPAGES` is false (this should be
/// unreachable — a superpage leaf could not have existed in the first
/// place) or if `original` is not in fact a leaf.
pub fn split<A, M, F>(
    level: u8,
    pte_paddr: PhysicalAddress,
    original: DecodedPte,
    mapper: &M,
    alloc: &mut F,
) -> PhysicalPage<Size4K>
where
    A: PagingArch,
    M: PhysMapper,
    F: PhysFrameAlloc,
{
    assert!(
        A::SUPPORTS_SUPERPAGES,
        "split invoked on an architecture without superpage support"
    );
    let (base_phys, flags) = match original {
        DecodedPte::Leaf(phys, flags) => (phys, flags),
        _ => panic!("split invoked on a non-leaf PTE"),
    };
    assert!(level > 0, "cannot split a level-0 (base page) leaf");

    let new_table = alloc
        .alloc_frame(true)
        .unwrap_or_else(|| fatal_oom(pte_paddr.as_u64()));

    let entries = 1usize << A::BITS_PER_LEVEL;
    let sub_level = level - 1;
    let sub_size = 1u64 << (12 + u32::from(A::BITS_PER_LEVEL) * u32::from(sub_level));

    for i in 0..entries {
        let sub_phys = PhysicalAddress::new(base_phys.as_u64() + (i as u64) * sub_size);
        let raw = A::encode_leaf(sub_level, sub_phys, flags);
        let entry_paddr = PhysicalAddress::new(new_table.base().as_u64() + (i as u64) * 8);
        // SAFETY: `new_table` was just allocated and is not yet reachable
        // from any other context.
        unsafe {
            *mapper.phys_to_mut::<u64>(entry_paddr) = raw;
        }
    }

    let nonleaf = A::encode_nonleaf(new_table);
    // SAFETY: `pte_paddr` is the address of the PTE we are splitting; it
    // remains a valid write target throughout.
    unsafe {
        *mapper.phys_to_mut::<u64>(pte_paddr) = nonleaf;
    }
    debug!("split: level={level} pte={pte_paddr} -> table={new_table:?}");
    new_table
}
