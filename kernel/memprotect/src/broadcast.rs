//! # Component D — GlobalBroadcast
//!
//! Keeps the upper-half (kernel) PTEs of every live non-master context
//! identical to the master's. See §4.D.
//!
//! Only entries valid in the master are copied; an index that becomes
//! invalid in the master is not cleared here (§9's resolution keeps
//! staleness contained to `ContextRegistry::create_context`, which always
//! starts from a fresh copy, and to `clear_invalidated` below, which
//! `unmap` calls directly instead of going through the simpler "copy what's
//! valid" broadcast contract).

use crate::arch::{DecodedPte, PagingArch, PhysMapper};
use crate::registry::ContextRegistry;
use core::ops::RangeInclusive;
use kernel_memory_addresses::PhysicalAddress;
use log::trace;

fn upper_half_index_range<A: PagingArch>() -> core::ops::Range<usize> {
    let entries = 1usize << A::BITS_PER_LEVEL;
    A::index_at(A::UPPER_HALF_START, A::LEVELS - 1)..entries
}

/// Copy every valid master upper-half entry into every other live context.
/// Call after a master `map`/`unmap` that returned `top_edit = true` with
/// `GLOBAL` flags set.
pub fn broadcast_upper_half<A, M>(registry: &ContextRegistry, mapper: &M)
where
    A: PagingArch,
    M: PhysMapper,
{
    let master_root = registry.master().root();
    let range = upper_half_index_range::<A>();

    registry.with_contexts(|roots| {
        for &root in roots {
            for i in range.clone() {
                let src_paddr = PhysicalAddress::new(master_root.base().as_u64() + (i as u64) * 8);
                // SAFETY: `master_root` is the live master top-level table.
                let raw = unsafe { *mapper.phys_to_ref::<u64>(src_paddr) };
                if matches!(A::decode(A::LEVELS - 1, raw), DecodedPte::Invalid) {
                    continue;
                }
                let dst_paddr = PhysicalAddress::new(root.base().as_u64() + (i as u64) * 8);
                // SAFETY: `root` is a live top-level table belonging to a
                // registered context.
                unsafe {
                    *mapper.phys_to_mut::<u64>(dst_paddr) = raw;
                }
            }
            trace!("broadcast_upper_half: updated context root={root:?}");
        }
    })
}

/// Directly clear every index in `indices` (inclusive) in every live
/// non-master context's top-level table — the companion pass
/// `Mapper::unmap` performs on the master so an index invalidated there
/// never lingers stale in an existing context (broadcast itself only ever
/// copies, never clears). `indices` is a range rather than a slice since
/// there is no heap here to collect an arbitrary index set into, and a
/// single `unmap` call only ever touches a contiguous run of top-level
/// indices.
pub fn clear_invalidated<A, M>(registry: &ContextRegistry, indices: RangeInclusive<usize>, mapper: &M)
where
    A: PagingArch,
    M: PhysMapper,
{
    registry.with_contexts(|roots| {
        for &root in roots {
            for i in indices.clone() {
                let pte_paddr = PhysicalAddress::new(root.base().as_u64() + (i as u64) * 8);
                // SAFETY: `root` is a live top-level table belonging to a
                // registered context.
                unsafe {
                    *mapper.phys_to_mut::<u64>(pte_paddr) = A::zero();
                }
            }
        }
    })
}
