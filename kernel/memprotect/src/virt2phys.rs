//! # Component I — Virt2Phys
//!
//! Read-only translation lookup, layered directly on top of [`crate::walker`].
//! Used by debuggers, fault handlers reporting diagnostics, and tests. See
//! §4.I.

use crate::arch::{DecodedPte, PagingArch, PhysMapper};
use crate::arch::LeafFlags;
use crate::ctx::Ctx;
use crate::walker;

/// A resolved translation: the physical address `vaddr` maps to, the size of
/// the page it falls within, and the leaf's permission flags.
#[derive(Clone, Copy, Debug)]
pub struct Translation {
    pub paddr: kernel_memory_addresses::PhysicalAddress,
    pub page_size: u64,
    pub flags: LeafFlags,
}

/// Resolve `vaddr` within `ctx`. Returns `None` if `vaddr` is non-canonical
/// or unmapped; never allocates, never mutates the tree.
pub fn lookup<A, M>(ctx: Ctx, vaddr: u64, mapper: &M) -> Option<Translation>
where
    A: PagingArch,
    M: PhysMapper,
{
    let result = walker::walk::<A, M>(ctx.root(), vaddr, mapper);
    if !result.vaddr_valid || !result.found {
        return None;
    }
    let DecodedPte::Leaf(base, flags) = result.decoded else {
        return None;
    };
    let page_size = 1u64 << (12 + u32::from(A::BITS_PER_LEVEL) * u32::from(result.level));
    let offset = vaddr & (page_size - 1);
    Some(Translation {
        paddr: kernel_memory_addresses::PhysicalAddress::new(base.as_u64() + offset),
        page_size,
        flags,
    })
}
