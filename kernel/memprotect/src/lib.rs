//! # memprotect
//!
//! A multi-architecture page-table engine: one `no_std` core (walker,
//! splitter, mapper, global broadcast, context registry, swapper,
//! virt2phys) made polymorphic over a single [`arch::PagingArch`]
//! capability trait, with concrete backends for x86-64 (4-level) and
//! RISC-V Sv39 (3-level) selected at compile time via the `x86_64` /
//! `riscv64` Cargo features.
//!
//! ## Layout
//! - [`arch`] — the `PagingArch`/`PhysMapper`/`PhysFrameAlloc` traits and
//!   the shared `DecodedPte`/`LeafFlags` types. [`arch::x86_64`] and
//!   [`arch::riscv64`] provide the concrete backends.
//! - [`walker`] — Component A, the read-only tree traversal every other
//!   component is built on.
//! - [`splitter`] — Component B, breaking a superpage leaf into a table of
//!   smaller leaves.
//! - [`mapper`] — Component C, `map`/`unmap`.
//! - [`broadcast`] — Component D, keeping non-master contexts' kernel-half
//!   entries in sync with the master.
//! - [`registry`] — Component E, the master context plus the fixed-size
//!   registry of live per-process contexts.
//! - [`swapper`] — Component F, installing a context on trap-return and
//!   requesting cross-CPU TLB shootdown.
//! - [`virt2phys`] — Component I, read-only translation lookup.
//! - [`ctx`] — the `Ctx` handle shared by every component above.
//! - [`error`] — the error taxonomy from §7: recoverable `MapperError`
//!   values plus the two FATAL halt paths.
//!
//! No-MMU targets use the sibling `kernel-pmp` crate (Components G–H)
//! instead of this one; see that crate's docs.
#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod arch;
pub mod broadcast;
pub mod ctx;
pub mod error;
pub mod mapper;
pub mod registry;
pub mod swapper;
pub mod virt2phys;
pub mod walker;

mod splitter;

#[cfg(test)]
mod test_support;

pub use ctx::Ctx;
pub use error::MapperError;

/// Map `ctx` and broadcast if the edit landed in the kernel half and the
/// caller asked for a global mapping — the data-flow path §4 describes as
/// "Mapper... calls GlobalBroadcast (D) if the edit is in the kernel half."
///
/// Pass `registry: None` for any non-master context; only the master
/// context's kernel-half entries are ever broadcast.
pub fn map_and_broadcast<A, M, F>(
    ctx: Ctx,
    vpn: u64,
    ppn: u64,
    pages: u64,
    flags: arch::LeafFlags,
    registry: Option<&registry::ContextRegistry>,
    mapper: &M,
    alloc: &mut F,
) -> Result<mapper::TopEdit, MapperError>
where
    A: arch::PagingArch,
    M: arch::PhysMapper,
    F: arch::PhysFrameAlloc,
{
    let top_edit = mapper::map::<A, M, F>(ctx, vpn, ppn, pages, flags, mapper, alloc)?;
    if top_edit && flags.global {
        if let Some(registry) = registry {
            broadcast::broadcast_upper_half::<A, M>(registry, mapper);
        }
    }
    Ok(top_edit)
}

/// Unmap `ctx` and, for the master context, directly clear the affected
/// top-level indices in every other live context — the companion pass
/// closing the staleness window broadcast's simpler "copy what's valid"
/// contract leaves open (§9).
///
/// `[vpn, vpn+pages)` can span more than one top-level index in a single
/// call (each top-level slot covers a huge VA range, but nothing stops a
/// wide `unmap` from crossing that boundary); every index `mapper::unmap`
/// reports as written is propagated, not just the one at the call's
/// starting `vpn`.
pub fn unmap_and_propagate<A, M, F>(
    ctx: Ctx,
    vpn: u64,
    pages: u64,
    registry: Option<&registry::ContextRegistry>,
    mapper: &M,
    alloc: &mut F,
) -> mapper::TopEdit
where
    A: arch::PagingArch,
    M: arch::PhysMapper,
    F: arch::PhysFrameAlloc,
{
    let outcome = mapper::unmap::<A, M, F>(ctx, vpn, pages, mapper, alloc);
    if let Some(indices) = outcome.indices.clone() {
        if let Some(registry) = registry {
            if ctx.root() == registry.master().root() {
                broadcast::clear_invalidated::<A, M>(registry, indices, mapper);
            }
        }
    }
    outcome.top_edit
}

#[cfg(feature = "x86_64")]
pub use arch::x86_64;

#[cfg(feature = "riscv64")]
pub use arch::riscv64;

#[cfg(test)]
mod tests {
    use crate::arch::LeafFlags;
    use crate::registry::ContextRegistry;
    use crate::test_support::{FakeArch, FakeFrameAlloc, FakeRam};
    use crate::{unmap_and_propagate, Ctx};

    /// A single `unmap` call that straddles two top-level superpages, each
    /// split by the unmap, must clear both indices in every other live
    /// context — not just the index derived from the call's starting `vpn`.
    #[test]
    fn unmap_spanning_two_top_level_indices_propagates_both_to_children() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let master = Ctx::from_root(ram.alloc_table());
        let flags = LeafFlags {
            readable: true,
            writable: true,
            ..LeafFlags::default()
        };
        let top_level_step =
            1u64 << (u32::from(FakeArch::BITS_PER_LEVEL) * u32::from(FakeArch::LEVELS - 1));
        // Two adjacent top-level-superpage-sized kernel-half windows, so the
        // unmap below crosses a top-level boundary within the master's
        // shared (upper) half.
        let vpn_base = FakeArch::UPPER_HALF_START / FakeArch::PAGESIZE;

        crate::mapper::map::<FakeArch, _, _>(master, vpn_base, 0, top_level_step, flags, &ram, &mut alloc)
            .unwrap();
        crate::mapper::map::<FakeArch, _, _>(
            master,
            vpn_base + top_level_step,
            top_level_step,
            top_level_step,
            flags,
            &ram,
            &mut alloc,
        )
        .unwrap();

        let registry = ContextRegistry::new(master);
        let child = registry
            .create_context::<FakeArch, _, _>(&ram, &mut alloc)
            .expect("slab has room");

        assert!(crate::virt2phys::lookup::<FakeArch, _>(child, vpn_base * 4096, &ram).is_some());
        assert!(crate::virt2phys::lookup::<FakeArch, _>(child, (vpn_base + top_level_step) * 4096, &ram).is_some());

        // Straddle both superpages in one unmap call.
        let top_edit = unmap_and_propagate::<FakeArch, _, _>(
            master,
            vpn_base + top_level_step - 1,
            2,
            Some(&registry),
            &ram,
            &mut alloc,
        );
        assert!(top_edit);

        assert!(crate::virt2phys::lookup::<FakeArch, _>(child, (vpn_base + top_level_step - 1) * 4096, &ram)
            .is_none());
        assert!(crate::virt2phys::lookup::<FakeArch, _>(child, (vpn_base + top_level_step) * 4096, &ram).is_none());
    }
}
