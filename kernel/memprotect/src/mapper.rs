//! # Component C — Mapper
//!
//! Installs and removes mappings by walking and (as needed) allocating
//! intermediate tables, choosing the largest superpage that fits alignment
//! and remaining length at each step. See §4.C.

use crate::arch::{DecodedPte, LeafFlags, PagingArch, PhysFrameAlloc, PhysMapper};
use crate::ctx::Ctx;
use crate::error::{fatal_oom, MapperError};
use core::ops::RangeInclusive;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use log::trace;

/// `true` iff at least one entry in the top-level table was written.
pub type TopEdit = bool;

/// Outcome of [`unmap`]: whether any top-level entry was written, and, if
/// so, the inclusive range of distinct top-level indices touched. A single
/// `unmap` call can span more than one top-level index (each slot covers a
/// huge VA range, but nothing stops `[vpn, vpn+pages)` from crossing that
/// boundary); `indices` is `None` only when `top_edit` is `false`.
pub struct UnmapOutcome {
    pub top_edit: TopEdit,
    pub indices: Option<RangeInclusive<usize>>,
}

/// Install mappings covering exactly `pages` base pages starting at `vpn`,
/// mapping physical frames starting at `ppn`, with the given leaf flags.
///
/// # Errors
/// Returns [`MapperError::InvalidFlags`] if `flags` carries none of R/W/X,
/// or [`MapperError::NonCanonical`] if `[vpn, vpn+pages)` is not wholly
/// within one canonical half.
pub fn map<A, M, F>(
    ctx: Ctx,
    vpn: u64,
    ppn: u64,
    pages: u64,
    flags: LeafFlags,
    mapper: &M,
    alloc: &mut F,
) -> Result<TopEdit, MapperError>
where
    A: PagingArch,
    M: PhysMapper,
    F: PhysFrameAlloc,
{
    if !flags.is_leaf_legal() {
        return Err(MapperError::InvalidFlags);
    }
    // W implies R: the caller is not required to set R alongside W.
    let flags = LeafFlags {
        readable: flags.readable || flags.writable,
        ..flags
    };
    let vaddr_start = vpn * A::PAGESIZE;
    let vaddr_last = vaddr_start + pages.saturating_mul(A::PAGESIZE) - 1;
    if pages == 0 || !same_canonical_half::<A>(vaddr_start, vaddr_last) {
        return Err(MapperError::NonCanonical);
    }

    let mut remaining = pages;
    let mut cur_vpn = vpn;
    let mut cur_ppn = ppn;
    let mut top_edit = false;

    while remaining > 0 {
        let level = choose_superpage_level::<A>(cur_vpn, Some(cur_ppn), remaining);
        let vaddr = cur_vpn * A::PAGESIZE;
        let paddr = PhysicalAddress::new(cur_ppn * A::PAGESIZE);
        let wrote_top = install_leaf::<A, M, F>(ctx.root(), level, vaddr, paddr, flags, mapper, alloc);
        top_edit |= wrote_top;

        let step = 1u64 << (u32::from(A::BITS_PER_LEVEL) * u32::from(level));
        cur_vpn += step;
        cur_ppn += step;
        remaining -= step;
    }

    Ok(top_edit)
}

/// Remove mappings covering `[vpn, vpn+pages)`. A superpage that only
/// partially overlaps the range is split first, then the affected
/// sub-entries are zeroed. Unmapping an already-unmapped range is a no-op.
pub fn unmap<A, M, F>(ctx: Ctx, vpn: u64, pages: u64, mapper: &M, alloc: &mut F) -> UnmapOutcome
where
    A: PagingArch,
    M: PhysMapper,
    F: PhysFrameAlloc,
{
    let mut remaining = pages;
    let mut cur_vpn = vpn;
    let mut top_edit = false;
    let mut indices: Option<RangeInclusive<usize>> = None;

    while remaining > 0 {
        let level = choose_superpage_level::<A>(cur_vpn, None, remaining);
        let vaddr = cur_vpn * A::PAGESIZE;
        let wrote_top = clear_leaf::<A, M, F>(ctx.root(), level, vaddr, mapper, alloc);
        if wrote_top {
            top_edit = true;
            let index = A::index_at(vaddr, A::LEVELS - 1);
            indices = Some(match indices {
                Some(r) => *r.start().min(&index)..=*r.end().max(&index),
                None => index..=index,
            });
        }

        let step = 1u64 << (u32::from(A::BITS_PER_LEVEL) * u32::from(level));
        cur_vpn += step;
        remaining -= step;
    }

    UnmapOutcome { top_edit, indices }
}

fn same_canonical_half<A: PagingArch>(start: u64, last: u64) -> bool {
    A::is_canonical(start) && A::is_canonical(last) && (start >= A::UPPER_HALF_START) == (last >= A::UPPER_HALF_START)
}

/// Greatest `L` for which `vpn`/`ppn` are aligned to `2^(bits·L)` base pages
/// and `remaining` covers at least that many; `ppn_check` is `None` for
/// unmap, matching §4.C's "the `ppn` check is omitted" rule.
fn choose_superpage_level<A: PagingArch>(vpn: u64, ppn_check: Option<u64>, remaining: u64) -> u8 {
    let mut level = A::LEVELS - 1;
    loop {
        let step = 1u64 << (u32::from(A::BITS_PER_LEVEL) * u32::from(level));
        let fits = A::SUPPORTS_SUPERPAGES
            && level > 0
            && vpn % step == 0
            && ppn_check.is_none_or(|ppn| ppn % step == 0)
            && remaining >= step;
        if fits {
            return level;
        }
        if level == 0 {
            return 0;
        }
        level -= 1;
    }
}

/// Descend from the top, allocating/splitting intermediate tables as needed,
/// and write a new leaf PTE at `target_level`.
fn install_leaf<A, M, F>(
    root: PhysicalPage<Size4K>,
    target_level: u8,
    vaddr: u64,
    paddr: PhysicalAddress,
    flags: LeafFlags,
    mapper: &M,
    alloc: &mut F,
) -> TopEdit
where
    A: PagingArch,
    M: PhysMapper,
    F: PhysFrameAlloc,
{
    let mut table_phys = root.base();
    let mut level = A::LEVELS - 1;
    let mut top_edit = false;

    loop {
        let index = A::index_at(vaddr, level);
        let pte_paddr = PhysicalAddress::new(table_phys.as_u64() + (index as u64) * 8);

        if level == target_level {
            let raw = A::encode_leaf(level, paddr, flags);
            // SAFETY: `pte_paddr` is within the table at `table_phys`, which
            // was reached by a validated walk from `root`.
            unsafe {
                *mapper.phys_to_mut::<u64>(pte_paddr) = raw;
            }
            if level == A::LEVELS - 1 {
                top_edit = true;
            }
            trace!("map: wrote leaf at level={level} vaddr={vaddr:#018x} paddr={paddr}");
            return top_edit;
        }

        // SAFETY: see above.
        let raw = unsafe { *mapper.phys_to_ref::<u64>(pte_paddr) };
        let decoded = A::decode(level, raw);
        let next_table = match decoded {
            DecodedPte::Invalid => {
                let frame = alloc
                    .alloc_frame(true)
                    .unwrap_or_else(|| fatal_oom(vaddr));
                let nonleaf = A::encode_nonleaf(frame);
                // SAFETY: see above.
                unsafe {
                    *mapper.phys_to_mut::<u64>(pte_paddr) = nonleaf;
                }
                if level == A::LEVELS - 1 {
                    top_edit = true;
                }
                frame
            }
            DecodedPte::Leaf(..) => {
                let next = crate::splitter::split::<A, M, F>(level, pte_paddr, decoded, mapper, alloc);
                if level == A::LEVELS - 1 {
                    top_edit = true;
                }
                next
            }
            DecodedPte::NonLeaf(next) => next,
        };

        table_phys = next_table.base();
        level -= 1;
    }
}

/// Descend from the top, splitting any superpage that only partially
/// overlaps `target_level`, and zero the PTE found there. Short-circuits
/// the moment an intermediate PTE is invalid — there is nothing to unmap
/// below it — but still reports any top-level write a split made on the
/// way down.
fn clear_leaf<A, M, F>(
    root: PhysicalPage<Size4K>,
    target_level: u8,
    vaddr: u64,
    mapper: &M,
    alloc: &mut F,
) -> TopEdit
where
    A: PagingArch,
    M: PhysMapper,
    F: PhysFrameAlloc,
{
    let mut table_phys = root.base();
    let mut level = A::LEVELS - 1;
    let mut top_edit = false;

    loop {
        let index = A::index_at(vaddr, level);
        let pte_paddr = PhysicalAddress::new(table_phys.as_u64() + (index as u64) * 8);
        // SAFETY: reached by a validated walk from `root`.
        let raw = unsafe { *mapper.phys_to_ref::<u64>(pte_paddr) };
        let decoded = A::decode(level, raw);

        if level == target_level {
            if matches!(decoded, DecodedPte::Invalid) {
                return top_edit;
            }
            // SAFETY: see above.
            unsafe {
                *mapper.phys_to_mut::<u64>(pte_paddr) = A::zero();
            }
            trace!("unmap: cleared leaf at level={level} vaddr={vaddr:#018x}");
            top_edit |= level == A::LEVELS - 1;
            return top_edit;
        }

        match decoded {
            DecodedPte::Invalid => return top_edit,
            DecodedPte::Leaf(..) => {
                let new_table = crate::splitter::split::<A, M, F>(level, pte_paddr, decoded, mapper, alloc);
                if level == A::LEVELS - 1 {
                    top_edit = true;
                }
                table_phys = new_table.base();
            }
            DecodedPte::NonLeaf(next) => table_phys = next.base(),
        }
        level -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeArch, FakeFrameAlloc, FakeRam};
    use crate::virt2phys;

    fn new_ctx(ram: &FakeRam) -> Ctx {
        Ctx::from_root(ram.alloc_table())
    }

    /// S1: a single 4 KiB mapping is found at the expected physical address.
    #[test]
    fn scenario_s1_single_page() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        let flags = LeafFlags {
            readable: true,
            writable: false,
            executable: true,
            ..LeafFlags::default()
        };

        map::<FakeArch, _, _>(ctx, 0x1000, 0x80000, 1, flags, &ram, &mut alloc).unwrap();

        let vaddr = 0x1000 * 4096 + 0x10;
        let result = virt2phys::lookup::<FakeArch, _>(ctx, vaddr, &ram).unwrap();
        assert_eq!(result.paddr.as_u64(), 0x80000 * 4096 + 0x10);
        assert_eq!(result.page_size, 4096);
        assert!(result.flags.readable && result.flags.executable);
    }

    /// S2: a 2 MiB-aligned, 512-page request coalesces into one level-1 PTE.
    #[test]
    fn scenario_s2_superpage_coalescing() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        let flags = LeafFlags {
            readable: true,
            writable: true,
            ..LeafFlags::default()
        };

        map::<FakeArch, _, _>(ctx, 0, 0, 512, flags, &ram, &mut alloc).unwrap();

        let result = virt2phys::lookup::<FakeArch, _>(ctx, 0x1000, &ram).unwrap();
        assert_eq!(result.page_size, 4096 * 512);
    }

    /// S3: unmapping one page out of a superpage splits it and zeroes just
    /// that sub-entry.
    #[test]
    fn scenario_s3_unmap_splits_superpage() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        let flags = LeafFlags {
            readable: true,
            writable: true,
            ..LeafFlags::default()
        };
        map::<FakeArch, _, _>(ctx, 0, 0, 512, flags, &ram, &mut alloc).unwrap();

        unmap::<FakeArch, _, _>(ctx, 256, 1, &ram, &mut alloc);

        assert!(virt2phys::lookup::<FakeArch, _>(ctx, 256 * 4096, &ram).is_none());
        let still_there = virt2phys::lookup::<FakeArch, _>(ctx, 0, &ram).unwrap();
        assert_eq!(still_there.page_size, 4096);
    }

    /// Re-mapping a sub-range of a top-level superpage must split it and
    /// report that split as a top-level write.
    #[test]
    fn map_split_of_top_level_superpage_reports_top_edit() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        let flags = LeafFlags {
            readable: true,
            writable: true,
            ..LeafFlags::default()
        };
        let top_level_step =
            1u64 << (u32::from(FakeArch::BITS_PER_LEVEL) * u32::from(FakeArch::LEVELS - 1));

        map::<FakeArch, _, _>(ctx, 0, 0, top_level_step, flags, &ram, &mut alloc).unwrap();

        let exec_flags = LeafFlags {
            readable: true,
            executable: true,
            ..LeafFlags::default()
        };
        let top_edit = map::<FakeArch, _, _>(ctx, 1, 0x80000, 1, exec_flags, &ram, &mut alloc).unwrap();
        assert!(top_edit, "splitting a top-level superpage must report a top-level write");

        let result = virt2phys::lookup::<FakeArch, _>(ctx, 4096, &ram).unwrap();
        assert_eq!(result.page_size, 4096);
        assert!(result.flags.executable);
    }

    /// Splitting a superpage that sits *at* the top level (not just an
    /// intermediate one, as in S3) must still report a top-level write.
    #[test]
    fn unmap_split_of_top_level_superpage_reports_top_edit() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        let flags = LeafFlags {
            readable: true,
            writable: true,
            ..LeafFlags::default()
        };
        let top_level_step =
            1u64 << (u32::from(FakeArch::BITS_PER_LEVEL) * u32::from(FakeArch::LEVELS - 1));

        let top_edit = map::<FakeArch, _, _>(ctx, 0, 0, top_level_step, flags, &ram, &mut alloc).unwrap();
        assert!(top_edit, "a fresh top-level superpage write is itself a top-level write");

        let outcome = unmap::<FakeArch, _, _>(ctx, 1, 1, &ram, &mut alloc);
        assert!(outcome.top_edit, "splitting a top-level superpage must report a top-level write");

        assert!(virt2phys::lookup::<FakeArch, _>(ctx, 4096, &ram).is_none());
        let still_there = virt2phys::lookup::<FakeArch, _>(ctx, 0, &ram).unwrap();
        assert_eq!(still_there.page_size, 4096);
    }

    /// A single `unmap` call can cross a top-level boundary and split a
    /// superpage on each side of it; both indices must be reported, not
    /// just the one derived from the call's starting `vpn`.
    #[test]
    fn unmap_spanning_two_top_level_indices_reports_both() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        let flags = LeafFlags {
            readable: true,
            writable: true,
            ..LeafFlags::default()
        };
        let top_level_step =
            1u64 << (u32::from(FakeArch::BITS_PER_LEVEL) * u32::from(FakeArch::LEVELS - 1));

        map::<FakeArch, _, _>(ctx, 0, 0, top_level_step, flags, &ram, &mut alloc).unwrap();
        map::<FakeArch, _, _>(ctx, top_level_step, top_level_step, top_level_step, flags, &ram, &mut alloc)
            .unwrap();

        let i0 = FakeArch::index_at(0, FakeArch::LEVELS - 1);
        let i1 = FakeArch::index_at(top_level_step * FakeArch::PAGESIZE, FakeArch::LEVELS - 1);
        assert_ne!(i0, i1);

        // Unmap the last page of the first superpage and the first page of
        // the second, in one call that straddles both top-level indices.
        let outcome = unmap::<FakeArch, _, _>(ctx, top_level_step - 1, 2, &ram, &mut alloc);
        assert!(outcome.top_edit);
        let indices = outcome.indices.expect("both splits wrote a top-level entry");
        assert_eq!(*indices.start(), i0.min(i1));
        assert_eq!(*indices.end(), i0.max(i1));
    }

    #[test]
    fn unmap_of_unmapped_range_is_noop() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        let outcome = unmap::<FakeArch, _, _>(ctx, 0, 8, &ram, &mut alloc);
        assert!(!outcome.top_edit);
        assert!(outcome.indices.is_none());
    }

    #[test]
    fn map_rejects_flags_without_rwx() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        let err = map::<FakeArch, _, _>(ctx, 0, 0, 1, LeafFlags::default(), &ram, &mut alloc).unwrap_err();
        assert!(matches!(err, MapperError::InvalidFlags));
    }

    #[test]
    fn map_rejects_range_crossing_canonical_boundary() {
        let ram = FakeRam::new();
        let mut alloc = FakeFrameAlloc { ram: &ram };
        let ctx = new_ctx(&ram);
        // One page below the boundary, requesting enough pages to cross into
        // the upper half.
        let last_lower_vpn = (FakeArch::CANONICAL_HALF_SIZE / FakeArch::PAGESIZE) - 1;
        let err = map::<FakeArch, _, _>(ctx, last_lower_vpn, 0, 2, LeafFlags::kernel_rw(), &ram, &mut alloc)
            .unwrap_err();
        assert!(matches!(err, MapperError::NonCanonical));
    }
}
