//! # Component A — PageTableWalker
//!
//! Pure traversal with no side effects: locate the deepest PTE relevant to a
//! virtual address, report the level it was found at, and whether it's a
//! valid leaf. See §4.A.

use crate::arch::{DecodedPte, PagingArch, PhysMapper};
use crate::error::fatal_corruption;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use log::trace;

/// Result of a single [`walk`] call.
#[derive(Clone, Copy, Debug)]
pub struct WalkResult {
    /// Physical address of the deepest PTE examined.
    pub pte_paddr: PhysicalAddress,
    /// Level the walk stopped at (0 = leaf-only level).
    pub level: u8,
    /// The decoded contents of that PTE.
    pub decoded: DecodedPte,
    /// `true` iff `decoded` is a valid leaf.
    pub found: bool,
    /// `false` iff `vaddr` was non-canonical; all other fields are then zero.
    pub vaddr_valid: bool,
}

impl WalkResult {
    const fn non_canonical() -> Self {
        Self {
            pte_paddr: PhysicalAddress::zero(),
            level: 0,
            decoded: DecodedPte::Invalid,
            found: false,
            vaddr_valid: false,
        }
    }
}

/// Walk `root`'s tree looking for `vaddr`.
///
/// Halts the kernel (via [`fatal_corruption`]) if the tree shape is
/// inconsistent with the architecture's capabilities: a superpage leaf above
/// level 0 on hardware that doesn't support superpages, a misaligned
/// superpage base, or a non-leaf PTE at level 0.
pub fn walk<A, M>(root: PhysicalPage<Size4K>, vaddr: u64, mapper: &M) -> WalkResult
where
    A: PagingArch,
    M: PhysMapper,
{
    if !A::is_canonical(vaddr) {
        return WalkResult::non_canonical();
    }

    let mut table_phys = root.base();
    let mut level = A::LEVELS - 1;
    loop {
        let index = A::index_at(vaddr, level);
        let pte_paddr = PhysicalAddress::new(table_phys.as_u64() + (index as u64) * 8);
        // SAFETY: `table_phys` was either `root` or a `NonLeaf` target
        // validated on the previous iteration; both are live page-table
        // frames reachable through `mapper`.
        let raw = unsafe { *mapper.phys_to_ref::<u64>(pte_paddr) };
        let decoded = A::decode(level, raw);
        trace!("walk: level={level} index={index} pte={pte_paddr} raw={raw:#018x}");

        match decoded {
            DecodedPte::Invalid => {
                return WalkResult {
                    pte_paddr,
                    level,
                    decoded,
                    found: false,
                    vaddr_valid: true,
                };
            }
            DecodedPte::Leaf(phys, _) => {
                if level > 0 {
                    if !A::SUPPORTS_SUPERPAGES {
                        fatal_corruption(pte_paddr, vaddr, "superpage leaf on non-superpage architecture");
                    }
                    let align = 1u64 << (u32::from(A::BITS_PER_LEVEL) * u32::from(level) + 12);
                    if phys.as_u64() % align != 0 {
                        fatal_corruption(pte_paddr, vaddr, "superpage leaf is misaligned");
                    }
                }
                return WalkResult {
                    pte_paddr,
                    level,
                    decoded,
                    found: true,
                    vaddr_valid: true,
                };
            }
            DecodedPte::NonLeaf(next) => {
                if level == 0 {
                    fatal_corruption(pte_paddr, vaddr, "non-leaf PTE at level 0");
                }
                table_phys = next.base();
                level -= 1;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::LeafFlags;
    use crate::test_support::{FakeArch, FakeRam};

    #[test]
    fn walk_reports_invalid_for_empty_table() {
        let ram = FakeRam::new();
        let root = ram.alloc_table();
        let result = walk::<FakeArch, _>(root, 0x1000, &ram);
        assert!(result.vaddr_valid);
        assert!(!result.found);
        assert!(matches!(result.decoded, DecodedPte::Invalid));
    }

    #[test]
    fn walk_rejects_non_canonical() {
        let ram = FakeRam::new();
        let root = ram.alloc_table();
        let result = walk::<FakeArch, _>(root, 1u64 << 62, &ram);
        assert!(!result.vaddr_valid);
    }

    #[test]
    fn walk_finds_leaf_written_directly() {
        let ram = FakeRam::new();
        let root = ram.alloc_table();
        let vaddr = 0x1000u64;
        let index = FakeArch::index_at(vaddr, 0);
        ram.write_entry(root, 0, index, FakeArch::encode_leaf(0, PhysicalAddress::new(0x9000), LeafFlags::kernel_rw()));
        // Intermediate levels above 0 must be non-leaf pointers for the walk to
        // actually reach level 0; build a minimal chain.
        let mut table = root;
        for level in (1..FakeArch::LEVELS).rev() {
            let next = ram.alloc_table();
            let idx = FakeArch::index_at(vaddr, level);
            ram.write_entry(table, level, idx, FakeArch::encode_nonleaf(next));
            table = next;
        }
        let idx0 = FakeArch::index_at(vaddr, 0);
        ram.write_entry(table, 0, idx0, FakeArch::encode_leaf(0, PhysicalAddress::new(0x9000), LeafFlags::kernel_rw()));
        let result = walk::<FakeArch, _>(root, vaddr, &ram);
        assert!(result.found);
        assert_eq!(result.level, 0);
    }
}
