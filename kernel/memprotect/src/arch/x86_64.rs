//! # x86-64 paging backend (4-level, IA-32e)
//!
//! 48-bit canonical addresses, 9 bits per level, leaf PTEs permitted at
//! levels 1 (2 MiB) and 2 (1 GiB) when the hardware sets `PS`.
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```

use crate::arch::{DecodedPte, LeafFlags, PagingArch};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_registers::cr3::Cr3;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

const PRESENT: u64 = 1 << 0;
const WRITABLE: u64 = 1 << 1;
const USER: u64 = 1 << 2;
const ACCESSED: u64 = 1 << 5;
const DIRTY: u64 = 1 << 6;
const PS: u64 = 1 << 7;
const GLOBAL: u64 = 1 << 8;
const NO_EXECUTE: u64 = 1 << 63;
const PHYS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// Marker type implementing [`PagingArch`] for x86-64.
pub struct X86_64;

impl PagingArch for X86_64 {
    const LEVELS: u8 = 4;
    const BITS_PER_LEVEL: u8 = 9;
    const PAGESIZE: u64 = 4096;
    const SUPPORTS_SUPERPAGES: bool = true;
    const CANONICAL_HALF_SIZE: u64 = 1 << 47;
    const UPPER_HALF_START: u64 = 0xFFFF_8000_0000_0000;

    #[inline]
    fn index_at(vaddr: u64, level: u8) -> usize {
        let shift = 12 + u32::from(level) * u32::from(Self::BITS_PER_LEVEL);
        ((vaddr >> shift) & 0x1FF) as usize
    }

    #[inline]
    fn is_canonical(vaddr: u64) -> bool {
        let top17 = (vaddr as i64) >> 47;
        top17 == 0 || top17 == -1
    }

    fn decode(level: u8, raw: u64) -> DecodedPte {
        if raw & PRESENT == 0 {
            return DecodedPte::Invalid;
        }
        let is_leaf = level == 0 || (raw & PS) != 0;
        if is_leaf {
            let flags = LeafFlags {
                readable: true,
                writable: raw & WRITABLE != 0,
                executable: raw & NO_EXECUTE == 0,
                user: raw & USER != 0,
                global: raw & GLOBAL != 0,
                accessed: raw & ACCESSED != 0,
                dirty: raw & DIRTY != 0,
            };
            DecodedPte::Leaf(PhysicalAddress::new(raw & PHYS_MASK), flags)
        } else {
            let page = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(raw & PHYS_MASK));
            DecodedPte::NonLeaf(page)
        }
    }

    fn encode_nonleaf(next: PhysicalPage<Size4K>) -> u64 {
        PRESENT | WRITABLE | USER | (next.base().as_u64() & PHYS_MASK)
    }

    fn encode_leaf(level: u8, phys: PhysicalAddress, flags: LeafFlags) -> u64 {
        let mut word = PRESENT | (phys.as_u64() & PHYS_MASK);
        if flags.writable {
            word |= WRITABLE;
        }
        if flags.user {
            word |= USER;
        }
        if flags.global {
            word |= GLOBAL;
        }
        if flags.accessed {
            word |= ACCESSED;
        }
        if flags.dirty {
            word |= DIRTY;
        }
        if !flags.executable {
            word |= NO_EXECUTE;
        }
        if level > 0 {
            word |= PS;
        }
        word
    }

    #[inline]
    unsafe fn fence() {
        // SAFETY: reloading CR3 with its own value flushes all non-global
        // TLB entries without changing the active address space; delegated
        // to the caller's invariant that CR3 already points at a live root.
        unsafe {
            core::arch::asm!(
                "mov {tmp}, cr3",
                "mov cr3, {tmp}",
                tmp = out(reg) _,
                options(nostack, preserves_flags),
            );
        }
    }

    #[inline]
    unsafe fn read_root() -> PhysicalPage<Size4K> {
        // SAFETY: CR3 is always readable from ring 0.
        let cr3 = unsafe { Cr3::load_unsafe() };
        PhysicalPage::from_addr(cr3.pml4_phys())
    }

    #[inline]
    unsafe fn write_root(root: PhysicalPage<Size4K>) {
        let cr3 = Cr3::from_pml4_phys(root.base(), false, false);
        // SAFETY: caller guarantees `root` is a live, fully-populated PML4.
        unsafe {
            cr3.store_unsafe();
        }
    }
}
