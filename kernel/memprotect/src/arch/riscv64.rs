//! # RISC-V Sv39 paging backend (3-level)
//!
//! 39-bit virtual addresses, 9 bits per level, leaf PTEs permitted at levels
//! 1 (2 MiB megapage) and 2 (1 GiB gigapage).
//!
//! ```text
//! | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  VPN2 |  VPN1 |  VPN0 | Offset |
//! ```
//!
//! Unlike x86-64, a Sv39 PTE carries no separate "present" bit beyond `V`,
//! and leaf-ness is determined by R/W/X rather than a dedicated page-size
//! bit: `V=1, R=W=X=0` is a pointer to the next table; any other combination
//! with `V=1` is a leaf at the current level.

use crate::arch::{DecodedPte, LeafFlags, PagingArch};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_registers::satp::Satp;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

const VALID: u64 = 1 << 0;
const READ: u64 = 1 << 1;
const WRITE: u64 = 1 << 2;
const EXEC: u64 = 1 << 3;
const USER: u64 = 1 << 4;
const GLOBAL: u64 = 1 << 5;
const ACCESSED: u64 = 1 << 6;
const DIRTY: u64 = 1 << 7;
const PPN_SHIFT: u32 = 10;
const PPN_MASK: u64 = 0x0FFF_FFFF_FFFF_FC00;

/// Marker type implementing [`PagingArch`] for RISC-V Sv39.
pub struct Sv39;

impl PagingArch for Sv39 {
    const LEVELS: u8 = 3;
    const BITS_PER_LEVEL: u8 = 9;
    const PAGESIZE: u64 = 4096;
    const SUPPORTS_SUPERPAGES: bool = true;
    const CANONICAL_HALF_SIZE: u64 = 1 << 38;
    const UPPER_HALF_START: u64 = 0xFFFF_FFC0_0000_0000;

    #[inline]
    fn index_at(vaddr: u64, level: u8) -> usize {
        let shift = 12 + u32::from(level) * u32::from(Self::BITS_PER_LEVEL);
        ((vaddr >> shift) & 0x1FF) as usize
    }

    #[inline]
    fn is_canonical(vaddr: u64) -> bool {
        let top26 = (vaddr as i64) >> 38;
        top26 == 0 || top26 == -1
    }

    fn decode(_level: u8, raw: u64) -> DecodedPte {
        if raw & VALID == 0 {
            return DecodedPte::Invalid;
        }
        let rwx = raw & (READ | WRITE | EXEC);
        if rwx == 0 {
            let page = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(
                (raw & PPN_MASK) >> PPN_SHIFT << 12,
            ));
            DecodedPte::NonLeaf(page)
        } else {
            let flags = LeafFlags {
                readable: raw & READ != 0,
                writable: raw & WRITE != 0,
                executable: raw & EXEC != 0,
                user: raw & USER != 0,
                global: raw & GLOBAL != 0,
                accessed: raw & ACCESSED != 0,
                dirty: raw & DIRTY != 0,
            };
            DecodedPte::Leaf(PhysicalAddress::new((raw & PPN_MASK) >> PPN_SHIFT << 12), flags)
        }
    }

    fn encode_nonleaf(next: PhysicalPage<Size4K>) -> u64 {
        VALID | ((next.base().as_u64() >> 12) << PPN_SHIFT)
    }

    fn encode_leaf(_level: u8, phys: PhysicalAddress, flags: LeafFlags) -> u64 {
        let mut word = VALID | ((phys.as_u64() >> 12) << PPN_SHIFT);
        if flags.readable {
            word |= READ;
        }
        if flags.writable {
            word |= WRITE;
        }
        if flags.executable {
            word |= EXEC;
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
        word
    }

    #[inline]
    unsafe fn fence() {
        // SAFETY: `sfence.vma` with no operands orders prior stores to page
        // tables before subsequent translations and invalidates the entire
        // local TLB.
        unsafe {
            core::arch::asm!("sfence.vma", options(nostack, preserves_flags));
        }
    }

    #[inline]
    unsafe fn read_root() -> PhysicalPage<Size4K> {
        // SAFETY: satp is readable from S-mode.
        let satp = unsafe { Satp::load_unsafe() };
        PhysicalPage::from_addr(satp.root_phys())
    }

    #[inline]
    unsafe fn write_root(root: PhysicalPage<Size4K>) {
        let satp = Satp::sv39(root.base(), 0);
        // SAFETY: caller guarantees `root` is a live, fully-populated Sv39 root.
        unsafe {
            satp.store_unsafe();
        }
    }
}
