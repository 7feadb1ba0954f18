//! Test-only fakes: an in-memory "physical RAM" and a 3-level architecture
//! matching the literal `PAGESIZE=4096, BITS_PER_LEVEL=9, LEVELS=3` scenarios
//! from §8, independent of which of the `x86_64`/`riscv64` Cargo features is
//! enabled. Modeled on the teacher's own `BumpAlloc`/`Aligned4K`/`TestPhys`
//! fakes.
#![cfg(test)]

use crate::arch::{DecodedPte, LeafFlags, PagingArch, PhysFrameAlloc, PhysMapper};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use std::boxed::Box;
use std::cell::RefCell;
use std::vec::Vec;

#[repr(align(4096))]
struct Aligned4K([u8; 4096]);

const VALID: u64 = 1 << 0;
const WRITABLE: u64 = 1 << 1;
const USER: u64 = 1 << 2;
const EXEC: u64 = 1 << 3;
const GLOBAL: u64 = 1 << 4;
const ACCESSED: u64 = 1 << 5;
const DIRTY: u64 = 1 << 6;
const LEAF: u64 = 1 << 7;
const PHYS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// 3-level, 9-bits-per-level architecture used by every §8 scenario test.
pub struct FakeArch;

impl PagingArch for FakeArch {
    const LEVELS: u8 = 3;
    const BITS_PER_LEVEL: u8 = 9;
    const PAGESIZE: u64 = 4096;
    const SUPPORTS_SUPERPAGES: bool = true;
    const CANONICAL_HALF_SIZE: u64 = 1 << 38;
    const UPPER_HALF_START: u64 = 0xFFFF_FFC0_0000_0000;

    fn index_at(vaddr: u64, level: u8) -> usize {
        let shift = 12 + u32::from(level) * u32::from(Self::BITS_PER_LEVEL);
        ((vaddr >> shift) & 0x1FF) as usize
    }

    fn is_canonical(vaddr: u64) -> bool {
        let top = (vaddr as i64) >> 38;
        top == 0 || top == -1
    }

    fn decode(_level: u8, raw: u64) -> DecodedPte {
        if raw & VALID == 0 {
            return DecodedPte::Invalid;
        }
        if raw & LEAF == 0 {
            return DecodedPte::NonLeaf(PhysicalPage::from_addr(PhysicalAddress::new(raw & PHYS_MASK)));
        }
        let flags = LeafFlags {
            readable: true,
            writable: raw & WRITABLE != 0,
            executable: raw & EXEC != 0,
            user: raw & USER != 0,
            global: raw & GLOBAL != 0,
            accessed: raw & ACCESSED != 0,
            dirty: raw & DIRTY != 0,
        };
        DecodedPte::Leaf(PhysicalAddress::new(raw & PHYS_MASK), flags)
    }

    fn encode_nonleaf(next: PhysicalPage<Size4K>) -> u64 {
        VALID | (next.base().as_u64() & PHYS_MASK)
    }

    fn encode_leaf(_level: u8, phys: PhysicalAddress, flags: LeafFlags) -> u64 {
        let mut word = VALID | LEAF | (phys.as_u64() & PHYS_MASK);
        if flags.writable {
            word |= WRITABLE;
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

    unsafe fn fence() {}

    unsafe fn read_root() -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::zero())
    }

    unsafe fn write_root(_root: PhysicalPage<Size4K>) {}
}

/// In-memory "physical RAM": hands out heap-backed, 4 KiB-aligned frames and
/// lets the walker/mapper treat their heap addresses as physical addresses.
pub struct FakeRam {
    frames: RefCell<Vec<Box<Aligned4K>>>,
}

impl FakeRam {
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
        }
    }

    pub fn alloc_table(&self) -> PhysicalPage<Size4K> {
        let mut frame = Box::new(Aligned4K([0u8; 4096]));
        let ptr = frame.0.as_mut_ptr() as u64;
        self.frames.borrow_mut().push(frame);
        PhysicalPage::from_addr(PhysicalAddress::new(ptr))
    }

    pub fn write_entry(&self, table: PhysicalPage<Size4K>, _level: u8, index: usize, raw: u64) {
        let pte_paddr = PhysicalAddress::new(table.base().as_u64() + (index as u64) * 8);
        // SAFETY: `table` came from `alloc_table`, which keeps the frame alive
        // for the lifetime of `self`.
        unsafe {
            *self.phys_to_mut::<u64>(pte_paddr) = raw;
        }
    }

    pub fn read_entry(&self, table: PhysicalPage<Size4K>, index: usize) -> u64 {
        let pte_paddr = PhysicalAddress::new(table.base().as_u64() + (index as u64) * 8);
        // SAFETY: see `write_entry`.
        unsafe { *self.phys_to_ref::<u64>(pte_paddr) }
    }
}

impl PhysMapper for FakeRam {
    unsafe fn phys_to_ref<T>(&self, pa: PhysicalAddress) -> &T {
        // SAFETY: delegated to the caller per the trait's contract; in tests
        // `pa` always originates from `alloc_table`/`write_entry`.
        unsafe { &*(pa.as_u64() as *const T) }
    }

    unsafe fn phys_to_mut<T>(&self, pa: PhysicalAddress) -> &mut T {
        // SAFETY: see `phys_to_ref`.
        unsafe { &mut *(pa.as_u64() as *mut T) }
    }
}

/// [`PhysFrameAlloc`] over a [`FakeRam`]; never fails and ignores `free_frame`
/// (the boxed frames simply stay alive for the test's duration).
pub struct FakeFrameAlloc<'a> {
    pub ram: &'a FakeRam,
}

impl PhysFrameAlloc for FakeFrameAlloc<'_> {
    fn alloc_frame(&mut self, _zero: bool) -> Option<PhysicalPage<Size4K>> {
        Some(self.ram.alloc_table())
    }

    fn free_frame(&mut self, _frame: PhysicalPage<Size4K>) {}
}
