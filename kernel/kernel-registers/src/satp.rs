use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// `MODE` field values for `satp` (RV64).
pub const MODE_BARE: u8 = 0;
pub const MODE_SV39: u8 = 8;
pub const MODE_SV48: u8 = 9;

/// `satp` — Supervisor Address Translation and Protection register (RV64).
///
/// Holds the translation mode, an address-space identifier, and the physical
/// page number of the root page table. Mirrors `CR3` on x86-64: writing it
/// switches the active address space.
#[bitfield(u64)]
pub struct Satp {
    /// Bits 0–43 — PPN of the root page table.
    #[bits(44)]
    ppn: u64,
    /// Bits 44–59 — Address-space identifier.
    #[bits(16)]
    pub asid: u16,
    /// Bits 60–63 — Translation mode (`MODE_BARE`, `MODE_SV39`, `MODE_SV48`).
    #[bits(4)]
    pub mode: u8,
}

impl Satp {
    /// Build a `satp` value selecting Sv39 with the given root and ASID.
    #[must_use]
    pub fn sv39(root_phys: PhysicalAddress, asid: u16) -> Self {
        debug_assert_eq!(root_phys.as_u64() & 0xFFF, 0, "root must be 4K-aligned");
        let mut satp = Self::new();
        satp.set_mode(MODE_SV39);
        satp.set_asid(asid);
        satp.set_ppn(root_phys.as_u64() >> 12);
        satp
    }

    /// Return the physical address of the root page table.
    #[must_use]
    pub const fn root_phys(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.ppn() << 12)
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Satp {
    unsafe fn load_unsafe() -> Self {
        let mut raw: u64;
        unsafe {
            core::arch::asm!("csrr {}, satp", out(reg) raw, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(raw)
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Satp {
    unsafe fn store_unsafe(self) {
        let raw = self.into_bits();
        unsafe {
            core::arch::asm!("csrw satp, {}", in(reg) raw, options(nostack, preserves_flags));
        }
    }
}
