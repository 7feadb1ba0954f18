//! # Architecture capability trait
//!
//! The walker, mapper, and swapper are polymorphic over a single capability
//! set: how many paging levels exist, how many PTEs fit in a table, whether
//! superpages are permitted, and how to encode/decode a PTE word. Exactly one
//! of the `x86_64` / `riscv64` Cargo features selects the concrete
//! implementation; there is no runtime vtable because both architectures are
//! known at build time.

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

#[cfg(feature = "x86_64")]
pub mod x86_64;

#[cfg(feature = "riscv64")]
pub mod riscv64;

/// Decoded contents of a page-table entry, independent of architecture.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodedPte {
    /// The entry's valid bit is clear; no translation exists here.
    Invalid,
    /// A valid entry pointing at the next-lower-level table.
    NonLeaf(PhysicalPage<Size4K>),
    /// A valid entry terminating the walk at the given frame and flags.
    Leaf(PhysicalAddress, LeafFlags),
}

/// Architecture-neutral view of the permission/attribute bits carried by a
/// leaf PTE. Encoded into (and decoded from) the architecture's native PTE
/// layout by [`PagingArch::encode_leaf`] / [`PagingArch::decode`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LeafFlags {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub user: bool,
    pub global: bool,
    pub accessed: bool,
    pub dirty: bool,
}

impl LeafFlags {
    /// Readable, writable, kernel-only. The common case for freshly mapped
    /// kernel data.
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self {
            readable: true,
            writable: true,
            executable: false,
            user: false,
            global: false,
            accessed: false,
            dirty: false,
        }
    }

    /// At least one of R/W/X must be set for a PTE to be a legal leaf (§3).
    #[must_use]
    pub const fn is_leaf_legal(self) -> bool {
        self.readable || self.writable || self.executable
    }
}

/// Result of [`PagingArch::decode`] plus the level at which it was found,
/// shared by the walker and the Virt2Phys lookup.
#[derive(Clone, Copy, Debug)]
pub struct WalkStep {
    pub pte_paddr: PhysicalAddress,
    pub level: u8,
    pub decoded: DecodedPte,
}

/// The capability set an architecture backend must provide.
///
/// Implemented once per architecture (`X86_64`, `Sv39`) and selected by Cargo
/// feature; see `src/arch/`.
pub trait PagingArch {
    /// Paging levels, top to bottom. x86-64 (4-level) = 4, Sv39 = 3.
    const LEVELS: u8;
    /// `log2(entries_per_table)`; 9 on every architecture this crate supports.
    const BITS_PER_LEVEL: u8;
    /// Size of a base (level-0) page, in bytes.
    const PAGESIZE: u64;
    /// Whether a leaf PTE is permitted at a level above 0.
    const SUPPORTS_SUPERPAGES: bool;
    /// Size, in bytes, of one canonical half of the address space
    /// (`2^(BITS_PER_LEVEL*LEVELS + 12 - 1)`); used to classify VPNs.
    const CANONICAL_HALF_SIZE: u64;
    /// First virtual address of the upper (kernel) canonical half.
    const UPPER_HALF_START: u64;

    /// Extract the index into the table at `level` from a virtual address.
    /// `level` counts down from `LEVELS - 1` (top) to `0` (bottom).
    fn index_at(vaddr: u64, level: u8) -> usize;

    /// `true` iff `vaddr` lies in either canonical half.
    fn is_canonical(vaddr: u64) -> bool;

    /// Decode a raw PTE word read from table memory.
    fn decode(level: u8, raw: u64) -> DecodedPte;

    /// Encode a non-leaf PTE pointing at `next`.
    fn encode_nonleaf(next: PhysicalPage<Size4K>) -> u64;

    /// Encode a leaf PTE at `level` mapping `phys` with `flags`.
    fn encode_leaf(level: u8, phys: PhysicalAddress, flags: LeafFlags) -> u64;

    /// The zero word; always decodes to [`DecodedPte::Invalid`].
    fn zero() -> u64 {
        0
    }

    /// Issue the architecture's memory-and-translation fence: orders prior
    /// writes to page tables before subsequent translations and invalidates
    /// stale TLB entries for the currently active context.
    ///
    /// # Safety
    /// May only be called with the paging CSR already pointing at a valid
    /// root; touches privileged CPU state.
    unsafe fn fence();

    /// Load the active root from the paging CSR.
    ///
    /// # Safety
    /// Reads privileged CPU state; only meaningful once the CSR has been
    /// initialized by the boot path.
    unsafe fn read_root() -> PhysicalPage<Size4K>;

    /// Store `root` into the paging CSR, switching the active address space.
    /// Does not itself fence; callers combine with [`PagingArch::fence`].
    ///
    /// # Safety
    /// Touches privileged CPU state; the caller must ensure `root` is a live,
    /// fully-populated top-level table.
    unsafe fn write_root(root: PhysicalPage<Size4K>);
}

/// How a physical address is made dereferenceable by the caller — almost
/// always a higher-half direct map (HHDM) offset, but kept abstract so tests
/// can supply an in-memory fake.
pub trait PhysMapper {
    /// # Safety
    /// `pa` must refer to memory of at least `size_of::<T>()` bytes that is
    /// valid for the lifetime of the returned reference and not concurrently
    /// aliased mutably.
    unsafe fn phys_to_ref<T>(&self, pa: PhysicalAddress) -> &T;

    /// # Safety
    /// Same requirements as [`PhysMapper::phys_to_ref`], plus exclusive access.
    unsafe fn phys_to_mut<T>(&self, pa: PhysicalAddress) -> &mut T;
}

/// The `phys_page_alloc(order, zero) -> ppn` / `phys_page_free(ppn)`
/// contract from §6, restricted to the single-frame (`order = 0`) case this
/// core actually needs.
pub trait PhysFrameAlloc {
    /// Allocate one physical frame. `zero` requests the frame be cleared
    /// before handoff. Returns `None` on exhaustion.
    fn alloc_frame(&mut self, zero: bool) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame previously obtained from [`PhysFrameAlloc::alloc_frame`].
    fn free_frame(&mut self, frame: PhysicalPage<Size4K>);
}
