//! # Address-space context
//!
//! A [`Ctx`] is nothing but the physical root of one address-translation
//! tree (§3). The `list_link`/ownership machinery lives in
//! [`crate::registry::ContextRegistry`], not here — `Ctx` itself is a plain
//! `Copy` value so it can be handed to the Mapper, Swapper, and Virt2Phys
//! without borrowing the registry.

use kernel_memory_addresses::{PhysicalPage, Size4K};

/// One address-translation context: the physical frame holding its
/// top-level page table, plus everything reachable from it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ctx {
    root: PhysicalPage<Size4K>,
}

impl Ctx {
    /// Wrap an already-populated root frame as a `Ctx`.
    #[must_use]
    pub const fn from_root(root: PhysicalPage<Size4K>) -> Self {
        Self { root }
    }

    /// The top-level page table's physical frame.
    #[must_use]
    pub const fn root(self) -> PhysicalPage<Size4K> {
        self.root
    }
}
