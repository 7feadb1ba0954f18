//! # Component F — Swapper
//!
//! Installs an address-translation context onto the running CPU on
//! trap-return, and issues cross-CPU TLB shootdown requests for global
//! mappings. See §4.F and §9's resolution of the cross-CPU shootdown open
//! question.

use crate::arch::PagingArch;
use crate::ctx::Ctx;

/// Bitmask of online CPUs, LSB = CPU 0. Used only to address
/// [`ShootdownSource::request_shootdown`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CpuMask(pub u64);

impl CpuMask {
    #[must_use]
    pub const fn all_except(self_cpu: u32) -> Self {
        Self(!0u64 & !(1u64 << self_cpu))
    }
}

/// Delivers an IPI-driven TLB fence request to every CPU in `mask`. Owned by
/// the interrupt-controller driver, outside this core; a no-op stub is
/// provided for single-CPU builds.
pub trait ShootdownSource {
    fn request_shootdown(&self, mask: CpuMask);
}

/// [`ShootdownSource`] for builds with exactly one CPU online — shootdown
/// has no other CPU to reach.
pub struct NoShootdown;

impl ShootdownSource for NoShootdown {
    fn request_shootdown(&self, _mask: CpuMask) {}
}

/// Reconfigure the CPU's paging register to point at `ctx` and issue the
/// architecture's memory-and-translation fence.
///
/// # Safety
/// `ctx.root()` must be a live, fully-populated top-level table whose upper
/// half matches the registry's master (or the calling thread will fault
/// against kernel mappings it should have).
pub unsafe fn swap_to<A: PagingArch>(ctx: Ctx) {
    // SAFETY: delegated to the caller per this function's contract.
    unsafe {
        A::write_root(ctx.root());
        A::fence();
    }
}

/// Trap-return hook: if `isr_ctx` names a user thread's context, swap to it.
/// A kernel thread (`None`) keeps running under the master context and no
/// swap is performed, matching §4.F's invariant.
///
/// # Safety
/// Same requirements as [`swap_to`], applied to `isr_ctx` when present.
pub unsafe fn swap_from_isr<A: PagingArch>(isr_ctx: Option<Ctx>) {
    if let Some(ctx) = isr_ctx {
        // SAFETY: delegated to the caller per this function's contract.
        unsafe {
            swap_to::<A>(ctx);
        }
    }
}

/// Request a cross-CPU shootdown after a global `map`/`unmap`, then flush
/// the requesting CPU's own TLB synchronously before returning — the
/// requesting CPU never waits on the other CPUs' fences to complete.
///
/// # Safety
/// Touches privileged CPU state via [`PagingArch::fence`]; may only be
/// called with the paging CSR already pointing at a valid root.
pub unsafe fn request_shootdown<A, S>(source: &S, mask: CpuMask)
where
    A: PagingArch,
    S: ShootdownSource,
{
    source.request_shootdown(mask);
    // SAFETY: delegated to the caller per this function's contract.
    unsafe {
        A::fence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeArch;
    use core::cell::Cell;

    struct RecordingSource {
        last: Cell<Option<CpuMask>>,
    }

    impl ShootdownSource for RecordingSource {
        fn request_shootdown(&self, mask: CpuMask) {
            self.last.set(Some(mask));
        }
    }

    #[test]
    fn swap_from_isr_is_noop_for_kernel_thread() {
        // SAFETY: `FakeArch::write_root`/`fence` are no-ops; the test-only
        // contract is vacuously satisfied.
        unsafe {
            swap_from_isr::<FakeArch>(None);
        }
    }

    #[test]
    fn request_shootdown_forwards_mask_to_source() {
        let source = RecordingSource { last: Cell::new(None) };
        let mask = CpuMask::all_except(0);
        // SAFETY: `FakeArch::fence` is a no-op.
        unsafe {
            request_shootdown::<FakeArch, _>(&source, mask);
        }
        assert_eq!(source.last.get(), Some(mask));
    }

    #[test]
    fn cpu_mask_all_except_excludes_self() {
        let mask = CpuMask::all_except(3);
        assert_eq!(mask.0 & (1 << 3), 0);
        assert_ne!(mask.0 & (1 << 0), 0);
    }
}
