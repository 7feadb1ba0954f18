//! # Component E — ContextRegistry
//!
//! Owns the master context and a doubly-linked list of every live
//! non-master context. The workspace carries no heap allocator, so the list
//! is a fixed-size slab of slots linked by index rather than `Box`/`Rc` —
//! the "arena + index" alternative §9 calls out explicitly. See §4.E.

use crate::arch::{DecodedPte, PagingArch, PhysFrameAlloc, PhysMapper};
use crate::ctx::Ctx;
use kernel_info::config::MAX_CONTEXTS;
use kernel_memory_addresses::PhysicalPage;
use kernel_memory_addresses::Size4K;
use kernel_sync::SpinMutex;
use log::{debug, warn};

#[derive(Clone, Copy)]
enum Slot {
    Empty,
    Used {
        root: PhysicalPage<Size4K>,
        prev: Option<usize>,
        next: Option<usize>,
    },
}

struct RegistryInner {
    slots: [Slot; MAX_CONTEXTS],
    head: Option<usize>,
}

impl RegistryInner {
    const fn new() -> Self {
        Self {
            slots: [Slot::Empty; MAX_CONTEXTS],
            head: None,
        }
    }

    fn alloc_slot(&mut self, root: PhysicalPage<Size4K>) -> Option<usize> {
        let index = self.slots.iter().position(|s| matches!(s, Slot::Empty))?;
        let old_head = self.head;
        if let Some(h) = old_head {
            if let Slot::Used { prev, .. } = &mut self.slots[h] {
                *prev = Some(index);
            }
        }
        self.slots[index] = Slot::Used {
            root,
            prev: None,
            next: old_head,
        };
        self.head = Some(index);
        Some(index)
    }

    fn free_slot(&mut self, index: usize) -> Option<PhysicalPage<Size4K>> {
        let Slot::Used { root, prev, next } = self.slots[index] else {
            return None;
        };
        match prev {
            Some(p) => {
                if let Slot::Used { next: pn, .. } = &mut self.slots[p] {
                    *pn = next;
                }
            }
            None => self.head = next,
        }
        if let Some(n) = next {
            if let Slot::Used { prev: np, .. } = &mut self.slots[n] {
                *np = prev;
            }
        }
        self.slots[index] = Slot::Empty;
        Some(root)
    }

    fn iter_roots(&self) -> impl Iterator<Item = PhysicalPage<Size4K>> + '_ {
        let mut cur = self.head;
        core::iter::from_fn(move || {
            let idx = cur?;
            let Slot::Used { root, next, .. } = self.slots[idx] else {
                return None;
            };
            cur = next;
            Some(root)
        })
    }
}

/// Owns the master context and the registry lock guarding the context list.
/// Intended to live in a single process-wide `static` behind
/// `kernel_sync::SyncOnceCell` (§9's "global mutable state" resolution).
pub struct ContextRegistry {
    master: Ctx,
    inner: SpinMutex<RegistryInner>,
}

impl ContextRegistry {
    /// Wrap an already-populated master root as the registry's root context.
    #[must_use]
    pub const fn new(master: Ctx) -> Self {
        Self {
            master,
            inner: SpinMutex::from_raw(kernel_sync::RawSpin::new(), RegistryInner::new()),
        }
    }

    #[must_use]
    pub const fn master(&self) -> Ctx {
        self.master
    }

    /// Allocate a root frame, copy the master's current upper half into it,
    /// and link it into the registry. Returns `None` on frame exhaustion —
    /// process creation is allowed to fail, unlike an in-flight `map`.
    pub fn create_context<A, M, F>(&self, mapper: &M, alloc: &mut F) -> Option<Ctx>
    where
        A: PagingArch,
        M: PhysMapper,
        F: PhysFrameAlloc,
    {
        let root = alloc.alloc_frame(true)?;
        copy_upper_half::<A, M>(root, self.master.root(), mapper);
        let mut inner = self.inner.lock();
        match inner.alloc_slot(root) {
            Some(_) => {
                debug!("create_context: root={root:?}");
                Some(Ctx::from_root(root))
            }
            None => {
                warn!("create_context: registry slab exhausted");
                alloc.free_frame(root);
                None
            }
        }
    }

    /// Unlink `ctx`, free every intermediate and leaf frame reachable from
    /// its *lower* half (upper-half entries point at frames shared with the
    /// master and other contexts, and must never be freed here), then free
    /// the root itself.
    pub fn destroy_context<A, M, F>(&self, ctx: Ctx, mapper: &M, alloc: &mut F)
    where
        A: PagingArch,
        M: PhysMapper,
        F: PhysFrameAlloc,
    {
        let mut inner = self.inner.lock();
        let index = inner
            .slots
            .iter()
            .position(|s| matches!(s, Slot::Used { root, .. } if *root == ctx.root()));
        let Some(index) = index else {
            warn!("destroy_context: ctx not found in registry");
            return;
        };
        inner.free_slot(index);
        drop(inner);

        free_lower_half::<A, M, F>(ctx.root(), mapper, alloc);
        alloc.free_frame(ctx.root());
        debug!("destroy_context: freed root={:?}", ctx.root());
    }

    /// Snapshot of every live non-master context, oldest-linked last. Used
    /// by [`crate::broadcast`].
    pub(crate) fn with_contexts<R>(&self, f: impl FnOnce(&[PhysicalPage<Size4K>]) -> R) -> R {
        let inner = self.inner.lock();
        let mut buf = [PhysicalPage::<Size4K>::from_addr(kernel_memory_addresses::PhysicalAddress::zero()); MAX_CONTEXTS];
        let mut n = 0;
        for root in inner.iter_roots() {
            buf[n] = root;
            n += 1;
        }
        drop(inner);
        f(&buf[..n])
    }
}

fn upper_half_start_index<A: PagingArch>() -> usize {
    A::index_at(A::UPPER_HALF_START, A::LEVELS - 1)
}

fn copy_upper_half<A, M>(dst: PhysicalPage<Size4K>, src: PhysicalPage<Size4K>, mapper: &M)
where
    A: PagingArch,
    M: PhysMapper,
{
    let entries = 1usize << A::BITS_PER_LEVEL;
    let start = upper_half_start_index::<A>();
    for i in start..entries {
        let src_paddr = kernel_memory_addresses::PhysicalAddress::new(src.base().as_u64() + (i as u64) * 8);
        let dst_paddr = kernel_memory_addresses::PhysicalAddress::new(dst.base().as_u64() + (i as u64) * 8);
        // SAFETY: both `src` and `dst` are live, fully-allocated top-level
        // tables; `dst` is not yet reachable from any other context.
        unsafe {
            let raw = *mapper.phys_to_ref::<u64>(src_paddr);
            *mapper.phys_to_mut::<u64>(dst_paddr) = raw;
        }
    }
}

fn free_lower_half<A, M, F>(root: PhysicalPage<Size4K>, mapper: &M, alloc: &mut F)
where
    A: PagingArch,
    M: PhysMapper,
    F: PhysFrameAlloc,
{
    let entries = 1usize << A::BITS_PER_LEVEL;
    let start = upper_half_start_index::<A>();
    for i in 0..start.min(entries) {
        let pte_paddr = kernel_memory_addresses::PhysicalAddress::new(root.base().as_u64() + (i as u64) * 8);
        // SAFETY: `root` is a live top-level table belonging to the context
        // being destroyed; no other context shares its lower half.
        let raw = unsafe { *mapper.phys_to_ref::<u64>(pte_paddr) };
        if let DecodedPte::NonLeaf(next) = A::decode(A::LEVELS - 1, raw) {
            free_subtree::<A, M, F>(next, A::LEVELS - 2, mapper, alloc);
        }
    }
}

fn free_subtree<A, M, F>(table: PhysicalPage<Size4K>, level: u8, mapper: &M, alloc: &mut F)
where
    A: PagingArch,
    M: PhysMapper,
    F: PhysFrameAlloc,
{
    let entries = 1usize << A::BITS_PER_LEVEL;
    for i in 0..entries {
        let pte_paddr = kernel_memory_addresses::PhysicalAddress::new(table.base().as_u64() + (i as u64) * 8);
        // SAFETY: `table` is reachable only from the context being
        // destroyed; nothing else may observe this table concurrently.
        let raw = unsafe { *mapper.phys_to_ref::<u64>(pte_paddr) };
        if let DecodedPte::NonLeaf(next) = A::decode(level, raw) {
            if level > 0 {
                free_subtree::<A, M, F>(next, level - 1, mapper, alloc);
            }
        }
    }
    alloc.free_frame(table);
}
