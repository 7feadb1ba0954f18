//! # Kernel Configuration
//!
//! Centralizes the numeric configuration this kernel's paging core needs:
//! the virtual memory layout (higher-half split, HHDM base) and the handful
//! of per-build sizing constants (`PMP_COUNT`, `PMP_START`, `MAX_CONTEXTS`)
//! that `memprotect` and `kernel-pmp` are otherwise generic over.
//!
//! ## Architecture
//!
//! ### Memory Layout ([`memory`])
//! * **Address Space Layout**: user/kernel space boundary, reserved guard region
//! * **Higher Half Design**: kernel execution at high virtual addresses
//! * **Physical Memory Mapping**: HHDM (Higher Half Direct Mapping) base
//!
//! ### Configuration ([`config`])
//! * `PMP_COUNT` / `PMP_START` — the no-MMU PMP descriptor window
//! * `MAX_CONTEXTS` — the fixed capacity of `memprotect::registry::ContextRegistry`
//!
//! ```text
//! Virtual Address Space Layout (64-bit):
//!
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │                                 │
//!                       │         User Space              │
//!                       │    (Applications & Libraries)   │
//!                       │                                 │
//! LAST_USERSPACE_ADDRESS├─────────────────────────────────┤ 0xffff_efff_ffff_ffff
//!                       │        Guard Region             │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//!                       │   (Physical Memory Access)      │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │       Kernel Text & Data        │
//!                       │     (Kernel Executable)         │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! All layout constants are compile-time `const` values with `const _: () =
//! assert!(...)` checks guarding the invariants between them (see
//! [`memory`] and [`config`]), so a misconfigured build fails at compile
//! time rather than at boot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod memory;
