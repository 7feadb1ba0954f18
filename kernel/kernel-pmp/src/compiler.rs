//! # Component G — PmpCompiler (no-MMU variant)
//!
//! Compiles a sorted, non-overlapping linear region list into a bounded set
//! of hardware PMP descriptors using NA4 / NAPOT / TOR encodings. See §4.G.

use crate::descriptor::{MatchMode, PmpCfg, PmpDescriptor};
use crate::error::PmpError;
use crate::region::Region;
use kernel_info::config::PMP_COUNT;
use log::warn;

/// A compiled set of up to [`PMP_COUNT`] descriptors, ready for
/// [`crate::swapper::apply`]. Slots beyond `len` are
/// [`PmpDescriptor::DISABLED`].
#[derive(Clone, Copy)]
pub struct PmpCtx {
    descriptors: [PmpDescriptor; PMP_COUNT],
    len: usize,
}

impl PmpCtx {
    const EMPTY: Self = Self {
        descriptors: [PmpDescriptor::DISABLED; PMP_COUNT],
        len: 0,
    };

    #[must_use]
    pub fn descriptors(&self) -> &[PmpDescriptor] {
        &self.descriptors[..self.len]
    }

    /// Every slot, including the disabled tail — what [`crate::swapper::apply`]
    /// actually writes to hardware.
    #[must_use]
    pub const fn all_slots(&self) -> &[PmpDescriptor; PMP_COUNT] {
        &self.descriptors
    }
}

/// Compile `regions` (assumed sorted by `paddr` and non-overlapping) into a
/// [`PmpCtx`]. Fails with [`PmpError::OutOfSlots`] if more than
/// [`PMP_COUNT`] descriptors would be required; the caller is expected to
/// keep running the process's previous `PmpCtx` in that case.
pub fn compile(regions: &[Region]) -> Result<PmpCtx, PmpError> {
    let mut ctx = PmpCtx::EMPTY;
    // Only a preceding TOR descriptor leaves a plain top-address in its
    // `addr` register that a following region can reuse as an implicit
    // base; NA4/NAPOT `addr` fields are masked/scaled and cannot be chained
    // from, even when the regions numerically abut (§8's S5: a NAPOT region
    // followed by an abutting 4-byte region still needs its own NA4 entry).
    let mut prev_tor_end: Option<u64> = None;

    for region in regions {
        let abuts = prev_tor_end == Some(region.paddr);

        if !abuts && region.size == 4 {
            push(&mut ctx, na4(region))?;
            prev_tor_end = None;
        } else if region.size >= 8 && region.size.is_power_of_two() && region.paddr % region.size == 0 {
            push(&mut ctx, napot(region))?;
            prev_tor_end = None;
        } else {
            if !abuts {
                push(
                    &mut ctx,
                    PmpDescriptor {
                        cfg: PmpCfg::DISABLED,
                        addr: region.paddr / 4,
                    },
                )?;
            }
            push(&mut ctx, tor(region))?;
            prev_tor_end = Some(region.end());
        }
    }

    Ok(ctx)
}

fn push(ctx: &mut PmpCtx, descriptor: PmpDescriptor) -> Result<(), PmpError> {
    if ctx.len >= PMP_COUNT {
        warn!("PmpCompiler: region list exceeds {PMP_COUNT} descriptor slots");
        return Err(PmpError::OutOfSlots);
    }
    ctx.descriptors[ctx.len] = descriptor;
    ctx.len += 1;
    Ok(())
}

fn rights(region: &Region) -> PmpCfg {
    PmpCfg {
        readable: true,
        writable: region.writable,
        executable: region.executable,
        match_mode: MatchMode::Na4,
        locked: false,
    }
}

fn na4(region: &Region) -> PmpDescriptor {
    PmpDescriptor {
        cfg: PmpCfg {
            match_mode: MatchMode::Na4,
            ..rights(region)
        },
        addr: region.paddr / 4,
    }
}

fn napot(region: &Region) -> PmpDescriptor {
    PmpDescriptor {
        cfg: PmpCfg {
            match_mode: MatchMode::Napot,
            ..rights(region)
        },
        addr: (region.paddr | (region.size / 2 - 1)) >> 2,
    }
}

fn tor(region: &Region) -> PmpDescriptor {
    PmpDescriptor {
        cfg: PmpCfg {
            match_mode: MatchMode::Tor,
            ..rights(region)
        },
        addr: region.end() / 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S5: a NAPOT-eligible region followed by an abutting 4-byte region
    /// compiles to exactly two descriptors.
    #[test]
    fn scenario_s5_napot_then_na4() {
        let regions = [
            Region::new(0x80000, 0x20000, true, false),
            Region::new(0xA0000, 4, false, true),
        ];

        let ctx = compile(&regions).unwrap();
        let descs = ctx.descriptors();
        assert_eq!(descs.len(), 2);

        assert_eq!(descs[0].cfg.match_mode, MatchMode::Napot);
        assert!(descs[0].cfg.readable && descs[0].cfg.writable && !descs[0].cfg.executable);
        assert_eq!(descs[0].addr, (0x80000u64 | (0x20000 / 2 - 1)) >> 2);

        assert_eq!(descs[1].cfg.match_mode, MatchMode::Na4);
        assert!(descs[1].cfg.executable && !descs[1].cfg.writable);
        assert_eq!(descs[1].addr, 0xA0000 / 4);
    }

    /// Property 7: decoding every descriptor back into a byte range (mentally
    /// executing NA4/NAPOT/TOR matching) reproduces exactly the input
    /// regions' byte coverage and rights, for well-aligned inputs.
    #[test]
    fn property_pmp_roundtrip() {
        let regions = [
            Region::new(0x80000, 0x20000, true, false),
            Region::new(0xA0000, 4, false, true),
            Region::new(0xB000, 0x800, true, true),
        ];
        let ctx = compile(&regions).unwrap();

        let mut covered = std::vec::Vec::new();
        let mut prev_addr_reg: Option<u64> = None;
        for d in ctx.descriptors() {
            match d.cfg.match_mode {
                MatchMode::Na4 => {
                    let base = d.addr * 4;
                    covered.push((base, base + 4, d.cfg.readable, d.cfg.writable, d.cfg.executable));
                }
                MatchMode::Napot => {
                    // The two low bits dropped by `>> 2` during encoding are
                    // always 1 for a valid NAPOT entry; restore them before
                    // recovering `size` from the trailing run of ones.
                    let trailing = d.addr.trailing_ones();
                    let size = 1u64 << (trailing + 3);
                    let preshift = (d.addr << 2) | 0b11;
                    let base = preshift & !(size - 1);
                    covered.push((base, base + size, d.cfg.readable, d.cfg.writable, d.cfg.executable));
                }
                MatchMode::Tor => {
                    let base = prev_addr_reg.unwrap_or(0) * 4;
                    let limit = d.addr * 4;
                    covered.push((base, limit, d.cfg.readable, d.cfg.writable, d.cfg.executable));
                }
                MatchMode::Off => {}
            }
            prev_addr_reg = Some(d.addr);
        }

        for region in &regions {
            let found = covered
                .iter()
                .any(|&(s, e, r, w, x)| s == region.paddr && e == region.end() && r && w == region.writable && x == region.executable);
            assert!(found, "region {region:?} not exactly covered by {covered:?}");
        }
    }

    /// S6: a region list needing more than `PMP_COUNT` descriptors fails and
    /// leaves no partial `PmpCtx` observable.
    #[test]
    fn scenario_s6_out_of_slots() {
        let mut regions = alloc_regions();
        // Force one descriptor per region (NA4, non-abutting) and exceed
        // PMP_COUNT.
        regions.truncate(PMP_COUNT + 1);
        let err = compile(&regions).unwrap_err();
        assert!(matches!(err, PmpError::OutOfSlots));
    }

    fn alloc_regions() -> std::vec::Vec<Region> {
        (0..=PMP_COUNT as u64 + 1)
            .map(|i| Region::new(i * 0x1000, 4, false, false))
            .collect()
    }

    /// Boundary: a 4-byte region abutting its predecessor produces TOR, not
    /// NA4.
    #[test]
    fn abutting_four_byte_region_is_tor_not_na4() {
        // 0x300 is not a power of two, so region 1 compiles via TOR and
        // leaves a plain top-address behind for region 2 to chain from.
        let regions = [Region::new(0x1000, 0x300, true, false), Region::new(0x1300, 4, false, false)];
        let ctx = compile(&regions).unwrap();
        let descs = ctx.descriptors();
        assert_eq!(descs.last().unwrap().cfg.match_mode, MatchMode::Tor);
    }

    /// Boundary: a NAPOT candidate whose base isn't self-aligned falls back
    /// to TOR.
    #[test]
    fn misaligned_napot_candidate_falls_back_to_tor() {
        let regions = [Region::new(0x1010, 0x1000, true, true)];
        let ctx = compile(&regions).unwrap();
        let descs = ctx.descriptors();
        assert_eq!(descs.last().unwrap().cfg.match_mode, MatchMode::Tor);
    }

    #[test]
    fn first_region_never_abuts() {
        let regions = [Region::new(0x2000, 4, true, false)];
        let ctx = compile(&regions).unwrap();
        assert_eq!(ctx.descriptors()[0].cfg.match_mode, MatchMode::Na4);
    }
}
