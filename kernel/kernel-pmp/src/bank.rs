//! Abstract PMP hardware register file.
//!
//! RISC-V packs eight `cfg` bytes per `pmpcfgN` word (on RV64) but keeps one
//! `addr` register per descriptor, so the two halves need different
//! granularities: `cfg` writes may need a read-modify-write to avoid
//! clobbering neighboring descriptors outside the protected prefix; `addr`
//! writes never do.

/// Number of `cfg` bytes packed into one hardware `cfg` word (`pmpcfgN`) on
/// RV64. Kept here rather than per-architecture since this is a fixed
/// property of the PMP CSR layout, not something the Sv39/x86-64 split
/// affects (x86-64 doesn't have PMP at all; a no-MMU x86 target is out of
/// scope for this core).
pub const CFG_BYTES_PER_WORD: usize = 8;

/// The hardware register surface [`crate::swapper::apply`] writes through.
/// Implemented once per board/firmware; a test fake implements it over a
/// plain array.
pub trait PmpRegisterBank {
    /// Read the full `cfg` word containing descriptor indices
    /// `[word_index * CFG_BYTES_PER_WORD, word_index * CFG_BYTES_PER_WORD + CFG_BYTES_PER_WORD)`.
    fn read_cfg_word(&self, word_index: usize) -> u64;

    /// Write the full `cfg` word at `word_index`.
    fn write_cfg_word(&mut self, word_index: usize, value: u64);

    /// Write the `addr` register for descriptor `index`. One register per
    /// descriptor; never shared, so no read-modify-write is needed.
    fn write_addr(&mut self, index: usize, value: u64);
}
