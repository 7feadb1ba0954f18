//! PMP descriptor encoding, independent of how it eventually reaches
//! hardware registers (that's [`crate::bank::PmpRegisterBank`]'s job).

/// How a PMP entry's `addr` field is matched against an access address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchMode {
    /// Entry disabled.
    Off,
    /// Top-of-range: paired with the preceding entry's `addr` as the base.
    Tor,
    /// Naturally-aligned 4-byte region.
    Na4,
    /// Naturally-aligned power-of-two region ≥ 8 bytes.
    Napot,
}

impl MatchMode {
    const fn bits(self) -> u8 {
        match self {
            Self::Off => 0b00,
            Self::Tor => 0b01,
            Self::Na4 => 0b10,
            Self::Napot => 0b11,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Off,
            0b01 => Self::Tor,
            0b10 => Self::Na4,
            _ => Self::Napot,
        }
    }
}

/// One PMP entry's `cfg` byte, decomposed: `{R, W, X, match_mode, lock}`.
/// `lock` is always `false` — this core never produces locked entries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PmpCfg {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub match_mode: MatchMode,
    pub locked: bool,
}

impl PmpCfg {
    pub const DISABLED: Self = Self {
        readable: false,
        writable: false,
        executable: false,
        match_mode: MatchMode::Off,
        locked: false,
    };

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        let mut byte = 0u8;
        if self.readable {
            byte |= 1 << 0;
        }
        if self.writable {
            byte |= 1 << 1;
        }
        if self.executable {
            byte |= 1 << 2;
        }
        byte |= self.match_mode.bits() << 3;
        if self.locked {
            byte |= 1 << 7;
        }
        byte
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            readable: byte & (1 << 0) != 0,
            writable: byte & (1 << 1) != 0,
            executable: byte & (1 << 2) != 0,
            match_mode: MatchMode::from_bits(byte >> 3),
            locked: byte & (1 << 7) != 0,
        }
    }
}

/// One compiled hardware entry: a `cfg` byte plus its `addr` word (already
/// shifted per the encoding rules in §4.G — callers never interpret `addr`
/// themselves).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PmpDescriptor {
    pub cfg: PmpCfg,
    pub addr: u64,
}

impl PmpDescriptor {
    pub const DISABLED: Self = Self {
        cfg: PmpCfg::DISABLED,
        addr: 0,
    };
}
