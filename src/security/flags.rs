//! Security context capability flags.
//!
//! Bit values follow the GSS-API context flags so they read the same in
//! logs from either side.

use std::fmt;

/// Capability bitset requested from, or granted by, a mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ContextFlags(u8);

impl ContextFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Credential delegation.
    pub const DELEGATE: Self = Self(0x01);
    /// Both peers authenticated.
    pub const MUTUAL: Self = Self(0x02);
    /// Replay detection on wrapped messages.
    pub const REPLAY: Self = Self(0x04);
    /// Out-of-sequence detection on wrapped messages.
    pub const SEQUENCE: Self = Self(0x08);
    /// Confidentiality (encryption) available.
    pub const CONFIDENTIALITY: Self = Self(0x10);
    /// Integrity protection available.
    pub const INTEGRITY: Self = Self(0x20);

    const NAMES: [(ContextFlags, &'static str); 6] = [
        (Self::DELEGATE, "delegate"),
        (Self::MUTUAL, "mutual"),
        (Self::REPLAY, "replay"),
        (Self::SEQUENCE, "sequence"),
        (Self::CONFIDENTIALITY, "conf"),
        (Self::INTEGRITY, "integ"),
    ];

    /// Create flags from a raw byte.
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Get the raw byte value.
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Check that every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flags in `self` that are missing from `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Union of both sets.
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ContextFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl fmt::Display for ContextFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
