//! sector identifiers and the on-disk encoding of index slots
use std::fmt;

/// raw value written to disk for a slot that holds no sector
pub const EMPTY_SLOT: u32 = u32::MAX;

/// identifies one sector of the block device
///
/// `u32::MAX` is reserved for the empty slot marker and can never be wrapped
/// in a [SectorId], so an `Option<SectorId>` is always unambiguous.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectorId(u32);

impl SectorId {
    /// the first sector of a device
    pub const ZERO: SectorId = SectorId(0);

    /// wrap a raw sector number
    /// # Return
    /// `None` if `raw` is the reserved empty marker
    /// # Example
    /// ```
    /// use inodefs::SectorId;
    /// assert_eq!(SectorId::new(7).map(|s| s.get()), Some(7));
    /// assert!(SectorId::new(u32::MAX).is_none());
    /// ```
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == EMPTY_SLOT {
            None
        } else {
            Some(SectorId(raw))
        }
    }

    /// the raw sector number, as stored in index slots
    pub const fn get(self) -> u32 {
        self.0
    }

    /// sector `n` positions after this one
    pub fn offset(self, n: u32) -> Option<Self> {
        self.0.checked_add(n).and_then(SectorId::new)
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for SectorId {
    type Error = anyhow::Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(SectorId::new)
            .ok_or_else(|| anyhow::anyhow!("{value} is not a valid sector number"))
    }
}

/// decode one little-endian slot
#[inline]
pub(crate) fn decode_slot(bytes: [u8; 4]) -> Option<SectorId> {
    SectorId::new(u32::from_le_bytes(bytes))
}

/// encode one slot, empty slots become [EMPTY_SLOT]
#[inline]
pub(crate) fn encode_slot(slot: Option<SectorId>) -> [u8; 4] {
    slot.map_or(EMPTY_SLOT, SectorId::get).to_le_bytes()
}
