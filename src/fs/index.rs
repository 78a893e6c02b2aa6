//! translate a byte offset inside a file to the device sector holding it
use super::{
    DiskInode, IndexBlock, Sector, SectorId, DIRECT_POINTERS, POINTERS_PER_SECTOR, SECTOR_SIZE,
};
use crate::device::BlockDevice;

/// where the `k`-th data sector of a file is referenced from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotPosition {
    /// `direct[i]` of the header
    Direct(usize),
    /// entry `i` of the single-indirect block
    Single(usize),
    /// entry `inner` of the second-level block at entry `outer` of the double-indirect block
    Double { outer: usize, inner: usize },
}

impl SlotPosition {
    /// # Return
    /// `None` if `k` is beyond the largest file the index can describe
    pub(crate) fn of_block(k: usize) -> Option<Self> {
        if k < DIRECT_POINTERS {
            return Some(SlotPosition::Direct(k));
        }
        let k = k - DIRECT_POINTERS;
        if k < POINTERS_PER_SECTOR {
            return Some(SlotPosition::Single(k));
        }
        let k = k - POINTERS_PER_SECTOR;
        if k < POINTERS_PER_SECTOR * POINTERS_PER_SECTOR {
            return Some(SlotPosition::Double {
                outer: k / POINTERS_PER_SECTOR,
                inner: k % POINTERS_PER_SECTOR,
            });
        }
        None
    }
}

pub(crate) fn read_index<D>(device: &D, sector: SectorId) -> anyhow::Result<IndexBlock>
where
    D: BlockDevice + ?Sized,
{
    let mut buf: Sector = [0u8; SECTOR_SIZE];
    device.read_sector(sector, &mut buf)?;
    Ok(IndexBlock::from_sector(&buf))
}

/// the device sector holding byte `pos` of the file described by `inode`
///
/// every indirect level costs one more device read, there is no caching here
/// # Return
/// `Ok(None)` if `pos` lies beyond what the index currently references
pub(crate) fn byte_to_sector<D>(
    device: &D,
    inode: &DiskInode,
    pos: u64,
) -> anyhow::Result<Option<SectorId>>
where
    D: BlockDevice + ?Sized,
{
    let Ok(k) = usize::try_from(pos / SECTOR_SIZE as u64) else {
        return Ok(None);
    };
    let Some(position) = SlotPosition::of_block(k) else {
        return Ok(None);
    };
    let sector = match position {
        SlotPosition::Direct(i) => inode.direct[i],
        SlotPosition::Single(i) => match inode.single_indirect {
            Some(single) => read_index(device, single)?.get(i),
            None => None,
        },
        SlotPosition::Double { outer, inner } => match inode.double_indirect {
            Some(top) => match read_index(device, top)?.get(outer) {
                Some(second) => read_index(device, second)?.get(inner),
                None => None,
            },
            None => None,
        },
    };
    Ok(sector)
}
