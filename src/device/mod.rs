//! sector-addressed devices the inode layer reads and writes through
use std::{ops::Range, sync::Arc};

use anyhow::anyhow;

use crate::fs::{Sector, SectorId, SECTOR_SIZE};

mod cache;
#[cfg(test)]
pub(crate) mod faulty;
mod memory;
mod mmap;
pub use cache::*;
pub use memory::*;
pub use mmap::*;

/// fixed-size sector read/write primitive
pub trait BlockDevice: Send + Sync {
    /// read one whole sector into `buf`
    fn read_sector(&self, sector: SectorId, buf: &mut Sector) -> anyhow::Result<()>;

    /// write one whole sector from `buf`
    fn write_sector(&self, sector: SectorId, buf: &Sector) -> anyhow::Result<()>;

    /// total number of sectors
    fn sector_count(&self) -> u32;

    /// flush pending writes to stable storage
    fn flush(&self) -> anyhow::Result<()>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for Arc<D> {
    fn read_sector(&self, sector: SectorId, buf: &mut Sector) -> anyhow::Result<()> {
        (**self).read_sector(sector, buf)
    }

    fn write_sector(&self, sector: SectorId, buf: &Sector) -> anyhow::Result<()> {
        (**self).write_sector(sector, buf)
    }

    fn sector_count(&self) -> u32 {
        (**self).sector_count()
    }

    fn flush(&self) -> anyhow::Result<()> {
        (**self).flush()
    }
}

/// byte range of `sector` inside a flat image of `sector_count` sectors
#[inline]
pub(crate) fn sector_range(sector: SectorId, sector_count: u32) -> anyhow::Result<Range<usize>> {
    if sector.get() >= sector_count {
        return Err(anyhow!(
            "sector {sector} out of range, device has {sector_count} sectors"
        ));
    }
    let start = sector.get() as usize * SECTOR_SIZE;
    Ok(start..start + SECTOR_SIZE)
}
