use anyhow::anyhow;
use bitvec::prelude::*;
use log::debug;
use smallvec::SmallVec;

use super::{Sector, SectorId, SECTOR_SIZE};
use crate::device::BlockDevice;

/// sectors handed out by one [FreeSpace::allocate] call
pub type SectorList = SmallVec<[SectorId; 16]>;

/// where free sectors come from and go back to
pub trait FreeSpace: Send {
    /// allocate up to `count` sectors
    /// # Return
    /// the allocated sectors, fewer than `count` (maybe none) when space runs out
    fn allocate(&mut self, count: usize) -> SectorList;

    /// release `count` consecutive sectors starting at `sector`
    fn release(&mut self, sector: SectorId, count: usize);

    /// number of sectors still free
    fn free_count(&self) -> usize;
}

/// a bitmap with one bit per device sector, a set bit means "in use"
#[derive(Debug, Default, Clone)]
pub struct FreeMap {
    bitmap: BitVec<u8, Lsb0>,
    next_free: Option<usize>,
}

/// for creating and persisting
impl FreeMap {
    /// a map of `sector_count` sectors, all free
    pub fn new(sector_count: u32) -> Self {
        Self::from_bitmap(BitVec::repeat(false, sector_count as usize))
    }

    fn from_bitmap(bitmap: BitVec<u8, Lsb0>) -> Self {
        let mut map = FreeMap {
            bitmap,
            next_free: None,
        };
        map.next_free = map.bitmap.first_zero();
        map
    }

    /// sectors needed to store the bitmap of a device with `sector_count` sectors
    /// # Example
    /// ```
    /// use inodefs::FreeMap;
    /// assert_eq!(FreeMap::bitmap_sectors(4096), 1);
    /// assert_eq!(FreeMap::bitmap_sectors(4097), 2);
    /// ```
    pub const fn bitmap_sectors(sector_count: u32) -> u32 {
        sector_count.div_ceil(SECTOR_SIZE as u32 * 8)
    }

    /// write the bitmap to the sectors starting at `start`
    pub fn save_to<D>(&self, device: &D, start: SectorId) -> anyhow::Result<()>
    where
        D: BlockDevice + ?Sized,
    {
        for (i, chunk) in self.bitmap.as_raw_slice().chunks(SECTOR_SIZE).enumerate() {
            let mut buf: Sector = [0u8; SECTOR_SIZE];
            buf[..chunk.len()].copy_from_slice(chunk);
            let sector = start
                .offset(i as u32)
                .ok_or_else(|| anyhow!("free map runs past the last sector"))?;
            device.write_sector(sector, &buf)?;
        }
        Ok(())
    }

    /// read back a bitmap covering `sector_count` sectors from the sectors starting at `start`
    pub fn load_from<D>(device: &D, start: SectorId, sector_count: u32) -> anyhow::Result<Self>
    where
        D: BlockDevice + ?Sized,
    {
        let sectors = Self::bitmap_sectors(sector_count);
        let mut raw = Vec::with_capacity(sectors as usize * SECTOR_SIZE);
        let mut buf: Sector = [0u8; SECTOR_SIZE];
        for i in 0..sectors {
            let sector = start
                .offset(i)
                .ok_or_else(|| anyhow!("free map runs past the last sector"))?;
            device.read_sector(sector, &mut buf)?;
            raw.extend_from_slice(&buf);
        }
        let mut bitmap = BitVec::<u8, Lsb0>::from_vec(raw);
        bitmap.truncate(sector_count as usize);
        Ok(Self::from_bitmap(bitmap))
    }
}

/// for sector allocation
impl FreeMap {
    /// total sectors tracked by this map
    pub fn len(&self) -> usize {
        self.bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// check if `sector` is in use
    pub fn is_allocated(&self, sector: SectorId) -> bool {
        self.bitmap
            .get(sector.get() as usize)
            .as_deref()
            .copied()
            .unwrap_or(false)
    }

    /// mark `sector` as used, for metadata laid out at format time
    pub fn reserve(&mut self, sector: SectorId) -> anyhow::Result<()> {
        let index = sector.get() as usize;
        if index >= self.bitmap.len() {
            return Err(anyhow!("can't reserve sector {sector}, map has {} sectors", self.len()));
        }
        self.bitmap.set(index, true);
        if self.next_free == Some(index) {
            self.next_free = self.next_free_after(index);
        }
        Ok(())
    }

    /// allocate a single free sector
    pub fn allocate_one(&mut self) -> Option<SectorId> {
        let index = self.next_free?;
        // the empty marker is never a valid sector, treat it as exhausted
        let sector = SectorId::new(u32::try_from(index).ok()?)?;
        self.bitmap.set(index, true);
        self.next_free = self.next_free_after(index);
        Some(sector)
    }

    // next free sector index after `index`
    fn next_free_after(&self, index: usize) -> Option<usize> {
        self.bitmap
            .get(index + 1..)
            .and_then(|rest| rest.first_zero())
            .map(|p| p + index + 1)
    }
}

impl FreeSpace for FreeMap {
    fn allocate(&mut self, count: usize) -> SectorList {
        let allocated: SectorList = std::iter::from_fn(|| self.allocate_one())
            .take(count)
            .collect();
        debug!(
            "free map: {} of {count} requested sectors allocated",
            allocated.len()
        );
        allocated
    }

    fn release(&mut self, sector: SectorId, count: usize) {
        let start = sector.get() as usize;
        for index in start..start + count {
            assert!(
                self.bitmap.get(index).as_deref().copied().unwrap_or(false),
                "releasing sector {index} which is not allocated"
            );
            self.bitmap.set(index, false);
        }
        if count > 0 {
            self.next_free = Some(self.next_free.map_or(start, |next| next.min(start)));
        }
    }

    fn free_count(&self) -> usize {
        self.bitmap.count_zeros()
    }
}
