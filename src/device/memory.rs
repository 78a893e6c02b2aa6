use parking_lot::Mutex;

use super::{sector_range, BlockDevice};
use crate::fs::{Sector, SectorId, SECTOR_SIZE};

/// a device kept entirely in RAM, every sector starts zeroed
#[derive(Debug)]
pub struct MemDevice {
    bytes: Mutex<Vec<u8>>,
    sectors: u32,
}

impl MemDevice {
    pub fn new(sectors: u32) -> Self {
        MemDevice {
            bytes: Mutex::new(vec![0u8; sectors as usize * SECTOR_SIZE]),
            sectors,
        }
    }
}

impl BlockDevice for MemDevice {
    fn read_sector(&self, sector: SectorId, buf: &mut Sector) -> anyhow::Result<()> {
        let range = sector_range(sector, self.sectors)?;
        buf.copy_from_slice(&self.bytes.lock()[range]);
        Ok(())
    }

    fn write_sector(&self, sector: SectorId, buf: &Sector) -> anyhow::Result<()> {
        let range = sector_range(sector, self.sectors)?;
        self.bytes.lock()[range].copy_from_slice(buf);
        Ok(())
    }

    fn sector_count(&self) -> u32 {
        self.sectors
    }

    fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
