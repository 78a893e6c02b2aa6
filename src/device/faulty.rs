//! a RAM device whose sectors can be told to fail
use std::collections::HashSet;

use anyhow::anyhow;
use parking_lot::Mutex;

use super::{BlockDevice, MemDevice};
use crate::fs::{Sector, SectorId};

#[derive(Debug)]
pub(crate) struct FaultyDevice {
    inner: MemDevice,
    // reads of these fail until healed
    bad_reads: Mutex<HashSet<SectorId>>,
    // the next write to each of these fails, once
    bad_writes: Mutex<HashSet<SectorId>>,
}

impl FaultyDevice {
    pub(crate) fn new(sectors: u32) -> Self {
        FaultyDevice {
            inner: MemDevice::new(sectors),
            bad_reads: Mutex::new(HashSet::new()),
            bad_writes: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn fail_reads(&self, sector: SectorId) {
        self.bad_reads.lock().insert(sector);
    }

    pub(crate) fn fail_next_write(&self, sector: SectorId) {
        self.bad_writes.lock().insert(sector);
    }

    pub(crate) fn heal(&self) {
        self.bad_reads.lock().clear();
        self.bad_writes.lock().clear();
    }
}

impl BlockDevice for FaultyDevice {
    fn read_sector(&self, sector: SectorId, buf: &mut Sector) -> anyhow::Result<()> {
        if self.bad_reads.lock().contains(&sector) {
            return Err(anyhow!("simulated read error at sector {sector}"));
        }
        self.inner.read_sector(sector, buf)
    }

    fn write_sector(&self, sector: SectorId, buf: &Sector) -> anyhow::Result<()> {
        if self.bad_writes.lock().remove(&sector) {
            return Err(anyhow!("simulated write error at sector {sector}"));
        }
        self.inner.write_sector(sector, buf)
    }

    fn sector_count(&self) -> u32 {
        self.inner.sector_count()
    }

    fn flush(&self) -> anyhow::Result<()> {
        self.inner.flush()
    }
}
