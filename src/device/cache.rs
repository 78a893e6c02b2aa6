//! an optional sector cache placed between the inode layer and a device
//!
//! Current behavior:
//! - read caching of whole sectors
//! - write-through (writes update the cache and the underlying device immediately)
//! - least recently used eviction
use std::collections::{HashMap, VecDeque};

use anyhow::anyhow;
use parking_lot::Mutex;

use super::BlockDevice;
use crate::fs::{Sector, SectorId};

#[derive(Debug)]
pub struct CachedDevice<D: BlockDevice> {
    inner: D,
    state: Mutex<CacheState>,
}

#[derive(Debug)]
struct CacheState {
    resident: HashMap<SectorId, Box<Sector>>,
    // front is the least recently used sector
    recency: VecDeque<SectorId>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn touch(&mut self, sector: SectorId) {
        if let Some(pos) = self.recency.iter().position(|s| *s == sector) {
            self.recency.remove(pos);
        }
        self.recency.push_back(sector);
    }

    fn insert(&mut self, sector: SectorId, data: &Sector) {
        match self.resident.get_mut(&sector) {
            Some(cached) => cached.copy_from_slice(data),
            None => {
                while self.resident.len() >= self.capacity {
                    let Some(victim) = self.recency.pop_front() else {
                        break;
                    };
                    self.resident.remove(&victim);
                }
                self.resident.insert(sector, Box::new(*data));
            }
        }
        self.touch(sector);
    }
}

impl<D: BlockDevice> CachedDevice<D> {
    /// wrap `inner`, keeping at most `capacity` sectors resident
    pub fn new(inner: D, capacity: usize) -> anyhow::Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("sector cache capacity must be > 0"));
        }
        Ok(CachedDevice {
            inner,
            state: Mutex::new(CacheState {
                resident: HashMap::with_capacity(capacity),
                recency: VecDeque::with_capacity(capacity),
                capacity,
                hits: 0,
                misses: 0,
            }),
        })
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// (hits, misses) of sector reads so far
    pub fn stats(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.hits, state.misses)
    }
}

impl<D: BlockDevice> BlockDevice for CachedDevice<D> {
    fn read_sector(&self, sector: SectorId, buf: &mut Sector) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock();
            if let Some(cached) = state.resident.get(&sector) {
                buf.copy_from_slice(&cached[..]);
                state.hits += 1;
                state.touch(sector);
                return Ok(());
            }
            state.misses += 1;
        }

        self.inner.read_sector(sector, buf)?;
        self.state.lock().insert(sector, buf);
        Ok(())
    }

    fn write_sector(&self, sector: SectorId, buf: &Sector) -> anyhow::Result<()> {
        self.inner.write_sector(sector, buf)?;
        self.state.lock().insert(sector, buf);
        Ok(())
    }

    fn sector_count(&self) -> u32 {
        self.inner.sector_count()
    }

    fn flush(&self) -> anyhow::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::MemDevice, fs::SECTOR_SIZE};

    fn sector(raw: u32) -> SectorId {
        SectorId::new(raw).unwrap()
    }

    #[test]
    fn test_cache_hits_after_first_read() {
        let cache = CachedDevice::new(MemDevice::new(4), 2).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        cache.inner().write_sector(sector(1), &[3u8; SECTOR_SIZE]).unwrap();

        cache.read_sector(sector(1), &mut buf).unwrap();
        cache.read_sector(sector(1), &mut buf).unwrap();
        assert_eq!(buf, [3u8; SECTOR_SIZE]);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_cache_is_write_through() {
        let cache = CachedDevice::new(MemDevice::new(4), 2).unwrap();
        cache.write_sector(sector(2), &[9u8; SECTOR_SIZE]).unwrap();

        let mut buf = [0u8; SECTOR_SIZE];
        cache.inner().read_sector(sector(2), &mut buf).unwrap();
        assert_eq!(buf, [9u8; SECTOR_SIZE]);
        // served from the cache, no miss recorded
        cache.read_sector(sector(2), &mut buf).unwrap();
        assert_eq!(cache.stats(), (1, 0));
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = CachedDevice::new(MemDevice::new(4), 2).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        cache.read_sector(sector(0), &mut buf).unwrap();
        cache.read_sector(sector(1), &mut buf).unwrap();
        // touch 0 so 1 becomes the victim
        cache.read_sector(sector(0), &mut buf).unwrap();
        cache.read_sector(sector(2), &mut buf).unwrap();

        cache.read_sector(sector(0), &mut buf).unwrap();
        assert_eq!(cache.stats(), (2, 3));
        cache.read_sector(sector(1), &mut buf).unwrap();
        assert_eq!(cache.stats(), (2, 4));
    }

    #[test]
    fn test_cache_rejects_zero_capacity() {
        assert!(CachedDevice::new(MemDevice::new(1), 0).is_err());
    }
}
