//! reading and writing file contents at byte offsets
use log::{debug, warn};

use super::{
    extend::extend, free_map::FreeSpace, index::byte_to_sector, DiskInode, Inode, InodeTable,
    Sector, SectorId, MAX_FILE_LENGTH, SECTOR_SIZE,
};
use crate::device::BlockDevice;

/// This block is about file I/O
impl<D: BlockDevice, F: FreeSpace> InodeTable<D, F> {
    /// read up to `buf.len()` bytes starting at `offset`
    /// # Return
    /// the bytes read, fewer than asked only at the end of the file
    pub fn read_at(&self, inode: &Inode, buf: &mut [u8], offset: u64) -> anyhow::Result<usize> {
        let disk = inode.disk_inode();
        let length = u64::from(disk.length);
        if offset >= length || buf.is_empty() {
            return Ok(0);
        }
        let end = length.min(offset.saturating_add(buf.len() as u64));
        debug!(
            "inode {}: read {} bytes at {offset}",
            inode.inumber(),
            end - offset
        );

        let mut pos = offset;
        let mut done = 0;
        while pos < end {
            let sector_ofs = (pos % SECTOR_SIZE as u64) as usize;
            let chunk = ((end - pos) as usize).min(SECTOR_SIZE - sector_ofs);
            let sector = self.sector_within_length(inode, &disk, pos)?;
            let dst = &mut buf[done..done + chunk];

            if chunk == SECTOR_SIZE {
                self.device.read_sector(sector, dst.try_into()?)?;
            } else {
                let mut staging: Sector = [0u8; SECTOR_SIZE];
                self.device.read_sector(sector, &mut staging)?;
                dst.copy_from_slice(&staging[sector_ofs..sector_ofs + chunk]);
            }
            pos += chunk as u64;
            done += chunk;
        }
        Ok(done)
    }

    /// write `buf` starting at `offset`, growing the file when the write ends past it
    ///
    /// The handle stays locked for the whole write, so writes to one file don't interleave.
    /// # Return
    /// the bytes written: 0 while writes are denied, fewer than `buf.len()`
    /// when the file could not grow far enough
    pub fn write_at(&self, inode: &Inode, buf: &[u8], offset: u64) -> anyhow::Result<usize> {
        let sector_id = inode.inumber();
        let mut state = inode.lock();
        if state.deny_write_count > 0 {
            debug!("inode {sector_id}: write denied");
            return Ok(0);
        }
        let end = offset
            .saturating_add(buf.len() as u64)
            .min(MAX_FILE_LENGTH);
        if end <= offset {
            if !buf.is_empty() {
                warn!("inode {sector_id}: write at {offset} is past the largest file");
            }
            return Ok(0);
        }
        if end > u64::from(state.disk.length) {
            let mut free = self.free_map.lock();
            let grown = extend(&self.device, &mut *free, sector_id, &mut state.disk, end)?;
            debug!(
                "inode {sector_id}: {} of {} wanted sectors added",
                grown.threaded, grown.wanted
            );
        }
        let disk = state.disk;
        let length = u64::from(disk.length);
        let limit = end.min(length);
        debug!("inode {sector_id}: write {} bytes at {offset}", buf.len());

        let mut pos = offset;
        let mut done = 0;
        while pos < limit {
            let sector_ofs = (pos % SECTOR_SIZE as u64) as usize;
            let chunk = ((limit - pos) as usize).min(SECTOR_SIZE - sector_ofs);
            let sector = self.sector_within_length(inode, &disk, pos)?;
            let src = &buf[done..done + chunk];

            if chunk == SECTOR_SIZE {
                self.device.write_sector(sector, src.try_into()?)?;
            } else {
                let mut staging: Sector = [0u8; SECTOR_SIZE];
                // the chunk reaches from the start of the sector to the end of
                // the file, nothing in this sector is worth keeping
                let overwrites_all = sector_ofs == 0 && pos + chunk as u64 >= length;
                if !overwrites_all {
                    self.device.read_sector(sector, &mut staging)?;
                }
                staging[sector_ofs..sector_ofs + chunk].copy_from_slice(src);
                self.device.write_sector(sector, &staging)?;
            }
            pos += chunk as u64;
            done += chunk;
        }

        if done < buf.len() {
            warn!(
                "inode {sector_id}: short write, {done} of {} bytes at {offset}",
                buf.len()
            );
        }
        Ok(done)
    }

    // a byte inside the length always has a sector, anything else is a broken index
    fn sector_within_length(
        &self,
        inode: &Inode,
        disk: &DiskInode,
        pos: u64,
    ) -> anyhow::Result<SectorId> {
        let sector = byte_to_sector(&self.device, disk, pos)?;
        Ok(sector.unwrap_or_else(|| {
            panic!(
                "inode {}: no sector for byte {pos} of {}",
                inode.inumber(),
                disk.length
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::{
        device::{faulty::FaultyDevice, CachedDevice, MemDevice},
        fs::{FreeMap, InodeHandle, DIRECT_POINTERS},
    };

    fn new_table<D: BlockDevice>(device: D) -> InodeTable<D> {
        let mut map = FreeMap::new(device.sector_count());
        map.reserve(SectorId::new(0).unwrap()).unwrap();
        InodeTable::new(device, map)
    }

    fn new_file<D: BlockDevice>(table: &InodeTable<D>) -> InodeHandle {
        let sector = table.free_map().allocate_one().unwrap();
        assert!(table.create(sector, 0).unwrap());
        table.open(sector).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_write_then_read_back() {
        let table = new_table(MemDevice::new(128));
        let file = new_file(&table);
        let data = pattern(10_000);

        assert_eq!(table.write_at(&file, &data, 0).unwrap(), data.len());
        assert_eq!(file.length(), 10_000);

        let mut back = vec![0u8; data.len()];
        assert_eq!(table.read_at(&file, &mut back, 0).unwrap(), data.len());
        assert_eq!(back, data);
        table.close(file).unwrap();
    }

    #[test]
    fn test_unaligned_overwrite_keeps_neighbours() {
        let table = new_table(MemDevice::new(64));
        let file = new_file(&table);
        table.write_at(&file, &[1u8; 2000], 0).unwrap();
        table.write_at(&file, &[9u8; 300], 400).unwrap();
        assert_eq!(file.length(), 2000);

        let mut back = vec![0u8; 2000];
        table.read_at(&file, &mut back, 0).unwrap();
        assert!(back[..400].iter().all(|b| *b == 1));
        assert!(back[400..700].iter().all(|b| *b == 9));
        assert!(back[700..].iter().all(|b| *b == 1));
        table.close(file).unwrap();
    }

    #[test]
    fn test_direct_then_single_indirect() {
        let table = new_table(MemDevice::new(64));
        let file = new_file(&table);
        let free_at_start = table.free_map().free_count();

        let full = (DIRECT_POINTERS * SECTOR_SIZE) as u64;
        assert_eq!(table.write_at(&file, &pattern(5120), 0).unwrap(), 5120);
        assert_eq!(file.length(), full);
        assert_eq!(file.disk_inode().single_indirect, None);
        assert_eq!(file.disk_inode().double_indirect, None);

        assert_eq!(table.write_at(&file, &[42], full).unwrap(), 1);
        assert_eq!(file.length(), 5121);
        assert!(file.disk_inode().single_indirect.is_some());
        assert_eq!(table.free_map().free_count(), free_at_start - 12);

        let mut byte = [0u8; 1];
        table.read_at(&file, &mut byte, full).unwrap();
        assert_eq!(byte, [42]);
        table.close(file).unwrap();
    }

    #[test]
    fn test_reads_stop_at_length() {
        let table = new_table(MemDevice::new(16));
        let file = new_file(&table);
        table.write_at(&file, &[5u8; 700], 0).unwrap();

        let mut buf = [0u8; 1000];
        assert_eq!(table.read_at(&file, &mut buf, 600).unwrap(), 100);
        assert_eq!(table.read_at(&file, &mut buf, 700).unwrap(), 0);
        assert_eq!(table.read_at(&file, &mut buf, 10_000).unwrap(), 0);
        table.close(file).unwrap();
    }

    #[test]
    fn test_gap_past_end_reads_as_zeros() {
        let table = new_table(MemDevice::new(32));
        let file = new_file(&table);
        table.write_at(&file, b"head", 0).unwrap();
        table.write_at(&file, b"tail", 3000).unwrap();
        assert_eq!(file.length(), 3004);

        let mut back = vec![0xffu8; 3004];
        table.read_at(&file, &mut back, 0).unwrap();
        assert_eq!(&back[..4], b"head");
        assert!(back[4..3000].iter().all(|b| *b == 0));
        assert_eq!(&back[3000..], b"tail");
        table.close(file).unwrap();
    }

    #[test]
    fn test_short_write_when_disk_fills() {
        // sector 0, the header and 4 data sectors
        let table = new_table(MemDevice::new(6));
        let file = new_file(&table);
        let data = pattern(10 * SECTOR_SIZE);

        let written = table.write_at(&file, &data, 0).unwrap();
        assert_eq!(written, 4 * SECTOR_SIZE);
        assert_eq!(file.length(), 4 * SECTOR_SIZE as u64);

        let mut back = vec![0u8; written];
        table.read_at(&file, &mut back, 0).unwrap();
        assert_eq!(back, data[..written]);
        // nothing left, nothing more lands
        assert_eq!(table.write_at(&file, &data, file.length()).unwrap(), 0);
        table.close(file).unwrap();
    }

    #[test]
    fn test_denied_writes_do_nothing() {
        let table = new_table(MemDevice::new(16));
        let file = new_file(&table);
        file.deny_write();
        assert_eq!(table.write_at(&file, b"data", 0).unwrap(), 0);
        assert_eq!(file.length(), 0);

        file.allow_write();
        assert_eq!(table.write_at(&file, b"data", 0).unwrap(), 4);
        table.close(file).unwrap();
    }

    #[test]
    fn test_write_past_max_file_length() {
        let table = new_table(MemDevice::new(16));
        let file = new_file(&table);
        assert_eq!(table.write_at(&file, b"x", MAX_FILE_LENGTH).unwrap(), 0);
        assert_eq!(file.length(), 0);
        table.close(file).unwrap();
    }

    #[test]
    fn test_failed_growth_keeps_file_and_free_space() {
        let table = new_table(FaultyDevice::new(64));
        let file = new_file(&table);
        let data = pattern(5121);
        table.write_at(&file, &data, 0).unwrap();
        let free_before = table.free_map().free_count();

        table.device().fail_next_write(file.inumber());
        assert!(table.write_at(&file, &[2u8; 512], 5121).is_err());
        assert_eq!(file.length(), 5121);
        assert_eq!(table.free_map().free_count(), free_before);

        assert_eq!(table.write_at(&file, &[2u8; 512], 5121).unwrap(), 512);
        assert_eq!(file.length(), 5633);
        let mut back = vec![0u8; 5633];
        table.read_at(&file, &mut back, 0).unwrap();
        assert_eq!(back[..5121], data[..]);
        assert!(back[5121..].iter().all(|b| *b == 2));
        table.close(file).unwrap();
    }

    #[test]
    fn test_byte_to_sector_is_stable() {
        let table = new_table(MemDevice::new(400));
        let file = new_file(&table);
        let other = new_file(&table);
        let length = 150 * SECTOR_SIZE as u64 + 9;
        table.write_at(&file, &pattern(length as usize), 0).unwrap();

        let map = |disk: &DiskInode| -> Vec<Option<SectorId>> {
            (0..length)
                .map(|pos| byte_to_sector(table.device(), disk, pos).unwrap())
                .collect()
        };
        let first = map(&file.disk_inode());
        assert!(first.iter().all(Option::is_some));
        assert_eq!(map(&file.disk_inode()), first);

        // bytes of one sector share it, and no two sectors collide
        for (k, chunk) in first.chunks(SECTOR_SIZE).enumerate() {
            assert!(chunk.iter().all(|s| *s == chunk[0]), "sector {k} split");
        }
        let mut distinct: Vec<_> = first.iter().step_by(SECTOR_SIZE).collect();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), 151);

        table.write_at(&other, &pattern(3000), 0).unwrap();
        table.write_at(&file, b"overwrite", 70_000).unwrap();
        assert_eq!(map(&file.disk_inode()), first);
        table.close(other).unwrap();
        table.close(file).unwrap();
    }

    #[test]
    fn test_same_results_through_a_cache() {
        let table = new_table(CachedDevice::new(MemDevice::new(400), 8).unwrap());
        let file = new_file(&table);
        let data = pattern(160 * SECTOR_SIZE + 17);
        assert_eq!(table.write_at(&file, &data, 3).unwrap(), data.len());

        let mut back = vec![0u8; data.len()];
        assert_eq!(table.read_at(&file, &mut back, 3).unwrap(), data.len());
        assert_eq!(back, data);
        let (hits, _) = table.device().stats();
        assert!(hits > 0);
        table.close(file).unwrap();
    }

    #[test]
    fn test_concurrent_writers_on_separate_files() {
        let table = Arc::new(new_table(MemDevice::new(512)));
        let workers: Vec<_> = (0..4u8)
            .map(|n| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    let file = new_file(&*table);
                    let data = vec![n; 20 * SECTOR_SIZE + 3];
                    for chunk in data.chunks(700) {
                        let at = file.length();
                        assert_eq!(table.write_at(&file, chunk, at).unwrap(), chunk.len());
                    }
                    let mut back = vec![0u8; data.len()];
                    table.read_at(&file, &mut back, 0).unwrap();
                    assert_eq!(back, data);
                    table.close(file).unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(table.open_count(), 0);
    }
}
