//! an image file mapped into memory, used like a block device (`/dev/sda1`)
use std::{fs::OpenOptions, path::Path};

use anyhow::anyhow;
use log::info;
use memmap2::MmapMut;
use parking_lot::Mutex;

use super::{sector_range, BlockDevice};
use crate::fs::{Sector, SectorId, SECTOR_SIZE};

#[derive(Debug)]
pub struct MmapDevice {
    map: Mutex<MmapMut>,
    sectors: u32,
}

impl MmapDevice {
    /// map an existing image file for read and write
    /// # Params
    /// - `image_path`: the path of the image file, its length must be a multiple of [SECTOR_SIZE]
    pub fn open<P>(image_path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(image_path.as_ref())?;
        let len = file.metadata()?.len();
        if len == 0 || len % SECTOR_SIZE as u64 != 0 {
            return Err(anyhow!(
                "image length {len} is not a non-zero multiple of the sector size {SECTOR_SIZE}"
            ));
        }
        let sectors = u32::try_from(len / SECTOR_SIZE as u64)
            .map_err(|_| anyhow!("image of {len} bytes has too many sectors"))?;

        // Safety
        // This method returns an error when the underlying system call fails,
        // which can happen for a variety of reasons,
        // such as when the file is not open with read and write permissions.
        // from https://docs.rs/memmap2/0.5.10/memmap2/struct.MmapMut.html
        let map = unsafe { MmapMut::map_mut(&file)? };
        info!(
            "mapped image {} with {sectors} sectors",
            image_path.as_ref().display()
        );
        Ok(MmapDevice {
            map: Mutex::new(map),
            sectors,
        })
    }

    /// create a new zero-filled image file holding `sectors` sectors and map it
    ///
    /// fails if the file already exists
    pub fn create<P>(image_path: P, sectors: u32) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(image_path.as_ref())?;
        // all regions are zero after `set_len`
        file.set_len(sectors as u64 * SECTOR_SIZE as u64)?;
        drop(file);
        Self::open(image_path)
    }
}

impl BlockDevice for MmapDevice {
    fn read_sector(&self, sector: SectorId, buf: &mut Sector) -> anyhow::Result<()> {
        let range = sector_range(sector, self.sectors)?;
        buf.copy_from_slice(&self.map.lock()[range]);
        Ok(())
    }

    fn write_sector(&self, sector: SectorId, buf: &Sector) -> anyhow::Result<()> {
        let range = sector_range(sector, self.sectors)?;
        self.map.lock()[range].copy_from_slice(buf);
        Ok(())
    }

    fn sector_count(&self) -> u32 {
        self.sectors
    }

    fn flush(&self) -> anyhow::Result<()> {
        Ok(self.map.lock().flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmap_device_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let five = SectorId::new(5).unwrap();
        {
            let dev = MmapDevice::create(&path, 8).unwrap();
            assert_eq!(dev.sector_count(), 8);
            dev.write_sector(five, &[0xab; SECTOR_SIZE]).unwrap();
            dev.flush().unwrap();
        }
        let dev = MmapDevice::open(&path).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_sector(five, &mut buf).unwrap();
        assert_eq!(buf, [0xab; SECTOR_SIZE]);
        assert!(dev.read_sector(SectorId::new(8).unwrap(), &mut buf).is_err());
    }

    #[test]
    fn test_mmap_device_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        MmapDevice::create(&path, 2).unwrap();
        assert!(MmapDevice::create(&path, 2).is_err());
    }

    #[test]
    fn test_mmap_device_rejects_unaligned_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.img");
        std::fs::write(&path, [0u8; 700]).unwrap();
        assert!(MmapDevice::open(&path).is_err());
    }
}
