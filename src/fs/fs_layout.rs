//! what does our filesystem look like on the device
use anyhow::anyhow;
use log::{info, warn};

use super::{FreeMap, FreeSpace, InodeTable, SectorId, SuperBlock};
use crate::{device::BlockDevice, utils::traits::SerializeAndDigest};

/// it has the following layout:
/// - superblock, in sector 0
/// - free map bitmap
/// - inode headers, index blocks and file data, wherever the free map puts them
#[derive(Debug)]
pub struct InodeFs<D: BlockDevice> {
    /// the superblock of this filesystem
    superblock: SuperBlock,
    /// open inodes and the free map they allocate from
    inodes: InodeTable<D, FreeMap>,
}

impl<D: BlockDevice> InodeFs<D> {
    /// write an empty filesystem to `device`
    /// # Return
    /// an [anyhow::Result] type,\
    /// which contains the mounted [InodeFs] if the operation is successful
    pub fn format(device: D) -> anyhow::Result<Self> {
        let sector_count = device.sector_count();
        let superblock = SuperBlock::new(sector_count);
        let first_data = superblock.first_data_sector();
        if first_data >= sector_count {
            return Err(anyhow!(
                "device of {sector_count} sectors has no room for data after {first_data} metadata sectors"
            ));
        }

        let mut free_map = FreeMap::new(sector_count);
        for raw in 0..first_data {
            let sector = SectorId::new(raw).ok_or_else(|| anyhow!("invalid sector {raw}"))?;
            free_map.reserve(sector)?;
        }

        let mut fs = InodeFs {
            superblock,
            inodes: InodeTable::new(device, free_map),
        };
        fs.sync()?;
        info!(
            "formatted {sector_count} sectors, {} free",
            fs.free_sectors()
        );
        Ok(fs)
    }

    /// restore the filesystem stored on `device`
    pub fn mount(device: D) -> anyhow::Result<Self> {
        let mut superblock = SuperBlock::load_from_sector(&device, SectorId::ZERO)?;
        if !superblock.is_valid() {
            return Err(anyhow!(
                "not an inode filesystem: magic {:#x}, sector size {}",
                superblock.magic,
                superblock.sector_size
            ));
        }
        if superblock.sector_count != device.sector_count() {
            return Err(anyhow!(
                "superblock describes {} sectors but the device has {}",
                superblock.sector_count,
                device.sector_count()
            ));
        }

        let start = SectorId::new(superblock.free_map_start)
            .ok_or_else(|| anyhow!("invalid free map start"))?;
        let free_map = FreeMap::load_from(&device, start, superblock.sector_count)?;
        superblock.update_mount_count();

        let mut fs = InodeFs {
            superblock,
            inodes: InodeTable::new(device, free_map),
        };
        fs.sync()?;
        info!(
            "mounted {} sectors ({} free), mount #{}",
            fs.superblock.sector_count,
            fs.free_sectors(),
            fs.superblock.mount_count
        );
        Ok(fs)
    }

    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    #[inline]
    pub fn inodes(&self) -> &InodeTable<D, FreeMap> {
        &self.inodes
    }

    pub fn free_sectors(&self) -> usize {
        self.inodes.free_map().free_count()
    }
}

/// [Inode](super::Inode) allocation and deletion
impl<D: BlockDevice> InodeFs<D> {
    /// create a file of `length` zero bytes
    /// # Return
    /// its inode number, or `None` if there is not enough free space
    pub fn allocate_inode(&self, length: u64) -> anyhow::Result<Option<SectorId>> {
        let Some(sector) = self.inodes.free_map().allocate_one() else {
            warn!("no free sector for a new inode");
            return Ok(None);
        };
        if self.inodes.create(sector, length)? {
            return Ok(Some(sector));
        }
        // give back what the partial create got
        self.delete(sector)?;
        Ok(None)
    }

    /// delete the file whose header is at `sector`
    ///
    /// Its sectors are released once every opener has closed it.
    pub fn delete(&self, sector: SectorId) -> anyhow::Result<()> {
        let inode = self.inodes.open(sector)?;
        inode.remove();
        self.inodes.close(inode)
    }

    /// persist the free map and the superblock, then flush the device
    pub fn sync(&mut self) -> anyhow::Result<()> {
        let device = self.inodes.device();
        let start = SectorId::new(self.superblock.free_map_start)
            .ok_or_else(|| anyhow!("invalid free map start"))?;
        self.inodes.free_map().save_to(device, start)?;
        self.superblock.save_to_sector(device, SectorId::ZERO)?;
        device.flush()
    }

    /// sync and hand the device back
    pub fn unmount(mut self) -> anyhow::Result<D> {
        let still_open = self.inodes.open_count();
        if still_open > 0 {
            warn!("unmounting with {still_open} inodes still open");
        }
        self.sync()?;
        info!("unmounted, {} sectors free", self.free_sectors());
        Ok(self.inodes.into_parts().0)
    }
}
