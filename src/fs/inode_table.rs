//! the directory of open inodes
//!
//! Locks are always taken in this order:
//! open inodes -> a handle's state -> free map
use std::{collections::HashMap, sync::Arc};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};

use super::{
    bytes_to_sectors,
    extend::extend,
    free_map::{FreeMap, FreeSpace},
    index::read_index,
    DiskInode, Inode, InodeHandle, Sector, SectorId, DIRECT_POINTERS, POINTERS_PER_SECTOR,
    SECTOR_SIZE,
};
use crate::device::BlockDevice;

/// every open inode of one device, at most one handle per header sector
#[derive(Debug)]
pub struct InodeTable<D: BlockDevice, F: FreeSpace = FreeMap> {
    pub(crate) device: D,
    /// the global allocation lock, held for any sector allocation or release
    pub(crate) free_map: Mutex<F>,
    open_inodes: Mutex<HashMap<SectorId, InodeHandle>>,
}

impl<D: BlockDevice, F: FreeSpace> InodeTable<D, F> {
    pub fn new(device: D, free_map: F) -> Self {
        InodeTable {
            device,
            free_map: Mutex::new(free_map),
            open_inodes: Mutex::new(HashMap::new()),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// lock the free map
    pub fn free_map(&self) -> MutexGuard<'_, F> {
        self.free_map.lock()
    }

    pub fn into_parts(self) -> (D, F) {
        (self.device, self.free_map.into_inner())
    }

    /// number of distinct inodes open
    pub fn open_count(&self) -> usize {
        self.open_inodes.lock().len()
    }

    pub fn is_open(&self, sector: SectorId) -> bool {
        self.open_inodes.lock().contains_key(&sector)
    }
}

/// This block is about creating, opening and closing inodes
impl<D: BlockDevice, F: FreeSpace> InodeTable<D, F> {
    /// write an empty header to `sector`, then grow the file to `length` zero bytes
    ///
    /// `sector` must have been allocated from the free map; whatever it held is overwritten.
    /// # Return
    /// `Ok(false)` if there was not enough free space for `length` bytes,
    /// the file then keeps whatever could be allocated
    pub fn create(&self, sector: SectorId, length: u64) -> anyhow::Result<bool> {
        let mut disk = DiskInode::new();
        self.device.write_sector(sector, &disk.to_sector())?;
        if length > 0 {
            let mut free = self.free_map.lock();
            extend(&self.device, &mut *free, sector, &mut disk, length)?;
        }
        let complete = u64::from(disk.length) == length;
        if complete {
            info!("created inode {sector} with length {length}");
        } else {
            warn!(
                "created inode {sector} with length {} instead of {length}",
                disk.length
            );
        }
        Ok(complete)
    }

    /// open the inode whose header is at `sector`
    ///
    /// Every open of the same sector returns the same handle.
    /// # Panics
    /// if `sector` does not hold an inode header
    pub fn open(&self, sector: SectorId) -> anyhow::Result<InodeHandle> {
        let mut open_inodes = self.open_inodes.lock();
        if let Some(inode) = open_inodes.get(&sector) {
            let inode = inode.reopen();
            debug!("inode {sector} opened, {} openers", inode.open_count());
            return Ok(inode);
        }

        let mut buf: Sector = [0u8; SECTOR_SIZE];
        self.device.read_sector(sector, &mut buf)?;
        let disk = DiskInode::from_sector(&buf);
        assert!(
            disk.is_valid(),
            "sector {sector} does not hold an inode header, magic is {:#x}",
            disk.magic
        );

        let inode = Arc::new(Inode::new(sector, disk));
        open_inodes.insert(sector, Arc::clone(&inode));
        info!("inode {sector} loaded, length {}", disk.length);
        Ok(inode)
    }

    /// another opener of an already open inode
    pub fn reopen(&self, inode: &InodeHandle) -> InodeHandle {
        inode.reopen()
    }

    /// close one opener of `inode`
    ///
    /// The last close drops the handle from the table; if the inode was
    /// removed, its header and every sector its index references are released.
    pub fn close(&self, inode: InodeHandle) -> anyhow::Result<()> {
        let sector = inode.inumber();
        let mut open_inodes = self.open_inodes.lock();
        let mut state = inode.lock();
        assert!(state.open_count > 0, "closing inode {sector} which is not open");
        state.open_count -= 1;
        assert!(
            state.deny_write_count <= state.open_count,
            "inode {sector} closed while its writers are still denied"
        );
        if state.open_count > 0 {
            debug!("inode {sector} closed, {} openers left", state.open_count);
            return Ok(());
        }

        open_inodes.remove(&sector);
        info!("inode {sector} closed by its last opener");
        if !state.removed {
            return Ok(());
        }

        // an unreadable index sector only costs the sectors below it
        let (owned, walked) = owned_sectors(&self.device, &state.disk);
        let mut free = self.free_map.lock();
        free.release(sector, 1);
        for s in &owned {
            free.release(*s, 1);
        }
        if let Err(e) = walked {
            error!(
                "inode {sector} deleted with {} sectors released, the rest are lost: {e:#}",
                owned.len() + 1
            );
            return Err(e);
        }
        info!(
            "inode {sector} deleted, {} sectors released",
            owned.len() + 1
        );
        Ok(())
    }
}

/// every data and index sector referenced by `disk`, data before the index sectors pointing at them
///
/// The walk follows the length, a file of `n` data sectors has exactly its
/// first `n` slots populated. An index sector that can't be read is still
/// listed but the sectors below it are not, the first such error comes back
/// next to the list.
/// # Panics
/// if a slot within the length is empty
fn owned_sectors<D>(device: &D, disk: &DiskInode) -> (Vec<SectorId>, anyhow::Result<()>)
where
    D: BlockDevice + ?Sized,
{
    let slot = |s: Option<SectorId>, k: usize| {
        s.unwrap_or_else(|| panic!("index has no sector for block {k} of {}", disk.length))
    };
    let mut walked = Ok(());
    let mut load = |sector: SectorId| match read_index(device, sector) {
        Ok(block) => Some(block),
        Err(e) => {
            error!("can't read index sector {sector}, the sectors below it leak: {e:#}");
            if walked.is_ok() {
                walked = Err(e);
            }
            None
        }
    };
    let data = bytes_to_sectors(u64::from(disk.length));
    let mut owned = Vec::with_capacity(data + 3);

    for (k, s) in disk.direct.iter().take(data).enumerate() {
        owned.push(slot(*s, k));
    }

    let mut first = DIRECT_POINTERS;
    if data > first {
        let single = slot(disk.single_indirect, first);
        if let Some(block) = load(single) {
            for i in 0..(data - first).min(POINTERS_PER_SECTOR) {
                owned.push(slot(block.get(i), first + i));
            }
        }
        owned.push(single);
    }

    first += POINTERS_PER_SECTOR;
    if data > first {
        let top = slot(disk.double_indirect, first);
        if let Some(top_block) = load(top) {
            let rest = data - first;
            for outer in 0..rest.div_ceil(POINTERS_PER_SECTOR) {
                let base = first + outer * POINTERS_PER_SECTOR;
                let second = slot(top_block.get(outer), base);
                if let Some(block) = load(second) {
                    for inner in 0..(data - base).min(POINTERS_PER_SECTOR) {
                        owned.push(slot(block.get(inner), base + inner));
                    }
                }
                owned.push(second);
            }
        }
        owned.push(top);
    }
    (owned, walked)
}
