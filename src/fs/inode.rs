use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::{bytes_to_sectors, DiskInode, SectorId};

/// an open inode, shared by everyone who opened the same sector
pub type InodeHandle = Arc<Inode>;

/// the in-memory side of an inode header
///
/// Handles only come from [InodeTable::open](super::InodeTable::open), which
/// guarantees one handle per header sector.
#[derive(Debug)]
pub struct Inode {
    sector: SectorId,
    state: Mutex<InodeState>,
}

#[derive(Debug)]
pub(crate) struct InodeState {
    /// copy of the on-disk header
    pub disk: DiskInode,
    pub open_count: usize,
    /// deleted, reclaim once the last opener closes
    pub removed: bool,
    pub deny_write_count: usize,
}

impl Inode {
    pub(crate) fn new(sector: SectorId, disk: DiskInode) -> Self {
        Inode {
            sector,
            state: Mutex::new(InodeState {
                disk,
                open_count: 1,
                removed: false,
                deny_write_count: 0,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, InodeState> {
        self.state.lock()
    }
}

/// This block is about accessors on the cached state
impl Inode {
    /// the inode number, which is the sector of its header
    pub fn inumber(&self) -> SectorId {
        self.sector
    }

    /// length of the file in bytes
    pub fn length(&self) -> u64 {
        u64::from(self.state.lock().disk.length)
    }

    /// data sectors currently backing the file
    pub fn sector_count(&self) -> usize {
        bytes_to_sectors(self.length())
    }

    /// writers currently denied
    pub fn deny_count(&self) -> usize {
        self.state.lock().deny_write_count
    }

    /// openers of this handle
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    /// a copy of the header as last written
    pub fn disk_inode(&self) -> DiskInode {
        self.state.lock().disk
    }
}

/// This block is about lifecycle and write protection
impl Inode {
    /// open the same inode once more
    pub fn reopen(self: &Arc<Self>) -> InodeHandle {
        let mut state = self.state.lock();
        assert!(state.open_count > 0, "reopening closed inode {}", self.sector);
        state.open_count += 1;
        Arc::clone(self)
    }

    /// mark the inode deleted; its sectors go back when the last opener closes
    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    /// forbid writes until [allow_write](Self::allow_write) is called;
    /// may be called at most once per opener
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_count += 1;
        assert!(
            state.deny_write_count <= state.open_count,
            "inode {}: {} writers denied with only {} openers",
            self.sector,
            state.deny_write_count,
            state.open_count
        );
    }

    /// undo one [deny_write](Self::deny_write) of the same opener
    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        assert!(
            state.deny_write_count > 0,
            "inode {}: allow_write without deny_write",
            self.sector
        );
        assert!(state.deny_write_count <= state.open_count);
        state.deny_write_count -= 1;
    }
}
