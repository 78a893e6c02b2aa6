//! open an image file and mount the filesystem stored in it
use std::path::Path;

use log::debug;

use crate::{
    device::{CachedDevice, MmapDevice},
    fs::InodeFs,
};

/// the filesystem type the command line works with
pub type ImageFs = InodeFs<CachedDevice<MmapDevice>>;

/// mount the image at `image_path` behind a sector cache of `cache_sectors` sectors
pub fn mount<P>(image_path: P, cache_sectors: usize) -> anyhow::Result<ImageFs>
where
    P: AsRef<Path>,
{
    let device = MmapDevice::open(image_path)?;
    let device = CachedDevice::new(device, cache_sectors)?;
    debug!("sector cache holds {cache_sectors} sectors");
    InodeFs::mount(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mkfs::mkfs;

    #[test]
    fn test_mount_after_mkfs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");
        mkfs(&path, 256 * 1024).unwrap();

        let fs = mount(&path, 16).unwrap();
        assert_eq!(fs.superblock().mount_count, 1);
        fs.unmount().unwrap();
        let fs = mount(&path, 16).unwrap();
        assert_eq!(fs.superblock().mount_count, 2);
    }

    #[test]
    fn test_mount_rejects_zero_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");
        mkfs(&path, 256 * 1024).unwrap();
        assert!(mount(&path, 0).is_err());
    }
}
