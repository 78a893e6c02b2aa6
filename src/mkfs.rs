//! create our filesystem
use std::path::Path;

use anyhow::anyhow;
use byte_unit::Byte;
use log::info;

use crate::{
    device::{BlockDevice, MmapDevice},
    fs::InodeFs,
    utils::fs_size_calculator::{min_image_size, sectors_in_image},
};

/// create a new filesystem, given the path of the image file and the image file size
/// # Params
/// - `image_file_path`: the path of the image file, it must not exist yet
/// - `file_size`: the size of the image file, rounded down to whole sectors
///
/// # Return
/// an [anyhow::Result] type to indicate whether the operation is successful
pub fn mkfs<P>(image_file_path: P, file_size: u64) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    // superblock + free map + at least one sector for an inode
    let space_needed = min_image_size();
    if file_size < space_needed {
        return Err(anyhow!(
            "File size must be at least {}",
            Byte::from_bytes(space_needed as _).get_appropriate_unit(true)
        ));
    }
    let sectors = u32::try_from(sectors_in_image(file_size)).map_err(|_| {
        anyhow!(
            "File size {} is too large",
            Byte::from_bytes(file_size as _).get_appropriate_unit(true)
        )
    })?;

    let device = MmapDevice::create(image_file_path.as_ref(), sectors)?;
    let device = InodeFs::format(device)?.unmount()?;
    info!(
        "created {} with {} sectors",
        image_file_path.as_ref().display(),
        device.sector_count()
    );
    Ok(())
}
