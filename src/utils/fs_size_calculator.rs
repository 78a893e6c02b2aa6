//! This module contains functions to calculate the size of differennt fs components

use crate::fs::{FreeMap, SECTOR_SIZE};

/// sectors used by the superblock and the free map bitmap
/// # Example
/// ```
/// use inodefs::utils::fs_size_calculator::metadata_sectors;
/// // superblock + 1 bitmap sector
/// assert_eq!(metadata_sectors(4096), 2);
/// assert_eq!(metadata_sectors(4097), 3);
/// ```
pub const fn metadata_sectors(sector_count: u32) -> u32 {
    1 + FreeMap::bitmap_sectors(sector_count)
}

/// whole sectors that fit in an image of `image_size` bytes
/// # Example
/// ```
/// use inodefs::utils::fs_size_calculator::sectors_in_image;
/// assert_eq!(sectors_in_image(1024), 2);
/// assert_eq!(sectors_in_image(1500), 2);
/// ```
pub const fn sectors_in_image(image_size: u64) -> u64 {
    image_size / SECTOR_SIZE as u64
}

/// smallest usable image: superblock, one bitmap sector
/// and one sector for an inode header
/// # Example
/// ```
/// use inodefs::utils::fs_size_calculator::min_image_size;
/// assert_eq!(min_image_size(), 3 * 512);
/// ```
pub const fn min_image_size() -> u64 {
    (metadata_sectors(1) as u64 + 1) * SECTOR_SIZE as u64
}
