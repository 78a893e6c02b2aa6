//! the inode layer of our filesystem
pub mod disk_inode;
mod extend;
mod file_io;
pub mod free_map;
pub mod fs_layout;
pub(crate) mod index;
pub mod inode;
pub mod inode_table;
pub mod sector;
pub mod superblock;
pub use disk_inode::*;
pub use free_map::*;
pub use fs_layout::*;
pub use inode::*;
pub use inode_table::*;
pub use sector::*;
pub use superblock::*;

/// size of one device sector in bytes
pub const SECTOR_SIZE: usize = 512;
/// direct slots in an inode header
pub const DIRECT_POINTERS: usize = 10;
/// slots in one index block
pub const POINTERS_PER_SECTOR: usize = SECTOR_SIZE / std::mem::size_of::<u32>();
/// most data sectors one file can reference
pub const MAX_FILE_SECTORS: usize =
    DIRECT_POINTERS + POINTERS_PER_SECTOR + POINTERS_PER_SECTOR * POINTERS_PER_SECTOR;
/// largest file length in bytes
pub const MAX_FILE_LENGTH: u64 = (MAX_FILE_SECTORS * SECTOR_SIZE) as u64;
/// identifies a sector holding an inode header
pub const INODE_MAGIC: u32 = 0x494e_4f44;
const FS_MAGIC: u32 = 0x1324b;

/// one sector worth of bytes
pub type Sector = [u8; SECTOR_SIZE];

/// number of sectors needed to hold `size` bytes
/// # Example
/// ```
/// use inodefs::bytes_to_sectors;
/// assert_eq!(bytes_to_sectors(0), 0);
/// assert_eq!(bytes_to_sectors(1), 1);
/// assert_eq!(bytes_to_sectors(512), 1);
/// assert_eq!(bytes_to_sectors(5121), 11);
/// ```
#[inline]
pub const fn bytes_to_sectors(size: u64) -> usize {
    size.div_ceil(SECTOR_SIZE as u64) as usize
}
