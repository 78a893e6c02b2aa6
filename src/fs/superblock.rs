use serde::{Deserialize, Serialize};

use crate::utils::{
    digest,
    traits::{DigestInSelf, SerializeAndDigest},
};

use super::{FreeMap, FS_MAGIC, SECTOR_SIZE};

/// The superblock of this filesystem, stored in sector 0
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SuperBlock {
    /// magic number
    pub magic: u32,
    /// device sector size
    pub sector_size: u32,
    /// sectors on the device, including metadata
    pub sector_count: u32,
    /// first sector of the free map bitmap
    pub free_map_start: u32,
    /// sectors occupied by the free map bitmap
    pub free_map_sectors: u32,
    /// how many times this image has been mounted
    pub mount_count: u64,
    /// to verify the integrity of this superblock
    /// intend to use a fast secure hash function,like [blake3]
    pub digest: [u8; 32],
}

impl SuperBlock {
    pub fn new(sector_count: u32) -> Self {
        let mut superblock = Self {
            magic: FS_MAGIC,
            sector_size: SECTOR_SIZE as u32,
            sector_count,
            free_map_start: 1,
            free_map_sectors: FreeMap::bitmap_sectors(sector_count),
            mount_count: 0,
            digest: [0u8; 32],
        };
        superblock.digest();
        superblock
    }

    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC && self.sector_size == SECTOR_SIZE as u32
    }

    /// first sector not used by the superblock or the free map
    pub fn first_data_sector(&self) -> u32 {
        self.free_map_start + self.free_map_sectors
    }

    pub fn update_mount_count(&mut self) {
        self.mount_count += 1;
    }
}

impl DigestInSelf for SuperBlock {
    fn digest(&mut self) {
        self.digest = [0u8; 32];
        self.digest = digest::digest(self).expect("calculate digest failed");
    }

    fn verify_digest(&mut self) -> bool {
        // get digest from itself
        let digest = self.digest;
        // clear the digest from struct
        self.digest = [0u8; 32];
        // calulate the digest
        let digest2 = digest::digest(self).expect("calculate digest failed");
        // store newest digest to itself
        self.digest = digest2;
        digest == digest2
    }
}

impl SerializeAndDigest for SuperBlock {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::MemDevice, fs::SectorId};

    #[test]
    fn test_superblock_layout() {
        let superblock = SuperBlock::new(10_000);
        assert!(superblock.is_valid());
        assert_eq!(superblock.free_map_sectors, 3);
        assert_eq!(superblock.first_data_sector(), 4);
    }

    #[test]
    fn test_superblock_fits_in_a_sector() {
        let mut superblock = SuperBlock::new(4096);
        let bytes = superblock.serialize_to_vec().unwrap();
        assert!(bytes.len() <= SECTOR_SIZE);

        let (mut decoded, _) = SuperBlock::deserialize_from_slice(&bytes).unwrap();
        assert!(decoded.verify_digest());
        assert_eq!(decoded, superblock);
    }

    #[test]
    fn test_superblock_sector_round_trip() {
        let dev = MemDevice::new(4);
        let mut superblock = SuperBlock::new(4);
        superblock.update_mount_count();
        superblock.save_to_sector(&dev, SectorId::ZERO).unwrap();

        let loaded = SuperBlock::load_from_sector(&dev, SectorId::ZERO).unwrap();
        assert_eq!(loaded, superblock);
        assert_eq!(loaded.mount_count, 1);
    }

    #[test]
    fn test_tampered_superblock_is_rejected() {
        let mut superblock = SuperBlock::new(4096);
        let mut bytes = superblock.serialize_to_vec().unwrap();
        // flip a bit inside `sector_count`
        bytes[8] ^= 1;
        assert!(SuperBlock::deserialize_from_slice(&bytes).is_err());
    }
}
