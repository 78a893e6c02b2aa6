use anyhow::anyhow;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    device::BlockDevice,
    fs::{Sector, SectorId, SECTOR_SIZE},
};

/// Trait for digesting an object which stores digest in the object itself
pub trait DigestInSelf {
    fn digest(&mut self);
    fn verify_digest(&mut self) -> bool;
}

/// Trait for serializing and deserializing an object which stores digest in the object itself
/// # Note
/// This trait is implemented for all types implementing
/// [Serialize] and [DeserializeOwned] and [DigestInSelf]
pub trait SerializeAndDigest: Serialize + DeserializeOwned + DigestInSelf {
    /// serialize into a [Vec](std::vec::Vec)
    fn serialize_to_vec(&mut self) -> anyhow::Result<Vec<u8>> {
        self.digest();
        let config = bincode::config::legacy();
        bincode::serde::encode_to_vec(self, config).map_err(|e| e.into())
    }

    /// deserialize from a slice
    /// # Returns
    /// A tuple containing the deserialized object and the number of bytes read
    fn deserialize_from_slice(buf: &[u8]) -> anyhow::Result<(Self, usize)> {
        let config = bincode::config::legacy();
        let (mut object, bytes_read): (Self, usize) =
            bincode::serde::decode_from_slice(buf, config)?;
        if !object.verify_digest() {
            Err(anyhow!(concat!(
                "deserialized object digest verification failed"
            )))
        } else {
            Ok((object, bytes_read))
        }
    }

    /// serialize into one device sector, the rest of the sector is zeroed
    fn save_to_sector<D>(&mut self, device: &D, sector: SectorId) -> anyhow::Result<()>
    where
        D: BlockDevice + ?Sized,
    {
        let bytes = self.serialize_to_vec()?;
        if bytes.len() > SECTOR_SIZE {
            return Err(anyhow!(
                "serialized object takes {} bytes, more than one sector",
                bytes.len()
            ));
        }
        let mut buf: Sector = [0u8; SECTOR_SIZE];
        buf[..bytes.len()].copy_from_slice(&bytes);
        device.write_sector(sector, &buf)
    }

    /// deserialize from one device sector
    fn load_from_sector<D>(device: &D, sector: SectorId) -> anyhow::Result<Self>
    where
        D: BlockDevice + ?Sized,
    {
        let mut buf: Sector = [0u8; SECTOR_SIZE];
        device.read_sector(sector, &mut buf)?;
        Self::deserialize_from_slice(&buf).map(|(object, _)| object)
    }
}
