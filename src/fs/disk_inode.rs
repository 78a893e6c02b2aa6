//! what an inode header and an index block look like on disk
use super::{
    sector::{decode_slot, encode_slot},
    Sector, SectorId, DIRECT_POINTERS, INODE_MAGIC, POINTERS_PER_SECTOR, SECTOR_SIZE,
};

const SINGLE_OFFSET: usize = DIRECT_POINTERS * 4;
const DOUBLE_OFFSET: usize = SINGLE_OFFSET + 4;
const LENGTH_OFFSET: usize = DOUBLE_OFFSET + 4;
const MAGIC_OFFSET: usize = LENGTH_OFFSET + 4;
const HEADER_END: usize = MAGIC_OFFSET + 4;

/// the inode header, exactly one sector on disk
///
/// layout (little-endian):
/// - `direct[10]`
/// - `single_indirect`
/// - `double_indirect`
/// - `length`
/// - `magic`
/// - zero padding up to [SECTOR_SIZE]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskInode {
    pub direct: [Option<SectorId>; DIRECT_POINTERS],
    pub single_indirect: Option<SectorId>,
    pub double_indirect: Option<SectorId>,
    /// file size in bytes
    pub length: u32,
    pub magic: u32,
}

impl Default for DiskInode {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskInode {
    /// an empty, zero-length header
    pub const fn new() -> Self {
        DiskInode {
            direct: [None; DIRECT_POINTERS],
            single_indirect: None,
            double_indirect: None,
            length: 0,
            magic: INODE_MAGIC,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    pub fn to_sector(&self) -> Box<Sector> {
        let mut buf = Box::new([0u8; SECTOR_SIZE]);
        for (i, slot) in self.direct.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&encode_slot(*slot));
        }
        buf[SINGLE_OFFSET..DOUBLE_OFFSET].copy_from_slice(&encode_slot(self.single_indirect));
        buf[DOUBLE_OFFSET..LENGTH_OFFSET].copy_from_slice(&encode_slot(self.double_indirect));
        buf[LENGTH_OFFSET..MAGIC_OFFSET].copy_from_slice(&self.length.to_le_bytes());
        buf[MAGIC_OFFSET..HEADER_END].copy_from_slice(&self.magic.to_le_bytes());
        buf
    }

    /// decode a header, the magic is NOT checked here
    pub fn from_sector(buf: &Sector) -> Self {
        let mut direct = [None; DIRECT_POINTERS];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = decode_slot(word(buf, i * 4));
        }
        DiskInode {
            direct,
            single_indirect: decode_slot(word(buf, SINGLE_OFFSET)),
            double_indirect: decode_slot(word(buf, DOUBLE_OFFSET)),
            length: u32::from_le_bytes(word(buf, LENGTH_OFFSET)),
            magic: u32::from_le_bytes(word(buf, MAGIC_OFFSET)),
        }
    }
}

/// an index sector: 128 slots of sector identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBlock {
    pub entries: [Option<SectorId>; POINTERS_PER_SECTOR],
}

impl Default for IndexBlock {
    fn default() -> Self {
        IndexBlock {
            entries: [None; POINTERS_PER_SECTOR],
        }
    }
}

impl IndexBlock {
    pub fn get(&self, index: usize) -> Option<SectorId> {
        self.entries.get(index).copied().flatten()
    }

    /// the populated prefix of this block, stops at the first empty slot
    pub fn populated(&self) -> impl Iterator<Item = SectorId> + '_ {
        self.entries.iter().map_while(|slot| *slot)
    }

    pub fn to_sector(&self) -> Box<Sector> {
        let mut buf = Box::new([0u8; SECTOR_SIZE]);
        for (chunk, slot) in buf.chunks_exact_mut(4).zip(self.entries.iter()) {
            chunk.copy_from_slice(&encode_slot(*slot));
        }
        buf
    }

    pub fn from_sector(buf: &Sector) -> Self {
        let mut block = IndexBlock::default();
        for (slot, chunk) in block.entries.iter_mut().zip(buf.chunks_exact(4)) {
            *slot = decode_slot([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        block
    }
}

#[inline]
fn word(buf: &Sector, at: usize) -> [u8; 4] {
    [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(raw: u32) -> Option<SectorId> {
        SectorId::new(raw)
    }

    #[test]
    fn test_header_field_offsets() {
        let mut inode = DiskInode::new();
        inode.direct[0] = sector(0x0102_0304);
        inode.single_indirect = sector(9);
        inode.length = 5121;
        let buf = inode.to_sector();

        assert_eq!(&buf[0..4], &[4, 3, 2, 1]);
        // unused direct slots carry the all-ones marker
        assert_eq!(&buf[4..8], &[0xff; 4]);
        assert_eq!(&buf[40..44], &9u32.to_le_bytes());
        assert_eq!(&buf[44..48], &[0xff; 4]);
        assert_eq!(&buf[48..52], &5121u32.to_le_bytes());
        assert_eq!(&buf[52..56], &INODE_MAGIC.to_le_bytes());
        assert!(buf[56..].iter().all(|b| *b == 0));

        assert_eq!(DiskInode::from_sector(&buf), inode);
    }

    #[test]
    fn test_zeroed_sector_is_not_an_inode() {
        let inode = DiskInode::from_sector(&[0u8; SECTOR_SIZE]);
        assert!(!inode.is_valid());
    }

    #[test]
    fn test_index_block_populated_prefix() {
        let mut block = IndexBlock::default();
        block.entries[0] = sector(40);
        block.entries[1] = sector(41);
        block.entries[3] = sector(43);
        let decoded = IndexBlock::from_sector(&block.to_sector());
        assert_eq!(decoded, block);
        assert_eq!(
            decoded.populated().map(SectorId::get).collect::<Vec<_>>(),
            vec![40, 41]
        );
        assert_eq!(decoded.get(3), sector(43));
        assert_eq!(decoded.get(POINTERS_PER_SECTOR), None);
    }
}
