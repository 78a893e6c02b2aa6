//! growing a file so that its index covers a new end offset
//!
//! Steps of one extension:
//! 1. work out how many data sectors the new end needs beyond the ones the file owns
//! 2. take as many as the free map can give, a short supply is accepted
//! 3. zero the new data sectors and the unused tail of the old last sector
//! 4. thread the new sectors into the index right after the last used slot,
//!    allocating index sectors the first time each one is needed
//! 5. persist the index sectors, then the header last
//!
//! If any device access fails the extension is undone: loaded index sectors
//! get their old contents back and every sector it allocated is released.
use log::{debug, error, warn};
use smallvec::SmallVec;

use super::{
    bytes_to_sectors,
    free_map::{FreeSpace, SectorList},
    index::{byte_to_sector, read_index, SlotPosition},
    DiskInode, IndexBlock, Sector, SectorId, DIRECT_POINTERS, MAX_FILE_SECTORS,
    POINTERS_PER_SECTOR, SECTOR_SIZE,
};
use crate::device::BlockDevice;

const ZEROS: Sector = [0u8; SECTOR_SIZE];
// data sectors reachable before the double-indirect block
const DOUBLE_START: usize = DIRECT_POINTERS + POINTERS_PER_SECTOR;

/// what an extension achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extension {
    /// data sectors added to the file
    pub threaded: usize,
    /// data sectors that were needed
    pub wanted: usize,
}

/// grow the file whose header lives at `header_sector` until `new_end`,
/// or as far as free space allows
///
/// `inode` is only updated once the new header is on disk. Callers hold the
/// allocation lock (the `&mut` on `free`) for the whole call.
pub(crate) fn extend<D, F>(
    device: &D,
    free: &mut F,
    header_sector: SectorId,
    inode: &mut DiskInode,
    new_end: u64,
) -> anyhow::Result<Extension>
where
    D: BlockDevice + ?Sized,
    F: FreeSpace + ?Sized,
{
    let old_length = u64::from(inode.length);
    if new_end <= old_length {
        return Ok(Extension {
            threaded: 0,
            wanted: 0,
        });
    }

    let old_sectors = bytes_to_sectors(old_length);
    let wanted = bytes_to_sectors(new_end)
        .min(MAX_FILE_SECTORS)
        .saturating_sub(old_sectors);
    let obtained: SectorList = if wanted > 0 {
        free.allocate(wanted)
    } else {
        SectorList::new()
    };
    if obtained.len() < wanted {
        warn!(
            "inode {header_sector}: only {} of {wanted} sectors available for extension",
            obtained.len()
        );
    }

    let mut updated = *inode;
    let mut threader = IndexThreader::new(device, old_sectors);
    let mut threaded = 0;
    let mut outcome = Ok(());
    for (i, sector) in obtained.iter().enumerate() {
        match threader.place(&mut updated, free, old_sectors + i, *sector) {
            Ok(true) => threaded += 1,
            Ok(false) => break,
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    // whatever could not be threaded goes back, the index never has gaps
    for sector in &obtained[threaded..] {
        free.release(*sector, 1);
    }

    let outcome = outcome.and_then(|()| {
        persist(
            device,
            header_sector,
            inode,
            &mut updated,
            &threader,
            &obtained[..threaded],
            new_end,
        )
    });
    if let Err(e) = outcome {
        // the header on disk still describes the old file, so everything
        // this extension took goes back
        error!("inode {header_sector}: extension to {new_end} failed: {e:#}");
        threader.roll_back();
        for sector in obtained[..threaded]
            .iter()
            .copied()
            .chain(threader.fresh_sectors())
        {
            free.release(sector, 1);
        }
        return Err(e);
    }

    debug!(
        "inode {header_sector}: extended from {old_length} to {} bytes with {threaded} new sectors",
        updated.length
    );
    *inode = updated;
    Ok(Extension { threaded, wanted })
}

/// write the new data, the index sectors and finally the header
fn persist<D>(
    device: &D,
    header_sector: SectorId,
    old: &DiskInode,
    updated: &mut DiskInode,
    threader: &IndexThreader<'_, D>,
    new_sectors: &[SectorId],
    new_end: u64,
) -> anyhow::Result<()>
where
    D: BlockDevice + ?Sized,
{
    for sector in new_sectors {
        device.write_sector(*sector, &ZEROS)?;
    }

    let old_length = u64::from(old.length);
    let capacity = ((bytes_to_sectors(old_length) + new_sectors.len()) * SECTOR_SIZE) as u64;
    let new_length = new_end.min(capacity);

    // bytes between the old end and the end of its sector become part of the file
    let tail = (old_length % SECTOR_SIZE as u64) as usize;
    if tail != 0 && new_length > old_length {
        let last = byte_to_sector(device, old, old_length)?.unwrap_or_else(|| {
            panic!("inode {header_sector} has no sector for its last byte at {old_length}")
        });
        let mut buf: Sector = [0u8; SECTOR_SIZE];
        device.read_sector(last, &mut buf)?;
        buf[tail..].fill(0);
        device.write_sector(last, &buf)?;
    }

    threader.finish()?;

    // MAX_FILE_LENGTH fits in u32
    updated.length = new_length as u32;
    device.write_sector(header_sector, &updated.to_sector())
}

/// an index sector loaded (or freshly made) during one extension
struct LoadedIndex {
    sector: SectorId,
    block: IndexBlock,
    // contents on disk before this extension, `None` for a fresh sector
    original: Option<IndexBlock>,
    dirty: bool,
}

impl LoadedIndex {
    /// load an index sector of which only the first `valid` slots belong to the file
    ///
    /// Slots past those are treated as empty, whatever the sector holds.
    fn load<D>(device: &D, sector: SectorId, valid: usize) -> anyhow::Result<Self>
    where
        D: BlockDevice + ?Sized,
    {
        let original = read_index(device, sector)?;
        let mut block = original.clone();
        block.entries[valid..].fill(None);
        Ok(LoadedIndex {
            sector,
            block,
            original: Some(original),
            dirty: false,
        })
    }

    fn fresh(sector: SectorId) -> Self {
        LoadedIndex {
            sector,
            block: IndexBlock::default(),
            original: None,
            dirty: true,
        }
    }

    fn set(&mut self, index: usize, sector: SectorId) {
        assert!(
            self.block.entries[index].is_none(),
            "index sector {} already holds a sector at slot {index}",
            self.sector
        );
        self.block.entries[index] = Some(sector);
        self.dirty = true;
    }

    fn store<D>(&self, device: &D) -> anyhow::Result<()>
    where
        D: BlockDevice + ?Sized,
    {
        if self.dirty {
            debug!("writing index sector {}", self.sector);
            device.write_sector(self.sector, &self.block.to_sector())?;
        }
        Ok(())
    }
}

/// puts data sectors into index slots, in order, keeping the touched index sectors in memory
struct IndexThreader<'a, D: ?Sized> {
    device: &'a D,
    // data sectors the file owned before this extension
    old_sectors: usize,
    single: Option<LoadedIndex>,
    top: Option<LoadedIndex>,
    // the second-level block currently being filled and its position in `top`
    second: Option<(usize, LoadedIndex)>,
    // second-level blocks already filled, waiting to be written
    finished: SmallVec<[LoadedIndex; 2]>,
}

impl<'a, D> IndexThreader<'a, D>
where
    D: BlockDevice + ?Sized,
{
    fn new(device: &'a D, old_sectors: usize) -> Self {
        IndexThreader {
            device,
            old_sectors,
            single: None,
            top: None,
            second: None,
            finished: SmallVec::new(),
        }
    }

    /// reference `data` as the `k`-th data sector of `inode`
    /// # Return
    /// `false` if the slot can't be reached: `k` is past the largest file,
    /// or an index sector it needs can't be allocated
    fn place<F>(
        &mut self,
        inode: &mut DiskInode,
        free: &mut F,
        k: usize,
        data: SectorId,
    ) -> anyhow::Result<bool>
    where
        F: FreeSpace + ?Sized,
    {
        match SlotPosition::of_block(k) {
            None => Ok(false),
            Some(SlotPosition::Direct(i)) => {
                assert!(
                    inode.direct[i].is_none(),
                    "direct slot {i} is already populated"
                );
                inode.direct[i] = Some(data);
                Ok(true)
            }
            Some(SlotPosition::Single(i)) => {
                let Some(single) = self.single_index(inode, free)? else {
                    return Ok(false);
                };
                single.set(i, data);
                Ok(true)
            }
            Some(SlotPosition::Double { outer, inner }) => {
                let Some(second) = self.second_index(inode, free, outer)? else {
                    return Ok(false);
                };
                second.set(inner, data);
                Ok(true)
            }
        }
    }

    fn single_index<F>(
        &mut self,
        inode: &mut DiskInode,
        free: &mut F,
    ) -> anyhow::Result<Option<&mut LoadedIndex>>
    where
        F: FreeSpace + ?Sized,
    {
        if self.single.is_none() {
            self.single = match inode.single_indirect {
                Some(sector) => {
                    let valid = self
                        .old_sectors
                        .saturating_sub(DIRECT_POINTERS)
                        .min(POINTERS_PER_SECTOR);
                    Some(LoadedIndex::load(self.device, sector, valid)?)
                }
                None => {
                    let Some(sector) = free.allocate(1).first().copied() else {
                        warn!("no sector left for the single-indirect block");
                        return Ok(None);
                    };
                    debug!("allocated single-indirect block {sector}");
                    inode.single_indirect = Some(sector);
                    Some(LoadedIndex::fresh(sector))
                }
            };
        }
        Ok(self.single.as_mut())
    }

    fn second_index<F>(
        &mut self,
        inode: &mut DiskInode,
        free: &mut F,
        outer: usize,
    ) -> anyhow::Result<Option<&mut LoadedIndex>>
    where
        F: FreeSpace + ?Sized,
    {
        if matches!(&self.second, Some((at, _)) if *at != outer) {
            if let Some((_, done)) = self.second.take() {
                self.finished.push(done);
            }
        }
        if self.second.is_some() {
            return Ok(self.second.as_mut().map(|(_, index)| index));
        }

        if self.top.is_none() {
            match inode.double_indirect {
                Some(sector) => {
                    let valid = self
                        .old_sectors
                        .saturating_sub(DOUBLE_START)
                        .div_ceil(POINTERS_PER_SECTOR);
                    self.top = Some(LoadedIndex::load(self.device, sector, valid)?);
                }
                None => {
                    // the top block is only worth having together with its first second-level block
                    let got = free.allocate(2);
                    if got.len() < 2 {
                        warn!("no sectors left for the double-indirect blocks");
                        for sector in got {
                            free.release(sector, 1);
                        }
                        return Ok(None);
                    }
                    debug!("allocated double-indirect blocks {} and {}", got[0], got[1]);
                    inode.double_indirect = Some(got[0]);
                    let mut top = LoadedIndex::fresh(got[0]);
                    top.set(outer, got[1]);
                    self.top = Some(top);
                    self.second = Some((outer, LoadedIndex::fresh(got[1])));
                    return Ok(self.second.as_mut().map(|(_, index)| index));
                }
            }
        }
        let Some(top) = self.top.as_mut() else {
            return Ok(None);
        };

        let second = match top.block.get(outer) {
            Some(sector) => {
                let valid = self
                    .old_sectors
                    .saturating_sub(DOUBLE_START + outer * POINTERS_PER_SECTOR)
                    .min(POINTERS_PER_SECTOR);
                LoadedIndex::load(self.device, sector, valid)?
            }
            None => {
                let Some(sector) = free.allocate(1).first().copied() else {
                    warn!("no sector left for second-level block {outer}");
                    return Ok(None);
                };
                debug!("allocated second-level block {sector} at {outer}");
                top.set(outer, sector);
                LoadedIndex::fresh(sector)
            }
        };
        self.second = Some((outer, second));
        Ok(self.second.as_mut().map(|(_, index)| index))
    }

    /// every index sector touched so far, lowest level first
    fn indexes(&self) -> impl Iterator<Item = &LoadedIndex> {
        self.finished
            .iter()
            .chain(self.second.as_ref().map(|(_, index)| index))
            .chain(self.top.as_ref())
            .chain(self.single.as_ref())
    }

    /// write every modified index sector
    fn finish(&self) -> anyhow::Result<()> {
        self.indexes().try_for_each(|index| index.store(self.device))
    }

    /// put back the old contents of every loaded index sector that was modified
    fn roll_back(&self) {
        for index in self.indexes().filter(|index| index.dirty) {
            let Some(original) = &index.original else {
                continue;
            };
            if let Err(e) = self.device.write_sector(index.sector, &original.to_sector()) {
                // slots past the file's length are ignored on the next load
                warn!("can't restore index sector {}: {e:#}", index.sector);
            }
        }
    }

    /// index sectors allocated by this extension
    fn fresh_sectors(&self) -> impl Iterator<Item = SectorId> + '_ {
        self.indexes()
            .filter(|index| index.original.is_none())
            .map(|index| index.sector)
    }
}
