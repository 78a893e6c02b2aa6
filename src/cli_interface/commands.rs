use std::io::Write;

use anyhow::{anyhow, Context};

use super::{Command, CreateArgs, InodeArgs, InodeFsCli, ReadArgs, WriteArgs};
use crate::{
    device::BlockDevice,
    fs::{DiskInode, InodeHandle, Sector, SectorId, SECTOR_SIZE},
    mkfs::mkfs,
    mount::{mount, ImageFs},
};

/// carry out one command line, printing results to `out`
pub fn run<W: Write>(cli: InodeFsCli, out: &mut W) -> anyhow::Result<()> {
    let cache = cli.cache_sectors;
    match cli.command {
        Command::Mkfs(args) => {
            mkfs(&args.image_file_path, args.size)?;
            writeln!(out, "created {}", args.image_file_path)?;
        }
        Command::Create(CreateArgs {
            image_file_path,
            length,
        }) => {
            let fs = mount(image_file_path, cache)?;
            let sector = fs
                .allocate_inode(length)?
                .ok_or_else(|| anyhow!("no space left for a file of {length} bytes"))?;
            writeln!(out, "{sector}")?;
            fs.unmount()?;
        }
        Command::Write(WriteArgs {
            image_file_path,
            inumber,
            offset,
            from,
        }) => {
            let data = std::fs::read(&from).with_context(|| format!("can't read {from}"))?;
            let fs = mount(image_file_path, cache)?;
            let inode = open_inode(&fs, inumber)?;
            let written = fs.inodes().write_at(&inode, &data, offset);
            fs.inodes().close(inode)?;
            let written = written?;
            writeln!(out, "wrote {written} of {} bytes", data.len())?;
            fs.unmount()?;
        }
        Command::Read(ReadArgs {
            image_file_path,
            inumber,
            offset,
            len,
        }) => {
            let fs = mount(image_file_path, cache)?;
            let inode = open_inode(&fs, inumber)?;
            let available = inode.length().saturating_sub(offset);
            let len = len.map_or(available, |len| len.min(available));
            let mut buf = vec![0u8; usize::try_from(len)?];
            let read = fs.inodes().read_at(&inode, &mut buf, offset);
            fs.inodes().close(inode)?;
            let read = read?;
            out.write_all(&buf[..read])?;
            fs.unmount()?;
        }
        Command::Stat(InodeArgs {
            image_file_path,
            inumber,
        }) => {
            let fs = mount(image_file_path, cache)?;
            let inode = open_inode(&fs, inumber)?;
            let disk = inode.disk_inode();
            writeln!(out, "inode:           {}", inode.inumber())?;
            writeln!(out, "length:          {}", inode.length())?;
            writeln!(out, "sectors:         {}", inode.sector_count())?;
            writeln!(out, "direct:          {}", slots(&disk.direct))?;
            writeln!(out, "single indirect: {}", slots(&[disk.single_indirect]))?;
            writeln!(out, "double indirect: {}", slots(&[disk.double_indirect]))?;
            fs.inodes().close(inode)?;
            fs.unmount()?;
        }
        Command::Rm(InodeArgs {
            image_file_path,
            inumber,
        }) => {
            let fs = mount(image_file_path, cache)?;
            let sector = inode_sector(&fs, inumber)?;
            fs.delete(sector)?;
            writeln!(out, "removed {sector}")?;
            fs.unmount()?;
        }
    }
    Ok(())
}

// refuse sectors that don't hold a header instead of tripping the integrity check in `open`
fn inode_sector(fs: &ImageFs, inumber: u32) -> anyhow::Result<SectorId> {
    let sector = SectorId::new(inumber).ok_or_else(|| anyhow!("invalid inode {inumber}"))?;
    if !fs.inodes().free_map().is_allocated(sector) {
        return Err(anyhow!("inode {inumber} does not exist"));
    }
    let mut buf: Sector = [0u8; SECTOR_SIZE];
    fs.inodes().device().read_sector(sector, &mut buf)?;
    if !DiskInode::from_sector(&buf).is_valid() {
        return Err(anyhow!("sector {inumber} is not an inode"));
    }
    Ok(sector)
}

fn open_inode(fs: &ImageFs, inumber: u32) -> anyhow::Result<InodeHandle> {
    fs.inodes().open(inode_sector(fs, inumber)?)
}

fn slots(slots: &[Option<SectorId>]) -> String {
    slots
        .iter()
        .map(|slot| slot.map_or_else(|| "-".to_string(), |s| s.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}
