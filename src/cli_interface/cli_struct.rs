use clap::{Parser, Subcommand};

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub struct InodeFsCli {
    /// sectors kept in the sector cache
    #[arg(long, global = true, default_value_t = 64)]
    pub cache_sectors: usize,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// create a new file system image
    Mkfs(MkfsArgs),
    /// create a file, prints its inode number
    Create(CreateArgs),
    /// copy a host file into a file
    Write(WriteArgs),
    /// print the contents of a file to stdout
    Read(ReadArgs),
    /// show the index of a file
    Stat(InodeArgs),
    /// delete a file
    Rm(InodeArgs),
}

///make a new fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(about = "make a new file system")]
pub struct MkfsArgs {
    /// the path of the file system image file
    #[arg(short = 'p', long)]
    pub image_file_path: String,
    /// the size of the file system in bytes
    #[arg(short, long)]
    pub size: u64,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct CreateArgs {
    /// the path of the file system image file
    #[arg(short = 'p', long)]
    pub image_file_path: String,
    /// initial length, filled with zeros
    #[arg(short, long, default_value_t = 0)]
    pub length: u64,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct WriteArgs {
    /// the path of the file system image file
    #[arg(short = 'p', long)]
    pub image_file_path: String,
    /// inode number of the file
    #[arg(short, long)]
    pub inumber: u32,
    /// byte offset to write at
    #[arg(short, long, default_value_t = 0)]
    pub offset: u64,
    /// host file to copy from
    #[arg(short = 'f', long)]
    pub from: String,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct ReadArgs {
    /// the path of the file system image file
    #[arg(short = 'p', long)]
    pub image_file_path: String,
    /// inode number of the file
    #[arg(short, long)]
    pub inumber: u32,
    /// byte offset to read from
    #[arg(short, long, default_value_t = 0)]
    pub offset: u64,
    /// bytes to read, up to the end of the file if absent
    #[arg(short = 'n', long)]
    pub len: Option<u64>,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct InodeArgs {
    /// the path of the file system image file
    #[arg(short = 'p', long)]
    pub image_file_path: String,
    /// inode number of the file
    #[arg(short, long)]
    pub inumber: u32,
}
