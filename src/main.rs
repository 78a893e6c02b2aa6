use clap::Parser;
use inodefs::cli_interface::{run, InodeFsCli};
/// a CLI interface to create an inode filesystem image,
/// and to create, write, read, inspect and delete files inside it.
///
/// Files are named by their inode number, which `create` prints.
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = InodeFsCli::parse();
    let stdout = std::io::stdout();
    run(args, &mut stdout.lock())
}
