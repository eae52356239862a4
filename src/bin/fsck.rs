//! `fsck` — image consistency checker CLI (spec §6 "CLI (image tools):
//! checker").
//!
//! Takes a single argument, the image path; prints the human-readable
//! summary `blockfs::fsck::Report` builds (super-block, allocated inodes,
//! allocated blocks, per-inode block list, directory tree), any structural
//! `***ERROR***` lines, then the `unreachable inodes:` / `unreachable
//! blocks:` lines. Always exits 0 (spec §7: the checker surfaces
//! inconsistencies without changing its exit code).

use clap::Parser;

use blockfs::blockdev::FileBlockDevice;
use blockfs::fsck::Report;
use blockfs::volume::Volume;

#[derive(Parser)]
#[command(name = "fsck", author, version, about = "Check a blockfs image for structural consistency")]
struct Cli {
    /// Path to the image file to check.
    image: std::path::PathBuf,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let device = match FileBlockDevice::open(&cli.image) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("fsck: cannot open {}: {e}", cli.image.display());
            std::process::exit(1);
        }
    };

    let mut vol = match Volume::mount(device) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("fsck: cannot mount {}: {e}", cli.image.display());
            std::process::exit(1);
        }
    };

    match Report::build(&mut vol) {
        Ok(report) => report.print(),
        Err(e) => eprintln!("fsck: structural walk failed: {e}"),
    }
}
