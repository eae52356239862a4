//! `mkfs` — image builder CLI (spec §6 "CLI (image tools): builder").
//!
//! Takes a single argument, the output image path, and writes a
//! deterministic `DEFAULT_NUM_BLOCKS`-block image containing a root
//! directory plus the hand-built test tree described in
//! `blockfs::mkfs::build_default_image`. Exits 0 on success, 1 on
//! argument or I/O error.

use clap::Parser;

use blockfs::blockdev::FileBlockDevice;
use blockfs::mkfs::{build_default_image, DEFAULT_NUM_BLOCKS};

#[derive(Parser)]
#[command(name = "mkfs", author, version, about = "Build a deterministic blockfs test image")]
struct Cli {
    /// Output image path.
    image: std::path::PathBuf,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let device = match FileBlockDevice::create(&cli.image, DEFAULT_NUM_BLOCKS) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("mkfs: cannot create {}: {e}", cli.image.display());
            std::process::exit(1);
        }
    };

    let vol = match build_default_image(device) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("mkfs: failed to build image: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = vol.unmount() {
        eprintln!("mkfs: failed to close image: {e}");
        std::process::exit(1);
    }

    println!(
        "mkfs: wrote {} blocks to {}",
        DEFAULT_NUM_BLOCKS,
        cli.image.display()
    );
}
