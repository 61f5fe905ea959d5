use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nickel-sync", about = "Keep an e-reader's metadata cache, catalog and covers in sync", version)]
pub struct Cli {
    /// Mount point of the internal storage
    #[arg(long, default_value = "/mnt/onboard")]
    pub onboard_mount: PathBuf,

    /// Mount point of the SD card, if one is inserted
    #[arg(long)]
    pub sd_mount: Option<PathBuf>,

    /// Configuration file (default: the one on the internal storage)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
