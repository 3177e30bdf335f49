//! Batch background removal CLI tool
//!
//! Command-line interface for removing backgrounds from many images at once
//! with a selectable model from the rembg catalog.

#[cfg(feature = "cli")]
use bgremove_batch::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
