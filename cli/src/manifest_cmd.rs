use anyhow::{Context, Result};
use clap::Parser;
use haven_hybrid_retrieval::Manifest;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct ManifestArgs {
    /// Index manifest to validate
    #[arg(long, env = "MANIFEST_PATH", value_name = "PATH")]
    pub manifest: PathBuf,
}

pub fn run_manifest(args: ManifestArgs) -> Result<()> {
    let manifest = Manifest::from_path(&args.manifest).context("Failed to load manifest")?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}
