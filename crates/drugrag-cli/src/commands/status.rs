//! Status command

use crate::app::{OutputFormat, SnapshotArgs};
use crate::output;
use anyhow::Result;
use drugrag_core::index::snapshot_info;
use drugrag_core::Config;

pub async fn run(args: SnapshotArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let path = super::snapshot_path(&args, config)?;
    let info = snapshot_info(&path)?;
    print!("{}", output::format_status(&path, &info, config, format)?);
    Ok(())
}
