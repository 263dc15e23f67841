use anyhow::Result;
use ipguard_core::Services;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let config = load_config(&cli.config, true)?;
    let services = Services::new(config).await?;

    let stats = services.access.sweep().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
