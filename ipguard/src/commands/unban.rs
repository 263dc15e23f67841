use std::net::IpAddr;

use anyhow::Result;
use ipguard_core::Services;
use tracing::*;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli, ip: IpAddr) -> Result<()> {
    let config = load_config(&cli.config, true)?;
    let services = Services::new(config).await?;

    let lifted = services.access.unban_ip(ip).await?;
    if lifted == 0 {
        info!(%ip, "No automatic ban was in place, failed attempts cleared");
    } else {
        info!(%ip, lifted, "Unbanned");
    }
    Ok(())
}
