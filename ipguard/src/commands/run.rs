use anyhow::Result;
use ipguard_core::Services;
use ipguard_protocol_http::{HttpServer, ADMIN_API_PREFIX};
use tracing::*;

use crate::config::{load_config, watch_config};

#[cfg(target_os = "linux")]
use sd_notify::NotifyState;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!(%version, "ipguard");

    let config = load_config(&cli.config, true)?;
    config.validate()?;
    let services = Services::new(config.clone()).await?;

    let maintenance = services.spawn_maintenance();
    let server = HttpServer::new(&services).run(config.store.http.listen);

    if console::user_attended() {
        info!("--------------------------------------------");
        info!("ipguard is now running.");
        info!(
            "Admin API on http://{}{}",
            config.store.http.listen, ADMIN_API_PREFIX
        );
        info!("--------------------------------------------");
    }

    #[cfg(target_os = "linux")]
    if let Ok(true) = sd_notify::booted() {
        use std::time::Duration;
        tokio::spawn(async {
            if let Err(error) = async {
                sd_notify::notify(false, &[NotifyState::Ready])?;
                loop {
                    sd_notify::notify(false, &[NotifyState::Watchdog])?;
                    tokio::time::sleep(Duration::from_secs(15)).await;
                }
                #[allow(unreachable_code)]
                Ok::<(), anyhow::Error>(())
            }
            .await
            {
                error!(?error, "Failed to communicate with systemd");
            }
        });
    }

    drop(config);

    tokio::spawn({
        let path = cli.config.clone();
        let config = services.config.clone();
        async move {
            if let Err(error) = watch_config(path, config).await {
                error!(?error, "Config watcher stopped");
            }
        }
    });

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
        result = server => {
            if let Err(error) = &result {
                error!(?error, "HTTP server error");
            }
            result
        }
    };

    maintenance.abort();
    info!("Exiting");
    result
}
