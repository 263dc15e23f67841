use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use ipguard_common::helpers::fs::secure_file;
use ipguard_common::{IpGuardConfig, IpGuardConfigStore};
use ipguard_core::SharedConfig;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::*;

pub fn load_config(path: &Path, secure: bool) -> Result<IpGuardConfig> {
    if secure {
        secure_file(path).context("Could not secure config")?;
    }

    let store: IpGuardConfigStore = Config::builder()
        .add_source(File::from(path))
        .add_source(
            Environment::with_prefix("IPGUARD")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Could not load config")?
        .try_deserialize()
        .context("Could not parse config")?;

    let config = IpGuardConfig {
        store,
        paths_relative_to: path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ".".into()),
    };

    info!(
        "Using config: {path:?} (auto-ban: {}, geolocation: {})",
        config.store.auto_ban.enabled, config.store.geo.enabled,
    );
    Ok(config)
}

/// Replaces the live configuration whenever the file changes. This also
/// discards parameters changed through the admin API since the last load.
pub async fn watch_config<P: AsRef<Path>>(path: P, config: SharedConfig) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(1);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.blocking_send(res);
        },
        notify::Config::default(),
    )?;
    watcher.watch(path.as_ref(), RecursiveMode::NonRecursive)?;

    loop {
        match rx.recv().await {
            Some(Ok(event)) => {
                if event.kind.is_modify() {
                    let reloaded = load_config(path.as_ref(), false)
                        .and_then(|new_config| new_config.validate().map(|_| new_config));
                    match reloaded {
                        Ok(new_config) => {
                            *(config.write().await) = new_config;
                            info!("Reloaded config");
                        }
                        Err(error) => error!(?error, "Failed to reload config"),
                    }
                }
            }
            Some(Err(error)) => error!(?error, "Failed to watch config"),
            None => {
                error!("Config watch failed");
                return Ok(());
            }
        }
    }
}
