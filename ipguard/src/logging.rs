use anyhow::Result;
use time::format_description::{self, OwnedFormatItem};
use time::UtcOffset;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default verbosity when `RUST_LOG` is unset, raised by each `--debug` flag
fn default_directives(debug: u8) -> &'static str {
    match debug {
        0 => "ipguard=info",
        1 => "ipguard=debug",
        2 => "ipguard=trace",
        _ => "ipguard=trace,sea_orm=debug,poem=debug",
    }
}

fn timer(offset: UtcOffset, pattern: &str) -> Result<OffsetTime<OwnedFormatItem>> {
    Ok(OffsetTime::new(
        offset,
        format_description::parse_owned::<2>(pattern)?,
    ))
}

pub fn init_logging(debug: u8) -> Result<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives)?,
        Err(_) => EnvFilter::try_new(default_directives(debug))?,
    };

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let attended = console::user_attended();

    // Interactive terminals get a compact colored layout, services get full timestamps
    let fmt_layer = if attended {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(true)
            .with_target(false)
            .with_timer(timer(offset, "[hour]:[minute]:[second]")?)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_timer(timer(
                offset,
                "[day].[month].[year] [hour]:[minute]:[second]",
            )?)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;
    Ok(())
}
