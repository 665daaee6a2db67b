//! Tracing initialization.
//!
//! Log output goes to stderr so it never mixes with the messages and results the CLI prints on
//! stdout. The filter comes from `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=weedctl=debug weedctl listen
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    tracing::debug!("Telemetry initialized");
    Ok(())
}
