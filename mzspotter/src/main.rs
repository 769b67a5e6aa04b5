use std::io;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mzspotter::{MZSpotter, MZSpotterError};

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<(), MZSpotterError> {
    let args = MZSpotter::parse();

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .compact()
            .with_timer(fmt::time::ChronoLocal::rfc_3339())
            .with_writer(io::stderr)
            .with_filter(
                EnvFilter::builder()
                    .with_default_directive(tracing::Level::INFO.into())
                    .from_env_lossy(),
            ),
    );

    let _guard = if let Some(log_path) = args.log_file.as_ref() {
        let log_file = std::fs::File::create(log_path)?;
        let (writer, guard) = tracing_appender::non_blocking(log_file);
        subscriber
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(
                        EnvFilter::builder()
                            .with_default_directive(tracing::Level::DEBUG.into())
                            .from_env_lossy(),
                    ),
            )
            .init();
        Some(guard)
    } else {
        subscriber.init();
        None
    };

    if let Err(e) = args.main() {
        error!("{e}");
        return Err(e);
    }
    Ok(())
}
