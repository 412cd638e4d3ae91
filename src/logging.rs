use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// Initializes the global tracing subscriber. Verbosity follows `-v`
/// repeats unless `RUST_LOG` is set, in which case `RUST_LOG` wins.
pub fn init(verbosity: u8, format: LogFormat) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("zrsync={default_level}")));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
