use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use super::args::{Args, LogFormat};
use crate::config::VERSION;

/// Initialise the global tracing subscriber from CLI flags, optionally
/// also writing to `logfile_path` (spec's `logfile-path` config key,
/// supplemented from `original_source/` — see SPEC_FULL.md).
pub fn init_logging(args: &Args, logfile_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive(args.log_level.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(!args.no_color);

    match logfile_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let builder = builder.with_writer(Mutex::new(file)).with_ansi(false);
            match args.log_format {
                LogFormat::Structured => builder.json().init(),
                LogFormat::Debug => builder.pretty().init(),
                LogFormat::Text => builder.init(),
            }
        }
        None => match args.log_format {
            LogFormat::Structured => builder.json().init(),
            LogFormat::Debug => builder.pretty().init(),
            LogFormat::Text => builder.init(),
        },
    }

    log::info!("starting (version {VERSION})");
    Ok(())
}
