//! `gpsserver` entrypoint (spec §6: `gpsserver <config-file>`).

use std::process;

use fleet_gps::app;
use fleet_gps::config::ServerConfig;
use fleet_gps::server;
use log::error;

fn main() {
    let args = app::parse();

    let config = match ServerConfig::load(&args.config_file) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("could not load config file '{}': {err}", args.config_file);
            process::exit(exitcode::CONFIG);
        }
    };

    let logfile_path = Some(config.logfile_path.as_str()).filter(|p| !p.is_empty());
    if let Err(err) = app::init_logging(&args, logfile_path) {
        eprintln!("could not initialise logging at '{}': {err}", config.logfile_path);
        process::exit(exitcode::CANTCREAT);
    }

    if !config.pidfile_path.is_empty() {
        if let Err(err) = std::fs::write(&config.pidfile_path, process::id().to_string()) {
            error!("could not write pidfile '{}': {err}", config.pidfile_path);
            process::exit(exitcode::CANTCREAT);
        }
    }
    if config.daemonize_enable {
        // Process daemonization (detaching from the controlling terminal) is
        // a poor fit for an already-async tokio runtime and is left to the
        // service manager (systemd, etc); see DESIGN.md.
        error!("daemonize-enable=yes is not supported by this build, run under a service manager instead");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("could not build tokio runtime: {err}");
            process::exit(exitcode::OSERR);
        }
    };

    let result = runtime.block_on(server::run(config));

    match result {
        Ok(()) => process::exit(exitcode::OK),
        Err(err) => {
            error!("fatal: {err}");
            process::exit(exitcode::SOFTWARE);
        }
    }
}
