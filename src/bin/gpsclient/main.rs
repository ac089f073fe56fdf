//! `gpsclient` entrypoint (spec §6: `gpsclient <config-file>`).

use std::process;

use fleet_gps::app;
use fleet_gps::client;
use fleet_gps::config::ClientConfig;
use log::error;

fn main() {
    let args = app::parse();

    let config = match ClientConfig::load(&args.config_file) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("could not load config file '{}': {err}", args.config_file);
            process::exit(exitcode::CONFIG);
        }
    };

    if let Err(err) = app::init_logging(&args, None) {
        eprintln!("could not initialise logging: {err}");
        process::exit(exitcode::CANTCREAT);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("could not build tokio runtime: {err}");
            process::exit(exitcode::OSERR);
        }
    };

    let result = runtime.block_on(client::run(config));

    match result {
        Ok(()) => process::exit(exitcode::OK),
        Err(err) => {
            error!("fatal: {err}");
            process::exit(exitcode::SOFTWARE);
        }
    }
}
