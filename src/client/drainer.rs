//! Spool drainer background task (spec §4.3), grounded on `buffer.c`'s
//! `buffer_routine`.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;

use crate::client::datastore::ClientDatastore;
use crate::client::spool::Spool;
use crate::config::ClientConfig;

/// Runs until `shutdown` reports `true`, then performs one final drain
/// before returning — spec §4.3 "on shutdown, performs one final
/// drain_once before exit".
pub async fn run(config: ClientConfig, spool: Arc<Spool>, mut shutdown: watch::Receiver<bool>) {
    info!("spool drainer started");
    let interval = config.buffer_interval();

    loop {
        drain_one_cycle(&config, &spool).await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }

        if *shutdown.borrow() {
            break;
        }
    }

    info!("spool drainer flushing before exit");
    drain_one_cycle(&config, &spool).await;
    info!("spool drainer stopped");
}

async fn drain_one_cycle(config: &ClientConfig, spool: &Spool) {
    let datastore = match ClientDatastore::connect(config).await {
        Ok(ds) => ds,
        Err(err) => {
            warn!("drainer could not reach upstream, will retry next cycle: {err}");
            return;
        }
    };

    match spool
        .drain_once(|row| {
            let datastore = &datastore;
            async move { datastore.insert(row).await }
        })
        .await
    {
        Ok(n) if n > 0 => info!("drained {n} spool rows to upstream"),
        Ok(_) => {}
        Err(err) => warn!("spool drain failed: {err}"),
    }
}
