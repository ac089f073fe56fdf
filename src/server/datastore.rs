//! Server-side datastore writer (spec §4.8, grounded on
//! `gpsserver/database.c`'s `db_insertctl`/`db_insertack`).

use log::error;
use tokio_postgres::NoTls;

use crate::codec::AckFrame;
use crate::config::ServerConfig;
use crate::errors::DatastoreError;
use crate::server::state::EventType;

/// Holds the upstream connection used to record control/ack/timeout
/// events. Inserts are fire-and-forget from the event loop's point of
/// view: failures are logged but never interrupt dispatch (spec §7).
pub struct Datastore {
    client: tokio_postgres::Client,
    table: String,
}

impl Datastore {
    pub async fn connect(config: &ServerConfig) -> Result<Self, DatastoreError> {
        let (client, connection) =
            tokio_postgres::connect(&config.db_connection_string(), NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("datastore connection closed: {err}");
            }
        });
        Ok(Datastore {
            client,
            table: config.db_table.clone(),
        })
    }

    /// Insert a control event (ONLINE/OFFLINE/TIMEOUT). When `event` is
    /// `Online`, `client_lat` carries the stringified `packet_interval`
    /// (spec's SUPPLEMENTED FROM ORIGINAL SOURCE item 5) — preserved
    /// byte-for-byte as an in-band advertisement of the current trigger
    /// cadence.
    pub async fn insert_control_event(
        &self,
        name: &str,
        client_ip: &str,
        event: EventType,
        packet_interval_ms: u64,
    ) {
        let client_lat = if matches!(event, EventType::Online) {
            packet_interval_ms.to_string()
        } else {
            String::new()
        };

        let query = format!(
            "INSERT INTO {}(client_name, client_ip, client_timestamp, client_lat, event_type) \
             VALUES ($1, $2, now(), $3, $4)",
            self.table
        );
        if let Err(err) = self
            .client
            .execute(&query, &[&name, &client_ip, &client_lat, &(event as i32)])
            .await
        {
            error!("failed to insert {event:?} event for '{name}': {err}");
        }
    }

    pub async fn insert_ack_event(&self, ack: &AckFrame, client_ip: &str) {
        let query = format!(
            "INSERT INTO {}(client_name, client_ip, client_timestamp, client_lat, client_long, event_type) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.table
        );
        let tsp = ack.tsp as i64;
        if let Err(err) = self
            .client
            .execute(
                &query,
                &[
                    &ack.name,
                    &client_ip,
                    &tsp,
                    &ack.latitude,
                    &ack.longitude,
                    &(EventType::Ack as i32),
                ],
            )
            .await
        {
            error!("failed to insert ACK event for '{}': {err}", ack.name);
        }
    }
}
