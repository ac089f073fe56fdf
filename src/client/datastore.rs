//! Upstream datastore writer used by the spool drainer (spec §4.3),
//! grounded on `Beta 1/gpsclient/database.c`'s `db_insert`.

use tokio_postgres::NoTls;

use crate::config::ClientConfig;
use crate::errors::DatastoreError;
use crate::client::spool::DbData;

pub struct ClientDatastore {
    client: tokio_postgres::Client,
    table: String,
}

impl ClientDatastore {
    pub async fn connect(config: &ClientConfig) -> Result<Self, DatastoreError> {
        let (client, connection) =
            tokio_postgres::connect(&config.db_connection_string(), NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::error!("client datastore connection closed: {err}");
            }
        });
        Ok(ClientDatastore {
            client,
            table: config.db_tabledata.clone(),
        })
    }

    pub async fn insert(&self, row: DbData) -> Result<(), DatastoreError> {
        let query = format!(
            "INSERT INTO {}(client_name, client_ip, sender_ip, client_timestamp, client_lat, client_long, event_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table
        );
        let tsp = row.gps_tsp as i64;
        // matches the source db_insert's `sprintf("%f", ...)` (6 decimal places)
        let lat = format!("{:.6}", row.gps_lat);
        let lon = format!("{:.6}", row.gps_lon);
        self.client
            .execute(
                &query,
                &[
                    &row.client_name,
                    &row.client_ip,
                    &row.sender_ip,
                    &tsp,
                    &lat,
                    &lon,
                    &row.packet_type,
                ],
            )
            .await?;
        Ok(())
    }
}
