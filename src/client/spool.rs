//! Local durable spool (spec §4.2), grounded on `buffer.c`.
//!
//! The source serializes every caller through a single SQLite handle
//! guarded by a pthread mutex; this wraps the same single `rusqlite`
//! connection in a `tokio::sync::Mutex` so every `insert`/`drain_once`
//! call is strictly ordered, matching the "mutex in front of every spool
//! call" requirement in spec §5.

use log::{error, warn};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::errors::SpoolError;

/// One row pending upstream delivery (`buffer` table, spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct DbData {
    pub client_name: String,
    pub client_ip: String,
    pub sender_ip: String,
    pub gps_tsp: f64,
    pub gps_lat: f64,
    pub gps_lon: f64,
    pub packet_type: i32,
}

/// Source-data packet type codes (`Beta 1/gpsclient/config.h`). Shares the
/// event_type column with the server's control codes (spec §6).
pub const PACKET_TYPE_MANUAL: i32 = 0;
pub const PACKET_TYPE_UCAST: i32 = 1;
pub const PACKET_TYPE_MCAST: i32 = 2;
pub const PACKET_TYPE_BCAST: i32 = 3;

struct SpooledRow {
    uid: i64,
    data: DbData,
}

pub struct Spool {
    conn: Mutex<Connection>,
}

impl Spool {
    pub fn open(path: &str) -> Result<Self, SpoolError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "synchronous", 1)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS buffer(
                uid INTEGER PRIMARY KEY,
                client_name TEXT,
                client_ip TEXT,
                sender_ip TEXT,
                gps_tsp REAL,
                gps_lat REAL,
                gps_lon REAL,
                packet_type INTEGER
            )",
            [],
        )?;
        Ok(Spool {
            conn: Mutex::new(conn),
        })
    }

    pub async fn insert(&self, row: &DbData) -> Result<(), SpoolError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO buffer(client_name, client_ip, sender_ip, gps_tsp, gps_lat, gps_lon, packet_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.client_name,
                row.client_ip,
                row.sender_ip,
                row.gps_tsp,
                row.gps_lat,
                row.gps_lon,
                row.packet_type,
            ],
        )?;
        Ok(())
    }

    /// Drains every row currently present, in ascending `uid` order,
    /// inserting each upstream via `upstream_insert`. Stops at the first
    /// upstream failure, leaving the remaining rows (and that one) in
    /// place — spec §4.2's stop-on-first-failure discipline.
    pub async fn drain_once<F, Fut>(&self, mut upstream_insert: F) -> Result<usize, SpoolError>
    where
        F: FnMut(DbData) -> Fut,
        Fut: std::future::Future<Output = Result<(), crate::errors::DatastoreError>>,
    {
        let rows = {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(
                "SELECT uid, client_name, client_ip, sender_ip, gps_tsp, gps_lat, gps_lon, packet_type
                 FROM buffer ORDER BY uid ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SpooledRow {
                        uid: row.get(0)?,
                        data: DbData {
                            client_name: row.get(1)?,
                            client_ip: row.get(2)?,
                            sender_ip: row.get(3)?,
                            gps_tsp: row.get(4)?,
                            gps_lat: row.get(5)?,
                            gps_lon: row.get(6)?,
                            packet_type: row.get(7)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;
            rows
        };

        let mut drained = 0;
        for row in rows {
            if let Err(err) = upstream_insert(row.data).await {
                warn!("upstream insert failed, stopping drain: {err}");
                return Ok(drained);
            }
            let conn = self.conn.lock().await;
            if let Err(err) = conn.execute("DELETE FROM buffer WHERE uid = ?1", params![row.uid]) {
                error!("could not delete drained row uid={}: {err}", row.uid);
                return Err(SpoolError::Sqlite(err));
            }
            drained += 1;
        }
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: i32) -> DbData {
        DbData {
            client_name: "c1".to_string(),
            client_ip: "10.0.0.1".to_string(),
            sender_ip: "10.0.0.2".to_string(),
            gps_tsp: 100.0,
            gps_lat: 1.5,
            gps_lon: 2.5,
            packet_type: n,
        }
    }

    #[tokio::test]
    async fn insert_then_drain_empties_the_spool() {
        let spool = Spool::open(":memory:").unwrap();
        spool.insert(&sample(PACKET_TYPE_UCAST)).await.unwrap();
        spool.insert(&sample(PACKET_TYPE_MANUAL)).await.unwrap();

        let drained = spool
            .drain_once(|_row| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(drained, 2);

        let remaining = spool
            .drain_once(|_row| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn drain_stops_at_first_upstream_failure_and_preserves_order() {
        let spool = Spool::open(":memory:").unwrap();
        for i in 0..5 {
            spool.insert(&sample(i)).await.unwrap();
        }

        let drained = spool
            .drain_once(|row| async move {
                if row.packet_type == 2 {
                    Err(crate::errors::DatastoreError::ClientNotFound("c1".to_string()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        // rows 0 and 1 succeed, row 2 fails and the drain stops there
        assert_eq!(drained, 2);

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        spool
            .drain_once(move |row| {
                let seen = seen2.clone();
                async move {
                    seen.lock().unwrap().push(row.packet_type);
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![2, 3, 4]);
    }
}
