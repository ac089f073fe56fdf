//! GPS reader (spec §4.4), grounded on `client.c`'s `gpsd_routine`/`read_gpsd`.
//!
//! The source links against `libgps` and blocks on `gps_waiting`/`gps_read`.
//! This speaks the same wire protocol gpsd exposes to every client
//! (newline-delimited JSON over TCP, `?WATCH_ENABLE` handshake) directly,
//! rather than bind a C client library.

use std::sync::Arc;

use log::{error, info, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::RwLock;

use crate::errors::ClientError;

/// gpsd fix modes: 1 = no fix, 2 = 2D, 3 = 3D.
const MODE_NO_FIX: u8 = 1;

/// Latest known fix, mirroring the source's `struct gps_fix_t` subset the
/// client actually consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fix {
    pub time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub mode: u8,
    pub latlon_set: bool,
}

#[derive(Debug, Deserialize)]
struct GpsdReport {
    class: String,
    mode: Option<u8>,
    lat: Option<f64>,
    lon: Option<f64>,
    time: Option<String>,
}

/// Shared handle to the latest fix, readable from any task.
#[derive(Clone)]
pub struct GpsReader {
    fix: Arc<RwLock<Fix>>,
}

impl GpsReader {
    /// Connects to the gpsd daemon, enables JSON streaming, and spawns the
    /// background task that keeps `fix` current. Fatal read errors (the
    /// stream closing, an I/O error) terminate the process per spec §4.4 —
    /// the client has no use without a GPS source.
    pub async fn connect(addr: &str, port: u16) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((addr, port))
            .await
            .map_err(ClientError::Register)?;
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"?WATCH={\"enable\":true,\"json\":true}\r\n")
            .await
            .map_err(ClientError::Register)?;
        info!("gpsd streams enabled {addr}:{port}");

        let fix = Arc::new(RwLock::new(Fix::default()));
        let task_fix = fix.clone();
        tokio::spawn(async move {
            if let Err(err) = read_loop(read_half, task_fix).await {
                error!("unable to read gpsd: {err}");
                std::process::exit(1);
            }
        });

        Ok(GpsReader { fix })
    }

    /// Returns the current fix iff lat/lon is set, the fix has at least a
    /// 2D lock, and no component is NaN — matching `read_gpsd`'s exact
    /// admission test.
    pub async fn read_fix(&self) -> Option<Fix> {
        let fix = *self.fix.read().await;
        if fix.latlon_set
            && fix.mode > MODE_NO_FIX
            && !fix.time.is_nan()
            && !fix.latitude.is_nan()
            && !fix.longitude.is_nan()
        {
            Some(fix)
        } else {
            None
        }
    }
}

async fn read_loop(
    read_half: tokio::net::tcp::OwnedReadHalf,
    fix: Arc<RwLock<Fix>>,
) -> Result<(), ClientError> {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(ClientError::GpsdClosed)?
            .ok_or_else(|| ClientError::GpsdClosed(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)))?;
        if line.trim().is_empty() {
            continue;
        }
        let report: GpsdReport = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(err) => {
                warn!("unrecognized gpsd line, skipping: {err}");
                continue;
            }
        };
        if report.class != "TPV" {
            continue;
        }
        let (Some(lat), Some(lon)) = (report.lat, report.lon) else {
            continue;
        };
        let time = report
            .time
            .as_deref()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|dt| dt.timestamp() as f64)
            .unwrap_or(f64::NAN);

        let mut guard = fix.write().await;
        *guard = Fix {
            time,
            latitude: lat,
            longitude: lon,
            mode: report.mode.unwrap_or(MODE_NO_FIX),
            latlon_set: true,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_fix_rejects_an_unset_fix() {
        let reader = GpsReader {
            fix: Arc::new(RwLock::new(Fix::default())),
        };
        assert!(reader.read_fix().await.is_none());
    }

    #[tokio::test]
    async fn read_fix_accepts_a_valid_2d_fix() {
        let reader = GpsReader {
            fix: Arc::new(RwLock::new(Fix {
                time: 100.0,
                latitude: 1.5,
                longitude: 2.5,
                mode: 2,
                latlon_set: true,
            })),
        };
        let fix = reader.read_fix().await.unwrap();
        assert_eq!(fix.latitude, 1.5);
    }

    #[tokio::test]
    async fn read_fix_rejects_nan_components() {
        let reader = GpsReader {
            fix: Arc::new(RwLock::new(Fix {
                time: f64::NAN,
                latitude: 1.5,
                longitude: 2.5,
                mode: 3,
                latlon_set: true,
            })),
        };
        assert!(reader.read_fix().await.is_none());
    }
}
