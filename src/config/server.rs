//! Server-side configuration (spec §6, "Server config keys").

use log::info;

use super::{get_bool, get_parsed, get_str, parse_kv_file, Duration};
use crate::errors::ConfigError;

/// Fully resolved `gpsserver` configuration, loaded once at startup and
/// threaded through construction (no global singleton).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub control_port: u16,
    pub unicast_enable: bool,
    pub unicast_port: u16,
    pub broadcast_enable: bool,
    pub broadcast_port: u16,
    pub multicast_enable: bool,
    pub multicast_port: u16,
    pub clientport_enable: bool,
    pub packet_interval: Duration,
    pub prune_interval: Duration,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_passwd: String,
    pub db_table: String,
    pub logfile_path: String,
    pub pidfile_path: String,
    pub daemonize_enable: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            control_port: 5000,
            unicast_enable: true,
            unicast_port: 6000,
            broadcast_enable: true,
            broadcast_port: 6002,
            multicast_enable: true,
            multicast_port: 6001,
            clientport_enable: false,
            packet_interval: Duration::from_millis(5000),
            prune_interval: Duration::from_millis(5000),
            db_host: "127.0.0.1".to_string(),
            db_port: 5432,
            db_name: "db-name".to_string(),
            db_user: "db-user".to_string(),
            db_passwd: "db-passwd".to_string(),
            db_table: "db-table".to_string(),
            logfile_path: "/tmp/gpsserver.log".to_string(),
            pidfile_path: "/tmp/gpsserver.pid".to_string(),
            daemonize_enable: false,
        }
    }
}

impl ServerConfig {
    /// Read and parse `path`, falling back to [`ServerConfig::default`] for
    /// every key the file does not set.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let map = parse_kv_file(path)?;
        let defaults = ServerConfig::default();

        Ok(ServerConfig {
            control_port: get_parsed(&map, "control-port", defaults.control_port)?,
            unicast_enable: get_bool(&map, "unicast-enable", defaults.unicast_enable),
            unicast_port: get_parsed(&map, "unicast-port", defaults.unicast_port)?,
            broadcast_enable: get_bool(&map, "broadcast-enable", defaults.broadcast_enable),
            broadcast_port: get_parsed(&map, "broadcast-port", defaults.broadcast_port)?,
            multicast_enable: get_bool(&map, "multicast-enable", defaults.multicast_enable),
            multicast_port: get_parsed(&map, "multicast-port", defaults.multicast_port)?,
            clientport_enable: get_bool(&map, "clientport-enable", defaults.clientport_enable),
            packet_interval: get_parsed(&map, "packet-interval", defaults.packet_interval)?,
            prune_interval: get_parsed(&map, "prune-interval", defaults.prune_interval)?,
            db_host: get_str(&map, "db-host", &defaults.db_host),
            db_port: get_parsed(&map, "db-port", defaults.db_port)?,
            db_name: get_str(&map, "db-name", &defaults.db_name),
            db_user: get_str(&map, "db-user", &defaults.db_user),
            db_passwd: get_str(&map, "db-passwd", &defaults.db_passwd),
            db_table: get_str(&map, "db-table", &defaults.db_table),
            logfile_path: get_str(&map, "logfile-path", &defaults.logfile_path),
            pidfile_path: get_str(&map, "pidfile-path", &defaults.pidfile_path),
            daemonize_enable: get_bool(&map, "daemonize-enable", defaults.daemonize_enable),
        })
    }

    /// `postgres://` connection string for the events datastore.
    pub fn db_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.db_host, self.db_port, self.db_name, self.db_user, self.db_passwd
        )
    }

    /// Log every resolved key, mirroring the original `config_debug()`.
    pub fn log_summary(&self) {
        info!("control-port={}", self.control_port);
        info!(
            "unicast-enable={} unicast-port={}",
            self.unicast_enable, self.unicast_port
        );
        info!(
            "multicast-enable={} multicast-port={}",
            self.multicast_enable, self.multicast_port
        );
        info!(
            "broadcast-enable={} broadcast-port={}",
            self.broadcast_enable, self.broadcast_port
        );
        info!("clientport-enable={}", self.clientport_enable);
        info!("packet-interval={}ms", self.packet_interval.as_millis());
        info!("prune-interval={}ms", self.prune_interval.as_millis());
        info!(
            "db-host={} db-port={} db-name={} db-table={}",
            self.db_host, self.db_port, self.db_name, self.db_table
        );
        info!("logfile-path={}", self.logfile_path);
        info!("pidfile-path={}", self.pidfile_path);
        info!("daemonize-enable={}", self.daemonize_enable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_reference() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.control_port, 5000);
        assert_eq!(cfg.unicast_port, 6000);
        assert_eq!(cfg.multicast_port, 6001);
        assert_eq!(cfg.broadcast_port, 6002);
        assert!(!cfg.clientport_enable);
    }

    #[test]
    fn load_overrides_only_present_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpsserver.conf");
        std::fs::write(&path, "control-port 7000\nunicast-enable no\n").unwrap();

        let cfg = ServerConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.control_port, 7000);
        assert!(!cfg.unicast_enable);
        // untouched keys keep their defaults
        assert_eq!(cfg.db_port, 5432);
        assert_eq!(cfg.multicast_port, 6001);
    }

    #[test]
    fn load_rejects_unparsable_numeric_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpsserver.conf");
        std::fs::write(&path, "control-port not-a-number\n").unwrap();

        let err = ServerConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
