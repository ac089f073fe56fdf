//! Client-side configuration (spec §6, "Client config keys").

use log::info;
use std::time::Duration as StdDuration;

use super::{get_parsed, get_str, parse_kv_file};
use crate::errors::ConfigError;

/// Fully resolved `gpsclient` configuration. Per-client operational
/// parameters (ports, multicast group, validation flag, server host) are
/// NOT here — those are fetched at runtime from the upstream `db_config`
/// row keyed by `client_name` (spec §4.5 ConfigFetch).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub client_name: String,
    pub client_addr: String,
    pub mcast_group_addr: String,
    pub gpsd_addr: String,
    pub gpsd_port: u16,
    pub db_addr: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_passwd: String,
    pub db_tablecfg: String,
    pub db_tabledata: String,
    pub buffer_file: String,
    pub buffer_interval_secs: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            client_name: "client-name".to_string(),
            client_addr: "0.0.0.0".to_string(),
            mcast_group_addr: "224.0.0.1".to_string(),
            gpsd_addr: "127.0.0.1".to_string(),
            gpsd_port: 2947,
            db_addr: "127.0.0.1".to_string(),
            db_port: 5432,
            db_name: "db-name".to_string(),
            db_user: "db-user".to_string(),
            db_passwd: "db-passwd".to_string(),
            db_tablecfg: "dbtablecfg".to_string(),
            db_tabledata: "dbtabledata".to_string(),
            buffer_file: "/tmp/gpsclient.db".to_string(),
            buffer_interval_secs: 10,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let map = parse_kv_file(path)?;
        let defaults = ClientConfig::default();

        let buffer_interval_secs: u32 =
            get_parsed(&map, "buffer-interval", defaults.buffer_interval_secs)?;
        // spec §6: buffer-interval has a floor of 10s regardless of the
        // configured value
        let buffer_interval_secs = buffer_interval_secs.max(10);

        Ok(ClientConfig {
            client_name: get_str(&map, "client-name", &defaults.client_name),
            client_addr: get_str(&map, "client-addr", &defaults.client_addr),
            mcast_group_addr: get_str(&map, "multicast-group-addr", &defaults.mcast_group_addr),
            gpsd_addr: get_str(&map, "gpsd-addr", &defaults.gpsd_addr),
            gpsd_port: get_parsed(&map, "gpsd-port", defaults.gpsd_port)?,
            db_addr: get_str(&map, "db-addr", &defaults.db_addr),
            db_port: get_parsed(&map, "db-port", defaults.db_port)?,
            db_name: get_str(&map, "db-name", &defaults.db_name),
            db_user: get_str(&map, "db-user", &defaults.db_user),
            db_passwd: get_str(&map, "db-passwd", &defaults.db_passwd),
            db_tablecfg: get_str(&map, "db-tablecfg", &defaults.db_tablecfg),
            db_tabledata: get_str(&map, "db-tabledata", &defaults.db_tabledata),
            buffer_file: get_str(&map, "buffer-file", &defaults.buffer_file),
            buffer_interval_secs,
        })
    }

    pub fn buffer_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.buffer_interval_secs as u64)
    }

    /// `postgres://` connection string for the upstream datastore.
    pub fn db_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.db_addr, self.db_port, self.db_name, self.db_user, self.db_passwd
        )
    }

    pub fn log_summary(&self) {
        info!("client-name={}", self.client_name);
        info!(
            "client-addr={} multicast-group-addr={}",
            self.client_addr, self.mcast_group_addr
        );
        info!("gpsd-addr={} gpsd-port={}", self.gpsd_addr, self.gpsd_port);
        info!(
            "db-addr={} db-port={} db-name={} db-tablecfg={} db-tabledata={}",
            self.db_addr, self.db_port, self.db_name, self.db_tablecfg, self.db_tabledata
        );
        info!(
            "buffer-file={} buffer-interval={}",
            self.buffer_file, self.buffer_interval_secs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_reference() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.gpsd_port, 2947);
        assert_eq!(cfg.buffer_interval_secs, 10);
        assert_eq!(cfg.mcast_group_addr, "224.0.0.1");
    }

    #[test]
    fn sub_minimum_buffer_interval_clamps_to_ten_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpsclient.conf");
        std::fs::write(&path, "buffer-interval 0\n").unwrap();
        let cfg = ClientConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.buffer_interval_secs, 10);

        std::fs::write(&path, "buffer-interval 3\n").unwrap();
        let cfg = ClientConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.buffer_interval_secs, 10);
    }

    #[test]
    fn load_overrides_only_present_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpsclient.conf");
        std::fs::write(&path, "client-name rover-1\nbuffer-interval 30\n").unwrap();

        let cfg = ClientConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.client_name, "rover-1");
        assert_eq!(cfg.buffer_interval_secs, 30);
        assert_eq!(cfg.db_port, 5432);
    }
}
