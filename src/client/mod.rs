//! Client receive-and-buffer pipeline (spec §4.2-4.5).

pub mod datastore;
pub mod dbconfig;
pub mod drainer;
pub mod gps;
pub mod session;
pub mod spool;

pub use session::run;
