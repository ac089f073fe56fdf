//! Server control-and-dispatch loop (spec §4.6-4.8).

pub mod datastore;
pub mod dispatcher;
pub mod state;
pub mod trigger;

pub use dispatcher::run;
pub use state::{EventType, SessionTable, SinkState};
