//! The websocket bus: instance registry, pending-request correlation
//! table, per-connection hub, and the server→instance bus client
//! (spec §4.2–§4.5).

mod bus_client;
mod connection;
mod hub;
mod pending;
mod registry;

pub use bus_client::BusClient;
pub use connection::Connection;
pub use hub::{spawn_background_tasks, websocket_upgrade_handler, HubState};
pub use pending::{PendingRequestTable, TimeoutClass};
pub use registry::{InstanceRecord, InstanceRegistry};
