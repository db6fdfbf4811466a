/// Registry components: each exclusively owns its own map and exposes
/// only atomic operations, so locking stays local to one registry.
pub mod connections;
pub mod groups;

pub use connections::{ConnectionHandle, ConnectionId, ConnectionRegistry, SessionCommand};
pub use groups::{GroupInfo, GroupRegistry};
