pub mod bus;
pub mod endpoint;
pub mod metadata;
pub mod registry;
pub mod state;
pub mod sync;
pub mod variant;
pub mod zbus_bus;
