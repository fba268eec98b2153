//! Keeps a typed, live view of the MPRIS2 media players on a D-Bus session
//! bus and forwards control calls to them.
//!
//! An [`Endpoint`] is one player. Its state is seeded from a single `GetAll`
//! and then kept current by a listener task that applies `PropertiesChanged`
//! batches until the player's bus name changes hands. The [`Registry`] owns
//! the set of endpoints and follows players appearing and leaving.

pub mod config;
pub mod error;
pub mod logging;
pub mod media_events;
pub mod media_listener;

pub use config::RegistryConfig;
pub use error::{BusError, MprisError, Result};
pub use media_events::{LoopStatus, PlaybackStatus, PlayerProperty};
pub use media_listener::bus::{
    Bus, Notification, NotificationStream, SignalFilter, Subscription, SubscriptionId,
};
pub use media_listener::endpoint::{Endpoint, has_valid_destination_name};
pub use media_listener::metadata::TrackMetadata;
pub use media_listener::registry::{Registry, RegistryEvent, RegistryEvents};
pub use media_listener::state::EndpointState;
pub use media_listener::sync::{OnDisconnect, OnPropertyChange, SyncPhase};
pub use media_listener::variant::Variant;
pub use media_listener::zbus_bus::ZbusBus;
