use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::BusError;
use crate::media_listener::variant::Variant;

pub const DBUS_NAME: &str = "org.freedesktop.DBus";
pub const DBUS_PATH: &str = "/org/freedesktop/DBus";
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

pub const MEMBER_NAME_OWNER_CHANGED: &str = "NameOwnerChanged";
pub const MEMBER_PROPERTIES_CHANGED: &str = "PropertiesChanged";

pub const MPRIS2_PATH: &str = "/org/mpris/MediaPlayer2";
pub const MPRIS2_INTERFACE: &str = "org.mpris.MediaPlayer2";
pub const MPRIS2_PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

/// A signal delivered on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub member: String,
    /// Unique name of the sending connection, e.g. `:1.42`.
    pub sender: String,
    pub args: Vec<Variant>,
}

/// Match rule for a signal subscription. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFilter {
    pub sender: Option<String>,
    pub path: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub arg0: Option<String>,
    pub arg1: Option<String>,
}

impl SignalFilter {
    /// `PropertiesChanged` on the MPRIS object path, sent by `owner`.
    pub fn properties_changed(owner: &str) -> Self {
        Self {
            sender: Some(owner.to_string()),
            path: Some(MPRIS2_PATH.to_string()),
            interface: Some(PROPERTIES_INTERFACE.to_string()),
            member: Some(MEMBER_PROPERTIES_CHANGED.to_string()),
            ..Default::default()
        }
    }

    /// `NameOwnerChanged` from the bus daemon. With a `name`, only transitions
    /// of that name away from `old_owner` are delivered.
    pub fn name_owner_changed(name: Option<&str>, old_owner: Option<&str>) -> Self {
        Self {
            sender: Some(DBUS_NAME.to_string()),
            path: Some(DBUS_PATH.to_string()),
            interface: Some(DBUS_INTERFACE.to_string()),
            member: Some(MEMBER_NAME_OWNER_CHANGED.to_string()),
            arg0: name.map(str::to_string),
            arg1: old_owner.map(str::to_string),
        }
    }
}

pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub struct Subscription {
    pub id: SubscriptionId,
    pub stream: NotificationStream,
}

/// The message bus as seen by endpoints: property reads, method calls and
/// signal subscriptions. Implementations must be usable from several tasks
/// at once.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn get_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<Variant, BusError>;

    /// `org.freedesktop.DBus.Properties.GetAll`, returned as a [`Variant::Dict`].
    async fn get_all_properties(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
    ) -> Result<Variant, BusError>;

    /// Calls a method and returns the reply body.
    async fn call_method(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<Variant>,
    ) -> Result<Vec<Variant>, BusError>;

    async fn subscribe(&self, filter: SignalFilter) -> Result<Subscription, BusError>;

    /// Drops a subscription's match rule. Unknown or already removed ids are
    /// ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
