use std::pin::Pin;
use std::sync::Arc;

use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::media_events::PlayerProperty;
use crate::media_listener::bus::{
    Bus, MEMBER_NAME_OWNER_CHANGED, MEMBER_PROPERTIES_CHANGED, MPRIS2_PLAYER_INTERFACE,
    Notification, NotificationStream, SignalFilter, SubscriptionId,
};
use crate::media_listener::state::EndpointState;

/// Called with the endpoint's bus name once its listener has stopped.
pub type OnDisconnect = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with the endpoint's bus name and the properties that changed.
pub type OnPropertyChange = Arc<dyn Fn(&str, &[PlayerProperty]) + Send + Sync>;

/// Lifecycle of an endpoint's signal subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Unregistered,
    Registering,
    Active,
    TornDown,
}

/// Merged subscriptions. Each one yields `None` once after its last
/// notification.
type Feed = Pin<Box<dyn Stream<Item = Option<Notification>> + Send>>;

pub(crate) struct Listener {
    pub bus: Arc<dyn Bus>,
    pub name: String,
    pub owner: String,
    pub state: Arc<EndpointState>,
    pub phase: Arc<Mutex<SyncPhase>>,
    pub on_disconnect: OnDisconnect,
    pub on_property_change: OnPropertyChange,
}

/// Subscribes to the endpoint's `PropertiesChanged` signals and to its
/// `NameOwnerChanged` departure, then spawns the listener task.
///
/// A failed subscription is logged and the listener runs with what is left.
/// Callbacks run on the listener task.
pub(crate) async fn attach(listener: Listener) -> JoinHandle<()> {
    *listener.phase.lock() = SyncPhase::Registering;

    let filters = [
        (
            "property changes",
            SignalFilter::properties_changed(&listener.owner),
        ),
        (
            "disconnect changes",
            SignalFilter::name_owner_changed(Some(&listener.name), Some(&listener.owner)),
        ),
    ];

    let mut ids = Vec::new();
    let mut streams = Vec::new();
    for (what, filter) in filters {
        match listener.bus.subscribe(filter).await {
            Ok(subscription) => {
                ids.push(subscription.id);
                streams.push(until_closed(subscription.stream));
            }
            Err(e) => warn!(
                destination = %listener.name,
                "Could not listen on {what}: {e}"
            ),
        }
    }

    let notifications: Feed = if streams.is_empty() {
        warn!(destination = %listener.name, "No live updates, keeping the seeded state");
        Box::pin(stream::pending())
    } else {
        Box::pin(stream::select_all(streams))
    };

    *listener.phase.lock() = SyncPhase::Active;

    let subscriptions = Subscriptions {
        bus: listener.bus.clone(),
        ids,
        notifications: Some(notifications),
        name: listener.name.clone(),
        phase: listener.phase.clone(),
        on_disconnect: listener.on_disconnect.clone(),
    };

    tokio::spawn(listener.run(subscriptions))
}

impl Listener {
    async fn run(self, mut subscriptions: Subscriptions) {
        while let Some(notification) = subscriptions.next().await {
            match notification.member.as_str() {
                MEMBER_PROPERTIES_CHANGED => self.on_properties_changed(&notification),
                MEMBER_NAME_OWNER_CHANGED => {
                    if self.is_disconnect(&notification) {
                        break;
                    }
                }
                other => debug!(destination = %self.name, "Ignoring signal {other}"),
            }
        }
        // `subscriptions` tears down on drop, on every exit path
    }

    fn on_properties_changed(&self, notification: &Notification) {
        if notification.sender != self.owner {
            debug!(
                destination = %self.name,
                sender = %notification.sender,
                "Ignoring PropertiesChanged from a stale owner"
            );
            return;
        }

        let [interface, changed, _invalidated] = notification.args.as_slice() else {
            warn!(
                destination = %self.name,
                "PropertiesChanged did not have enough args. Wanted 3, got {}",
                notification.args.len()
            );
            return;
        };

        if interface.as_str() != Some(MPRIS2_PLAYER_INTERFACE) {
            return;
        }

        let Some(changed) = changed.as_dict() else {
            warn!(
                destination = %self.name,
                "PropertiesChanged did not have a valid body, got {}",
                changed.kind()
            );
            return;
        };

        let change_set = self.state.apply(changed);
        if !change_set.is_empty() {
            debug!(destination = %self.name, ?change_set, "Properties changed");
            (self.on_property_change)(&self.name, &change_set);
        }
    }

    /// The name now belongs to someone else, or to nobody.
    fn is_disconnect(&self, notification: &Notification) -> bool {
        let [name, _old_owner, new_owner] = notification.args.as_slice() else {
            warn!(
                destination = %self.name,
                "NameOwnerChanged did not have enough args. Wanted 3, got {}",
                notification.args.len()
            );
            return false;
        };

        if name.as_str() != Some(self.name.as_str()) {
            return false;
        }

        match new_owner.as_str() {
            Some(new_owner) => new_owner != self.owner,
            None => {
                warn!(destination = %self.name, "NameOwnerChanged had a non-string owner");
                false
            }
        }
    }
}

fn until_closed(notifications: NotificationStream) -> Feed {
    Box::pin(
        notifications
            .map(Some)
            .chain(stream::once(future::ready(None))),
    )
}

/// Live subscriptions of one listener. Dropping it unsubscribes both streams,
/// closes the receiving end and reports the disconnect.
struct Subscriptions {
    bus: Arc<dyn Bus>,
    ids: Vec<SubscriptionId>,
    notifications: Option<Feed>,
    name: String,
    phase: Arc<Mutex<SyncPhase>>,
    on_disconnect: OnDisconnect,
}

impl Subscriptions {
    /// `None` as soon as any one subscription has closed.
    async fn next(&mut self) -> Option<Notification> {
        match self.notifications.as_mut() {
            Some(notifications) => notifications.next().await.flatten(),
            None => None,
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.bus.unsubscribe(id);
        }
        self.notifications.take();
        *self.phase.lock() = SyncPhase::TornDown;

        info!(destination = %self.name, "Player disconnected");
        (self.on_disconnect)(&self.name);
    }
}
