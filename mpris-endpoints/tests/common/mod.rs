#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use mpris_endpoints::media_listener::bus::{
    DBUS_NAME, MEMBER_NAME_OWNER_CHANGED, MEMBER_PROPERTIES_CHANGED,
    MPRIS2_INTERFACE, MPRIS2_PLAYER_INTERFACE,
};
use mpris_endpoints::{
    Bus, BusError, Notification, OnDisconnect, OnPropertyChange, PlayerProperty, SignalFilter,
    Subscription, SubscriptionId, Variant,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const SPOTIFY: &str = "org.mpris.MediaPlayer2.spotify";
pub const SPOTIFY_OWNER: &str = ":1.42";
pub const VLC: &str = "org.mpris.MediaPlayer2.vlc.instance1234";
pub const VLC_OWNER: &str = ":1.77";

/// One recorded bus interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetProperty {
        destination: String,
        interface: String,
        property: String,
    },
    GetAll {
        destination: String,
    },
    Method {
        destination: String,
        interface: String,
        method: String,
        args: Vec<Variant>,
    },
}

struct Subscriber {
    id: SubscriptionId,
    filter: SignalFilter,
    tx: UnboundedSender<Notification>,
}

#[derive(Default)]
struct Inner {
    owners: HashMap<String, String>,
    properties: HashMap<(String, String), HashMap<String, Variant>>,
    calls: Vec<Call>,
    subscribers: Vec<Subscriber>,
    unsubscribed: Vec<SubscriptionId>,
    failing_members: Vec<String>,
    failing_methods: Vec<String>,
}

/// In-memory [`Bus`] with one process per MPRIS player.
#[derive(Default)]
pub struct MockBus {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl MockBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Puts a player on the bus with the given `org.mpris.MediaPlayer2.Player`
    /// properties and every capability enabled.
    pub fn add_player(&self, name: &str, owner: &str, player: Vec<(&str, Variant)>) {
        let mut inner = self.inner.lock();
        inner.owners.insert(name.to_string(), owner.to_string());

        let mut player_props: HashMap<String, Variant> = [
            "CanPlay",
            "CanPause",
            "CanControl",
            "CanGoNext",
            "CanGoPrevious",
            "CanSeek",
        ]
        .into_iter()
        .map(|cap| (cap.to_string(), Variant::Bool(true)))
        .collect();
        player_props.extend(player.into_iter().map(|(k, v)| (k.to_string(), v)));
        inner.properties.insert(
            (name.to_string(), MPRIS2_PLAYER_INTERFACE.to_string()),
            player_props,
        );

        let root: HashMap<String, Variant> = [
            ("CanRaise".to_string(), Variant::Bool(true)),
            ("CanQuit".to_string(), Variant::Bool(true)),
        ]
        .into_iter()
        .collect();
        inner
            .properties
            .insert((name.to_string(), MPRIS2_INTERFACE.to_string()), root);
    }

    pub fn remove_player(&self, name: &str) {
        let mut inner = self.inner.lock();
        inner.owners.remove(name);
        inner.properties.retain(|(dest, _), _| dest != name);
    }

    pub fn set_property(&self, name: &str, interface: &str, property: &str, value: Variant) {
        self.inner
            .lock()
            .properties
            .entry((name.to_string(), interface.to_string()))
            .or_default()
            .insert(property.to_string(), value);
    }

    pub fn remove_property(&self, name: &str, interface: &str, property: &str) {
        if let Some(props) = self
            .inner
            .lock()
            .properties
            .get_mut(&(name.to_string(), interface.to_string()))
        {
            props.remove(property);
        }
    }

    /// Subscriptions for this signal member fail.
    pub fn fail_subscriptions_to(&self, member: &str) {
        self.inner.lock().failing_members.push(member.to_string());
    }

    /// Calls to this method fail with a transport error.
    pub fn fail_method(&self, method: &str) {
        self.inner.lock().failing_methods.push(method.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    /// Method invocations only, without property reads.
    pub fn method_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Method {
                    interface, method, ..
                } => Some((interface, method)),
                _ => None,
            })
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.inner.lock().unsubscribed.clone()
    }

    /// Delivers `notification` to every matching subscriber.
    pub fn emit(&self, notification: Notification) {
        let inner = self.inner.lock();
        for subscriber in &inner.subscribers {
            if matches(&subscriber.filter, &notification) {
                let _ = subscriber.tx.send(notification.clone());
            }
        }
    }

    /// Closes every subscription stream as if the connection went away.
    pub fn close_all(&self) {
        self.inner.lock().subscribers.clear();
    }

    /// Closes only the subscriptions for one signal member.
    pub fn close_member(&self, member: &str) {
        self.inner
            .lock()
            .subscribers
            .retain(|subscriber| subscriber.filter.member.as_deref() != Some(member));
    }

    /// Waits until at least `count` subscriptions are live.
    pub async fn wait_for_subscriptions(&self, count: usize) {
        eventually(|| self.subscription_count() >= count).await;
    }

    fn record(&self, call: Call) {
        self.inner.lock().calls.push(call);
    }
}

fn matches(filter: &SignalFilter, notification: &Notification) -> bool {
    let arg = |index: usize| notification.args.get(index).and_then(Variant::as_str);

    filter
        .sender
        .as_deref()
        .is_none_or(|sender| sender == notification.sender)
        && filter
            .member
            .as_deref()
            .is_none_or(|member| member == notification.member)
        && filter.arg0.as_deref().is_none_or(|arg0| arg(0) == Some(arg0))
        && filter.arg1.as_deref().is_none_or(|arg1| arg(1) == Some(arg1))
}

#[async_trait]
impl Bus for MockBus {
    async fn get_property(
        &self,
        destination: &str,
        _path: &str,
        interface: &str,
        property: &str,
    ) -> Result<Variant, BusError> {
        self.record(Call::GetProperty {
            destination: destination.to_string(),
            interface: interface.to_string(),
            property: property.to_string(),
        });

        self.inner
            .lock()
            .properties
            .get(&(destination.to_string(), interface.to_string()))
            .and_then(|props| props.get(property))
            .cloned()
            .ok_or_else(|| BusError::Other(format!("no property {interface}.{property}")))
    }

    async fn get_all_properties(
        &self,
        destination: &str,
        _path: &str,
        interface: &str,
    ) -> Result<Variant, BusError> {
        self.record(Call::GetAll {
            destination: destination.to_string(),
        });

        self.inner
            .lock()
            .properties
            .get(&(destination.to_string(), interface.to_string()))
            .map(|props| Variant::Dict(props.clone()))
            .ok_or_else(|| BusError::Other(format!("{destination} is not on the bus")))
    }

    async fn call_method(
        &self,
        destination: &str,
        _path: &str,
        interface: &str,
        method: &str,
        args: Vec<Variant>,
    ) -> Result<Vec<Variant>, BusError> {
        self.record(Call::Method {
            destination: destination.to_string(),
            interface: interface.to_string(),
            method: method.to_string(),
            args: args.clone(),
        });

        let inner = self.inner.lock();
        if inner.failing_methods.iter().any(|failing| failing == method) {
            return Err(BusError::Other(format!("{method} failed")));
        }

        if destination != DBUS_NAME {
            return Ok(Vec::new());
        }

        match method {
            "ListNames" => {
                let mut names = vec![DBUS_NAME.to_string(), ":1.1".to_string()];
                names.extend(inner.owners.keys().cloned());
                names.push("com.example.spotify".to_string());
                Ok(vec![Variant::str_list(names)])
            }
            "GetNameOwner" => {
                let name = args.first().and_then(Variant::as_str).unwrap_or_default();
                inner
                    .owners
                    .get(name)
                    .map(|owner| vec![Variant::from(owner.as_str())])
                    .ok_or_else(|| BusError::Other(format!("{name} has no owner")))
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn subscribe(&self, filter: SignalFilter) -> Result<Subscription, BusError> {
        let mut inner = self.inner.lock();
        if let Some(member) = filter.member.as_deref() {
            if inner.failing_members.iter().any(|failing| failing == member) {
                return Err(BusError::Other(format!("AddMatch for {member} refused")));
            }
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(Subscriber { id, filter, tx });

        Ok(Subscription {
            id,
            stream: Box::pin(receiver_stream(rx)),
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|subscriber| subscriber.id != id);
        inner.unsubscribed.push(id);
    }
}

fn receiver_stream(
    rx: UnboundedReceiver<Notification>,
) -> impl futures_util::Stream<Item = Notification> + Send {
    stream::unfold(rx, |mut rx| async move {
        let notification = rx.recv().await?;
        Some((notification, rx))
    })
}

pub fn properties_changed(owner: &str, changed: Vec<(&str, Variant)>) -> Notification {
    Notification {
        member: MEMBER_PROPERTIES_CHANGED.to_string(),
        sender: owner.to_string(),
        args: vec![
            Variant::from(MPRIS2_PLAYER_INTERFACE),
            Variant::dict(changed),
            Variant::Array(Vec::new()),
        ],
    }
}

pub fn name_owner_changed(name: &str, old_owner: &str, new_owner: &str) -> Notification {
    Notification {
        member: MEMBER_NAME_OWNER_CHANGED.to_string(),
        sender: DBUS_NAME.to_string(),
        args: vec![name.into(), old_owner.into(), new_owner.into()],
    }
}

pub fn track(title: &str, artists: &[&str]) -> Variant {
    Variant::dict([
        ("mpris:trackid", Variant::ObjectPath(format!("/track/{title}"))),
        ("xesam:title", Variant::from(title)),
        ("xesam:artist", Variant::str_list(artists.iter().copied())),
        ("mpris:length", Variant::I64(180_000_000)),
    ])
}

/// Callback recorder for one endpoint.
pub struct Recorder {
    pub disconnects: UnboundedReceiver<String>,
    pub changes: UnboundedReceiver<(String, Vec<PlayerProperty>)>,
}

pub fn recorder() -> (OnDisconnect, OnPropertyChange, Recorder) {
    let (disconnect_tx, disconnects) = mpsc::unbounded_channel();
    let (change_tx, changes) = mpsc::unbounded_channel();

    let on_disconnect: OnDisconnect = Arc::new(move |name: &str| {
        let _ = disconnect_tx.send(name.to_string());
    });
    let on_property_change: OnPropertyChange =
        Arc::new(move |name: &str, properties: &[PlayerProperty]| {
            let _ = change_tx.send((name.to_string(), properties.to_vec()));
        });

    (
        on_disconnect,
        on_property_change,
        Recorder {
            disconnects,
            changes,
        },
    )
}

pub async fn recv<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("callback channel closed")
}

/// Polls `condition` until it holds, failing after two seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), poll)
        .await
        .expect("condition not reached in time");
}

/// Gives the listener task a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
