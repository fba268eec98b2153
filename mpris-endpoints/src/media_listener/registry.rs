use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::StreamExt;
use parking_lot::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::error::{MprisError, Result};
use crate::media_events::PlayerProperty;
use crate::media_listener::bus::{
    Bus, DBUS_INTERFACE, DBUS_NAME, DBUS_PATH, SignalFilter, Subscription,
};
use crate::media_listener::endpoint::{Endpoint, has_valid_destination_name};
use crate::media_listener::sync::{OnDisconnect, OnPropertyChange, SyncPhase};
use crate::media_listener::variant::Variant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added { name: String, identity: String },
    Removed(String),
    PropertiesChanged {
        name: String,
        properties: Vec<PlayerProperty>,
    },
}

/// Receiving side of a [`Registry`]'s events.
///
/// `Added` and `Removed` are never dropped. `PropertiesChanged` goes through
/// a buffer of `event_buffer` entries and is dropped, with a warning, while
/// that buffer is full.
pub struct RegistryEvents {
    lifecycle: UnboundedReceiver<RegistryEvent>,
    changes: Receiver<RegistryEvent>,
}

impl RegistryEvents {
    /// The next event, lifecycle events first. `None` once the registry and
    /// all of its endpoints are gone and nothing is left to read.
    pub async fn recv(&mut self) -> Option<RegistryEvent> {
        tokio::select! {
            biased;
            Some(event) = self.lifecycle.recv() => Some(event),
            Some(event) = self.changes.recv() => Some(event),
            else => None,
        }
    }

    pub fn try_recv(&mut self) -> Option<RegistryEvent> {
        self.lifecycle
            .try_recv()
            .or_else(|_| self.changes.try_recv())
            .ok()
    }
}

struct Tracked {
    generation: u64,
    endpoint: Arc<Endpoint>,
}

type Endpoints = RwLock<HashMap<String, Tracked>>;

/// The set of live endpoints, keyed by bus name.
///
/// Endpoints leave the registry when their listener reports a disconnect;
/// a player that comes back is tracked as a new endpoint.
pub struct Registry {
    bus: Arc<dyn Bus>,
    config: RegistryConfig,
    endpoints: Arc<Endpoints>,
    next_generation: AtomicU64,
    lifecycle: UnboundedSender<RegistryEvent>,
    changes: Sender<RegistryEvent>,
}

impl Registry {
    pub fn new(bus: Arc<dyn Bus>, config: RegistryConfig) -> (Self, RegistryEvents) {
        let (lifecycle, lifecycle_rx) = mpsc::unbounded_channel();
        let (changes, changes_rx) = mpsc::channel(config.event_buffer.max(1));

        let registry = Self {
            bus,
            config,
            endpoints: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            lifecycle,
            changes,
        };
        let events = RegistryEvents {
            lifecycle: lifecycle_rx,
            changes: changes_rx,
        };

        (registry, events)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Tracks every MPRIS2 player currently on the bus. Returns how many were
    /// added; players that fail to initialize are logged and skipped.
    pub async fn discover(&self) -> Result<usize> {
        let reply = self
            .bus
            .call_method(DBUS_NAME, DBUS_PATH, DBUS_INTERFACE, "ListNames", Vec::new())
            .await?;
        let names = reply
            .first()
            .and_then(Variant::as_str_list)
            .ok_or(MprisError::Decode("ListNames reply"))?
            .into_iter()
            .filter(|name| has_valid_destination_name(name))
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut added = 0;
        for name in names {
            if self.contains(&name) || !self.is_allowed(&name) {
                continue;
            }

            let owner = match self.name_owner(&name).await {
                Ok(owner) => owner,
                Err(e) => {
                    warn!(destination = %name, "Couldn't find owner: {e}");
                    continue;
                }
            };

            match self.track(&name, &owner).await {
                Ok(_) => added += 1,
                Err(e) => warn!(destination = %name, "Could not create a new player: {e}"),
            }
        }

        Ok(added)
    }

    /// Follows `NameOwnerChanged` until the bus closes the stream: new players
    /// are tracked, departed ones removed.
    pub async fn watch(&self) -> Result<()> {
        let Subscription { id, mut stream } = self
            .bus
            .subscribe(SignalFilter::name_owner_changed(None, None))
            .await?;

        while let Some(notification) = stream.next().await {
            let [name, old_owner, new_owner] = notification.args.as_slice() else {
                warn!(
                    "NameOwnerChanged did not have enough args. Wanted 3, got {}",
                    notification.args.len()
                );
                continue;
            };
            let (Some(name), Some(old_owner), Some(new_owner)) =
                (name.as_str(), old_owner.as_str(), new_owner.as_str())
            else {
                continue;
            };

            if !has_valid_destination_name(name) {
                continue;
            }

            // handle player removed
            if new_owner.is_empty() {
                let departed = self
                    .get(name)
                    .is_some_and(|endpoint| endpoint.owner() == old_owner);
                if departed {
                    self.remove(name);
                }
                continue;
            }

            // handle player added or replaced
            let known = self
                .get(name)
                .is_some_and(|endpoint| endpoint.owner() == new_owner);
            if !known && self.is_allowed(name) {
                info!(destination = %name, "Discovered new player");
                if let Err(e) = self.track(name, new_owner).await {
                    warn!(destination = %name, "Could not create a new player: {e}");
                }
            }
        }

        self.bus.unsubscribe(id);
        Ok(())
    }

    /// Creates an endpoint for `name` owned by `owner`, replacing any endpoint
    /// already held under that name.
    pub async fn track(&self, name: &str, owner: &str) -> Result<Arc<Endpoint>> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let endpoint = Endpoint::connect(
            self.bus.clone(),
            name,
            owner,
            self.on_disconnect(generation),
            self.on_property_change(),
        )
        .await?;
        let endpoint = Arc::new(endpoint);
        let identity = endpoint.identity(self.config.identity_timeout).await;

        let replaced = self.endpoints.write().insert(
            name.to_string(),
            Tracked {
                generation,
                endpoint: endpoint.clone(),
            },
        );
        if let Some(replaced) = replaced {
            replaced.endpoint.close();
        }

        // the listener may already have stopped before the insert
        if endpoint.sync_phase() == SyncPhase::TornDown {
            remove_generation(&self.endpoints, name, generation);
            return Ok(endpoint);
        }

        let _ = self.lifecycle.send(RegistryEvent::Added {
            name: name.to_string(),
            identity,
        });

        Ok(endpoint)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints
            .read()
            .get(name)
            .map(|tracked| tracked.endpoint.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.read().contains_key(name)
    }

    /// Bus names of all tracked endpoints, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.endpoints.read().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// All tracked endpoints, sorted by bus name.
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        let mut endpoints = self
            .endpoints
            .read()
            .values()
            .map(|tracked| tracked.endpoint.clone())
            .collect::<Vec<_>>();
        endpoints.sort_by(|a, b| a.name().cmp(b.name()));
        endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Stops tracking `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<Endpoint>> {
        let removed = self.endpoints.write().remove(name)?;
        removed.endpoint.close();
        let _ = self.lifecycle.send(RegistryEvent::Removed(name.to_string()));
        Some(removed.endpoint)
    }

    /// Stops every listener and empties the registry.
    pub fn shutdown(&self) {
        let drained = self.endpoints.write().drain().collect::<Vec<_>>();
        for (name, tracked) in drained {
            tracked.endpoint.close();
            let _ = self.lifecycle.send(RegistryEvent::Removed(name));
        }
    }

    fn is_allowed(&self, name: &str) -> bool {
        let short = name
            .strip_prefix(crate::media_listener::endpoint::MPRIS2_PREFIX)
            .unwrap_or(name);
        self.config.is_allowed(short)
    }

    async fn name_owner(&self, name: &str) -> Result<String> {
        let reply = self
            .bus
            .call_method(
                DBUS_NAME,
                DBUS_PATH,
                DBUS_INTERFACE,
                "GetNameOwner",
                vec![name.into()],
            )
            .await?;

        reply
            .first()
            .and_then(Variant::as_str)
            .map(str::to_string)
            .ok_or(MprisError::Decode("GetNameOwner reply"))
    }

    fn on_disconnect(&self, generation: u64) -> OnDisconnect {
        let endpoints = Arc::downgrade(&self.endpoints);
        let lifecycle = self.lifecycle.clone();

        Arc::new(move |name: &str| {
            let Some(endpoints) = endpoints.upgrade() else {
                return;
            };
            if remove_generation(&endpoints, name, generation) {
                let _ = lifecycle.send(RegistryEvent::Removed(name.to_string()));
            }
        })
    }

    fn on_property_change(&self) -> OnPropertyChange {
        let changes = self.changes.clone();

        Arc::new(move |name: &str, properties: &[PlayerProperty]| {
            let event = RegistryEvent::PropertiesChanged {
                name: name.to_string(),
                properties: properties.to_vec(),
            };
            if let Err(TrySendError::Full(event)) = changes.try_send(event) {
                warn!(destination = %name, ?event, "Event buffer is full, dropping event");
            }
        })
    }
}

/// Removes `name` only if it is still the endpoint created as `generation`,
/// so a stale listener cannot evict its replacement.
fn remove_generation(endpoints: &Endpoints, name: &str, generation: u64) -> bool {
    let removed = {
        let mut endpoints = endpoints.write();
        match endpoints.get(name) {
            Some(tracked) if tracked.generation == generation => endpoints.remove(name),
            _ => None,
        }
    };

    removed.is_some()
}

impl Drop for Registry {
    fn drop(&mut self) {
        for (_, tracked) in self.endpoints.write().drain() {
            tracked.endpoint.close();
        }
    }
}
