use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::{StreamExt, future};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use zbus::{
    Connection, MatchRule, Message, MessageStream,
    fdo::PropertiesProxy,
    message::Type as MessageType,
    names::InterfaceName,
    proxy::CacheProperties,
    zvariant::{ObjectPath, Signature, Structure, StructureBuilder, Value},
};

use crate::error::BusError;
use crate::media_listener::bus::{Bus, Notification, SignalFilter, Subscription, SubscriptionId};
use crate::media_listener::variant::Variant;

/// [`Bus`] over a live zbus [`Connection`].
///
/// Each subscription owns a [`MessageStream`]; zbus removes the match rule
/// from the daemon when that stream is dropped. [`Bus::unsubscribe`] ends the
/// stream so the owner sees it close.
pub struct ZbusBus {
    connection: Connection,
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionId, oneshot::Sender<()>>>,
}

impl ZbusBus {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Opens the session bus.
    pub async fn session() -> Result<Self, BusError> {
        Ok(Self::new(Connection::session().await?))
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn properties(
        &self,
        destination: &str,
        path: &str,
    ) -> Result<PropertiesProxy<'static>, BusError> {
        let proxy = PropertiesProxy::builder(&self.connection)
            .cache_properties(CacheProperties::No)
            .destination(destination.to_string())?
            .path(path.to_string())?
            .build()
            .await?;

        Ok(proxy)
    }
}

fn interface_name(interface: &str) -> Result<InterfaceName<'_>, BusError> {
    InterfaceName::try_from(interface).map_err(|e| BusError::Zbus(e.into()))
}

/// Packs method arguments into one structure, each field keeping its own
/// D-Bus type.
fn message_body(args: &[Variant]) -> Result<Structure<'static>, BusError> {
    let mut builder = StructureBuilder::new();
    for arg in args {
        builder.push_value(to_value(arg)?);
    }

    Ok(builder.build()?)
}

#[async_trait]
impl Bus for ZbusBus {
    async fn get_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<Variant, BusError> {
        let value = self
            .properties(destination, path)
            .await?
            .get(interface_name(interface)?, property)
            .await?;

        Ok(to_variant(&value))
    }

    async fn get_all_properties(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
    ) -> Result<Variant, BusError> {
        let values = self
            .properties(destination, path)
            .await?
            .get_all(interface_name(interface)?)
            .await?;

        Ok(Variant::Dict(
            values
                .iter()
                .map(|(name, value)| (name.clone(), to_variant(value)))
                .collect(),
        ))
    }

    async fn call_method(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<Variant>,
    ) -> Result<Vec<Variant>, BusError> {
        let reply = if args.is_empty() {
            self.connection
                .call_method(Some(destination), path, Some(interface), method, &())
                .await?
        } else {
            let body = message_body(&args)?;
            self.connection
                .call_method(Some(destination), path, Some(interface), method, &body)
                .await?
        };

        Ok(message_args(&reply))
    }

    async fn subscribe(&self, filter: SignalFilter) -> Result<Subscription, BusError> {
        let mut rule = MatchRule::builder().msg_type(MessageType::Signal);
        if let Some(sender) = filter.sender.as_deref() {
            rule = rule.sender(sender)?;
        }
        if let Some(path) = filter.path.as_deref() {
            rule = rule.path(path)?;
        }
        if let Some(interface) = filter.interface.as_deref() {
            rule = rule.interface(interface)?;
        }
        if let Some(member) = filter.member.as_deref() {
            rule = rule.member(member)?;
        }
        if let Some(arg0) = filter.arg0.as_deref() {
            rule = rule.arg(0, arg0)?;
        }
        if let Some(arg1) = filter.arg1.as_deref() {
            rule = rule.arg(1, arg1)?;
        }
        let rule = rule.build();

        debug!("Adding match rule {rule}");
        let messages = MessageStream::for_match_rule(rule, &self.connection, None).await?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.subscriptions.lock().insert(id, cancel_tx);

        let stream = messages
            .take_until(cancel_rx)
            .filter_map(|message| {
                future::ready(match message {
                    Ok(message) => to_notification(&message),
                    Err(e) => {
                        warn!("Dropping undecodable signal: {e}");
                        None
                    }
                })
            });

        Ok(Subscription {
            id,
            stream: Box::pin(stream),
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(cancel) = self.subscriptions.lock().remove(&id) {
            let _ = cancel.send(());
        }
    }
}

fn to_notification(message: &Message) -> Option<Notification> {
    let header = message.header();
    let member = header.member()?.to_string();
    let sender = header
        .sender()
        .map(|sender| sender.to_string())
        .unwrap_or_default();

    Some(Notification {
        member,
        sender,
        args: message_args(message),
    })
}

fn message_args(message: &Message) -> Vec<Variant> {
    let body = message.body();
    if matches!(body.signature(), Signature::Unit) {
        return Vec::new();
    }

    match body.deserialize::<Structure>() {
        Ok(fields) => fields.fields().iter().map(to_variant).collect(),
        Err(e) => {
            debug!("Could not read message body ({}): {e}", body.signature());
            Vec::new()
        }
    }
}

fn to_variant(value: &Value<'_>) -> Variant {
    match value {
        Value::Bool(v) => Variant::Bool(*v),
        Value::U8(v) => Variant::Byte(*v),
        Value::I16(v) => Variant::I16(*v),
        Value::U16(v) => Variant::U16(*v),
        Value::I32(v) => Variant::I32(*v),
        Value::U32(v) => Variant::U32(*v),
        Value::I64(v) => Variant::I64(*v),
        Value::U64(v) => Variant::U64(*v),
        Value::F64(v) => Variant::Double(*v),
        Value::Str(v) => Variant::Str(v.to_string()),
        Value::ObjectPath(v) => Variant::ObjectPath(v.to_string()),
        Value::Value(inner) => to_variant(inner),
        Value::Array(array) => Variant::Array(array.iter().map(to_variant).collect()),
        Value::Dict(dict) => Variant::Dict(
            dict.iter()
                .filter_map(|(key, value)| match key {
                    Value::Str(key) => Some((key.to_string(), to_variant(value))),
                    _ => None,
                })
                .collect(),
        ),
        _ => Variant::Unsupported,
    }
}

fn to_value(variant: &Variant) -> Result<Value<'static>, BusError> {
    let value = match variant {
        Variant::Bool(v) => Value::Bool(*v),
        Variant::Byte(v) => Value::U8(*v),
        Variant::I16(v) => Value::I16(*v),
        Variant::U16(v) => Value::U16(*v),
        Variant::I32(v) => Value::I32(*v),
        Variant::U32(v) => Value::U32(*v),
        Variant::I64(v) => Value::I64(*v),
        Variant::U64(v) => Value::U64(*v),
        Variant::Double(v) => Value::F64(*v),
        Variant::Str(v) => Value::from(v.clone()),
        Variant::ObjectPath(v) => Value::ObjectPath(ObjectPath::try_from(v.clone())?),
        other => {
            return Err(BusError::Other(format!(
                "cannot send {} as a method argument",
                other.kind()
            )));
        }
    };

    Ok(value)
}
