use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::media_events::{LoopStatus, PlaybackStatus, PlayerProperty};
use crate::media_listener::metadata::TrackMetadata;
use crate::media_listener::variant::Variant;

#[derive(Debug, Default, Clone)]
struct Properties {
    playback_status: Option<PlaybackStatus>,
    loop_status: LoopStatus,
    shuffle: bool,
    metadata: TrackMetadata,
}

/// Cached player properties for one endpoint.
///
/// Written by the endpoint's listener task, read from any thread. All access
/// goes through methods that take the lock for the duration of the call.
#[derive(Debug, Default)]
pub struct EndpointState {
    properties: Mutex<Properties>,
}

impl EndpointState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until the player has reported a valid status.
    pub fn playback_status(&self) -> Option<PlaybackStatus> {
        self.properties.lock().playback_status
    }

    pub fn loop_status(&self) -> LoopStatus {
        self.properties.lock().loop_status
    }

    pub fn shuffle(&self) -> bool {
        self.properties.lock().shuffle
    }

    pub fn metadata(&self) -> TrackMetadata {
        self.properties.lock().metadata.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.playback_status() == Some(PlaybackStatus::Playing)
    }

    /// Applies one batch of changed properties and returns the properties
    /// that were accepted.
    ///
    /// The whole batch is applied under a single lock acquisition. Unknown
    /// keys, wrong types and invalid playback statuses are skipped. Unknown
    /// loop statuses become [`LoopStatus::None`]. `Metadata` is reported as
    /// changed whenever it decodes, even if the track is the same.
    pub fn apply(&self, changed: &HashMap<String, Variant>) -> Vec<PlayerProperty> {
        let mut change_set = Vec::new();
        let mut properties = self.properties.lock();

        for (key, value) in changed {
            let Ok(property) = key.parse::<PlayerProperty>() else {
                continue;
            };

            match property {
                PlayerProperty::Shuffle => {
                    if let Some(v) = value.as_bool() {
                        if properties.shuffle != v {
                            properties.shuffle = v;
                            change_set.push(property);
                        }
                    }
                }
                PlayerProperty::PlaybackStatus => {
                    let status = value.as_str().and_then(|v| v.parse::<PlaybackStatus>().ok());
                    if status.is_some() && properties.playback_status != status {
                        properties.playback_status = status;
                        change_set.push(property);
                    }
                }
                PlayerProperty::LoopStatus => {
                    if let Some(v) = value.as_str() {
                        let status = LoopStatus::from_wire(v);
                        if properties.loop_status != status {
                            properties.loop_status = status;
                            change_set.push(property);
                        }
                    }
                }
                PlayerProperty::Metadata => match TrackMetadata::decode(value) {
                    Ok(metadata) => {
                        properties.metadata = metadata;
                        change_set.push(property);
                    }
                    Err(e) => debug!("Skipping metadata update: {e}"),
                },
            }
        }

        change_set
    }
}
