use std::sync::{Arc, LazyLock};
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::{task::JoinHandle, time::timeout};
use tracing::debug;

use crate::error::{MprisError, Result};
use crate::media_events::{LoopStatus, PlaybackStatus};
use crate::media_listener::bus::{Bus, MPRIS2_INTERFACE, MPRIS2_PATH, MPRIS2_PLAYER_INTERFACE};
use crate::media_listener::metadata::TrackMetadata;
use crate::media_listener::state::EndpointState;
use crate::media_listener::sync::{self, Listener, OnDisconnect, OnPropertyChange, SyncPhase};
use crate::media_listener::variant::Variant;

pub const MPRIS2_PREFIX: &str = "org.mpris.MediaPlayer2.";

static DESTINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^org\.mpris\.MediaPlayer2\.([a-zA-Z_-][a-zA-Z0-9_.-]*)$")
        .expect("destination pattern compiles")
});

/// Whether `destination` is an MPRIS2 bus name: the `org.mpris.MediaPlayer2.`
/// prefix followed by at least one identifier character.
pub fn has_valid_destination_name(destination: &str) -> bool {
    DESTINATION.is_match(destination)
}

fn short_name(destination: &str) -> Option<&str> {
    DESTINATION
        .captures(destination)
        .and_then(|captures| captures.get(1))
        .map(|short| short.as_str())
}

/// One MPRIS2 player on the bus.
///
/// The cached state is kept current by a listener task started in
/// [`Endpoint::connect`]. Dropping the endpoint stops that task, which runs
/// the disconnect callback.
///
/// Control methods make remote calls and must not be awaited from inside the
/// `on_disconnect`/`on_property_change` callbacks, which run on the listener.
pub struct Endpoint {
    bus: Arc<dyn Bus>,
    name: String,
    short_name: String,
    owner: String,
    state: Arc<EndpointState>,
    phase: Arc<Mutex<SyncPhase>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Endpoint {
    /// Validates `name`, seeds the state with one `GetAll` and starts
    /// listening for changes from `owner`.
    pub async fn connect(
        bus: Arc<dyn Bus>,
        name: &str,
        owner: &str,
        on_disconnect: OnDisconnect,
        on_property_change: OnPropertyChange,
    ) -> Result<Self> {
        let short_name = short_name(name)
            .ok_or_else(|| MprisError::InvalidDestination(name.to_string()))?
            .to_string();

        let state = Arc::new(EndpointState::new());
        let all = bus
            .get_all_properties(name, MPRIS2_PATH, MPRIS2_PLAYER_INTERFACE)
            .await?;
        let all = all.as_dict().ok_or(MprisError::Decode(all.kind()))?;
        state.apply(all);

        let phase = Arc::new(Mutex::new(SyncPhase::Unregistered));
        let listener = sync::attach(Listener {
            bus: bus.clone(),
            name: name.to_string(),
            owner: owner.to_string(),
            state: state.clone(),
            phase: phase.clone(),
            on_disconnect,
            on_property_change,
        })
        .await;

        Ok(Self {
            bus,
            name: name.to_string(),
            short_name,
            owner: owner.to_string(),
            state,
            phase,
            listener: Mutex::new(Some(listener)),
        })
    }

    /// The bus name, e.g. `org.mpris.MediaPlayer2.vlc.instance1234`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The part after the MPRIS2 prefix, e.g. `vlc.instance1234`.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Unique name of the connection that owned the bus name at construction.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn sync_phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.sync_phase() == SyncPhase::Active
    }

    pub fn playback_status(&self) -> Option<PlaybackStatus> {
        self.state.playback_status()
    }

    pub fn loop_status(&self) -> LoopStatus {
        self.state.loop_status()
    }

    pub fn shuffle(&self) -> bool {
        self.state.shuffle()
    }

    pub fn metadata(&self) -> TrackMetadata {
        self.state.metadata()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Title and artist, else the file name of the URL, else the short name.
    pub fn display_name(&self) -> String {
        let metadata = self.metadata();

        if !metadata.title.is_empty() {
            if metadata.artist.is_empty() {
                return metadata.title;
            }
            return format!("{}\n{}", metadata.title, metadata.artist);
        }

        if !metadata.url.is_empty() {
            let base = metadata
                .url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default();
            if !base.is_empty() {
                return base.to_string();
            }
        }

        self.short_name.clone()
    }

    /// The player's `Identity`, or an empty string if it does not answer in
    /// time. Some players never reply to this.
    pub async fn identity(&self, wait: Duration) -> String {
        let identity = self
            .bus
            .get_property(&self.name, MPRIS2_PATH, MPRIS2_INTERFACE, "Identity");

        match timeout(wait, identity).await {
            Ok(Ok(Variant::Str(identity))) => identity,
            _ => String::new(),
        }
    }

    /// Stops the listener. The disconnect callback still runs once.
    pub fn close(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }

    async fn capability(&self, interface: &str, property: &str) -> bool {
        match self
            .bus
            .get_property(&self.name, MPRIS2_PATH, interface, property)
            .await
        {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                debug!(destination = %self.name, "Could not read {property}: {e}");
                false
            }
        }
    }

    async fn call(&self, interface: &str, method: &str, args: Vec<Variant>) -> Result<()> {
        self.bus
            .call_method(&self.name, MPRIS2_PATH, interface, method, args)
            .await?;
        Ok(())
    }

    pub async fn can_raise(&self) -> bool {
        self.capability(MPRIS2_INTERFACE, "CanRaise").await
    }

    pub async fn can_quit(&self) -> bool {
        self.capability(MPRIS2_INTERFACE, "CanQuit").await
    }

    pub async fn can_play(&self) -> bool {
        self.capability(MPRIS2_PLAYER_INTERFACE, "CanPlay").await
    }

    pub async fn can_pause(&self) -> bool {
        self.capability(MPRIS2_PLAYER_INTERFACE, "CanPause").await
    }

    pub async fn can_control(&self) -> bool {
        self.capability(MPRIS2_PLAYER_INTERFACE, "CanControl").await
    }

    pub async fn can_go_next(&self) -> bool {
        self.capability(MPRIS2_PLAYER_INTERFACE, "CanGoNext").await
    }

    pub async fn can_go_previous(&self) -> bool {
        self.capability(MPRIS2_PLAYER_INTERFACE, "CanGoPrevious").await
    }

    pub async fn can_seek(&self) -> bool {
        self.capability(MPRIS2_PLAYER_INTERFACE, "CanSeek").await
    }

    pub async fn raise(&self) -> Result<()> {
        if !self.can_raise().await {
            return Err(MprisError::Unsupported { operation: "Raise" });
        }
        self.call(MPRIS2_INTERFACE, "Raise", Vec::new()).await
    }

    pub async fn quit(&self) -> Result<()> {
        if !self.can_quit().await {
            return Err(MprisError::Unsupported { operation: "Quit" });
        }
        self.call(MPRIS2_INTERFACE, "Quit", Vec::new()).await
    }

    /// No-op if the player is already playing.
    pub async fn play(&self) -> Result<()> {
        if self.playback_status() == Some(PlaybackStatus::Playing) {
            return Ok(());
        }
        if !self.can_play().await {
            return Err(MprisError::Unsupported { operation: "Play" });
        }
        self.call(MPRIS2_PLAYER_INTERFACE, "Play", Vec::new()).await
    }

    /// No-op if the player is already paused.
    pub async fn pause(&self) -> Result<()> {
        if self.playback_status() == Some(PlaybackStatus::Paused) {
            return Ok(());
        }
        if !self.can_pause().await {
            return Err(MprisError::Unsupported { operation: "Pause" });
        }
        self.call(MPRIS2_PLAYER_INTERFACE, "Pause", Vec::new()).await
    }

    /// Needs both `CanPause` and `CanPlay`, since the player decides which
    /// of the two it performs.
    pub async fn play_pause(&self) -> Result<()> {
        if !self.can_pause().await || !self.can_play().await {
            return Err(MprisError::Unsupported {
                operation: "PlayPause",
            });
        }
        self.call(MPRIS2_PLAYER_INTERFACE, "PlayPause", Vec::new())
            .await
    }

    /// No-op if the player is already stopped. Gated on `CanControl`.
    pub async fn stop(&self) -> Result<()> {
        if self.playback_status() == Some(PlaybackStatus::Stopped) {
            return Ok(());
        }
        if !self.can_control().await {
            return Err(MprisError::Unsupported { operation: "Stop" });
        }
        self.call(MPRIS2_PLAYER_INTERFACE, "Stop", Vec::new()).await
    }

    pub async fn next(&self) -> Result<()> {
        if !self.can_go_next().await {
            return Err(MprisError::Unsupported { operation: "Next" });
        }
        self.call(MPRIS2_PLAYER_INTERFACE, "Next", Vec::new()).await
    }

    pub async fn previous(&self) -> Result<()> {
        if !self.can_go_previous().await {
            return Err(MprisError::Unsupported {
                operation: "Previous",
            });
        }
        self.call(MPRIS2_PLAYER_INTERFACE, "Previous", Vec::new())
            .await
    }

    /// Seeks by `seconds` relative to the current position. Negative values
    /// seek backwards.
    pub async fn seek(&self, seconds: i64) -> Result<()> {
        if !self.can_seek().await {
            return Err(MprisError::Unsupported { operation: "Seek" });
        }
        let offset = seconds.saturating_mul(1_000_000);
        self.call(MPRIS2_PLAYER_INTERFACE, "Seek", vec![Variant::I64(offset)])
            .await
    }

    pub async fn set_position(&self, _track_id: &str, _position: Duration) -> Result<()> {
        Err(MprisError::NotImplemented {
            operation: "SetPosition",
        })
    }

    pub async fn open_uri(&self, _uri: &str) -> Result<()> {
        Err(MprisError::NotImplemented {
            operation: "OpenUri",
        })
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("phase", &self.sync_phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mpris_names() {
        assert!(has_valid_destination_name("org.mpris.MediaPlayer2.spotify"));
        assert!(has_valid_destination_name(
            "org.mpris.MediaPlayer2.vlc.instance1234"
        ));
        assert!(has_valid_destination_name("org.mpris.MediaPlayer2.kde-connect_1"));
    }

    #[test]
    fn rejects_other_names() {
        assert!(!has_valid_destination_name("org.mpris.MediaPlayer2."));
        assert!(!has_valid_destination_name("com.example.spotify"));
        assert!(!has_valid_destination_name("org.mpris.MediaPlayer2.9lives"));
        assert!(!has_valid_destination_name("org.mpris.MediaPlayer2.spot ify"));
        assert!(!has_valid_destination_name("orgXmprisXMediaPlayer2Xspotify"));
        assert!(!has_valid_destination_name(":1.42"));
    }

    #[test]
    fn short_name_is_the_suffix() {
        assert_eq!(
            short_name("org.mpris.MediaPlayer2.vlc.instance1234"),
            Some("vlc.instance1234")
        );
        assert_eq!(short_name("com.example.spotify"), None);
    }
}
