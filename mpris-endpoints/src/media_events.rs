use strum::{EnumString, IntoStaticStr};

/// A player's playback status.
///
/// See: [MPRIS2 specification about `Playback_Status`][playback_status]
///
/// [playback_status]: https://specifications.freedesktop.org/mpris-spec/latest/Player_Interface.html#Enum:Playback_Status
#[derive(EnumString, strum::Display, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    /// Membership test against the wire values `Playing`, `Paused` and `Stopped`.
    pub fn is_valid(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// A player's looping status.
///
/// See: [MPRIS2 specification about `Loop_Status`][loop_status]
///
/// [loop_status]: https://specifications.freedesktop.org/mpris-spec/latest/Player_Interface.html#Enum:Loop_Status
#[derive(
    EnumString, strum::Display, IntoStaticStr, Debug, Default, Clone, Copy, PartialEq, Eq, Hash,
)]
pub enum LoopStatus {
    /// The playback will stop when there are no more tracks to play
    #[default]
    None,

    /// The current track will start again from the begining once it has finished playing
    Track,

    /// The playback loops through a list of tracks
    Playlist,
}

impl LoopStatus {
    pub fn is_valid(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }

    /// Unknown wire values fall back to [`LoopStatus::None`].
    pub fn from_wire(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Player properties tracked by the local cache. The string form is the
/// D-Bus property name, which is also what observers receive in change-sets.
#[derive(EnumString, strum::Display, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerProperty {
    Shuffle,
    PlaybackStatus,
    LoopStatus,
    Metadata,
}

impl PlayerProperty {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
