use std::time::Duration;

use chrono::{DateTime, Datelike};

use crate::error::{MprisError, Result};
use crate::media_listener::variant::Variant;

/// A structured representation of a player's `Metadata` property.
///
/// * [Read more about the MPRIS2 `Metadata_Map` type.][metadata_map]
/// * [Read MPRIS v2 metadata guidelines][metadata_guidelines]
///
/// Every field keeps its zero value when the player omits the key or sends it
/// with an unexpected type. A new value is decoded for every `Metadata`
/// update; fields are never patched in place.
///
/// [metadata_map]: https://specifications.freedesktop.org/mpris-spec/latest/Track_List_Interface.html#Mapping:Metadata_Map
/// [metadata_guidelines]: https://www.freedesktop.org/wiki/Specifications/mpris-spec/metadata/
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    /// Based on `mpris:trackid`
    /// > A unique identity for this track within the context of an MPRIS object.
    pub id: String,

    /// Based on `mpris:length`
    /// > The duration of the track in microseconds.
    pub length: Duration,

    /// Based on `mpris:artUrl`
    /// > The location of an image representing the track or album.
    pub art_url: String,

    /// Based on `xesam:artist`, several artists joined with `", "`.
    pub artist: String,

    /// Based on `xesam:album`
    pub album: String,

    /// Based on `xesam:albumArtist`, several artists joined with `", "`.
    pub album_artist: String,

    /// Based on `xesam:title`
    pub title: String,

    /// Based on `xesam:genre`, several genres joined with `", "`.
    pub genre: String,

    /// Calendar year of `xesam:contentCreated`, stored as `i8`.
    ///
    /// The narrow type wraps real years (2024 is stored as -24). Consumers
    /// that need the year should not rely on this field.
    pub year: i8,

    /// Based on `xesam:url`
    /// > The location of the media file.
    pub url: String,
}

impl TrackMetadata {
    /// Decodes a `Metadata_Map`.
    ///
    /// Fails only when `value` is not a dict. Keys with the wrong type are
    /// dropped and the rest of the map is still decoded.
    pub fn decode(value: &Variant) -> Result<Self> {
        let map = value.as_dict().ok_or(MprisError::Decode(value.kind()))?;

        let mut metadata = TrackMetadata::default();

        for (key, val) in map {
            match key.as_str() {
                "mpris:trackid" => {
                    if let Some(v) = val.as_str() {
                        metadata.id = v.to_string();
                    }
                }
                "mpris:length" => {
                    if let Some(micros) = val.as_i64() {
                        metadata.length = Duration::from_micros(micros.max(0) as u64);
                    }
                }
                "mpris:artUrl" => {
                    if let Some(v) = val.as_str() {
                        metadata.art_url = v.to_string();
                    }
                }
                "xesam:album" => {
                    if let Some(v) = val.as_str() {
                        metadata.album = v.to_string();
                    }
                }
                "xesam:albumArtist" => {
                    if let Some(v) = joined(val) {
                        metadata.album_artist = v;
                    }
                }
                "xesam:artist" => {
                    if let Some(v) = joined(val) {
                        metadata.artist = v;
                    }
                }
                "xesam:contentCreated" => {
                    if let Some(year) = val.as_str().and_then(release_year) {
                        metadata.year = year;
                    }
                }
                "xesam:genre" => {
                    if let Some(v) = joined(val) {
                        metadata.genre = v;
                    }
                }
                "xesam:title" => {
                    if let Some(v) = val.as_str() {
                        metadata.title = v.to_string();
                    }
                }
                "xesam:url" => {
                    if let Some(v) = val.as_str() {
                        metadata.url = v.to_string();
                    }
                }
                // known keys with no field
                "xesam:asText" | "xesam:audioBPM" | "xesam:autoRating" | "xesam:comment"
                | "xesam:composer" | "xesam:discNumber" | "xesam:firstUsed"
                | "xesam:lastUsed" | "xesam:lyricist" | "xesam:trackNumber"
                | "xesam:useCount" | "xesam:userRating" => {}
                _ => {}
            }
        }

        Ok(metadata)
    }
}

/// A single string, or a list of strings joined with `", "` in source order.
fn joined(value: &Variant) -> Option<String> {
    if let Some(v) = value.as_str() {
        return Some(v.to_string());
    }

    value.as_str_list().map(|items| items.join(", "))
}

/// The calendar year of an RFC 3339 timestamp, truncated to `i8`.
fn release_year(timestamp: &str) -> Option<i8> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|created| created.year() as i8)
}
