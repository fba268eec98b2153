use std::collections::HashSet;
use std::env;
use std::time::Duration;

use tracing::warn;

pub const ALLOW_LIST_VAR: &str = "MPRIS_ENDPOINTS_ALLOW";
pub const IDENTITY_TIMEOUT_VAR: &str = "MPRIS_IDENTITY_TIMEOUT_MS";

/// Registry settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Short names (`spotify`, `vlc.instance1234`) to track. `None` tracks
    /// every player.
    pub allow_list: Option<HashSet<String>>,
    /// How long to wait for a player's `Identity`. Some chromium instances
    /// never answer.
    pub identity_timeout: Duration,
    /// Capacity of the registry event channel.
    pub event_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            allow_list: None,
            identity_timeout: Duration::from_millis(200),
            event_buffer: 100,
        }
    }
}

impl RegistryConfig {
    /// Defaults, overridden by `MPRIS_ENDPOINTS_ALLOW` (comma-separated short
    /// names) and `MPRIS_IDENTITY_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(allow) = env::var(ALLOW_LIST_VAR) {
            config.allow_list = Some(parse_allow_list(&allow));
        }

        if let Ok(millis) = env::var(IDENTITY_TIMEOUT_VAR) {
            match millis.trim().parse::<u64>() {
                Ok(millis) => config.identity_timeout = Duration::from_millis(millis),
                Err(e) => warn!("Ignoring {IDENTITY_TIMEOUT_VAR}={millis}: {e}"),
            }
        }

        config
    }

    pub fn is_allowed(&self, short_name: &str) -> bool {
        match &self.allow_list {
            Some(allowed) => allowed.contains(&normalize_short_name(short_name)),
            None => true,
        }
    }
}

fn parse_allow_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(normalize_short_name)
        .collect()
}

/// Replaces a trailing `.instance1234` with `.instancen`, so one allow-list
/// entry covers every instance of a player.
pub fn normalize_short_name(short_name: &str) -> String {
    match short_name.rsplit_once(".instance") {
        Some((app, _)) => format!("{app}.instancen"),
        None => short_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_share_one_entry() {
        assert_eq!(normalize_short_name("vlc.instance1234"), "vlc.instancen");
        assert_eq!(normalize_short_name("spotify"), "spotify");
    }

    #[test]
    fn allow_list_matches_normalized_names() {
        let config = RegistryConfig {
            allow_list: Some(parse_allow_list(" spotify, vlc.instance1 ,,")),
            ..Default::default()
        };

        assert!(config.is_allowed("spotify"));
        assert!(config.is_allowed("vlc.instance98765"));
        assert!(!config.is_allowed("firefox"));
    }

    #[test]
    fn no_allow_list_allows_everything() {
        assert!(RegistryConfig::default().is_allowed("anything"));
    }
}
