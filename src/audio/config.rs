use std::str::FromStr;
use std::time::Duration;

use crate::audio::{error::AudioError, preview::DEFAULT_PREVIEW_LIMIT};

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub preview_limit: Duration,
    /// `None` lets a load hang until superseded.
    pub load_timeout: Option<Duration>,
    pub progress_interval: Duration,
    pub volume: u8,
    pub http_timeout: Duration,
    pub max_media_bytes: u64,
    pub buffer_frames: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            load_timeout: Some(Duration::from_secs(15)),
            progress_interval: Duration::from_millis(250),
            volume: 100,
            http_timeout: Duration::from_secs(20),
            max_media_bytes: 64 * 1024 * 1024,
            buffer_frames: 4096,
        }
    }
}

impl PlayerConfig {
    pub fn from_env() -> Result<Self, AudioError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from defaults overridden by whatever `lookup` returns
    /// for the `BEATBAZAAR_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AudioError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse::<u64, _>(&lookup, "BEATBAZAAR_PREVIEW_SECS")? {
            if secs == 0 {
                return Err(invalid("BEATBAZAAR_PREVIEW_SECS", "0", "must be positive"));
            }
            config.preview_limit = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "BEATBAZAAR_LOAD_TIMEOUT_SECS")? {
            config.load_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "BEATBAZAAR_PROGRESS_MS")? {
            if ms == 0 {
                return Err(invalid("BEATBAZAAR_PROGRESS_MS", "0", "must be positive"));
            }
            config.progress_interval = Duration::from_millis(ms);
        }
        if let Some(volume) = parse::<u8, _>(&lookup, "BEATBAZAAR_VOLUME")? {
            if volume > 100 {
                return Err(invalid(
                    "BEATBAZAAR_VOLUME",
                    &volume.to_string(),
                    "must be between 0 and 100",
                ));
            }
            config.volume = volume;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "BEATBAZAAR_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(mb) = parse::<u64, _>(&lookup, "BEATBAZAAR_MAX_MEDIA_MB")? {
            config.max_media_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(frames) = parse::<u32, _>(&lookup, "BEATBAZAAR_BUFFER_FRAMES")? {
            config.buffer_frames = frames;
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, AudioError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &raw, &e.to_string())),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> AudioError {
    AudioError::InvalidConfig {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = PlayerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.preview_limit, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_applied() {
        let config = PlayerConfig::from_lookup(lookup(&[
            ("BEATBAZAAR_PREVIEW_SECS", "45"),
            ("BEATBAZAAR_LOAD_TIMEOUT_SECS", "0"),
            ("BEATBAZAAR_VOLUME", " 70 "),
            ("BEATBAZAAR_MAX_MEDIA_MB", "8"),
        ]))
        .unwrap();

        assert_eq!(config.preview_limit, Duration::from_secs(45));
        assert_eq!(config.load_timeout, None);
        assert_eq!(config.volume, 70);
        assert_eq!(config.max_media_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn rejects_garbage() {
        let err = PlayerConfig::from_lookup(lookup(&[("BEATBAZAAR_PROGRESS_MS", "fast")]))
            .unwrap_err();
        assert!(matches!(
            err,
            AudioError::InvalidConfig { key: "BEATBAZAAR_PROGRESS_MS", .. }
        ));

        let err = PlayerConfig::from_lookup(lookup(&[("BEATBAZAAR_VOLUME", "150")])).unwrap_err();
        assert!(matches!(err, AudioError::InvalidConfig { key: "BEATBAZAAR_VOLUME", .. }));

        assert!(PlayerConfig::from_lookup(lookup(&[("BEATBAZAAR_PREVIEW_SECS", "0")])).is_err());
    }
}
