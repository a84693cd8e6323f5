use std::time::Duration;

use thiserror::Error;

/// Failure while constructing or configuring the player.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio output device error: {0}")]
    DeviceError(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Async runtime unavailable: {0}")]
    Runtime(String),

    #[error("Player task failed: {0}")]
    Task(String),
}

/// Coarse classification of a playback failure, mirroring what a media
/// element reports.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaErrorKind {
    #[error("aborted")]
    Aborted,

    #[error("network error")]
    Network,

    #[error("decode error")]
    Decode,

    #[error("unsupported format")]
    UnsupportedFormat,

    #[error("unavailable")]
    Generic,
}

/// A playback failure attached to a track. Never thrown at callers, always
/// folded into coordinator state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub message: String,
}

impl MediaError {
    pub fn new(kind: MediaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn aborted() -> Self {
        Self::new(MediaErrorKind::Aborted, "Audio loading was aborted")
    }

    pub fn network(detail: impl std::fmt::Display) -> Self {
        Self::new(
            MediaErrorKind::Network,
            format!("Network error while loading audio: {detail}"),
        )
    }

    pub fn decode(detail: impl std::fmt::Display) -> Self {
        Self::new(
            MediaErrorKind::Decode,
            format!("Audio could not be decoded: {detail}"),
        )
    }

    pub fn unsupported(detail: impl std::fmt::Display) -> Self {
        Self::new(
            MediaErrorKind::UnsupportedFormat,
            format!("Audio format not supported: {detail}"),
        )
    }

    pub fn generic(detail: impl std::fmt::Display) -> Self {
        Self::new(
            MediaErrorKind::Generic,
            format!("Audio unavailable: {detail}"),
        )
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            MediaErrorKind::Network,
            format!("Audio loading timed out after {}s", after.as_secs_f32()),
        )
    }
}

impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::network(format!("server responded with {status}"));
        }
        if err.is_builder() {
            return Self::generic(err);
        }
        Self::network(err)
    }
}

impl From<rodio::decoder::DecoderError> for MediaError {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        match err {
            rodio::decoder::DecoderError::UnrecognizedFormat => Self::unsupported(err),
            other => Self::decode(other),
        }
    }
}

impl From<tokio::task::JoinError> for MediaError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::aborted()
        } else {
            Self::generic(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_classified_as_network() {
        let err = MediaError::timeout(Duration::from_secs(15));
        assert_eq!(err.kind, MediaErrorKind::Network);
        assert_eq!(err.to_string(), "Audio loading timed out after 15s");
    }

    #[test]
    fn unrecognized_format_maps_to_unsupported() {
        let err = MediaError::from(rodio::decoder::DecoderError::UnrecognizedFormat);
        assert_eq!(err.kind, MediaErrorKind::UnsupportedFormat);
    }

    #[test]
    fn constructors_keep_their_kind() {
        assert_eq!(MediaError::aborted().kind, MediaErrorKind::Aborted);
        assert_eq!(MediaError::decode("bad frame").kind, MediaErrorKind::Decode);
        assert_eq!(
            MediaError::generic("blocked").message,
            "Audio unavailable: blocked"
        );
    }
}
