use std::time::Duration;

pub const DEFAULT_PREVIEW_LIMIT: Duration = Duration::from_secs(30);

/// Playback rules for tracks the listener does not own: they stop at the
/// preview limit and cannot be sought past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewPolicy {
    limit: Duration,
}

impl Default for PreviewPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_LIMIT)
    }
}

impl PreviewPolicy {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn limit_reached(&self, owned: bool, position: Duration) -> bool {
        !owned && position >= self.limit
    }

    pub fn displayed_duration(&self, owned: bool, media: Option<Duration>) -> Option<Duration> {
        if owned {
            return media;
        }
        Some(media.map_or(self.limit, |d| d.min(self.limit)))
    }

    pub fn clamp_seek(&self, owned: bool, requested: Duration, media: Option<Duration>) -> Duration {
        let mut target = requested;
        if let Some(media) = media {
            target = target.min(media);
        }
        if !owned {
            target = target.min(self.limit);
        }
        target
    }
}
