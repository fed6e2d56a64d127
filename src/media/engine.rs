use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Identifies one media session. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionHandle(pub u64);

/// Identifies one call to [`AudioEngine::play`].
///
/// The engine echoes it back in [`MediaEvent::PlayResolved`] or
/// [`MediaEvent::PlayRejected`] so stale outcomes can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayAttempt(pub u64);

/// Volume used by every stage view unless configured otherwise.
pub const DEFAULT_VOLUME: f32 = 0.7;

/// The track a session plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub uri: String,
    pub looping: bool,
    /// 0.0 to 1.0.
    pub volume: f32,
}

impl TrackConfig {
    /// A looping track at the default volume.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            looping: true,
            volume: DEFAULT_VOLUME,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }
}

/// Player-wide audio preferences applied to every track a view plays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub volume: f32,
    /// Sessions are created muted.
    pub start_muted: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            start_muted: false,
        }
    }
}

impl AudioSettings {
    pub fn track(&self, uri: impl Into<String>) -> TrackConfig {
        TrackConfig::new(uri).with_volume(self.volume)
    }
}

/// Completion signals from the audio engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The track has buffered enough to play through.
    CanPlayThrough,
    /// The resource could not be loaded.
    LoadFailed(String),
    PlayResolved(PlayAttempt),
    /// Usually the platform's autoplay policy refusing playback without a gesture.
    PlayRejected(PlayAttempt, String),
}

/// The platform audio element behind a session.
///
/// All calls are fire-and-forget. Outcomes of `load` and `play` are reported
/// later as [`MediaEvent`]s, typically through the [`EventSink`] handed to the
/// engine when it was created.
pub trait AudioEngine {
    /// Assign the source and begin loading.
    fn load(&mut self, track: &TrackConfig);
    /// Ask the transport to start advancing.
    fn play(&mut self, attempt: PlayAttempt);
    /// Silence or restore output without touching the transport.
    fn set_muted(&mut self, muted: bool);
    fn stop(&mut self);
    /// Drop the source and free platform resources.
    fn release(&mut self);
}

/// Channel an engine uses to report completions for its session.
#[derive(Debug, Clone)]
pub struct EventSink {
    handle: SessionHandle,
    tx: UnboundedSender<(SessionHandle, MediaEvent)>,
}

impl EventSink {
    pub(crate) fn new(
        handle: SessionHandle,
        tx: UnboundedSender<(SessionHandle, MediaEvent)>,
    ) -> Self {
        Self { handle, tx }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Queue an event for the owning controller.
    ///
    /// Sending after the controller is gone is silently dropped.
    pub fn send(&self, event: MediaEvent) {
        if self.tx.send((self.handle, event)).is_err() {
            tracing::trace!("Media controller gone, dropping event for {:?}", self.handle);
        }
    }
}
