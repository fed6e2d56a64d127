use serde::{Deserialize, Serialize};

use super::engine::{AudioEngine, MediaEvent, PlayAttempt, SessionHandle, TrackConfig};

/// Playback state of a media session.
///
/// - `Uninitialized`: Created, source not yet assigned
/// - `Loading`: Source assigned, waiting for the track to become playable
/// - `ReadyPlaying`: Transport advancing (output may still be muted)
/// - `ReadyPausedByPolicy`: Playback refused by the platform; waiting for a gesture
/// - `ReadyPausedByUser`: Playable, but never started because the user had muted
/// - `Error`: Track failed to load; the session is inert
/// - `Disposed`: Torn down; no further transitions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Uninitialized,
    Loading,
    ReadyPlaying,
    ReadyPausedByPolicy,
    ReadyPausedByUser,
    Error,
    Disposed,
}

impl PlaybackState {
    fn is_ready_paused(&self) -> bool {
        matches!(self, Self::ReadyPausedByPolicy | Self::ReadyPausedByUser)
    }
}

/// What the presentation layer needs to draw the mute control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSnapshot {
    pub handle: SessionHandle,
    pub state: PlaybackState,
    pub muted: bool,
    pub track: String,
}

/// One looping track bound to one view.
///
/// Nothing here returns an error: load failures and policy rejections are
/// logged and folded into [`PlaybackState`].
pub struct MediaSession {
    handle: SessionHandle,
    track: TrackConfig,
    muted: bool,
    state: PlaybackState,
    in_flight: Option<PlayAttempt>,
    next_attempt: u64,
    engine: Box<dyn AudioEngine>,
}

impl MediaSession {
    /// Assign the track and start loading. Never blocks.
    pub fn start(
        handle: SessionHandle,
        track: TrackConfig,
        initial_muted: bool,
        engine: Box<dyn AudioEngine>,
    ) -> Self {
        let mut session = Self {
            handle,
            track,
            muted: initial_muted,
            state: PlaybackState::Uninitialized,
            in_flight: None,
            next_attempt: 0,
            engine,
        };

        session.engine.set_muted(initial_muted);
        session.engine.load(&session.track);
        session.state = PlaybackState::Loading;
        tracing::debug!("Media session {:?} loading {}", handle, session.track.uri);
        session
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn track(&self) -> &TrackConfig {
        &self.track
    }

    pub fn snapshot(&self) -> MediaSnapshot {
        MediaSnapshot {
            handle: self.handle,
            state: self.state,
            muted: self.muted,
            track: self.track.uri.clone(),
        }
    }

    /// Update the audible flag; unmuting a paused session tries to resume.
    pub fn set_muted(&mut self, muted: bool) {
        match self.state {
            PlaybackState::Disposed | PlaybackState::Error => {
                tracing::trace!("Mute toggle ignored for inert session {:?}", self.handle);
                return;
            }
            _ => {}
        }

        self.muted = muted;
        self.engine.set_muted(muted);

        if !muted && self.state.is_ready_paused() {
            self.attempt_play();
        }
    }

    /// Best-effort resume hook for clicks and taps.
    ///
    /// No-op while muted, already advancing, not yet loaded, or disposed.
    pub fn notify_user_gesture(&mut self) {
        if self.muted || !self.state.is_ready_paused() {
            return;
        }
        self.attempt_play();
    }

    /// Apply an engine completion. Events after disposal are dropped.
    pub fn handle_event(&mut self, event: MediaEvent) {
        if self.state == PlaybackState::Disposed {
            tracing::trace!("Ignoring {:?} for disposed session {:?}", event, self.handle);
            return;
        }

        match event {
            MediaEvent::CanPlayThrough => {
                if self.state != PlaybackState::Loading {
                    return;
                }
                if self.muted {
                    self.state = PlaybackState::ReadyPausedByUser;
                } else {
                    self.attempt_play();
                }
            }
            MediaEvent::LoadFailed(reason) => {
                if !matches!(
                    self.state,
                    PlaybackState::Uninitialized | PlaybackState::Loading
                ) {
                    return;
                }
                tracing::warn!(
                    "Failed to load track {} for session {:?}: {}",
                    self.track.uri,
                    self.handle,
                    reason
                );
                self.in_flight = None;
                self.state = PlaybackState::Error;
            }
            MediaEvent::PlayResolved(attempt) => {
                if !self.settle(attempt) {
                    return;
                }
                self.state = PlaybackState::ReadyPlaying;
                tracing::debug!("Media session {:?} playing", self.handle);
            }
            MediaEvent::PlayRejected(attempt, reason) => {
                if !self.settle(attempt) {
                    return;
                }
                tracing::debug!(
                    "Playback for session {:?} blocked, waiting for a gesture: {}",
                    self.handle,
                    reason
                );
                self.state = PlaybackState::ReadyPausedByPolicy;
            }
        }
    }

    /// Stop and release the track. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.state == PlaybackState::Disposed {
            return;
        }
        self.engine.stop();
        self.engine.release();
        self.in_flight = None;
        self.state = PlaybackState::Disposed;
        tracing::debug!("Media session {:?} disposed", self.handle);
    }

    fn attempt_play(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        self.next_attempt += 1;
        let attempt = PlayAttempt(self.next_attempt);
        self.in_flight = Some(attempt);
        self.engine.play(attempt);
    }

    /// Clear the in-flight attempt if `attempt` is it.
    fn settle(&mut self, attempt: PlayAttempt) -> bool {
        if self.in_flight != Some(attempt) {
            tracing::trace!(
                "Ignoring stale outcome {:?} for session {:?}",
                attempt,
                self.handle
            );
            return false;
        }
        self.in_flight = None;
        true
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("handle", &self.handle)
            .field("track", &self.track.uri)
            .field("muted", &self.muted)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
