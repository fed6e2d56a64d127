use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::engine::{AudioEngine, EventSink, MediaEvent, SessionHandle, TrackConfig};
use super::session::{MediaSession, MediaSnapshot, PlaybackState};

/// Builds the platform engine for a new session.
pub type EngineFactory = Box<dyn FnMut(SessionHandle, EventSink) -> Box<dyn AudioEngine>>;

/// Registry of media sessions, at most one per view.
///
/// Runs on the UI event loop: all calls and event deliveries are applied one
/// at a time, in order. Sessions for different views share nothing.
pub struct MediaController {
    factory: EngineFactory,
    sessions: HashMap<SessionHandle, MediaSession>,
    views: HashMap<String, SessionHandle>,
    next_handle: u64,
    tx: UnboundedSender<(SessionHandle, MediaEvent)>,
    rx: UnboundedReceiver<(SessionHandle, MediaEvent)>,
}

impl MediaController {
    pub fn new(factory: EngineFactory) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            factory,
            sessions: HashMap::new(),
            views: HashMap::new(),
            next_handle: 0,
            tx,
            rx,
        }
    }

    /// Start a session for `view`, disposing any session the view already had.
    pub fn create(&mut self, view: &str, track: TrackConfig, initial_muted: bool) -> SessionHandle {
        if let Some(previous) = self.views.remove(view) {
            tracing::debug!("View {} replaced its media session {:?}", view, previous);
            self.dispose(previous);
        }

        self.next_handle += 1;
        let handle = SessionHandle(self.next_handle);
        let engine = (self.factory)(handle, EventSink::new(handle, self.tx.clone()));
        let session = MediaSession::start(handle, track, initial_muted, engine);

        self.sessions.insert(handle, session);
        self.views.insert(view.to_string(), handle);
        handle
    }

    pub fn set_muted(&mut self, handle: SessionHandle, muted: bool) {
        if let Some(session) = self.sessions.get_mut(&handle) {
            session.set_muted(muted);
        }
    }

    /// Flip the mute flag, returning the new value.
    pub fn toggle_muted(&mut self, handle: SessionHandle) -> Option<bool> {
        let session = self.sessions.get_mut(&handle)?;
        let muted = !session.muted();
        session.set_muted(muted);
        Some(muted)
    }

    /// Wire this to every click/tap on the view.
    pub fn notify_user_gesture(&mut self, handle: SessionHandle) {
        if let Some(session) = self.sessions.get_mut(&handle) {
            session.notify_user_gesture();
        }
    }

    /// Tear down a session. Unknown or already disposed handles are ignored.
    pub fn dispose(&mut self, handle: SessionHandle) {
        let Some(mut session) = self.sessions.remove(&handle) else {
            return;
        };
        session.dispose();
        self.views.retain(|_, h| *h != handle);
    }

    /// Tear down the session bound to `view`, if any.
    pub fn dispose_view(&mut self, view: &str) {
        if let Some(handle) = self.views.remove(view) {
            self.dispose(handle);
        }
    }

    /// Apply an engine completion to its session.
    ///
    /// Events for sessions that no longer exist are dropped without effect.
    pub fn deliver(&mut self, handle: SessionHandle, event: MediaEvent) {
        match self.sessions.get_mut(&handle) {
            Some(session) => session.handle_event(event),
            None => tracing::trace!("Dropping late {:?} for {:?}", event, handle),
        }
    }

    /// Apply every event queued through [`EventSink`]s. Returns how many ran.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok((handle, event)) = self.rx.try_recv() {
            self.deliver(handle, event);
            count += 1;
        }
        count
    }

    /// Wait for the next queued event and apply it.
    pub async fn next_event(&mut self) {
        if let Some((handle, event)) = self.rx.recv().await {
            self.deliver(handle, event);
        }
    }

    /// Current state; handles issued by this controller but gone report `Disposed`.
    pub fn state(&self, handle: SessionHandle) -> Option<PlaybackState> {
        match self.sessions.get(&handle) {
            Some(session) => Some(session.state()),
            None if handle.0 >= 1 && handle.0 <= self.next_handle => {
                Some(PlaybackState::Disposed)
            }
            None => None,
        }
    }

    pub fn snapshot(&self, handle: SessionHandle) -> Option<MediaSnapshot> {
        self.sessions.get(&handle).map(MediaSession::snapshot)
    }

    pub fn session_for_view(&self, view: &str) -> Option<SessionHandle> {
        self.views.get(view).copied()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl std::fmt::Debug for MediaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaController")
            .field("sessions", &self.sessions)
            .field("views", &self.views)
            .finish()
    }
}
