use std::cell::{Cell, RefCell};
use std::rc::Rc;

use closet_quest::media::*;
use speculate2::speculate;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Load(String),
    Play(PlayAttempt),
    SetMuted(bool),
    Stop,
    Release,
}

type CallLog = Rc<RefCell<Vec<(SessionHandle, Call)>>>;

/// Records every engine call; outcomes are delivered by the test.
struct RecordingEngine {
    handle: SessionHandle,
    calls: CallLog,
}

impl RecordingEngine {
    fn push(&self, call: Call) {
        self.calls.borrow_mut().push((self.handle, call));
    }
}

impl AudioEngine for RecordingEngine {
    fn load(&mut self, track: &TrackConfig) {
        self.push(Call::Load(track.uri.clone()));
    }

    fn play(&mut self, attempt: PlayAttempt) {
        self.push(Call::Play(attempt));
    }

    fn set_muted(&mut self, muted: bool) {
        self.push(Call::SetMuted(muted));
    }

    fn stop(&mut self) {
        self.push(Call::Stop);
    }

    fn release(&mut self) {
        self.push(Call::Release);
    }
}

/// Answers through its event sink: loads instantly, and plays only when allowed.
struct PolicyEngine {
    sink: EventSink,
    allow_play: Rc<Cell<bool>>,
}

impl AudioEngine for PolicyEngine {
    fn load(&mut self, _track: &TrackConfig) {
        self.sink.send(MediaEvent::CanPlayThrough);
    }

    fn play(&mut self, attempt: PlayAttempt) {
        if self.allow_play.get() {
            self.sink.send(MediaEvent::PlayResolved(attempt));
        } else {
            self.sink
                .send(MediaEvent::PlayRejected(attempt, "NotAllowedError".to_string()));
        }
    }

    fn set_muted(&mut self, _muted: bool) {}
    fn stop(&mut self) {}
    fn release(&mut self) {}
}

fn setup() -> (MediaController, CallLog) {
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));
    let log = calls.clone();
    let controller = MediaController::new(Box::new(move |handle: SessionHandle, _sink: EventSink| {
        Box::new(RecordingEngine {
            handle,
            calls: log.clone(),
        }) as Box<dyn AudioEngine>
    }));
    (controller, calls)
}

fn calls_for(calls: &CallLog, handle: SessionHandle) -> Vec<Call> {
    calls
        .borrow()
        .iter()
        .filter(|(h, _)| *h == handle)
        .map(|(_, c)| c.clone())
        .collect()
}

fn plays_for(calls: &CallLog, handle: SessionHandle) -> Vec<PlayAttempt> {
    calls_for(calls, handle)
        .into_iter()
        .filter_map(|c| match c {
            Call::Play(attempt) => Some(attempt),
            _ => None,
        })
        .collect()
}

fn last_play(calls: &CallLog, handle: SessionHandle) -> PlayAttempt {
    *plays_for(calls, handle).last().expect("no play attempt made")
}

fn track() -> TrackConfig {
    TrackConfig::new("/stepfight_2.mp3")
}

speculate! {
    describe "track config" {
        it "uses looping tracks at the default volume" {
            let config = track();
            assert!(config.looping);
            assert_eq!(config.volume, DEFAULT_VOLUME);
            assert_eq!(track().with_volume(3.0).volume, 1.0);
        }
    }

    describe "create" {
        before {
            let (mut media, calls) = setup();
        }

        it "assigns the track and starts loading" {
            let handle = media.create("closet/2/battle", track(), false);

            assert_eq!(media.state(handle), Some(PlaybackState::Loading));
            assert_eq!(
                calls_for(&calls, handle),
                vec![Call::SetMuted(false), Call::Load("/stepfight_2.mp3".to_string())]
            );
        }

        it "replaces the session already bound to the view" {
            let first = media.create("closet/2/battle", track(), false);
            let second = media.create("closet/2/battle", track(), false);

            assert_ne!(first, second);
            assert_eq!(media.state(first), Some(PlaybackState::Disposed));
            assert_eq!(media.state(second), Some(PlaybackState::Loading));
            assert!(calls_for(&calls, first).contains(&Call::Release));
            assert_eq!(media.session_for_view("closet/2/battle"), Some(second));
            assert_eq!(media.active_sessions(), 1);
        }

        it "keeps views isolated" {
            let battle = media.create("closet/2/battle", track(), false);
            let clear = media.create("closet/2/clear", TrackConfig::new("/stepclear.mp3"), true);

            media.deliver(battle, MediaEvent::CanPlayThrough);

            assert_eq!(media.state(clear), Some(PlaybackState::Loading));
            assert!(plays_for(&calls, clear).is_empty());
            assert_eq!(media.active_sessions(), 2);
        }
    }

    describe "loading" {
        before {
            let (mut media, calls) = setup();
        }

        it "plays once the track can play through" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);

            let attempt = last_play(&calls, handle);
            assert_eq!(media.state(handle), Some(PlaybackState::Loading));

            media.deliver(handle, MediaEvent::PlayResolved(attempt));
            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPlaying));
        }

        it "waits for a gesture when autoplay is rejected" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);
            let attempt = last_play(&calls, handle);

            media.deliver(handle, MediaEvent::PlayRejected(attempt, "NotAllowedError".to_string()));

            let snapshot = media.snapshot(handle).unwrap();
            assert_eq!(snapshot.state, PlaybackState::ReadyPausedByPolicy);
            assert!(!snapshot.muted);
        }

        it "does not start playback when created muted" {
            let handle = media.create("view", track(), true);
            media.deliver(handle, MediaEvent::CanPlayThrough);

            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPausedByUser));
            assert!(plays_for(&calls, handle).is_empty());
        }

        it "becomes inert when the track fails to load" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::LoadFailed("404".to_string()));
            assert_eq!(media.state(handle), Some(PlaybackState::Error));

            media.set_muted(handle, true);
            media.notify_user_gesture(handle);
            media.deliver(handle, MediaEvent::CanPlayThrough);

            assert_eq!(media.state(handle), Some(PlaybackState::Error));
            assert!(!media.snapshot(handle).unwrap().muted);
            assert!(plays_for(&calls, handle).is_empty());
        }
    }

    describe "notify_user_gesture" {
        before {
            let (mut media, calls) = setup();
        }

        it "retries playback after a policy rejection" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);
            let first = last_play(&calls, handle);
            media.deliver(handle, MediaEvent::PlayRejected(first, "blocked".to_string()));

            media.notify_user_gesture(handle);
            let second = last_play(&calls, handle);
            assert_ne!(first, second);

            media.deliver(handle, MediaEvent::PlayResolved(second));
            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPlaying));
        }

        it "keeps retrying without limit" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);

            for _ in 0..10 {
                let attempt = last_play(&calls, handle);
                media.deliver(handle, MediaEvent::PlayRejected(attempt, "blocked".to_string()));
                assert_eq!(media.state(handle), Some(PlaybackState::ReadyPausedByPolicy));
                media.notify_user_gesture(handle);
            }

            assert_eq!(plays_for(&calls, handle).len(), 11);
        }

        it "does nothing while muted" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);
            let attempt = last_play(&calls, handle);
            media.deliver(handle, MediaEvent::PlayRejected(attempt, "blocked".to_string()));
            media.set_muted(handle, true);

            media.notify_user_gesture(handle);

            assert_eq!(plays_for(&calls, handle).len(), 1);
            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPausedByPolicy));
        }

        it "does nothing while already playing" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);
            media.deliver(handle, MediaEvent::PlayResolved(last_play(&calls, handle)));

            media.notify_user_gesture(handle);

            assert_eq!(plays_for(&calls, handle).len(), 1);
        }

        it "does not stack attempts while one is in flight" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);
            media.deliver(handle, MediaEvent::PlayRejected(last_play(&calls, handle), "blocked".to_string()));

            media.notify_user_gesture(handle);
            media.notify_user_gesture(handle);
            media.notify_user_gesture(handle);

            assert_eq!(plays_for(&calls, handle).len(), 2);
        }

        it "does nothing before the track is ready" {
            let handle = media.create("view", track(), false);
            media.notify_user_gesture(handle);
            assert!(plays_for(&calls, handle).is_empty());
        }
    }

    describe "set_muted" {
        before {
            let (mut media, calls) = setup();
        }

        it "silences output without stopping the transport" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);
            media.deliver(handle, MediaEvent::PlayResolved(last_play(&calls, handle)));

            media.set_muted(handle, true);

            let snapshot = media.snapshot(handle).unwrap();
            assert_eq!(snapshot.state, PlaybackState::ReadyPlaying);
            assert!(snapshot.muted);
            let recorded = calls_for(&calls, handle);
            assert_eq!(recorded.last(), Some(&Call::SetMuted(true)));
            assert!(!recorded.contains(&Call::Stop));
        }

        it "resumes when unmuting a session that never started" {
            let handle = media.create("view", track(), true);
            media.deliver(handle, MediaEvent::CanPlayThrough);

            media.set_muted(handle, false);
            let attempt = last_play(&calls, handle);
            media.deliver(handle, MediaEvent::PlayResolved(attempt));

            let snapshot = media.snapshot(handle).unwrap();
            assert_eq!(snapshot.state, PlaybackState::ReadyPlaying);
            assert!(!snapshot.muted);
        }

        it "swallows a rejected resume on unmute" {
            let handle = media.create("view", track(), true);
            media.deliver(handle, MediaEvent::CanPlayThrough);

            media.set_muted(handle, false);
            media.deliver(handle, MediaEvent::PlayRejected(last_play(&calls, handle), "blocked".to_string()));

            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPausedByPolicy));
            assert!(!media.snapshot(handle).unwrap().muted);
        }

        it "toggles and reports the new flag" {
            let handle = media.create("view", track(), false);
            assert_eq!(media.toggle_muted(handle), Some(true));
            assert_eq!(media.toggle_muted(handle), Some(false));
            assert_eq!(media.toggle_muted(SessionHandle(999)), None);
            assert!(calls_for(&calls, handle).ends_with(&[Call::SetMuted(true), Call::SetMuted(false)]));
        }

        it "is remembered while loading" {
            let handle = media.create("view", track(), false);
            media.set_muted(handle, true);
            media.deliver(handle, MediaEvent::CanPlayThrough);

            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPausedByUser));
            assert!(plays_for(&calls, handle).is_empty());
        }
    }

    describe "stale outcomes" {
        before {
            let (mut media, calls) = setup();
        }

        it "ignores results for attempts that are not in flight" {
            let handle = media.create("view", track(), false);
            media.deliver(handle, MediaEvent::CanPlayThrough);

            media.deliver(handle, MediaEvent::PlayResolved(PlayAttempt(99)));
            assert_eq!(media.state(handle), Some(PlaybackState::Loading));

            let attempt = last_play(&calls, handle);
            media.deliver(handle, MediaEvent::PlayResolved(attempt));
            media.deliver(handle, MediaEvent::PlayRejected(attempt, "late".to_string()));
            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPlaying));
        }
    }

    describe "dispose" {
        before {
            let (mut media, calls) = setup();
        }

        it "stops and releases the track" {
            let handle = media.create("view", track(), false);
            media.dispose(handle);

            assert_eq!(media.state(handle), Some(PlaybackState::Disposed));
            let recorded = calls_for(&calls, handle);
            assert!(recorded.ends_with(&[Call::Stop, Call::Release]));
            assert_eq!(media.session_for_view("view"), None);
        }

        it "is idempotent" {
            let handle = media.create("view", track(), false);
            media.dispose(handle);
            media.dispose(handle);
            media.dispose_view("view");

            let stops = calls_for(&calls, handle)
                .into_iter()
                .filter(|c| *c == Call::Stop)
                .count();
            assert_eq!(stops, 1);
        }

        it "ignores a late load completion" {
            let handle = media.create("view", track(), false);
            media.dispose(handle);
            let before = calls_for(&calls, handle).len();

            media.deliver(handle, MediaEvent::CanPlayThrough);
            media.deliver(handle, MediaEvent::PlayResolved(PlayAttempt(1)));
            media.notify_user_gesture(handle);
            media.set_muted(handle, false);

            assert_eq!(media.state(handle), Some(PlaybackState::Disposed));
            assert_eq!(calls_for(&calls, handle).len(), before);
        }

        it "releases the session when the view goes away" {
            let handle = media.create("view", track(), false);
            media.dispose_view("view");

            assert_eq!(media.state(handle), Some(PlaybackState::Disposed));
            assert_eq!(media.active_sessions(), 0);
            assert!(calls_for(&calls, handle).ends_with(&[Call::Stop, Call::Release]));
        }

        it "ignores handles it never issued" {
            media.dispose(SessionHandle(42));

            assert_eq!(media.state(SessionHandle(42)), None);
            assert!(media.snapshot(SessionHandle(42)).is_none());
            assert!(calls.borrow().is_empty());
        }
    }

    describe "event sink" {
        before {
            let allow_play = Rc::new(Cell::new(false));
            let allow = allow_play.clone();
            let mut media = MediaController::new(Box::new(move |_handle: SessionHandle, sink: EventSink| {
                Box::new(PolicyEngine {
                    sink,
                    allow_play: allow.clone(),
                }) as Box<dyn AudioEngine>
            }));
        }

        it "applies queued completions in order" {
            let handle = media.create("view", track(), false);

            // The rejection is queued while CanPlayThrough is applied.
            assert_eq!(media.dispatch_pending(), 2);
            assert_eq!(media.dispatch_pending(), 0);
            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPausedByPolicy));

            allow_play.set(true);
            media.notify_user_gesture(handle);
            media.dispatch_pending();
            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPlaying));
        }

        it "drops queued events for a disposed session" {
            allow_play.set(true);
            let handle = media.create("view", track(), false);
            media.dispose(handle);

            assert_eq!(media.dispatch_pending(), 1);
            assert_eq!(media.state(handle), Some(PlaybackState::Disposed));
            // No play was attempted, so nothing else was queued.
            assert_eq!(media.dispatch_pending(), 0);
        }

        it "can be awaited from the event loop" {
            allow_play.set(true);
            let handle = media.create("view", track(), false);

            tokio_test::block_on(async {
                media.next_event().await;
                media.next_event().await;
            });

            assert_eq!(media.state(handle), Some(PlaybackState::ReadyPlaying));
        }
    }
}
