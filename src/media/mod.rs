//! Per-view background music control.
//!
//! Every view owns at most one looping track. [`MediaController`] hands out
//! sessions keyed by view, and each [`MediaSession`] negotiates autoplay
//! policy with the [`AudioEngine`] that actually produces sound:
//!
//! ```text
//! uninitialized → loading ─┬─ (muted)         → ready_paused_by_user
//!                          ├─ play resolved   → ready_playing
//!                          ├─ play rejected   → ready_paused_by_policy
//!                          └─ load failed     → error
//! ready_paused_* ── unmute / gesture, play resolved → ready_playing
//! any ── dispose → disposed
//! ```
//!
//! Playback rejected by policy is an expected state, not a failure: the next
//! qualifying user gesture retries, with no retry limit.

mod controller;
mod engine;
mod session;

pub use controller::*;
pub use engine::*;
pub use session::*;
