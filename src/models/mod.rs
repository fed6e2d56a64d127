//! Domain models for the closet quest.
//!
//! # Core Concepts
//!
//! ## Game Content
//!
//! - [`Stage`]: One unit of task content with a `locked → available → completed` lifecycle.
//! - [`Task`]: The completion check attached to a stage (checklist, numeric threshold,
//!   or freeform measurement).
//! - [`Reward`]: An item or experience grant issued once when a stage completes.
//!
//! ## Records
//!
//! - [`LedgerEntry`]: Append-only record of a reward granted for a stage.
//! - [`CompletionRecord`]: What the persistence collaborator receives when a stage closes.
//!
//! ## Navigation
//!
//! - [`Destination`]: Where the presentation layer should go after a stage.
//! - [`StageAccess`]: Result of asking whether a stage view may be shown.

mod completion;
mod navigation;
mod reward;
mod stage;
mod task;

pub use completion::*;
pub use navigation::*;
pub use reward::*;
pub use stage::*;
pub use task::*;
