use serde::{Deserialize, Serialize};

use super::stage::{Stage, StageId};

/// Where the presentation layer should navigate next.
///
/// The core only decides the destination; it never navigates itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "stage_id", rename_all = "snake_case")]
pub enum Destination {
    /// The next stage in the linear order.
    Stage(StageId),
    /// The closing end-roll view, reached after the final stage.
    Epilogue,
    /// The stage map.
    Map,
}

/// Whether a stage view may be shown.
#[derive(Debug, Clone, PartialEq)]
pub enum StageAccess {
    Open(Stage),
    /// The stage is locked; the view must redirect instead of rendering.
    Redirect(Destination),
}
