//! Gamified closet organizing: stage progression, rewards, and per-view music.
//!
//! - [`progression`]: which stages are reachable, completing them, and the reward ledger.
//! - [`media`]: one looping track per view with autoplay-policy aware mute control.
//! - [`persistence`] / [`db`]: durable completion records, written after the fact.
//! - [`api`]: HTTP surface for the presentation layer.
//! - [`render`]: text rendering of the stage map for the CLI.

pub mod api;
pub mod config;
pub mod db;
pub mod media;
pub mod models;
pub mod persistence;
pub mod progression;
pub mod render;
