//! Cogsworth: a multi-purpose Discord bot built around per-guild music
//! playback.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod sources;
pub mod storage;
pub mod ui;
