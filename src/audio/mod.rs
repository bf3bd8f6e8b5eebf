//! # Audio Module
//!
//! Per-guild music playback for cogsworth.
//!
//! ## Architecture
//!
//! ### [`queue`] - Playback State
//! - Queue, now playing, previous track and loop flag per guild
//! - Pure planning of what plays next; no I/O
//!
//! ### [`player`] - Playback Manager
//! - Owns every guild session behind its own lock
//! - Public operations used by the music commands
//! - Resolves tracks outside the lock and installs them by ticket
//!
//! ### [`transition`] - Track Completion
//! - End signals posted from songbird's event tasks
//! - A driver task that runs each transition on the tokio runtime
//!
//! ### [`voice`] - Voice Connections
//! - `VoiceConnection` / `TrackControl` seams
//! - Songbird-backed implementation
//!
//! ### [`track`] - Tracks
//! - Queue references, resolved metadata and the active handle wrapper
//! - Duration formatting and volume clamping
//!
//! ## Transition rules
//!
//! When the active track ends (naturally, by `skip`, or by error):
//!
//! 1. It becomes the previous track, unless it was ended by `replay`.
//! 2. With loop on, the previous track is played again.
//! 3. Otherwise the queue front is played, or the session goes idle.
//!
//! Tracks that fail to resolve are announced and skipped.

pub mod error;
pub mod player;
pub mod queue;
pub mod track;
pub mod transition;
pub mod voice;

pub use error::{PlaybackError, PlaybackResult};
pub use player::{EnqueueOutcome, PlaybackManager, PlaybackSettings, SessionLink};
pub use queue::PlaybackSnapshot;
pub use track::{TrackMetadata, TrackRef};
pub use transition::{PlaybackNotifier, TransitionDriver};
pub use voice::SongbirdConnection;

use crate::sources::YtDlpResolver;

/// El stack de reproducción de producción.
pub type MusicManager = PlaybackManager<YtDlpResolver, SongbirdConnection>;
pub type MusicDriver = TransitionDriver<YtDlpResolver, SongbirdConnection>;
