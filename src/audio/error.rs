use thiserror::Error;

/// Errores de las operaciones de reproducción.
///
/// Cada variante tiene un mensaje corto para el usuario vía `Display`, así
/// que la capa de comandos responde directamente con `err.to_string()`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("❌ I am not playing any music.")]
    NotPlaying,

    #[error("❌ There's no song to replay.")]
    NothingToReplay,

    #[error("❌ There is no previous song in history.")]
    NoPreviousTrack,

    #[error("❌ Could not load that song: {0}")]
    ResolutionFailed(String),

    #[error("❌ You must be in a voice channel to use music commands.")]
    NotInVoiceChannel,

    #[error("❌ I don't have permission to join your voice channel.")]
    VoicePermissionDenied,

    #[error("The music is already paused.")]
    AlreadyPaused,

    #[error("❌ The music is not paused.")]
    NotPaused,

    #[error("❌ Please enter a value between 0 and 200 (got {0}).")]
    InvalidVolume(u32),

    #[error("❌ The queue is full ({0} songs).")]
    QueueFull(usize),

    #[error("❌ Playback was stopped.")]
    SessionClosed,

    #[error("❌ Voice error: {0}")]
    Voice(String),
}

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;
