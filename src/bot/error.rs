use serenity::{http::HttpError, model::ModelError};
use thiserror::Error;

use crate::audio::PlaybackError;

/// Por qué un comando no terminó.
///
/// `Display` es la línea de log; [`CommandError::reply_text`] es lo que
/// ve el usuario.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("faltan argumentos para {command}")]
    Usage { command: &'static str },

    #[error("el autor no tiene permisos")]
    MissingPermissions,

    #[error("el bot no tiene permisos")]
    BotMissingPermissions,

    #[error("miembro no encontrado")]
    MemberNotFound,

    #[error("comando exclusivo del owner")]
    NotOwner,

    #[error("usuario fuera de la whitelist")]
    NotWhitelisted,

    /// Mensaje para el usuario, se muestra tal cual.
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("error de Discord: {0}")]
    Discord(#[from] serenity::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;

impl CommandError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CommandError::Invalid(message.into())
    }

    /// Errores que indican un bug o una caída, no un error del usuario.
    pub fn is_unexpected(&self) -> bool {
        match self {
            CommandError::Other(_) => true,
            CommandError::Discord(e) => !is_forbidden(e),
            _ => false,
        }
    }

    pub fn reply_text(&self, prefix: &str) -> String {
        match self {
            CommandError::Usage { command } => format!(
                "❌ **Missing Argument!** See `{}help {}` for details.",
                prefix, command
            ),
            CommandError::MissingPermissions => "❌ **Permission Denied!**".to_string(),
            CommandError::BotMissingPermissions => "❌ **I can't do that!**".to_string(),
            CommandError::MemberNotFound => "❌ **Member Not Found.**".to_string(),
            CommandError::NotOwner => "❌ This is an owner-only command.".to_string(),
            CommandError::NotWhitelisted => {
                "❌ Only the bot owner and whitelisted users can use this command.".to_string()
            }
            CommandError::Invalid(message) => message.clone(),
            CommandError::Playback(e) => e.to_string(),
            CommandError::Discord(e) if is_forbidden(e) => "❌ **I can't do that!**".to_string(),
            CommandError::Discord(_) | CommandError::Other(_) => {
                "An unexpected error occurred.".to_string()
            }
        }
    }
}

/// Discord rechazó la acción por falta de permisos.
fn is_forbidden(error: &serenity::Error) -> bool {
    match error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            response.status_code.as_u16() == 403
        }
        serenity::Error::Model(ModelError::InvalidPermissions { .. }) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_usage_reply_mentions_help() {
        let err = CommandError::Usage { command: "play" };
        assert_eq!(
            err.reply_text("."),
            "❌ **Missing Argument!** See `.help play` for details."
        );
        assert!(!err.is_unexpected());
    }

    #[test]
    fn test_playback_errors_pass_through() {
        let err: CommandError = PlaybackError::NotPlaying.into();
        assert_eq!(err.reply_text("!"), "❌ I am not playing any music.");
    }

    #[test]
    fn test_other_errors_are_unexpected() {
        let err: CommandError = anyhow::anyhow!("boom").into();
        assert!(err.is_unexpected());
        assert_eq!(err.reply_text("."), "An unexpected error occurred.");
    }
}
