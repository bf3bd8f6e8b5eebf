//! Command registry and routing.
//!
//! Every prefix command is described once in [`COMMANDS`]: name, built-in
//! aliases, category, usage and help text. Dispatch looks names up here, the
//! help command renders from here, and [`run`] routes a matched spec to its
//! handler.

use serenity::{
    all::Permissions,
    builder::{CreateEmbed, CreateMessage, EditMessage},
    model::{
        channel::Message,
        id::{GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info};

use crate::bot::{
    error::{CommandError, CommandResult},
    CogsworthBot,
};

pub mod alias;
pub mod converters;
pub mod gaming;
pub mod leveling;
pub mod moderation;
pub mod music;
pub mod owner;
pub mod reminders;
pub mod translate;
pub mod utility;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Music,
    Moderation,
    Leveling,
    Alias,
    Owner,
    Translate,
    Converters,
    Gaming,
    Reminders,
    Utility,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Music,
        Category::Moderation,
        Category::Leveling,
        Category::Alias,
        Category::Owner,
        Category::Translate,
        Category::Converters,
        Category::Gaming,
        Category::Reminders,
        Category::Utility,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Music => "Music",
            Category::Moderation => "Moderation",
            Category::Leveling => "Leveling",
            Category::Alias => "Alias",
            Category::Owner => "Owner",
            Category::Translate => "Translate",
            Category::Converters => "Converters",
            Category::Gaming => "Gaming",
            Category::Reminders => "Reminders",
            Category::Utility => "Utility",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Category::Music => "🎵",
            Category::Moderation => "🛡️",
            Category::Leveling => "🏆",
            Category::Alias => "🔗",
            Category::Owner => "👑",
            Category::Translate => "🌐",
            Category::Converters => "💱",
            Category::Gaming => "🎮",
            Category::Reminders => "⏰",
            Category::Utility => "⚙️",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Music => "Play music from YouTube in your voice channel.",
            Category::Moderation => "Keep your server tidy.",
            Category::Leveling => "Earn XP by chatting and climb the leaderboard.",
            Category::Alias => "Manage custom command aliases for your server.",
            Category::Owner => "Owner-only and whitelisted-user commands.",
            Category::Translate => "Commands for translating text.",
            Category::Converters => "Math, unit and currency conversions.",
            Category::Gaming => "Minecraft server and Roblox game status.",
            Category::Reminders => "Personal reminders delivered by DM.",
            Category::Utility => "Useful and miscellaneous commands.",
        }
    }

    pub fn from_name(name: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub category: Category,
    /// Firma de argumentos, `<requerido>` y `[opcional]`.
    pub usage: &'static str,
    pub help: &'static str,
}

impl CommandSpec {
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn signature(&self) -> String {
        if self.usage.is_empty() {
            self.name.to_string()
        } else {
            format!("{} {}", self.name, self.usage)
        }
    }
}

macro_rules! command {
    ($name:literal, [$($alias:literal),*], $category:ident, $usage:literal, $help:literal) => {
        CommandSpec {
            name: $name,
            aliases: &[$($alias),*],
            category: Category::$category,
            usage: $usage,
            help: $help,
        }
    };
}

pub static COMMANDS: &[CommandSpec] = &[
    // Música
    command!("play", ["p"], Music, "<query>", "Plays a song directly from YouTube."),
    command!("previous", ["prev"], Music, "", "Plays the previous song again."),
    command!("random", [], Music, "", "Plays a random popular song."),
    command!("skip", ["s"], Music, "", "Skips the current song."),
    command!("pause", [], Music, "", "Pauses the current song."),
    command!("resume", [], Music, "", "Resumes the paused music."),
    command!("replay", [], Music, "", "Replays the current song from the beginning."),
    command!("loop", [], Music, "", "Toggles looping for the current song."),
    command!("unloop", [], Music, "", "Disables looping for the current song."),
    command!("queue", ["q"], Music, "", "Displays the song queue."),
    command!("nowplaying", ["np"], Music, "", "Shows the currently playing song."),
    command!("volume", [], Music, "<value>", "Changes the player's volume (0-200)."),
    command!("stop", ["leave", "dc"], Music, "", "Stops music and disconnects."),
    // Moderación
    command!("kick", [], Moderation, "<member> [reason]", "Kicks a user from the server."),
    command!("ban", [], Moderation, "<member> [reason]", "Bans a user from the server."),
    command!("unban", [], Moderation, "<user_id>", "Unbans a user by their ID."),
    command!("mute", [], Moderation, "<member> [reason]", "Mutes a user in all text channels."),
    command!("unmute", [], Moderation, "<member>", "Unmutes a previously muted user."),
    command!("clear", ["purge"], Moderation, "<amount>", "Deletes a specified number of messages."),
    // Niveles
    command!("rank", [], Leveling, "[member]", "Shows your current level and XP."),
    command!("leaderboard", ["lb"], Leveling, "", "Shows the server's top 10 most active members."),
    // Alias
    command!(
        "alias",
        [],
        Alias,
        "[list | set <alias> <command> | remove <alias>]",
        "Manages server-specific command aliases. E.g. `alias set m play`"
    ),
    // Owner
    command!(
        "whitelist",
        [],
        Owner,
        "[add | remove] [user]",
        "Manages users who can use privileged commands."
    ),
    command!("unwhitelist", [], Owner, "<user>", "Removes a user from the whitelist."),
    command!(
        "uannounce",
        [],
        Owner,
        "<user> <message> [image_url]",
        "Sends an announcement DM to a specific user."
    ),
    // Traducción
    command!("translate", [], Translate, "<language> <text>", "Translates text to a specified language."),
    command!("languages", ["langs"], Translate, "", "Lists supported languages for translation."),
    // Conversores
    command!("calculate", ["calc", "math"], Converters, "<expression>", "Calculates a mathematical expression."),
    command!("convert", [], Converters, "<amount> <from_unit> <to_unit>", "Converts between different units."),
    command!("currency", [], Converters, "<amount> <from> <to>", "Converts currencies using real-time rates."),
    // Juegos
    command!("mcstatus", [], Gaming, "<server_ip>", "Shows the status of a Minecraft server."),
    command!("rbxstatus", [], Gaming, "<place_id>", "Shows the status of a Roblox game."),
    // Recordatorios
    command!("remindme", ["remind"], Reminders, "<time> [reason]", "Sets a reminder. E.g. `remindme 10m take a break`"),
    // Utilidades
    command!("help", ["h"], Utility, "[command | category]", "Shows this help message."),
    command!("ping", [], Utility, "", "Checks the bot's latency."),
    command!("userinfo", ["whois"], Utility, "[member]", "Displays information about a user."),
    command!("avatar", ["av", "pfp"], Utility, "[member]", "Shows a user's avatar."),
    command!("serverinfo", ["server"], Utility, "", "Displays information about the server."),
];

/// Comandos que nunca pueden ser destino de un alias.
pub const UNALIASABLE: [&str; 2] = ["alias", "help"];

/// Busca un comando por nombre o alias integrado, sin distinguir mayúsculas.
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.matches(name))
}

pub fn in_category(category: Category) -> impl Iterator<Item = &'static CommandSpec> {
    COMMANDS.iter().filter(move |c| c.category == category)
}

/// Todo lo que un handler necesita para una invocación.
pub struct CommandContext<'a> {
    pub ctx: &'a Context,
    pub msg: &'a Message,
    pub bot: &'a CogsworthBot,
    pub guild_id: GuildId,
    pub spec: &'static CommandSpec,
    pub args: &'a str,
}

impl CommandContext<'_> {
    pub fn prefix(&self) -> &str {
        &self.bot.config.command_prefix
    }

    pub fn author(&self) -> UserId {
        self.msg.author.id
    }

    pub fn usage_error(&self) -> CommandError {
        CommandError::Usage {
            command: self.spec.name,
        }
    }

    /// Responde al mensaje que invocó el comando.
    pub async fn reply(&self, content: impl Into<String>) -> CommandResult<Message> {
        Ok(self.msg.reply(&self.ctx.http, content).await?)
    }

    pub async fn reply_embed(&self, embed: CreateEmbed) -> CommandResult<Message> {
        let message = CreateMessage::new().embed(embed).reference_message(self.msg);
        Ok(self.msg.channel_id.send_message(&self.ctx.http, message).await?)
    }

    /// Reemplaza una respuesta provisional con el resultado final.
    ///
    /// Los errores para el usuario se escriben en el mensaje provisional; los
    /// inesperados lo borran y se propagan.
    pub async fn settle(
        &self,
        mut placeholder: Message,
        outcome: CommandResult<EditMessage>,
    ) -> CommandResult<()> {
        let edit = match outcome {
            Ok(edit) => edit.content(""),
            Err(e) if e.is_unexpected() => {
                if let Err(delete_err) = placeholder.delete(&self.ctx.http).await {
                    debug!("No se pudo borrar el mensaje temporal: {:?}", delete_err);
                }
                return Err(e);
            }
            Err(e) => EditMessage::new().content(e.reply_text(self.prefix())),
        };
        placeholder.edit(self.ctx, edit).await?;
        Ok(())
    }

    /// Permisos de `user_id` en este guild.
    pub async fn permissions_of(&self, user_id: UserId) -> CommandResult<Permissions> {
        let member = self.guild_id.member(self.ctx, user_id).await?;
        let guild = self
            .guild_id
            .to_guild_cached(&self.ctx.cache)
            .ok_or_else(|| anyhow::anyhow!("Guild {} no encontrada en caché", self.guild_id))?;
        Ok(guild.member_permissions(&member))
    }

    /// Verifica que el autor y el bot tengan `needed`.
    pub async fn require_permissions(&self, needed: Permissions) -> CommandResult<()> {
        if !self.permissions_of(self.author()).await?.contains(needed) {
            return Err(CommandError::MissingPermissions);
        }
        let bot_id = self.ctx.cache.current_user().id;
        if !self.permissions_of(bot_id).await?.contains(needed) {
            return Err(CommandError::BotMissingPermissions);
        }
        Ok(())
    }

    pub fn is_owner(&self) -> bool {
        self.bot.config.owner_id == Some(self.author().get())
    }

    pub fn require_owner(&self) -> CommandResult<()> {
        if self.is_owner() {
            Ok(())
        } else {
            Err(CommandError::NotOwner)
        }
    }

    pub fn require_owner_or_whitelisted(&self) -> CommandResult<()> {
        if self.is_owner() || self.bot.stores.whitelist.contains(self.author()) {
            Ok(())
        } else {
            Err(CommandError::NotWhitelisted)
        }
    }
}

/// Envía un comando reconocido a su handler.
pub async fn run(cmd: &CommandContext<'_>) -> CommandResult<()> {
    info!(
        "📝 Comando {} usado por {} en guild {}",
        cmd.spec.name, cmd.msg.author.name, cmd.guild_id
    );

    match cmd.spec.name {
        "play" => music::play(cmd).await,
        "previous" => music::previous(cmd).await,
        "random" => music::random(cmd).await,
        "skip" => music::skip(cmd).await,
        "pause" => music::pause(cmd).await,
        "resume" => music::resume(cmd).await,
        "replay" => music::replay(cmd).await,
        "loop" => music::toggle_loop(cmd).await,
        "unloop" => music::unloop(cmd).await,
        "queue" => music::queue(cmd).await,
        "nowplaying" => music::now_playing(cmd).await,
        "volume" => music::volume(cmd).await,
        "stop" => music::stop(cmd).await,

        "kick" => moderation::kick(cmd).await,
        "ban" => moderation::ban(cmd).await,
        "unban" => moderation::unban(cmd).await,
        "mute" => moderation::mute(cmd).await,
        "unmute" => moderation::unmute(cmd).await,
        "clear" => moderation::clear(cmd).await,

        "rank" => leveling::rank(cmd).await,
        "leaderboard" => leveling::leaderboard(cmd).await,

        "alias" => alias::alias(cmd).await,

        "whitelist" => owner::whitelist(cmd).await,
        "unwhitelist" => owner::unwhitelist(cmd).await,
        "uannounce" => owner::user_announce(cmd).await,

        "translate" => translate::translate(cmd).await,
        "languages" => translate::languages(cmd).await,

        "calculate" => converters::calculate(cmd).await,
        "convert" => converters::convert(cmd).await,
        "currency" => converters::currency(cmd).await,

        "mcstatus" => gaming::mcstatus(cmd).await,
        "rbxstatus" => gaming::rbxstatus(cmd).await,

        "remindme" => reminders::remind_me(cmd).await,

        "help" => utility::help(cmd).await,
        "ping" => utility::ping(cmd).await,
        "userinfo" => utility::user_info(cmd).await,
        "avatar" => utility::avatar(cmd).await,
        "serverinfo" => utility::server_info(cmd).await,

        other => Err(CommandError::Other(anyhow::anyhow!(
            "Comando sin handler: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_find_by_name_and_alias() {
        assert_eq!(find("play").map(|c| c.name), Some("play"));
        assert_eq!(find("P").map(|c| c.name), Some("play"));
        assert_eq!(find("dc").map(|c| c.name), Some("stop"));
        assert_eq!(find("LB").map(|c| c.name), Some("leaderboard"));
        assert_eq!(find("whois").map(|c| c.name), Some("userinfo"));
        assert!(find("nope").is_none());
    }

    #[test]
    fn test_names_and_aliases_are_unique() {
        let mut seen = HashSet::new();
        for command in COMMANDS {
            assert!(seen.insert(command.name), "duplicado: {}", command.name);
            for alias in command.aliases {
                assert!(seen.insert(alias), "duplicado: {}", alias);
            }
        }
    }

    #[test]
    fn test_every_category_has_commands() {
        for category in Category::ALL {
            assert!(in_category(category).next().is_some(), "{:?}", category);
        }
        assert_eq!(Category::from_name("music"), Some(Category::Music));
        assert_eq!(Category::from_name(" Owner "), Some(Category::Owner));
        assert_eq!(Category::from_name("games"), None);
    }

    #[test]
    fn test_moderation_and_gaming_commands_registered() {
        let names: Vec<_> = in_category(Category::Moderation).map(|c| c.name).collect();
        assert!(names.contains(&"mute") && names.contains(&"unmute"));
        assert_eq!(find("rbxstatus").map(|c| c.category), Some(Category::Gaming));
    }

    #[test]
    fn test_signature() {
        assert_eq!(find("ping").unwrap().signature(), "ping");
        assert_eq!(find("volume").unwrap().signature(), "volume <value>");
    }
}
