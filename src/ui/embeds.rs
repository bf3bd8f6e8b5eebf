use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
    model::id::UserId,
};

use crate::{
    audio::{PlaybackSnapshot, TrackMetadata},
    bot::commands::{Category, CommandSpec},
    storage::levels::LevelRecord,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
    pub const HELP_CYAN: Colour = Colour::new(0x00BFFF);
    pub const ANNOUNCE_BLURPLE: Colour = Colour::new(0x7289DA);
    pub const CURRENCY_GOLD: Colour = Colour::new(0xFFD700);
    pub const ROBLOX_BLUE: Colour = Colour::new(0x00A2FF);
}

/// Footer estandarizado para todos los embeds
pub const STANDARD_FOOTER: &str = "⚙️ Cogsworth";

const ARGUMENT_HINT: &str = "Arguments in <> are required, [] are optional.";

/// Entradas de la cola mostradas antes de resumir en "And N more...".
pub const QUEUE_PREVIEW: usize = 10;

/// Embed para la canción que empieza a sonar
pub fn now_playing_embed(track: &TrackMetadata, requested_by: Option<UserId>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎶 Now Playing")
        .description(format!("**[{}]({})**", track.title, track.url))
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(format!(
            "Duration: {}",
            track.duration_label()
        )));

    if let Some(user) = requested_by {
        embed = embed.field("👤 Requested by", format!("<@{}>", user), true);
    }
    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    embed
}

/// Embed de la cola: canción actual y las próximas [`QUEUE_PREVIEW`]
pub fn queue_embed(snapshot: &PlaybackSnapshot) -> CreateEmbed {
    let description = match &snapshot.now_playing {
        Some(track) => format!(
            "**Now Playing:**\n[{}]({}) `({})`",
            track.title,
            track.url,
            track.duration_label()
        ),
        None => "Nothing is currently playing.".to_string(),
    };

    let mut embed = CreateEmbed::default()
        .title("📜 Song Queue")
        .description(description)
        .color(colors::MUSIC_PURPLE);

    let (shown, hidden) = snapshot.head(QUEUE_PREVIEW);
    if !shown.is_empty() {
        let list = shown
            .iter()
            .enumerate()
            .map(|(i, track)| format!("**{}.** {}", i + 1, track.title))
            .collect::<Vec<_>>()
            .join("\n");
        embed = embed.field("Up Next", list, false);
    }

    let mut status = Vec::new();
    if snapshot.loop_enabled {
        status.push("🔁 Loop".to_string());
    }
    if snapshot.paused {
        status.push("⏸️ Paused".to_string());
    }
    if snapshot.now_playing.is_some() {
        status.push(format!("🔊 {:.0}%", snapshot.volume * 100.0));
    }
    if !status.is_empty() {
        embed = embed.field("Status", status.join(" • "), false);
    }

    if hidden > 0 {
        embed = embed.footer(CreateEmbedFooter::new(format!("And {} more...", hidden)));
    }
    embed
}

pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::ERROR_RED)
}

pub fn rank_embed(name: &str, avatar: Option<String>, record: &LevelRecord) -> CreateEmbed {
    let (earned, span) = record.progress();
    let mut embed = CreateEmbed::default()
        .title(format!("Rank for {}", name))
        .color(colors::INFO_BLUE)
        .field("Level", format!("**{}**", record.level), true)
        .field("Total XP", format!("`{}`", record.xp), true)
        .field(
            "Progress",
            format!("`{} / {} XP`\n`[{}]`", earned, span, record.progress_bar()),
            false,
        );
    if let Some(url) = avatar {
        embed = embed.thumbnail(url);
    }
    embed
}

/// `rows` son (nombre visible, registro), de mayor a menor.
pub fn leaderboard_embed(guild_name: &str, rows: &[(String, LevelRecord)]) -> CreateEmbed {
    let lines = rows
        .iter()
        .enumerate()
        .map(|(i, (name, record))| {
            let rank = match i {
                0 => "🥇".to_string(),
                1 => "🥈".to_string(),
                2 => "🥉".to_string(),
                n => format!("**{}.**", n + 1),
            };
            format!("{} **{}** - Level {} (`{}` XP)", rank, name, record.level, record.xp)
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title(format!("🏆 XP Leaderboard for {}", guild_name))
        .description(lines)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
}

pub fn help_home_embed(prefix: &str, command_count: usize) -> CreateEmbed {
    let description = format!(
        "**Cogsworth keeps your server running: moderation, music, leveling and more!**\n\n\
         You can start listening to music by joining a voice channel and typing:\n`{p}play [song name or link]`\n\n\
         To view help on a specific command or category, run:\n`{p}help <command>` or `{p}help <category>`",
        p = prefix
    );

    let categories = Category::ALL
        .iter()
        .filter(|c| **c != Category::Owner)
        .map(|c| format!("{} **{}**", c.emoji(), c.name()))
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("🤖 Help Desk")
        .description(description)
        .color(colors::HELP_CYAN)
        .field("Categories", categories, false)
        .footer(CreateEmbedFooter::new(format!(
            "{} | Total Commands: {}",
            STANDARD_FOOTER, command_count
        )))
}

pub fn help_category_embed<'a>(
    prefix: &str,
    category: Category,
    commands: impl Iterator<Item = &'a CommandSpec>,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("{} {} Commands", category.emoji(), category.name()))
        .description(category.description())
        .color(colors::HELP_CYAN)
        .footer(CreateEmbedFooter::new(ARGUMENT_HINT));

    for command in commands {
        embed = embed.field(
            format!("`{}{}`", prefix, command.signature()),
            command.help,
            false,
        );
    }
    embed
}

pub fn help_command_embed(prefix: &str, command: &CommandSpec) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("🔎 Help for `{}{}`", prefix, command.name))
        .description(command.help)
        .color(colors::HELP_CYAN)
        .field("Usage", format!("`{}{}`", prefix, command.signature()), false)
        .footer(CreateEmbedFooter::new(ARGUMENT_HINT));

    if !command.aliases.is_empty() {
        let aliases = command
            .aliases
            .iter()
            .map(|a| format!("`{}`", a))
            .collect::<Vec<_>>()
            .join(", ");
        embed = embed.field("Aliases", aliases, false);
    }
    embed
}

/// Embed simple con color y el footer estándar.
pub fn info_embed(title: impl Into<String>, description: impl Into<String>, color: Colour) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(color)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
