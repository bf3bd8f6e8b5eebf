use serenity::{
    all::{ChannelType, Colour, OnlineStatus},
    builder::{CreateEmbed, CreateEmbedFooter, EditMessage},
};
use std::time::Instant;

use crate::{
    bot::{
        args,
        commands::{self, Category, CommandContext},
        error::{CommandError, CommandResult},
    },
    ui::embeds::{self, colors},
};

pub async fn help(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let query = cmd.args.trim();
    let show_owner = cmd.is_owner();
    let visible = |category: Category| show_owner || category != Category::Owner;

    if query.is_empty() {
        let count = commands::COMMANDS
            .iter()
            .filter(|c| visible(c.category))
            .count();
        cmd.reply_embed(embeds::help_home_embed(cmd.prefix(), count))
            .await?;
        return Ok(());
    }

    if let Some(spec) = commands::find(query).filter(|c| visible(c.category)) {
        cmd.reply_embed(embeds::help_command_embed(cmd.prefix(), spec))
            .await?;
        return Ok(());
    }

    if let Some(category) = Category::from_name(query).filter(|c| visible(*c)) {
        let embed =
            embeds::help_category_embed(cmd.prefix(), category, commands::in_category(category));
        cmd.reply_embed(embed).await?;
        return Ok(());
    }

    Err(CommandError::invalid(format!(
        "❌ Command `{}` not found.",
        query
    )))
}

pub async fn ping(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let started = Instant::now();
    let mut message = cmd.reply("Pinging...").await?;
    let response_ms = started.elapsed().as_secs_f64() * 1000.0;

    let api_latency = match cmd.bot.gateway_latency(cmd.ctx.shard_id).await {
        Some(latency) => format!("`{:.2}ms`", latency.as_secs_f64() * 1000.0),
        None => "`N/A`".to_string(),
    };

    let embed = CreateEmbed::default()
        .title("🏓 Pong!")
        .color(colors::SUCCESS_GREEN)
        .field("API Latency", api_latency, true)
        .field("Response Time", format!("`{:.2}ms`", response_ms), true);
    message
        .edit(cmd.ctx, EditMessage::new().content("").embed(embed))
        .await?;
    Ok(())
}

pub async fn avatar(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let member = args::member_or_author(cmd.ctx, cmd.guild_id, cmd.args, cmd.author()).await?;
    let colour = member.colour(&cmd.ctx.cache).unwrap_or(colors::NEUTRAL_GRAY);

    let embed = CreateEmbed::default()
        .title(format!("🖼️ Avatar for {}", member.display_name()))
        .image(member.face())
        .color(colour);
    cmd.reply_embed(embed).await?;
    Ok(())
}

/// Roles listados en `userinfo` antes de resumir.
pub const MAX_LISTED_ROLES: usize = 10;

/// Datos de un miembro para el embed de `userinfo`.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub tag: String,
    pub name: String,
    pub id: u64,
    pub avatar: String,
    pub colour: Colour,
    pub status: String,
    pub top_role: String,
    pub created_at: i64,
    pub joined_at: Option<i64>,
    /// Menciones, del rol más alto al más bajo.
    pub roles: Vec<String>,
}

pub fn days_since(then: i64, now: i64) -> i64 {
    (now - then).max(0) / 86_400
}

pub fn status_label(status: OnlineStatus) -> &'static str {
    match status {
        OnlineStatus::Online => "Online",
        OnlineStatus::Idle => "Idle",
        OnlineStatus::DoNotDisturb => "Dnd",
        OnlineStatus::Invisible => "Invisible",
        _ => "Offline",
    }
}

pub fn user_info_embed(profile: &UserProfile, now: i64, requested_by: (&str, String)) -> CreateEmbed {
    let joined = match profile.joined_at {
        Some(ts) => format!("<t:{}:D>\n({} days ago)", ts, days_since(ts, now)),
        None => "Unknown".to_string(),
    };

    let mut embed = CreateEmbed::default()
        .title(format!("👤 User Information for {}", profile.tag))
        .color(profile.colour)
        .thumbnail(profile.avatar.clone())
        .field("Username", profile.name.clone(), true)
        .field("ID", format!("`{}`", profile.id), true)
        .field("Status", profile.status.clone(), true)
        .field("Top Role", profile.top_role.clone(), true)
        .field(
            "Account Created",
            format!(
                "<t:{}:D>\n({} days ago)",
                profile.created_at,
                days_since(profile.created_at, now)
            ),
            true,
        )
        .field("Joined Server", joined, true);

    if !profile.roles.is_empty() {
        let value = if profile.roles.len() <= MAX_LISTED_ROLES {
            profile.roles.join(" ")
        } else {
            "Too many to show".to_string()
        };
        embed = embed.field(format!("Roles ({})", profile.roles.len()), value, false);
    }

    let (author, author_avatar) = requested_by;
    embed.footer(CreateEmbedFooter::new(format!("Requested by {}", author)).icon_url(author_avatar))
}

pub async fn user_info(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let member = args::member_or_author(cmd.ctx, cmd.guild_id, cmd.args, cmd.author()).await?;
    let user_id = member.user.id;

    // El CacheRef no puede cruzar un await
    let profile = {
        let guild = cmd
            .guild_id
            .to_guild_cached(&cmd.ctx.cache)
            .ok_or_else(|| anyhow::anyhow!("Guild {} no encontrada en caché", cmd.guild_id))?;

        let mut roles: Vec<_> = member
            .roles
            .iter()
            .filter_map(|id| guild.roles.get(id))
            .collect();
        roles.sort_by(|a, b| b.position.cmp(&a.position));

        UserProfile {
            tag: member.user.tag(),
            name: member.user.name.clone(),
            id: user_id.get(),
            avatar: member.face(),
            colour: member.colour(&cmd.ctx.cache).unwrap_or(colors::NEUTRAL_GRAY),
            status: guild
                .presences
                .get(&user_id)
                .map(|p| status_label(p.status))
                .unwrap_or("Offline")
                .to_string(),
            top_role: roles
                .first()
                .map(|r| format!("<@&{}>", r.id))
                .unwrap_or_else(|| "@everyone".to_string()),
            created_at: user_id.created_at().unix_timestamp(),
            joined_at: member.joined_at.map(|t| t.unix_timestamp()),
            roles: roles.iter().map(|r| format!("<@&{}>", r.id)).collect(),
        }
    };

    let embed = user_info_embed(
        &profile,
        chrono::Utc::now().timestamp(),
        (cmd.msg.author.tag().as_str(), cmd.msg.author.face()),
    );
    cmd.reply_embed(embed).await?;
    Ok(())
}

pub async fn server_info(cmd: &CommandContext<'_>) -> CommandResult<()> {
    // El CacheRef no puede cruzar un await
    let embed = {
        let guild = cmd
            .guild_id
            .to_guild_cached(&cmd.ctx.cache)
            .ok_or_else(|| anyhow::anyhow!("Guild {} no encontrada en caché", cmd.guild_id))?;

        let text_channels = guild
            .channels
            .values()
            .filter(|c| c.kind == ChannelType::Text)
            .count();
        let voice_channels = guild
            .channels
            .values()
            .filter(|c| c.kind == ChannelType::Voice)
            .count();

        let mut embed = CreateEmbed::default()
            .title(format!("**{}** Server Information", guild.name))
            .color(Colour::new(rand::random::<u32>() & 0xFF_FF_FF))
            .field("👑 Owner", format!("<@{}>", guild.owner_id), true)
            .field("🆔 Server ID", format!("`{}`", guild.id), true)
            .field(
                "📆 Created On",
                format!("<t:{}:D>", guild.id.created_at().unix_timestamp()),
                true,
            )
            .field("👥 Members", format!("**{}** total", guild.member_count), true)
            .field(
                "💬 Channels",
                format!("**{}** Text | **{}** Voice", text_channels, voice_channels),
                true,
            )
            .field("✨ Roles", format!("**{}**", guild.roles.len()), true)
            .footer(
                CreateEmbedFooter::new(format!("Requested by {}", cmd.msg.author.name))
                    .icon_url(cmd.msg.author.face()),
            );
        if let Some(icon) = guild.icon_url() {
            embed = embed.thumbnail(icon);
        }
        embed
    };

    cmd.reply_embed(embed).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DAY: i64 = 86_400;

    fn profile(roles: usize) -> UserProfile {
        UserProfile {
            tag: "ana".into(),
            name: "ana".into(),
            id: 42,
            avatar: "https://cdn.example/ana.png".into(),
            colour: colors::NEUTRAL_GRAY,
            status: "Online".into(),
            top_role: "<@&1>".into(),
            created_at: 0,
            joined_at: Some(10 * DAY),
            roles: (1..=roles).map(|i| format!("<@&{i}>")).collect(),
        }
    }

    #[test]
    fn test_user_info_fields() {
        let value = serde_json::to_value(user_info_embed(
            &profile(2),
            30 * DAY,
            ("mod", "https://cdn.example/mod.png".into()),
        ))
        .unwrap();

        assert_eq!(value["title"], "👤 User Information for ana");
        assert_eq!(value["fields"][1]["value"], "`42`");
        assert_eq!(value["fields"][4]["value"], "<t:0:D>\n(30 days ago)");
        assert_eq!(value["fields"][5]["value"], format!("<t:{}:D>\n(20 days ago)", 10 * DAY));
        assert_eq!(value["fields"][6]["name"], "Roles (2)");
        assert_eq!(value["fields"][6]["value"], "<@&1> <@&2>");
        assert_eq!(value["footer"]["text"], "Requested by mod");
    }

    #[test]
    fn test_user_info_role_overflow_and_no_roles() {
        let value =
            serde_json::to_value(user_info_embed(&profile(11), DAY, ("mod", String::new()))).unwrap();
        assert_eq!(value["fields"][6]["value"], "Too many to show");

        let value =
            serde_json::to_value(user_info_embed(&profile(0), DAY, ("mod", String::new()))).unwrap();
        assert_eq!(value["fields"].as_array().map(Vec::len), Some(6));
    }

    #[test]
    fn test_days_since() {
        assert_eq!(days_since(0, DAY * 3 + 5), 3);
        assert_eq!(days_since(DAY, 0), 0);
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(OnlineStatus::DoNotDisturb), "Dnd");
        assert_eq!(status_label(OnlineStatus::Offline), "Offline");
    }
}
