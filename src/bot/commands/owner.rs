use anyhow::Result;
use regex::Regex;
use serenity::{
    all::{Timestamp, UserId},
    builder::{CreateEmbed, CreateEmbedFooter, CreateMessage},
};
use tracing::{info, warn};

use crate::{
    bot::{
        args,
        commands::CommandContext,
        error::{CommandError, CommandResult},
    },
    ui::embeds::{self, colors},
};

/// `whitelist` lists, `whitelist <user>` adds, `whitelist add|remove <user>`.
pub async fn whitelist(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_owner()?;

    let (sub, rest) = args::split_first(cmd.args);
    match sub.to_lowercase().as_str() {
        "" => list(cmd).await,
        "add" => add(cmd, rest).await,
        "remove" => remove(cmd, rest).await,
        _ => add(cmd, cmd.args).await,
    }
}

pub async fn unwhitelist(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_owner()?;
    remove(cmd, cmd.args).await
}

async fn list(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let users = cmd.bot.stores.whitelist.list();
    if users.is_empty() {
        cmd.reply("The whitelist is currently empty.").await?;
        return Ok(());
    }

    let description = users
        .iter()
        .map(|id| format!("- <@{}> (`{}`)", id, id))
        .collect::<Vec<_>>()
        .join("\n");
    cmd.reply_embed(embeds::info_embed(
        "👑 Whitelisted Users",
        description,
        colors::INFO_BLUE,
    ))
    .await?;
    Ok(())
}

async fn add(cmd: &CommandContext<'_>, target: &str) -> CommandResult<()> {
    let (token, _) = args::split_first(target);
    if token.is_empty() {
        return Err(cmd.usage_error());
    }
    let member = args::resolve_member(cmd.ctx, cmd.guild_id, token).await?;
    let name = &member.user.name;

    if !cmd.bot.stores.whitelist.add(member.user.id).await? {
        return Err(CommandError::invalid(format!(
            "❌ **{}** is already on the whitelist.",
            name
        )));
    }
    cmd.reply(format!("✅ Added **{}** to the whitelist.", name)).await?;
    Ok(())
}

async fn remove(cmd: &CommandContext<'_>, target: &str) -> CommandResult<()> {
    let (token, _) = args::split_first(target);
    if token.is_empty() {
        return Err(cmd.usage_error());
    }
    // Un usuario que ya salió del servidor se puede quitar por id
    let (user_id, name): (UserId, String) = match args::resolve_member(cmd.ctx, cmd.guild_id, token).await {
        Ok(member) => (member.user.id, member.user.name),
        Err(CommandError::MemberNotFound) => {
            let id = args::parse_user_id(token).ok_or(CommandError::MemberNotFound)?;
            (id, id.to_string())
        }
        Err(e) => return Err(e),
    };

    if !cmd.bot.stores.whitelist.remove(user_id).await? {
        return Err(CommandError::invalid(format!(
            "❌ **{}** is not on the whitelist.",
            name
        )));
    }
    cmd.reply(format!("✅ Removed **{}** from the whitelist.", name))
        .await?;
    Ok(())
}

/// Separa la URL de imagen al final de un anuncio.
pub fn split_announcement(message: &str) -> Result<(String, Option<String>)> {
    let image = Regex::new(r"(https?://\S+\.(?:png|jpg|jpeg|gif))$")?;
    let message = message.trim();

    Ok(match image.find(message) {
        Some(found) => (
            message[..found.start()].trim().to_string(),
            Some(found.as_str().to_string()),
        ),
        None => (message.to_string(), None),
    })
}

pub async fn user_announce(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_owner_or_whitelisted()?;

    let (target, message) = args::split_first(cmd.args);
    if target.is_empty() || message.is_empty() {
        return Err(cmd.usage_error());
    }
    let user = args::resolve_user(cmd.ctx, target).await?;
    let (text, image) = split_announcement(message)?;

    let author = &cmd.msg.author;
    let mut embed = CreateEmbed::default()
        .title("✨ Announcement from the Developer ✨")
        .description(format!("**{}**", text))
        .color(colors::ANNOUNCE_BLURPLE)
        .timestamp(Timestamp::now())
        .footer(
            CreateEmbedFooter::new(format!("Sent by: {}", author.display_name()))
                .icon_url(author.face()),
        );
    if let Some(url) = image {
        embed = embed.image(url);
    }

    match user
        .direct_message(&cmd.ctx.http, CreateMessage::new().embed(embed))
        .await
    {
        Ok(_) => {
            info!("📨 Anuncio enviado a {}", user.name);
            cmd.reply(format!(
                "✅ Successfully sent the announcement to **{}**.",
                user.name
            ))
            .await?;
        }
        Err(e) => {
            warn!("No se pudo enviar el anuncio a {}: {:?}", user.name, e);
            cmd.reply(format!(
                "❌ Could not send message to **{}**. They may have DMs disabled.",
                user.name
            ))
            .await?;
        }
    }
    Ok(())
}
