use serenity::{
    model::{channel::Message, id::GuildId},
    prelude::Context,
};
use tracing::{debug, warn};

use crate::{
    bot::{
        args,
        commands::CommandContext,
        error::{CommandError, CommandResult},
        CogsworthBot,
    },
    ui::embeds,
};

const LEADERBOARD_SIZE: usize = 10;

/// Hook de mensajes: da XP y felicita al subir de nivel.
pub async fn on_guild_message(ctx: &Context, msg: &Message, bot: &CogsworthBot, guild_id: GuildId) {
    let award = match bot.stores.levels.award_message_xp(guild_id, msg.author.id).await {
        Ok(Some(award)) => award,
        Ok(None) => return,
        Err(e) => {
            warn!("⚠️ No se pudieron guardar los niveles: {:?}", e);
            return;
        }
    };

    if award.leveled_up {
        let content = format!(
            "🎉 Congratulations <@{}>, you have reached **Level {}**!",
            msg.author.id, award.record.level
        );
        if let Err(e) = msg.channel_id.say(&ctx.http, content).await {
            debug!("No se pudo anunciar el nivel: {:?}", e);
        }
    }
}

pub async fn rank(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let member = args::member_or_author(cmd.ctx, cmd.guild_id, cmd.args, cmd.author()).await?;
    let record = cmd.bot.stores.levels.get(cmd.guild_id, member.user.id);

    let embed = embeds::rank_embed(member.display_name(), Some(member.face()), &record);
    cmd.reply_embed(embed).await?;
    Ok(())
}

pub async fn leaderboard(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let top = cmd.bot.stores.levels.leaderboard(cmd.guild_id, LEADERBOARD_SIZE);
    if top.is_empty() {
        return Err(CommandError::invalid(
            "There is no leaderboard data for this server yet.",
        ));
    }

    let mut rows = Vec::with_capacity(top.len());
    for (user_id, record) in top {
        let name = match user_id.to_user(cmd.ctx).await {
            Ok(user) => user.name,
            Err(_) => "Unknown User".to_string(),
        };
        rows.push((name, record));
    }

    let guild_name = cmd
        .guild_id
        .name(&cmd.ctx.cache)
        .unwrap_or_else(|| "this server".to_string());
    cmd.reply_embed(embeds::leaderboard_embed(&guild_name, &rows))
        .await?;
    Ok(())
}
