use serenity::{model::channel::Message, prelude::Context};
use tracing::{debug, error, warn};

use crate::bot::{
    chat,
    commands::{self, leveling, CommandContext},
    dispatch, CogsworthBot,
};

pub const DM_BLOCKED: &str = "❌ Commands are only allowed in servers, not in DMs.";

/// Punto de entrada de cada mensaje que ve el bot.
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &CogsworthBot) {
    if msg.author.bot {
        return;
    }
    let prefix = bot.config.command_prefix.as_str();

    let Some(guild_id) = msg.guild_id else {
        if dispatch::has_prefix(&msg.content, prefix) {
            debug!("Comando por DM bloqueado de {}", msg.author.name);
            if let Err(e) = msg.channel_id.say(&ctx.http, DM_BLOCKED).await {
                debug!("No se pudo responder por DM: {:?}", e);
            }
        }
        return;
    };

    leveling::on_guild_message(ctx, msg, bot, guild_id).await;

    let invocation = dispatch::parse(&msg.content, prefix, |name| {
        bot.stores.aliases.resolve(guild_id, name)
    });

    let Some(invocation) = invocation else {
        if !dispatch::has_prefix(&msg.content, prefix) {
            chat::on_message(ctx, msg, bot).await;
        }
        return;
    };

    if invocation.invoked != invocation.spec.name && !invocation.spec.matches(&invocation.invoked) {
        debug!(
            "🔗 Alias {} -> {} en guild {}",
            invocation.invoked, invocation.spec.name, guild_id
        );
    }

    let cmd = CommandContext {
        ctx,
        msg,
        bot,
        guild_id,
        spec: invocation.spec,
        args: invocation.args,
    };

    if let Err(e) = commands::run(&cmd).await {
        if e.is_unexpected() {
            error!("❌ Error en el comando {}: {:?}", cmd.spec.name, e);
        } else {
            debug!("Comando {} rechazado: {}", cmd.spec.name, e);
        }
        if let Err(reply_err) = msg.reply(&ctx.http, e.reply_text(prefix)).await {
            warn!("⚠️ No se pudo informar el error: {:?}", reply_err);
        }
    }
}
