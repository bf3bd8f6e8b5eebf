use serenity::all::Permissions;

use crate::{
    bot::{
        args,
        commands::{self, CommandContext, UNALIASABLE},
        error::{CommandError, CommandResult},
    },
    ui::embeds::{self, colors},
};

/// `alias [list]`, `alias set <alias> <command>`, `alias remove <alias>`.
pub async fn alias(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_permissions(Permissions::MANAGE_GUILD).await?;

    let (sub, rest) = args::split_first(cmd.args);
    match sub.to_lowercase().as_str() {
        "" | "list" => list(cmd).await,
        "set" => {
            let (alias, command) = args::split_first(rest);
            if alias.is_empty() || command.is_empty() {
                return Err(cmd.usage_error());
            }
            set(cmd, alias, command).await
        }
        "remove" => {
            let (alias, _) = args::split_first(rest);
            if alias.is_empty() {
                return Err(cmd.usage_error());
            }
            remove(cmd, alias).await
        }
        _ => Err(cmd.usage_error()),
    }
}

async fn set(cmd: &CommandContext<'_>, alias: &str, command_name: &str) -> CommandResult<()> {
    let command = commands::find(command_name).ok_or_else(|| {
        CommandError::invalid(format!("❌ The command `{}` does not exist.", command_name))
    })?;
    if UNALIASABLE.contains(&command.name) {
        return Err(CommandError::invalid(format!(
            "❌ You cannot create an alias for `{}`.",
            command.name
        )));
    }

    let aliases = &cmd.bot.stores.aliases;
    if commands::find(alias).is_some() || aliases.contains(cmd.guild_id, alias) {
        return Err(CommandError::invalid(format!(
            "❌ `{}` is already a command or an alias in this server.",
            alias
        )));
    }

    aliases.set(cmd.guild_id, alias, command.name).await?;
    let prefix = cmd.prefix();
    cmd.reply(format!(
        "✅ The alias `{}{}` has been set for the command `{}{}`.",
        prefix,
        alias.to_lowercase(),
        prefix,
        command.name
    ))
    .await?;
    Ok(())
}

async fn remove(cmd: &CommandContext<'_>, alias: &str) -> CommandResult<()> {
    if !cmd.bot.stores.aliases.remove(cmd.guild_id, alias).await? {
        return Err(CommandError::invalid(format!(
            "❌ The alias `{}` does not exist in this server.",
            alias
        )));
    }
    cmd.reply(format!("✅ The alias `{}` has been removed.", alias))
        .await?;
    Ok(())
}

async fn list(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let aliases = cmd.bot.stores.aliases.list(cmd.guild_id);
    if aliases.is_empty() {
        cmd.reply("This server has no custom aliases set.").await?;
        return Ok(());
    }

    let prefix = cmd.prefix();
    let description = aliases
        .iter()
        .map(|(alias, command)| format!("`{}{}`  ➔  `{}{}`", prefix, alias, prefix, command))
        .collect::<Vec<_>>()
        .join("\n");
    let guild_name = cmd
        .guild_id
        .name(&cmd.ctx.cache)
        .unwrap_or_else(|| "this server".to_string());

    cmd.reply_embed(embeds::info_embed(
        format!("Custom Aliases for {}", guild_name),
        description,
        colors::INFO_BLUE,
    ))
    .await?;
    Ok(())
}
