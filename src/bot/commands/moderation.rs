use serenity::{
    all::{ChannelType, PermissionOverwrite, PermissionOverwriteType, Permissions},
    builder::{EditMessage, EditRole, GetMessages},
    http::HttpError,
    model::{
        guild::Member,
        id::{MessageId, RoleId, UserId},
    },
};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bot::{
    args,
    commands::CommandContext,
    error::{CommandError, CommandResult},
};

const DEFAULT_REASON: &str = "No reason provided.";
/// Límite de borrado masivo de Discord, incluyendo el mensaje del comando.
const MAX_PURGE: u8 = 100;
const CONFIRMATION_TTL: Duration = Duration::from_secs(5);
const MUTED_ROLE: &str = "Muted";

pub async fn kick(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_permissions(Permissions::KICK_MEMBERS).await?;
    let (target, reason) = args::split_first(cmd.args);
    if target.is_empty() {
        return Err(cmd.usage_error());
    }
    let member = args::resolve_member(cmd.ctx, cmd.guild_id, target).await?;
    if member.user.id == cmd.author() {
        return Err(CommandError::invalid("❌ You cannot kick yourself!"));
    }

    let reason = if reason.is_empty() { DEFAULT_REASON } else { reason };
    member.kick_with_reason(&cmd.ctx.http, reason).await?;
    info!("👢 {} expulsado de guild {}", member.user.name, cmd.guild_id);

    cmd.reply(format!(
        "✅ **{}** has been kicked. Reason: `{}`",
        member.user.name, reason
    ))
    .await?;
    Ok(())
}

pub async fn ban(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_permissions(Permissions::BAN_MEMBERS).await?;
    let (target, reason) = args::split_first(cmd.args);
    if target.is_empty() {
        return Err(cmd.usage_error());
    }
    let member = args::resolve_member(cmd.ctx, cmd.guild_id, target).await?;
    if member.user.id == cmd.author() {
        return Err(CommandError::invalid("❌ You cannot ban yourself!"));
    }

    let reason = if reason.is_empty() { DEFAULT_REASON } else { reason };
    member.ban_with_reason(&cmd.ctx.http, 0, reason).await?;
    info!("🔨 {} baneado de guild {}", member.user.name, cmd.guild_id);

    cmd.reply(format!(
        "✅ **{}** has been banned. Reason: `{}`",
        member.user.name, reason
    ))
    .await?;
    Ok(())
}

pub async fn unban(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_permissions(Permissions::BAN_MEMBERS).await?;
    let (raw, _) = args::split_first(cmd.args);
    if raw.is_empty() {
        return Err(cmd.usage_error());
    }
    let user_id = args::parse_user_id(raw).ok_or_else(|| cmd.usage_error())?;
    let user = user_id
        .to_user(cmd.ctx)
        .await
        .map_err(|_| CommandError::invalid("❌ No user found with that ID."))?;

    match cmd.guild_id.unban(&cmd.ctx.http, user.id).await {
        Ok(()) => {
            info!("🕊️ {} desbaneado de guild {}", user.name, cmd.guild_id);
            cmd.reply(format!("✅ Successfully unbanned **{}**.", user.name))
                .await?;
            Ok(())
        }
        Err(serenity::Error::Http(HttpError::UnsuccessfulRequest(response))) => {
            match response.status_code.as_u16() {
                404 => Err(CommandError::invalid(format!(
                    "❌ **{}** is not banned from this server.",
                    user.name
                ))),
                403 => Err(CommandError::invalid(
                    "❌ I don't have the permissions to unban users.",
                )),
                _ => Err(CommandError::Discord(serenity::Error::Http(
                    HttpError::UnsuccessfulRequest(response),
                ))),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Mensajes a pedir para borrar `amount`, contando el del comando.
pub fn purge_limit(amount: u64) -> u8 {
    let capped = amount.saturating_add(1).min(u64::from(MAX_PURGE));
    u8::try_from(capped).unwrap_or(MAX_PURGE)
}

pub async fn clear(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_permissions(Permissions::MANAGE_MESSAGES).await?;
    let (raw, _) = args::split_first(cmd.args);
    if raw.is_empty() {
        return Err(cmd.usage_error());
    }
    let amount: i64 = raw.parse().map_err(|_| cmd.usage_error())?;
    let amount = u64::try_from(amount)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            CommandError::invalid("❌ Please provide a positive number of messages to delete.")
        })?;

    let limit = purge_limit(amount);
    let channel = cmd.msg.channel_id;
    let ids: Vec<MessageId> = channel
        .messages(&cmd.ctx.http, GetMessages::new().limit(limit))
        .await?
        .into_iter()
        .map(|m| m.id)
        .collect();

    match ids.as_slice() {
        [] => {}
        [only] => channel.delete_message(&cmd.ctx.http, *only).await?,
        _ => channel.delete_messages(&cmd.ctx.http, &ids).await?,
    }
    let deleted = ids.len().saturating_sub(1);
    info!("🧹 {} mensajes borrados en {}", deleted, channel);

    let confirmation = channel
        .say(&cmd.ctx.http, format!("✅ Deleted **{}** messages.", deleted))
        .await?;
    let http = cmd.ctx.http.clone();
    tokio::spawn(async move {
        tokio::time::sleep(CONFIRMATION_TTL).await;
        if let Err(e) = confirmation.delete(&http).await {
            debug!("No se pudo borrar la confirmación: {:?}", e);
        }
    });
    Ok(())
}

/// Overwrite del miembro con `SEND_MESSAGES` denegado, conservando el resto.
pub fn muted_overwrite(existing: &[PermissionOverwrite], user_id: UserId) -> PermissionOverwrite {
    let kind = PermissionOverwriteType::Member(user_id);
    let (allow, deny) = existing
        .iter()
        .find(|o| o.kind == kind)
        .map(|o| (o.allow, o.deny))
        .unwrap_or((Permissions::empty(), Permissions::empty()));
    PermissionOverwrite {
        allow: allow - Permissions::SEND_MESSAGES,
        deny: deny | Permissions::SEND_MESSAGES,
        kind,
    }
}

#[derive(Debug, PartialEq)]
pub enum Unmute {
    /// El overwrite solo existía por el mute.
    Delete,
    Replace(PermissionOverwrite),
}

/// Qué hacer con el overwrite del miembro para quitar el mute. `None` si el
/// canal no lo tiene silenciado.
pub fn lift_mute(existing: &[PermissionOverwrite], user_id: UserId) -> Option<Unmute> {
    let kind = PermissionOverwriteType::Member(user_id);
    let current = existing
        .iter()
        .find(|o| o.kind == kind && o.deny.contains(Permissions::SEND_MESSAGES))?;

    let deny = current.deny - Permissions::SEND_MESSAGES;
    if deny.is_empty() && current.allow.is_empty() {
        return Some(Unmute::Delete);
    }
    Some(Unmute::Replace(PermissionOverwrite {
        allow: current.allow,
        deny,
        kind,
    }))
}

pub async fn mute(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_permissions(Permissions::MANAGE_ROLES | Permissions::MANAGE_CHANNELS)
        .await?;
    let (target, reason) = args::split_first(cmd.args);
    if target.is_empty() {
        return Err(cmd.usage_error());
    }
    let member = args::resolve_member(cmd.ctx, cmd.guild_id, target).await?;
    if member.user.id == cmd.author() {
        return Err(CommandError::invalid("❌ You cannot mute yourself!"));
    }
    if cmd
        .permissions_of(member.user.id)
        .await?
        .contains(Permissions::ADMINISTRATOR)
    {
        return Err(CommandError::invalid("❌ You cannot mute an administrator."));
    }
    let reason = if reason.is_empty() { DEFAULT_REASON } else { reason };

    let mut progress = cmd
        .reply(format!(
            "Muting **{}** in all text channels... This may take a moment.",
            member.user.name
        ))
        .await?;

    let muted = match mute_everywhere(cmd, &member).await {
        Ok(count) => count,
        Err(e) => return cmd.settle(progress, Err(e)).await,
    };
    info!(
        "🔇 {} silenciado en {} canales de guild {} ({})",
        member.user.name, muted, cmd.guild_id, reason
    );

    progress
        .edit(
            cmd.ctx,
            EditMessage::new().content(format!(
                "✅ **<@{}>** has been muted in **{}** text channels. Reason: `{}`",
                member.user.id, muted, reason
            )),
        )
        .await?;
    Ok(())
}

async fn mute_everywhere(cmd: &CommandContext<'_>, member: &Member) -> CommandResult<usize> {
    let http = &cmd.ctx.http;
    let user_id = member.user.id;
    let mut muted = 0;

    for channel in cmd.guild_id.channels(http).await?.into_values() {
        if channel.kind != ChannelType::Text {
            continue;
        }
        let overwrite = muted_overwrite(&channel.permission_overwrites, user_id);
        match channel.create_permission(cmd.ctx, overwrite).await {
            Ok(()) => muted += 1,
            Err(e) => warn!(
                "⚠️ No se pudo silenciar a {} en #{}: {:?}",
                member.user.name, channel.name, e
            ),
        }
    }

    let role_id = match muted_role(cmd).await? {
        Some(role_id) => role_id,
        None => {
            let role = cmd
                .guild_id
                .create_role(
                    cmd.ctx,
                    EditRole::new()
                        .name(MUTED_ROLE)
                        .audit_log_reason("Visual indicator for muted users"),
                )
                .await?;
            info!("🎭 Rol {} creado en guild {}", MUTED_ROLE, cmd.guild_id);
            role.id
        }
    };
    if !member.roles.contains(&role_id) {
        member.add_role(http, role_id).await?;
    }
    Ok(muted)
}

pub async fn unmute(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.require_permissions(Permissions::MANAGE_ROLES | Permissions::MANAGE_CHANNELS)
        .await?;
    let (target, _) = args::split_first(cmd.args);
    if target.is_empty() {
        return Err(cmd.usage_error());
    }
    let member = args::resolve_member(cmd.ctx, cmd.guild_id, target).await?;

    let mut progress = cmd
        .reply(format!(
            "Unmuting **{}**... This may take a moment.",
            member.user.name
        ))
        .await?;

    let unmuted = match unmute_everywhere(cmd, &member).await {
        Ok(count) => count,
        Err(e) => return cmd.settle(progress, Err(e)).await,
    };
    info!(
        "🔊 {} sin silencio en {} canales de guild {}",
        member.user.name, unmuted, cmd.guild_id
    );

    progress
        .edit(
            cmd.ctx,
            EditMessage::new().content(format!(
                "✅ **<@{}>** has been unmuted in **{}** channels.",
                member.user.id, unmuted
            )),
        )
        .await?;
    Ok(())
}

async fn unmute_everywhere(cmd: &CommandContext<'_>, member: &Member) -> CommandResult<usize> {
    let http = &cmd.ctx.http;
    let user_id = member.user.id;
    let mut unmuted = 0;

    for channel in cmd.guild_id.channels(http).await?.into_values() {
        if channel.kind != ChannelType::Text {
            continue;
        }
        let result = match lift_mute(&channel.permission_overwrites, user_id) {
            None => continue,
            Some(Unmute::Delete) => {
                channel
                    .delete_permission(http, PermissionOverwriteType::Member(user_id))
                    .await
            }
            Some(Unmute::Replace(overwrite)) => channel.create_permission(cmd.ctx, overwrite).await,
        };
        match result {
            Ok(()) => unmuted += 1,
            Err(e) => warn!(
                "⚠️ No se pudo quitar el silencio a {} en #{}: {:?}",
                member.user.name, channel.name, e
            ),
        }
    }

    if let Some(role_id) = muted_role(cmd).await? {
        if member.roles.contains(&role_id) {
            member.remove_role(http, role_id).await?;
        }
    }
    Ok(unmuted)
}

async fn muted_role(cmd: &CommandContext<'_>) -> CommandResult<Option<RoleId>> {
    let roles = cmd.guild_id.roles(&cmd.ctx.http).await?;
    Ok(roles
        .into_values()
        .find(|role| role.name == MUTED_ROLE)
        .map(|role| role.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const USER: UserId = UserId::new(7);

    fn overwrite(allow: Permissions, deny: Permissions) -> PermissionOverwrite {
        PermissionOverwrite {
            allow,
            deny,
            kind: PermissionOverwriteType::Member(USER),
        }
    }

    #[test]
    fn test_purge_limit_counts_command_and_caps() {
        assert_eq!(purge_limit(1), 2);
        assert_eq!(purge_limit(99), 100);
        assert_eq!(purge_limit(500), MAX_PURGE);
        assert_eq!(purge_limit(u64::MAX), MAX_PURGE);
    }

    #[test]
    fn test_muted_overwrite_keeps_other_bits() {
        let existing = vec![overwrite(
            Permissions::ATTACH_FILES | Permissions::SEND_MESSAGES,
            Permissions::ADD_REACTIONS,
        )];
        let muted = muted_overwrite(&existing, USER);
        assert_eq!(muted.allow, Permissions::ATTACH_FILES);
        assert_eq!(muted.deny, Permissions::ADD_REACTIONS | Permissions::SEND_MESSAGES);

        let fresh = muted_overwrite(&[], USER);
        assert_eq!(fresh, overwrite(Permissions::empty(), Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_lift_mute() {
        assert_eq!(lift_mute(&[], USER), None);
        assert_eq!(
            lift_mute(&[overwrite(Permissions::empty(), Permissions::ADD_REACTIONS)], USER),
            None
        );
        assert_eq!(
            lift_mute(&[overwrite(Permissions::empty(), Permissions::SEND_MESSAGES)], USER),
            Some(Unmute::Delete)
        );
        assert_eq!(
            lift_mute(
                &[overwrite(
                    Permissions::ATTACH_FILES,
                    Permissions::SEND_MESSAGES | Permissions::ADD_REACTIONS
                )],
                USER
            ),
            Some(Unmute::Replace(overwrite(
                Permissions::ATTACH_FILES,
                Permissions::ADD_REACTIONS
            )))
        );
    }

    #[test]
    fn test_lift_mute_ignores_other_members() {
        let other = PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::SEND_MESSAGES,
            kind: PermissionOverwriteType::Member(UserId::new(8)),
        };
        assert_eq!(lift_mute(&[other], USER), None);
    }
}
