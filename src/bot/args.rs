//! Argument helpers shared by the command handlers.

use serenity::{
    model::{
        guild::Member,
        id::{GuildId, UserId},
        user::User,
    },
    prelude::Context,
};

use crate::bot::error::{CommandError, CommandResult};

/// Separa el primer token delimitado por espacios.
pub fn split_first(args: &str) -> (&str, &str) {
    let args = args.trim();
    match args.find(char::is_whitespace) {
        Some(end) => (&args[..end], args[end..].trim_start()),
        None => (args, ""),
    }
}

/// Lee `<@id>`, `<@!id>` o un id numérico.
pub fn parse_user_id(token: &str) -> Option<UserId> {
    let raw = token
        .strip_prefix("<@")
        .and_then(|t| t.strip_suffix('>'))
        .map(|t| t.trim_start_matches('!'))
        .unwrap_or(token);
    raw.parse::<u64>().ok().filter(|id| *id != 0).map(UserId::new)
}

/// Busca un miembro del guild por mención, id o nombre exacto.
pub async fn resolve_member(ctx: &Context, guild_id: GuildId, token: &str) -> CommandResult<Member> {
    if let Some(user_id) = parse_user_id(token) {
        return guild_id
            .member(ctx, user_id)
            .await
            .map_err(|_| CommandError::MemberNotFound);
    }

    let cached = guild_id.to_guild_cached(&ctx.cache).and_then(|guild| {
        guild
            .member_named(token)
            .cloned()
    });
    cached.ok_or(CommandError::MemberNotFound)
}

/// `token` como miembro, o el autor si está vacío.
pub async fn member_or_author(
    ctx: &Context,
    guild_id: GuildId,
    token: &str,
    author: UserId,
) -> CommandResult<Member> {
    if token.trim().is_empty() {
        return guild_id
            .member(ctx, author)
            .await
            .map_err(|_| CommandError::MemberNotFound);
    }
    resolve_member(ctx, guild_id, token.trim()).await
}

/// Cualquier usuario de Discord por mención o id, no solo miembros del guild.
pub async fn resolve_user(ctx: &Context, token: &str) -> CommandResult<User> {
    let user_id = parse_user_id(token).ok_or(CommandError::MemberNotFound)?;
    user_id
        .to_user(ctx)
        .await
        .map_err(|_| CommandError::MemberNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_first() {
        assert_eq!(split_first("  set m play "), ("set", "m play"));
        assert_eq!(split_first("list"), ("list", ""));
        assert_eq!(split_first(""), ("", ""));
    }

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("<@42>"), Some(UserId::new(42)));
        assert_eq!(parse_user_id("<@!42>"), Some(UserId::new(42)));
        assert_eq!(parse_user_id("42"), Some(UserId::new(42)));
        assert_eq!(parse_user_id("0"), None);
        assert_eq!(parse_user_id("<#42>"), None);
        assert_eq!(parse_user_id("someone"), None);
    }
}
