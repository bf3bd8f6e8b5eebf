use chrono::Local;
use regex::Regex;
use serenity::builder::{CreateEmbed, CreateEmbedFooter, CreateMessage};
use std::{sync::LazyLock, time::Duration};
use tracing::{info, warn};

use crate::{
    bot::{args, commands::CommandContext, error::CommandResult},
    ui::embeds::{self, colors},
};

const DEFAULT_REASON: &str = "No reason provided";

static DELAY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(s|m|h|d)").expect("patrón de tiempo válido"));

/// Lee `10s`, `15m`, `2h` o `3d` al inicio de `input`.
pub fn parse_delay(input: &str) -> Option<Duration> {
    let normalized = input.trim().to_lowercase();
    let captures = DELAY_PATTERN.captures(normalized.as_str())?;

    let count: u64 = captures[1].parse().ok()?;
    let unit = match &captures[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        _ => 86_400,
    };
    count.checked_mul(unit).map(Duration::from_secs)
}

pub async fn remind_me(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let (raw_delay, reason) = args::split_first(cmd.args);
    if raw_delay.is_empty() {
        return Err(cmd.usage_error());
    }
    let Some(delay) = parse_delay(raw_delay) else {
        cmd.reply_embed(embeds::error_embed(
            "❌ Invalid Time Format",
            "Use: `10s`, `15m`, `2h`, `3d`",
        ))
        .await?;
        return Ok(());
    };
    let reason = if reason.is_empty() { DEFAULT_REASON } else { reason }.to_string();

    let fire_at = chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| Local::now().checked_add_signed(d))
        .map(|t| t.format("%Y-%m-%d %I:%M %p").to_string())
        .unwrap_or_else(|| "a very long time from now".to_string());
    cmd.reply_embed(
        CreateEmbed::default()
            .title("⏰ Reminder Set!")
            .description(format!("I will remind you about: **{}**", reason))
            .color(colors::INFO_BLUE)
            .footer(CreateEmbedFooter::new(format!(
                "Reminder will be sent at {}",
                fire_at
            ))),
    )
    .await?;

    let guild_name = cmd
        .guild_id
        .name(&cmd.ctx.cache)
        .unwrap_or_else(|| "Unknown".to_string());
    let reminder = CreateEmbed::default()
        .title("⏰ Your Reminder!")
        .description(format!("You asked me to remind you about:\n**{}**", reason))
        .color(colors::SUCCESS_GREEN)
        .timestamp(cmd.msg.timestamp)
        .footer(CreateEmbedFooter::new(format!(
            "Reminder was set in server: {}",
            guild_name
        )));

    let http = cmd.ctx.http.clone();
    let author = cmd.msg.author.clone();
    let origin = (cmd.msg.channel_id, cmd.msg.id);
    info!(
        "⏰ Recordatorio para {} en {}",
        author.name,
        humantime::format_duration(delay)
    );

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        let dm = author
            .direct_message(&http, CreateMessage::new().embed(reminder.clone()))
            .await;
        if dm.is_ok() {
            return;
        }

        let fallback = CreateMessage::new()
            .content(format!("Hey <@{}>, here's your reminder!", author.id))
            .embed(reminder)
            .reference_message(origin);
        if let Err(e) = origin.0.send_message(&http, fallback).await {
            warn!("⚠️ No se pudo entregar el recordatorio a {}: {:?}", author.name, e);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_delay_units() {
        assert_eq!(parse_delay("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_delay("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_delay("2H"), Some(Duration::from_secs(7_200)));
        assert_eq!(parse_delay("3d"), Some(Duration::from_secs(259_200)));
    }

    #[test]
    fn test_parse_delay_prefix_match() {
        assert_eq!(parse_delay("10mins"), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_parse_delay_rejects() {
        assert_eq!(parse_delay("soon"), None);
        assert_eq!(parse_delay("m10"), None);
        assert_eq!(parse_delay("10w"), None);
        assert_eq!(parse_delay("99999999999999999999d"), None);
    }
}
