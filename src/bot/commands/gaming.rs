use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::DateTime;
use num_format::{Locale, ToFormattedString};
use serde::{de::DeserializeOwned, Deserialize};
use serenity::builder::{CreateAttachment, CreateEmbed, EditMessage};
use tracing::{debug, warn};

use crate::{
    bot::{
        args,
        commands::CommandContext,
        error::{CommandError, CommandResult},
    },
    ui::embeds::colors,
};

const MC_STATUS_ENDPOINT: &str = "https://api.mcsrvstat.us/2";
const ROBLOX_UNIVERSE_ENDPOINT: &str = "https://apis.roblox.com/universes/v1/places";
const ROBLOX_GAMES_ENDPOINT: &str = "https://games.roblox.com/v1/games";
const ROBLOX_ICONS_ENDPOINT: &str = "https://thumbnails.roblox.com/v1/games/icons";
/// Caracteres de la descripción antes de cortarla con `...`.
const DESCRIPTION_PREVIEW: usize = 250;

#[derive(Debug, Default, Deserialize)]
pub struct McPlayers {
    pub online: u64,
    pub max: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct McMotd {
    #[serde(default)]
    pub clean: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct McServerStatus {
    #[serde(default)]
    pub online: bool,
    pub hostname: Option<String>,
    #[serde(default)]
    pub players: McPlayers,
    pub version: Option<String>,
    #[serde(default)]
    pub motd: McMotd,
    /// `data:image/png;base64,...`
    pub icon: Option<String>,
}

impl McServerStatus {
    /// Bytes PNG del ícono del servidor, si existe y se puede decodificar.
    pub fn icon_png(&self) -> Option<Vec<u8>> {
        let encoded = self.icon.as_deref()?;
        let payload = encoded.rsplit(',').next()?;
        match STANDARD.decode(payload.trim()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("Icono del servidor inválido: {:?}", e);
                None
            }
        }
    }
}

pub fn status_embed(address: &str, status: &McServerStatus) -> CreateEmbed {
    if !status.online {
        return CreateEmbed::default()
            .title(format!("Minecraft Server Status: {}", address))
            .description("**Server is currently offline.**")
            .color(colors::ERROR_RED);
    }

    let mut embed = CreateEmbed::default()
        .title(format!(
            "Minecraft Server: {}",
            status.hostname.as_deref().unwrap_or(address)
        ))
        .color(colors::SUCCESS_GREEN)
        .field("Status", "🟢 Online", true)
        .field(
            "Players",
            format!("{} / {}", status.players.online, status.players.max),
            true,
        )
        .field("Version", status.version.as_deref().unwrap_or("N/A"), true);

    let motd = status.motd.clean.join("\n");
    if !motd.trim().is_empty() {
        embed = embed.field("MOTD", format!("```\n{}\n```", motd), false);
    }
    embed
}

pub async fn mcstatus(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let (address, _) = args::split_first(cmd.args);
    if address.is_empty() {
        return Err(cmd.usage_error());
    }

    let placeholder = cmd
        .reply(format!("Pinging Minecraft server `{}`...", address))
        .await?;

    let outcome = fetch_status(&cmd.bot.http, address).await.map(|status| {
        let mut edit = EditMessage::new();
        let mut embed = status_embed(address, &status);
        if status.online {
            if let Some(png) = status.icon_png() {
                embed = embed.thumbnail("attachment://icon.png");
                edit = edit.new_attachment(CreateAttachment::bytes(png, "icon.png"));
            }
        }
        edit.embed(embed)
    });
    cmd.settle(placeholder, outcome).await
}

async fn fetch_status(http: &reqwest::Client, address: &str) -> CommandResult<McServerStatus> {
    let url = format!("{}/{}", MC_STATUS_ENDPOINT, urlencoding::encode(address));
    let unreachable = || CommandError::invalid("❌ Could not connect to the status API.");

    let response = http.get(url).send().await.map_err(|e| {
        warn!("⚠️ mcsrvstat no responde: {:?}", e);
        unreachable()
    })?;
    if !response.status().is_success() {
        warn!("⚠️ mcsrvstat respondió {}", response.status());
        return Err(unreachable());
    }
    response.json().await.map_err(|e| {
        warn!("⚠️ Respuesta inválida de mcsrvstat: {:?}", e);
        unreachable()
    })
}

// ---------------------------------------------------------------------------
// Roblox
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UniverseResponse {
    universe_id: Option<u64>,
}

/// Respuesta paginada de las APIs de juegos: siempre un arreglo `data`.
#[derive(Debug, Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RobloxCreator {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobloxGame {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub playing: u64,
    #[serde(default)]
    pub visits: u64,
    #[serde(default)]
    pub favorited_count: u64,
    #[serde(default)]
    pub creator: RobloxCreator,
    pub created: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameVotes {
    #[serde(default)]
    up_votes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameIcon {
    image_url: Option<String>,
}

/// Lo que muestra `rbxstatus` de un juego.
#[derive(Debug)]
pub struct RobloxStatus {
    pub place_id: u64,
    pub game: RobloxGame,
    pub likes: u64,
    pub icon: Option<String>,
}

fn preview(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_PREVIEW {
        let cut: String = description.chars().take(DESCRIPTION_PREVIEW).collect();
        format!("{}...", cut)
    } else {
        description.to_string()
    }
}

pub fn roblox_embed(status: &RobloxStatus, now: i64) -> CreateEmbed {
    let game = &status.game;
    let name = if game.name.is_empty() { "Unknown" } else { &game.name };
    let creator = if game.creator.name.is_empty() {
        "Unknown"
    } else {
        &game.creator.name
    };

    let mut embed = CreateEmbed::default()
        .title(format!("Roblox Game: {}", name))
        .url(format!("https://www.roblox.com/games/{}", status.place_id))
        .description(preview(game.description.as_deref().unwrap_or_default()))
        .color(colors::ROBLOX_BLUE)
        .field("Players", game.playing.to_formatted_string(&Locale::en), true)
        .field("Visits", game.visits.to_formatted_string(&Locale::en), true)
        .field("Likes", status.likes.to_formatted_string(&Locale::en), true)
        .field(
            "Favorites",
            game.favorited_count.to_formatted_string(&Locale::en),
            true,
        )
        .field("Creator", creator, true);

    let created = game
        .created
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|date| date.timestamp());
    if let Some(ts) = created {
        let days = (now - ts).max(0) / 86_400;
        embed = embed.field("Created", format!("<t:{}:D>\n({} days ago)", ts, days), true);
    }
    if let Some(icon) = &status.icon {
        embed = embed.thumbnail(icon.clone());
    }
    embed
}

pub async fn rbxstatus(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let (raw, _) = args::split_first(cmd.args);
    if raw.is_empty() {
        return Err(cmd.usage_error());
    }
    let place_id: u64 = raw.parse().map_err(|_| cmd.usage_error())?;

    let placeholder = cmd
        .reply(format!(
            "Fetching Roblox game data for Place ID `{}`...",
            place_id
        ))
        .await?;

    let outcome = fetch_roblox(&cmd.bot.http, place_id)
        .await
        .map(|status| EditMessage::new().embed(roblox_embed(&status, chrono::Utc::now().timestamp())));
    cmd.settle(placeholder, outcome).await
}

async fn fetch_roblox(http: &reqwest::Client, place_id: u64) -> CommandResult<RobloxStatus> {
    let no_universe = || {
        CommandError::invalid(format!(
            "❌ Could not find a universe for Place ID `{}`.",
            place_id
        ))
    };
    let universe: UniverseResponse =
        get_json(http, &format!("{}/{}/universe", ROBLOX_UNIVERSE_ENDPOINT, place_id))
            .await
            .map_err(|e| {
                debug!("Universo de {} no encontrado: {}", place_id, e);
                no_universe()
            })?;
    let universe_id = universe.universe_id.ok_or_else(no_universe)?;

    let unexpected = |e: reqwest::Error| {
        warn!("⚠️ API de Roblox falló para {}: {:?}", place_id, e);
        CommandError::invalid(format!("❌ An unexpected error occurred: {}", e))
    };
    let games: DataList<RobloxGame> = get_json(
        http,
        &format!("{}?universeIds={}", ROBLOX_GAMES_ENDPOINT, universe_id),
    )
    .await
    .map_err(unexpected)?;
    let game = games
        .data
        .into_iter()
        .next()
        .ok_or_else(no_universe)?;

    // Votos e ícono son opcionales
    let likes = get_json::<DataList<GameVotes>>(
        http,
        &format!("{}/votes?universeIds={}", ROBLOX_GAMES_ENDPOINT, universe_id),
    )
    .await
    .ok()
    .and_then(|votes| votes.data.into_iter().next())
    .map_or(0, |v| v.up_votes);
    let icon = get_json::<DataList<GameIcon>>(
        http,
        &format!(
            "{}?universeIds={}&size=256x256&format=Png&isCircular=false",
            ROBLOX_ICONS_ENDPOINT, universe_id
        ),
    )
    .await
    .ok()
    .and_then(|icons| icons.data.into_iter().next())
    .and_then(|i| i.image_url);

    Ok(RobloxStatus {
        place_id,
        game,
        likes,
        icon,
    })
}

async fn get_json<T: DeserializeOwned>(http: &reqwest::Client, url: &str) -> reqwest::Result<T> {
    http.get(url).send().await?.error_for_status()?.json().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_online_status() {
        let status: McServerStatus = serde_json::from_str(
            r#"{
                "online": true,
                "hostname": "mc.example.net",
                "players": {"online": 12, "max": 100},
                "version": "1.21",
                "motd": {"clean": ["Welcome", "  to the server"]},
                "icon": "data:image/png;base64,aGVsbG8="
            }"#,
        )
        .unwrap();

        assert!(status.online);
        assert_eq!(status.icon_png().as_deref(), Some(&b"hello"[..]));

        let value = serde_json::to_value(status_embed("mc.example.net", &status)).unwrap();
        assert_eq!(value["title"], "Minecraft Server: mc.example.net");
        assert_eq!(value["fields"][1]["value"], "12 / 100");
        assert_eq!(value["fields"][3]["value"], "```\nWelcome\n  to the server\n```");
    }

    #[test]
    fn test_offline_status() {
        let status: McServerStatus = serde_json::from_str(r#"{"online": false}"#).unwrap();
        assert!(status.icon_png().is_none());
        let value = serde_json::to_value(status_embed("down.example", &status)).unwrap();
        assert_eq!(value["description"], "**Server is currently offline.**");
    }

    #[test]
    fn test_parse_roblox_game() {
        let games: DataList<RobloxGame> = serde_json::from_str(
            r#"{"data":[{
                "id": 1,
                "name": "Obby",
                "description": "Jump around",
                "creator": {"id": 9, "name": "Builder", "type": "User"},
                "playing": 1234,
                "visits": 9876543,
                "favoritedCount": 42,
                "created": "2020-01-01T00:00:00.000Z"
            }]}"#,
        )
        .unwrap();
        let game = games.data.into_iter().next().unwrap();
        assert_eq!(game.favorited_count, 42);

        let status = RobloxStatus {
            place_id: 606,
            game,
            likes: 1500,
            icon: Some("https://tr.rbxcdn.com/icon.png".into()),
        };
        // 2020-01-11
        let value = serde_json::to_value(roblox_embed(&status, 1_578_700_800)).unwrap();
        assert_eq!(value["title"], "Roblox Game: Obby");
        assert_eq!(value["url"], "https://www.roblox.com/games/606");
        assert_eq!(value["fields"][0]["value"], "1,234");
        assert_eq!(value["fields"][1]["value"], "9,876,543");
        assert_eq!(value["fields"][2]["value"], "1,500");
        assert_eq!(value["fields"][4]["value"], "Builder");
        assert_eq!(value["fields"][5]["value"], "<t:1577836800:D>\n(10 days ago)");
        assert_eq!(value["thumbnail"]["url"], "https://tr.rbxcdn.com/icon.png");
    }

    #[test]
    fn test_roblox_embed_sparse_game() {
        let game: RobloxGame = serde_json::from_str(r#"{"description": null}"#).unwrap();
        let status = RobloxStatus {
            place_id: 1,
            game,
            likes: 0,
            icon: None,
        };
        let value = serde_json::to_value(roblox_embed(&status, 0)).unwrap();
        assert_eq!(value["title"], "Roblox Game: Unknown");
        assert_eq!(value["fields"][4]["value"], "Unknown");
        assert_eq!(value["fields"].as_array().map(Vec::len), Some(5));
    }

    #[test]
    fn test_description_preview() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(300);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), DESCRIPTION_PREVIEW + 3);
    }

    #[test]
    fn test_universe_lookup() {
        let found: UniverseResponse = serde_json::from_str(r#"{"universeId": 77}"#).unwrap();
        assert_eq!(found.universe_id, Some(77));
        let missing: UniverseResponse = serde_json::from_str(r#"{"universeId": null}"#).unwrap();
        assert_eq!(missing.universe_id, None);
    }
}
