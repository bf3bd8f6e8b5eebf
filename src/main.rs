use anyhow::{Context as _, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

use cogsworth::{
    audio::{PlaybackManager, PlaybackSettings},
    bot::{
        chat::{GeminiClient, TextGenerator},
        CogsworthBot,
    },
    config::Config,
    sources::YtDlpResolver,
    storage::Stores,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cogsworth=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("⚙️ Iniciando Cogsworth v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("🔧 {}", config.summary());

    // Inicializar almacenamiento JSON
    let stores = Arc::new(Stores::open(&config.data_dir).await?);

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("cogsworth/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("No se pudo crear el cliente HTTP")?;

    // Reproducción
    let resolver = Arc::new(YtDlpResolver::new(http.clone()));
    let (music, driver) = PlaybackManager::new(
        resolver,
        PlaybackSettings {
            default_volume: config.default_volume,
            max_queue_size: config.max_queue_size,
        },
    );

    // Chat IA opcional
    let chat: Option<Arc<dyn TextGenerator>> = match config.gemini_api_key.as_deref() {
        Some(key) => {
            info!("🤖 Chat activado con {}", config.gemini_model);
            Some(Arc::new(GeminiClient::new(
                http.clone(),
                key,
                config.gemini_model.clone(),
            )))
        }
        None => {
            warn!("⚠️ GEMINI_API_KEY no definido, chat desactivado");
            None
        }
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let bot = Arc::new(CogsworthBot::new(
        config.clone(),
        music,
        driver,
        stores,
        http,
        chat,
    ));

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler_arc(bot.clone())
        .register_songbird()
        .await
        .context("No se pudo crear el cliente de Discord")?;
    bot.attach_shard_manager(client.shard_manager.clone());

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let shutdown_bot = bot.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown_bot.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    bot.shutdown().await;
    info!("👋 Cogsworth detenido");
    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
