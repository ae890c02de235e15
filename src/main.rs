use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod sources;
mod ui;

use crate::audio::{
    engine::{EngineConfig, MusicEngine},
    player::{HttpSourceOpener, SongbirdPlayer},
};
use crate::bot::{events::SerenityAnnouncer, OpenMusicBot};
use crate::cache::{MetadataCache, StreamUrlCache};
use crate::config::Config;
use crate::sources::{resolver::TrackResolver, ytdlp::YtDlpClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jarvis_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jarvis Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    let ytdlp = Arc::new(YtDlpClient::new(
        config.ytdlp_path.clone(),
        config.resolver_workers,
    ));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&ytdlp).await;
    }

    info!("{}", config.summary());

    // Caches compartidos por todos los servidores
    let streams = StreamUrlCache::new(config.cache_size, config.stream_cache_ttl);
    let metadata = MetadataCache::new(config.cache_size, None);
    let resolver = Arc::new(TrackResolver::new(ytdlp, streams.clone(), metadata.clone()));

    // Voz y avisos
    let songbird = Songbird::serenity();
    let sink = Arc::new(SongbirdPlayer::new(songbird.clone()));
    let opener = Arc::new(HttpSourceOpener::new(reqwest::Client::new()));
    let announcer = Arc::new(SerenityAnnouncer::new(Arc::new(Http::new(
        &config.discord_token,
    ))));

    let (engine, events) = MusicEngine::new(
        resolver,
        sink,
        opener,
        announcer,
        EngineConfig::from(&config),
    );

    tokio::spawn(events.run(engine.clone()));
    tokio::spawn(cache::maintenance_task(streams, metadata));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let config = Arc::new(config);
    let handler = OpenMusicBot::new(config.clone(), engine);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(ytdlp: &YtDlpClient) -> Result<()> {
    // Verificar dependencias críticas
    let version = ytdlp.version().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
