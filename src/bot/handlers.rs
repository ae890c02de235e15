use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{
        engine::{PlayOutcome, PlayRequest},
        error::MusicError,
        queue::LoopMode,
    },
    bot::OpenMusicBot,
    ui::{buttons, embeds},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(
            ctx,
            &command,
            CreateInteractionResponseMessage::new()
                .content("❌ Este comando solo funciona dentro de un servidor")
                .ephemeral(true),
        )
        .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await,
        _ => {
            respond(
                ctx,
                &command,
                CreateInteractionResponseMessage::new()
                    .content("❌ Comando no reconocido")
                    .ephemeral(true),
            )
            .await
        }
    }
}

/// Maneja interacciones con componentes (paginación de la cola)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let message = match buttons::parse_queue_page(&component.data.custom_id) {
        Some(page) => queue_message(bot, guild_id, page),
        None => CreateInteractionResponseMessage::new().content("❌ Acción no reconocida"),
    };

    component
        .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(message))
        .await?;

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Defer la respuesta ya que yt-dlp puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return edit_with_error(ctx, command, "Sin canal de voz", "Debes estar en un canal de voz").await;
    };

    let track = match bot.engine.resolver().search(query, command.user.id).await {
        Ok(track) => track,
        Err(e) => {
            warn!("❌ Búsqueda fallida en guild {} para `{}`: {}", guild_id, query, e);
            return edit_with_error(ctx, command, "No se encontró la canción", &e.to_string()).await;
        }
    };

    let request = PlayRequest {
        guild_id,
        voice_channel,
        text_channel: command.channel_id,
        track: track.clone(),
    };

    let response = match bot.engine.play(request).await {
        Ok(PlayOutcome::Queued { position }) => {
            EditInteractionResponse::new().embed(embeds::create_track_added_embed(&track, position))
        }
        Ok(outcome) => EditInteractionResponse::new().content(play_reply(&outcome)),
        Err(e) => EditInteractionResponse::new().embed(error_embed(&e)),
    };

    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.engine.pause(guild_id).await {
        Ok(track) => CreateInteractionResponseMessage::new()
            .content(format!("⏸️ Reproducción pausada: **{}**", track.title())),
        Err(e) => error_message(&e),
    };
    respond(ctx, command, message).await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.engine.resume(guild_id).await {
        Ok(track) => CreateInteractionResponseMessage::new()
            .content(format!("▶️ Reproducción reanudada: **{}**", track.title())),
        Err(e) => error_message(&e),
    };
    respond(ctx, command, message).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.engine.skip(guild_id).await {
        Ok(track) => {
            CreateInteractionResponseMessage::new().content(format!("⏭️ Saltada: **{}**", track.title()))
        }
        Err(e) => error_message(&e),
    };
    respond(ctx, command, message).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.engine.stop(guild_id).await {
        Ok(()) => CreateInteractionResponseMessage::new().embed(embeds::create_success_embed(
            "Reproducción detenida",
            "⏹️ La cola se limpió y el bot salió del canal de voz",
        )),
        Err(e) => error_message(&e),
    };
    respond(ctx, command, message).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = position_option(command, "page").unwrap_or(1);
    respond(ctx, command, queue_message(bot, guild_id, page)).await
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.engine.shuffle(guild_id) {
        Ok(()) => CreateInteractionResponseMessage::new().content("🔀 Cola mezclada"),
        Err(e) => error_message(&e),
    };
    respond(ctx, command, message).await
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let mode = match string_option(command, "mode").unwrap_or("none").parse::<LoopMode>() {
        Ok(mode) => mode,
        Err(reason) => {
            let message = CreateInteractionResponseMessage::new()
                .embed(embeds::create_error_embed("Modo inválido", &reason))
                .ephemeral(true);
            return respond(ctx, command, message).await;
        }
    };
    let position = position_option(command, "position");

    let message = match bot.engine.set_loop(guild_id, mode, position) {
        Ok(looped) => CreateInteractionResponseMessage::new().content(loop_message(mode, position, looped)),
        Err(e) => error_message(&e),
    };
    respond(ctx, command, message).await
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let position = position_option(command, "position").unwrap_or(0);
    let message = match bot.engine.remove(guild_id, position) {
        Ok(track) => CreateInteractionResponseMessage::new()
            .content(format!("🗑️ Eliminada de la cola: **{}**", track.title())),
        Err(e) => error_message(&e),
    };
    respond(ctx, command, message).await
}

// Funciones auxiliares

fn queue_message(bot: &OpenMusicBot, guild_id: GuildId, page: usize) -> CreateInteractionResponseMessage {
    let info = bot.engine.queue_info(guild_id);
    let page_size = bot.config.queue_page_size;
    let embed = embeds::create_queue_embed(&info, page, page_size);

    let navigation = buttons::create_queue_navigation(&info.get_page(page, page_size));
    CreateInteractionResponseMessage::new()
        .embed(embed)
        .components(navigation.into_iter().collect())
}

/// Respuesta corta a `/play`. El error de una pista ya lo avisa el motor en el
/// canal, así que aquí no se repite.
fn play_reply(outcome: &PlayOutcome) -> String {
    match outcome {
        PlayOutcome::Started { title } => format!("🎶 Empezando: **{}**", title),
        PlayOutcome::Queued { position } => format!("➕ Agregada en la posición {}", position),
        PlayOutcome::Unplayable => "📭 No quedó ninguna canción sonando".to_string(),
    }
}

fn loop_message(mode: LoopMode, position: Option<usize>, looped: Option<crate::sources::Track>) -> String {
    match (mode, position, looped) {
        (_, Some(position), Some(track)) => {
            format!("🔂 Repitiendo la posición {}: **{}**", position, track.title())
        }
        (LoopMode::Song, _, Some(track)) => format!("🔂 Repetir canción activado: **{}**", track.title()),
        (LoopMode::Song, _, None) => "🔂 Repetir canción activado".to_string(),
        (LoopMode::Queue, _, _) => "🔁 Repetir cola activado".to_string(),
        (LoopMode::None, _, _) => "➡️ Repetición desactivada".to_string(),
    }
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn position_option(command: &CommandInteraction, name: &str) -> Option<usize> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
        .and_then(|value| usize::try_from(value).ok())
}

fn error_embed(error: &MusicError) -> serenity::builder::CreateEmbed {
    let title = match error {
        MusicError::Voice(_) => "Error de conexión",
        MusicError::Resolution(_) => "Error de búsqueda",
        MusicError::Playback(_) => "Error de reproducción",
        _ => "No se pudo completar",
    };
    embeds::create_error_embed(title, &error.to_string())
}

fn error_message(error: &MusicError) -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new()
        .embed(error_embed(error))
        .ephemeral(true)
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    message: CreateInteractionResponseMessage,
) -> Result<()> {
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn edit_with_error(
    ctx: &Context,
    command: &CommandInteraction,
    title: &str,
    description: &str,
) -> Result<()> {
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_error_embed(title, description)),
        )
        .await?;
    Ok(())
}

/// Canal de voz en el que está el usuario, según el cache del gateway
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
