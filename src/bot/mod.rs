//! # Bot Module
//!
//! Discord front end of the Jarvis music bot.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Interaction dispatch to the [`MusicEngine`] ([`handlers`])
//! - Channel announcements for the engine ([`events`])
//! - Voice state tracking (bot disconnected, bot left alone)
//!
//! ## Architecture
//!
//! [`OpenMusicBot`] implements Serenity's [`EventHandler`] trait. It owns no
//! playback state of its own: every queue, voice connection and idle timer
//! lives inside the shared [`MusicEngine`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let (engine, events) = MusicEngine::new(resolver, sink, opener, announcer, EngineConfig::from(&config));
//! tokio::spawn(events.run(engine.clone()));
//!
//! let bot = OpenMusicBot::new(config, engine);
//! ```

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{audio::engine::MusicEngine, config::Config};

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, limits, page size)
/// - `engine`: Per-guild queues and playback
///
/// ## Thread Safety
///
/// Both fields are behind [`Arc`]; the engine synchronizes each guild
/// internally, so handlers for different guilds never wait on each other.
pub struct OpenMusicBot {
    /// Bot configuration loaded from environment variables
    pub config: Arc<Config>,
    /// Motor de colas compartido por todos los servidores
    pub engine: Arc<MusicEngine>,
}

impl OpenMusicBot {
    pub fn new(config: Arc<Config>, engine: Arc<MusicEngine>) -> Self {
        Self { config, engine }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per-guild when `GUILD_ID` is set (faster
    /// propagation, useful for development) and globally otherwise.
    ///
    /// # Command Registration Timing
    ///
    /// - **Guild commands**: ~1 second propagation time
    /// - **Global commands**: ~1 hour propagation time
    ///
    /// # Required Permissions
    ///
    /// The bot must have `applications.commands` permission in the target guild(s).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    /// Called when the bot is ready and connected to Discord.
    ///
    /// Registers the slash commands and logs connection information.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Handles incoming Discord interactions.
    ///
    /// - Slash commands (`/play`, `/queue`, etc.)
    /// - Button clicks (queue pagination)
    ///
    /// Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Handles voice state updates for users and the bot.
    ///
    /// # Behaviors
    ///
    /// - **Bot disconnected** from outside: the guild queue is cleared
    /// - **Bot alone** in its channel: playback stops and the bot leaves
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let current_user_id = ctx.cache.current_user().id;

        if new.user_id == current_user_id {
            if old.is_some() && new.channel_id.is_none() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.engine.leave(guild_id).await;
            }
            return;
        }

        // Solo interesa cuando alguien sale del canal donde está el bot
        let Some(left_channel) = old.and_then(|state| state.channel_id) else {
            return;
        };
        if new.channel_id == Some(left_channel) {
            return;
        }

        if bot_is_alone(&ctx, guild_id, current_user_id, left_channel) {
            info!("🚪 Bot solo en el canal de voz, saliendo de guild {}", guild_id);
            if let Err(e) = self.engine.stop(guild_id).await {
                warn!("⚠️ No se pudo salir del canal en guild {}: {}", guild_id, e);
            }
        }
    }
}

/// `true` si el bot está en `channel_id` sin ningún usuario humano.
///
/// Lee el cache de forma síncrona; el guard se suelta antes de volver.
fn bot_is_alone(ctx: &Context, guild_id: GuildId, bot_id: UserId, channel_id: ChannelId) -> bool {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return false;
    };

    let bot_channel = guild
        .voice_states
        .get(&bot_id)
        .and_then(|state| state.channel_id);
    if bot_channel != Some(channel_id) {
        return false;
    }

    // GUILD_CREATE trae estados de voz sin `member`; se busca en los miembros del guild
    let is_bot = |user_id: UserId| {
        guild
            .voice_states
            .get(&user_id)
            .and_then(|state| state.member.as_ref())
            .or_else(|| guild.members.get(&user_id))
            .is_some_and(|member| member.user.bot)
    };
    let voices = guild
        .voice_states
        .values()
        .map(|state| (state.user_id, state.channel_id));
    let listeners = count_listeners(voices, channel_id, bot_id, is_bot);

    debug!("👥 {} oyentes en el canal {} de guild {}", listeners, channel_id, guild_id);
    listeners == 0
}

/// Usuarios humanos en `channel_id`, sin contar al propio bot ni a otros bots
fn count_listeners(
    voices: impl IntoIterator<Item = (UserId, Option<ChannelId>)>,
    channel_id: ChannelId,
    bot_id: UserId,
    is_bot: impl Fn(UserId) -> bool,
) -> usize {
    voices
        .into_iter()
        .filter(|(user_id, channel)| *channel == Some(channel_id) && *user_id != bot_id)
        .filter(|(user_id, _)| !is_bot(*user_id))
        .count()
}
