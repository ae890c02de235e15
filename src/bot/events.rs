use anyhow::Result;
use serenity::{async_trait, builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::debug;

use crate::{
    audio::{error::SourceError, sink::Announcer},
    sources::Track,
    ui::embeds,
};

/// Avisos del motor publicados como mensajes en el canal de texto
pub struct SerenityAnnouncer {
    http: Arc<Http>,
}

impl SerenityAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Announcer for SerenityAnnouncer {
    async fn now_playing(&self, channel_id: ChannelId, track: &Track) -> Result<()> {
        channel_id
            .send_message(
                &self.http,
                CreateMessage::new().embed(embeds::create_now_playing_embed(track)),
            )
            .await?;

        debug!("📨 Now playing enviado a {}: {}", channel_id, track.title());
        Ok(())
    }

    async fn track_failed(&self, channel_id: ChannelId, track: &Track, error: &SourceError) -> Result<()> {
        channel_id
            .send_message(
                &self.http,
                CreateMessage::new().embed(embeds::create_track_failed_embed(track, error)),
            )
            .await?;

        Ok(())
    }
}
