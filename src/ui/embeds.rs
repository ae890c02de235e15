use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        error::SourceError,
        queue::{LoopMode, PlaybackStatus, QueueInfo},
    },
    sources::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jarvis Music";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**[{}]({})**", track.title(), track.url()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_field(track.duration()), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by()), true)
        .field("🔗 Fuente", source_name(track.url()), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(track.url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**[{}]({})** se ha agregado a la cola de reproducción",
            track.title(),
            track.url()
        ))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true)
        .field("⏱️ Duración", duration_field(track.duration()), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by()), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("🎵 Usa /queue para ver todas las canciones"))
}

/// Aviso de una pista que no se pudo reproducir y fue saltada
pub fn create_track_failed_embed(track: &Track, error: &SourceError) -> CreateEmbed {
    CreateEmbed::default()
        .title("⚠️ No se pudo reproducir esta canción")
        .description(format!("**[{}]({})**\n`{}`", track.title(), track.url(), error))
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new("⏭️ Se salta a la siguiente de la cola"))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize, items_per_page: usize) -> CreateEmbed {
    let queue_page = queue_info.get_page(page, items_per_page);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.current.is_none() && queue_info.items.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &queue_info.current {
        let status = match (queue_info.status, queue_info.loop_mode) {
            (PlaybackStatus::Paused, _) => "⏸️",
            (_, LoopMode::Song) => "🔂",
            (_, LoopMode::Queue) => "🔁",
            (_, LoopMode::None) => "▶️",
        };

        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!(
                "**[{}]({})** `[{}]`",
                current.title(),
                current.url(),
                duration_field(current.duration())
            ),
            false,
        );
    }

    if !queue_page.items.is_empty() {
        let description: String = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let duration = item
                    .duration()
                    .map(|d| format!(" `[{}]`", format_duration(d)))
                    .unwrap_or_default();
                format!("**{}**. {}{}\n", queue_page.first_position + i, item.title(), duration)
            })
            .collect();

        embed = embed.field("Próximas canciones", description, false);
    }

    let mut info = format!("**Total:** {} canciones", queue_info.items.len());
    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(queue_info.total_duration)
        ));
    }
    info.push_str(&format!(" • **Loop:** {}", queue_info.loop_mode.as_str()));
    embed = embed.field("Información", info, false);

    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Jarvis Music",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn duration_field(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => format_duration(duration),
        None => "🔴 En vivo".to_string(),
    }
}

/// Nombre legible del sitio de origen
fn source_name(url: &str) -> String {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));

    match host.as_deref() {
        Some(h) if h.ends_with("youtube.com") || h == "youtu.be" => "YouTube".to_string(),
        Some(h) if h.ends_with("soundcloud.com") => "SoundCloud".to_string(),
        Some(h) => h.trim_start_matches("www.").to_string(),
        None => "Desconocida".to_string(),
    }
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(duration_field(None), "🔴 En vivo");
    }

    #[test]
    fn test_source_name() {
        assert_eq!(source_name("https://www.youtube.com/watch?v=abc"), "YouTube");
        assert_eq!(source_name("https://youtu.be/abc"), "YouTube");
        assert_eq!(source_name("https://soundcloud.com/a/b"), "SoundCloud");
        assert_eq!(source_name("https://www.bandcamp.com/x"), "bandcamp.com");
        assert_eq!(source_name("ytsearch1:algo"), "Desconocida");
    }
}
