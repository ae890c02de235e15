use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::queue::QueuePage;

/// IDs personalizados para los botones
pub mod button_ids {
    /// Prefijo de los botones de paginación de `/queue`; le sigue la página destino
    pub const QUEUE_PAGE_PREFIX: &str = "queue_page:";
    pub const QUEUE_PAGE_INFO: &str = "queue_page_info";
}

/// Botones de navegación de la cola; `None` si cabe en una sola página
pub fn create_queue_navigation(page: &QueuePage) -> Option<CreateActionRow> {
    if page.total_pages <= 1 {
        return None;
    }

    let has_prev = page.current_page > 1;
    let has_next = page.current_page < page.total_pages;

    let first_btn = CreateButton::new(page_button_id(1, "first"))
        .emoji('⏪')
        .style(ButtonStyle::Secondary)
        .disabled(!has_prev);

    let prev_btn = CreateButton::new(page_button_id(page.current_page.saturating_sub(1).max(1), "prev"))
        .emoji('◀')
        .style(ButtonStyle::Primary)
        .disabled(!has_prev);

    let page_btn = CreateButton::new(button_ids::QUEUE_PAGE_INFO)
        .label(format!("{}/{}", page.current_page, page.total_pages))
        .style(ButtonStyle::Secondary)
        .disabled(true);

    let next_btn = CreateButton::new(page_button_id((page.current_page + 1).min(page.total_pages), "next"))
        .emoji('▶')
        .style(ButtonStyle::Primary)
        .disabled(!has_next);

    let last_btn = CreateButton::new(page_button_id(page.total_pages, "last"))
        .emoji('⏩')
        .style(ButtonStyle::Secondary)
        .disabled(!has_next);

    Some(CreateActionRow::Buttons(vec![
        first_btn, prev_btn, page_btn, next_btn, last_btn,
    ]))
}

// Discord exige custom_ids distintos dentro del mismo mensaje
fn page_button_id(target: usize, slot: &str) -> String {
    format!("{}{}:{}", button_ids::QUEUE_PAGE_PREFIX, target, slot)
}

/// Página destino de un botón de paginación
pub fn parse_queue_page(custom_id: &str) -> Option<usize> {
    let rest = custom_id.strip_prefix(button_ids::QUEUE_PAGE_PREFIX)?;
    let target = rest.split(':').next()?;
    target.parse().ok().filter(|page| *page > 0)
}
