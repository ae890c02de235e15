//! # UI Module
//!
//! Discord embeds and button rows used by the slash commands.

pub mod buttons;
pub mod embeds;
