//! # Audio Module
//!
//! Per-guild playback engine for Jarvis Music.
//!
//! ## Architecture
//!
//! ### [`engine`] - Music Engine
//! - One [`queue::GuildQueue`] per guild, created on first use
//! - Track transitions serialized per guild, never across guilds
//! - Finish events tagged with a generation so stale or duplicated
//!   driver callbacks are ignored
//!
//! ### [`queue`] - Queue State
//! - FIFO queue with song/queue loop modes
//! - Preloaded sources matched by track identity
//! - Idle disconnect timer handle
//!
//! ### [`player`] - Voice Output
//! - [`player::SongbirdPlayer`]: songbird-backed [`sink::VoiceSink`]
//! - [`player::HttpSourceOpener`]: opens resolved stream URLs over HTTP
//!
//! ## Playback Flow
//!
//! ```text
//! /play ──► resolver.search ──► engine.play ──► queue.push
//!                                     │
//!                     idle? ──────────┴──► advance ──► prepare_source ──► sink.play
//!                                                                       │
//!            PlaybackEvents ◄── FinishNotifier ◄── TrackEvent::End ◄────┘
//! ```
//!
//! Up to `PRELOAD_LIMIT` upcoming tracks are resolved and opened in the
//! background so the next transition can start without waiting on yt-dlp.

pub mod engine;
pub mod error;
mod idle;
pub mod player;
mod preload;
pub mod queue;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;
