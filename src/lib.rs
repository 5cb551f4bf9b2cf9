//! Streaming playback engine for a terminal media-server client.
//!
//! [`audio::PlaybackEngine`] turns track URLs into sound: it opens the
//! network stream, decodes it, drives the output device, tracks progress
//! and walks the queue. The catalog and the presentation layer talk to it
//! through plain method calls and observer callbacks.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
