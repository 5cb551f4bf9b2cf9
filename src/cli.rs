use std::path::PathBuf;

use clap::Parser;

/// Headless streaming player.
///
/// Reads single-letter commands from stdin: `p` play/pause, `s` stop,
/// `n` next, `b` previous, a number jumps to that queue position,
/// `i` prints the current status, `q` quits.
#[derive(Parser, Debug)]
#[command(name = "vivace", version)]
pub struct Args {
    /// TOML playlist with one [[track]] table per entry
    #[arg(long, short)]
    pub playlist: Option<PathBuf>,

    /// Queue position to start from (0-based)
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Stream URLs, queued after the playlist entries
    pub urls: Vec<String>,
}
