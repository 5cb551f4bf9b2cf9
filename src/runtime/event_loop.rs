use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use vivace::audio::PlaybackEngine;
use vivace::config::DisplaySettings;
use vivace::error::PlayerError;

use super::status::status_line;

/// Commands accepted by the runtime, whatever their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCmd {
    Quit,
    PlayPause,
    Stop,
    Next,
    Prev,
    PlayIndex(usize),
    Status,
}

/// Parse one line of stdin input. Queue positions are 1-based for the user.
pub fn parse_command(line: &str) -> Option<ControlCmd> {
    let line = line.trim();
    let cmd = match line {
        "q" | "quit" => ControlCmd::Quit,
        "p" | "" => ControlCmd::PlayPause,
        "s" | "stop" => ControlCmd::Stop,
        "n" | "next" => ControlCmd::Next,
        "b" | "prev" => ControlCmd::Prev,
        "i" | "status" => ControlCmd::Status,
        _ => {
            let pos: usize = line.parse().ok()?;
            ControlCmd::PlayIndex(pos.checked_sub(1)?)
        }
    };
    Some(cmd)
}

/// Forward stdin lines as commands until stdin closes.
pub fn spawn_stdin_reader(tx: mpsc::Sender<ControlCmd>) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => eprintln!("unknown command: {line:?}"),
                }
            }
            debug!("stdin closed");
        })?;
    Ok(())
}

/// Main control loop. Returns once a `Quit` has shut the engine down.
pub fn run(
    engine: &PlaybackEngine,
    display: &DisplaySettings,
    control_rx: &mpsc::Receiver<ControlCmd>,
) -> Result<(), Box<dyn std::error::Error>> {
    while let Ok(cmd) = control_rx.recv() {
        if handle_control_cmd(cmd, engine, display)? {
            return Ok(());
        }
    }
    // Every sender is gone; nothing can ask us to quit any more.
    engine.shutdown()?;
    Ok(())
}

fn handle_control_cmd(
    cmd: ControlCmd,
    engine: &PlaybackEngine,
    display: &DisplaySettings,
) -> Result<bool, PlayerError> {
    match cmd {
        ControlCmd::Quit => {
            engine.shutdown()?;
            return Ok(true);
        }
        ControlCmd::PlayPause => report(engine.toggle_play_pause())?,
        ControlCmd::Stop => report(engine.stop())?,
        ControlCmd::Next => spawn_load(engine, |e| e.next()),
        ControlCmd::Prev => spawn_load(engine, |e| e.previous()),
        ControlCmd::PlayIndex(index) => spawn_load(engine, move |e| e.play_from_queue(index)),
        ControlCmd::Status => {
            println!("{}", status_line(&engine.snapshot(), engine.queue_len(), display));
        }
    }
    Ok(false)
}

/// Log recoverable failures; only a closed engine stops the loop.
fn report(result: Result<(), PlayerError>) -> Result<(), PlayerError> {
    match result {
        Err(PlayerError::EngineClosed) => Err(PlayerError::EngineClosed),
        Err(e) => {
            warn!("{e}");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Track loads block on the network, so they run off the control loop.
fn spawn_load<F>(engine: &PlaybackEngine, op: F)
where
    F: FnOnce(&PlaybackEngine) -> Result<(), PlayerError> + Send + 'static,
{
    let engine = engine.clone();
    let spawned = thread::Builder::new()
        .name("load".to_string())
        .spawn(move || {
            if let Err(e) = op(&engine) {
                if e != PlayerError::EngineClosed {
                    warn!("{e}");
                }
            }
        });
    if let Err(e) = spawned {
        warn!("failed to spawn load thread: {e}");
    }
}
