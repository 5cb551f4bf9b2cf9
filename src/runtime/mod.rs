use std::sync::Arc;
use std::sync::mpsc;

use vivace::audio::{PlaybackEngine, RodioSink};
use vivace::logging;

use crate::cli::Args;

mod event_loop;
mod settings;
mod startup;
mod status;

use event_loop::ControlCmd;

pub fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = settings::load_settings();
    if let Err(e) = logging::init(&settings.logging) {
        eprintln!("vivace: cannot open log file, logging disabled: {e}");
    }

    let tracks = startup::collect_tracks(&args)?;
    if tracks.is_empty() {
        return Err("nothing to play: pass --playlist FILE or stream URLs".into());
    }

    let sink = Arc::new(RodioSink::init(&settings.output)?);
    let engine = PlaybackEngine::with_network(sink, &settings.network, settings.playback.clone());
    startup::attach_observers(&engine, &settings.display);
    engine.set_queue(tracks)?;

    let (control_tx, control_rx) = mpsc::channel::<ControlCmd>();
    event_loop::spawn_stdin_reader(control_tx.clone())?;
    let _ = control_tx.send(ControlCmd::PlayIndex(args.start));

    event_loop::run(&engine, &settings.display, &control_rx)
}
