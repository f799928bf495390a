use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

use ccplayer_core::player::{ListAction, Track};
use ccplayer_core::utils::{format_tick, tick_from_secs};
use ccplayer_core::{
    Config, Media, MediaProvider, MediaStoppedAction, PlaybackError, Player, PlayerGuard,
    PlayerListener, SeekSpeed, SeekWhence, State, Tick,
};

/// ccplay - play media through the CCPlayer core
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media resources to play in order (`mock://length=5s;audio_tracks=2`)
    #[arg(value_name = "MRI", required = true)]
    mris: Vec<String>,

    /// Initial playback rate
    #[arg(short, long, value_name = "RATE")]
    rate: Option<f32>,

    /// Start time of the first media, in seconds
    #[arg(short, long, value_name = "SECS")]
    start: Option<i64>,

    /// Stop and restart between media instead of chaining them
    #[arg(long = "no-gapless", action = ArgAction::SetFalse)]
    gapless: bool,

    /// What to do when a media ends (continue, pause, stop, exit)
    #[arg(long, value_name = "ACTION")]
    stop_action: Option<MediaStoppedAction>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Events forwarded from the player to the main task
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum CliEvent {
    State { state: State },
    Error { error: PlaybackError },
    Media { mri: Option<String> },
    Track { action: ListAction, id: String, name: String },
    Position { time: Tick, position: Option<f64> },
    Exit,
}

/// Plays the remaining command line media in order
struct QueueProvider {
    queue: Mutex<VecDeque<Media>>,
}

impl MediaProvider for QueueProvider {
    fn get_next(&self, _player: &mut PlayerGuard<'_>) -> Option<Media> {
        self.queue.lock().pop_front()
    }
}

/// Forwards player events to the main task
struct Forwarder {
    events: UnboundedSender<CliEvent>,
    last_second: Mutex<Option<Tick>>,
}

impl Forwarder {
    fn send(&self, event: CliEvent) {
        // The receiver is gone only while shutting down
        let _ = self.events.send(event);
    }
}

impl PlayerListener for Forwarder {
    fn on_state_changed(&self, _player: &mut PlayerGuard<'_>, state: State) {
        self.send(CliEvent::State { state });
    }

    fn on_error_changed(&self, _player: &mut PlayerGuard<'_>, error: PlaybackError) {
        self.send(CliEvent::Error { error });
    }

    fn on_current_media_changed(&self, _player: &mut PlayerGuard<'_>, media: Option<&Media>) {
        self.send(CliEvent::Media {
            mri: media.map(|m| m.mri().to_string()),
        });
    }

    fn on_track_list_changed(&self, _player: &mut PlayerGuard<'_>, action: ListAction, track: &Track) {
        self.send(CliEvent::Track {
            action,
            id: track.es_id.to_string(),
            name: track.name.clone(),
        });
    }

    fn on_position_changed(&self, _player: &mut PlayerGuard<'_>, time: Tick, position: Option<f64>) {
        // One report per second of media time is enough for a terminal
        let second = time / tick_from_secs(1);
        let mut last = self.last_second.lock();
        if *last != Some(second) {
            *last = Some(second);
            self.send(CliEvent::Position { time, position });
        }
    }

    fn on_exit_requested(&self, _player: &mut PlayerGuard<'_>) {
        self.send(CliEvent::Exit);
    }
}

fn print_event(event: &CliEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Cannot serialize event: {}", e),
        }
        return;
    }
    match event {
        CliEvent::State { state } => println!("[state] {}", state),
        CliEvent::Error { error } => println!("[error] {:?}", error),
        CliEvent::Media { mri } => println!("[media] {}", mri.as_deref().unwrap_or("none")),
        CliEvent::Track { action, id, name } => println!("[track] {:?} {} ({})", action, id, name),
        CliEvent::Position { time, position } => match position {
            Some(pos) => println!("[time] {} ({:.1}%)", format_tick(*time), pos * 100.0),
            None => println!("[time] {}", format_tick(*time)),
        },
        CliEvent::Exit => println!("[exit]"),
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Cannot load {}", path.display()))?,
        None => Config::load().context("Cannot load configuration")?,
    };
    if let Some(rate) = args.rate {
        config.player.initial_rate = rate;
    }
    if let Some(action) = args.stop_action {
        config.player.media_stopped_action = action;
    }
    config.player.gapless &= args.gapless;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    let log_level = if args.debug {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting ccplay v{}", env!("CARGO_PKG_VERSION"));

    let mut queue: VecDeque<Media> = args.mris.iter().map(Media::new).collect();
    let first = queue.pop_front().context("No media given")?;
    let provider = Arc::new(QueueProvider {
        queue: Mutex::new(queue),
    });

    let player = Player::builder()
        .with_config(config)
        .with_media_provider(provider)
        .build()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener_id = {
        let mut guard = player.lock();
        let id = guard.add_listener(Arc::new(Forwarder {
            events: tx,
            last_second: Mutex::new(None),
        }));
        guard.set_current_media(Some(first));
        if let Some(secs) = args.start {
            guard.seek_by_time(tick_from_secs(secs), SeekSpeed::Precise, SeekWhence::Absolute);
        }
        guard.start()?;
        id
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                print_event(&event, args.json);
                match event {
                    CliEvent::Exit => break,
                    // A restart with the next media happens under the same lock
                    // as the Stopped event, so a player still stopped now is done
                    CliEvent::State { state: State::Stopped } => {
                        if player.lock().state() == State::Stopped {
                            break;
                        }
                    }
                    CliEvent::Error { error: PlaybackError::Generic } => {
                        error!("Playback failed");
                    }
                    _ => {}
                }
            }
        }
    }

    {
        let mut guard = player.lock();
        guard.stop();
        guard.remove_listener(listener_id);
    }
    player.delete();
    Ok(())
}
