//! Input worker
//!
//! Every started media gets its own worker thread. The worker opens the media
//! through the backend without holding the player lock, then paces playback:
//! each tick it advances its clock by the elapsed wall time scaled by the
//! rate, asks the source to demux up to that time and reports the new
//! position. Commands from the player arrive over a channel; reports go back
//! by locking the player and calling into it, exactly like any other thread.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::backend::{DemuxStatus, MediaSource, SeekRequest, SourceEvent, SourceInfo};
use crate::media::Media;
use crate::player::tracks::TrackCategory;
use crate::player::{Capabilities, NavigateAction, PlayerGuard, SeekSpeed, SeekWhence, Shared, State};
use crate::utils::error::{IntoCoreError, Result};
use crate::utils::{tick_from_duration, Tick};

/// Seek target before it is resolved against the media length
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SeekTarget {
    Time(Tick),

    /// Fraction of the length, 0.0 to 1.0
    Position(f64),
}

/// Seek recorded before playback started
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StartPoint {
    pub(crate) target: SeekTarget,
    pub(crate) speed: SeekSpeed,
}

/// Player to worker commands
#[derive(Debug, Clone)]
pub(crate) enum InputCommand {
    Pause(bool),
    Seek {
        target: SeekTarget,
        whence: SeekWhence,
        speed: SeekSpeed,
        generation: u64,
    },
    SetRate(f32),
    SelectTrack {
        source_id: i32,
        selected: bool,
    },
    SelectProgram(i32),
    SelectTitle {
        idx: usize,
        generation: u64,
    },
    SelectChapter {
        idx: usize,
        generation: u64,
    },
    SetDelay(TrackCategory, Tick),
    Navigate(NavigateAction),
    SetRecording(bool),
    Teletext {
        page: u32,
        transparent: bool,
    },
    Stop,
}

/// Worker to player reports
#[derive(Debug)]
pub(crate) enum InputEvent {
    Opened {
        info: SourceInfo,
        time: Tick,
        generation: u64,
    },
    OpenFailed(String),

    /// First data was demuxed
    Playing,
    Source(SourceEvent),
    Position { time: Tick, generation: u64 },
    EndOfStream,

    /// Fatal playback error; the worker exits after reporting it
    Error(String),

    /// Always the last report of a worker
    Terminated,
}

/// Parameters of a new input
pub(crate) struct InputStart {
    pub(crate) id: u64,
    pub(crate) media: Media,
    pub(crate) start_point: Option<StartPoint>,
    pub(crate) rate: f32,
    pub(crate) generation: u64,
    pub(crate) tick_interval: Duration,
}

/// Player side of an input worker
pub(crate) struct InputHandle {
    pub(crate) id: u64,
    pub(crate) commands: Sender<InputCommand>,
    pub(crate) thread: Option<JoinHandle<()>>,

    /// The `Opened` report was handled and capabilities are known
    pub(crate) opened: bool,
}

/// Spawn the worker thread of a new input
pub(crate) fn spawn(shared: Arc<Shared>, start: InputStart) -> Result<InputHandle> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let id = start.id;

    let thread = thread::Builder::new()
        .name(format!("input-{}", id))
        .spawn(move || InputWorker { shared, start }.run(rx))
        .thread_err("Failed to spawn input thread")?;

    Ok(InputHandle {
        id,
        commands: tx,
        thread: Some(thread),
        opened: false,
    })
}

/// Reports `Terminated` when the worker exits, even by panic
struct TerminationNotice {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for TerminationNotice {
    fn drop(&mut self) {
        PlayerGuard::new(&self.shared).on_input_event(self.id, InputEvent::Terminated);
    }
}

/// Playback clock and source of a running input
struct Playback {
    source: Box<dyn MediaSource>,
    length: Option<Tick>,
    capabilities: Capabilities,
    time: Tick,
    rate: f32,
    paused: bool,
    eos: bool,
    generation: u64,
    last_tick: Instant,
}

impl Playback {
    fn clamp(&self, time: Tick) -> Tick {
        match self.length {
            Some(length) => time.clamp(0, length),
            None => time.max(0),
        }
    }

    fn seek(&mut self, target: SeekTarget, whence: SeekWhence, speed: SeekSpeed) {
        let offset = match target {
            SeekTarget::Time(time) => time,
            SeekTarget::Position(pos) => match self.length {
                Some(length) => (pos * length as f64) as Tick,
                None => {
                    debug!("Position seek ignored: unknown length");
                    return;
                }
            },
        };
        let absolute = match whence {
            SeekWhence::Absolute => offset,
            SeekWhence::Relative => self.time + offset,
        };
        let request = SeekRequest {
            target: self.clamp(absolute),
            speed,
        };

        match self.source.seek(request) {
            Ok(landed) => {
                self.time = self.clamp(landed);
                self.eos = false;
                self.last_tick = Instant::now();
            }
            Err(e) => warn!("Seek failed: {}", e),
        }
    }
}

struct InputWorker {
    shared: Arc<Shared>,
    start: InputStart,
}

impl InputWorker {
    fn run(self, commands: Receiver<InputCommand>) {
        let id = self.start.id;
        let _notice = TerminationNotice {
            shared: Arc::clone(&self.shared),
            id,
        };

        info!("Input {} opening {}", id, self.start.media.mri());
        let source = match self.shared.backend.open(&self.start.media) {
            Ok(source) => source,
            Err(e) => {
                self.report(InputEvent::OpenFailed(e.to_string()));
                return;
            }
        };

        let info = source.info();
        let mut playback = Playback {
            source,
            length: info.length,
            capabilities: info.capabilities,
            time: 0,
            rate: 1.0,
            paused: false,
            eos: false,
            generation: self.start.generation,
            last_tick: Instant::now(),
        };

        if let Some(start) = self.start.start_point {
            if playback.capabilities.contains(Capabilities::SEEK) {
                playback.seek(start.target, SeekWhence::Absolute, start.speed);
            } else {
                debug!("Input {}: start point ignored, media cannot seek", id);
            }
        }
        self.apply_rate(&mut playback, self.start.rate);

        let time = playback.time;
        let generation = playback.generation;
        self.report(InputEvent::Opened {
            info,
            time,
            generation,
        });

        let mut playing = false;
        loop {
            match commands.recv_timeout(self.start.tick_interval) {
                Ok(command) => {
                    if !self.apply(command, &mut playback) {
                        break;
                    }
                    // Apply everything queued before advancing the clock
                    let mut stop = false;
                    while let Ok(command) = commands.try_recv() {
                        if !self.apply(command, &mut playback) {
                            stop = true;
                            break;
                        }
                    }
                    if stop {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if !playing {
                playing = true;
                playback.last_tick = Instant::now();
                self.report(InputEvent::Playing);
            }
            if !self.advance(&mut playback) {
                break;
            }
        }
        debug!("Input {} exiting", id);
    }

    fn report(&self, event: InputEvent) {
        PlayerGuard::new(&self.shared).on_input_event(self.start.id, event);
    }

    fn report_position(&self, playback: &Playback) {
        self.report(InputEvent::Position {
            time: playback.time,
            generation: playback.generation,
        });
    }

    fn apply_rate(&self, playback: &mut Playback, rate: f32) {
        let caps = playback.capabilities;
        let supported = caps.contains(Capabilities::CHANGE_RATE)
            && (rate > 0.0 || caps.contains(Capabilities::REWIND));
        let effective = if supported { rate } else { 1.0 };
        if effective != playback.rate {
            if let Err(e) = playback.source.set_rate(effective) {
                warn!("Rate change failed: {}", e);
                return;
            }
            playback.rate = effective;
        }
    }

    /// Apply one command; returns false when the worker must exit
    fn apply(&self, command: InputCommand, playback: &mut Playback) -> bool {
        let result = match command {
            InputCommand::Stop => return false,
            InputCommand::Pause(paused) => {
                playback.paused = paused;
                playback.last_tick = Instant::now();
                playback.source.set_pause(paused)
            }
            InputCommand::Seek {
                target,
                whence,
                speed,
                generation,
            } => {
                playback.generation = generation;
                if playback.capabilities.contains(Capabilities::SEEK) {
                    playback.seek(target, whence, speed);
                } else {
                    debug!("Input {}: seek ignored, media cannot seek", self.start.id);
                }
                self.report_position(playback);
                Ok(())
            }
            InputCommand::SetRate(rate) => {
                self.apply_rate(playback, rate);
                Ok(())
            }
            InputCommand::SelectTrack {
                source_id,
                selected,
            } => playback.source.select_track(source_id, selected),
            InputCommand::SelectProgram(group_id) => playback.source.select_program(group_id),
            InputCommand::SelectTitle { idx, generation } => {
                playback.generation = generation;
                let result = playback.source.select_title(idx);
                result.map(|time| self.jump(playback, time))
            }
            InputCommand::SelectChapter { idx, generation } => {
                playback.generation = generation;
                let result = playback.source.select_chapter(idx);
                result.map(|time| self.jump(playback, time))
            }
            InputCommand::SetDelay(category, delay) => playback.source.set_delay(category, delay),
            InputCommand::Navigate(action) => playback.source.navigate(action),
            InputCommand::SetRecording(enabled) => playback.source.set_recording(enabled),
            InputCommand::Teletext { page, transparent } => {
                playback.source.set_teletext(page, transparent)
            }
        };

        if let Err(e) = result {
            warn!("Input {}: command failed: {}", self.start.id, e);
        }
        true
    }

    /// The source moved to a new time on its own (title or chapter change)
    fn jump(&self, playback: &mut Playback, time: Tick) {
        playback.time = playback.clamp(time);
        playback.eos = false;
        playback.last_tick = Instant::now();
        self.report_position(playback);
    }

    /// One clock tick; returns false when the worker must exit
    fn advance(&self, playback: &mut Playback) -> bool {
        let now = Instant::now();
        let elapsed = tick_from_duration(now.duration_since(playback.last_tick));
        playback.last_tick = now;

        if playback.eos || playback.paused {
            return true;
        }

        let step = (elapsed as f64 * playback.rate as f64) as Tick;
        let target = playback.clamp(playback.time + step);

        match playback.source.demux(target) {
            Ok(DemuxStatus::Ok) => {
                playback.time = target;
                if playback.rate < 0.0 && target == 0 {
                    playback.eos = true;
                }
            }
            Ok(DemuxStatus::Eof) => {
                playback.time = playback.length.unwrap_or(target);
                playback.eos = true;
            }
            Err(e) => {
                self.report(InputEvent::Error(e.to_string()));
                return false;
            }
        }

        for event in playback.source.poll_events() {
            match &event {
                SourceEvent::LengthChanged(length) => playback.length = *length,
                SourceEvent::CapabilitiesChanged(caps) => playback.capabilities = *caps,
                _ => {}
            }
            self.report(InputEvent::Source(event));
        }

        self.report_position(playback);
        if playback.eos {
            self.report(InputEvent::EndOfStream);
        }
        true
    }
}

impl PlayerGuard<'_> {
    /// Entry point of every worker report
    pub(crate) fn on_input_event(&mut self, input_id: u64, event: InputEvent) {
        if let InputEvent::Terminated = event {
            self.on_input_terminated(input_id);
            return;
        }
        if self.state.input.as_ref().map(|i| i.id) != Some(input_id) {
            // Reports of an input that is being stopped are stale
            return;
        }

        match event {
            InputEvent::Opened {
                info,
                time,
                generation,
            } => self.on_input_opened(info, time, generation),
            InputEvent::OpenFailed(message) | InputEvent::Error(message) => {
                self.on_input_failed(&message)
            }
            InputEvent::Playing => {
                if self.state.playback_state == State::Started {
                    self.set_state(State::Playing);
                }
                self.prefetch_next_media();
            }
            InputEvent::Source(event) => self.on_source_event(event),
            InputEvent::Position { time, generation } => {
                if generation == self.state.seek_generation {
                    self.update_position(time);
                }
            }
            InputEvent::EndOfStream => self.on_end_of_stream(),
            InputEvent::Terminated => {}
        }
    }

    fn on_input_opened(&mut self, info: SourceInfo, time: Tick, generation: u64) {
        let SourceInfo {
            length,
            capabilities,
            tracks,
            programs,
            titles,
            meta,
        } = info;

        if let Some(input) = self.state.input.as_mut() {
            input.opened = true;
        }
        self.set_capabilities(capabilities);
        self.set_length(length);

        if !meta.is_empty() {
            if let Some(media) = self.state.media.clone() {
                media.merge_meta(meta);
                self.emit(|l, p| l.on_media_meta_changed(p, &media));
            }
        }

        for program in programs {
            self.add_program(program);
        }
        self.select_default_program();

        for track in tracks {
            self.add_track(track, false);
        }
        self.select_default_tracks();

        if !titles.is_empty() {
            self.publish_titles(titles);
        }

        for (category, delay) in [
            (TrackCategory::Audio, self.state.audio_delay),
            (TrackCategory::Subtitle, self.state.subtitle_delay),
        ] {
            if delay != 0 {
                self.send_input(InputCommand::SetDelay(category, delay));
            }
        }

        // A seek sent before the open supersedes the start time
        if generation == self.state.seek_generation {
            self.update_position(time);
        }
    }

    fn on_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Buffering(buffering) => self.set_buffering(buffering),
            SourceEvent::LengthChanged(length) => self.set_length(length),
            SourceEvent::CapabilitiesChanged(caps) => self.set_capabilities(caps),
            SourceEvent::TrackAdded(desc) => self.add_track(desc, true),
            SourceEvent::TrackRemoved(source_id) => self.remove_track(source_id),
            SourceEvent::TrackUpdated(desc) => self.update_track(desc),
            SourceEvent::ProgramAdded(desc) => self.add_program(desc),
            SourceEvent::ProgramRemoved(group_id) => self.remove_program(group_id),
            SourceEvent::ProgramUpdated(desc) => self.update_program(desc),
            SourceEvent::TitlesChanged(titles) => self.publish_titles(titles),
            SourceEvent::Signal(signal) => {
                self.state.signal = Some(signal);
                self.emit(|l, p| l.on_signal_changed(p, &signal));
            }
            SourceEvent::Statistics(stats) => {
                self.state.statistics = Some(stats);
                self.emit(|l, p| l.on_statistics_changed(p, &stats));
            }
            SourceEvent::Meta(meta) => {
                if let Some(media) = self.state.media.clone() {
                    media.merge_meta(meta);
                    self.emit(|l, p| l.on_media_meta_changed(p, &media));
                }
            }
            SourceEvent::Epg(events) => {
                if let Some(media) = self.state.media.clone() {
                    media.set_epg(events);
                    self.emit(|l, p| l.on_media_epg_changed(p, &media));
                }
            }
            SourceEvent::SubItems(items) => {
                if let Some(media) = self.state.media.clone() {
                    media.add_subitems(items.clone());
                    self.emit(|l, p| l.on_media_subitems_changed(p, &media, &items));
                }
            }
        }
    }
}
