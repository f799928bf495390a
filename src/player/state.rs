//! Playback lifecycle
//!
//! This module holds the locked player state and the state machine that moves
//! it between `Stopped`, `Started`, `Playing`, `Paused` and `Stopping`:
//! starting and stopping inputs, asynchronous media changes, end of stream
//! handling (gapless continuation or media-stopped action) and teardown.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::media::Media;
use crate::player::input::{self, InputCommand, InputHandle, InputStart, SeekTarget, StartPoint};
use crate::player::listener::{ListenerRegistry, PlayerListener};
use crate::player::extras::TeletextState;
use crate::player::timing::AbLoop;
use crate::player::titles::TitleState;
use crate::player::tracks::{EsId, ProgramRegistry, TrackCategory, TrackRegistry};
use crate::player::{
    Capabilities, InputStats, MediaProvider, MediaStoppedAction, PlaybackError, PlayerGuard,
    RendererItem, SeekSpeed, SeekWhence, Shared, SignalInfo, State, VoutHandle,
};
use crate::utils::config::PlayerConfig;
use crate::utils::error::{CoreError, Result};
use crate::utils::Tick;

/// Why the current input is being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum StopReason {
    #[default]
    User,
    MediaChange,
    EndOfStream,
    Error,
}

/// Everything guarded by the player lock
pub(crate) struct PlayerState {
    pub(crate) listeners: ListenerRegistry<dyn PlayerListener>,
    pub(crate) provider: Option<Arc<dyn MediaProvider>>,

    /// Current media, the player holds its own reference
    pub(crate) media: Option<Media>,

    /// Media to switch to once the current stop completes
    pub(crate) pending_media: Option<Option<Media>>,

    /// Prefetched next media, valid when `next_media_requested` is set
    pub(crate) next_media: Option<Media>,
    pub(crate) next_media_requested: bool,

    pub(crate) input: Option<InputHandle>,
    pub(crate) stopping_inputs: Vec<InputHandle>,

    /// Terminated worker threads, joined on delete
    pub(crate) finished_threads: Vec<JoinHandle<()>>,
    pub(crate) next_input_id: u64,

    pub(crate) playback_state: State,
    pub(crate) error: PlaybackError,

    /// Playback was requested and not cancelled
    pub(crate) started: bool,
    pub(crate) restart_requested: bool,
    pub(crate) deleting: bool,
    pub(crate) stop_reason: StopReason,
    pub(crate) paused_at_end: bool,
    pub(crate) media_stopped_action: MediaStoppedAction,

    pub(crate) capabilities: Capabilities,
    pub(crate) buffering: f32,
    pub(crate) length: Option<Tick>,
    pub(crate) time: Option<Tick>,
    pub(crate) position: Option<f64>,
    pub(crate) rate: f32,

    /// Seek recorded while stopped, applied by the next input
    pub(crate) start_point: Option<StartPoint>,

    /// Bumped by every seek; position reports from older seeks are dropped
    pub(crate) seek_generation: u64,

    pub(crate) tracks: TrackRegistry,
    pub(crate) track_languages: [Option<String>; 3],
    pub(crate) last_subtitle: Option<EsId>,
    pub(crate) programs: ProgramRegistry,
    pub(crate) titles: TitleState,

    pub(crate) ab_loop: AbLoop,
    pub(crate) audio_delay: Tick,
    pub(crate) subtitle_delay: Tick,
    pub(crate) subtitle_fps: f32,

    pub(crate) teletext: TeletextState,
    pub(crate) recording: bool,
    pub(crate) renderer: Option<RendererItem>,
    pub(crate) signal: Option<SignalInfo>,
    pub(crate) statistics: Option<InputStats>,
    pub(crate) vouts: Vec<(VoutHandle, EsId)>,
    pub(crate) cork_count: u32,
    pub(crate) paused_by_cork: bool,
}

impl PlayerState {
    pub(crate) fn new(config: &PlayerConfig, provider: Option<Arc<dyn MediaProvider>>) -> Self {
        let mut track_languages: [Option<String>; 3] = Default::default();
        track_languages[TrackCategory::Audio.index()] = config.audio_language.clone();
        track_languages[TrackCategory::Subtitle.index()] = config.subtitle_language.clone();

        Self {
            listeners: ListenerRegistry::new(),
            provider,
            media: None,
            pending_media: None,
            next_media: None,
            next_media_requested: false,
            input: None,
            stopping_inputs: Vec::new(),
            finished_threads: Vec::new(),
            next_input_id: 1,
            playback_state: State::Stopped,
            error: PlaybackError::None,
            started: false,
            restart_requested: false,
            deleting: false,
            stop_reason: StopReason::User,
            paused_at_end: false,
            media_stopped_action: config.media_stopped_action,
            capabilities: Capabilities::empty(),
            buffering: 0.0,
            length: None,
            time: None,
            position: None,
            rate: config.initial_rate,
            start_point: None,
            seek_generation: 0,
            tracks: TrackRegistry::default(),
            track_languages,
            last_subtitle: None,
            programs: ProgramRegistry::default(),
            titles: TitleState::default(),
            ab_loop: AbLoop::default(),
            audio_delay: 0,
            subtitle_delay: 0,
            subtitle_fps: 1.0,
            teletext: TeletextState::default(),
            recording: false,
            renderer: None,
            signal: None,
            statistics: None,
            vouts: Vec::new(),
            cork_count: 0,
            paused_by_cork: false,
        }
    }

    fn has_inputs(&self) -> bool {
        self.input.is_some() || !self.stopping_inputs.is_empty()
    }
}

impl PlayerGuard<'_> {
    /// Current playback state
    pub fn state(&self) -> State {
        self.state.playback_state
    }

    /// Current error state
    pub fn error(&self) -> PlaybackError {
        self.state.error
    }

    /// True between `start()` and the end of playback (Started, Playing or Paused)
    pub fn is_started(&self) -> bool {
        matches!(
            self.state.playback_state,
            State::Started | State::Playing | State::Paused
        )
    }

    /// The current media
    ///
    /// During an asynchronous media change this keeps returning the old media
    /// until `on_current_media_changed` fires.
    pub fn current_media(&self) -> Option<&Media> {
        self.state.media.as_ref()
    }

    /// Capabilities of the current media
    pub fn capabilities(&self) -> Capabilities {
        self.state.capabilities
    }

    pub fn can_seek(&self) -> bool {
        self.state.capabilities.contains(Capabilities::SEEK)
    }

    pub fn can_pause(&self) -> bool {
        self.state.capabilities.contains(Capabilities::PAUSE)
    }

    pub fn can_change_rate(&self) -> bool {
        self.state.capabilities.contains(Capabilities::CHANGE_RATE)
    }

    pub fn can_rewind(&self) -> bool {
        self.state.capabilities.contains(Capabilities::REWIND)
    }

    /// Buffering progress of the current media, 0.0 to 1.0
    pub fn buffering(&self) -> f32 {
        self.state.buffering
    }

    /// Set the current media
    ///
    /// While stopped the change is immediate. Otherwise the current media is
    /// stopped first; `current_media()` keeps returning it until the
    /// media-changed event fires, and playback restarts with the new media if
    /// it was requested. Any prefetched next media is dropped.
    pub fn set_current_media(&mut self, media: Option<Media>) {
        self.invalidate_next_media();
        // Seeks made from here on apply to the new media
        self.state.start_point = None;

        if self.state.playback_state == State::Stopped && !self.state.has_inputs() {
            self.swap_media(media);
            return;
        }

        debug!("Media change deferred until the current input stops");
        self.state.pending_media = Some(media);
        self.stop_input(StopReason::MediaChange);
    }

    /// Forget the prefetched next media so the provider is asked again
    pub fn invalidate_next_media(&mut self) {
        if self.state.next_media_requested {
            debug!("Next media invalidated");
        }
        self.state.next_media = None;
        self.state.next_media_requested = false;
    }

    /// Start playback of the current media
    ///
    /// Does nothing when playback is already started. While stopping, the
    /// start is deferred until the stop completes.
    ///
    /// # Returns
    ///
    /// `CoreError::NoMedia` when there is no current media
    pub fn start(&mut self) -> Result<()> {
        match self.state.playback_state {
            State::Stopping => {
                debug!("Start requested while stopping, restarting once stopped");
                self.state.restart_requested = true;
                return Ok(());
            }
            State::Started | State::Playing | State::Paused => return Ok(()),
            State::Stopped => {}
        }

        let Some(media) = self.state.media.clone() else {
            return Err(CoreError::NoMedia);
        };

        self.set_error(PlaybackError::None);
        if let Err(e) = self.spawn_input(media) {
            error!("Failed to start input: {}", e);
            self.set_error(PlaybackError::Generic);
            return Err(e);
        }
        self.state.started = true;
        self.set_state(State::Started);
        Ok(())
    }

    /// Stop playback
    ///
    /// Asynchronous: the state moves to `Stopping` right away and to
    /// `Stopped` once the input is torn down.
    pub fn stop(&mut self) {
        self.state.started = false;
        self.state.restart_requested = false;
        self.stop_input(StopReason::User);
    }

    /// Pause playback; ignored unless playing a media that can pause
    pub fn pause(&mut self) {
        if self.state.playback_state != State::Playing {
            return;
        }
        if !self.can_pause() {
            debug!("Pause ignored: media cannot pause");
            return;
        }
        self.send_input(InputCommand::Pause(true));
        self.set_state(State::Paused);
    }

    /// Resume playback; ignored unless paused
    pub fn resume(&mut self) {
        if self.state.playback_state != State::Paused {
            return;
        }

        if self.state.paused_at_end {
            self.state.paused_at_end = false;
            if !self.can_seek() {
                // The input is done; play the media again from scratch
                self.stop();
                self.state.restart_requested = true;
                return;
            }
            self.seek_input(SeekTarget::Time(0), SeekWhence::Absolute, SeekSpeed::Precise);
        }

        self.state.paused_by_cork = false;
        self.send_input(InputCommand::Pause(false));
        self.set_state(State::Playing);
    }

    /// Pause when playing, resume when paused
    pub fn toggle_pause(&mut self) {
        match self.state.playback_state {
            State::Playing => self.pause(),
            State::Paused => self.resume(),
            _ => {}
        }
    }

    /// The action taken when a media ends
    pub fn media_stopped_action(&self) -> MediaStoppedAction {
        self.state.media_stopped_action
    }

    /// Change the action taken when a media ends
    pub fn set_media_stopped_action(&mut self, action: MediaStoppedAction) {
        if self.state.media_stopped_action == action {
            return;
        }
        self.state.media_stopped_action = action;
        if action != MediaStoppedAction::Continue {
            self.invalidate_next_media();
        }
        self.emit(|l, p| l.on_media_stopped_action_changed(p, action));
    }

    pub(crate) fn set_state(&mut self, state: State) {
        if self.state.playback_state == state {
            return;
        }
        info!("Player state: {} -> {}", self.state.playback_state, state);
        self.state.playback_state = state;
        self.emit(|l, p| l.on_state_changed(p, state));
    }

    pub(crate) fn set_error(&mut self, error: PlaybackError) {
        if self.state.error == error {
            return;
        }
        self.state.error = error;
        self.emit(|l, p| l.on_error_changed(p, error));
    }

    pub(crate) fn set_capabilities(&mut self, capabilities: Capabilities) {
        let old = self.state.capabilities;
        if old == capabilities {
            return;
        }
        debug!("Capabilities: {:?} -> {:?}", old, capabilities);
        self.state.capabilities = capabilities;
        self.emit(|l, p| l.on_capabilities_changed(p, old, capabilities));
    }

    pub(crate) fn set_buffering(&mut self, buffering: f32) {
        let buffering = buffering.clamp(0.0, 1.0);
        self.state.buffering = buffering;
        self.emit(|l, p| l.on_buffering_changed(p, buffering));
    }

    /// Send a command to the current input, if any
    pub(crate) fn send_input(&self, command: InputCommand) {
        if let Some(input) = &self.state.input {
            if input.commands.send(command).is_err() {
                debug!("Input {} is gone, command dropped", input.id);
            }
        }
    }

    pub(crate) fn next_seek_generation(&mut self) -> u64 {
        self.state.seek_generation += 1;
        self.state.seek_generation
    }

    fn swap_media(&mut self, media: Option<Media>) {
        info!(
            "Current media: {}",
            media.as_ref().map_or_else(|| "none".to_string(), |m| m.display_name())
        );
        self.state.media = media.clone();
        self.emit(|l, p| l.on_current_media_changed(p, media.as_ref()));
    }

    fn spawn_input(&mut self, media: Media) -> Result<()> {
        let id = self.state.next_input_id;
        self.state.next_input_id += 1;

        // Drop handles of workers that are completely gone
        self.state.finished_threads.retain(|t| !t.is_finished());

        let start = InputStart {
            id,
            media,
            start_point: self.state.start_point.take(),
            rate: self.state.rate,
            generation: self.state.seek_generation,
            tick_interval: self.shared.config.tick_interval(),
        };
        let handle = input::spawn(Arc::clone(self.shared), start)?;
        self.state.input = Some(handle);
        Ok(())
    }

    /// Move the current input to the stopping list and ask it to stop
    pub(crate) fn stop_input(&mut self, reason: StopReason) {
        let Some(input) = self.state.input.take() else {
            return;
        };
        debug!("Stopping input {} ({:?})", input.id, reason);
        if input.commands.send(InputCommand::Stop).is_err() {
            debug!("Input {} already gone", input.id);
        }
        self.state.stopping_inputs.push(input);
        self.state.stop_reason = reason;

        if self.is_started() {
            self.set_state(State::Stopping);
        }
    }

    /// An input worker is about to exit
    pub(crate) fn on_input_terminated(&mut self, input_id: u64) {
        let terminated = if let Some(idx) = self
            .state
            .stopping_inputs
            .iter()
            .position(|i| i.id == input_id)
        {
            Some(self.state.stopping_inputs.remove(idx))
        } else if self.state.input.as_ref().map(|i| i.id) == Some(input_id) {
            warn!("Input {} terminated unexpectedly", input_id);
            self.set_error(PlaybackError::Generic);
            self.state.stop_reason = StopReason::Error;
            if self.is_started() {
                self.set_state(State::Stopping);
            }
            self.state.input.take()
        } else {
            None
        };

        if let Some(mut input) = terminated {
            if let Some(thread) = input.thread.take() {
                self.state.finished_threads.push(thread);
            }
            debug!("Input {} terminated", input_id);
        }
        self.shared.teardown.notify_all();

        if self.state.playback_state == State::Stopping && !self.state.has_inputs() {
            self.finish_stop();
        }
    }

    /// Last step of a stop: reset the media state, then decide what follows
    fn finish_stop(&mut self) {
        self.reset_media_state();
        self.set_capabilities(Capabilities::empty());
        self.state.paused_at_end = false;
        self.set_state(State::Stopped);

        if self.state.deleting {
            return;
        }

        let reason = std::mem::take(&mut self.state.stop_reason);
        let restart = std::mem::take(&mut self.state.restart_requested);

        if let Some(media) = self.state.pending_media.take() {
            self.swap_media(media);
            if self.state.started || restart {
                self.restart();
            }
            return;
        }

        if restart {
            self.restart();
            return;
        }

        self.state.started = false;
        if reason == StopReason::EndOfStream
            && self.state.media_stopped_action == MediaStoppedAction::Exit
        {
            info!("Playback ended, exit requested");
            self.emit(|l, p| l.on_exit_requested(p));
        }
    }

    fn restart(&mut self) {
        self.state.started = false;
        match self.start() {
            Ok(()) => {}
            Err(CoreError::NoMedia) => debug!("Nothing to restart"),
            Err(e) => warn!("Restart failed: {}", e),
        }
    }

    /// Drop everything that belongs to the media that just stopped
    pub(crate) fn reset_media_state(&mut self) {
        self.clear_tracks();
        self.clear_programs();
        self.clear_titles();
        self.set_teletext_menu(false);
        self.reset_ab_loop();

        if self.state.length.is_some() {
            self.set_length(None);
        }
        self.state.time = None;
        self.state.position = None;
        self.state.buffering = 0.0;
        self.state.signal = None;
        self.state.statistics = None;
        if self.state.recording {
            self.state.recording = false;
            self.emit(|l, p| l.on_recording_changed(p, false));
        }
    }

    /// The input reached the end of its media
    pub(crate) fn on_end_of_stream(&mut self) {
        if self.ab_loop_back_pending() {
            debug!("End of stream ignored: A-B loop seeks back");
            return;
        }
        let action = self.state.media_stopped_action;
        info!("End of stream ({:?})", action);

        match action {
            MediaStoppedAction::Pause => {
                if self.state.playback_state == State::Playing && self.can_pause() {
                    self.state.paused_at_end = true;
                    self.send_input(InputCommand::Pause(true));
                    self.set_state(State::Paused);
                } else {
                    self.stop_input(StopReason::EndOfStream);
                }
            }
            MediaStoppedAction::Stop | MediaStoppedAction::Exit => {
                self.stop_input(StopReason::EndOfStream);
            }
            MediaStoppedAction::Continue => match self.take_next_media() {
                Some(next) if self.shared.config.gapless => self.switch_gapless(next),
                Some(next) => {
                    self.state.pending_media = Some(Some(next));
                    self.stop_input(StopReason::EndOfStream);
                }
                None => self.stop_input(StopReason::EndOfStream),
            },
        }
    }

    /// Replace the ending input by a new one without leaving `Playing`
    fn switch_gapless(&mut self, next: Media) {
        info!("Gapless switch to {}", next.display_name());
        if let Some(old) = self.state.input.take() {
            if old.commands.send(InputCommand::Stop).is_err() {
                debug!("Input {} already gone", old.id);
            }
            self.state.stopping_inputs.push(old);
        }

        self.reset_media_state();
        self.swap_media(Some(next.clone()));

        if let Err(e) = self.spawn_input(next) {
            error!("Gapless switch failed: {}", e);
            self.set_error(PlaybackError::Generic);
            self.state.stop_reason = StopReason::Error;
            self.set_state(State::Stopping);
            if !self.state.has_inputs() {
                self.finish_stop();
            }
        }
    }

    /// The prefetched next media, or a fresh answer from the provider
    fn take_next_media(&mut self) -> Option<Media> {
        if self.state.next_media_requested {
            self.state.next_media_requested = false;
            return self.state.next_media.take();
        }
        self.query_next_media()
    }

    fn query_next_media(&mut self) -> Option<Media> {
        let provider = self.state.provider.clone()?;
        let next = provider.get_next(self);
        debug!(
            "Provider returned {}",
            next.as_ref().map_or_else(|| "no media".to_string(), |m| m.display_name())
        );
        next
    }

    /// Ask the provider for the next media ahead of the end of stream
    pub(crate) fn prefetch_next_media(&mut self) {
        if self.state.next_media_requested
            || self.state.media_stopped_action != MediaStoppedAction::Continue
        {
            return;
        }
        let next = self.query_next_media();
        self.state.next_media = next;
        self.state.next_media_requested = true;
    }

    /// Unrecoverable failure of the current input
    pub(crate) fn on_input_failed(&mut self, message: &str) {
        error!("Playback failed: {}", message);
        self.set_error(PlaybackError::Generic);
        self.state.started = false;
        self.stop_input(StopReason::Error);
    }
}

/// Tear the player down: stop, wait for every input, join the workers
pub(crate) fn shutdown(shared: &Arc<Shared>) {
    let threads = {
        let mut guard = PlayerGuard::new(shared);
        if guard.state.deleting {
            return;
        }
        guard.state.deleting = true;
        guard.state.started = false;
        guard.state.restart_requested = false;
        guard.state.pending_media = None;
        guard.stop_input(StopReason::User);

        while guard.state.has_inputs() {
            guard.cond_wait(&shared.teardown);
        }

        if !guard.state.listeners.is_empty() {
            warn!(
                "{} player listener(s) still registered at delete",
                guard.state.listeners.len()
            );
        }
        guard.state.provider = None;
        guard.state.next_media = None;
        guard.state.media = None;
        std::mem::take(&mut guard.state.finished_threads)
    };

    for thread in threads {
        if thread.join().is_err() {
            error!("Input thread panicked");
        }
    }
    info!("Player deleted");
}
