//! Time, position, seeking, rate, A-B loop and delays

use log::debug;

use crate::player::input::{InputCommand, SeekTarget, StartPoint};
use crate::player::tracks::TrackCategory;
use crate::player::{AbLoopPoint, AbLoopState, AbLoopStatus, PlayerGuard, SeekSpeed, SeekWhence};
use crate::utils::Tick;

/// Slowest supported playback rate
pub const RATE_MIN: f32 = 1.0 / 32.0;

/// Fastest supported playback rate
pub const RATE_MAX: f32 = 32.0;

/// Rates visited by `increment_rate` / `decrement_rate`
const RATE_STEPS: [f32; 15] = [
    1.0 / 32.0,
    1.0 / 16.0,
    1.0 / 8.0,
    1.0 / 4.0,
    1.0 / 3.0,
    1.0 / 2.0,
    2.0 / 3.0,
    1.0,
    3.0 / 2.0,
    2.0,
    3.0,
    4.0,
    8.0,
    16.0,
    32.0,
];

const RATE_EPSILON: f32 = 1e-4;

/// Recorded A-B loop points
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AbLoop {
    state: AbLoopState,
    a: Option<AbLoopPoint>,
    b: Option<AbLoopPoint>,

    /// A loop-back seek was sent and its first position is not back yet
    loop_back_pending: bool,
}

fn next_rate_step(rate: f32, faster: bool) -> Option<f32> {
    if faster {
        RATE_STEPS.iter().copied().find(|step| *step > rate + RATE_EPSILON)
    } else {
        RATE_STEPS.iter().rev().copied().find(|step| *step < rate - RATE_EPSILON)
    }
}

impl PlayerGuard<'_> {
    /// Current playback time
    pub fn time(&self) -> Option<Tick> {
        self.state.time
    }

    /// Current position, 0.0 to 1.0; `None` without a length
    pub fn position(&self) -> Option<f64> {
        self.state.position
    }

    /// Length of the current media; `None` for live or unknown
    pub fn length(&self) -> Option<Tick> {
        self.state.length
    }

    /// Seek to a time
    ///
    /// While stopped the target is recorded and applied when playback starts.
    /// While playing, media that cannot seek ignore the request. `speed` is
    /// handed to the backend unchanged.
    pub fn seek_by_time(&mut self, time: Tick, speed: SeekSpeed, whence: SeekWhence) {
        self.seek(SeekTarget::Time(time), speed, whence);
    }

    /// Seek to a position (fraction of the length)
    pub fn seek_by_pos(&mut self, position: f64, speed: SeekSpeed, whence: SeekWhence) {
        if !position.is_finite() {
            return;
        }
        self.seek(SeekTarget::Position(position), speed, whence);
    }

    /// Precise absolute seek
    pub fn set_time(&mut self, time: Tick) {
        self.seek_by_time(time, SeekSpeed::Precise, SeekWhence::Absolute);
    }

    /// Fast absolute seek
    pub fn set_time_fast(&mut self, time: Tick) {
        self.seek_by_time(time, SeekSpeed::Fast, SeekWhence::Absolute);
    }

    /// Fast relative seek
    pub fn jump_time(&mut self, delta: Tick) {
        self.seek_by_time(delta, SeekSpeed::Fast, SeekWhence::Relative);
    }

    /// Precise seek to a position
    pub fn set_position(&mut self, position: f64) {
        self.seek_by_pos(position, SeekSpeed::Precise, SeekWhence::Absolute);
    }

    /// Fast seek to a position
    pub fn set_position_fast(&mut self, position: f64) {
        self.seek_by_pos(position, SeekSpeed::Fast, SeekWhence::Absolute);
    }

    /// Fast relative position seek
    pub fn jump_pos(&mut self, delta: f64) {
        self.seek_by_pos(delta, SeekSpeed::Fast, SeekWhence::Relative);
    }

    fn seek(&mut self, target: SeekTarget, speed: SeekSpeed, whence: SeekWhence) {
        match self.state.input.as_ref().map(|input| input.opened) {
            None => {
                self.record_start_point(target, speed, whence);
                return;
            }
            // Capabilities are unknown until the media is opened; the
            // worker checks them itself
            Some(false) => debug!("Seek queued until the media is opened"),
            Some(true) if !self.can_seek() => {
                debug!("Seek ignored: media cannot seek");
                return;
            }
            Some(true) => {}
        }
        self.seek_input(target, whence, speed);
    }

    fn record_start_point(&mut self, target: SeekTarget, speed: SeekSpeed, whence: SeekWhence) {
        let previous = self.state.start_point.map(|p| p.target);
        let target = match (whence, target, previous) {
            (SeekWhence::Absolute, target, _) => target,
            (SeekWhence::Relative, SeekTarget::Time(delta), Some(SeekTarget::Time(base))) => {
                SeekTarget::Time(base + delta)
            }
            (SeekWhence::Relative, SeekTarget::Position(delta), Some(SeekTarget::Position(base))) => {
                SeekTarget::Position(base + delta)
            }
            (SeekWhence::Relative, target, _) => target,
        };
        let target = match target {
            SeekTarget::Time(time) => SeekTarget::Time(time.max(0)),
            SeekTarget::Position(pos) => SeekTarget::Position(pos.clamp(0.0, 1.0)),
        };
        debug!("Start point recorded: {:?}", target);
        self.state.start_point = Some(StartPoint { target, speed });
    }

    /// Send a seek to the input; older position reports become stale
    pub(crate) fn seek_input(&mut self, target: SeekTarget, whence: SeekWhence, speed: SeekSpeed) {
        let generation = self.next_seek_generation();
        self.send_input(InputCommand::Seek {
            target,
            whence,
            speed,
            generation,
        });
    }

    pub(crate) fn set_length(&mut self, length: Option<Tick>) {
        if self.state.length == length {
            return;
        }
        self.state.length = length;
        self.emit(|l, p| l.on_length_changed(p, length));
    }

    /// Record a position report and run what depends on the time
    pub(crate) fn update_position(&mut self, time: Tick) {
        let position = self
            .state
            .length
            .filter(|length| *length > 0)
            .map(|length| (time as f64 / length as f64).clamp(0.0, 1.0));
        self.state.time = Some(time);
        self.state.position = position;
        self.emit(|l, p| l.on_position_changed(p, time, position));

        self.update_chapter_for_time(time);

        self.state.ab_loop.loop_back_pending = false;
        let ab_loop = self.state.ab_loop;
        if let (AbLoopState::B, Some(a), Some(b)) = (ab_loop.state, ab_loop.a, ab_loop.b) {
            if time >= b.time {
                debug!("A-B loop: back to {}", a.time);
                self.state.ab_loop.loop_back_pending = true;
                self.seek_input(SeekTarget::Time(a.time), SeekWhence::Absolute, SeekSpeed::Precise);
            }
        }
    }

    /// The end of stream is about to be undone by an A-B loop-back seek
    pub(crate) fn ab_loop_back_pending(&self) -> bool {
        self.state.ab_loop.state == AbLoopState::B && self.state.ab_loop.loop_back_pending
    }

    /// Current playback rate
    pub fn rate(&self) -> f32 {
        self.state.rate
    }

    /// Change the playback rate
    ///
    /// The rate is clamped to `[RATE_MIN, RATE_MAX]` in magnitude. While a
    /// media plays, the change needs the ChangeRate capability, and a
    /// negative rate also needs Rewind. While stopped the rate is only
    /// recorded.
    pub fn change_rate(&mut self, rate: f32) {
        if !rate.is_finite() || rate == 0.0 {
            return;
        }
        let playing = self.state.input.is_some();
        if playing && !self.can_change_rate() {
            debug!("Rate change ignored: media cannot change rate");
            return;
        }
        if playing && rate < 0.0 && !self.can_rewind() {
            debug!("Rate change ignored: media cannot rewind");
            return;
        }

        let rate = rate.signum() * rate.abs().clamp(RATE_MIN, RATE_MAX);
        if (rate - self.state.rate).abs() < RATE_EPSILON {
            return;
        }
        debug!("Rate: {} -> {}", self.state.rate, rate);
        self.state.rate = rate;
        self.send_input(InputCommand::SetRate(rate));
        self.emit(|l, p| l.on_rate_changed(p, rate));
    }

    /// Step to the next faster rate of the rate table
    pub fn increment_rate(&mut self) {
        if let Some(rate) = next_rate_step(self.state.rate, true) {
            self.change_rate(rate);
        }
    }

    /// Step to the next slower rate of the rate table
    pub fn decrement_rate(&mut self) {
        if let Some(rate) = next_rate_step(self.state.rate, false) {
            self.change_rate(rate);
        }
    }

    /// Record an A-B loop point at the current time
    ///
    /// `AbLoopState::A` starts a new loop, `AbLoopState::B` closes it and
    /// activates it. B is ignored when there is no A or when it is not
    /// strictly after A. `AbLoopState::None` resets the loop.
    pub fn set_ab_loop(&mut self, point: AbLoopState) {
        let Some(time) = self.state.time else {
            if point == AbLoopState::None {
                self.reset_ab_loop();
            } else {
                debug!("A-B loop ignored: no valid time");
            }
            return;
        };
        let here = AbLoopPoint {
            time,
            position: self.state.position,
        };

        match point {
            AbLoopState::None => {
                self.reset_ab_loop();
                return;
            }
            AbLoopState::A => {
                self.state.ab_loop = AbLoop {
                    state: AbLoopState::A,
                    a: Some(here),
                    b: None,
                    loop_back_pending: false,
                };
            }
            AbLoopState::B => {
                let Some(a) = self.state.ab_loop.a else {
                    debug!("A-B loop: B recorded without A");
                    return;
                };
                if here.time <= a.time {
                    debug!("A-B loop: B ({}) must be after A ({})", here.time, a.time);
                    return;
                }
                self.state.ab_loop.state = AbLoopState::B;
                self.state.ab_loop.b = Some(here);
            }
        }

        self.emit(|l, p| l.on_ab_loop_changed(p, point, Some(here.time), here.position));
    }

    /// Cancel the A-B loop
    pub fn reset_ab_loop(&mut self) {
        if self.state.ab_loop.state == AbLoopState::None {
            return;
        }
        self.state.ab_loop = AbLoop::default();
        self.emit(|l, p| l.on_ab_loop_changed(p, AbLoopState::None, None, None));
    }

    /// A-B loop state and the points valid for that state
    pub fn ab_loop_state(&self) -> AbLoopStatus {
        let ab_loop = self.state.ab_loop;
        match ab_loop.state {
            AbLoopState::None => AbLoopStatus::default(),
            AbLoopState::A => AbLoopStatus {
                state: AbLoopState::A,
                a: ab_loop.a,
                b: None,
            },
            AbLoopState::B => AbLoopStatus {
                state: AbLoopState::B,
                a: ab_loop.a,
                b: ab_loop.b,
            },
        }
    }

    /// Delay of a category; video has none
    pub fn category_delay(&self, category: TrackCategory) -> Tick {
        match category {
            TrackCategory::Audio => self.state.audio_delay,
            TrackCategory::Subtitle => self.state.subtitle_delay,
            TrackCategory::Video => 0,
        }
    }

    /// Set the audio or subtitle delay
    ///
    /// The delay applies to the current media and is carried to the next
    /// ones. Video delays are not supported and ignored.
    pub fn set_category_delay(&mut self, category: TrackCategory, delay: Tick, whence: SeekWhence) {
        let current = match category {
            TrackCategory::Audio => self.state.audio_delay,
            TrackCategory::Subtitle => self.state.subtitle_delay,
            TrackCategory::Video => {
                debug!("Video delay is not supported");
                return;
            }
        };
        let delay = match whence {
            SeekWhence::Absolute => delay,
            SeekWhence::Relative => current.saturating_add(delay),
        };
        if delay == current {
            return;
        }

        match category {
            TrackCategory::Audio => self.state.audio_delay = delay,
            _ => self.state.subtitle_delay = delay,
        }
        self.send_input(InputCommand::SetDelay(category, delay));
        self.emit(|l, p| l.on_category_delay_changed(p, category, delay));
    }

    pub fn audio_delay(&self) -> Tick {
        self.state.audio_delay
    }

    pub fn set_audio_delay(&mut self, delay: Tick, whence: SeekWhence) {
        self.set_category_delay(TrackCategory::Audio, delay, whence);
    }

    pub fn subtitle_delay(&self) -> Tick {
        self.state.subtitle_delay
    }

    pub fn set_subtitle_delay(&mut self, delay: Tick, whence: SeekWhence) {
        self.set_category_delay(TrackCategory::Subtitle, delay, whence);
    }

    /// Frame rate scale applied to subtitles associated with the media
    pub fn associated_subs_fps(&self) -> f32 {
        self.state.subtitle_fps
    }

    /// Set the associated subtitle frame rate scale; must be positive
    pub fn set_associated_subs_fps(&mut self, fps: f32) {
        if !fps.is_finite() || fps <= 0.0 {
            return;
        }
        if (fps - self.state.subtitle_fps).abs() < f32::EPSILON {
            return;
        }
        self.state.subtitle_fps = fps;
        self.emit(|l, p| l.on_associated_subs_fps_changed(p, fps));
    }
}
