//! Player core
//!
//! The [`Player`] owns the current media, the playback state machine, the
//! track/program/title registries and the timing state. All of it sits behind
//! a single mutex: callers take the lock with [`Player::lock`] and call every
//! accessor and mutator on the returned [`PlayerGuard`], so several operations
//! can be composed atomically.
//!
//! Player listeners are invoked with the lock held and receive the guard.
//! Audio and video output controls have their own locks and are reached
//! through [`Player::audio`] / [`Player::video`] without the player lock.

mod extras;
mod input;
pub mod listener;
mod state;
mod timing;
pub mod titles;
pub mod tracks;

pub use listener::{ListAction, ListenerId, PlayerListener, VoutAction};
pub use parking_lot::Condvar;
pub use timing::{RATE_MAX, RATE_MIN};
pub use titles::{Chapter, Title, TitleFlags, TitleList};
pub use tracks::{
    EsFormat, EsId, Program, ProgramDesc, SelectPolicy, Track, TrackCategory, TrackDesc,
};

use bitflags::bitflags;
use log::info;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{MediaBackend, MockBackend};
use crate::media::Media;
use crate::output::{AudioOutputControl, VideoOutputControl};
use crate::utils::config::{Config, PlayerConfig};
use crate::utils::error::{CoreError, Result};
use crate::utils::Tick;

use state::PlayerState;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum State {
    /// No media is playing (initial state)
    Stopped,

    /// Playback was requested, the media is being opened
    Started,

    /// Media is playing
    Playing,

    /// Media is paused
    Paused,

    /// Playback is being torn down
    Stopping,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Stopped => "stopped",
            State::Started => "started",
            State::Playing => "playing",
            State::Paused => "paused",
            State::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Playback error state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PlaybackError {
    #[default]
    None,

    /// The media failed to open or play
    Generic,
}

bitflags! {
    /// What the current media supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        const SEEK = 1;
        const PAUSE = 2;
        const CHANGE_RATE = 4;
        const REWIND = 8;
    }
}

/// What to do when a media reaches its end and no next media follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStoppedAction {
    /// Go on with the next media, or stop when there is none
    #[default]
    Continue,

    /// Pause on the last frame
    Pause,

    /// Stop without asking for a next media
    Stop,

    /// Stop and request the application to exit
    Exit,
}

impl FromStr for MediaStoppedAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "continue" => Ok(MediaStoppedAction::Continue),
            "pause" => Ok(MediaStoppedAction::Pause),
            "stop" => Ok(MediaStoppedAction::Stop),
            "exit" => Ok(MediaStoppedAction::Exit),
            other => Err(CoreError::InvalidInput(format!(
                "unknown media stopped action: {}",
                other
            ))),
        }
    }
}

/// Seek accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SeekSpeed {
    /// Land exactly on the requested time
    #[default]
    Precise,

    /// Land on a nearby keyframe, faster
    Fast,
}

/// How a seek target is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SeekWhence {
    #[default]
    Absolute,

    /// Offset from the current time or position
    Relative,
}

/// A-B loop progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum AbLoopState {
    #[default]
    None,

    /// Only the A point is recorded
    A,

    /// Both points are recorded, the loop is active
    B,
}

/// One recorded A-B loop point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AbLoopPoint {
    pub time: Tick,

    /// `None` when the media has no length
    pub position: Option<f64>,
}

/// A-B loop state with the points that are valid for it
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AbLoopStatus {
    pub state: AbLoopState,
    pub a: Option<AbLoopPoint>,
    pub b: Option<AbLoopPoint>,
}

/// Menu navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NavigateAction {
    Activate,
    Up,
    Down,
    Left,
    Right,
    Popup,
    Menu,
}

/// A remote renderer (cast target)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererItem {
    pub name: String,

    /// Renderer type, such as `chromecast`
    pub kind: String,

    /// Address the stream is sent to
    pub address: String,
}

/// Signal quality of a broadcast source
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SignalInfo {
    pub quality: f32,
    pub strength: f32,
}

/// Input statistics reported by the source
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct InputStats {
    pub read_bytes: u64,
    pub input_bitrate: f32,
    pub demux_read_bytes: u64,
    pub demux_bitrate: f32,
    pub decoded_video: u64,
    pub decoded_audio: u64,
    pub displayed_pictures: u64,
    pub lost_pictures: u64,
    pub played_abuffers: u64,
    pub lost_abuffers: u64,
}

static NEXT_VOUT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle of a video output attached to a selected video track
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoutHandle {
    id: u64,
}

impl VoutHandle {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_VOUT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Unique id of this output
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Supplier of the media that follows the current one
///
/// Called with the player locked, from any thread. The returned media is
/// owned by the player; keep a clone if you need it afterwards.
pub trait MediaProvider: Send + Sync {
    /// Next media to play, or `None` to end playback
    ///
    /// # Arguments
    ///
    /// * `player` - The locked player
    fn get_next(&self, player: &mut PlayerGuard<'_>) -> Option<Media>;
}

impl<F> MediaProvider for F
where
    F: Fn(&mut PlayerGuard<'_>) -> Option<Media> + Send + Sync,
{
    fn get_next(&self, player: &mut PlayerGuard<'_>) -> Option<Media> {
        self(player)
    }
}

/// State shared between the player handle and its input workers
pub(crate) struct Shared {
    pub(crate) state: Mutex<PlayerState>,

    /// Signalled each time an input worker terminates
    pub(crate) teardown: Condvar,

    pub(crate) config: PlayerConfig,
    pub(crate) backend: Arc<dyn MediaBackend>,
    pub(crate) audio: AudioOutputControl,
    pub(crate) video: VideoOutputControl,
}

/// Player builder
pub struct PlayerBuilder {
    config: Config,
    backend: Option<Arc<dyn MediaBackend>>,
    provider: Option<Arc<dyn MediaProvider>>,
}

impl PlayerBuilder {
    /// Create a builder with the default configuration and the mock backend
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            backend: None,
            provider: None,
        }
    }

    /// Use a full configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replace only the player section of the configuration
    pub fn with_player_config(mut self, config: PlayerConfig) -> Self {
        self.config.player = config;
        self
    }

    /// Set the media backend
    pub fn with_backend(mut self, backend: Arc<dyn MediaBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the media provider used for continuation
    pub fn with_media_provider(mut self, provider: Arc<dyn MediaProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build the player
    pub fn build(self) -> Result<Player> {
        self.config.validate()?;

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MockBackend::new()));
        let shared = Shared {
            state: Mutex::new(PlayerState::new(&self.config.player, self.provider)),
            teardown: Condvar::new(),
            audio: AudioOutputControl::new(&self.config.audio),
            video: VideoOutputControl::new(&self.config.video),
            config: self.config.player,
            backend,
        };

        info!(
            "Player created (gapless: {}, tick: {} ms)",
            shared.config.gapless, shared.config.tick_interval_ms
        );
        Ok(Player {
            shared: Arc::new(shared),
        })
    }
}

impl Default for PlayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The player handle
///
/// Dropping the player (or calling [`Player::delete`]) stops the current
/// media and blocks until every input worker has terminated. Do not drop it
/// from a thread that must service player callbacks.
pub struct Player {
    shared: Arc<Shared>,
}

impl Player {
    /// Create a player with the default configuration and the mock backend
    pub fn new() -> Result<Self> {
        PlayerBuilder::new().build()
    }

    /// Create a builder
    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::new()
    }

    /// Lock the player
    ///
    /// Never call this from a player listener callback: the callback already
    /// runs under the lock and gets the guard as argument.
    pub fn lock(&self) -> PlayerGuard<'_> {
        PlayerGuard::new(&self.shared)
    }

    /// Audio output control, usable without the player lock
    pub fn audio(&self) -> &AudioOutputControl {
        &self.shared.audio
    }

    /// Video output control, usable without the player lock
    pub fn video(&self) -> &VideoOutputControl {
        &self.shared.video
    }

    /// Player configuration
    pub fn config(&self) -> &PlayerConfig {
        &self.shared.config
    }

    /// Destroy the player, blocking until playback is fully torn down
    pub fn delete(self) {
        drop(self);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        state::shutdown(&self.shared);
    }
}

/// Proof that the player lock is held
///
/// Every player accessor lives on the guard. Shared handles obtained through
/// it (`Media`, `EsId`, `Arc<TitleList>`) may be cloned and kept after the
/// guard is dropped; plain references may not.
pub struct PlayerGuard<'a> {
    shared: &'a Arc<Shared>,
    state: MutexGuard<'a, PlayerState>,
}

impl<'a> PlayerGuard<'a> {
    pub(crate) fn new(shared: &'a Arc<Shared>) -> Self {
        Self {
            shared,
            state: shared.state.lock(),
        }
    }

    /// Register a player listener; callbacks start with the next event
    pub fn add_listener(&mut self, listener: Arc<dyn PlayerListener>) -> ListenerId {
        self.state.listeners.add(listener)
    }

    /// Unregister a player listener; unknown ids are ignored
    pub fn remove_listener(&mut self, id: ListenerId) {
        self.state.listeners.remove(id);
    }

    /// Release the lock, wait on `cond`, then take the lock back
    ///
    /// Whoever signals `cond` is expected to do so from a player listener,
    /// so the wake-up is ordered with the player change that caused it.
    pub fn cond_wait(&mut self, cond: &Condvar) {
        cond.wait(&mut self.state);
    }

    /// Like [`PlayerGuard::cond_wait`] with a timeout
    ///
    /// # Returns
    ///
    /// True when the timeout elapsed without a notification
    pub fn cond_wait_timeout(&mut self, cond: &Condvar, timeout: Duration) -> bool {
        cond.wait_for(&mut self.state, timeout).timed_out()
    }

    /// Player configuration
    pub fn config(&self) -> &PlayerConfig {
        &self.shared.config
    }

    /// Dispatch an event to every player listener, in registration order
    ///
    /// The listener list is snapshotted first, so callbacks may add or remove
    /// listeners; changes apply from the next event on.
    pub(crate) fn emit<F>(&mut self, f: F)
    where
        F: Fn(&dyn PlayerListener, &mut PlayerGuard<'a>),
    {
        let listeners = self.state.listeners.snapshot();
        for listener in &listeners {
            f(listener.as_ref(), &mut *self);
        }
    }
}
