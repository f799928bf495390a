//! CCPlayer core
//!
//! The playback engine behind CCPlayer: a [`Player`] owns the current
//! [`Media`], runs the playback state machine, keeps the track, program and
//! title registries, paces playback time and tells its listeners about every
//! change. Media are opened through a [`MediaBackend`]; the built-in
//! [`MockBackend`] turns `mock://` resources into synthetic sources.
//!
//! ```no_run
//! use ccplayer_core::{Media, Player};
//!
//! let player = Player::new()?;
//! {
//!     let mut guard = player.lock();
//!     guard.set_current_media(Some(Media::new("mock://length=5s")));
//!     guard.start()?;
//! }
//! # Ok::<(), ccplayer_core::CoreError>(())
//! ```

pub mod backend;
pub mod media;
pub mod output;
pub mod player;
pub mod utils;

pub use backend::{MediaBackend, MediaSource, MockBackend, SourceEvent, SourceInfo};
pub use media::{EpgEvent, Media, MetaKey};
pub use output::{AoutListener, AudioOutputControl, VideoOutputControl, VoutListener};
pub use player::{
    AbLoopState, AbLoopStatus, Capabilities, EsId, MediaProvider, MediaStoppedAction,
    PlaybackError, Player, PlayerBuilder, PlayerGuard, PlayerListener, SeekSpeed, SeekWhence,
    State, Track, TrackCategory,
};
pub use utils::{Config, CoreError, PlayerConfig, Result, Tick};
