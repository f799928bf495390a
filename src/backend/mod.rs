//! Media backend interface
//!
//! The player core never demuxes or decodes anything itself. A
//! [`MediaBackend`] opens a [`Media`] into a [`MediaSource`], which the input
//! worker drives: it asks the source to demux up to a target time, forwards
//! seeks and selections, and polls it for asynchronous [`SourceEvent`]s.

pub mod mock;

pub use mock::{MockBackend, MockOptions};

use std::collections::BTreeMap;

use crate::media::{EpgEvent, Media, MetaKey};
use crate::player::titles::Title;
use crate::player::tracks::{ProgramDesc, TrackCategory, TrackDesc};
use crate::player::{Capabilities, InputStats, NavigateAction, SeekSpeed, SignalInfo};
use crate::utils::error::{CoreError, Result};
use crate::utils::Tick;

/// Backend trait: turns a media into a playable source
pub trait MediaBackend: Send + Sync {
    /// Open a media
    ///
    /// Called from the input worker thread, without the player lock.
    ///
    /// # Returns
    ///
    /// Returns the opened source or an error; an error puts the player in
    /// the generic error state
    fn open(&self, media: &Media) -> Result<Box<dyn MediaSource>>;
}

/// Everything known about a source right after it was opened
#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    /// Total length, `None` for live or unknown
    pub length: Option<Tick>,

    /// What the source supports
    pub capabilities: Capabilities,

    /// Elementary streams, in presentation order
    pub tracks: Vec<TrackDesc>,

    /// Programs, in presentation order
    pub programs: Vec<ProgramDesc>,

    /// Navigation titles
    pub titles: Vec<Title>,

    /// Metadata found while opening
    pub meta: BTreeMap<MetaKey, String>,
}

/// Result of a demux step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxStatus {
    /// Data was produced up to the requested time
    Ok,

    /// The end of the stream was reached
    Eof,
}

/// A seek request as the source receives it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    /// Absolute target time, already clamped to the media bounds
    pub target: Tick,

    /// Speed/accuracy trade-off chosen by the caller
    pub speed: SeekSpeed,
}

/// Asynchronous notifications emitted by a source
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// Buffering progress, 0.0 to 1.0
    Buffering(f32),

    LengthChanged(Option<Tick>),

    CapabilitiesChanged(Capabilities),

    TrackAdded(TrackDesc),

    /// Source id of the removed track
    TrackRemoved(i32),

    TrackUpdated(TrackDesc),

    ProgramAdded(ProgramDesc),

    /// Group id of the removed program
    ProgramRemoved(i32),

    ProgramUpdated(ProgramDesc),

    /// A new title list replaces the previous one
    TitlesChanged(Vec<Title>),

    Signal(SignalInfo),

    Statistics(InputStats),

    Meta(BTreeMap<MetaKey, String>),

    Epg(Vec<EpgEvent>),

    SubItems(Vec<Media>),
}

/// An opened media, owned by the input worker thread
#[allow(unused_variables)]
pub trait MediaSource: Send {
    /// Description of the source as opened
    fn info(&self) -> SourceInfo;

    /// Produce data up to `until` (media time)
    ///
    /// # Returns
    ///
    /// `DemuxStatus::Eof` once the end is reached; an error is fatal for the
    /// current playback
    fn demux(&mut self, until: Tick) -> Result<DemuxStatus>;

    /// Seek to a target time
    ///
    /// # Returns
    ///
    /// The time the source actually landed on; with `SeekSpeed::Fast` it may
    /// differ from the request
    fn seek(&mut self, request: SeekRequest) -> Result<Tick>;

    /// Pause or resume the source
    fn set_pause(&mut self, paused: bool) -> Result<()> {
        Ok(())
    }

    /// Change the playback rate
    fn set_rate(&mut self, rate: f32) -> Result<()> {
        Ok(())
    }

    /// Select or unselect an elementary stream
    fn select_track(&mut self, source_id: i32, selected: bool) -> Result<()> {
        Ok(())
    }

    /// Select a program by group id
    fn select_program(&mut self, group_id: i32) -> Result<()> {
        Ok(())
    }

    /// Select a title; returns the new playback time
    fn select_title(&mut self, idx: usize) -> Result<Tick> {
        Err(CoreError::backend("source has no titles"))
    }

    /// Select a chapter of the current title; returns the new playback time
    fn select_chapter(&mut self, idx: usize) -> Result<Tick> {
        Err(CoreError::backend("source has no chapters"))
    }

    /// Apply a presentation delay to a category
    fn set_delay(&mut self, category: TrackCategory, delay: Tick) -> Result<()> {
        Ok(())
    }

    /// Menu navigation
    fn navigate(&mut self, action: NavigateAction) -> Result<()> {
        Ok(())
    }

    /// Start or stop recording the stream
    fn set_recording(&mut self, enabled: bool) -> Result<()> {
        Ok(())
    }

    /// Teletext page and transparency
    fn set_teletext(&mut self, page: u32, transparent: bool) -> Result<()> {
        Ok(())
    }

    /// Drain pending asynchronous events
    fn poll_events(&mut self) -> Vec<SourceEvent> {
        Vec::new()
    }
}
