//! Listener registries and the in-lock player listener contract
//!
//! Player listeners are called with the player lock held. Every callback
//! receives the live [`PlayerGuard`], which is both the proof that the lock is
//! held and the way to call back into the player from inside a callback.
//! Callbacks may run on any thread, including the thread whose call triggered
//! the event, so a callback must never try to lock the player again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::media::Media;
use crate::player::titles::{Chapter, Title, TitleList};
use crate::player::tracks::{EsId, Program, Track, TrackCategory};
use crate::player::{
    AbLoopState, Capabilities, InputStats, MediaStoppedAction, PlaybackError, PlayerGuard,
    RendererItem, SignalInfo, State, VoutHandle,
};
use crate::utils::Tick;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle returned when a listener is added, used only to remove it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Action tag for list-changed events
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ListAction {
    Added,
    Removed,
    Updated,
}

/// Video output lifecycle action for vout-changed events
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum VoutAction {
    Started,
    Stopped,
}

/// Ordered set of listeners of one kind
///
/// Dispatch goes through [`ListenerRegistry::snapshot`] so that a callback
/// may add or remove listeners without invalidating the iteration.
pub(crate) struct ListenerRegistry<L: ?Sized> {
    entries: Vec<(ListenerId, Arc<L>)>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId::next();
        self.entries.push((id, listener));
        id
    }

    /// Returns false when the id is unknown (already removed)
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Listeners in registration order
    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Player event callbacks, invoked with the player locked
///
/// All methods have empty default bodies; implement only the families you
/// need. Implementations use interior mutability for their own state.
#[allow(unused_variables)]
pub trait PlayerListener: Send + Sync {
    /// The current media changed (synchronously or at the end of a stop)
    fn on_current_media_changed(&self, player: &mut PlayerGuard<'_>, media: Option<&Media>) {}

    /// The playback state changed
    fn on_state_changed(&self, player: &mut PlayerGuard<'_>, state: State) {}

    /// The error state changed
    fn on_error_changed(&self, player: &mut PlayerGuard<'_>, error: PlaybackError) {}

    /// Buffering progress, from 0.0 to 1.0
    fn on_buffering_changed(&self, player: &mut PlayerGuard<'_>, buffering: f32) {}

    /// The playback rate changed
    fn on_rate_changed(&self, player: &mut PlayerGuard<'_>, rate: f32) {}

    /// The capabilities of the current media changed
    fn on_capabilities_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        old: Capabilities,
        new: Capabilities,
    ) {
    }

    /// Playback time advanced or jumped; `position` is invalid without a length
    fn on_position_changed(&self, player: &mut PlayerGuard<'_>, time: Tick, position: Option<f64>) {}

    /// The media length changed
    fn on_length_changed(&self, player: &mut PlayerGuard<'_>, length: Option<Tick>) {}

    /// A track was added, removed or updated; on removal the track is still
    /// listed while the callback runs and gone right after
    fn on_track_list_changed(&self, player: &mut PlayerGuard<'_>, action: ListAction, track: &Track) {}

    /// Track selection changed within one category
    fn on_track_selection_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        unselected: Option<&EsId>,
        selected: Option<&EsId>,
    ) {
    }

    /// A program was added, removed or updated
    fn on_program_list_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        action: ListAction,
        program: &Program,
    ) {
    }

    /// Program selection changed
    fn on_program_selection_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        unselected: Option<i32>,
        selected: Option<i32>,
    ) {
    }

    /// A new title list was published (or removed)
    fn on_titles_changed(&self, player: &mut PlayerGuard<'_>, titles: Option<&Arc<TitleList>>) {}

    /// A title was selected
    fn on_title_selection_changed(&self, player: &mut PlayerGuard<'_>, title: &Title, idx: usize) {}

    /// A chapter was selected
    fn on_chapter_selection_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        title: &Title,
        title_idx: usize,
        chapter: &Chapter,
        chapter_idx: usize,
    ) {
    }

    /// A teletext menu became available or went away
    fn on_teletext_menu_changed(&self, player: &mut PlayerGuard<'_>, has_menu: bool) {}

    /// Teletext was enabled or disabled
    fn on_teletext_enabled_changed(&self, player: &mut PlayerGuard<'_>, enabled: bool) {}

    /// The teletext page changed
    fn on_teletext_page_changed(&self, player: &mut PlayerGuard<'_>, page: u32) {}

    /// Teletext transparency changed
    fn on_teletext_transparency_changed(&self, player: &mut PlayerGuard<'_>, enabled: bool) {}

    /// The audio or subtitle delay changed
    fn on_category_delay_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        category: TrackCategory,
        delay: Tick,
    ) {
    }

    /// The frame rate used for associated subtitles changed
    fn on_associated_subs_fps_changed(&self, player: &mut PlayerGuard<'_>, fps: f32) {}

    /// The renderer changed; `None` means local playback
    fn on_renderer_changed(&self, player: &mut PlayerGuard<'_>, renderer: Option<&RendererItem>) {}

    /// Recording started or stopped
    fn on_recording_changed(&self, player: &mut PlayerGuard<'_>, recording: bool) {}

    /// Signal quality/strength reported by the source
    fn on_signal_changed(&self, player: &mut PlayerGuard<'_>, signal: &SignalInfo) {}

    /// New input statistics
    fn on_statistics_changed(&self, player: &mut PlayerGuard<'_>, stats: &InputStats) {}

    /// The A-B loop state changed; `time`/`position` belong to the point that
    /// was just recorded
    fn on_ab_loop_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        state: AbLoopState,
        time: Option<Tick>,
        position: Option<f64>,
    ) {
    }

    /// The media-stopped action changed
    fn on_media_stopped_action_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        action: MediaStoppedAction,
    ) {
    }

    /// Metadata of the current media changed
    fn on_media_meta_changed(&self, player: &mut PlayerGuard<'_>, media: &Media) {}

    /// Program guide of the current media changed
    fn on_media_epg_changed(&self, player: &mut PlayerGuard<'_>, media: &Media) {}

    /// Sub-items were discovered in the current media
    fn on_media_subitems_changed(&self, player: &mut PlayerGuard<'_>, media: &Media, subitems: &[Media]) {}

    /// A video output started or stopped for a video track
    fn on_vout_changed(
        &self,
        player: &mut PlayerGuard<'_>,
        action: VoutAction,
        vout: &VoutHandle,
        es_id: &EsId,
    ) {
    }

    /// The number of cork requests from the audio system changed
    fn on_cork_changed(&self, player: &mut PlayerGuard<'_>, cork_count: u32) {}

    /// Playback ended with the Exit action; the application should quit
    fn on_exit_requested(&self, player: &mut PlayerGuard<'_>) {}
}
