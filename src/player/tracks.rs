//! Elementary stream and program registries
//!
//! Tracks are partitioned by [`TrackCategory`]. Every track carries an
//! [`EsId`]: a shared handle that stays valid as long as someone holds it, but
//! that only designates a live track while the registry entry exists. Removal
//! is always announced (unselect, then `ListAction::Removed`) before the entry
//! is dropped.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::player::input::InputCommand;
use crate::player::listener::ListAction;
use crate::player::PlayerGuard;

/// Category of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackCategory {
    Video,
    Audio,
    Subtitle,
}

impl TrackCategory {
    /// All categories, in registry order
    pub const ALL: [TrackCategory; 3] = [
        TrackCategory::Video,
        TrackCategory::Audio,
        TrackCategory::Subtitle,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            TrackCategory::Video => 0,
            TrackCategory::Audio => 1,
            TrackCategory::Subtitle => 2,
        }
    }

    /// Lowercase name, also used in `EsId` string ids
    pub fn as_str(self) -> &'static str {
        match self {
            TrackCategory::Video => "video",
            TrackCategory::Audio => "audio",
            TrackCategory::Subtitle => "subtitle",
        }
    }

    /// How many tracks of this category may be selected at once
    pub fn max_selected(self) -> usize {
        match self {
            TrackCategory::Subtitle => 2,
            _ => 1,
        }
    }
}

/// Format descriptor of an elementary stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsFormat {
    /// Track category
    pub category: TrackCategory,

    /// Codec name (`"h264"`, `"opus"`, `"telx"`, ...)
    pub codec: String,

    /// Language code, if known
    pub language: Option<String>,

    /// Free form description
    pub description: Option<String>,
}

impl EsFormat {
    /// Create a format with no language or description
    pub fn new<S: Into<String>>(category: TrackCategory, codec: S) -> Self {
        Self {
            category,
            codec: codec.into(),
            language: None,
            description: None,
        }
    }

    /// Set the language
    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the description
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True for teletext subtitle streams
    pub fn is_teletext(&self) -> bool {
        self.category == TrackCategory::Subtitle && self.codec.eq_ignore_ascii_case("telx")
    }

    fn matches_language(&self, wanted: &str) -> bool {
        self.language
            .as_deref()
            .is_some_and(|lang| lang.eq_ignore_ascii_case(wanted))
    }
}

struct EsIdInner {
    source_id: i32,
    category: TrackCategory,
    str_id: String,
}

/// Stable identifier of an elementary stream
///
/// Cloning is cheap. Two ids are equal only if they come from the same
/// registry entry, even when their source ids match.
#[derive(Clone)]
pub struct EsId(Arc<EsIdInner>);

impl EsId {
    pub(crate) fn new(source_id: i32, category: TrackCategory) -> Self {
        EsId(Arc::new(EsIdInner {
            source_id,
            category,
            str_id: format!("{}/{}", category.as_str(), source_id),
        }))
    }

    /// Identifier of the stream inside its source
    pub fn source_id(&self) -> i32 {
        self.0.source_id
    }

    /// Category of the stream
    pub fn category(&self) -> TrackCategory {
        self.0.category
    }

    /// Human readable id, such as `audio/2`
    pub fn str_id(&self) -> &str {
        &self.0.str_id
    }
}

impl PartialEq for EsId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EsId {}

impl Hash for EsId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for EsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EsId({})", self.0.str_id)
    }
}

impl fmt::Display for EsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.str_id)
    }
}

/// A track as listed by the player
#[derive(Debug, Clone)]
pub struct Track {
    /// Stable identifier
    pub es_id: EsId,

    /// Display name
    pub name: String,

    /// Format descriptor
    pub format: EsFormat,

    /// Selection flag
    pub selected: bool,
}

impl Track {
    /// Category of the track
    pub fn category(&self) -> TrackCategory {
        self.format.category
    }
}

/// A track as described by a media source
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDesc {
    /// Identifier inside the source, unique across categories
    pub source_id: i32,

    /// Display name
    pub name: String,

    /// Format descriptor
    pub format: EsFormat,
}

/// A program (group of elementary streams)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Program {
    /// Group id
    pub group_id: i32,

    /// Display name
    pub name: String,

    /// Selection flag
    pub selected: bool,

    /// Whether the program is scrambled
    pub scrambled: bool,
}

/// A program as described by a media source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDesc {
    pub group_id: i32,
    pub name: String,
    pub scrambled: bool,

    /// The source plays this program by default
    pub selected: bool,
}

/// How a track selection treats the other tracks of its category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectPolicy {
    /// Unselect every other track of the category
    #[default]
    Exclusive,

    /// Keep other tracks when the category allows several selections
    Simultaneous,
}

/// Tracks of the current media, one ordered list per category
#[derive(Default)]
pub(crate) struct TrackRegistry {
    lists: [Vec<Track>; 3],
}

impl TrackRegistry {
    pub(crate) fn list(&self, category: TrackCategory) -> &[Track] {
        &self.lists[category.index()]
    }

    pub(crate) fn find(&self, es_id: &EsId) -> Option<&Track> {
        self.list(es_id.category())
            .iter()
            .find(|t| t.es_id == *es_id)
    }

    fn find_mut(&mut self, es_id: &EsId) -> Option<&mut Track> {
        self.lists[es_id.category().index()]
            .iter_mut()
            .find(|t| t.es_id == *es_id)
    }

    pub(crate) fn find_by_source_id(&self, source_id: i32) -> Option<&Track> {
        self.lists
            .iter()
            .flatten()
            .find(|t| t.es_id.source_id() == source_id)
    }

    pub(crate) fn selected_ids(&self, category: TrackCategory) -> Vec<EsId> {
        self.list(category)
            .iter()
            .filter(|t| t.selected)
            .map(|t| t.es_id.clone())
            .collect()
    }

    fn push(&mut self, track: Track) {
        self.lists[track.category().index()].push(track);
    }

    fn remove(&mut self, es_id: &EsId) -> Option<Track> {
        let list = &mut self.lists[es_id.category().index()];
        let idx = list.iter().position(|t| t.es_id == *es_id)?;
        Some(list.remove(idx))
    }

    pub(crate) fn all(&self) -> impl Iterator<Item = &Track> {
        self.lists.iter().flatten()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }
}

/// Programs of the current media
#[derive(Default)]
pub(crate) struct ProgramRegistry {
    programs: Vec<Program>,
}

impl ProgramRegistry {
    pub(crate) fn list(&self) -> &[Program] {
        &self.programs
    }

    pub(crate) fn find(&self, group_id: i32) -> Option<&Program> {
        self.programs.iter().find(|p| p.group_id == group_id)
    }

    pub(crate) fn selected_id(&self) -> Option<i32> {
        self.programs.iter().find(|p| p.selected).map(|p| p.group_id)
    }
}

/// Index of the next element when cycling, wrapping at both ends
fn cycle_index(current: Option<usize>, len: usize, forward: bool) -> usize {
    match (current, forward) {
        (None, true) => 0,
        (None, false) => len - 1,
        (Some(i), true) => (i + 1) % len,
        (Some(i), false) => (i + len - 1) % len,
    }
}

impl PlayerGuard<'_> {
    /// Number of tracks in a category
    pub fn track_count(&self, category: TrackCategory) -> usize {
        self.state.tracks.list(category).len()
    }

    /// Track at an index of a category
    pub fn track_at(&self, category: TrackCategory, idx: usize) -> Option<&Track> {
        self.state.tracks.list(category).get(idx)
    }

    /// All tracks of a category, in order
    pub fn tracks(&self, category: TrackCategory) -> &[Track] {
        self.state.tracks.list(category)
    }

    /// Look up a track by id; `None` once the track was removed
    pub fn track(&self, es_id: &EsId) -> Option<&Track> {
        self.state.tracks.find(es_id)
    }

    /// First selected track of a category
    pub fn selected_track(&self, category: TrackCategory) -> Option<&Track> {
        self.state.tracks.list(category).iter().find(|t| t.selected)
    }

    /// Select a track
    ///
    /// Unknown ids and already selected tracks are ignored. With
    /// `SelectPolicy::Exclusive`, or when the category is already at its
    /// selection limit, the other tracks of the category are unselected.
    pub fn select_track(&mut self, es_id: &EsId, policy: SelectPolicy) {
        let Some(track) = self.state.tracks.find(es_id) else {
            debug!("select_track: unknown track {}", es_id);
            return;
        };
        if track.selected {
            return;
        }

        let category = track.category();
        let selected = self.state.tracks.selected_ids(category);
        let keep_others =
            policy == SelectPolicy::Simultaneous && selected.len() < category.max_selected();

        let replaced = if keep_others {
            None
        } else {
            let mut selected = selected;
            let last = selected.pop();
            for other in selected {
                self.commit_track_selection(Some(other), None);
            }
            last
        };

        self.commit_track_selection(replaced, Some(es_id.clone()));
    }

    /// Unselect a track; unknown or unselected tracks are ignored
    pub fn unselect_track(&mut self, es_id: &EsId) {
        match self.state.tracks.find(es_id) {
            Some(track) if track.selected => {
                self.commit_track_selection(Some(es_id.clone()), None);
            }
            _ => {}
        }
    }

    /// Unselect every track of a category
    pub fn unselect_track_category(&mut self, category: TrackCategory) {
        for es_id in self.state.tracks.selected_ids(category) {
            self.unselect_track(&es_id);
        }
    }

    /// Select the track after the selected one, wrapping around
    pub fn select_next_track(&mut self, category: TrackCategory) {
        self.cycle_track(category, true);
    }

    /// Select the track before the selected one, wrapping around
    pub fn select_prev_track(&mut self, category: TrackCategory) {
        self.cycle_track(category, false);
    }

    fn cycle_track(&mut self, category: TrackCategory, forward: bool) {
        let list = self.state.tracks.list(category);
        if list.is_empty() {
            return;
        }
        // With several tracks selected, step away from the outermost one
        let current = if forward {
            list.iter().rposition(|t| t.selected)
        } else {
            list.iter().position(|t| t.selected)
        };
        let idx = cycle_index(current, list.len(), forward);
        let es_id = list[idx].es_id.clone();
        if !list[idx].selected {
            self.select_track(&es_id, SelectPolicy::Exclusive);
            return;
        }

        // Landed on a selected track: keep it alone
        for other in self.state.tracks.selected_ids(category) {
            if other != es_id {
                self.unselect_track(&other);
            }
        }
    }

    /// Disable subtitles, or re-enable the last disabled subtitle track
    ///
    /// Without a remembered track the first subtitle track is enabled.
    pub fn toggle_subtitle(&mut self) {
        let selected = self.state.tracks.selected_ids(TrackCategory::Subtitle);
        if !selected.is_empty() {
            for es_id in selected {
                self.unselect_track(&es_id);
            }
            return;
        }

        let remembered = self
            .state
            .last_subtitle
            .clone()
            .filter(|es_id| self.state.tracks.find(es_id).is_some());
        let target = remembered.or_else(|| {
            self.state
                .tracks
                .list(TrackCategory::Subtitle)
                .first()
                .map(|t| t.es_id.clone())
        });
        if let Some(es_id) = target {
            self.select_track(&es_id, SelectPolicy::Exclusive);
        }
    }

    /// Set the preferred language of a category
    ///
    /// `language` is a comma separated list of language codes, matched
    /// case-insensitively in order. The preference is kept for every media
    /// opened afterwards and applied to the current one right away. `None`
    /// or an empty string clears it.
    pub fn select_default_track(&mut self, category: TrackCategory, language: Option<&str>) {
        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned);
        debug!("Default {} language: {:?}", category.as_str(), language);
        self.state.track_languages[category.index()] = language;

        if let Some(es_id) = self.preferred_track(category) {
            self.select_track(&es_id, SelectPolicy::Exclusive);
        }
    }

    /// The language preference of a category
    pub fn default_track_language(&self, category: TrackCategory) -> Option<&str> {
        self.state.track_languages[category.index()].as_deref()
    }

    fn preferred_track(&self, category: TrackCategory) -> Option<EsId> {
        let pref = self.state.track_languages[category.index()].as_deref()?;
        let list = self.state.tracks.list(category);
        pref.split(',')
            .map(str::trim)
            .filter(|wanted| !wanted.is_empty())
            .find_map(|wanted| list.iter().find(|t| t.format.matches_language(wanted)))
            .map(|t| t.es_id.clone())
    }

    fn default_track(&self, category: TrackCategory) -> Option<EsId> {
        self.preferred_track(category).or_else(|| match category {
            TrackCategory::Subtitle => None,
            _ => self
                .state
                .tracks
                .list(category)
                .first()
                .map(|t| t.es_id.clone()),
        })
    }

    /// Apply flags, forward to the input, notify, then run side effects
    fn commit_track_selection(&mut self, unselected: Option<EsId>, selected: Option<EsId>) {
        for (es_id, flag) in [(&unselected, false), (&selected, true)] {
            let Some(es_id) = es_id else { continue };
            if let Some(track) = self.state.tracks.find_mut(es_id) {
                track.selected = flag;
            }
            self.send_input(InputCommand::SelectTrack {
                source_id: es_id.source_id(),
                selected: flag,
            });
        }

        self.emit(|l, p| l.on_track_selection_changed(p, unselected.as_ref(), selected.as_ref()));

        if let Some(es_id) = &unselected {
            self.track_unselected(es_id);
        }
        if let Some(es_id) = &selected {
            self.track_selected(es_id);
        }
    }

    fn track_selected(&mut self, es_id: &EsId) {
        match es_id.category() {
            TrackCategory::Video => self.start_vout(es_id),
            TrackCategory::Subtitle => {
                let teletext = self
                    .state
                    .tracks
                    .find(es_id)
                    .is_some_and(|t| t.format.is_teletext());
                if teletext {
                    self.teletext_selection_changed(true);
                }
            }
            TrackCategory::Audio => {}
        }
    }

    fn track_unselected(&mut self, es_id: &EsId) {
        match es_id.category() {
            TrackCategory::Video => self.stop_vout(es_id),
            TrackCategory::Subtitle => {
                self.state.last_subtitle = Some(es_id.clone());
                let teletext = self
                    .state
                    .tracks
                    .find(es_id)
                    .is_some_and(|t| t.format.is_teletext());
                if teletext {
                    self.teletext_selection_changed(false);
                }
            }
            TrackCategory::Audio => {}
        }
    }

    /// Register a track reported by the source
    ///
    /// With `auto_select`, the track is selected when its category has no
    /// selection yet and it is the default choice for that category.
    pub(crate) fn add_track(&mut self, desc: TrackDesc, auto_select: bool) {
        if self.state.tracks.find_by_source_id(desc.source_id).is_some() {
            self.update_track(desc);
            return;
        }

        let category = desc.format.category;
        let teletext = desc.format.is_teletext();
        let track = Track {
            es_id: EsId::new(desc.source_id, category),
            name: desc.name,
            format: desc.format,
            selected: false,
        };
        debug!("Track added: {} ({})", track.es_id, track.name);
        self.state.tracks.push(track.clone());
        self.emit(|l, p| l.on_track_list_changed(p, ListAction::Added, &track));

        if teletext {
            self.update_teletext_menu();
        }

        if auto_select && self.state.tracks.selected_ids(category).is_empty() {
            if self.default_track(category).as_ref() == Some(&track.es_id) {
                self.select_track(&track.es_id, SelectPolicy::Exclusive);
            }
        }
    }

    /// Update the name or format of a listed track
    pub(crate) fn update_track(&mut self, desc: TrackDesc) {
        let Some(es_id) = self
            .state
            .tracks
            .find_by_source_id(desc.source_id)
            .map(|t| t.es_id.clone())
        else {
            return;
        };
        let Some(track) = self.state.tracks.find_mut(&es_id) else {
            return;
        };
        if track.format.category != desc.format.category {
            debug!("Ignoring category change of track {}", es_id);
            return;
        }
        track.name = desc.name;
        track.format = desc.format;
        let track = track.clone();
        self.emit(|l, p| l.on_track_list_changed(p, ListAction::Updated, &track));
        self.update_teletext_menu();
    }

    /// Announce and drop a track
    pub(crate) fn remove_track(&mut self, source_id: i32) {
        let Some(track) = self.state.tracks.find_by_source_id(source_id).cloned() else {
            return;
        };
        if track.selected {
            self.commit_track_selection(Some(track.es_id.clone()), None);
        }
        self.emit(|l, p| l.on_track_list_changed(p, ListAction::Removed, &track));
        self.state.tracks.remove(&track.es_id);
        debug!("Track removed: {}", track.es_id);

        if self.state.last_subtitle.as_ref() == Some(&track.es_id) {
            self.state.last_subtitle = None;
        }
        if track.format.is_teletext() {
            self.update_teletext_menu();
        }
    }

    /// Announce and drop every track, unselecting first
    pub(crate) fn clear_tracks(&mut self) {
        let source_ids: Vec<i32> = self
            .state
            .tracks
            .all()
            .map(|t| t.es_id.source_id())
            .collect();
        for source_id in source_ids {
            self.remove_track(source_id);
        }
        self.state.last_subtitle = None;
    }

    /// Select the default track of every category that has no selection
    pub(crate) fn select_default_tracks(&mut self) {
        for category in TrackCategory::ALL {
            if !self.state.tracks.selected_ids(category).is_empty() {
                continue;
            }
            if let Some(es_id) = self.default_track(category) {
                self.select_track(&es_id, SelectPolicy::Exclusive);
            }
        }
    }

    /// Number of programs
    pub fn program_count(&self) -> usize {
        self.state.programs.list().len()
    }

    /// Program at an index
    pub fn program_at(&self, idx: usize) -> Option<&Program> {
        self.state.programs.list().get(idx)
    }

    /// All programs, in order
    pub fn programs(&self) -> &[Program] {
        self.state.programs.list()
    }

    /// Look up a program by group id
    pub fn program(&self, group_id: i32) -> Option<&Program> {
        self.state.programs.find(group_id)
    }

    /// The selected program
    pub fn selected_program(&self) -> Option<&Program> {
        self.state.programs.list().iter().find(|p| p.selected)
    }

    /// Select a program by group id; unknown or already selected ids are ignored
    pub fn select_program(&mut self, group_id: i32) {
        match self.state.programs.find(group_id) {
            Some(program) if !program.selected => self.mark_program_selected(group_id, true),
            Some(_) => {}
            None => debug!("select_program: unknown program {}", group_id),
        }
    }

    /// Select the next (`forward`) or previous program, wrapping around
    pub fn cycle_program(&mut self, forward: bool) {
        let list = self.state.programs.list();
        if list.is_empty() {
            return;
        }
        let current = list.iter().position(|p| p.selected);
        let idx = cycle_index(current, list.len(), forward);
        if Some(idx) == current {
            return;
        }
        let group_id = list[idx].group_id;
        self.select_program(group_id);
    }

    /// Select the next program, wrapping around
    pub fn select_next_program(&mut self) {
        self.cycle_program(true);
    }

    /// Select the previous program, wrapping around
    pub fn select_prev_program(&mut self) {
        self.cycle_program(false);
    }

    fn mark_program_selected(&mut self, group_id: i32, notify_source: bool) {
        let old = self.state.programs.selected_id();
        for program in &mut self.state.programs.programs {
            program.selected = program.group_id == group_id;
        }
        if notify_source {
            self.send_input(InputCommand::SelectProgram(group_id));
        }
        debug!("Program selected: {} (was {:?})", group_id, old);
        self.emit(|l, p| l.on_program_selection_changed(p, old, Some(group_id)));
    }

    /// Register a program reported by the source
    pub(crate) fn add_program(&mut self, desc: ProgramDesc) {
        if self.state.programs.find(desc.group_id).is_some() {
            self.update_program(desc);
            return;
        }
        let program = Program {
            group_id: desc.group_id,
            name: desc.name,
            selected: false,
            scrambled: desc.scrambled,
        };
        self.state.programs.programs.push(program.clone());
        self.emit(|l, p| l.on_program_list_changed(p, ListAction::Added, &program));

        if desc.selected && self.state.programs.selected_id().is_none() {
            self.mark_program_selected(program.group_id, false);
        }
    }

    pub(crate) fn update_program(&mut self, desc: ProgramDesc) {
        let Some(program) = self
            .state
            .programs
            .programs
            .iter_mut()
            .find(|p| p.group_id == desc.group_id)
        else {
            return;
        };
        program.name = desc.name;
        program.scrambled = desc.scrambled;
        let program = program.clone();
        self.emit(|l, p| l.on_program_list_changed(p, ListAction::Updated, &program));
    }

    pub(crate) fn remove_program(&mut self, group_id: i32) {
        let Some(program) = self.state.programs.find(group_id).cloned() else {
            return;
        };
        if program.selected {
            if let Some(entry) = self
                .state
                .programs
                .programs
                .iter_mut()
                .find(|p| p.group_id == group_id)
            {
                entry.selected = false;
            }
            self.emit(|l, p| l.on_program_selection_changed(p, Some(group_id), None));
        }
        self.emit(|l, p| l.on_program_list_changed(p, ListAction::Removed, &program));
        self.state.programs.programs.retain(|p| p.group_id != group_id);
    }

    pub(crate) fn clear_programs(&mut self) {
        let group_ids: Vec<i32> = self.state.programs.list().iter().map(|p| p.group_id).collect();
        for group_id in group_ids {
            self.remove_program(group_id);
        }
    }

    /// Mark the first program selected when the source did not pick one
    pub(crate) fn select_default_program(&mut self) {
        if self.state.programs.selected_id().is_some() {
            return;
        }
        if let Some(group_id) = self.state.programs.list().first().map(|p| p.group_id) {
            self.mark_program_selected(group_id, false);
        }
    }
}
