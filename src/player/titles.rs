//! Title and chapter navigation
//!
//! A title list is published as an `Arc<TitleList>` and never edited; a new
//! list from the source replaces the old one wholesale.

use bitflags::bitflags;
use log::debug;
use std::sync::Arc;

use crate::player::input::InputCommand;
use crate::player::PlayerGuard;
use crate::utils::Tick;

bitflags! {
    /// Title properties
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TitleFlags: u32 {
        /// The title is a menu
        const MENU = 0x01;
        /// The title expects user interaction
        const INTERACTIVE = 0x02;
    }
}

/// A chapter: a named seek point inside a title
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub name: Option<String>,

    /// Offset from the start of the title
    pub time: Tick,
}

/// A navigation title
#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    pub name: Option<String>,

    /// Total duration
    pub length: Tick,

    pub flags: TitleFlags,

    /// Chapters sorted by time
    pub chapters: Vec<Chapter>,
}

impl Title {
    /// True when the title is a menu
    pub fn is_menu(&self) -> bool {
        self.flags.contains(TitleFlags::MENU)
    }

    /// True when the title is interactive
    pub fn is_interactive(&self) -> bool {
        self.flags.contains(TitleFlags::INTERACTIVE)
    }

    /// Index of the chapter playing at `time`
    pub fn chapter_at(&self, time: Tick) -> Option<usize> {
        self.chapters.iter().rposition(|c| c.time <= time)
    }
}

/// Immutable list of titles
#[derive(Debug, Clone, PartialEq)]
pub struct TitleList {
    titles: Vec<Title>,
}

impl TitleList {
    pub(crate) fn new(titles: Vec<Title>) -> Self {
        Self { titles }
    }

    /// Number of titles
    pub fn count(&self) -> usize {
        self.titles.len()
    }

    /// Title at an index
    pub fn at(&self, idx: usize) -> Option<&Title> {
        self.titles.get(idx)
    }

    /// Iterate over the titles
    pub fn iter(&self) -> impl Iterator<Item = &Title> {
        self.titles.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Index of a title of this list
    pub fn index_of(&self, title: &Title) -> Option<usize> {
        self.titles
            .iter()
            .position(|t| std::ptr::eq(t, title))
            .or_else(|| self.titles.iter().position(|t| t == title))
    }
}

/// Published title list and the selection inside it
#[derive(Debug, Default)]
pub(crate) struct TitleState {
    pub(crate) list: Option<Arc<TitleList>>,
    pub(crate) title: Option<usize>,
    pub(crate) chapter: Option<usize>,
}

impl PlayerGuard<'_> {
    /// The current title list; clone the `Arc` to keep it after unlocking
    pub fn title_list(&self) -> Option<&Arc<TitleList>> {
        self.state.titles.list.as_ref()
    }

    /// Number of titles of the current media
    pub fn title_count(&self) -> usize {
        self.state.titles.list.as_ref().map_or(0, |l| l.count())
    }

    /// Index of the selected title
    pub fn selected_title_idx(&self) -> Option<usize> {
        self.state.titles.title
    }

    /// The selected title
    pub fn selected_title(&self) -> Option<&Title> {
        let idx = self.state.titles.title?;
        self.state.titles.list.as_ref()?.at(idx)
    }

    /// Index of the selected chapter in the selected title
    pub fn selected_chapter_idx(&self) -> Option<usize> {
        self.state.titles.chapter
    }

    /// The selected chapter
    pub fn selected_chapter(&self) -> Option<&Chapter> {
        let idx = self.state.titles.chapter?;
        self.selected_title()?.chapters.get(idx)
    }

    /// Select a title by index; out of range indices are ignored
    pub fn select_title_idx(&mut self, idx: usize) {
        if idx >= self.title_count() {
            debug!("select_title_idx: {} out of range", idx);
            return;
        }
        self.apply_title_selection(idx, true);
    }

    /// Select a title of the current list
    pub fn select_title(&mut self, title: &Title) {
        let idx = self
            .state
            .titles
            .list
            .as_ref()
            .and_then(|list| list.index_of(title));
        if let Some(idx) = idx {
            self.apply_title_selection(idx, true);
        }
    }

    /// Select a chapter of the selected title; out of range indices are ignored
    pub fn select_chapter_idx(&mut self, idx: usize) {
        let count = self.selected_title().map_or(0, |t| t.chapters.len());
        if idx >= count {
            debug!("select_chapter_idx: {} out of range", idx);
            return;
        }
        self.apply_chapter_selection(idx, true);
    }

    /// Select the following title; no wrap around
    pub fn select_next_title(&mut self) {
        let idx = self.state.titles.title.map_or(0, |i| i + 1);
        self.select_title_idx(idx);
    }

    /// Select the preceding title; no wrap around
    pub fn select_prev_title(&mut self) {
        if let Some(idx) = self.state.titles.title.and_then(|i| i.checked_sub(1)) {
            self.select_title_idx(idx);
        }
    }

    /// Select the following chapter; no wrap around
    pub fn select_next_chapter(&mut self) {
        let idx = self.state.titles.chapter.map_or(0, |i| i + 1);
        self.select_chapter_idx(idx);
    }

    /// Select the preceding chapter; no wrap around
    pub fn select_prev_chapter(&mut self) {
        if let Some(idx) = self.state.titles.chapter.and_then(|i| i.checked_sub(1)) {
            self.select_chapter_idx(idx);
        }
    }

    fn apply_title_selection(&mut self, idx: usize, notify_source: bool) {
        let Some(list) = self.state.titles.list.clone() else {
            return;
        };
        let Some(title) = list.at(idx) else {
            return;
        };

        self.state.titles.title = Some(idx);
        self.state.titles.chapter = None;
        if notify_source {
            let generation = self.next_seek_generation();
            self.send_input(InputCommand::SelectTitle { idx, generation });
        }
        debug!("Title selected: {}", idx);
        self.emit(|l, p| l.on_title_selection_changed(p, title, idx));

        if !title.chapters.is_empty() {
            self.apply_chapter_selection(0, false);
        }
    }

    fn apply_chapter_selection(&mut self, idx: usize, notify_source: bool) {
        let Some(list) = self.state.titles.list.clone() else {
            return;
        };
        let Some(title_idx) = self.state.titles.title else {
            return;
        };
        let Some(title) = list.at(title_idx) else {
            return;
        };
        let Some(chapter) = title.chapters.get(idx) else {
            return;
        };

        self.state.titles.chapter = Some(idx);
        if notify_source {
            let generation = self.next_seek_generation();
            self.send_input(InputCommand::SelectChapter { idx, generation });
        }
        self.emit(|l, p| l.on_chapter_selection_changed(p, title, title_idx, chapter, idx));
    }

    /// Replace the title list and auto-select the first title
    pub(crate) fn publish_titles(&mut self, titles: Vec<Title>) {
        let list = (!titles.is_empty()).then(|| Arc::new(TitleList::new(titles)));
        self.state.titles = TitleState {
            list: list.clone(),
            title: None,
            chapter: None,
        };
        debug!("Title list published: {} titles", list.as_ref().map_or(0, |l| l.count()));
        self.emit(|l, p| l.on_titles_changed(p, list.as_ref()));

        if list.is_some() {
            self.apply_title_selection(0, false);
        }
    }

    /// Drop the title list, announcing it only if there was one
    pub(crate) fn clear_titles(&mut self) {
        if self.state.titles.list.is_some() {
            self.publish_titles(Vec::new());
        }
    }

    /// Follow chapter boundaries as playback time advances
    pub(crate) fn update_chapter_for_time(&mut self, time: Tick) {
        let Some(idx) = self.selected_title().and_then(|t| t.chapter_at(time)) else {
            return;
        };
        if self.state.titles.chapter != Some(idx) {
            self.apply_chapter_selection(idx, false);
        }
    }
}
