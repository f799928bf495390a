//! Teletext, recording, renderer, navigation, video outputs and cork handling

use log::{debug, info};

use crate::player::input::InputCommand;
use crate::player::listener::VoutAction;
use crate::player::tracks::{EsId, SelectPolicy, TrackCategory};
use crate::player::{
    InputStats, NavigateAction, PlayerGuard, RendererItem, SignalInfo, State, VoutHandle,
};

/// Default teletext page (index page)
pub const TELETEXT_DEFAULT_PAGE: u32 = 100;

/// Teletext state of the current media
#[derive(Debug, Clone, Copy)]
pub(crate) struct TeletextState {
    has_menu: bool,
    enabled: bool,
    page: u32,
    transparent: bool,
}

impl Default for TeletextState {
    fn default() -> Self {
        Self {
            has_menu: false,
            enabled: false,
            page: TELETEXT_DEFAULT_PAGE,
            transparent: false,
        }
    }
}

impl PlayerGuard<'_> {
    /// True when the current media has a teletext stream
    pub fn has_teletext_menu(&self) -> bool {
        self.state.teletext.has_menu
    }

    /// True when the teletext stream is selected
    pub fn is_teletext_enabled(&self) -> bool {
        self.state.teletext.enabled
    }

    /// Current teletext page
    pub fn teletext_page(&self) -> u32 {
        self.state.teletext.page
    }

    pub fn is_teletext_transparent(&self) -> bool {
        self.state.teletext.transparent
    }

    /// Enable or disable teletext by selecting its subtitle stream
    pub fn set_teletext_enabled(&mut self, enabled: bool) {
        if !self.state.teletext.has_menu || self.state.teletext.enabled == enabled {
            return;
        }
        let teletext: Vec<(EsId, bool)> = self
            .tracks(TrackCategory::Subtitle)
            .iter()
            .filter(|t| t.format.is_teletext())
            .map(|t| (t.es_id.clone(), t.selected))
            .collect();

        if enabled {
            if let Some((es_id, _)) = teletext.first() {
                self.select_track(es_id, SelectPolicy::Simultaneous);
            }
        } else {
            for (es_id, selected) in teletext {
                if selected {
                    self.unselect_track(&es_id);
                }
            }
        }
    }

    /// Show a teletext page; ignored without a teletext stream
    pub fn select_teletext_page(&mut self, page: u32) {
        if !self.state.teletext.has_menu || page == 0 || page > 999 {
            return;
        }
        if self.state.teletext.page == page {
            return;
        }
        self.state.teletext.page = page;
        self.send_teletext();
        self.emit(|l, p| l.on_teletext_page_changed(p, page));
    }

    /// Toggle teletext transparency; ignored without a teletext stream
    pub fn set_teletext_transparency(&mut self, enabled: bool) {
        if !self.state.teletext.has_menu || self.state.teletext.transparent == enabled {
            return;
        }
        self.state.teletext.transparent = enabled;
        self.send_teletext();
        self.emit(|l, p| l.on_teletext_transparency_changed(p, enabled));
    }

    fn send_teletext(&self) {
        let teletext = self.state.teletext;
        self.send_input(InputCommand::Teletext {
            page: teletext.page,
            transparent: teletext.transparent,
        });
    }

    /// The teletext subtitle stream was selected or unselected
    pub(crate) fn teletext_selection_changed(&mut self, enabled: bool) {
        if self.state.teletext.enabled == enabled {
            return;
        }
        self.state.teletext.enabled = enabled;
        self.emit(|l, p| l.on_teletext_enabled_changed(p, enabled));
        if enabled {
            self.send_teletext();
        }
    }

    /// Recompute teletext availability from the subtitle tracks
    pub(crate) fn update_teletext_menu(&mut self) {
        let has_menu = self
            .tracks(TrackCategory::Subtitle)
            .iter()
            .any(|t| t.format.is_teletext());
        self.set_teletext_menu(has_menu);
    }

    pub(crate) fn set_teletext_menu(&mut self, has_menu: bool) {
        if self.state.teletext.has_menu == has_menu {
            return;
        }
        self.state.teletext.has_menu = has_menu;
        self.emit(|l, p| l.on_teletext_menu_changed(p, has_menu));
        if !has_menu {
            self.teletext_selection_changed(false);
        }
    }

    /// True while the stream is being recorded
    pub fn is_recording_enabled(&self) -> bool {
        self.state.recording
    }

    /// Start or stop recording the current media; ignored while stopped
    pub fn set_recording_enabled(&mut self, enabled: bool) {
        if self.state.input.is_none() || self.state.recording == enabled {
            return;
        }
        info!("Recording {}", if enabled { "started" } else { "stopped" });
        self.state.recording = enabled;
        self.send_input(InputCommand::SetRecording(enabled));
        self.emit(|l, p| l.on_recording_changed(p, enabled));
    }

    /// Current renderer; `None` is local playback
    pub fn renderer(&self) -> Option<&RendererItem> {
        self.state.renderer.as_ref()
    }

    /// Select the renderer used for the next and current media
    pub fn set_renderer(&mut self, renderer: Option<RendererItem>) {
        if self.state.renderer == renderer {
            return;
        }
        info!(
            "Renderer: {}",
            renderer.as_ref().map_or("local", |r| r.name.as_str())
        );
        self.state.renderer = renderer.clone();
        self.emit(|l, p| l.on_renderer_changed(p, renderer.as_ref()));
    }

    /// Forward a menu navigation action to the source
    pub fn navigate(&mut self, action: NavigateAction) {
        if self.state.input.is_none() {
            return;
        }
        debug!("Navigate: {:?}", action);
        self.send_input(InputCommand::Navigate(action));
    }

    /// Last signal report of the source
    pub fn signal(&self) -> Option<SignalInfo> {
        self.state.signal
    }

    /// Last statistics report of the source
    pub fn statistics(&self) -> Option<InputStats> {
        self.state.statistics
    }

    /// Video outputs, one per selected video track
    pub fn vouts(&self) -> Vec<VoutHandle> {
        self.state.vouts.iter().map(|(vout, _)| vout.clone()).collect()
    }

    /// Video track rendered by a video output
    pub fn vout_es_id(&self, vout: &VoutHandle) -> Option<&EsId> {
        self.state
            .vouts
            .iter()
            .find(|(v, _)| v == vout)
            .map(|(_, es_id)| es_id)
    }

    pub(crate) fn start_vout(&mut self, es_id: &EsId) {
        if self.state.vouts.iter().any(|(_, id)| id == es_id) {
            return;
        }
        let vout = VoutHandle::new();
        debug!("Vout {} started for {}", vout.id(), es_id);
        self.state.vouts.push((vout.clone(), es_id.clone()));
        self.emit(|l, p| l.on_vout_changed(p, VoutAction::Started, &vout, es_id));
    }

    pub(crate) fn stop_vout(&mut self, es_id: &EsId) {
        let Some(idx) = self.state.vouts.iter().position(|(_, id)| id == es_id) else {
            return;
        };
        let (vout, es_id) = self.state.vouts.remove(idx);
        debug!("Vout {} stopped", vout.id());
        self.emit(|l, p| l.on_vout_changed(p, VoutAction::Stopped, &vout, &es_id));
    }

    /// Number of pending cork requests
    pub fn cork_count(&self) -> u32 {
        self.state.cork_count
    }

    /// Cork or uncork playback, as requested by the audio system
    ///
    /// Requests are counted. With `pause_on_cork` configured the first cork
    /// pauses playback and the last uncork resumes it, unless the user paused
    /// or resumed in between.
    pub fn set_corked(&mut self, corked: bool) {
        if corked {
            self.state.cork_count += 1;
        } else if self.state.cork_count == 0 {
            return;
        } else {
            self.state.cork_count -= 1;
        }
        let count = self.state.cork_count;
        self.emit(|l, p| l.on_cork_changed(p, count));

        if !self.shared.config.pause_on_cork {
            return;
        }
        if corked && count == 1 && self.state.playback_state == State::Playing && self.can_pause() {
            self.pause();
            self.state.paused_by_cork = true;
        } else if !corked && count == 0 && self.state.paused_by_cork {
            self.resume();
        }
    }
}
