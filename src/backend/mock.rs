//! Synthetic media backend
//!
//! Opens `mock://key=value;key=value` resources into sources that produce
//! nothing but a clock, tracks and events. Every property of a real source
//! that the player reacts to can be set from the resource string:
//!
//! | key | meaning | default |
//! |-----|---------|---------|
//! | `length` | `10s`, `250ms`, bare milliseconds, `0`/`live` for no length | `10s` |
//! | `can_seek`, `can_pause`, `can_control_rate`, `can_rewind` | capabilities | `true` |
//! | `video_tracks`, `audio_tracks`, `sub_tracks` | track counts | `1`, `1`, `0` |
//! | `audio_lang`, `sub_lang` | comma separated languages, one per track | none |
//! | `teletext` | add a teletext subtitle track | `false` |
//! | `programs` | number of programs | `0` |
//! | `titles`, `chapters`, `menu` | titles, chapters per title, first title is a menu | `0`, `0`, `false` |
//! | `error` | `open` fails the open | none |
//! | `error_at` | demux fails once this time is reached | none |
//! | `buffering` | report buffering progress when playback begins | `false` |
//! | `keyframe_interval` | fast seeks snap down to a multiple of it | none |
//! | `meta_title` | title metadata | none |
//! | `add_track_at` | an extra audio track appears at this time | none |
//! | `subitems` | number of sub-items discovered when playback begins | `0` |
//! | `statistics` | report statistics after every demux | `false` |

use log::debug;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{
    DemuxStatus, MediaBackend, MediaSource, SeekRequest, SourceEvent, SourceInfo,
};
use crate::media::{Media, MetaKey};
use crate::player::titles::{Chapter, Title, TitleFlags};
use crate::player::tracks::{EsFormat, ProgramDesc, TrackCategory, TrackDesc};
use crate::player::{Capabilities, InputStats, SeekSpeed};
use crate::utils::error::{CoreError, IntoCoreError, Result};
use crate::utils::{tick_from_ms, tick_from_secs, Tick};

const SCHEME: &str = "mock://";

/// Parsed `mock://` resource options
#[derive(Debug, Clone, PartialEq)]
pub struct MockOptions {
    pub length: Option<Tick>,
    pub can_seek: bool,
    pub can_pause: bool,
    pub can_control_rate: bool,
    pub can_rewind: bool,
    pub video_tracks: u32,
    pub audio_tracks: u32,
    pub sub_tracks: u32,
    pub audio_lang: Vec<String>,
    pub sub_lang: Vec<String>,
    pub teletext: bool,
    pub programs: u32,
    pub titles: u32,
    pub chapters: u32,
    pub menu: bool,
    pub fail_open: bool,
    pub error_at: Option<Tick>,
    pub buffering: bool,
    pub keyframe_interval: Option<Tick>,
    pub meta_title: Option<String>,
    pub add_track_at: Option<Tick>,
    pub subitems: u32,
    pub statistics: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            length: Some(tick_from_secs(10)),
            can_seek: true,
            can_pause: true,
            can_control_rate: true,
            can_rewind: true,
            video_tracks: 1,
            audio_tracks: 1,
            sub_tracks: 0,
            audio_lang: Vec::new(),
            sub_lang: Vec::new(),
            teletext: false,
            programs: 0,
            titles: 0,
            chapters: 0,
            menu: false,
            fail_open: false,
            error_at: None,
            buffering: false,
            keyframe_interval: None,
            meta_title: None,
            add_track_at: None,
            subitems: 0,
            statistics: false,
        }
    }
}

/// Parse a duration: `10s`, `250ms`, `2m` or bare milliseconds
fn parse_time(value: &str) -> Result<Tick> {
    let value = value.trim();
    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "ms"),
    };
    let number: i64 = number
        .parse()
        .map_err(|_| CoreError::InvalidInput(format!("invalid time '{}'", value)))?;
    match unit {
        "ms" => Ok(tick_from_ms(number)),
        "s" => Ok(tick_from_secs(number)),
        "m" => Ok(tick_from_secs(number * 60)),
        "us" => Ok(number),
        _ => Err(CoreError::InvalidInput(format!("invalid time unit in '{}'", value))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(CoreError::InvalidInput(format!("{}: expected a boolean, got '{}'", key, value))),
    }
}

fn parse_count(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| CoreError::InvalidInput(format!("{}: expected a count, got '{}'", key, value)))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl MockOptions {
    /// Parse a `mock://` resource identifier
    pub fn parse(mri: &str) -> Result<Self> {
        let query = mri
            .strip_prefix(SCHEME)
            .ok_or_else(|| CoreError::InvalidInput(format!("not a mock resource: {}", mri)))?;

        let mut options = Self::default();
        for pair in query.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, "true"));
            let value = value.trim();
            match key.trim() {
                "length" => {
                    options.length = match value {
                        "live" | "none" => None,
                        _ => Some(parse_time(value)?).filter(|l| *l > 0),
                    }
                }
                "can_seek" => options.can_seek = parse_bool(key, value)?,
                "can_pause" => options.can_pause = parse_bool(key, value)?,
                "can_control_rate" => options.can_control_rate = parse_bool(key, value)?,
                "can_rewind" => options.can_rewind = parse_bool(key, value)?,
                "video_tracks" => options.video_tracks = parse_count(key, value)?,
                "audio_tracks" => options.audio_tracks = parse_count(key, value)?,
                "sub_tracks" => options.sub_tracks = parse_count(key, value)?,
                "audio_lang" => options.audio_lang = parse_list(value),
                "sub_lang" => options.sub_lang = parse_list(value),
                "teletext" => options.teletext = parse_bool(key, value)?,
                "programs" => options.programs = parse_count(key, value)?,
                "titles" => options.titles = parse_count(key, value)?,
                "chapters" => options.chapters = parse_count(key, value)?,
                "menu" => options.menu = parse_bool(key, value)?,
                "error" => match value {
                    "open" => options.fail_open = true,
                    _ => {
                        return Err(CoreError::InvalidInput(format!(
                            "unknown error kind '{}'",
                            value
                        )))
                    }
                },
                "error_at" => options.error_at = Some(parse_time(value)?),
                "buffering" => options.buffering = parse_bool(key, value)?,
                "keyframe_interval" => {
                    options.keyframe_interval = Some(parse_time(value)?).filter(|k| *k > 0)
                }
                "meta_title" => options.meta_title = Some(value.to_string()),
                "add_track_at" => options.add_track_at = Some(parse_time(value)?),
                "subitems" => options.subitems = parse_count(key, value)?,
                "statistics" => options.statistics = parse_bool(key, value)?,
                other => {
                    return Err(CoreError::InvalidInput(format!("unknown mock option '{}'", other)))
                }
            }
        }
        Ok(options)
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::SEEK, self.can_seek && self.length.is_some());
        caps.set(Capabilities::PAUSE, self.can_pause);
        caps.set(Capabilities::CHANGE_RATE, self.can_control_rate);
        caps.set(
            Capabilities::REWIND,
            self.can_rewind && self.can_control_rate && self.can_seek,
        );
        caps
    }

    /// Track descriptions; source ids are unique across categories
    fn tracks(&self) -> Vec<TrackDesc> {
        let mut tracks = Vec::new();
        let mut next_id = 0;
        let mut push = |category: TrackCategory, count: u32, langs: &[String], codec: &str| {
            for i in 0..count {
                let mut format = EsFormat::new(category, codec);
                if let Some(lang) = langs.get(i as usize) {
                    format = format.with_language(lang.as_str());
                }
                tracks.push(TrackDesc {
                    source_id: next_id,
                    name: format!("{} {}", category.as_str(), i + 1),
                    format,
                });
                next_id += 1;
            }
        };
        push(TrackCategory::Video, self.video_tracks, &[], "h264");
        push(TrackCategory::Audio, self.audio_tracks, &self.audio_lang, "aac");
        push(TrackCategory::Subtitle, self.sub_tracks, &self.sub_lang, "subrip");
        if self.teletext {
            push(TrackCategory::Subtitle, 1, &[], "telx");
        }
        tracks
    }

    fn programs(&self) -> Vec<ProgramDesc> {
        (1..=self.programs as i32)
            .map(|group_id| ProgramDesc {
                group_id,
                name: format!("Program {}", group_id),
                scrambled: false,
                selected: group_id == 1,
            })
            .collect()
    }

    fn titles(&self) -> Vec<Title> {
        let length = self.length.unwrap_or(0);
        (0..self.titles)
            .map(|i| {
                let chapters = (0..self.chapters)
                    .map(|c| Chapter {
                        name: Some(format!("Chapter {}", c + 1)),
                        time: length * c as Tick / self.chapters.max(1) as Tick,
                    })
                    .collect();
                let flags = if self.menu && i == 0 {
                    TitleFlags::MENU | TitleFlags::INTERACTIVE
                } else {
                    TitleFlags::empty()
                };
                Title {
                    name: Some(format!("Title {}", i + 1)),
                    length,
                    flags,
                    chapters,
                }
            })
            .collect()
    }
}

/// Backend opening `mock://` resources
#[derive(Debug, Default)]
pub struct MockBackend {
    opened: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sources opened so far
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }
}

impl MediaBackend for MockBackend {
    fn open(&self, media: &Media) -> Result<Box<dyn MediaSource>> {
        let options = MockOptions::parse(media.mri()).backend_err("Cannot open media")?;
        if options.fail_open {
            return Err(CoreError::backend(format!("{}: open failed", media.mri())));
        }
        self.opened.fetch_add(1, Ordering::Relaxed);
        debug!("Mock source opened: {:?}", options);
        Ok(Box::new(MockSource::new(options)))
    }
}

/// A source playing nothing but its own clock
struct MockSource {
    options: MockOptions,
    titles: Vec<Title>,
    title: usize,
    started: bool,
    track_added: bool,
    next_source_id: i32,
    demuxed: Tick,
    events: VecDeque<SourceEvent>,
}

impl MockSource {
    fn new(options: MockOptions) -> Self {
        let next_source_id = options.tracks().len() as i32;
        Self {
            titles: options.titles(),
            title: 0,
            started: false,
            track_added: false,
            next_source_id,
            demuxed: 0,
            events: VecDeque::new(),
            options,
        }
    }

    fn on_start(&mut self) {
        if self.options.buffering {
            self.events.push_back(SourceEvent::Buffering(0.5));
            self.events.push_back(SourceEvent::Buffering(1.0));
        }
        if self.options.subitems > 0 {
            let items = (1..=self.options.subitems)
                .map(|i| Media::new(format!("{}meta_title=Item {}", SCHEME, i)))
                .collect();
            self.events.push_back(SourceEvent::SubItems(items));
        }
    }
}

impl MediaSource for MockSource {
    fn info(&self) -> SourceInfo {
        let mut meta = BTreeMap::new();
        if let Some(title) = &self.options.meta_title {
            meta.insert(MetaKey::Title, title.clone());
        }
        SourceInfo {
            length: self.options.length,
            capabilities: self.options.capabilities(),
            tracks: self.options.tracks(),
            programs: self.options.programs(),
            titles: self.titles.clone(),
            meta,
        }
    }

    fn demux(&mut self, until: Tick) -> Result<DemuxStatus> {
        if !self.started {
            self.started = true;
            self.on_start();
        }
        if let Some(at) = self.options.error_at {
            if until >= at {
                return Err(CoreError::backend(format!("demux error at {} us", at)));
            }
        }
        if let Some(at) = self.options.add_track_at {
            if !self.track_added && until >= at {
                self.track_added = true;
                let source_id = self.next_source_id;
                self.next_source_id += 1;
                self.events.push_back(SourceEvent::TrackAdded(TrackDesc {
                    source_id,
                    name: "late audio".to_string(),
                    format: EsFormat::new(TrackCategory::Audio, "aac"),
                }));
            }
        }
        if self.options.statistics {
            self.demuxed += 1;
            self.events.push_back(SourceEvent::Statistics(InputStats {
                demux_read_bytes: self.demuxed as u64 * 4096,
                decoded_video: self.demuxed as u64,
                ..InputStats::default()
            }));
        }

        match self.options.length {
            Some(length) if until >= length => Ok(DemuxStatus::Eof),
            _ => Ok(DemuxStatus::Ok),
        }
    }

    fn seek(&mut self, request: SeekRequest) -> Result<Tick> {
        if !self.options.capabilities().contains(Capabilities::SEEK) {
            return Err(CoreError::backend("source cannot seek"));
        }
        let landed = match (request.speed, self.options.keyframe_interval) {
            (SeekSpeed::Fast, Some(interval)) => request.target / interval * interval,
            _ => request.target,
        };
        Ok(landed)
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        if !self.options.can_control_rate && rate != 1.0 {
            return Err(CoreError::backend("source cannot change rate"));
        }
        Ok(())
    }

    fn select_title(&mut self, idx: usize) -> Result<Tick> {
        if idx >= self.titles.len() {
            return Err(CoreError::backend(format!("no title {}", idx)));
        }
        self.title = idx;
        Ok(0)
    }

    fn select_chapter(&mut self, idx: usize) -> Result<Tick> {
        self.titles
            .get(self.title)
            .and_then(|t| t.chapters.get(idx))
            .map(|c| c.time)
            .ok_or_else(|| CoreError::backend(format!("no chapter {}", idx)))
    }

    fn poll_events(&mut self) -> Vec<SourceEvent> {
        self.events.drain(..).collect()
    }
}
