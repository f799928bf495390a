//! Media handle
//!
//! A `Media` is a cheap, reference-counted description of a playable
//! resource. Cloning a `Media` is how a holder keeps its own reference; two
//! handles compare equal only when they point at the same resource object.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::utils::Tick;

/// Metadata keys the player forwards from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetaKey {
    Title,
    Artist,
    Album,
    Genre,
    Description,
    NowPlaying,
    Language,
    Url,
}

/// A single electronic program guide entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpgEvent {
    /// Start of the event, in media time
    pub start: Tick,

    /// Duration of the event
    pub duration: Tick,

    /// Event name
    pub name: String,

    /// Short description
    pub description: Option<String>,
}

struct MediaInner {
    mri: String,
    options: Vec<String>,
    meta: RwLock<BTreeMap<MetaKey, String>>,
    epg: RwLock<Vec<EpgEvent>>,
    subitems: RwLock<Vec<Media>>,
}

/// Reference-counted handle to a playable resource
#[derive(Clone)]
pub struct Media {
    inner: Arc<MediaInner>,
}

impl Media {
    /// Create a media from a resource identifier (`file:///...`, `mock://...`)
    pub fn new<S: Into<String>>(mri: S) -> Self {
        Self::with_options(mri, Vec::new())
    }

    /// Create a media carrying input options
    pub fn with_options<S: Into<String>>(mri: S, options: Vec<String>) -> Self {
        Self {
            inner: Arc::new(MediaInner {
                mri: mri.into(),
                options,
                meta: RwLock::new(BTreeMap::new()),
                epg: RwLock::new(Vec::new()),
                subitems: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Resource identifier
    pub fn mri(&self) -> &str {
        &self.inner.mri
    }

    /// Input options given at creation
    pub fn options(&self) -> &[String] {
        &self.inner.options
    }

    /// Read one metadata value
    pub fn meta(&self, key: MetaKey) -> Option<String> {
        self.inner.meta.read().get(&key).cloned()
    }

    /// Copy of all metadata values
    pub fn meta_snapshot(&self) -> BTreeMap<MetaKey, String> {
        self.inner.meta.read().clone()
    }

    /// Set one metadata value
    pub fn set_meta<S: Into<String>>(&self, key: MetaKey, value: S) {
        self.inner.meta.write().insert(key, value.into());
    }

    pub(crate) fn merge_meta(&self, values: BTreeMap<MetaKey, String>) {
        self.inner.meta.write().extend(values);
    }

    /// Program guide entries reported by the backend
    pub fn epg(&self) -> Vec<EpgEvent> {
        self.inner.epg.read().clone()
    }

    pub(crate) fn set_epg(&self, events: Vec<EpgEvent>) {
        *self.inner.epg.write() = events;
    }

    /// Children discovered while parsing (playlists, directories)
    pub fn subitems(&self) -> Vec<Media> {
        self.inner.subitems.read().clone()
    }

    pub(crate) fn add_subitems(&self, items: Vec<Media>) {
        self.inner.subitems.write().extend(items);
    }

    /// Number of live handles to this media
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Display name: the title meta if known, else the resource identifier
    pub fn display_name(&self) -> String {
        self.meta(MetaKey::Title)
            .unwrap_or_else(|| self.inner.mri.clone())
    }
}

impl PartialEq for Media {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Media {}

impl fmt::Debug for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Media")
            .field("mri", &self.inner.mri)
            .field("options", &self.inner.options)
            .finish()
    }
}
