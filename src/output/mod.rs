//! Player-wide audio and video output controls
//!
//! Outputs outlive the media that feeds them, so their settings live here
//! rather than in the player state. Each control has its own lock, and its
//! listeners are notified after that lock is released: a listener may call
//! back into the control, and never runs with the player lock held.

use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::player::listener::{ListenerId, ListenerRegistry};
use crate::utils::config::{AudioConfig, VideoConfig};
use crate::utils::error::{CoreError, Result};

/// Highest accepted volume (200%)
pub const VOLUME_MAX: f32 = 2.0;

/// Audio output callbacks, invoked without any lock held
#[allow(unused_variables)]
pub trait AoutListener: Send + Sync {
    /// The volume changed, from 0.0 to [`VOLUME_MAX`]
    fn on_volume_changed(&self, volume: f32) {}

    /// The mute state changed
    fn on_mute_changed(&self, muted: bool) {}

    /// The output device changed
    fn on_device_changed(&self, device: Option<&str>) {}
}

/// Video output callbacks, invoked without any lock held
#[allow(unused_variables)]
pub trait VoutListener: Send + Sync {
    fn on_fullscreen_changed(&self, fullscreen: bool) {}

    fn on_wallpaper_mode_changed(&self, enabled: bool) {}

    /// The forced aspect ratio changed; `None` is the source ratio
    fn on_aspect_ratio_changed(&self, ratio: Option<&str>) {}

    /// The crop ratio changed; `None` disables cropping
    fn on_crop_changed(&self, ratio: Option<&str>) {}
}

struct AudioSettings {
    volume: f32,
    muted: bool,
    device: Option<String>,
    volume_step: f32,
    listeners: ListenerRegistry<dyn AoutListener>,
}

/// Volume, mute and device of the audio output
pub struct AudioOutputControl {
    inner: Mutex<AudioSettings>,
}

impl AudioOutputControl {
    /// Create the control from the audio configuration
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            inner: Mutex::new(AudioSettings {
                volume: config.volume.clamp(0.0, VOLUME_MAX),
                muted: config.muted,
                device: None,
                volume_step: config.volume_step,
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn AoutListener>) -> ListenerId {
        self.inner.lock().listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.lock().listeners.remove(id);
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    /// Set the volume, clamped to 0.0..=[`VOLUME_MAX`]
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, VOLUME_MAX)
        };
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.volume == volume {
                return;
            }
            inner.volume = volume;
            inner.listeners.snapshot()
        };
        debug!("Volume: {:.2}", volume);
        for listener in listeners {
            listener.on_volume_changed(volume);
        }
    }

    /// Change the volume by a number of configured steps; negative lowers it
    ///
    /// # Returns
    ///
    /// The resulting volume
    pub fn increment_volume(&self, steps: i32) -> f32 {
        let target = {
            let inner = self.inner.lock();
            inner.volume + inner.volume_step * steps as f32
        };
        self.set_volume(target);
        self.volume()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }

    pub fn set_mute(&self, muted: bool) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.muted == muted {
                return;
            }
            inner.muted = muted;
            inner.listeners.snapshot()
        };
        for listener in listeners {
            listener.on_mute_changed(muted);
        }
    }

    /// Flip the mute state; returns the new state
    pub fn toggle_mute(&self) -> bool {
        let muted = !self.is_muted();
        self.set_mute(muted);
        muted
    }

    /// Selected output device; `None` is the system default
    pub fn device(&self) -> Option<String> {
        self.inner.lock().device.clone()
    }

    pub fn set_device(&self, device: Option<String>) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.device == device {
                return;
            }
            inner.device = device.clone();
            inner.listeners.snapshot()
        };
        debug!("Audio device: {}", device.as_deref().unwrap_or("default"));
        for listener in listeners {
            listener.on_device_changed(device.as_deref());
        }
    }
}

struct VideoSettings {
    fullscreen: bool,
    wallpaper: bool,
    aspect_ratio: Option<String>,
    crop: Option<String>,
    listeners: ListenerRegistry<dyn VoutListener>,
}

/// Fullscreen, wallpaper mode, aspect ratio and crop of the video outputs
pub struct VideoOutputControl {
    inner: Mutex<VideoSettings>,
}

/// Check a "num:den" ratio such as `16:9`
pub(crate) fn check_ratio(ratio: &str) -> Result<()> {
    let valid = ratio
        .split_once(':')
        .and_then(|(num, den)| Some((num.parse::<u32>().ok()?, den.parse::<u32>().ok()?)))
        .is_some_and(|(num, den)| num > 0 && den > 0);
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidInput(format!(
            "invalid ratio '{}', expected num:den",
            ratio
        )))
    }
}

impl VideoOutputControl {
    /// Create the control from the video configuration
    ///
    /// An invalid configured aspect ratio is ignored; [`crate::Config::validate`]
    /// reports it before a player is built.
    pub fn new(config: &VideoConfig) -> Self {
        let aspect_ratio = config
            .aspect_ratio
            .clone()
            .filter(|r| check_ratio(r).is_ok());
        Self {
            inner: Mutex::new(VideoSettings {
                fullscreen: config.fullscreen,
                wallpaper: false,
                aspect_ratio,
                crop: None,
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn VoutListener>) -> ListenerId {
        self.inner.lock().listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.lock().listeners.remove(id);
    }

    pub fn is_fullscreen(&self) -> bool {
        self.inner.lock().fullscreen
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.fullscreen == fullscreen {
                return;
            }
            inner.fullscreen = fullscreen;
            inner.listeners.snapshot()
        };
        for listener in listeners {
            listener.on_fullscreen_changed(fullscreen);
        }
    }

    /// Flip fullscreen; returns the new state
    pub fn toggle_fullscreen(&self) -> bool {
        let fullscreen = !self.is_fullscreen();
        self.set_fullscreen(fullscreen);
        fullscreen
    }

    pub fn is_wallpaper_mode(&self) -> bool {
        self.inner.lock().wallpaper
    }

    pub fn set_wallpaper_mode(&self, enabled: bool) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.wallpaper == enabled {
                return;
            }
            inner.wallpaper = enabled;
            inner.listeners.snapshot()
        };
        for listener in listeners {
            listener.on_wallpaper_mode_changed(enabled);
        }
    }

    pub fn aspect_ratio(&self) -> Option<String> {
        self.inner.lock().aspect_ratio.clone()
    }

    /// Force an aspect ratio ("16:9"), or go back to the source one with `None`
    pub fn set_aspect_ratio(&self, ratio: Option<&str>) -> Result<()> {
        if let Some(ratio) = ratio {
            check_ratio(ratio)?;
        }
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.aspect_ratio.as_deref() == ratio {
                return Ok(());
            }
            inner.aspect_ratio = ratio.map(str::to_string);
            inner.listeners.snapshot()
        };
        for listener in listeners {
            listener.on_aspect_ratio_changed(ratio);
        }
        Ok(())
    }

    pub fn crop(&self) -> Option<String> {
        self.inner.lock().crop.clone()
    }

    /// Crop to a ratio ("4:3"), or disable cropping with `None`
    pub fn set_crop(&self, ratio: Option<&str>) -> Result<()> {
        if let Some(ratio) = ratio {
            check_ratio(ratio)?;
        }
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.crop.as_deref() == ratio {
                return Ok(());
            }
            inner.crop = ratio.map(str::to_string);
            inner.listeners.snapshot()
        };
        for listener in listeners {
            listener.on_crop_changed(ratio);
        }
        Ok(())
    }
}
