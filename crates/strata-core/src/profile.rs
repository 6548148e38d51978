//! Output geometry and timing shared by every service in a graph.

use std::path::Path;
use std::sync::Arc;

use num_rational::Ratio;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StrataError};
use crate::events::EventHandle;
use crate::properties::Properties;
use crate::time::FrameRate;
use crate::value::Value;

/// Fired on a [`ProfileHandle`]'s observers after every update.
pub const PROFILE_CHANGED: &str = "profile-changed";

/// Resolution, frame rate and aspect of the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub description: String,
    pub frame_rate: FrameRate,
    pub width: u32,
    pub height: u32,
    pub progressive: bool,
    /// Pixel aspect ratio.
    pub sample_aspect: Ratio<u32>,
    /// Picture aspect ratio.
    pub display_aspect: Ratio<u32>,
    /// ITU-R colour matrix (601, 709).
    pub colorspace: u32,
}

impl Default for Profile {
    fn default() -> Self {
        Self::dv_pal()
    }
}

impl Profile {
    /// PAL DV, 720x576 at 25 fps, 4:3.
    pub fn dv_pal() -> Self {
        Self {
            description: "DV/DVD PAL".to_string(),
            frame_rate: FrameRate::FPS_25,
            width: 720,
            height: 576,
            progressive: false,
            sample_aspect: Ratio::new_raw(16, 15),
            display_aspect: Ratio::new_raw(4, 3),
            colorspace: 601,
        }
    }

    /// NTSC DV, 720x480 at 29.97 fps, 4:3.
    pub fn dv_ntsc() -> Self {
        Self {
            description: "DV/DVD NTSC".to_string(),
            frame_rate: FrameRate::FPS_29_97,
            width: 720,
            height: 480,
            progressive: false,
            sample_aspect: Ratio::new_raw(8, 9),
            display_aspect: Ratio::new_raw(4, 3),
            colorspace: 601,
        }
    }

    pub fn hd_720p_50() -> Self {
        Self::square("HD 720p 50 fps", 1280, 720, FrameRate::FPS_50)
    }

    pub fn hd_1080p_25() -> Self {
        Self::square("HD 1080p 25 fps", 1920, 1080, FrameRate::FPS_25)
    }

    pub fn hd_1080p_2997() -> Self {
        Self::square("HD 1080p 29.97 fps", 1920, 1080, FrameRate::FPS_29_97)
    }

    fn square(description: &str, width: u32, height: u32, frame_rate: FrameRate) -> Self {
        Self {
            description: description.to_string(),
            frame_rate,
            width,
            height,
            progressive: true,
            sample_aspect: Ratio::new_raw(1, 1),
            display_aspect: Ratio::new(16, 9),
            colorspace: 709,
        }
    }

    /// Look up a built-in profile by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "dv_pal" => Some(Self::dv_pal()),
            "dv_ntsc" => Some(Self::dv_ntsc()),
            "atsc_720p_50" | "hd_720p_50" => Some(Self::hd_720p_50()),
            "atsc_1080p_25" | "hd_1080p_25" => Some(Self::hd_1080p_25()),
            "atsc_1080p_2997" | "hd_1080p_2997" => Some(Self::hd_1080p_2997()),
            _ => None,
        }
    }

    pub fn fps(&self) -> f64 {
        self.frame_rate.to_fps_f64()
    }

    /// Sample (pixel) aspect ratio as a float.
    pub fn sar(&self) -> f64 {
        ratio_to_f64(self.sample_aspect)
    }

    /// Display aspect ratio as a float.
    pub fn dar(&self) -> f64 {
        ratio_to_f64(self.display_aspect)
    }

    /// Read a profile from `name=value` properties.
    ///
    /// Recognised names are `description`, `frame_rate_num`, `frame_rate_den`,
    /// `width`, `height`, `progressive`, `sample_aspect_num`,
    /// `sample_aspect_den`, `display_aspect_num`, `display_aspect_den` and
    /// `colorspace`. Missing values fall back to PAL DV, except the display
    /// aspect which is derived from the geometry.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let base = Self::dv_pal();
        let int_or = |name: &str, fallback: u32| -> Result<u32> {
            if !props.exists(name) {
                return Ok(fallback);
            }
            u32::try_from(props.get_int(name))
                .map_err(|_| StrataError::InvalidParameter(format!("profile {} must be positive", name)))
        };

        let frame_rate = FrameRate::new(
            int_or("frame_rate_num", base.frame_rate.numerator)?,
            int_or("frame_rate_den", base.frame_rate.denominator)?,
        );
        let width = int_or("width", base.width)?;
        let height = int_or("height", base.height)?;
        let sample_aspect = Ratio::new_raw(
            int_or("sample_aspect_num", *base.sample_aspect.numer())?,
            int_or("sample_aspect_den", *base.sample_aspect.denom())?,
        );
        if frame_rate.numerator == 0 || frame_rate.denominator == 0 {
            return Err(StrataError::InvalidParameter("profile frame rate".into()));
        }
        if width == 0 || height == 0 {
            return Err(StrataError::InvalidParameter(format!(
                "profile size {}x{}",
                width, height
            )));
        }
        if *sample_aspect.denom() == 0 {
            return Err(StrataError::InvalidParameter("profile sample aspect".into()));
        }

        let display_aspect = if props.exists("display_aspect_num") && props.exists("display_aspect_den") {
            let num = int_or("display_aspect_num", 0)?;
            let den = int_or("display_aspect_den", 0)?;
            if den == 0 {
                return Err(StrataError::InvalidParameter("profile display aspect".into()));
            }
            Ratio::new(num, den)
        } else {
            Ratio::new(width * *sample_aspect.numer(), height * *sample_aspect.denom())
        };

        Ok(Self {
            description: props.get("description").unwrap_or_default(),
            frame_rate,
            width,
            height,
            progressive: props.get_int("progressive") != 0,
            sample_aspect,
            display_aspect,
            colorspace: int_or("colorspace", 601)?,
        })
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Self::from_properties(&Properties::from_text(text)?)
    }

    /// Load a profile file.
    pub fn load(path: &Path) -> Result<Self> {
        let profile = Self::from_properties(&Properties::load(path)?)?;
        info!(path = %path.display(), description = %profile.description, "loaded profile");
        Ok(profile)
    }

    /// The profile as `name=value` properties, readable by [`Self::from_properties`].
    pub fn to_properties(&self) -> Result<Properties> {
        let props = Properties::new();
        props.set("description", &self.description)?;
        props.set_int("frame_rate_num", self.frame_rate.numerator as i32)?;
        props.set_int("frame_rate_den", self.frame_rate.denominator as i32)?;
        props.set_int("width", self.width as i32)?;
        props.set_int("height", self.height as i32)?;
        props.set_int("progressive", self.progressive as i32)?;
        props.set_int("sample_aspect_num", *self.sample_aspect.numer() as i32)?;
        props.set_int("sample_aspect_den", *self.sample_aspect.denom() as i32)?;
        props.set_int("display_aspect_num", *self.display_aspect.numer() as i32)?;
        props.set_int("display_aspect_den", *self.display_aspect.denom() as i32)?;
        props.set_int("colorspace", self.colorspace as i32)?;
        Ok(props)
    }
}

fn ratio_to_f64(ratio: Ratio<u32>) -> f64 {
    if *ratio.denom() == 0 {
        return 0.0;
    }
    *ratio.numer() as f64 / *ratio.denom() as f64
}

/// Shared, observable handle on a [`Profile`].
///
/// Every service of a graph holds a clone. Reads are concurrent; an update
/// is visible to every holder and fires [`PROFILE_CHANGED`].
#[derive(Clone)]
pub struct ProfileHandle {
    profile: Arc<RwLock<Profile>>,
    observers: Properties,
}

impl ProfileHandle {
    pub fn new(profile: Profile) -> Self {
        let observers = Properties::new();
        observers.init_events();
        // The name is non-empty, registration cannot fail.
        let _ = observers.register_event(PROFILE_CHANGED);
        Self {
            profile: Arc::new(RwLock::new(profile)),
            observers,
        }
    }

    /// Snapshot of the current profile.
    pub fn get(&self) -> Profile {
        self.profile.read().clone()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Profile> {
        self.profile.read()
    }

    pub fn fps(&self) -> f64 {
        self.profile.read().fps()
    }

    pub fn width(&self) -> u32 {
        self.profile.read().width
    }

    pub fn height(&self) -> u32 {
        self.profile.read().height
    }

    /// Modify the profile in place, then notify observers.
    pub fn update<F: FnOnce(&mut Profile)>(&self, change: F) {
        let description = {
            let mut profile = self.profile.write();
            change(&mut profile);
            profile.description.clone()
        };
        self.observers
            .fire(PROFILE_CHANGED, &[Value::String(description)]);
    }

    /// Replace the profile wholesale.
    pub fn replace(&self, profile: Profile) {
        self.update(|current| *current = profile);
    }

    /// Observe profile changes. The listener receives the new description.
    pub fn on_change<F>(&self, listener: F) -> Result<EventHandle>
    where
        F: Fn(&Properties, &[Value]) + Send + Sync + 'static,
    {
        self.observers.listen(PROFILE_CHANGED, listener)
    }

    pub fn ptr_eq(a: &ProfileHandle, b: &ProfileHandle) -> bool {
        Arc::ptr_eq(&a.profile, &b.profile)
    }
}

impl Default for ProfileHandle {
    fn default() -> Self {
        Self::new(Profile::default())
    }
}

impl std::fmt::Debug for ProfileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProfileHandle")
            .field(&*self.profile.read())
            .finish()
    }
}
