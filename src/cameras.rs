//! Local camera, video and audio settings
//!
//! The same settings travel in two shapes: a JSON file describing this host,
//! and a flat string attribute set published on our peer node (and read back
//! from every remote peer's node).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};

/// Prefix of every shared video texture id and of its `/dev/shm` file
pub const SHM_PREFIX: &str = "peerview-";

/// Attribute holding the number of published cameras
pub const CAMERA_COUNT_KEY: &str = "cameraCount";

/// Largest camera count a peer may publish
pub const MAX_CAMERAS: usize = 64;

/// Attribute names of the settings every peer publishes
pub const SETTING_KEYS: &[&str] = &[
    "receiverAddress",
    "videoSource",
    "videoCodec",
    "videoBitrate",
    "framerate",
    "grayscale",
    "width",
    "height",
    "display",
    "userAudioSource",
    "audioOutputsLayout",
    "sendAudioPort",
];

/// Attribute holding the `index`-th camera (1-based)
pub fn camera_key(index: usize) -> String {
    format!("camera[{}]", index)
}

/// Media settings of one peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraSettings {
    /// Where remote peers send their streams to reach us
    pub receiver_address: String,
    pub video_source: String,
    pub video_codec: String,
    pub video_bitrate: u32,
    pub framerate: u32,
    pub grayscale: bool,
    pub width: u32,
    pub height: u32,
    /// X display the receivers render on
    pub display: String,
    /// Audio input index, unique per peer within a session
    pub user_audio_source: u32,
    pub audio_outputs_layout: String,
    pub send_audio_port: u16,
    /// `<cameraId>@<host>:<port>` entries
    pub cameras: Vec<String>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            receiver_address: "127.0.0.1".to_string(),
            video_source: "videotestsrc".to_string(),
            video_codec: "h263".to_string(),
            video_bitrate: 75000,
            framerate: 15,
            grayscale: true,
            width: 640,
            height: 480,
            display: ":0.0".to_string(),
            user_audio_source: 1,
            audio_outputs_layout: "stereo".to_string(),
            send_audio_port: 10000,
            cameras: Vec::new(),
        }
    }
}

impl CameraSettings {
    /// Load settings from a JSON file
    ///
    /// A missing file yields defaults. A file that does not parse, or lists
    /// an invalid camera, is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Camera configuration {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;

        for camera in &settings.cameras {
            camera.parse::<CameraSpec>()?;
        }

        info!(
            "Loaded camera configuration from {} ({} cameras)",
            path.display(),
            settings.cameras.len()
        );
        Ok(settings)
    }

    /// Parsed camera list, skipping invalid entries
    pub fn camera_specs(&self) -> Vec<CameraSpec> {
        self.cameras
            .iter()
            .filter_map(|raw| match raw.parse() {
                Ok(spec) => Some(spec),
                Err(e) => {
                    warn!("Ignoring camera {:?}: {}", raw, e);
                    None
                }
            })
            .collect()
    }

    /// Shared texture ids of our own cameras
    pub fn texture_ids(&self) -> Vec<String> {
        self.camera_specs().iter().map(CameraSpec::texture_id).collect()
    }

    /// Flat attribute set to publish with `setParam`
    pub fn to_attributes(&self) -> Vec<(String, String)> {
        let values = [
            self.receiver_address.clone(),
            self.video_source.clone(),
            self.video_codec.clone(),
            self.video_bitrate.to_string(),
            self.framerate.to_string(),
            self.grayscale.to_string(),
            self.width.to_string(),
            self.height.to_string(),
            self.display.clone(),
            self.user_audio_source.to_string(),
            self.audio_outputs_layout.clone(),
            self.send_audio_port.to_string(),
        ];

        let mut attrs: Vec<(String, String)> = SETTING_KEYS
            .iter()
            .map(|k| k.to_string())
            .zip(values)
            .collect();

        attrs.push((CAMERA_COUNT_KEY.to_string(), self.cameras.len().to_string()));
        for (i, camera) in self.cameras.iter().enumerate() {
            attrs.push((camera_key(i + 1), camera.clone()));
        }
        attrs
    }

    /// Rebuild settings from a peer's published attributes
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Result<Self> {
        let count = parse_count(attrs)?;
        let mut cameras = Vec::with_capacity(count);
        for i in 1..=count {
            cameras.push(get(attrs, &camera_key(i))?.to_string());
        }

        Ok(Self {
            receiver_address: get(attrs, "receiverAddress")?.to_string(),
            video_source: get(attrs, "videoSource")?.to_string(),
            video_codec: get(attrs, "videoCodec")?.to_string(),
            video_bitrate: parse_number(attrs, "videoBitrate")?,
            framerate: parse_number(attrs, "framerate")?,
            grayscale: parse_flag(attrs, "grayscale")?,
            width: parse_number(attrs, "width")?,
            height: parse_number(attrs, "height")?,
            display: get(attrs, "display")?.to_string(),
            user_audio_source: parse_number(attrs, "userAudioSource")?,
            audio_outputs_layout: get(attrs, "audioOutputsLayout")?.to_string(),
            send_audio_port: parse_number(attrs, "sendAudioPort")?,
            cameras,
        })
    }
}

fn get<'a>(attrs: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    attrs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| AppError::MissingReference(format!("attribute {}", key)))
}

fn parse_number<T: FromStr>(attrs: &HashMap<String, String>, key: &str) -> Result<T> {
    let raw = get(attrs, key)?;
    raw.trim()
        .parse()
        .map_err(|_| AppError::MalformedMessage(format!("{} is not a number: {:?}", key, raw)))
}

/// Booleans are accepted as `true`/`false` in any case, or `1`/`0`
fn parse_flag(attrs: &HashMap<String, String>, key: &str) -> Result<bool> {
    let raw = get(attrs, key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(AppError::MalformedMessage(format!(
            "{} is not a boolean: {:?}",
            key, raw
        ))),
    }
}

/// Parse the `cameraCount` attribute
pub fn parse_count(attrs: &HashMap<String, String>) -> Result<usize> {
    count_value(get(attrs, CAMERA_COUNT_KEY)?)
}

/// Validate a raw `cameraCount` value. Counts above `MAX_CAMERAS` are malformed.
pub fn count_value(raw: &str) -> Result<usize> {
    let count: usize = raw.trim().parse().map_err(|_| {
        AppError::MalformedMessage(format!("{} is not a number: {:?}", CAMERA_COUNT_KEY, raw))
    })?;
    if count > MAX_CAMERAS {
        return Err(AppError::MalformedMessage(format!(
            "{} {} exceeds {}",
            CAMERA_COUNT_KEY, count, MAX_CAMERAS
        )));
    }
    Ok(count)
}

/// One camera entry, `<cameraId>@<host>:<port>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSpec {
    pub camera_id: String,
    /// Host the camera's sender runs on
    pub host: String,
    /// Port the sender streams video on
    pub port: u16,
}

impl CameraSpec {
    /// Shared video texture id, `<prefix><cameraId>@<host>`
    pub fn texture_id(&self) -> String {
        format!("{}{}@{}", SHM_PREFIX, self.camera_id, self.host)
    }
}

impl FromStr for CameraSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AppError::Config(format!("invalid camera {:?}, expected id@host:port", s));

        let (camera_id, location) = s.split_once('@').ok_or_else(invalid)?;
        let (host, port) = location.rsplit_once(':').ok_or_else(invalid)?;
        if camera_id.is_empty() || host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;

        Ok(Self {
            camera_id: camera_id.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for CameraSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.camera_id, self.host, self.port)
    }
}

/// Remove stale shared video files left behind by earlier runs
///
/// Returns the number of files removed.
pub fn clear_shared_memory(dir: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            return Ok(0);
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(SHM_PREFIX) {
            continue;
        }
        let path = entry.path();
        warn!("Removing stale shared memory file {}", path.display());
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}
