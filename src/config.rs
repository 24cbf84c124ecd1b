use crate::cli::TransportMode;
use crate::endpoint::{
    Credentials, DEFAULT_PRIMARY_PATH, DEFAULT_RTSP_PORT, DEFAULT_SECONDARY_PATH, StreamEndpoint,
    StreamVariant,
};
use crate::error::ConfigError;
use crate::producer::{ProducerTiming, frame_interval_for_fps};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "camwall";
const CONFIG_FILE: &str = "config.json";
const LOG_FILE: &str = "camwall.log";
const MAX_FPS: u16 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Producer read cadence.
    pub fps: u16,
    pub fullscreen_refresh_ms: u64,
    pub max_backoff_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub transport: TransportMode,
    /// TrueType/OpenType font for camera labels. Without one, labels use the
    /// built-in bitmap glyphs.
    pub overlay_font: Option<PathBuf>,
    pub overlay_font_px: f32,
    /// Variant forced on the focused camera in full-screen. Unset means the
    /// camera's own default.
    pub fullscreen_variant: Option<StreamVariant>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            fps: 20,
            fullscreen_refresh_ms: 50,
            max_backoff_ms: 5_000,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 10_000,
            transport: TransportMode::Tcp,
            overlay_font: None,
            overlay_font_px: 28.0,
            fullscreen_variant: None,
        }
    }
}

impl GeneralConfig {
    #[must_use]
    pub fn producer_timing(&self) -> ProducerTiming {
        ProducerTiming {
            frame_interval: frame_interval_for_fps(self.fps),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(1)),
            ..ProducerTiming::default()
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    #[must_use]
    pub fn grid_refresh(&self) -> Duration {
        frame_interval_for_fps(self.fps)
    }

    #[must_use]
    pub fn fullscreen_refresh(&self) -> Duration {
        Duration::from_millis(self.fullscreen_refresh_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtzConfig {
    /// ONVIF HTTP port. Tapo cameras listen on 2020.
    pub port: u16,
    pub service_path: String,
    /// AbsoluteMove increment in normalized pan/tilt units.
    pub step: f32,
    /// Most ceiling-mount cameras pan the opposite way to the image.
    pub invert_pan: bool,
    pub timeout_ms: u64,
}

impl Default for PtzConfig {
    fn default() -> Self {
        Self {
            port: 2020,
            service_path: "/onvif/service".to_owned(),
            step: 0.1,
            invert_pan: true,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraRecord {
    /// Defaults to the address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub address: String,
    #[serde(default = "default_rtsp_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub variant: StreamVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_path: Option<String>,
}

impl CameraRecord {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: None,
            address: address.into(),
            port: DEFAULT_RTSP_PORT,
            username: None,
            password: None,
            display_name: String::new(),
            flip_horizontal: false,
            flip_vertical: false,
            enabled: true,
            variant: StreamVariant::default(),
            primary_path: None,
            secondary_path: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.address.trim())
    }

    #[must_use]
    pub fn to_endpoint(&self) -> StreamEndpoint {
        let credentials = self
            .username
            .as_deref()
            .filter(|user| !user.is_empty())
            .map(|user| Credentials {
                username: user.to_owned(),
                password: self.password.clone().unwrap_or_default(),
            });
        StreamEndpoint {
            id: self.id().to_owned(),
            address: self.address.trim().to_owned(),
            port: self.port,
            credentials,
            flip_horizontal: self.flip_horizontal,
            flip_vertical: self.flip_vertical,
            display_name: self.display_name.clone(),
            enabled: self.enabled,
            variant: self.variant,
            primary_path: path_or_default(self.primary_path.as_deref(), DEFAULT_PRIMARY_PATH),
            secondary_path: path_or_default(self.secondary_path.as_deref(), DEFAULT_SECONDARY_PATH),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if address.contains("://")
            || address.contains('/')
            || address.contains('@')
            || address.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::InvalidAddress(self.address.clone()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.id().to_owned()));
        }
        for (variant, path) in [
            ("primary", &self.primary_path),
            ("secondary", &self.secondary_path),
        ] {
            if let Some(path) = path
                && (path.trim().trim_start_matches('/').is_empty()
                    || path.chars().any(char::is_whitespace))
            {
                return Err(ConfigError::InvalidVariantPath {
                    id: self.id().to_owned(),
                    variant,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    pub general: GeneralConfig,
    pub ptz: PtzConfig,
    pub cameras: Vec<CameraRecord>,
}

impl WallConfig {
    pub fn default_path() -> Result<PathBuf> {
        Ok(app_dir()?.join(CONFIG_FILE))
    }

    /// Missing file means an empty wall, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading config at {}", path.display()))?;
        let parsed = serde_json::from_str::<Self>(&raw)
            .with_context(|| format!("failed parsing config at {}", path.display()))?;
        parsed
            .validate()
            .with_context(|| format!("invalid config at {}", path.display()))?;
        Ok(parsed)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate().context("refusing to save invalid config")?;
        ensure_parent_dir(path)?;
        let payload = serde_json::to_string_pretty(self).context("failed serializing config")?;
        fs::write(path, payload)
            .with_context(|| format!("failed writing config at {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.fps == 0 || self.general.fps > MAX_FPS {
            return Err(ConfigError::InvalidFps(self.general.fps));
        }
        let mut ids = HashSet::new();
        for camera in &self.cameras {
            camera.validate()?;
            if !ids.insert(camera.id()) {
                return Err(ConfigError::DuplicateId(camera.id().to_owned()));
            }
        }
        Ok(())
    }

    /// Every configured camera in order, disabled ones included.
    #[must_use]
    pub fn endpoints(&self) -> Vec<StreamEndpoint> {
        self.cameras.iter().map(CameraRecord::to_endpoint).collect()
    }

    #[must_use]
    pub fn camera(&self, id: &str) -> Option<&CameraRecord> {
        self.cameras.iter().find(|camera| camera.id() == id)
    }

    pub fn add_camera(&mut self, record: CameraRecord) -> Result<(), ConfigError> {
        record.validate()?;
        if self.camera(record.id()).is_some() {
            return Err(ConfigError::DuplicateId(record.id().to_owned()));
        }
        self.cameras.push(record);
        Ok(())
    }

    pub fn remove_camera(&mut self, id: &str) -> Result<CameraRecord, ConfigError> {
        let idx = self
            .cameras
            .iter()
            .position(|camera| camera.id() == id)
            .ok_or_else(|| ConfigError::UnknownCamera(id.to_owned()))?;
        Ok(self.cameras.remove(idx))
    }
}

pub fn log_path() -> Result<PathBuf> {
    Ok(app_dir()?.join(LOG_FILE))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }
    Ok(())
}

fn app_dir() -> Result<PathBuf> {
    let root = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .context("unable to determine user data directory")?;
    Ok(root.join(APP_DIR))
}

fn path_or_default(path: Option<&str>, default: &str) -> String {
    path.map(str::trim)
        .filter(|path| !path.is_empty())
        .unwrap_or(default)
        .to_owned()
}

const fn default_rtsp_port() -> u16 {
    DEFAULT_RTSP_PORT
}

const fn default_true() -> bool {
    true
}
