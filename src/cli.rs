use crate::config::CameraRecord;
use crate::endpoint::StreamVariant;
use crate::ptz::PtzDirection;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "camwall",
    version,
    about = "Terminal RTSP camera wall with full-screen inspection, zoom/pan and ONVIF PTZ"
)]
pub struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the camera wall (the default).
    Wall,
    /// Edit the configured camera list.
    Cameras(CamerasArgs),
    /// Nudge one camera's pan/tilt by a single step.
    Ptz(PtzArgs),
}

#[derive(Debug, Args)]
pub struct CamerasArgs {
    #[command(subcommand)]
    pub command: CamerasCommand,
}

#[derive(Debug, Subcommand)]
pub enum CamerasCommand {
    /// List configured cameras.
    List(ListArgs),
    /// Append a camera to the config.
    Add(AddCameraArgs),
    /// Remove a camera by id.
    Remove(RemoveCameraArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print machine-readable JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AddCameraArgs {
    /// Camera host name or IP address, without scheme or path.
    pub address: String,

    /// Stable identifier (defaults to the address).
    #[arg(long)]
    pub id: Option<String>,

    #[arg(long, default_value_t = crate::endpoint::DEFAULT_RTSP_PORT)]
    pub port: u16,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// Label drawn on the camera's frames.
    #[arg(long = "name", default_value = "")]
    pub display_name: String,

    #[arg(long = "flip-h", default_value_t = false)]
    pub flip_horizontal: bool,

    #[arg(long = "flip-v", default_value_t = false)]
    pub flip_vertical: bool,

    /// Add the camera without starting it.
    #[arg(long, default_value_t = false)]
    pub disabled: bool,

    /// Sub-stream the grid requests.
    #[arg(long, value_enum, default_value_t = StreamVariant::Secondary)]
    pub variant: StreamVariant,

    /// RTSP path of the high-quality stream.
    #[arg(long)]
    pub primary_path: Option<String>,

    /// RTSP path of the low-latency stream.
    #[arg(long)]
    pub secondary_path: Option<String>,
}

impl AddCameraArgs {
    #[must_use]
    pub fn into_record(self) -> CameraRecord {
        CameraRecord {
            id: self.id,
            port: self.port,
            username: self.username,
            password: self.password,
            display_name: self.display_name,
            flip_horizontal: self.flip_horizontal,
            flip_vertical: self.flip_vertical,
            enabled: !self.disabled,
            variant: self.variant,
            primary_path: self.primary_path,
            secondary_path: self.secondary_path,
            ..CameraRecord::new(self.address)
        }
    }
}

#[derive(Debug, Args)]
pub struct RemoveCameraArgs {
    pub id: String,
}

#[derive(Debug, Args)]
pub struct PtzArgs {
    /// Camera id as shown by `cameras list`.
    pub camera: String,

    #[arg(value_enum)]
    pub direction: PtzDirection,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Tcp,
    Udp,
}
