use thiserror::Error;

/// Opening a camera stream failed. Producers retry these with backoff.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid stream URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("RTSP {stage} failed: {reason}")]
    Rtsp { stage: &'static str, reason: String },
    #[error("no H264 video stream in presentation")]
    NoVideoStream,
    #[error("decoder init failed: {0}")]
    Decoder(String),
}

/// A stream that was open stopped yielding frames.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("stream ended")]
    StreamEnded,
    #[error("read timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("demux failed: {0}")]
    Demux(String),
    #[error("{count} consecutive decode errors, last: {last}")]
    Decode { count: u32, last: String },
}

/// Label rendering failure. Never fatal for the frame: the bitmap tier takes over.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("no overlay font loaded")]
    FontUnavailable,
    #[error("font has no glyph for {0:?}")]
    MissingGlyph(char),
    #[error("frame {width}x{height} too small for label")]
    FrameTooSmall { width: usize, height: usize },
}

/// Malformed camera or general settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("camera address is empty")]
    EmptyAddress,
    #[error("camera address {0:?} must be a bare host or IP (no scheme, path or whitespace)")]
    InvalidAddress(String),
    #[error("camera {0:?} has port 0")]
    InvalidPort(String),
    #[error("duplicate camera id {0:?}")]
    DuplicateId(String),
    #[error("camera {id:?} has an invalid {variant} path {path:?}")]
    InvalidVariantPath {
        id: String,
        variant: &'static str,
        path: String,
    },
    #[error("fps must be between 1 and 120, got {0}")]
    InvalidFps(u16),
    #[error("no camera with id {0:?}")]
    UnknownCamera(String),
}

#[derive(Debug, Error)]
pub enum PtzError {
    #[error("camera {0:?} has no credentials for ONVIF")]
    MissingCredentials(String),
    #[error("ONVIF request {action} failed: {reason}")]
    Request { action: &'static str, reason: String },
    #[error("ONVIF {action} returned HTTP {status}")]
    Status { action: &'static str, status: u16 },
    #[error("ONVIF {action} response missing {field}")]
    Response {
        action: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("no active camera with id {0:?}")]
    UnknownCamera(String),
    #[error("not in full-screen view")]
    NotFullScreen,
}
