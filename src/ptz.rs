//! Pan/tilt control over ONVIF.
//!
//! Each command is a relative nudge built from absolute moves: read the
//! current position with `GetStatus`, add one step, clamp, `AbsoluteMove`.
//! Requests carry a WS-Security UsernameToken digest.

use crate::config::PtzConfig;
use crate::endpoint::{Credentials, StreamEndpoint, host_for_url};
use crate::error::PtzError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use parking_lot::Mutex;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PtzDirection {
    Up,
    Down,
    Left,
    Right,
}

impl fmt::Display for PtzDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Moves a camera one step. Failures are reported as `false`, never raised.
pub trait PtzClient: Send + Sync + 'static {
    fn send_ptz_command(
        &self,
        endpoint: &StreamEndpoint,
        direction: PtzDirection,
    ) -> impl Future<Output = bool> + Send;
}

pub struct OnvifPtz {
    client: Client,
    port: u16,
    service_path: String,
    step: f32,
    invert_pan: bool,
    profile_tokens: Mutex<HashMap<String, String>>,
}

impl OnvifPtz {
    pub fn new(config: &PtzConfig) -> Result<Self, PtzError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|err| PtzError::Request {
                action: "client setup",
                reason: err.to_string(),
            })?;
        let service_path = format!("/{}", config.service_path.trim().trim_start_matches('/'));
        Ok(Self {
            client,
            port: config.port,
            service_path,
            step: config.step,
            invert_pan: config.invert_pan,
            profile_tokens: Mutex::new(HashMap::new()),
        })
    }

    fn service_url(&self, endpoint: &StreamEndpoint) -> String {
        format!(
            "http://{}:{}{}",
            host_for_url(&endpoint.address),
            self.port,
            self.service_path
        )
    }

    /// Returns the position that was commanded.
    pub async fn move_step(
        &self,
        endpoint: &StreamEndpoint,
        direction: PtzDirection,
    ) -> Result<(f32, f32), PtzError> {
        let creds = endpoint
            .credentials
            .as_ref()
            .filter(|creds| !creds.username.is_empty())
            .ok_or_else(|| PtzError::MissingCredentials(endpoint.id.clone()))?;
        let url = self.service_url(endpoint);
        let token = self.profile_token(&url, endpoint, creds).await?;

        let status = self
            .call(&url, creds, "GetStatus", &get_status_body(&token))
            .await?;
        let (x, y) = step_position(
            current_pan_tilt(&endpoint.id, &status),
            direction,
            self.step,
            self.invert_pan,
        );
        self.call(&url, creds, "AbsoluteMove", &absolute_move_body(&token, x, y))
            .await?;
        Ok((x, y))
    }

    async fn profile_token(
        &self,
        url: &str,
        endpoint: &StreamEndpoint,
        creds: &Credentials,
    ) -> Result<String, PtzError> {
        if let Some(token) = self.profile_tokens.lock().get(&endpoint.id).cloned() {
            return Ok(token);
        }
        let body = self
            .call(
                url,
                creds,
                "GetProfiles",
                r#"<trt:GetProfiles xmlns:trt="http://www.onvif.org/ver10/media/wsdl"/>"#,
            )
            .await?;
        let token = parse_first_profile_token(&body).ok_or(PtzError::Response {
            action: "GetProfiles",
            field: "Profiles@token",
        })?;
        debug!(camera = %endpoint.id, %token, "cached ONVIF profile token");
        self.profile_tokens
            .lock()
            .insert(endpoint.id.clone(), token.clone());
        Ok(token)
    }

    async fn call(
        &self,
        url: &str,
        creds: &Credentials,
        action: &'static str,
        body: &str,
    ) -> Result<String, PtzError> {
        let envelope = soap_envelope(&security_header(creds), body);
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope)
            .send()
            .await
            .map_err(|err| PtzError::Request {
                action,
                reason: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PtzError::Status {
                action,
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|err| PtzError::Request {
            action,
            reason: err.to_string(),
        })
    }
}

impl PtzClient for OnvifPtz {
    async fn send_ptz_command(&self, endpoint: &StreamEndpoint, direction: PtzDirection) -> bool {
        match self.move_step(endpoint, direction).await {
            Ok((x, y)) => {
                info!(camera = %endpoint.id, %direction, x, y, "PTZ moved");
                true
            }
            Err(err) => {
                warn!(camera = %endpoint.id, %direction, "PTZ command failed: {err}");
                false
            }
        }
    }
}

/// Applies one step; pan is mirrored when `invert_pan` is set.
fn step_position(
    (x, y): (f32, f32),
    direction: PtzDirection,
    step: f32,
    invert_pan: bool,
) -> (f32, f32) {
    let pan = if invert_pan { -step } else { step };
    let (x, y) = match direction {
        PtzDirection::Up => (x, y + step),
        PtzDirection::Down => (x, y - step),
        PtzDirection::Left => (x - pan, y),
        PtzDirection::Right => (x + pan, y),
    };
    (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0))
}

fn get_status_body(token: &str) -> String {
    format!(
        r#"<tptz:GetStatus xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl"><tptz:ProfileToken>{}</tptz:ProfileToken></tptz:GetStatus>"#,
        xml_escape(token)
    )
}

fn absolute_move_body(token: &str, x: f32, y: f32) -> String {
    format!(
        r#"<tptz:AbsoluteMove xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><tptz:ProfileToken>{}</tptz:ProfileToken><tptz:Position><tt:PanTilt x="{x:.3}" y="{y:.3}"/></tptz:Position></tptz:AbsoluteMove>"#,
        xml_escape(token)
    )
}

fn soap_envelope(header: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Header>{header}</s:Header>
  <s:Body>{body}</s:Body>
</s:Envelope>"#
    )
}

fn security_header(creds: &Credentials) -> String {
    let nonce: [u8; 16] = rand::random();
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    format!(
        r#"<wsse:Security s:mustUnderstand="true" xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><wsse:UsernameToken><wsse:Username>{}</wsse:Username><wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</wsse:Password><wsse:Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</wsse:Nonce><wsu:Created>{}</wsu:Created></wsse:UsernameToken></wsse:Security>"#,
        xml_escape(&creds.username),
        password_digest(&nonce, &created, &creds.password),
        BASE64_ENGINE.encode(nonce),
        created
    )
}

/// Base64(SHA1(nonce + created + password)).
fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    BASE64_ENGINE.encode(hasher.finalize())
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn parse_first_profile_token(xml: &str) -> Option<String> {
    find_element(xml, b"Profiles", |start| attribute(start, b"token"))
}

/// Current pan/tilt from a `GetStatus` response. `MoveStatus` also has a
/// `PanTilt` child, but only the position carries coordinates.
/// Cameras that only report `MoveStatus` are stepped from the origin.
fn current_pan_tilt(camera: &str, status: &str) -> (f32, f32) {
    parse_pan_tilt(status).unwrap_or_else(|| {
        debug!(%camera, "GetStatus has no Position/PanTilt, stepping from origin");
        (0.0, 0.0)
    })
}

fn parse_pan_tilt(xml: &str) -> Option<(f32, f32)> {
    find_element(xml, b"PanTilt", |start| {
        let x = attribute(start, b"x")?.parse().ok()?;
        let y = attribute(start, b"y")?.parse().ok()?;
        Some((x, y))
    })
}

/// First element named `local` (any namespace) for which `pick` yields a value.
fn find_element<T>(
    xml: &str,
    local: &[u8],
    mut pick: impl FnMut(&BytesStart<'_>) -> Option<T>,
) -> Option<T> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start) | Event::Empty(start))
                if start.local_name().as_ref() == local =>
            {
                if let Some(found) = pick(&start) {
                    return Some(found);
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
        buf.clear();
    }
}

fn attribute(start: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local)
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}
