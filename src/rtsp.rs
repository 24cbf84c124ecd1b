use crate::cli::TransportMode;
use crate::endpoint::{StreamEndpoint, StreamVariant, percent_decode_userinfo};
use crate::error::{ConnectError, ReadError};
use crate::frame::Frame;
use crate::source::{FrameReader, StreamConnector};
use futures_util::StreamExt;
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use parking_lot::Mutex;
use retina::client::{
    Credentials, Demuxed, PlayOptions, Session, SessionOptions, SetupOptions,
    TcpTransportOptions, Transport, UdpTransportOptions,
};
use retina::codec::{CodecItem, ParametersRef};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tracing::debug;
use url::Url;

const ANNEXB_START_CODE: [u8; 4] = [0, 0, 0, 1];
const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 25;

/// Opens H.264 RTSP sessions with retina and decodes them with openh264.
#[derive(Debug, Clone)]
pub struct RtspConnector {
    transport: TransportMode,
    connect_timeout: Duration,
}

impl RtspConnector {
    #[must_use]
    pub fn new(transport: TransportMode, connect_timeout: Duration) -> Self {
        Self {
            transport,
            connect_timeout,
        }
    }

    async fn open(
        &self,
        endpoint: &StreamEndpoint,
        variant: StreamVariant,
    ) -> Result<RtspReader, ConnectError> {
        let with_auth = Url::parse(&endpoint.stream_url(variant)).map_err(|err| {
            ConnectError::InvalidUrl {
                url: endpoint.display_url(variant),
                reason: err.to_string(),
            }
        })?;
        let mut bare = with_auth.clone();
        let creds = extract_credentials(&bare);
        if !bare.username().is_empty() || bare.password().is_some() {
            let stripped = bare.set_username("").and_then(|()| bare.set_password(None));
            if stripped.is_err() {
                return Err(ConnectError::InvalidUrl {
                    url: endpoint.display_url(variant),
                    reason: "cannot strip userinfo".to_owned(),
                });
            }
        }

        let mut options = SessionOptions::default();
        if creds.is_some() {
            options = options.creds(creds);
        }

        let mut session = match Session::describe(bare, options).await {
            Ok(session) => session,
            Err(primary) => {
                // Some cameras only accept credentials embedded in the URL.
                if with_auth.username().is_empty() {
                    return Err(rtsp_error("DESCRIBE", &primary));
                }
                debug!(camera = %endpoint.id, "DESCRIBE rejected, retrying with URL credentials");
                Session::describe(with_auth, SessionOptions::default())
                    .await
                    .map_err(|fallback| ConnectError::Rtsp {
                        stage: "DESCRIBE",
                        reason: format!("session creds: {primary}; URL creds: {fallback}"),
                    })?
            }
        };

        let stream_index = pick_h264_stream(&session).ok_or(ConnectError::NoVideoStream)?;
        session
            .setup(
                stream_index,
                SetupOptions::default().transport(to_transport(self.transport)),
            )
            .await
            .map_err(|err| rtsp_error("SETUP", &err))?;
        let playing = session
            .play(PlayOptions::default())
            .await
            .map_err(|err| rtsp_error("PLAY", &err))?;
        let demuxed = playing
            .demuxed()
            .map_err(|err| rtsp_error("demux setup", &err))?;

        let (jobs, decoded, ready) = spawn_decoder_thread(&endpoint.id)?;
        match ready.await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(ConnectError::Decoder(reason)),
            Err(_) => return Err(ConnectError::Decoder("decoder thread exited".to_owned())),
        }
        if let Some(extra) = read_h264_extra_config(&demuxed, stream_index) {
            let _ = jobs.send(DecodeJob::ExtraConfig(extra));
        }

        debug!(
            camera = %endpoint.id,
            %variant,
            url = %endpoint.display_url(variant),
            "RTSP session playing"
        );
        Ok(RtspReader {
            demuxed,
            stream_index,
            jobs,
            decoded,
        })
    }
}

impl StreamConnector for RtspConnector {
    type Reader = RtspReader;

    async fn connect(
        &self,
        endpoint: &StreamEndpoint,
        variant: StreamVariant,
    ) -> Result<RtspReader, ConnectError> {
        tokio::time::timeout(self.connect_timeout, self.open(endpoint, variant))
            .await
            .map_err(|_| ConnectError::Timeout(self.connect_timeout))?
    }
}

/// A playing RTSP session. Demuxing happens on the producer task; decoding
/// runs on a dedicated thread that lives as long as the reader.
pub struct RtspReader {
    demuxed: Demuxed,
    stream_index: usize,
    jobs: std_mpsc::Sender<DecodeJob>,
    decoded: Arc<DecodedSlot>,
}

impl RtspReader {
    fn submit(&self, job: DecodeJob) -> Result<(), ReadError> {
        self.jobs.send(job).map_err(|_| decoder_gone())
    }
}

impl FrameReader for RtspReader {
    async fn read_frame(&mut self) -> Result<Frame, ReadError> {
        loop {
            tokio::select! {
                biased;
                decoded = self.decoded.next() => return decoded,
                item = self.demuxed.next() => {
                    let item = match item {
                        None => return Err(ReadError::StreamEnded),
                        Some(Err(err)) => return Err(ReadError::Demux(err.to_string())),
                        Some(Ok(item)) => item,
                    };
                    let CodecItem::VideoFrame(video) = item else {
                        continue;
                    };
                    if video.stream_id() != self.stream_index {
                        continue;
                    }
                    if video.has_new_parameters()
                        && let Some(extra) =
                            read_h264_extra_config(&self.demuxed, self.stream_index)
                    {
                        self.submit(DecodeJob::ExtraConfig(extra))?;
                    }
                    self.submit(DecodeJob::FrameAvcc(video.into_data()))?;
                }
            }
        }
    }
}

fn decoder_gone() -> ReadError {
    ReadError::Decode {
        count: 0,
        last: "decoder thread exited".to_owned(),
    }
}

/// Newest decoder result. A result the reader has not taken yet is
/// overwritten by the next one.
#[derive(Default)]
struct DecodedSlot {
    latest: Mutex<Option<Result<Frame, ReadError>>>,
    ready: Notify,
}

impl DecodedSlot {
    fn put(&self, result: Result<Frame, ReadError>) {
        *self.latest.lock() = Some(result);
        self.ready.notify_one();
    }

    async fn next(&self) -> Result<Frame, ReadError> {
        loop {
            if let Some(result) = self.latest.lock().take() {
                return result;
            }
            self.ready.notified().await;
        }
    }
}

enum DecodeJob {
    ExtraConfig(Vec<u8>),
    FrameAvcc(Vec<u8>),
}

type DecoderChannels = (
    std_mpsc::Sender<DecodeJob>,
    Arc<DecodedSlot>,
    oneshot::Receiver<Result<(), String>>,
);

/// Every access unit is decoded so reference frames stay intact, but only the
/// newest picture of each batch is converted to RGB. Converted frames the
/// reader has not collected yet are replaced, not queued.
fn spawn_decoder_thread(camera: &str) -> Result<DecoderChannels, ConnectError> {
    let (jobs_tx, jobs_rx) = std_mpsc::channel::<DecodeJob>();
    let decoded = Arc::new(DecodedSlot::default());
    let out = Arc::clone(&decoded);
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name(format!("decode-{camera}"))
        .spawn(move || {
            let mut decoder = match Decoder::new() {
                Ok(decoder) => {
                    let _ = ready_tx.send(Ok(()));
                    decoder
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err.to_string()));
                    return;
                }
            };
            let mut annexb = Vec::with_capacity(4096);
            let mut consecutive_errors = 0_u32;

            while let Ok(first) = jobs_rx.recv() {
                let mut batch = vec![first];
                batch.extend(jobs_rx.try_iter());
                let newest_frame = batch
                    .iter()
                    .rposition(|job| matches!(job, DecodeJob::FrameAvcc(_)));

                for (idx, job) in batch.into_iter().enumerate() {
                    let avcc = match job {
                        DecodeJob::ExtraConfig(extra) => {
                            let _ = decoder.decode(&extra);
                            continue;
                        }
                        DecodeJob::FrameAvcc(avcc) => avcc,
                    };

                    let outcome = match avcc_frame_to_annexb(&avcc, &mut annexb) {
                        Err(reason) => Err(reason.to_owned()),
                        Ok(()) => match decoder.decode(&annexb) {
                            Ok(Some(yuv)) if Some(idx) == newest_frame => {
                                let (width, height) = yuv.dimensions();
                                let mut rgb = vec![0_u8; yuv.rgb8_len()];
                                yuv.write_rgb8(&mut rgb);
                                Ok(Frame::new(width, height, rgb))
                            }
                            Ok(_) => Ok(None),
                            Err(err) => Err(err.to_string()),
                        },
                    };

                    let message = match outcome {
                        Ok(Some(frame)) => {
                            consecutive_errors = 0;
                            Ok(frame)
                        }
                        Ok(None) => {
                            consecutive_errors = 0;
                            continue;
                        }
                        Err(reason) => {
                            consecutive_errors += 1;
                            if consecutive_errors < MAX_CONSECUTIVE_DECODE_ERRORS {
                                continue;
                            }
                            Err(ReadError::Decode {
                                count: std::mem::take(&mut consecutive_errors),
                                last: reason,
                            })
                        }
                    };
                    out.put(message);
                }
            }
        })
        .map_err(|err| ConnectError::Decoder(err.to_string()))?;

    Ok((jobs_tx, decoded, ready_rx))
}

fn rtsp_error(stage: &'static str, err: &retina::Error) -> ConnectError {
    ConnectError::Rtsp {
        stage,
        reason: err.to_string(),
    }
}

fn extract_credentials(parsed: &Url) -> Option<Credentials> {
    if parsed.username().is_empty() {
        return None;
    }
    Some(Credentials {
        username: percent_decode_userinfo(parsed.username()),
        password: percent_decode_userinfo(parsed.password().unwrap_or("")),
    })
}

fn pick_h264_stream(session: &Session<retina::client::Described>) -> Option<usize> {
    session
        .streams()
        .iter()
        .position(|stream| stream.media() == "video" && stream.encoding_name() == "h264")
}

fn to_transport(mode: TransportMode) -> Transport {
    match mode {
        TransportMode::Tcp => Transport::Tcp(TcpTransportOptions::default()),
        TransportMode::Udp => Transport::Udp(UdpTransportOptions::default()),
    }
}

fn read_h264_extra_config(demuxed: &Demuxed, stream_index: usize) -> Option<Vec<u8>> {
    let stream = demuxed.streams().get(stream_index)?;
    let ParametersRef::Video(params) = stream.parameters()? else {
        return None;
    };
    avcc_extra_data_to_annexb(params.extra_data()).ok()
}

/// Rewrites 4-byte length-prefixed NAL units as start-code delimited ones.
fn avcc_frame_to_annexb(input: &[u8], output: &mut Vec<u8>) -> Result<(), &'static str> {
    output.clear();
    output.reserve(input.len());
    let mut rest = input;
    while !rest.is_empty() {
        let (len, tail) = rest
            .split_first_chunk::<4>()
            .ok_or("truncated AVCC length prefix")?;
        let nal_len = u32::from_be_bytes(*len) as usize;
        if nal_len > tail.len() {
            return Err("AVCC NAL length exceeds payload");
        }
        let (nal, next) = tail.split_at(nal_len);
        output.extend_from_slice(&ANNEXB_START_CODE);
        output.extend_from_slice(nal);
        rest = next;
    }
    Ok(())
}

/// SPS and PPS from an `avcC` decoder configuration record, as Annex B.
fn avcc_extra_data_to_annexb(extra: &[u8]) -> Result<Vec<u8>, &'static str> {
    let sps_count = extra.get(5).ok_or("avcC record too short")? & 0x1f;
    let mut output = Vec::with_capacity(extra.len() + 16);
    let rest = copy_parameter_sets(&extra[6..], usize::from(sps_count), &mut output)?;
    let (&pps_count, rest) = rest.split_first().ok_or("avcC PPS count missing")?;
    copy_parameter_sets(rest, usize::from(pps_count), &mut output)?;
    Ok(output)
}

fn copy_parameter_sets<'a>(
    mut rest: &'a [u8],
    count: usize,
    output: &mut Vec<u8>,
) -> Result<&'a [u8], &'static str> {
    for _ in 0..count {
        let (len, tail) = rest
            .split_first_chunk::<2>()
            .ok_or("avcC parameter set length missing")?;
        let len = usize::from(u16::from_be_bytes(*len));
        if len > tail.len() {
            return Err("avcC parameter set exceeds record");
        }
        let (set, next) = tail.split_at(len);
        output.extend_from_slice(&ANNEXB_START_CODE);
        output.extend_from_slice(set);
        rest = next;
    }
    Ok(rest)
}
