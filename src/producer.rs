use crate::endpoint::{StreamEndpoint, StreamVariant};
use crate::error::ReadError;
use crate::sink::{FrameSink, SinkStatus};
use crate::source::{FrameReader, StreamConnector};
use crate::transform::FrameTransform;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_FPS: u16 = 20;
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(100);

/// Cadence and retry limits shared by every producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerTiming {
    /// Sleep between reads; also the first backoff step.
    pub frame_interval: Duration,
    pub max_backoff: Duration,
    pub read_timeout: Duration,
    /// Re-check period while paused, on top of control-change wakeups.
    pub pause_poll: Duration,
}

impl Default for ProducerTiming {
    fn default() -> Self {
        Self {
            frame_interval: frame_interval_for_fps(DEFAULT_FPS),
            max_backoff: DEFAULT_MAX_BACKOFF,
            read_timeout: DEFAULT_READ_TIMEOUT,
            pause_poll: DEFAULT_PAUSE_POLL,
        }
    }
}

#[must_use]
pub fn frame_interval_for_fps(fps: u16) -> Duration {
    Duration::from_millis(1_000 / u64::from(fps.max(1)))
}

/// Doubling delay from `min`, capped at `max`.
#[derive(Debug, Clone)]
struct Backoff {
    min: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(Duration::from_millis(1));
        Self {
            min,
            max: max.max(min),
            next: min,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = self.min;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ProducerControl {
    stop: bool,
    paused: bool,
    forced_variant: Option<StreamVariant>,
}

impl ProducerControl {
    fn effective_variant(&self, default: StreamVariant) -> StreamVariant {
        self.forced_variant.unwrap_or(default)
    }

    /// True when a session opened at `variant` has to be abandoned.
    fn interrupts(&self, variant: StreamVariant, default: StreamVariant) -> bool {
        self.stop || self.paused || self.effective_variant(default) != variant
    }
}

/// Owner-side handle for one camera's producer task. Every method is safe to
/// call while the task runs; the task notices within one frame interval.
#[derive(Debug)]
pub struct ProducerHandle {
    endpoint: Arc<StreamEndpoint>,
    control: watch::Sender<ProducerControl>,
    sink: Arc<FrameSink>,
    task: JoinHandle<()>,
}

impl ProducerHandle {
    pub fn spawn<C: StreamConnector>(
        endpoint: StreamEndpoint,
        connector: Arc<C>,
        transform: Arc<FrameTransform>,
        timing: ProducerTiming,
    ) -> Self {
        let endpoint = Arc::new(endpoint);
        let sink = Arc::new(FrameSink::new());
        let (control, control_rx) = watch::channel(ProducerControl::default());
        let producer = Producer {
            endpoint: endpoint.clone(),
            connector,
            transform,
            sink: sink.clone(),
            control: control_rx,
            timing,
            backoff: Backoff::new(timing.frame_interval, timing.max_backoff),
        };
        let task = tokio::spawn(producer.run());
        Self {
            endpoint,
            control,
            sink,
            task,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.endpoint.id
    }

    #[must_use]
    pub fn endpoint(&self) -> &StreamEndpoint {
        &self.endpoint
    }

    /// Terminal. The task closes its connection and exits.
    pub fn request_stop(&self) {
        self.control.send_modify(|control| control.stop = true);
    }

    pub fn set_paused(&self, paused: bool) {
        let changed = self.control.send_if_modified(|control| {
            if control.paused == paused {
                return false;
            }
            control.paused = paused;
            true
        });
        if changed {
            debug!(camera = %self.endpoint.id, paused, "producer pause toggled");
        }
    }

    pub fn set_forced_variant(&self, variant: Option<StreamVariant>) {
        let changed = self.control.send_if_modified(|control| {
            if control.forced_variant == variant {
                return false;
            }
            control.forced_variant = variant;
            true
        });
        if changed {
            debug!(camera = %self.endpoint.id, forced = ?variant, "forced variant changed");
        }
    }

    #[must_use]
    pub fn current_sink(&self) -> Arc<FrameSink> {
        self.sink.clone()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.control.borrow().paused
    }

    #[must_use]
    pub fn forced_variant(&self) -> Option<StreamVariant> {
        self.control.borrow().forced_variant
    }

    /// The variant the producer is (or will be) connected at.
    #[must_use]
    pub fn effective_variant(&self) -> StreamVariant {
        self.control.borrow().effective_variant(self.endpoint.variant)
    }

    /// Requests a stop and hands back the task so the caller can reap it later.
    #[must_use]
    pub fn retire(self) -> JoinHandle<()> {
        self.request_stop();
        self.task
    }
}

enum SessionEnd {
    /// Control changed; re-evaluate from the top without backing off.
    Interrupted,
    /// Connect or read failed and the retry delay has elapsed.
    Retry,
}

struct Producer<C: StreamConnector> {
    endpoint: Arc<StreamEndpoint>,
    connector: Arc<C>,
    transform: Arc<FrameTransform>,
    sink: Arc<FrameSink>,
    control: watch::Receiver<ProducerControl>,
    timing: ProducerTiming,
    backoff: Backoff,
}

impl<C: StreamConnector> Producer<C> {
    async fn run(mut self) {
        info!(
            camera = %self.endpoint.id,
            url = %self.endpoint.display_url(self.endpoint.variant),
            "producer started"
        );
        loop {
            // A dropped handle counts as a stop request.
            if self.control.has_changed().is_err() {
                break;
            }
            let control = *self.control.borrow_and_update();
            if control.stop {
                break;
            }
            if control.paused {
                if let Ok(Err(_)) =
                    tokio::time::timeout(self.timing.pause_poll, self.control.changed()).await
                {
                    break;
                }
                continue;
            }

            let variant = control.effective_variant(self.endpoint.variant);
            if let SessionEnd::Interrupted = self.run_session(variant).await {
                debug!(camera = %self.endpoint.id, %variant, "re-evaluating controls");
            }
        }
        info!(camera = %self.endpoint.id, "producer stopped");
    }

    async fn run_session(&mut self, variant: StreamVariant) -> SessionEnd {
        let default = self.endpoint.variant;
        if self.sink.latest().status != SinkStatus::Connecting {
            self.sink.publish_status(SinkStatus::Connecting, None);
        }

        debug!(camera = %self.endpoint.id, %variant, "connecting");
        let connected = tokio::select! {
            biased;
            () = interrupted(&mut self.control, variant, default) => return SessionEnd::Interrupted,
            result = self.connector.connect(&self.endpoint, variant) => result,
        };
        let mut reader = match connected {
            Ok(reader) => reader,
            Err(err) => {
                let delay = self.backoff.next_delay();
                warn!(
                    camera = %self.endpoint.id,
                    %variant,
                    delay_ms = delay.as_millis() as u64,
                    "connect failed: {err}"
                );
                return self.sleep(delay, variant).await;
            }
        };
        info!(camera = %self.endpoint.id, %variant, "stream connected");

        let read_timeout = self.timing.read_timeout;
        let mut frames = 0_u64;
        loop {
            let read = tokio::select! {
                biased;
                () = interrupted(&mut self.control, variant, default) => {
                    debug!(
                        camera = %self.endpoint.id,
                        %variant,
                        frames,
                        "session interrupted by control change"
                    );
                    return SessionEnd::Interrupted;
                }
                result = tokio::time::timeout(read_timeout, reader.read_frame()) => {
                    result.unwrap_or(Err(ReadError::Timeout(read_timeout)))
                }
            };

            match read {
                Ok(frame) => {
                    let frame = self.transform.apply(frame, &self.endpoint);
                    self.sink.publish_frame(frame);
                    self.backoff.reset();
                    frames += 1;
                }
                Err(err) => {
                    self.sink
                        .publish_status(SinkStatus::Failed, Some(err.to_string()));
                    // A session that never produced a frame is as bad as a
                    // refused connect.
                    let delay = if frames == 0 {
                        self.backoff.next_delay()
                    } else {
                        self.timing.frame_interval
                    };
                    warn!(
                        camera = %self.endpoint.id,
                        %variant,
                        frames,
                        delay_ms = delay.as_millis() as u64,
                        "read failed: {err}"
                    );
                    drop(reader);
                    return self.sleep(delay, variant).await;
                }
            }

            if let SessionEnd::Interrupted = self.sleep(self.timing.frame_interval, variant).await {
                return SessionEnd::Interrupted;
            }
        }
    }

    async fn sleep(&mut self, delay: Duration, variant: StreamVariant) -> SessionEnd {
        let default = self.endpoint.variant;
        tokio::select! {
            biased;
            () = interrupted(&mut self.control, variant, default) => SessionEnd::Interrupted,
            () = tokio::time::sleep(delay) => SessionEnd::Retry,
        }
    }
}

/// Resolves once stop, pause or a variant change applies to a session opened
/// at `variant`, or when the handle is gone.
async fn interrupted(
    control: &mut watch::Receiver<ProducerControl>,
    variant: StreamVariant,
    default: StreamVariant,
) {
    let _ = control
        .wait_for(|control| control.interrupts(variant, default))
        .await;
}

#[cfg(test)]
mod tests {
    use super::{Backoff, ProducerHandle, ProducerTiming};
    use crate::endpoint::{StreamEndpoint, StreamVariant};
    use crate::sink::SinkStatus;
    use crate::source::mock::{ScriptedConnector, Session};
    use crate::transform::FrameTransform;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn timing() -> ProducerTiming {
        ProducerTiming {
            frame_interval: Duration::from_millis(50),
            max_backoff: Duration::from_millis(400),
            read_timeout: Duration::from_secs(1),
            pause_poll: Duration::from_millis(100),
        }
    }

    fn spawn(id: &str, connector: &Arc<ScriptedConnector>) -> ProducerHandle {
        let endpoint = StreamEndpoint {
            id: id.to_owned(),
            ..StreamEndpoint::new("10.0.0.9")
        };
        ProducerHandle::spawn(
            endpoint,
            connector.clone(),
            Arc::new(FrameTransform::default()),
            timing(),
        )
    }

    #[test]
    fn backoff_doubles_then_caps_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(50), Duration::from_millis(300));
        let delays: Vec<u64> = (0..5)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![50, 100, 200, 300, 300]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn three_frames_then_failure_marks_failed_and_reconnects() {
        let connector = ScriptedConnector::new(Session::Refuse);
        connector.script("cam1", [Session::Frames(3)]);
        let handle = spawn("cam1", &connector);
        let sink = handle.current_sink();

        sleep(Duration::from_millis(120)).await;
        let snapshot = sink.latest();
        assert_eq!(snapshot.status, SinkStatus::Ready);
        assert_eq!(snapshot.sequence, 3);

        sleep(Duration::from_millis(50)).await;
        let snapshot = sink.latest();
        assert_eq!(snapshot.status, SinkStatus::Failed);
        assert_eq!(snapshot.sequence, 4);
        assert!(snapshot.frame.is_none());

        sleep(Duration::from_millis(50)).await;
        let attempts = connector.attempts_for("cam1");
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1].at - attempts[0].at, Duration::from_millis(200));
        assert_eq!(attempts[1].variant, StreamVariant::Secondary);
        assert_eq!(sink.latest().status, SinkStatus::Connecting);

        handle.retire().await.expect("producer task");
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_connect_failures_back_off() {
        let connector = ScriptedConnector::new(Session::Refuse);
        let handle = spawn("cam1", &connector);

        sleep(Duration::from_millis(1_200)).await;
        let attempts = connector.attempts_for("cam1");
        let gaps: Vec<u64> = attempts
            .windows(2)
            .map(|pair| (pair[1].at - pair[0].at).as_millis() as u64)
            .collect();
        assert_eq!(&gaps[..5], &[50, 100, 200, 400, 400]);
        assert!(gaps.iter().all(|gap| *gap >= 50));

        // Refused connects never publish; the sink still shows its initial state.
        let snapshot = handle.current_sink().latest();
        assert_eq!(snapshot.status, SinkStatus::Connecting);
        assert_eq!(snapshot.sequence, 0);

        handle.retire().await.expect("producer task");
    }

    #[tokio::test(start_paused = true)]
    async fn pause_halts_only_the_paused_producer() {
        let connector = ScriptedConnector::new(Session::Endless);
        let first = spawn("cam1", &connector);
        let second = spawn("cam2", &connector);
        let (first_sink, second_sink) = (first.current_sink(), second.current_sink());

        sleep(Duration::from_millis(210)).await;
        first.set_paused(true);
        let frozen = first_sink.latest().sequence;
        let second_before = second_sink.latest().sequence;
        assert!(frozen >= 4);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(first_sink.latest().sequence, frozen);
        assert!(second_sink.latest().sequence >= second_before + 9);
        assert!(first.is_paused());

        first.set_paused(false);
        sleep(Duration::from_millis(210)).await;
        let resumed = first_sink.latest();
        assert_eq!(resumed.status, SinkStatus::Ready);
        assert!(resumed.sequence > frozen + 1);
        // The connection is released while paused.
        assert_eq!(connector.attempts_for("cam1").len(), 2);
        assert_eq!(connector.attempts_for("cam2").len(), 1);

        first.retire().await.expect("producer task");
        second.retire().await.expect("producer task");
    }

    #[tokio::test(start_paused = true)]
    async fn forced_variant_reconnects_only_that_producer() {
        let connector = ScriptedConnector::new(Session::Endless);
        let first = spawn("cam1", &connector);
        let second = spawn("cam2", &connector);

        sleep(Duration::from_millis(120)).await;
        first.set_forced_variant(Some(StreamVariant::Primary));
        assert_eq!(first.effective_variant(), StreamVariant::Primary);
        sleep(Duration::from_millis(120)).await;

        let variants: Vec<StreamVariant> = connector
            .attempts_for("cam1")
            .iter()
            .map(|attempt| attempt.variant)
            .collect();
        assert_eq!(variants, vec![StreamVariant::Secondary, StreamVariant::Primary]);
        let others = connector.attempts_for("cam2");
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].variant, StreamVariant::Secondary);
        assert_eq!(first.current_sink().latest().status, SinkStatus::Ready);

        // Same value again is not a change.
        first.set_forced_variant(Some(StreamVariant::Primary));
        sleep(Duration::from_millis(120)).await;
        assert_eq!(connector.attempts_for("cam1").len(), 2);

        first.retire().await.expect("producer task");
        second.retire().await.expect("producer task");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_read_times_out_as_failure() {
        let connector = ScriptedConnector::new(Session::Hang);
        let handle = spawn("cam1", &connector);

        sleep(Duration::from_millis(1_010)).await;
        let snapshot = handle.current_sink().latest();
        assert_eq!(snapshot.status, SinkStatus::Failed);
        assert!(
            snapshot
                .detail
                .as_deref()
                .is_some_and(|detail| detail.contains("timed out"))
        );

        handle.retire().await.expect("producer task");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_a_blocked_read_and_is_terminal() {
        let connector = ScriptedConnector::new(Session::Hang);
        let handle = spawn("cam1", &connector);
        let sink = handle.current_sink();

        sleep(Duration::from_millis(100)).await;
        let before = sink.latest().sequence;
        tokio::time::timeout(Duration::from_millis(5), handle.retire())
            .await
            .expect("stop should not wait for the read timeout")
            .expect("producer task");

        sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.latest().sequence, before);
        assert_eq!(connector.attempts_for("cam1").len(), 1);
    }
}
