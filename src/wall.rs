use crate::endpoint::StreamEndpoint;
use crate::producer::{ProducerHandle, ProducerTiming};
use crate::sink::FrameSink;
use crate::source::StreamConnector;
use crate::transform::FrameTransform;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Where the display loop finds a camera's sink. It never sees producers.
pub trait SinkLookup {
    fn sink(&self, camera_id: &str) -> Option<Arc<FrameSink>>;
}

impl SinkLookup for HashMap<String, Arc<FrameSink>> {
    fn sink(&self, camera_id: &str) -> Option<Arc<FrameSink>> {
        self.get(camera_id).cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub kept: Vec<String>,
}

impl ReconcileSummary {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

/// One producer per enabled endpoint, in configuration order.
pub struct ProducerSet<C: StreamConnector> {
    connector: Arc<C>,
    transform: Arc<FrameTransform>,
    timing: ProducerTiming,
    producers: Vec<ProducerHandle>,
    retiring: Vec<JoinHandle<()>>,
}

impl<C: StreamConnector> ProducerSet<C> {
    #[must_use]
    pub fn new(connector: Arc<C>, transform: Arc<FrameTransform>, timing: ProducerTiming) -> Self {
        Self {
            connector,
            transform,
            timing,
            producers: Vec::new(),
            retiring: Vec::new(),
        }
    }

    /// Brings the running set in line with `endpoints`. Producers whose
    /// endpoint is unchanged keep running untouched; changed, removed and
    /// disabled ones are stopped; new ones are started.
    pub fn reconcile(&mut self, endpoints: &[StreamEndpoint]) -> ReconcileSummary {
        let mut seen = HashSet::new();
        let wanted: Vec<&StreamEndpoint> = endpoints
            .iter()
            .filter(|endpoint| endpoint.enabled)
            .filter(|endpoint| {
                let fresh = seen.insert(endpoint.id.as_str());
                if !fresh {
                    warn!(camera = %endpoint.id, "ignoring duplicate camera id");
                }
                fresh
            })
            .collect();

        let mut summary = ReconcileSummary::default();
        let mut keep = HashMap::new();
        for handle in std::mem::take(&mut self.producers) {
            let unchanged = wanted
                .iter()
                .any(|endpoint| endpoint.id == handle.id() && **endpoint == *handle.endpoint());
            if unchanged {
                keep.insert(handle.id().to_owned(), handle);
            } else {
                summary.stopped.push(handle.id().to_owned());
                self.retiring.push(handle.retire());
            }
        }

        for endpoint in wanted {
            if let Some(handle) = keep.remove(&endpoint.id) {
                summary.kept.push(endpoint.id.clone());
                self.producers.push(handle);
            } else {
                summary.started.push(endpoint.id.clone());
                self.producers.push(ProducerHandle::spawn(
                    endpoint.clone(),
                    self.connector.clone(),
                    self.transform.clone(),
                    self.timing,
                ));
            }
        }

        self.retiring.retain(|task| !task.is_finished());
        info!(
            started = summary.started.len(),
            stopped = summary.stopped.len(),
            kept = summary.kept.len(),
            "producer set reconciled"
        );
        summary
    }

    #[must_use]
    pub fn get(&self, camera_id: &str) -> Option<&ProducerHandle> {
        self.producers.iter().find(|handle| handle.id() == camera_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProducerHandle> {
        self.producers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.producers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Stops every producer and waits for all tasks, including ones retired
    /// by earlier reconciles.
    pub async fn shutdown(&mut self) {
        let mut tasks: Vec<JoinHandle<()>> = std::mem::take(&mut self.retiring);
        tasks.extend(
            std::mem::take(&mut self.producers)
                .into_iter()
                .map(ProducerHandle::retire),
        );
        for task in tasks {
            if let Err(err) = task.await {
                warn!("producer task ended abnormally: {err}");
            }
        }
    }
}

impl<C: StreamConnector> SinkLookup for ProducerSet<C> {
    fn sink(&self, camera_id: &str) -> Option<Arc<FrameSink>> {
        self.get(camera_id).map(ProducerHandle::current_sink)
    }
}
