use crate::endpoint::{StreamEndpoint, StreamVariant};
use crate::error::ViewError;
use crate::frame::PixelRect;
use crate::producer::ProducerHandle;
use crate::ptz::{PtzClient, PtzDirection};
use crate::source::StreamConnector;
use crate::wall::{ProducerSet, ReconcileSummary};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

const ZOOM_STEP: f32 = 1.2;
const MIN_ZOOM: f32 = 0.2;
const MAX_ZOOM: f32 = 8.0;

/// Display-side zoom and pan for the focused camera. Never reaches the
/// producer: it only picks which part of a published frame gets shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPan {
    scale: f32,
    /// View center in normalized frame coordinates.
    center: (f32, f32),
}

impl Default for ZoomPan {
    fn default() -> Self {
        Self {
            scale: 1.0,
            center: (0.5, 0.5),
        }
    }
}

impl ZoomPan {
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zoom_in(&mut self) {
        self.scale = (self.scale * ZOOM_STEP).min(MAX_ZOOM);
        self.clamp_center();
    }

    pub fn zoom_out(&mut self) {
        self.scale = (self.scale / ZOOM_STEP).max(MIN_ZOOM);
        self.clamp_center();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Moves the view by fractions of what is currently visible.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let visible = 1.0 / self.scale.max(1.0);
        self.center.0 += dx * visible;
        self.center.1 += dy * visible;
        self.clamp_center();
    }

    fn clamp_center(&mut self) {
        let half = 0.5 / self.scale.max(1.0);
        self.center.0 = self.center.0.clamp(half, 1.0 - half);
        self.center.1 = self.center.1.clamp(half, 1.0 - half);
    }

    /// Part of a `width` x `height` frame to show. Zoomed-out views show the
    /// whole frame; the display shrinks it instead.
    #[must_use]
    pub fn source_rect(&self, width: usize, height: usize) -> PixelRect {
        let scale = self.scale.max(1.0);
        let crop_w = ((width as f32 / scale).round() as usize).clamp(1, width.max(1));
        let crop_h = ((height as f32 / scale).round() as usize).clamp(1, height.max(1));
        let left = self.center.0 * width as f32 - crop_w as f32 / 2.0;
        let top = self.center.1 * height as f32 - crop_h as f32 / 2.0;
        PixelRect {
            x: (left.round().max(0.0) as usize).min(width.saturating_sub(crop_w)),
            y: (top.round().max(0.0) as usize).min(height.saturating_sub(crop_h)),
            width: crop_w.min(width),
            height: crop_h.min(height),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub camera_id: String,
    pub zoom: ZoomPan,
}

/// Full-screen orchestration on top of the producer set. Grid mode is the
/// absence of focus.
pub struct ViewController<C: StreamConnector, P: PtzClient> {
    producers: ProducerSet<C>,
    ptz: Arc<P>,
    fullscreen_variant: Option<StreamVariant>,
    focus: Option<Focus>,
}

impl<C: StreamConnector, P: PtzClient> ViewController<C, P> {
    #[must_use]
    pub fn new(
        producers: ProducerSet<C>,
        ptz: Arc<P>,
        fullscreen_variant: Option<StreamVariant>,
    ) -> Self {
        Self {
            producers,
            ptz,
            fullscreen_variant,
            focus: None,
        }
    }

    #[must_use]
    pub fn producers(&self) -> &ProducerSet<C> {
        &self.producers
    }

    #[must_use]
    pub fn focus(&self) -> Option<&Focus> {
        self.focus.as_ref()
    }

    #[must_use]
    pub fn is_full_screen(&self) -> bool {
        self.focus.is_some()
    }

    pub fn set_fullscreen_variant(&mut self, variant: Option<StreamVariant>) {
        self.fullscreen_variant = variant;
    }

    /// Pauses every other producer and forces the full-screen variant on
    /// `camera_id`.
    pub fn enter_full_screen(&mut self, camera_id: &str) -> Result<(), ViewError> {
        if self.producers.get(camera_id).is_none() {
            return Err(ViewError::UnknownCamera(camera_id.to_owned()));
        }
        self.focus = Some(Focus {
            camera_id: camera_id.to_owned(),
            zoom: ZoomPan::default(),
        });
        self.apply_focus(true);
        info!(camera = %camera_id, "entered full-screen");
        Ok(())
    }

    /// Resumes every producer and clears forced variants. Returns whether a
    /// camera was focused.
    pub fn exit_full_screen(&mut self) -> bool {
        for handle in self.producers.iter() {
            handle.set_forced_variant(None);
            handle.set_paused(false);
        }
        let was_focused = self.focus.take();
        if let Some(focus) = &was_focused {
            info!(camera = %focus.camera_id, "left full-screen");
        }
        was_focused.is_some()
    }

    /// Flips the focused camera between primary and secondary.
    pub fn toggle_quality(&mut self) -> Result<StreamVariant, ViewError> {
        let handle = self.focused_handle()?;
        let next = handle.effective_variant().toggled();
        handle.set_forced_variant(Some(next));
        info!(camera = %handle.id(), variant = %next, "quality toggled");
        Ok(next)
    }

    #[must_use]
    pub fn focused_variant(&self) -> Option<StreamVariant> {
        self.focused_handle()
            .ok()
            .map(ProducerHandle::effective_variant)
    }

    /// A detached PTZ request for the focused camera, so the caller decides
    /// where it runs. Never touches the frame path.
    pub fn ptz_command(
        &self,
        direction: PtzDirection,
    ) -> Result<impl Future<Output = bool> + Send + use<C, P>, ViewError> {
        let endpoint: StreamEndpoint = self.focused_handle()?.endpoint().clone();
        let ptz = self.ptz.clone();
        Ok(async move { ptz.send_ptz_command(&endpoint, direction).await })
    }

    pub fn zoom_in(&mut self) -> Result<f32, ViewError> {
        let zoom = self.zoom_mut()?;
        zoom.zoom_in();
        Ok(zoom.scale())
    }

    pub fn zoom_out(&mut self) -> Result<f32, ViewError> {
        let zoom = self.zoom_mut()?;
        zoom.zoom_out();
        Ok(zoom.scale())
    }

    pub fn reset_zoom(&mut self) -> Result<(), ViewError> {
        self.zoom_mut()?.reset();
        Ok(())
    }

    pub fn pan(&mut self, dx: f32, dy: f32) -> Result<(), ViewError> {
        self.zoom_mut()?.pan(dx, dy);
        Ok(())
    }

    /// Reconciles producers and keeps the view consistent with the result:
    /// losing the focused camera drops back to the grid, anything started
    /// while another camera is full-screen starts paused.
    pub fn reconcile(&mut self, endpoints: &[StreamEndpoint]) -> ReconcileSummary {
        let summary = self.producers.reconcile(endpoints);
        if let Some(focus) = &self.focus {
            if self.producers.get(&focus.camera_id).is_none() {
                info!(camera = %focus.camera_id, "focused camera removed");
                self.exit_full_screen();
            } else {
                self.apply_focus(false);
            }
        }
        summary
    }

    pub async fn shutdown(&mut self) {
        self.focus = None;
        self.producers.shutdown().await;
    }

    fn apply_focus(&self, reset_quality: bool) {
        let Some(focus) = &self.focus else {
            return;
        };
        for handle in self.producers.iter() {
            if handle.id() == focus.camera_id {
                if reset_quality || handle.forced_variant().is_none() {
                    let variant = self
                        .fullscreen_variant
                        .unwrap_or(handle.endpoint().variant);
                    handle.set_forced_variant(Some(variant));
                }
                handle.set_paused(false);
            } else {
                handle.set_forced_variant(None);
                handle.set_paused(true);
            }
        }
    }

    fn focused_handle(&self) -> Result<&ProducerHandle, ViewError> {
        let focus = self.focus.as_ref().ok_or(ViewError::NotFullScreen)?;
        self.producers
            .get(&focus.camera_id)
            .ok_or_else(|| ViewError::UnknownCamera(focus.camera_id.clone()))
    }

    fn zoom_mut(&mut self) -> Result<&mut ZoomPan, ViewError> {
        self.focus
            .as_mut()
            .map(|focus| &mut focus.zoom)
            .ok_or(ViewError::NotFullScreen)
    }
}

#[cfg(test)]
mod tests {
    use super::{ViewController, ZoomPan};
    use crate::endpoint::{StreamEndpoint, StreamVariant};
    use crate::error::ViewError;
    use crate::frame::PixelRect;
    use crate::producer::ProducerTiming;
    use crate::ptz::{PtzClient, PtzDirection};
    use crate::sink::SinkStatus;
    use crate::source::mock::{ScriptedConnector, Session};
    use crate::transform::FrameTransform;
    use crate::wall::{ProducerSet, SinkLookup};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingPtz {
        calls: Mutex<Vec<(String, PtzDirection)>>,
        refuse: bool,
    }

    impl PtzClient for RecordingPtz {
        async fn send_ptz_command(
            &self,
            endpoint: &StreamEndpoint,
            direction: PtzDirection,
        ) -> bool {
            self.calls.lock().push((endpoint.id.clone(), direction));
            !self.refuse
        }
    }

    async fn send_ptz(
        view: &ViewController<ScriptedConnector, RecordingPtz>,
        direction: PtzDirection,
    ) -> Result<bool, ViewError> {
        Ok(view.ptz_command(direction)?.await)
    }

    fn endpoint(id: &str) -> StreamEndpoint {
        StreamEndpoint {
            id: id.to_owned(),
            ..StreamEndpoint::new("10.0.0.8")
        }
    }

    fn cameras(count: usize) -> Vec<StreamEndpoint> {
        (1..=count).map(|idx| endpoint(&format!("cam{idx}"))).collect()
    }

    fn controller(
        connector: &Arc<ScriptedConnector>,
        ptz: Arc<RecordingPtz>,
        fullscreen_variant: Option<StreamVariant>,
    ) -> ViewController<ScriptedConnector, RecordingPtz> {
        let producers = ProducerSet::new(
            connector.clone(),
            Arc::new(FrameTransform::default()),
            ProducerTiming {
                frame_interval: Duration::from_millis(50),
                ..ProducerTiming::default()
            },
        );
        ViewController::new(producers, ptz, fullscreen_variant)
    }

    #[tokio::test(start_paused = true)]
    async fn full_screen_pauses_all_but_the_focused_camera() {
        let connector = ScriptedConnector::new(Session::Endless);
        let mut view = controller(&connector, Arc::default(), Some(StreamVariant::Primary));
        view.reconcile(&cameras(4));
        sleep(Duration::from_millis(60)).await;

        view.enter_full_screen("cam1").expect("cam1 exists");
        for handle in view.producers().iter() {
            let focused = handle.id() == "cam1";
            assert_eq!(handle.is_paused(), !focused, "{}", handle.id());
            let expected = focused.then_some(StreamVariant::Primary);
            assert_eq!(handle.forced_variant(), expected, "{}", handle.id());
        }

        let cam2 = view.producers().sink("cam2").expect("cam2 running");
        let frozen = cam2.latest().sequence;
        sleep(Duration::from_millis(300)).await;
        assert_eq!(cam2.latest().sequence, frozen);
        let cam1 = view.producers().sink("cam1").expect("cam1 running");
        assert_eq!(cam1.latest().status, SinkStatus::Ready);
        assert_eq!(
            connector.attempts_for("cam1").last().map(|attempt| attempt.variant),
            Some(StreamVariant::Primary)
        );

        assert!(view.exit_full_screen());
        for handle in view.producers().iter() {
            assert!(!handle.is_paused());
            assert_eq!(handle.forced_variant(), None);
        }
        sleep(Duration::from_millis(120)).await;
        assert!(cam2.latest().sequence > frozen);
        assert!(!view.exit_full_screen());

        view.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_camera_cannot_be_focused() {
        let connector = ScriptedConnector::new(Session::Endless);
        let mut view = controller(&connector, Arc::default(), None);
        view.reconcile(&cameras(2));
        assert_eq!(
            view.enter_full_screen("cam9"),
            Err(ViewError::UnknownCamera("cam9".to_owned()))
        );
        assert!(!view.is_full_screen());
        assert!(view.producers().iter().all(|handle| !handle.is_paused()));
        assert_eq!(view.toggle_quality(), Err(ViewError::NotFullScreen));
        view.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn quality_toggle_only_touches_the_focused_producer() {
        let connector = ScriptedConnector::new(Session::Endless);
        let mut view = controller(&connector, Arc::default(), None);
        view.reconcile(&cameras(3));
        view.enter_full_screen("cam2").expect("cam2 exists");
        assert_eq!(view.focused_variant(), Some(StreamVariant::Secondary));

        assert_eq!(view.toggle_quality(), Ok(StreamVariant::Primary));
        assert_eq!(view.toggle_quality(), Ok(StreamVariant::Secondary));
        assert_eq!(view.toggle_quality(), Ok(StreamVariant::Primary));
        sleep(Duration::from_millis(120)).await;

        let cam2 = connector.attempts_for("cam2");
        assert_eq!(cam2.last().map(|attempt| attempt.variant), Some(StreamVariant::Primary));
        for other in ["cam1", "cam3"] {
            assert!(
                connector
                    .attempts_for(other)
                    .iter()
                    .all(|attempt| attempt.variant == StreamVariant::Secondary)
            );
            assert_eq!(view.producers().get(other).and_then(|h| h.forced_variant()), None);
        }
        view.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ptz_goes_to_the_focused_camera() {
        let connector = ScriptedConnector::new(Session::Endless);
        let ptz = Arc::new(RecordingPtz::default());
        let mut view = controller(&connector, ptz.clone(), None);
        view.reconcile(&cameras(2));

        assert_eq!(send_ptz(&view, PtzDirection::Up).await, Err(ViewError::NotFullScreen));
        view.enter_full_screen("cam2").expect("cam2 exists");
        assert_eq!(send_ptz(&view, PtzDirection::Left).await, Ok(true));
        let detached = view.ptz_command(PtzDirection::Down).expect("focused");
        assert!(tokio::spawn(detached).await.expect("ptz task"));

        assert_eq!(
            *ptz.calls.lock(),
            vec![
                ("cam2".to_owned(), PtzDirection::Left),
                ("cam2".to_owned(), PtzDirection::Down)
            ]
        );

        let refusing = Arc::new(RecordingPtz {
            refuse: true,
            ..RecordingPtz::default()
        });
        let mut other = controller(&connector, refusing, None);
        other.reconcile(&cameras(1));
        other.enter_full_screen("cam1").expect("cam1 exists");
        assert_eq!(send_ptz(&other, PtzDirection::Right).await, Ok(false));
        assert!(other.is_full_screen());

        view.shutdown().await;
        other.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_keeps_full_screen_consistent() {
        let connector = ScriptedConnector::new(Session::Endless);
        let mut view = controller(&connector, Arc::default(), None);
        view.reconcile(&cameras(2));
        view.enter_full_screen("cam1").expect("cam1 exists");

        view.reconcile(&cameras(3));
        assert!(view.producers().get("cam3").is_some_and(|h| h.is_paused()));
        assert!(view.producers().get("cam1").is_some_and(|h| !h.is_paused()));

        let without_focus: Vec<StreamEndpoint> = cameras(3).into_iter().skip(1).collect();
        view.reconcile(&without_focus);
        assert!(!view.is_full_screen());
        assert!(view.producers().iter().all(|handle| !handle.is_paused()));
        view.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zoom_is_bounded_and_requires_focus() {
        let connector = ScriptedConnector::new(Session::Endless);
        let mut view = controller(&connector, Arc::default(), None);
        view.reconcile(&cameras(1));
        assert_eq!(view.zoom_in(), Err(ViewError::NotFullScreen));

        view.enter_full_screen("cam1").expect("cam1 exists");
        let mut scale = 1.0;
        for _ in 0..30 {
            scale = view.zoom_in().expect("focused");
        }
        assert_eq!(scale, 8.0);
        for _ in 0..30 {
            scale = view.zoom_out().expect("focused");
        }
        assert_eq!(scale, 0.2);
        view.reset_zoom().expect("focused");
        assert_eq!(view.focus().map(|focus| focus.zoom), Some(ZoomPan::default()));
        view.shutdown().await;
    }

    #[test]
    fn source_rect_crops_around_the_pan_center() {
        let mut zoom = ZoomPan::default();
        assert_eq!(
            zoom.source_rect(640, 360),
            PixelRect {
                x: 0,
                y: 0,
                width: 640,
                height: 360
            }
        );

        zoom.scale = 2.0;
        assert_eq!(
            zoom.source_rect(640, 360),
            PixelRect {
                x: 160,
                y: 90,
                width: 320,
                height: 180
            }
        );

        zoom.pan(5.0, -5.0);
        assert_eq!(
            zoom.source_rect(640, 360),
            PixelRect {
                x: 320,
                y: 0,
                width: 320,
                height: 180
            }
        );

        zoom.scale = 0.5;
        assert_eq!(zoom.source_rect(640, 360).width, 640);
    }
}
