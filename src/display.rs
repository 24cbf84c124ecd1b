use crate::frame::{Frame, PixelRect};
use crate::sink::SinkStatus;
use crate::view::ZoomPan;
use crate::wall::SinkLookup;
use anyhow::{Context, Result, bail};
use fast_image_resize as fir;
use std::time::{Duration, Instant};
use tracing::warn;

/// A terminal-cell rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellRect {
    pub col: u16,
    pub row: u16,
    pub cols: u16,
    pub rows: u16,
}

/// One camera's region on the render surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub camera_id: String,
    pub label: String,
    pub cells: CellRect,
    pub px_width: usize,
    pub px_height: usize,
}

pub trait RenderSurface {
    /// `frame` is exactly `slot.px_width` x `slot.px_height`.
    fn present(&mut self, slot: &Slot, frame: &Frame) -> Result<()>;
    fn indicate(&mut self, slot: &Slot, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Grid,
    FullScreen,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub presented: usize,
    pub indicated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// What a slot currently shows, to skip redraws of unchanged snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Shown {
    sequence: Option<u64>,
    zoom: Option<ZoomPan>,
}

/// Pulls the latest snapshot of every visible camera on a fixed cadence and
/// hands it to the render surface. Read-only towards producers and sinks;
/// render errors are logged and retried on the next tick.
pub struct DisplayLoop {
    grid_interval: Duration,
    fullscreen_interval: Duration,
    mode: ViewMode,
    slots: Vec<Slot>,
    shown: Vec<Option<Shown>>,
    last_tick: Option<Instant>,
    scaler: Scaler,
}

impl DisplayLoop {
    #[must_use]
    pub fn new(grid_interval: Duration, fullscreen_interval: Duration) -> Self {
        Self {
            grid_interval,
            fullscreen_interval,
            mode: ViewMode::Grid,
            slots: Vec::new(),
            shown: Vec::new(),
            last_tick: None,
            scaler: Scaler::default(),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        match self.mode {
            ViewMode::Grid => self.grid_interval,
            ViewMode::FullScreen => self.fullscreen_interval,
        }
    }

    pub fn set_intervals(&mut self, grid_interval: Duration, fullscreen_interval: Duration) {
        self.grid_interval = grid_interval;
        self.fullscreen_interval = fullscreen_interval;
    }

    /// Returns true when the layout changed and every slot will be redrawn.
    pub fn set_layout(&mut self, mode: ViewMode, slots: Vec<Slot>) -> bool {
        if mode == self.mode && slots == self.slots {
            return false;
        }
        self.mode = mode;
        self.shown = vec![None; slots.len()];
        self.slots = slots;
        true
    }

    /// Forgets what is on screen, e.g. after the terminal was cleared.
    pub fn invalidate(&mut self) {
        self.shown.iter_mut().for_each(|shown| *shown = None);
    }

    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_tick
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval())
    }

    /// Time left until the next tick is due.
    #[must_use]
    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.last_tick.map_or(Duration::ZERO, |last| {
            self.interval()
                .saturating_sub(now.saturating_duration_since(last))
        })
    }

    pub fn tick(
        &mut self,
        now: Instant,
        sinks: &impl SinkLookup,
        zoom: Option<&ZoomPan>,
        surface: &mut impl RenderSurface,
    ) -> TickReport {
        self.last_tick = Some(now);
        let zoom = match self.mode {
            ViewMode::FullScreen => zoom.copied(),
            ViewMode::Grid => None,
        };

        let mut report = TickReport::default();
        for (slot, shown) in self.slots.iter().zip(self.shown.iter_mut()) {
            let snapshot = sinks.sink(&slot.camera_id).map(|sink| sink.latest());
            let key = Shown {
                sequence: snapshot.as_ref().map(|snapshot| snapshot.sequence),
                zoom,
            };
            if shown.as_ref() == Some(&key) {
                report.unchanged += 1;
                continue;
            }

            let outcome = match snapshot.as_deref() {
                Some(snapshot) => match (snapshot.status, snapshot.frame.as_deref()) {
                    (SinkStatus::Ready, Some(frame)) => self
                        .scaler
                        .fit(frame, slot.px_width, slot.px_height, zoom.as_ref())
                        .and_then(|scaled| surface.present(slot, &scaled))
                        .map(|()| report.presented += 1),
                    (SinkStatus::Failed, _) => surface
                        .indicate(slot, &failure_text(slot))
                        .map(|()| report.indicated += 1),
                    _ => surface
                        .indicate(
                            slot,
                            &format!("{}\n{}", slot.label, SinkStatus::Connecting.as_str()),
                        )
                        .map(|()| report.indicated += 1),
                },
                None => surface
                    .indicate(slot, &format!("{}\nstopped", slot.label))
                    .map(|()| report.indicated += 1),
            };

            match outcome {
                Ok(()) => *shown = Some(key),
                Err(err) => {
                    report.errors += 1;
                    warn!(camera = %slot.camera_id, "render failed: {err:#}");
                }
            }
        }
        report
    }
}

/// Failure marker, keyed by camera id rather than its display name.
fn failure_text(slot: &Slot) -> String {
    format!("{}\n{}", slot.camera_id, SinkStatus::Failed.as_str())
}

struct Scaler {
    resizer: fir::Resizer,
    options: fir::ResizeOptions,
    crop: Vec<u8>,
}

impl Default for Scaler {
    fn default() -> Self {
        Self {
            resizer: fir::Resizer::new(),
            options: fir::ResizeOptions::new()
                .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear)),
            crop: Vec::new(),
        }
    }
}

impl Scaler {
    /// Scales `frame` (or the zoomed part of it) to fit `width` x `height`,
    /// keeping its aspect ratio, centered on black.
    fn fit(
        &mut self,
        frame: &Frame,
        width: usize,
        height: usize,
        zoom: Option<&ZoomPan>,
    ) -> Result<Frame> {
        if width == 0 || height == 0 || frame.is_empty() {
            bail!(
                "cannot fit {}x{} frame into {width}x{height}",
                frame.width,
                frame.height
            );
        }

        let wanted = zoom.map_or(
            PixelRect {
                x: 0,
                y: 0,
                width: frame.width,
                height: frame.height,
            },
            |zoom| zoom.source_rect(frame.width, frame.height),
        );
        let src = frame.extract_rect(wanted, &mut self.crop);
        let shrink = zoom.map_or(1.0, |zoom| zoom.scale().min(1.0));
        let ratio =
            (width as f32 / src.width as f32).min(height as f32 / src.height as f32) * shrink;
        let dst_w = ((src.width as f32 * ratio).round() as usize).clamp(1, width);
        let dst_h = ((src.height as f32 * ratio).round() as usize).clamp(1, height);

        let mut scaled = vec![0_u8; dst_w * dst_h * 3];
        if (dst_w, dst_h) == (src.width, src.height) {
            scaled.copy_from_slice(&self.crop);
        } else {
            let src_image = fir::images::Image::from_slice_u8(
                src.width as u32,
                src.height as u32,
                self.crop.as_mut_slice(),
                fir::PixelType::U8x3,
            )
            .context("failed creating resize source image")?;
            let mut dst_image = fir::images::Image::from_slice_u8(
                dst_w as u32,
                dst_h as u32,
                scaled.as_mut_slice(),
                fir::PixelType::U8x3,
            )
            .context("failed creating resize destination image")?;
            self.resizer
                .resize(&src_image, &mut dst_image, Some(&self.options))
                .context("resize failed")?;
        }

        let scaled = Frame::new(dst_w, dst_h, scaled).context("scaled buffer has wrong size")?;
        if (dst_w, dst_h) == (width, height) {
            return Ok(scaled);
        }
        let mut canvas = Frame::filled(width, height, [0, 0, 0]);
        canvas.paste(&scaled, (width - dst_w) / 2, (height - dst_h) / 2);
        Ok(canvas)
    }
}

/// `cols = ceil(sqrt(n))`, `rows = ceil(n / cols)`.
#[must_use]
pub fn grid_dimensions(count: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let mut cols = (count as f64).sqrt().ceil() as usize;
    // Float sqrt can land one off for large perfect squares.
    while cols * cols < count {
        cols += 1;
    }
    while cols > 1 && (cols - 1) * (cols - 1) >= count {
        cols -= 1;
    }
    (cols, count.div_ceil(cols))
}

/// Splits `area` into a row-major grid for `count` cameras. Leftover cells
/// go to the last column and row.
#[must_use]
pub fn grid_cells(area: CellRect, count: usize) -> Vec<CellRect> {
    let (cols, rows) = grid_dimensions(count);
    if cols == 0 {
        return Vec::new();
    }
    let edge = |start: u16, span: u16, parts: usize, idx: usize| -> u16 {
        start + (usize::from(span) * idx / parts) as u16
    };
    (0..count)
        .map(|idx| {
            let (col, row) = (idx % cols, idx / cols);
            let left = edge(area.col, area.cols, cols, col);
            let right = edge(area.col, area.cols, cols, col + 1);
            let top = edge(area.row, area.rows, rows, row);
            let bottom = edge(area.row, area.rows, rows, row + 1);
            CellRect {
                col: left,
                row: top,
                cols: right - left,
                rows: bottom - top,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{CellRect, DisplayLoop, RenderSurface, Slot, ViewMode, grid_cells, grid_dimensions};
    use crate::frame::{Frame, PixelRect};
    use crate::sink::{FrameSink, SinkStatus};
    use crate::view::ZoomPan;
    use anyhow::{Result, bail};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingSurface {
        presented: Vec<(String, Frame)>,
        indicated: Vec<(String, String)>,
        fail_next: bool,
    }

    impl RenderSurface for RecordingSurface {
        fn present(&mut self, slot: &Slot, frame: &Frame) -> Result<()> {
            if std::mem::take(&mut self.fail_next) {
                bail!("terminal write failed");
            }
            assert_eq!((frame.width, frame.height), (slot.px_width, slot.px_height));
            self.presented.push((slot.camera_id.clone(), frame.clone()));
            Ok(())
        }

        fn indicate(&mut self, slot: &Slot, text: &str) -> Result<()> {
            self.indicated.push((slot.camera_id.clone(), text.to_owned()));
            Ok(())
        }
    }

    fn slot(index: usize, id: &str, px: (usize, usize)) -> Slot {
        Slot {
            index,
            camera_id: id.to_owned(),
            label: format!("{id} label"),
            cells: CellRect::default(),
            px_width: px.0,
            px_height: px.1,
        }
    }

    fn sinks(ids: &[&str]) -> HashMap<String, Arc<FrameSink>> {
        ids.iter()
            .map(|id| ((*id).to_owned(), Arc::new(FrameSink::new())))
            .collect()
    }

    fn display(slots: Vec<Slot>, mode: ViewMode) -> DisplayLoop {
        let mut display = DisplayLoop::new(Duration::from_millis(100), Duration::from_millis(50));
        display.set_layout(mode, slots);
        display
    }

    #[test]
    fn grid_uses_ceil_sqrt_columns() {
        let dims: Vec<(usize, usize)> = [0, 1, 2, 3, 4, 5, 9, 10].map(grid_dimensions).to_vec();
        assert_eq!(
            dims,
            vec![(0, 0), (1, 1), (2, 1), (2, 2), (2, 2), (3, 2), (3, 3), (4, 3)]
        );
    }

    #[test]
    fn grid_cells_tile_the_area() {
        let area = CellRect {
            col: 2,
            row: 1,
            cols: 81,
            rows: 40,
        };
        let cells = grid_cells(area, 5);
        assert_eq!(cells.len(), 5);
        assert_eq!(
            cells[0],
            CellRect {
                col: 2,
                row: 1,
                cols: 27,
                rows: 20,
            }
        );
        assert_eq!(cells[2].col + cells[2].cols, area.col + area.cols);
        assert_eq!(cells[3].row + cells[3].rows, area.row + area.rows);
        assert!(grid_cells(area, 0).is_empty());
    }

    #[test]
    fn ready_frame_is_letterboxed_into_its_slot() {
        let sinks = sinks(&["cam1"]);
        sinks["cam1"].publish_frame(Frame::filled(4, 2, [200, 0, 0]));
        let mut display = display(vec![slot(0, "cam1", (8, 8))], ViewMode::Grid);
        let mut surface = RecordingSurface::default();

        let report = display.tick(Instant::now(), &sinks, None, &mut surface);
        assert_eq!(report.presented, 1);
        let (_, shown) = &surface.presented[0];
        assert_eq!(shown.pixel(4, 0), Some([0, 0, 0]));
        assert_eq!(shown.pixel(4, 7), Some([0, 0, 0]));
        let middle = shown.pixel(4, 4).expect("inside");
        assert!(middle[0] > 190 && middle[1] < 10, "{middle:?}");
    }

    #[test]
    fn status_markers_become_text_indicators() {
        let sinks = sinks(&["cam1", "cam2"]);
        sinks["cam2"].publish_status(SinkStatus::Failed, Some("stream ended".to_owned()));
        let slots = vec![slot(0, "cam1", (8, 8)), slot(1, "cam2", (8, 8)), slot(2, "gone", (8, 8))];
        let mut display = display(slots, ViewMode::Grid);
        let mut surface = RecordingSurface::default();

        let report = display.tick(Instant::now(), &sinks, None, &mut surface);
        assert_eq!(report.indicated, 3);
        assert_eq!(
            surface.indicated,
            vec![
                ("cam1".to_owned(), "cam1 label\nconnecting".to_owned()),
                ("cam2".to_owned(), "cam2\nread failed".to_owned()),
                ("gone".to_owned(), "gone label\nstopped".to_owned()),
            ]
        );
    }

    #[test]
    fn unchanged_snapshots_are_not_redrawn() {
        let sinks = sinks(&["cam1"]);
        sinks["cam1"].publish_frame(Frame::filled(8, 8, [1, 2, 3]));
        let mut display = display(vec![slot(0, "cam1", (8, 8))], ViewMode::Grid);
        let mut surface = RecordingSurface::default();
        let start = Instant::now();

        display.tick(start, &sinks, None, &mut surface);
        let report = display.tick(start, &sinks, None, &mut surface);
        assert_eq!(report.unchanged, 1);
        assert_eq!(surface.presented.len(), 1);

        sinks["cam1"].publish_frame(Frame::filled(8, 8, [4, 5, 6]));
        display.tick(start, &sinks, None, &mut surface);
        assert_eq!(surface.presented.len(), 2);
        assert_eq!(surface.presented[1].1.pixel(0, 0), Some([4, 5, 6]));

        display.invalidate();
        display.tick(start, &sinks, None, &mut surface);
        assert_eq!(surface.presented.len(), 3);
    }

    #[test]
    fn render_errors_are_contained_and_retried() {
        let sinks = sinks(&["cam1"]);
        sinks["cam1"].publish_frame(Frame::filled(8, 8, [9, 9, 9]));
        let mut display = display(vec![slot(0, "cam1", (8, 8))], ViewMode::Grid);
        let mut surface = RecordingSurface {
            fail_next: true,
            ..RecordingSurface::default()
        };

        let report = display.tick(Instant::now(), &sinks, None, &mut surface);
        assert_eq!(report.errors, 1);
        let report = display.tick(Instant::now(), &sinks, None, &mut surface);
        assert_eq!(report.presented, 1);
    }

    #[test]
    fn zero_sized_slot_is_an_error_not_a_panic() {
        let sinks = sinks(&["cam1"]);
        sinks["cam1"].publish_frame(Frame::filled(8, 8, [9, 9, 9]));
        let mut display = display(vec![slot(0, "cam1", (0, 5))], ViewMode::Grid);
        let mut surface = RecordingSurface::default();
        let report = display.tick(Instant::now(), &sinks, None, &mut surface);
        assert_eq!(report.errors, 1);
        assert!(surface.presented.is_empty());
    }

    #[test]
    fn full_screen_zoom_crops_the_frame() {
        let mut frame = Frame::filled(4, 4, [255, 0, 0]);
        frame.fill_rect(
            PixelRect {
                x: 2,
                y: 0,
                width: 2,
                height: 4,
            },
            [0, 0, 255],
            u8::MAX,
        );
        let sinks = sinks(&["cam1"]);
        sinks["cam1"].publish_frame(frame);

        let mut zoom = ZoomPan::default();
        for _ in 0..4 {
            zoom.zoom_in();
        }
        zoom.pan(5.0, 0.0);

        let mut display = display(vec![slot(0, "cam1", (4, 4))], ViewMode::FullScreen);
        let mut surface = RecordingSurface::default();
        display.tick(Instant::now(), &sinks, Some(&zoom), &mut surface);
        let (_, shown) = &surface.presented[0];
        for x in 0..4 {
            let [r, _, b] = shown.pixel(x, 2).expect("inside");
            assert!(r < 5 && b > 250, "column {x} is not blue");
        }

        // A zoom change alone forces a redraw.
        zoom.reset();
        display.tick(Instant::now(), &sinks, Some(&zoom), &mut surface);
        assert_eq!(surface.presented.len(), 2);
    }

    #[test]
    fn cadence_follows_view_mode() {
        let mut display = display(vec![slot(0, "cam1", (4, 4))], ViewMode::Grid);
        let start = Instant::now();
        assert!(display.is_due(start));
        display.tick(start, &sinks(&["cam1"]), None, &mut RecordingSurface::default());
        assert!(!display.is_due(start + Duration::from_millis(60)));
        assert!(display.is_due(start + Duration::from_millis(100)));

        assert!(display.set_layout(ViewMode::FullScreen, vec![slot(0, "cam1", (4, 4))]));
        assert!(display.is_due(start + Duration::from_millis(60)));
        assert_eq!(
            display.time_until_due(start + Duration::from_millis(20)),
            Duration::from_millis(30)
        );
        assert!(!display.set_layout(ViewMode::FullScreen, vec![slot(0, "cam1", (4, 4))]));
    }
}
