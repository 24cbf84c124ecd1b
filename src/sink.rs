use crate::frame::Frame;
use arc_swap::ArcSwap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkStatus {
    Connecting,
    Failed,
    Ready,
}

impl SinkStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Failed => "read failed",
            Self::Ready => "streaming",
        }
    }
}

/// One immutable published value. `frame` is only set for `Ready`.
#[derive(Debug, Clone)]
pub struct SinkSnapshot {
    pub status: SinkStatus,
    pub frame: Option<Arc<Frame>>,
    pub sequence: u64,
    pub detail: Option<String>,
}

/// Latest-value-wins handoff between one producer (writer) and the display
/// loop (reader). Publishing swaps in a fresh snapshot, so readers see either
/// the old value or the new one, never a mix.
#[derive(Debug)]
pub struct FrameSink {
    slot: ArcSwap<SinkSnapshot>,
}

impl Default for FrameSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: ArcSwap::from_pointee(SinkSnapshot {
                status: SinkStatus::Connecting,
                frame: None,
                sequence: 0,
                detail: None,
            }),
        }
    }

    /// Overwrites the slot and bumps the sequence. Single writer only: the
    /// read-increment-store is not atomic across writers.
    pub fn publish(&self, status: SinkStatus, frame: Option<Frame>, detail: Option<String>) {
        let sequence = self.slot.load().sequence.wrapping_add(1);
        self.slot.store(Arc::new(SinkSnapshot {
            status,
            frame: frame.map(Arc::new),
            sequence,
            detail,
        }));
    }

    pub fn publish_frame(&self, frame: Frame) {
        self.publish(SinkStatus::Ready, Some(frame), None);
    }

    pub fn publish_status(&self, status: SinkStatus, detail: Option<String>) {
        self.publish(status, None, detail);
    }

    #[must_use]
    pub fn latest(&self) -> Arc<SinkSnapshot> {
        self.slot.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameSink, SinkStatus};
    use crate::frame::Frame;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn starts_connecting_at_sequence_zero() {
        let sink = FrameSink::new();
        let snapshot = sink.latest();
        assert_eq!(snapshot.status, SinkStatus::Connecting);
        assert_eq!(snapshot.sequence, 0);
        assert!(snapshot.frame.is_none());
    }

    #[test]
    fn latest_wins_without_queueing() {
        let sink = FrameSink::new();
        sink.publish_frame(Frame::filled(2, 2, [1, 1, 1]));
        sink.publish_frame(Frame::filled(2, 2, [2, 2, 2]));
        sink.publish_status(SinkStatus::Failed, Some("stream ended".to_owned()));

        let snapshot = sink.latest();
        assert_eq!(snapshot.sequence, 3);
        assert_eq!(snapshot.status, SinkStatus::Failed);
        assert!(snapshot.frame.is_none());
        assert_eq!(snapshot.detail.as_deref(), Some("stream ended"));
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_publish() {
        let sink = FrameSink::new();
        sink.publish_frame(Frame::filled(1, 1, [9, 9, 9]));
        let held = sink.latest();
        sink.publish_frame(Frame::filled(1, 1, [3, 3, 3]));

        let frame = held.frame.as_ref().expect("ready snapshot has a frame");
        assert_eq!(frame.pixel(0, 0), Some([9, 9, 9]));
        assert_eq!(held.sequence, 1);
    }

    #[test]
    fn concurrent_reader_never_sees_torn_frames() {
        const PUBLISHES: u64 = 2_000;

        let sink = Arc::new(FrameSink::new());
        let done = Arc::new(AtomicBool::new(false));

        let writer_sink = sink.clone();
        let writer_done = done.clone();
        let writer = std::thread::spawn(move || {
            for seq in 1..=PUBLISHES {
                // Size and fill both derive from the sequence, so any mix of two
                // publishes is detectable.
                let side = 8 + (seq % 5) as usize;
                let fill = (seq % 251) as u8;
                writer_sink.publish_frame(Frame::filled(side, side, [fill, fill, fill]));
            }
            writer_done.store(true, Ordering::Release);
        });

        let mut last_seq = 0_u64;
        let mut observed = 0_u64;
        loop {
            let finished = done.load(Ordering::Acquire);
            let snapshot = sink.latest();
            assert!(snapshot.sequence >= last_seq, "sequence went backwards");
            last_seq = snapshot.sequence;

            if snapshot.sequence > 0 {
                assert_eq!(snapshot.status, SinkStatus::Ready);
                let frame = snapshot.frame.as_ref().expect("ready snapshot has a frame");
                let side = 8 + (snapshot.sequence % 5) as usize;
                let fill = (snapshot.sequence % 251) as u8;
                assert_eq!((frame.width, frame.height), (side, side));
                assert_eq!(frame.rgb.len(), side * side * 3);
                assert!(frame.rgb.iter().all(|byte| *byte == fill));
                observed += 1;
            }

            if finished {
                break;
            }
        }

        writer.join().expect("writer thread");
        assert_eq!(sink.latest().sequence, PUBLISHES);
        assert!(observed > 0);
    }
}
