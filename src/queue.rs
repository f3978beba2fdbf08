//! The video/audio frame queue pair shared by producers and the encode worker.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{EncodeError, Result};
use crate::frame::{MediaKind, RawFrame};

/// How a stop request treats frames that are already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopMode {
    /// Keep popping the selected queue until it is empty, then end the stream.
    Drain,
    /// End the stream at the next check without dequeuing anything else.
    Immediate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub count: usize,
    pub bytes_kb: usize,
}

#[derive(Default)]
struct QueueState {
    video: VecDeque<RawFrame>,
    audio: VecDeque<RawFrame>,
    count: usize,
    bytes_kb: usize,
    flushed: bool,
    stop: Option<StopMode>,
}

impl QueueState {
    fn lane_mut(&mut self, lane: MediaKind) -> &mut VecDeque<RawFrame> {
        match lane {
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
        }
    }
}

#[derive(Default)]
pub struct FrameQueues {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl FrameQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // no mutation can panic halfway
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, frame: RawFrame) -> Result<()> {
        let mut state = self.lock();
        if state.stop.is_some() {
            return Err(EncodeError::PipelineStopped);
        }
        let kb = frame.size() / 1024;
        state.lane_mut(frame.kind()).push_back(frame);
        state.count += 1;
        state.bytes_kb += kb;
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Takes the next frame from `lane`, waiting while it is empty.
    ///
    /// Returns `None` once the lane is empty and the queues were flushed or
    /// stopped, and right away after an [`StopMode::Immediate`] stop.
    pub fn pop(&self, lane: MediaKind) -> Option<RawFrame> {
        let mut state = self.lock();
        loop {
            if state.stop == Some(StopMode::Immediate) {
                return None;
            }
            if let Some(frame) = state.lane_mut(lane).pop_front() {
                state.count -= 1;
                state.bytes_kb -= frame.size() / 1024;
                return Some(frame);
            }
            if state.flushed || state.stop.is_some() {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// No further frames are expected. Never cleared.
    pub fn flush(&self) {
        self.lock().flushed = true;
        self.ready.notify_all();
    }

    /// Rejects further pushes and wakes the worker. A stop only ever escalates.
    pub fn request_stop(&self, mode: StopMode) {
        let mut state = self.lock();
        state.stop = Some(state.stop.map_or(mode, |current| current.max(mode)));
        drop(state);
        self.ready.notify_all();
    }

    pub fn stop_mode(&self) -> Option<StopMode> {
        self.lock().stop
    }

    pub fn is_flushed(&self) -> bool {
        self.lock().flushed
    }

    /// Empties both queues and returns how many frames were dropped.
    pub fn discard(&self) -> usize {
        let (video, audio) = {
            let mut state = self.lock();
            state.count = 0;
            state.bytes_kb = 0;
            (
                std::mem::take(&mut state.video),
                std::mem::take(&mut state.audio),
            )
        };
        // frames are freed outside the lock
        video.len() + audio.len()
    }

    pub fn queued_count(&self) -> usize {
        self.lock().count
    }

    pub fn queued_bytes_kb(&self) -> usize {
        self.lock().bytes_kb
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            count: state.count,
            bytes_kb: state.bytes_kb,
        }
    }
}

impl std::fmt::Debug for FrameQueues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FrameQueues")
            .field("video", &state.video.len())
            .field("audio", &state.audio.len())
            .field("bytes_kb", &state.bytes_kb)
            .field("flushed", &state.flushed)
            .field("stop", &state.stop)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::frame::{PixelFormat, SampleFormat};

    fn video(width: u32) -> RawFrame {
        RawFrame::make_video(PixelFormat::Yuv420p, width, 16).unwrap()
    }

    fn audio(samples: usize) -> RawFrame {
        RawFrame::make_audio(SampleFormat::S16, 2, samples).unwrap()
    }

    #[test]
    fn single_lane_is_fifo() {
        let queues = FrameQueues::new();
        for width in [16, 32, 48] {
            queues.push(video(width)).unwrap();
        }
        assert!(!queues.is_flushed());
        queues.flush();
        assert!(queues.is_flushed());

        let widths: Vec<u32> = std::iter::from_fn(|| queues.pop(MediaKind::Video))
            .map(|f| f.video_format().unwrap().width)
            .collect();
        assert_eq!(widths, vec![16, 32, 48]);
    }

    #[test]
    fn lanes_are_independent() {
        let queues = FrameQueues::new();
        queues.push(audio(1024)).unwrap();
        queues.push(video(16)).unwrap();

        assert_eq!(queues.pop(MediaKind::Video).unwrap().kind(), MediaKind::Video);
        assert_eq!(queues.pop(MediaKind::Audio).unwrap().kind(), MediaKind::Audio);
    }

    #[test]
    fn accounting_returns_to_zero() {
        let queues = FrameQueues::new();
        let frames = vec![video(640), audio(48000), video(320), audio(10)];
        let expected_kb: usize = frames.iter().map(|f| f.size() / 1024).sum();
        assert!(expected_kb > 0);

        for frame in frames {
            queues.push(frame).unwrap();
        }
        assert_eq!(
            queues.stats(),
            QueueStats {
                count: 4,
                bytes_kb: expected_kb
            }
        );

        for lane in [MediaKind::Video, MediaKind::Audio, MediaKind::Video, MediaKind::Audio] {
            queues.pop(lane).unwrap();
        }
        assert_eq!(queues.queued_count(), 0);
        assert_eq!(queues.queued_bytes_kb(), 0);
    }

    #[test]
    fn flush_unblocks_waiting_pop() {
        let queues = Arc::new(FrameQueues::new());
        let (tx, rx) = mpsc::channel();
        let consumer = {
            let queues = queues.clone();
            thread::spawn(move || {
                tx.send(queues.pop(MediaKind::Audio).is_none()).unwrap();
            })
        };

        // still blocked without a flush
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        queues.flush();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        consumer.join().unwrap();
    }

    #[test]
    fn push_wakes_waiting_pop() {
        let queues = Arc::new(FrameQueues::new());
        let (tx, rx) = mpsc::channel();
        let consumer = {
            let queues = queues.clone();
            thread::spawn(move || {
                let frame = queues.pop(MediaKind::Video);
                tx.send(frame.map(|f| f.kind())).unwrap();
            })
        };

        queues.push(video(16)).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some(MediaKind::Video)
        );
        consumer.join().unwrap();
    }

    #[test]
    fn drain_stop_empties_the_lane_first() {
        let queues = FrameQueues::new();
        queues.push(video(16)).unwrap();
        queues.push(video(16)).unwrap();
        queues.request_stop(StopMode::Drain);

        assert!(matches!(
            queues.push(video(16)),
            Err(EncodeError::PipelineStopped)
        ));
        assert!(queues.pop(MediaKind::Video).is_some());
        assert!(queues.pop(MediaKind::Video).is_some());
        assert!(queues.pop(MediaKind::Video).is_none());
    }

    #[test]
    fn immediate_stop_leaves_frames_queued() {
        let queues = FrameQueues::new();
        queues.push(video(16)).unwrap();
        queues.push(audio(16)).unwrap();
        queues.request_stop(StopMode::Immediate);

        assert!(queues.pop(MediaKind::Video).is_none());
        assert_eq!(queues.queued_count(), 2);
        assert_eq!(queues.discard(), 2);
        assert_eq!(queues.stats(), QueueStats::default());
    }

    #[test]
    fn stop_never_downgrades() {
        let queues = FrameQueues::new();
        queues.request_stop(StopMode::Immediate);
        queues.request_stop(StopMode::Drain);
        assert_eq!(queues.stop_mode(), Some(StopMode::Immediate));
    }

    #[test]
    fn discard_frees_unretained_frames() {
        let queues = FrameQueues::new();
        let frame = video(16);
        let kept = frame.retain();
        queues.push(frame).unwrap();
        assert_eq!(kept.holders(), 2);

        assert_eq!(queues.discard(), 1);
        assert_eq!(kept.holders(), 1);
    }
}
