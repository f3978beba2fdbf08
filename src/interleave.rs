use std::cmp::Ordering;

use crate::frame::MediaKind;
use crate::rational::{Rational, compare_ts};

/// A stream's next output timestamp and the timebase it is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClock {
    pub pts: i64,
    pub time_base: Rational,
}

impl StreamClock {
    pub fn new(pts: i64, time_base: Rational) -> Self {
        Self { pts, time_base }
    }
}

/// Picks the queue the worker drains next.
///
/// With both streams enabled, video goes first whenever audio is not behind it,
/// so a tie resolves to video. `None` only when no stream is enabled.
pub fn select(video: Option<StreamClock>, audio: Option<StreamClock>) -> Option<MediaKind> {
    match (video, audio) {
        (Some(v), Some(a)) => {
            match compare_ts(a.pts, a.time_base, v.pts, v.time_base) {
                Ordering::Less => Some(MediaKind::Audio),
                Ordering::Equal | Ordering::Greater => Some(MediaKind::Video),
            }
        }
        (Some(_), None) => Some(MediaKind::Video),
        (None, Some(_)) => Some(MediaKind::Audio),
        (None, None) => None,
    }
}
