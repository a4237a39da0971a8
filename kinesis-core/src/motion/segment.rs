//! Line segmentation
//!
//! Non-linear kinematics and mesh leveling bend straight logical lines, so
//! such moves are cut into short pieces that are each transformed and
//! corrected on their own. The segmenter is a resumable iterator: when the
//! planner stalls, the caller keeps the segmenter and retries the same
//! point later, so a move is never partially dropped.

use libm::{ceilf, sqrtf};

use super::planner::LineParams;
use super::position::{AxisPosition, LINEAR_AXES, NUM_AXES};

/// Upper bound on segments per move
pub const MAX_SEGMENTS: u32 = 10_000;

/// Straight logical line split into equal segments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegmenter {
    start: AxisPosition,
    delta: [f32; NUM_AXES],
    segments: u32,
    done: u32,
    params: LineParams,
}

impl LineSegmenter {
    /// Split the line `start → target` into pieces no longer than `max_length`
    ///
    /// `max_length` of `None` yields a single segment.
    pub fn new(
        start: &AxisPosition,
        target: &AxisPosition,
        max_length: Option<f32>,
        params: &LineParams,
    ) -> Self {
        let delta = target.delta(start);
        let length = sqrtf(delta[..LINEAR_AXES].iter().map(|d| d * d).sum());
        let segments = match max_length {
            Some(max) if max > 0.0 && length > max => {
                (ceilf(length / max) as u32).clamp(1, MAX_SEGMENTS)
            }
            _ => 1,
        };
        Self {
            start: *start,
            delta,
            segments,
            done: 0,
            params: *params,
        }
    }

    /// Endpoint of the next segment, `None` once the line is finished
    pub fn peek(&self) -> Option<AxisPosition> {
        if self.done >= self.segments {
            return None;
        }
        let index = self.done + 1;
        if index == self.segments {
            // Land exactly on the target
            let mut end = self.start;
            for i in 0..NUM_AXES {
                end.0[i] += self.delta[i];
            }
            return Some(end);
        }
        let fraction = index as f32 / self.segments as f32;
        let mut point = self.start;
        for i in 0..NUM_AXES {
            point.0[i] += self.delta[i] * fraction;
        }
        Some(point)
    }

    /// Mark the peeked segment as planned
    pub fn advance(&mut self) {
        if self.done < self.segments {
            self.done += 1;
        }
    }

    /// Line endpoint
    pub fn target(&self) -> AxisPosition {
        let mut end = self.start;
        for i in 0..NUM_AXES {
            end.0[i] += self.delta[i];
        }
        end
    }

    /// Request parameters shared by every segment
    pub fn params(&self) -> &LineParams {
        &self.params
    }

    /// Total segment count
    pub fn segments(&self) -> u32 {
        self.segments
    }

    /// Segments not yet planned
    pub fn remaining(&self) -> u32 {
        self.segments - self.done
    }

    /// Whether every segment has been planned
    pub fn is_done(&self) -> bool {
        self.done >= self.segments
    }
}

impl Iterator for LineSegmenter {
    type Item = AxisPosition;

    fn next(&mut self) -> Option<AxisPosition> {
        let point = self.peek()?;
        self.advance();
        Some(point)
    }
}
