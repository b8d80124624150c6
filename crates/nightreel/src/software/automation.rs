//! Gain automation timeline
//!
//! Holds scheduled points in time order and answers "what is the gain at
//! time t". A ramp point interpolates from the previous point (or from the
//! initial value) up to its own time; a set point holds until the next one.

use crate::audio::GainEvent;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Curve {
    Set,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    curve: Curve,
    value: f64,
    time: f64,
}

#[derive(Debug, Clone)]
pub struct GainTimeline {
    initial: f64,
    points: Vec<Point>,
}

impl GainTimeline {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            points: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: GainEvent) {
        let point = match event {
            GainEvent::CancelScheduled { from } => {
                self.points.retain(|p| p.time < from);
                return;
            }
            GainEvent::SetValueAt { value, time } => Point {
                curve: Curve::Set,
                value,
                time,
            },
            GainEvent::LinearRampTo { value, time } => Point {
                curve: Curve::Linear,
                value,
                time,
            },
            GainEvent::ExponentialRampTo { value, time } => Point {
                curve: Curve::Exponential,
                value,
                time,
            },
        };
        // After any existing point at the same time, so insertion order wins ties.
        let at = self.points.partition_point(|p| p.time <= point.time);
        self.points.insert(at, point);
    }

    pub fn value_at(&self, t: f64) -> f64 {
        let mut prev_value = self.initial;
        let mut prev_time = 0.0;

        for point in &self.points {
            if point.time <= t {
                prev_value = point.value;
                prev_time = point.time;
                continue;
            }
            let span = point.time - prev_time;
            if span <= 0.0 {
                return prev_value;
            }
            let progress = ((t - prev_time) / span).clamp(0.0, 1.0);
            return match point.curve {
                Curve::Set => prev_value,
                Curve::Linear => prev_value + (point.value - prev_value) * progress,
                Curve::Exponential if prev_value > 0.0 && point.value > 0.0 => {
                    prev_value * (point.value / prev_value).powf(progress)
                }
                // Geometric ramps through zero are undefined; hold instead.
                Curve::Exponential => prev_value,
            };
        }

        prev_value
    }

    /// Fold every point before `t` into the initial value, keeping the
    /// timeline short on long sessions.
    pub fn compact(&mut self, t: f64) {
        let passed = self.points.partition_point(|p| p.time <= t);
        if passed == 0 {
            return;
        }
        let anchor = self.points[passed - 1];
        self.points.drain(..passed - 1);
        // The anchor stays so a ramp after it still has its start point.
        self.initial = anchor.value;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
