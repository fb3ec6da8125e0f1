//! Automation curves.
//!
//! A curve is an ordered list of control points on one parameter of one
//! node. Point times are absolute instants on the context clock. Evaluation
//! follows the usual audio-param rules: a step holds its value, a linear or
//! exponential point ramps from the previous point to itself, and the last
//! value holds forever after.

use revline_core::{Sample, Seconds};

use crate::node::{NodeId, ParamRef};

/// How a point is reached from the point before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Jump to the value at the point's time
    Step,
    /// Straight line from the previous point
    Linear,
    /// Constant-ratio curve from the previous point (both values must be > 0)
    Exponential,
}

/// One control point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationPoint {
    pub time: Seconds,
    pub value: Sample,
    pub interpolation: Interpolation,
}

/// Errors raised when a curve or timeline breaks its invariants
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AutomationError {
    #[error("{param}: point at {time}s is not after the previous point at {previous}s")]
    OutOfOrder {
        param: ParamRef,
        time: Seconds,
        previous: Seconds,
    },

    #[error("{param}: exponential ramp needs positive endpoints, got {from} -> {to} at {time}s")]
    NonPositiveExponential {
        param: ParamRef,
        from: Sample,
        to: Sample,
        time: Seconds,
    },

    #[error("{param}: ramp at {time}s has no preceding point to start from")]
    MissingAnchor { param: ParamRef, time: Seconds },

    #[error("{param}: non-finite point ({time}s, {value})")]
    NonFinite {
        param: ParamRef,
        time: Seconds,
        value: Sample,
    },

    #[error("{0} already has a curve")]
    DuplicateCurve(ParamRef),

    #[error("{0} does not exist in the graph")]
    UnknownParam(ParamRef),

    #[error("Node {0} is not a source node")]
    NotASource(NodeId),

    #[error("Source node {0} already has a start/stop window")]
    DuplicateWindow(NodeId),

    #[error("Source node {0} has no start/stop window")]
    MissingWindow(NodeId),

    #[error("Source node {node} window is invalid: start {start}s, stop {stop}s, origin {origin}s")]
    InvalidWindow {
        node: NodeId,
        start: Seconds,
        stop: Seconds,
        origin: Seconds,
    },

    #[error("Source node {node} stops at {stop}s, past the end of the performance at {limit}s")]
    WindowOutOfBounds {
        node: NodeId,
        stop: Seconds,
        limit: Seconds,
    },
}

/// An ordered set of control points on one parameter
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationCurve {
    param: ParamRef,
    points: Vec<AutomationPoint>,
}

impl AutomationCurve {
    pub fn new(param: ParamRef) -> Self {
        Self {
            param,
            points: Vec::new(),
        }
    }

    pub fn param(&self) -> ParamRef {
        self.param
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    /// Jump to `value` at `time`
    pub fn set_value_at(&mut self, value: Sample, time: Seconds) -> Result<&mut Self, AutomationError> {
        self.push(AutomationPoint {
            time,
            value,
            interpolation: Interpolation::Step,
        })
    }

    /// Ramp linearly from the previous point to `value` at `time`
    pub fn linear_ramp_to(&mut self, value: Sample, time: Seconds) -> Result<&mut Self, AutomationError> {
        self.push(AutomationPoint {
            time,
            value,
            interpolation: Interpolation::Linear,
        })
    }

    /// Ramp exponentially from the previous point to `value` at `time`
    pub fn exponential_ramp_to(
        &mut self,
        value: Sample,
        time: Seconds,
    ) -> Result<&mut Self, AutomationError> {
        self.push(AutomationPoint {
            time,
            value,
            interpolation: Interpolation::Exponential,
        })
    }

    /// Append a point, enforcing the curve invariants
    pub fn push(&mut self, point: AutomationPoint) -> Result<&mut Self, AutomationError> {
        if !point.time.is_finite() || !point.value.is_finite() {
            return Err(AutomationError::NonFinite {
                param: self.param,
                time: point.time,
                value: point.value,
            });
        }

        let previous = self.points.last();
        if let Some(previous) = previous {
            if point.time <= previous.time {
                return Err(AutomationError::OutOfOrder {
                    param: self.param,
                    time: point.time,
                    previous: previous.time,
                });
            }
        }

        match (point.interpolation, previous) {
            (Interpolation::Step, _) => {}
            (_, None) => {
                return Err(AutomationError::MissingAnchor {
                    param: self.param,
                    time: point.time,
                });
            }
            (Interpolation::Exponential, Some(previous))
                if previous.value <= 0.0 || point.value <= 0.0 =>
            {
                return Err(AutomationError::NonPositiveExponential {
                    param: self.param,
                    from: previous.value,
                    to: point.value,
                    time: point.time,
                });
            }
            (Interpolation::Linear | Interpolation::Exponential, Some(_)) => {}
        }

        self.points.push(point);
        Ok(self)
    }

    /// Value of the parameter at `time`. `intrinsic` applies before the
    /// first point.
    pub fn value_at(&self, time: Seconds, intrinsic: Sample) -> Sample {
        // Number of points at or before `time`
        let idx = self.points.partition_point(|point| point.time <= time);
        if idx == 0 {
            return intrinsic;
        }

        let previous = self.points[idx - 1];
        let Some(next) = self.points.get(idx) else {
            return previous.value;
        };

        let span = next.time - previous.time;
        let progress = ((time - previous.time) / span) as Sample;
        match next.interpolation {
            Interpolation::Step => previous.value,
            Interpolation::Linear => previous.value + (next.value - previous.value) * progress,
            Interpolation::Exponential => {
                previous.value * (next.value / previous.value).powf(progress)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Param;

    fn curve() -> AutomationCurve {
        AutomationCurve::new(ParamRef::new(0, Param::Gain))
    }

    #[test]
    fn test_linear_ramp_values() {
        let mut c = curve();
        c.set_value_at(0.0, 1.0)
            .unwrap()
            .linear_ramp_to(1.0, 2.0)
            .unwrap();

        assert_eq!(c.value_at(0.5, 0.3), 0.3); // before first point: intrinsic
        assert_eq!(c.value_at(1.0, 0.3), 0.0);
        assert!((c.value_at(1.5, 0.3) - 0.5).abs() < 1e-6);
        assert_eq!(c.value_at(2.0, 0.3), 1.0);
        assert_eq!(c.value_at(5.0, 0.3), 1.0); // holds after last point
    }

    #[test]
    fn test_exponential_ramp_values() {
        let mut c = curve();
        c.set_value_at(100.0, 0.0)
            .unwrap()
            .exponential_ramp_to(400.0, 2.0)
            .unwrap();

        // Halfway through a 100 -> 400 exponential ramp is the geometric mean
        assert!((c.value_at(1.0, 0.0) - 200.0).abs() < 1e-3);
        assert_eq!(c.value_at(2.0, 0.0), 400.0);
    }

    #[test]
    fn test_step_holds_until_next_step() {
        let mut c = curve();
        c.set_value_at(0.2, 1.0)
            .unwrap()
            .set_value_at(0.8, 3.0)
            .unwrap();

        assert_eq!(c.value_at(2.9, 0.0), 0.2);
        assert_eq!(c.value_at(3.0, 0.0), 0.8);
    }

    #[test]
    fn test_out_of_order_point_rejected() {
        let mut c = curve();
        c.set_value_at(0.0, 1.0).unwrap();
        c.linear_ramp_to(0.5, 3.0).unwrap();

        let err = c.linear_ramp_to(0.2, 2.0).unwrap_err();
        assert!(matches!(
            err,
            AutomationError::OutOfOrder {
                time,
                previous,
                ..
            } if time == 2.0 && previous == 3.0
        ));
        assert_eq!(c.points().len(), 2);
    }

    #[test]
    fn test_equal_timestamps_rejected() {
        let mut c = curve();
        c.set_value_at(0.0, 1.0).unwrap();
        assert!(matches!(
            c.linear_ramp_to(0.5, 1.0),
            Err(AutomationError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_exponential_to_zero_rejected() {
        let mut c = curve();
        c.set_value_at(1.0, 0.0).unwrap();
        assert!(matches!(
            c.exponential_ramp_to(0.0, 1.0),
            Err(AutomationError::NonPositiveExponential { .. })
        ));
    }

    #[test]
    fn test_exponential_from_zero_rejected() {
        let mut c = curve();
        c.set_value_at(0.0, 0.0).unwrap();
        assert!(matches!(
            c.exponential_ramp_to(1.0, 1.0),
            Err(AutomationError::NonPositiveExponential { .. })
        ));
    }

    #[test]
    fn test_ramp_without_anchor_rejected() {
        let mut c = curve();
        assert!(matches!(
            c.linear_ramp_to(1.0, 1.0),
            Err(AutomationError::MissingAnchor { .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut c = curve();
        assert!(matches!(
            c.set_value_at(f32::NAN, 0.0),
            Err(AutomationError::NonFinite { .. })
        ));
        assert!(matches!(
            c.set_value_at(1.0, f64::INFINITY),
            Err(AutomationError::NonFinite { .. })
        ));
    }
}
