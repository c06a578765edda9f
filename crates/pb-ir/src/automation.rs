//! Continuous parameter automation sampled by position in bars.

/// Interpolation shape between the two endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurveShape {
    Linear,
    /// Smoothstep: zero slope at both ends
    EaseInOut,
}

/// Synthesizer parameter an automation curve writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutomationTarget {
    LowPassCutoff,
    HighPassCutoff,
    OscMix,
    Gain,
}

/// A two-point curve over a span of bars, held flat outside the span.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutomationCurve {
    pub start_bar: f32,
    pub start_value: f32,
    pub end_bar: f32,
    pub end_value: f32,
    pub shape: CurveShape,
}

impl AutomationCurve {
    pub fn linear(start_bar: f32, start_value: f32, end_bar: f32, end_value: f32) -> Self {
        Self { start_bar, start_value, end_bar, end_value, shape: CurveShape::Linear }
    }

    pub fn ease_in_out(start_bar: f32, start_value: f32, end_bar: f32, end_value: f32) -> Self {
        Self { start_bar, start_value, end_bar, end_value, shape: CurveShape::EaseInOut }
    }

    /// Value at `bar`. A zero-length span steps from start to end value.
    pub fn evaluate(&self, bar: f32) -> f32 {
        let span = self.end_bar - self.start_bar;
        let t = if span > 0.0 {
            ((bar - self.start_bar) / span).clamp(0.0, 1.0)
        } else if bar >= self.end_bar {
            1.0
        } else {
            0.0
        };
        let t = match self.shape {
            CurveShape::Linear => t,
            CurveShape::EaseInOut => t * t * (3.0 - 2.0 * t),
        };
        self.start_value + (self.end_value - self.start_value) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_and_clamping() {
        let c = AutomationCurve::ease_in_out(0.0, 350.0, 8.0, 2000.0);
        assert_eq!(c.evaluate(0.0), 350.0);
        assert_eq!(c.evaluate(8.0), 2000.0);
        assert_eq!(c.evaluate(-3.0), 350.0);
        assert_eq!(c.evaluate(12.0), 2000.0);
    }

    #[test]
    fn ease_in_out_is_symmetric_at_midpoint() {
        let c = AutomationCurve::ease_in_out(0.0, 0.0, 2.0, 1.0);
        assert!((c.evaluate(1.0) - 0.5).abs() < 1e-6);
        // Slow start compared to linear
        assert!(c.evaluate(0.2) < 0.1);
    }

    #[test]
    fn linear_midpoint() {
        let c = AutomationCurve::linear(2.0, 10.0, 4.0, 20.0);
        assert!((c.evaluate(3.0) - 15.0).abs() < 1e-6);
    }

    #[test]
    fn monotonic_over_span() {
        let c = AutomationCurve::ease_in_out(0.0, 350.0, 8.0, 2000.0);
        let mut prev = c.evaluate(0.0);
        for i in 1..=80 {
            let v = c.evaluate(i as f32 * 0.1);
            assert!(v >= prev);
            prev = v;
        }
    }
}
