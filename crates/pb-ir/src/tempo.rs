//! Tempo math and the numeric guards applied before values reach render state.

/// Tempo used when a caller supplies a non-finite BPM.
pub const DEFAULT_BPM: f64 = 128.0;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;

/// Shortest loop/step interval accepted, in beats.
pub const MIN_INTERVAL_BEATS: f64 = 1.0 / 64.0;

/// Time constants below this are treated as "instant".
pub const MIN_TIME_CONSTANT: f64 = 1e-4;

/// Clamp a BPM into the supported range. NaN and infinities fall back to
/// [`DEFAULT_BPM`].
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        DEFAULT_BPM
    }
}

/// Seconds per beat for a (clamped) BPM.
pub fn seconds_per_beat(bpm: f64) -> f64 {
    60.0 / clamp_bpm(bpm)
}

/// Clamp a beat interval to a safe positive minimum.
pub fn clamp_interval(beats: f64) -> f64 {
    if beats.is_finite() && beats > MIN_INTERVAL_BEATS {
        beats
    } else {
        MIN_INTERVAL_BEATS
    }
}

/// Replace a non-finite beat offset with zero.
pub fn sanitize_offset(beats: f64) -> f64 {
    if beats.is_finite() {
        beats
    } else {
        0.0
    }
}

/// One-pole smoothing coefficient `1 - exp(-dt / tc)`.
///
/// Always in `[0, 1]`, so `x += (target - x) * coeff` can never overshoot.
/// A non-positive `dt` yields 0 (no movement); a time constant below
/// [`MIN_TIME_CONSTANT`] yields 1 (jump straight to the target).
pub fn glide_coefficient(dt: f64, time_constant: f64) -> f64 {
    if !(dt > 0.0) {
        return 0.0;
    }
    if !(time_constant >= MIN_TIME_CONSTANT) {
        return 1.0;
    }
    (1.0 - libm::exp(-dt / time_constant)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bpm_clamped_to_range() {
        assert_eq!(clamp_bpm(0.0), MIN_BPM);
        assert_eq!(clamp_bpm(-120.0), MIN_BPM);
        assert_eq!(clamp_bpm(10_000.0), MAX_BPM);
        assert_eq!(clamp_bpm(f64::NAN), DEFAULT_BPM);
        assert_eq!(clamp_bpm(120.0), 120.0);
    }

    #[test]
    fn seconds_per_beat_at_120() {
        assert!((seconds_per_beat(120.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn interval_never_zero() {
        assert_eq!(clamp_interval(0.0), MIN_INTERVAL_BEATS);
        assert_eq!(clamp_interval(-1.0), MIN_INTERVAL_BEATS);
        assert_eq!(clamp_interval(f64::INFINITY), MIN_INTERVAL_BEATS);
        assert_eq!(clamp_interval(0.25), 0.25);
    }

    #[test]
    fn glide_coefficient_bounds() {
        assert_eq!(glide_coefficient(0.0, 0.15), 0.0);
        assert_eq!(glide_coefficient(-1.0, 0.15), 0.0);
        assert_eq!(glide_coefficient(0.016, 0.0), 1.0);
        let c = glide_coefficient(0.016, 0.15);
        assert!(c > 0.0 && c < 1.0);
        assert!(glide_coefficient(1e6, 0.15) <= 1.0);
    }
}
