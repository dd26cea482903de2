//! FFT-based Hilbert transform
//!
//! Turns a real signal into its analytic form `x + i·H{x}`:
//! 1. Forward FFT of the real signal
//! 2. Double the positive frequencies, zero the negative ones
//! 3. Keep DC (and Nyquist for even lengths) unchanged
//! 4. Inverse FFT

use super::AnalyticSample;
use rustfft::FftPlanner;

/// Compute the analytic signal of `signal`
///
/// The output has the same length as the input. The real part equals the
/// input (up to floating point error).
///
/// # Example
/// ```
/// use audiometry_core::stream::hilbert::analytic_signal;
///
/// let signal: Vec<f64> = (0..64)
///     .map(|i| (std::f64::consts::TAU * 4.0 * i as f64 / 64.0).cos())
///     .collect();
/// let analytic = analytic_signal(&signal);
/// assert!((analytic[0].norm() - 1.0).abs() < 1e-9);
/// ```
pub fn analytic_signal(signal: &[f64]) -> Vec<AnalyticSample> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }

    let mut buffer: Vec<AnalyticSample> = signal.iter().map(|&x| AnalyticSample::new(x, 0.0)).collect();

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    // Bins 1..half are positive frequencies; for even n, bin n/2 is Nyquist
    let half = n.div_ceil(2);
    for bin in buffer.iter_mut().take(half).skip(1) {
        *bin *= 2.0;
    }
    let first_negative = n / 2 + 1;
    for bin in buffer.iter_mut().skip(first_negative) {
        *bin = AnalyticSample::new(0.0, 0.0);
    }

    planner.plan_fft_inverse(n).process(&mut buffer);

    let norm = 1.0 / n as f64;
    for sample in &mut buffer {
        *sample *= norm;
    }
    buffer
}
