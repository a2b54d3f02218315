//! Discrete Gaussian weights for one half-blur.

use std::f32::consts::{PI, TAU};

use pmrem_cubeuv::CubeUvLayout;
use pmrem_render::{BlurAxis, BlurUniforms, MAX_SAMPLES};

/// Standard deviations covered by the sampled kernel support.
pub const STANDARD_DEVIATIONS: f32 = 3.0;

/// Tap count and weights of a directional Gaussian.
///
/// Weights are Gaussian density samples at whole-texel angular steps,
/// normalised so the centre tap plus both mirrored sides sum to one. When
/// the support would need more than [`MAX_SAMPLES`] taps the kernel is cut
/// at that count, renormalised, and a warning is logged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurKernel {
    samples: u32,
    requested_samples: u32,
    weights: [f32; MAX_SAMPLES],
    d_theta: f32,
}

impl BlurKernel {
    /// Kernel of angular standard deviation `sigma_radians` over a source
    /// level with faces of `size_in` texels.
    ///
    /// A non-finite sigma yields a uniform kernel of [`MAX_SAMPLES`] taps
    /// spread over the whole circle; zero sigma a single unit tap.
    pub fn new(sigma_radians: f32, size_in: u32) -> Self {
        let mut weights = [0.0; MAX_SAMPLES];

        if !sigma_radians.is_finite() {
            let taps = MAX_SAMPLES as u32;
            let uniform = 1.0 / (2 * taps - 1) as f32;
            weights.fill(uniform);
            return Self {
                samples: taps,
                requested_samples: taps,
                weights,
                d_theta: TAU / (2 * taps - 1) as f32,
            };
        }

        let radians_per_pixel = PI / (2.0 * size_in.saturating_sub(1).max(1) as f32);
        if sigma_radians <= 0.0 {
            weights[0] = 1.0;
            return Self {
                samples: 1,
                requested_samples: 1,
                weights,
                d_theta: radians_per_pixel,
            };
        }

        let sigma_pixels = sigma_radians / radians_per_pixel;
        let requested_samples = 1 + (STANDARD_DEVIATIONS * sigma_pixels).floor() as u32;
        if requested_samples > MAX_SAMPLES as u32 {
            log::warn!(
                "sigma {sigma_radians} rad needs {requested_samples} samples, clipped to the permitted {MAX_SAMPLES}"
            );
        }
        let samples = requested_samples.min(MAX_SAMPLES as u32);

        let mut sum = 0.0;
        for (i, weight) in weights.iter_mut().take(samples as usize).enumerate() {
            let x = i as f32 / sigma_pixels;
            *weight = (-x * x / 2.0).exp();
            sum += if i == 0 { *weight } else { 2.0 * *weight };
        }
        for weight in &mut weights[..samples as usize] {
            *weight /= sum;
        }

        Self {
            samples,
            requested_samples,
            weights,
            d_theta: radians_per_pixel,
        }
    }

    /// Taps on each side, centre included.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Taps the support asked for before clipping.
    pub fn requested_samples(&self) -> u32 {
        self.requested_samples
    }

    pub fn is_clipped(&self) -> bool {
        self.requested_samples > self.samples
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights[..self.samples as usize]
    }

    /// Angle between neighbouring taps in radians.
    pub fn d_theta(&self) -> f32 {
        self.d_theta
    }

    /// Sum over the full symmetric kernel, centre counted once.
    pub fn total_weight(&self) -> f32 {
        let weights = self.weights();
        weights[0] + 2.0 * weights[1..].iter().sum::<f32>()
    }

    /// Uniforms of a draw applying this kernel along `axis` to `source_lod`.
    pub fn uniforms(&self, axis: BlurAxis, source_lod: u32, layout: CubeUvLayout) -> BlurUniforms {
        BlurUniforms {
            samples: self.samples,
            weights: self.weights,
            axis,
            d_theta: self.d_theta,
            source_lod,
            layout,
        }
    }
}

/// Additional blur taking a level of total sigma `previous` to `next`.
///
/// Gaussian blurs compose in variance, so the increment is the square root
/// of the variance difference.
pub fn incremental_sigma(previous: f32, next: f32) -> f32 {
    (next * next - previous * previous).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, Once};

    /// Records every log line with the name of the thread that emitted it.
    struct CaptureLogger;

    static CAPTURED: Mutex<Vec<(String, log::Level, String)>> = Mutex::new(Vec::new());

    impl log::Log for CaptureLogger {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            let thread = std::thread::current().name().unwrap_or_default().to_string();
            CAPTURED
                .lock()
                .unwrap()
                .push((thread, record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    /// Log lines this test thread emitted while running `f`.
    fn capture_logs(f: impl FnOnce()) -> Vec<(log::Level, String)> {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            log::set_logger(&CaptureLogger).unwrap();
            log::set_max_level(log::LevelFilter::Trace);
        });
        let thread = std::thread::current().name().unwrap_or_default().to_string();
        let start = CAPTURED.lock().unwrap().len();
        f();
        CAPTURED.lock().unwrap()[start..]
            .iter()
            .filter(|(t, _, _)| *t == thread)
            .map(|(_, level, message)| (*level, message.clone()))
            .collect()
    }

    #[test]
    fn test_weights_sum_to_one_for_any_sample_count() {
        for size in [16, 32, 64, 128, 256] {
            for step in 1..40 {
                let sigma = step as f32 * 0.004;
                let kernel = BlurKernel::new(sigma, size);
                assert!(
                    (kernel.total_weight() - 1.0).abs() < 1e-3,
                    "sigma {sigma} size {size}: {}",
                    kernel.total_weight()
                );
            }
        }
    }

    #[test]
    fn test_sample_count_follows_support() {
        // 2.1 texels of sigma cover 1 + floor(3 * 2.1) taps.
        let size = 65;
        let radians_per_pixel = PI / (2.0 * 64.0);
        let kernel = BlurKernel::new(2.1 * radians_per_pixel, size);
        assert_eq!(kernel.samples(), 7);
        assert!(!kernel.is_clipped());
        assert!((kernel.d_theta() - radians_per_pixel).abs() < 1e-9);
    }

    #[test]
    fn test_oversized_sigma_clips_to_max_samples() {
        let kernel = BlurKernel::new(1.2, 16);
        assert!(kernel.requested_samples() > MAX_SAMPLES as u32);
        assert_eq!(kernel.samples(), MAX_SAMPLES as u32);
        assert!(kernel.is_clipped());
        assert!((kernel.total_weight() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_clipping_warns_with_requested_and_permitted_counts() {
        let mut requested = 0;
        let logs = capture_logs(|| requested = BlurKernel::new(1.2, 16).requested_samples());
        let warnings: Vec<&String> = logs
            .iter()
            .filter(|(level, _)| *level == log::Level::Warn)
            .map(|(_, message)| message)
            .collect();
        assert_eq!(warnings.len(), 1, "{logs:?}");
        assert!(warnings[0].contains(&format!("{requested} samples")), "{}", warnings[0]);
        assert!(warnings[0].contains(&format!("permitted {MAX_SAMPLES}")), "{}", warnings[0]);
    }

    #[test]
    fn test_unclipped_kernel_does_not_warn() {
        let logs = capture_logs(|| {
            BlurKernel::new(0.05, 128);
        });
        assert!(logs.iter().all(|(level, _)| *level != log::Level::Warn), "{logs:?}");
    }

    #[test]
    fn test_weights_decrease_from_centre() {
        let kernel = BlurKernel::new(0.05, 128);
        for pair in kernel.weights().windows(2) {
            assert!(pair[1] < pair[0]);
        }
    }

    #[test]
    fn test_zero_sigma_is_single_tap() {
        let kernel = BlurKernel::new(0.0, 64);
        assert_eq!(kernel.samples(), 1);
        assert_eq!(kernel.weights(), &[1.0_f32]);
    }

    #[test]
    fn test_infinite_sigma_is_uniform_over_circle() {
        let kernel = BlurKernel::new(f32::INFINITY, 16);
        assert_eq!(kernel.samples(), MAX_SAMPLES as u32);
        assert!(kernel.weights().windows(2).all(|w| w[0] == w[1]));
        assert!((kernel.total_weight() - 1.0).abs() < 1e-5);
        let span = kernel.d_theta() * (2 * MAX_SAMPLES - 1) as f32;
        assert!((span - TAU).abs() < 1e-5);
    }

    #[test]
    fn test_incremental_sigma_composes_in_variance() {
        let step = incremental_sigma(0.3, 0.5);
        assert!((step - 0.4).abs() < 1e-6);
        assert_eq!(incremental_sigma(0.5, 0.5), 0.0);
        assert_eq!(incremental_sigma(0.6, 0.5), 0.0);
    }

    #[test]
    fn test_uniforms_carry_kernel() {
        let kernel = BlurKernel::new(0.1, 32);
        let layout = CubeUvLayout::default();
        let uniforms = kernel.uniforms(BlurAxis::Latitudinal, 3, layout);
        assert_eq!(uniforms.samples, kernel.samples());
        assert_eq!(&uniforms.weights[..kernel.samples() as usize], kernel.weights());
        assert_eq!(uniforms.source_lod, 3);
        assert_eq!(uniforms.axis, BlurAxis::Latitudinal);
    }
}
