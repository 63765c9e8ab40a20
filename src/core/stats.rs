// stats.rs - Tail-probability approximation and multiple-comparison corrections

use std::f64::consts::PI;

/// Default p-value below which `1 - (1 - p)^n` is no better than Bonferroni.
pub const DUNN_SIDAK_MIN_P: f64 = 1e-15;

/// Number of Taylor terms used by [`one_minus_exp`] for `-1 <= x < 0`.
const ONE_MINUS_EXP_TERMS: usize = 50;

/// Multiple-comparison correction against a fixed number of comparisons.
///
/// Built once per run from the total triplet count and handed to every
/// worker, so no process-wide state is involved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    total_comparisons: f64,
    bonferroni_below: f64,
}

impl Correction {
    /// Counts below one are treated as a single comparison.
    pub fn new(total_comparisons: f64) -> Self {
        let total_comparisons = if total_comparisons.is_finite() && total_comparisons >= 1.0 {
            total_comparisons
        } else {
            1.0
        };
        Self {
            total_comparisons,
            bonferroni_below: DUNN_SIDAK_MIN_P,
        }
    }

    /// Use Bonferroni instead of Dunn-Sidak for p-values below `min_p`.
    ///
    /// Values outside `[0, 1)` keep the current cutoff.
    pub fn with_bonferroni_below(mut self, min_p: f64) -> Self {
        if (0.0..1.0).contains(&min_p) {
            self.bonferroni_below = min_p;
        }
        self
    }

    pub fn total_comparisons(&self) -> f64 {
        self.total_comparisons
    }

    pub fn bonferroni_below(&self) -> f64 {
        self.bonferroni_below
    }

    pub fn dunn_sidak(&self, p_value: f64) -> f64 {
        dunn_sidak_with_cutoff(p_value, self.total_comparisons, self.bonferroni_below)
    }

    pub fn bonferroni(&self, p_value: f64) -> f64 {
        bonferroni(p_value, self.total_comparisons)
    }

    /// Uncorrected p-value a triplet needs to survive `reject_threshold`.
    pub fn required_p_value(&self, reject_threshold: f64) -> f64 {
        reject_threshold / self.total_comparisons
    }
}

impl Default for Correction {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Dunn-Sidak correction: `1 - (1 - p)^n`.
///
/// Falls back to Bonferroni for very small p where `1 - p` rounds to one.
pub fn dunn_sidak(p_value: f64, total_comparisons: f64) -> f64 {
    dunn_sidak_with_cutoff(p_value, total_comparisons, DUNN_SIDAK_MIN_P)
}

/// [`dunn_sidak`] with the Bonferroni fallback below `bonferroni_below`.
pub fn dunn_sidak_with_cutoff(p_value: f64, total_comparisons: f64, bonferroni_below: f64) -> f64 {
    if p_value >= 1.0 {
        return 1.0;
    }
    let n = if total_comparisons > 0.0 { total_comparisons } else { 1.0 };
    if n == 1.0 {
        return p_value;
    }
    if p_value < bonferroni_below {
        return bonferroni(p_value, n);
    }
    // 1 - exp(n * ln(1 - p)), evaluated without cancellation
    -(n * (-p_value).ln_1p()).exp_m1()
}

/// Bonferroni correction: `p * n`.
pub fn bonferroni(p_value: f64, total_comparisons: f64) -> f64 {
    let n = if total_comparisons > 0.0 { total_comparisons } else { 1.0 };
    p_value * n
}

/// `1 - e^x` with a truncated Taylor series for `-1 <= x < 0`.
pub fn one_minus_exp(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 - x.exp()
    } else if x >= -1.0 {
        let mut terms = [0.0f64; ONE_MINUS_EXP_TERMS];
        let mut power = 1.0;
        let mut factorial = 1.0;
        for (i, term) in terms.iter_mut().enumerate() {
            power *= x;
            factorial *= (i + 1) as f64;
            *term = power / factorial;
        }
        // smallest terms first
        terms.iter().rev().fold(0.0, |acc, term| acc - term)
    } else {
        let exp_abs = (-x).exp();
        (exp_abs - 1.0) / exp_abs
    }
}

fn normal_pdf(x: f64) -> f64 {
    (1.0 / (2.0 * PI).sqrt()) * (-0.5 * x * x).exp()
}

/// Rational-polynomial approximation of the standard normal CDF
/// (Abramowitz & Stegun 26.2.17).
fn normal_cdf(x: f64) -> f64 {
    const B1: f64 = 0.319381530;
    const B2: f64 = -0.356563782;
    const B3: f64 = 1.781477937;
    const B4: f64 = -1.821255978;
    const B5: f64 = 1.330274429;
    const P: f64 = 0.2316419;
    const C: f64 = 0.39894228;

    let t = 1.0 / (1.0 + P * x.abs());
    let tail = C * (-x * x / 2.0).exp() * t * (t * (t * (t * (t * B5 + B4) + B3) + B2) + B1);
    if x >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Siegmund's overshoot correction factor.
fn nu(x: f64) -> f64 {
    ((normal_cdf(x / 2.0) - 0.5) * 2.0) / x / (normal_pdf(x / 2.0) + (x * normal_cdf(x / 2.0)) / 2.0)
}

/// Continuous boundary-crossing approximation of P(max descent >= k)
/// for a walk with `up` up-steps and `down` down-steps.
///
/// Used for keys outside the bounds of the exact table.
pub fn siegmund_discrete_approx(up: usize, down: usize, max_descent: usize) -> f64 {
    let total = down as f64 + up as f64;
    let drift = down as f64 - up as f64;
    let b = max_descent as f64 - 0.5;

    let p1 = (-2.0 * b * (b - drift) / total).exp();
    let p2 = p1 * (2.0 * (2.0 * b - drift) * (b - drift) / total + 1.0);
    let overshoot = nu(2.0 * (2.0 * b - drift) / total);
    let p3 = overshoot * overshoot * p2;

    one_minus_exp(-p3)
}

/// Closed-form tail probability for a single breakpoint reaching `max_height`.
pub fn single_breakpoint_p_value(max_height: usize, up: usize, down: usize) -> f64 {
    let height = max_height as f64;
    let mut up = up as f64;
    let mut down = down as f64;
    let mut p_value = 1.0;
    for _ in 0..max_height {
        p_value *= up / (down + height);
        up -= 1.0;
        down -= 1.0;
    }
    p_value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dunn_sidak_of_one_is_one() {
        for n in [1.0, 2.0, 10.0, 1e6] {
            assert_eq!(dunn_sidak(1.0, n), 1.0);
            assert_eq!(dunn_sidak(1.5, n), 1.0);
        }
    }

    #[test]
    fn test_dunn_sidak_single_comparison_is_identity() {
        for p in [1e-20, 1e-9, 0.001, 0.1, 0.5, 0.999] {
            assert_eq!(dunn_sidak(p, 1.0), p);
        }
    }

    #[test]
    fn test_dunn_sidak_matches_closed_form() {
        let p: f64 = 0.01;
        let expected = 1.0 - (1.0 - p).powf(20.0);
        assert!((dunn_sidak(p, 20.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_dunn_sidak_falls_back_to_bonferroni() {
        let p = 1e-18;
        assert_eq!(dunn_sidak(p, 1000.0), bonferroni(p, 1000.0));
    }

    #[test]
    fn test_correction_bonferroni_cutoff() {
        let p = 1e-6;
        let default = Correction::new(1000.0);
        assert_eq!(default.bonferroni_below(), DUNN_SIDAK_MIN_P);
        assert_eq!(default.dunn_sidak(p), dunn_sidak(p, 1000.0));
        assert!(default.dunn_sidak(p) < default.bonferroni(p));

        let raised = default.with_bonferroni_below(1e-5);
        assert_eq!(raised.dunn_sidak(p), raised.bonferroni(p));
        assert_eq!(raised.dunn_sidak(0.01), default.dunn_sidak(0.01));

        // out-of-range cutoffs are ignored
        for invalid in [f64::NAN, -1.0, 1.0, 3.0] {
            assert_eq!(raised.with_bonferroni_below(invalid).bonferroni_below(), 1e-5);
        }
    }

    #[test]
    fn test_correction_clamps_comparisons() {
        let correction = Correction::new(0.0);
        assert_eq!(correction.total_comparisons(), 1.0);
        assert_eq!(correction.bonferroni(0.2), 0.2);
        assert!((Correction::new(100.0).required_p_value(0.05) - 0.0005).abs() < 1e-15);
    }

    #[test]
    fn test_one_minus_exp_branches_agree() {
        for x in [-5.0, -1.5, -1.0, -0.5, -1e-10, 0.0, 0.3] {
            let naive = 1.0 - f64::exp(x);
            assert!((one_minus_exp(x) - naive).abs() < 1e-12, "x = {}", x);
        }
        // no cancellation for tiny arguments
        let tiny = one_minus_exp(-1e-17);
        assert!((tiny - 1e-17).abs() < 1e-30);
    }

    #[test]
    fn test_normal_cdf_symmetry() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        for x in [0.5, 1.0, 1.96, 3.0] {
            assert!((normal_cdf(x) + normal_cdf(-x) - 1.0).abs() < 1e-7);
        }
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-4);
    }

    #[test]
    fn test_siegmund_approx_is_probability() {
        for (m, n, k) in [(100, 100, 10), (300, 250, 20), (50, 400, 360), (1000, 1000, 60)] {
            let p = siegmund_discrete_approx(m, n, k);
            assert!((0.0..=1.0).contains(&p), "p({}, {}, {}) = {}", m, n, k, p);
        }
    }

    #[test]
    fn test_siegmund_approx_decreases_with_descent() {
        let mut last = 1.0;
        for k in 5..40 {
            let p = siegmund_discrete_approx(500, 500, k);
            assert!(p <= last);
            last = p;
        }
    }

    #[test]
    fn test_single_breakpoint_p_value() {
        assert_eq!(single_breakpoint_p_value(0, 10, 10), 1.0);
        // 5/(5+2) * 4/(4+2)
        let expected = (5.0 / 7.0) * (4.0 / 6.0);
        assert!((single_breakpoint_p_value(2, 5, 5) - expected).abs() < 1e-15);
    }
}
