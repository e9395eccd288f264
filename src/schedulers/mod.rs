//! # Noise schedulers
//!
//! Schedulers that consume noise during the denoising loop take their random
//! state explicitly so that a seeded generator makes the whole loop
//! reproducible.

pub mod ddim;

/// This represents how beta ranges from its minimum value to the maximum
/// during training.
#[derive(Debug, Clone, Copy)]
pub enum BetaSchedule {
    /// Linear interpolation.
    Linear,
    /// Linear interpolation of the square root of beta.
    ScaledLinear,
    /// Glide cosine schedule
    SquaredcosCapV2,
}

#[derive(Debug, Clone, Copy)]
pub enum PredictionType {
    Epsilon,
    VPrediction,
    Sample,
}

fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => vec![],
        1 => vec![start],
        _ => {
            let delta = (end - start) / (steps - 1) as f64;
            (0..steps).map(|i| start + delta * i as f64).collect()
        }
    }
}

/// Create a beta schedule that discretizes the given alpha_t_bar function, which defines the cumulative product of
/// `(1-beta)` over time from `t = [0,1]`.
fn betas_for_alpha_bar(num_diffusion_timesteps: usize, max_beta: f64) -> Vec<f64> {
    let alpha_bar = |t: f64| f64::cos((t + 0.008) / 1.008 * std::f64::consts::FRAC_PI_2).powi(2);
    (0..num_diffusion_timesteps)
        .map(|i| {
            let t1 = i as f64 / num_diffusion_timesteps as f64;
            let t2 = (i + 1) as f64 / num_diffusion_timesteps as f64;
            (1.0 - alpha_bar(t2) / alpha_bar(t1)).min(max_beta)
        })
        .collect()
}

pub(crate) fn betas(
    schedule: BetaSchedule,
    beta_start: f64,
    beta_end: f64,
    train_timesteps: usize,
) -> Vec<f64> {
    match schedule {
        BetaSchedule::Linear => linspace(beta_start, beta_end, train_timesteps),
        BetaSchedule::ScaledLinear => {
            linspace(beta_start.sqrt(), beta_end.sqrt(), train_timesteps)
                .into_iter()
                .map(|b| b * b)
                .collect()
        }
        BetaSchedule::SquaredcosCapV2 => betas_for_alpha_bar(train_timesteps, 0.999),
    }
}

/// Cumulative product of `1 - beta`.
pub(crate) fn alphas_cumprod(betas: &[f64]) -> Vec<f64> {
    betas
        .iter()
        .scan(1.0, |acc, beta| {
            *acc *= 1.0 - beta;
            Some(*acc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_betas() {
        let betas = betas(BetaSchedule::Linear, 0.1, 0.5, 5);
        let expected = [0.1, 0.2, 0.3, 0.4, 0.5];
        for (b, e) in betas.iter().zip(expected.iter()) {
            assert!((b - e).abs() < 1e-12);
        }
    }

    #[test]
    fn scaled_linear_endpoints() {
        let betas = betas(BetaSchedule::ScaledLinear, 0.00085, 0.012, 1000);
        assert_eq!(betas.len(), 1000);
        assert!((betas[0] - 0.00085).abs() < 1e-12);
        assert!((betas[999] - 0.012).abs() < 1e-12);
    }

    #[test]
    fn cosine_betas_are_capped() {
        let betas = betas(BetaSchedule::SquaredcosCapV2, 0., 0., 100);
        assert!(betas.iter().all(|&b| b > 0. && b <= 0.999));
    }

    #[test]
    fn cumprod_is_decreasing() {
        let cumprod = alphas_cumprod(&[0.1, 0.2, 0.5]);
        assert!((cumprod[0] - 0.9).abs() < 1e-12);
        assert!((cumprod[1] - 0.72).abs() < 1e-12);
        assert!((cumprod[2] - 0.36).abs() < 1e-12);
    }
}
