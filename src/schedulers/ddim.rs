//! # Denoising Diffusion Implicit Models
//!
//! The Denoising Diffusion Implicit Models (DDIM) is a simple scheduler
//! similar to Denoising Diffusion Probabilistic Models (DDPM). The DDPM
//! generative process is the reverse of a Markovian process, DDIM generalizes
//! this to non-Markovian guidance.
//!
//! With `eta > 0` each step adds fresh noise, drawn from the generators
//! passed to [`DDIMScheduler::step`].
//!
//! Denoising Diffusion Implicit Models, J. Song et al, 2020.
//! https://arxiv.org/abs/2010.02502
use super::{alphas_cumprod, betas, BetaSchedule, PredictionType};
use crate::error::{Error, Result};
use crate::noise::{randn_like, Generators};
use tch::Tensor;

/// The configuration for the DDIM scheduler.
#[derive(Debug, Clone, Copy)]
pub struct DDIMSchedulerConfig {
    /// The value of beta at the beginning of training.
    pub beta_start: f64,
    /// The value of beta at the end of training.
    pub beta_end: f64,
    /// How beta evolved during training.
    pub beta_schedule: BetaSchedule,
    /// The amount of noise to be added at each step.
    pub eta: f64,
    /// Adjust the indexes of the inference schedule by this value.
    pub steps_offset: usize,
    /// prediction type of the scheduler function, one of `epsilon` (predicting
    /// the noise of the diffusion process), `sample` (directly predicting the noisy sample`)
    /// or `v_prediction` (see section 2.4 https://imagen.research.google/video/paper.pdf)
    pub prediction_type: PredictionType,
    /// number of diffusion steps used to train the model
    pub train_timesteps: usize,
}

impl Default for DDIMSchedulerConfig {
    fn default() -> Self {
        Self {
            beta_start: 0.00085f64,
            beta_end: 0.012f64,
            beta_schedule: BetaSchedule::ScaledLinear,
            eta: 0.,
            steps_offset: 1,
            prediction_type: PredictionType::Epsilon,
            train_timesteps: 1000,
        }
    }
}

/// The DDIM scheduler.
#[derive(Debug, Clone)]
pub struct DDIMScheduler {
    timesteps: Vec<usize>,
    alphas_cumprod: Vec<f64>,
    step_ratio: usize,
    init_noise_sigma: f64,
    pub config: DDIMSchedulerConfig,
}

impl DDIMScheduler {
    /// Creates a new DDIM scheduler given the number of steps to be
    /// used for inference.
    pub fn new(inference_steps: usize, config: DDIMSchedulerConfig) -> Result<Self> {
        if inference_steps == 0 || inference_steps > config.train_timesteps {
            return Err(Error::InvalidArgument {
                arg: "inference_steps",
                reason: format!(
                    "expected a value between 1 and {}, got {inference_steps}",
                    config.train_timesteps
                ),
            });
        }
        let step_ratio = config.train_timesteps / inference_steps;
        let timesteps: Vec<usize> =
            (0..inference_steps).map(|s| s * step_ratio + config.steps_offset).rev().collect();
        let betas =
            betas(config.beta_schedule, config.beta_start, config.beta_end, config.train_timesteps);
        let alphas_cumprod = alphas_cumprod(&betas);
        Ok(Self { alphas_cumprod, timesteps, step_ratio, init_noise_sigma: 1., config })
    }

    pub fn timesteps(&self) -> &[usize] {
        self.timesteps.as_slice()
    }

    ///  Ensures interchangeability with schedulers that need to scale the denoising model input
    /// depending on the current timestep.
    pub fn scale_model_input(&self, sample: Tensor, _timestep: usize) -> Tensor {
        sample
    }

    // The offset can push the first timestep past the training range.
    fn clamp_timestep(&self, timestep: usize) -> usize {
        timestep.min(self.alphas_cumprod.len() - 1)
    }

    /// Performs a backward step during inference. The generators are only
    /// advanced when `eta > 0`.
    pub fn step(
        &self,
        model_output: &Tensor,
        timestep: usize,
        sample: &Tensor,
        generators: Generators,
    ) -> Result<Tensor> {
        let timestep = self.clamp_timestep(timestep);
        let prev_timestep = timestep.saturating_sub(self.step_ratio);

        let alpha_prod_t = self.alphas_cumprod[timestep];
        let alpha_prod_t_prev = self.alphas_cumprod[prev_timestep];
        let beta_prod_t = 1. - alpha_prod_t;
        let beta_prod_t_prev = 1. - alpha_prod_t_prev;

        let (pred_original_sample, pred_epsilon) = match self.config.prediction_type {
            PredictionType::Epsilon => {
                let pred_original_sample =
                    (sample - beta_prod_t.sqrt() * model_output) / alpha_prod_t.sqrt();
                (pred_original_sample, model_output.shallow_clone())
            }
            PredictionType::VPrediction => {
                let pred_original_sample =
                    alpha_prod_t.sqrt() * sample - beta_prod_t.sqrt() * model_output;
                let pred_epsilon = alpha_prod_t.sqrt() * model_output + beta_prod_t.sqrt() * sample;
                (pred_original_sample, pred_epsilon)
            }
            PredictionType::Sample => {
                let pred_original_sample = model_output.shallow_clone();
                let pred_epsilon =
                    (sample - alpha_prod_t.sqrt() * &pred_original_sample) / beta_prod_t.sqrt();
                (pred_original_sample, pred_epsilon)
            }
        };

        let variance = (beta_prod_t_prev / beta_prod_t) * (1. - alpha_prod_t / alpha_prod_t_prev);
        let std_dev_t = self.config.eta * variance.sqrt();

        let pred_sample_direction =
            (1. - alpha_prod_t_prev - std_dev_t * std_dev_t).sqrt() * pred_epsilon;
        let prev_sample = alpha_prod_t_prev.sqrt() * pred_original_sample + pred_sample_direction;
        if self.config.eta > 0. {
            let noise = randn_like(model_output, generators)?;
            Ok(prev_sample + noise * std_dev_t)
        } else {
            Ok(prev_sample)
        }
    }

    pub fn add_noise(&self, original: &Tensor, noise: Tensor, timestep: usize) -> Tensor {
        let timestep = self.clamp_timestep(timestep);
        let sqrt_alpha_prod = self.alphas_cumprod[timestep].sqrt();
        let sqrt_one_minus_alpha_prod = (1.0 - self.alphas_cumprod[timestep]).sqrt();
        sqrt_alpha_prod * original + sqrt_one_minus_alpha_prod * noise
    }

    pub fn init_noise_sigma(&self) -> f64 {
        self.init_noise_sigma
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::Generator;
    use tch::{Device, Kind};

    #[test]
    fn timesteps_are_offset_and_reversed() {
        let scheduler = DDIMScheduler::new(4, Default::default()).unwrap();
        assert_eq!(scheduler.timesteps(), &[751, 501, 251, 1]);
    }

    #[test]
    fn invalid_step_count() {
        assert!(DDIMScheduler::new(0, Default::default()).is_err());
        assert!(DDIMScheduler::new(1001, Default::default()).is_err());
    }

    #[test]
    fn deterministic_without_eta() {
        let scheduler = DDIMScheduler::new(10, Default::default()).unwrap();
        let mut g = Generator::cpu().with_seed(0);
        let sample = Tensor::ones(&[1, 4, 2, 2], (Kind::Float, Device::Cpu));
        let output = Tensor::zeros(&[1, 4, 2, 2], (Kind::Float, Device::Cpu));
        let state = g.get_state();
        let a = scheduler.step(&output, 901, &sample, (&mut g).into()).unwrap();
        let b = scheduler.step(&output, 901, &sample, Generators::Global).unwrap();
        assert!(a.equal(&b));
        // eta = 0 leaves the generator untouched.
        let mut fresh = Generator::cpu();
        fresh.set_state(&state).unwrap();
        let x = randn_like(&sample, (&mut g).into()).unwrap();
        let y = randn_like(&sample, (&mut fresh).into()).unwrap();
        assert!(x.equal(&y));
    }

    #[test]
    fn eta_noise_follows_the_generator() {
        let config = DDIMSchedulerConfig { eta: 1.0, ..Default::default() };
        let scheduler = DDIMScheduler::new(10, config).unwrap();
        let sample = Tensor::ones(&[2, 4, 2, 2], (Kind::Float, Device::Cpu));
        let output = Tensor::zeros(&[2, 4, 2, 2], (Kind::Float, Device::Cpu));
        let mut g1 = Generator::cpu().with_seed(123);
        let mut g2 = Generator::cpu().with_seed(123);
        let a = scheduler.step(&output, 501, &sample, (&mut g1).into()).unwrap();
        let b = scheduler.step(&output, 501, &sample, (&mut g2).into()).unwrap();
        assert!(a.equal(&b));
        let c = scheduler.step(&output, 501, &sample, (&mut g1).into()).unwrap();
        assert!(!a.equal(&c));
    }
}
