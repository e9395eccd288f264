//! Initial latents for text-to-image and image-to-image pipelines.
use crate::error::{Error, Result};
use crate::noise::{randn_tensor, Generators};
use crate::schedulers::ddim::DDIMScheduler;
use tch::{Device, Kind, Tensor};
use tracing::debug;

/// The layout of the latent space of the autoencoder.
#[derive(Debug, Clone, Copy)]
pub struct LatentsConfig {
    pub num_channels: i64,
    /// Ratio between the image size and the latent size.
    pub vae_scale_factor: i64,
}

impl Default for LatentsConfig {
    fn default() -> Self {
        // https://huggingface.co/runwayml/stable-diffusion-v1-5/blob/main/vae/config.json
        Self { num_channels: 4, vae_scale_factor: 8 }
    }
}

impl LatentsConfig {
    pub fn shape(&self, batch_size: i64, height: i64, width: i64) -> Result<Vec<i64>> {
        let scale = self.vae_scale_factor;
        if scale <= 0 || height % scale != 0 || width % scale != 0 {
            return Err(Error::InvalidShape {
                shape: vec![batch_size, self.num_channels, height, width],
                reason: format!("height and width have to be divisible by {scale}"),
            });
        }
        Ok(vec![batch_size, self.num_channels, height / scale, width / scale])
    }
}

/// Returns the initial latents of a denoising loop.
///
/// When `latents` is provided it is used as is, after checking its shape,
/// otherwise fresh noise is sampled from `generators`. The result is scaled
/// by the scheduler's `init_noise_sigma`.
#[allow(clippy::too_many_arguments)]
pub fn prepare_latents(
    config: &LatentsConfig,
    batch_size: i64,
    height: i64,
    width: i64,
    kind: Kind,
    device: Device,
    generators: Generators,
    latents: Option<Tensor>,
    init_noise_sigma: f64,
) -> Result<Tensor> {
    let shape = config.shape(batch_size, height, width)?;
    if let Some(len) = generators.len() {
        if len as i64 != batch_size {
            return Err(Error::ShapeMismatch { expected: vec![batch_size], got: vec![len as i64] });
        }
    }
    let latents = match latents {
        Some(latents) => {
            if latents.size() != shape {
                return Err(Error::ShapeMismatch { expected: shape, got: latents.size() });
            }
            latents.f_to_device_(device, kind, false, false)?
        }
        None => randn_tensor(&shape, kind, device, generators)?,
    };
    debug!(?shape, init_noise_sigma, "prepared latents");
    Ok(latents * init_noise_sigma)
}

/// Noises the encoded input image up to `timestep`, the starting point of
/// image-to-image and depth-to-image pipelines.
pub fn prepare_img2img_latents(
    scheduler: &DDIMScheduler,
    image_latents: &Tensor,
    timestep: usize,
    kind: Kind,
    device: Device,
    generators: Generators,
) -> Result<Tensor> {
    let image_latents = image_latents.f_to_device_(device, kind, false, false)?;
    let noise = randn_tensor(&image_latents.size(), kind, device, generators)?;
    Ok(scheduler.add_noise(&image_latents, noise, timestep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{generators_from_seeds, Generator};

    #[test]
    fn latent_shape() {
        let config = LatentsConfig::default();
        assert_eq!(config.shape(2, 512, 768).unwrap(), vec![2, 4, 64, 96]);
        assert!(matches!(config.shape(1, 500, 512), Err(Error::InvalidShape { .. })));
    }

    #[test]
    fn generator_count_must_match_batch() {
        let mut gs = generators_from_seeds(&[0, 1, 2], Device::Cpu);
        let err = prepare_latents(
            &LatentsConfig::default(),
            2,
            64,
            64,
            Kind::Float,
            Device::Cpu,
            (&mut gs).into(),
            None,
            1.,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn provided_latents_are_scaled() {
        let latents = Tensor::ones(&[1, 4, 8, 8], (Kind::Float, Device::Cpu));
        let out = prepare_latents(
            &LatentsConfig::default(),
            1,
            64,
            64,
            Kind::Float,
            Device::Cpu,
            Generators::Global,
            Some(latents),
            2.,
        )
        .unwrap();
        let expected = Tensor::full(&[1, 4, 8, 8], 2., (Kind::Float, Device::Cpu));
        assert!(out.equal(&expected));
    }

    #[test]
    fn provided_latents_with_wrong_shape() {
        let latents = Tensor::ones(&[1, 4, 4, 4], (Kind::Float, Device::Cpu));
        let err = prepare_latents(
            &LatentsConfig::default(),
            1,
            64,
            64,
            Kind::Float,
            Device::Cpu,
            Generators::Global,
            Some(latents),
            1.,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn img2img_latents_are_reproducible() {
        let scheduler = DDIMScheduler::new(50, Default::default()).unwrap();
        let image_latents = Tensor::ones(&[1, 4, 8, 8], (Kind::Float, Device::Cpu));
        let mut g1 = Generator::cpu().with_seed(1);
        let mut g2 = Generator::cpu().with_seed(1);
        let a = prepare_img2img_latents(
            &scheduler,
            &image_latents,
            801,
            Kind::Float,
            Device::Cpu,
            (&mut g1).into(),
        )
        .unwrap();
        let b = prepare_img2img_latents(
            &scheduler,
            &image_latents,
            801,
            Kind::Float,
            Device::Cpu,
            (&mut g2).into(),
        )
        .unwrap();
        assert!(a.equal(&b));
        assert_eq!(a.size(), vec![1, 4, 8, 8]);
    }
}
