//! # Reproducible noise for diffusion pipelines
//!
//! Diffusion pipelines start from random latents and, for some schedulers,
//! keep adding noise during the denoising loop. This crate makes that noise
//! reproducible using Torch via [tch-rs](https://github.com/LaurentMazare/tch-rs).
//!
//! This library includes:
//! - Explicit random states, [`random::Generator`], bound to a device.
//! - A noise source, [`noise::randn_tensor`], giving the same values for a
//!   given seed whatever the device the tensor ends up on, with support for
//!   one generator per batch element.
//! - Latent preparation helpers and a DDIM scheduler drawing from these
//!   generators.
//!
//! ```no_run
//! use diffusers_noise::{noise::randn_tensor, random::generators_from_seeds};
//! use tch::{Device, Kind};
//!
//! let mut generators = generators_from_seeds(&[0, 1], Device::Cpu);
//! let device = Device::cuda_if_available();
//! let latents = randn_tensor(&[2, 4, 64, 64], Kind::Float, device, (&mut generators).into())?;
//! # Ok::<(), diffusers_noise::error::Error>(())
//! ```

pub mod error;
pub mod noise;
pub mod pipelines;
pub mod random;
pub mod schedulers;
pub mod utils;

pub use error::{Error, Result};
pub use noise::{randn_tensor, Generators};
pub use random::Generator;
