//! # Pipelines
//!
//! Reproducible pipeline building blocks: the model forward passes are left
//! to the caller, these helpers only deal with the noise fed to the loop.

pub mod latents;

pub use latents::{prepare_img2img_latents, prepare_latents, LatentsConfig};
