//! # Deterministic noise
//!
//! Noise is sampled with caller owned generators so that a fixed seed
//! reproduces the same latents. For results that match across machines and
//! across target devices, use generators bound to the CPU: sampling then
//! always happens on the CPU and the block is moved to the target device
//! afterwards, leaving the values untouched.
//!
//! Generators bound to an accelerator are accepted when the target device is
//! of the same kind, the values they produce are deterministic but differ
//! from the CPU ones for the same seed.
use crate::error::{Error, Result};
use crate::random::Generator;
use crate::utils::same_device_kind;
use tch::{Device, Kind, Tensor};
use tracing::{debug, info};

/// The random state(s) to sample from.
pub enum Generators<'a> {
    /// Use libtorch's global random state, as seeded by `tch::manual_seed`.
    Global,
    Single(&'a mut Generator),
    /// One generator per batch element, element `i` only depends on the
    /// `i`-th generator and not on the batch size.
    Batched(&'a mut [Generator]),
}

impl<'a> From<&'a mut Generator> for Generators<'a> {
    fn from(generator: &'a mut Generator) -> Self {
        Self::Single(generator)
    }
}

impl<'a> From<&'a mut [Generator]> for Generators<'a> {
    fn from(generators: &'a mut [Generator]) -> Self {
        Self::Batched(generators)
    }
}

impl<'a> From<&'a mut Vec<Generator>> for Generators<'a> {
    fn from(generators: &'a mut Vec<Generator>) -> Self {
        Self::Batched(generators.as_mut_slice())
    }
}

impl<'a> Generators<'a> {
    /// Reborrows the generators, so that the same value can be used for
    /// multiple calls.
    pub fn reborrow(&mut self) -> Generators<'_> {
        match self {
            Self::Global => Generators::Global,
            Self::Single(g) => Generators::Single(&mut **g),
            Self::Batched(gs) => Generators::Batched(&mut **gs),
        }
    }

    pub(crate) fn len(&self) -> Option<usize> {
        match self {
            Self::Batched(gs) => Some(gs.len()),
            Self::Global | Self::Single(_) => None,
        }
    }
}

fn numel(shape: &[i64]) -> Result<usize> {
    let mut numel = 1usize;
    for &dim in shape.iter() {
        let dim = usize::try_from(dim).map_err(|_| Error::InvalidShape {
            shape: shape.to_vec(),
            reason: "negative dimension".to_string(),
        })?;
        numel = numel.checked_mul(dim).ok_or_else(|| Error::InvalidShape {
            shape: shape.to_vec(),
            reason: "too many elements".to_string(),
        })?;
    }
    Ok(numel)
}

// Float, Half and BFloat16 are all sampled in single precision so that the
// underlying values do not depend on the requested half precision format.
fn sample_in_double(kind: Kind) -> Result<bool> {
    match kind {
        Kind::Double => Ok(true),
        Kind::Float | Kind::Half | Kind::BFloat16 => Ok(false),
        kind => Err(Error::UnsupportedKind(kind)),
    }
}

/// Returns the device on which a generator bound to `generator` samples for
/// a tensor requested on `target`.
fn sampling_device(generator: Device, target: Device) -> Result<Device> {
    if same_device_kind(generator, target) {
        Ok(generator)
    } else if generator == Device::Cpu {
        if target != Device::Mps {
            info!(
                ?target,
                "generator created on the cpu, sampling on the cpu and moving to the target device"
            );
        }
        Ok(Device::Cpu)
    } else {
        Err(Error::DeviceMismatch { target, generator })
    }
}

/// Samples on the host, the rows of the first dimension being split evenly
/// between `generators`, each advanced by one draw. The tensor is allocated by
/// libtorch before any draw, an allocation failure is returned as an error
/// and leaves the generators untouched.
fn draw(generators: &mut [&mut Generator], shape: &[i64], double: bool) -> Result<Tensor> {
    let numel = numel(shape)?;
    let kind = if double { Kind::Double } else { Kind::Float };
    let tensor = Tensor::f_empty(shape, (kind, Device::Cpu))?;
    if numel == 0 || generators.is_empty() {
        return Ok(tensor);
    }
    let per_generator = numel / generators.len();
    // SAFETY: the tensor was just allocated, it is contiguous, lives on the cpu and holds
    // `numel` elements of `kind`, nothing else refers to its storage.
    if double {
        let out = unsafe { std::slice::from_raw_parts_mut(tensor.data_ptr() as *mut f64, numel) };
        for (chunk, generator) in out.chunks_mut(per_generator).zip(generators.iter_mut()) {
            generator.fill_f64(chunk)
        }
    } else {
        let out = unsafe { std::slice::from_raw_parts_mut(tensor.data_ptr() as *mut f32, numel) };
        for (chunk, generator) in out.chunks_mut(per_generator).zip(generators.iter_mut()) {
            generator.fill_f32(chunk)
        }
    }
    Ok(tensor)
}

/// Samples a tensor of standard normal values.
///
/// With [`Generators::Batched`], the number of generators must match the
/// first dimension of `shape`, each generator producing one slice of the
/// batch. Every generator is advanced by exactly one draw.
pub fn randn_tensor(
    shape: &[i64],
    kind: Kind,
    device: Device,
    generators: Generators,
) -> Result<Tensor> {
    numel(shape)?;
    let double = sample_in_double(kind)?;
    debug!(?shape, ?kind, ?device, "sampling noise");
    let (noise, rand_device) = match generators {
        Generators::Global => return Ok(Tensor::f_randn(shape, (kind, device))?),
        Generators::Single(generator) => {
            let rand_device = sampling_device(generator.device(), device)?;
            (draw(&mut [generator], shape, double)?, rand_device)
        }
        Generators::Batched(generators) => {
            let batch_size = match shape.first() {
                Some(&batch_size) => batch_size,
                None => {
                    return Err(Error::InvalidShape {
                        shape: shape.to_vec(),
                        reason: "batched generators require a batch dimension".to_string(),
                    })
                }
            };
            if generators.len() as i64 != batch_size {
                return Err(Error::ShapeMismatch {
                    expected: vec![batch_size],
                    got: vec![generators.len() as i64],
                });
            }
            let rand_device = match generators.first() {
                None => return Ok(Tensor::f_zeros(shape, (kind, device))?),
                Some(generator) => generator.device(),
            };
            if let Some(generator) =
                generators.iter().find(|g| !same_device_kind(g.device(), rand_device))
            {
                let other = generator.device();
                return Err(Error::MixedGeneratorDevices { first: rand_device, other });
            }
            let rand_device = sampling_device(rand_device, device)?;
            // Each generator fills the contiguous rows of its batch element, the
            // same values it would produce for a standalone batch of one.
            let mut generators: Vec<&mut Generator> = generators.iter_mut().collect();
            (draw(&mut generators, shape, double)?, rand_device)
        }
    };
    let noise = noise.f_to_device_(rand_device, kind, false, false)?;
    if rand_device == device {
        Ok(noise)
    } else {
        Ok(noise.f_to_device_(device, kind, false, false)?)
    }
}

/// Samples standard normal noise with the shape, kind and device of `tensor`.
pub fn randn_like(tensor: &Tensor, generators: Generators) -> Result<Tensor> {
    randn_tensor(&tensor.size(), tensor.kind(), tensor.device(), generators)
}
