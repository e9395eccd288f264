//! # Random states
//!
//! A [`Generator`] is an explicit, caller owned random state bound to a
//! device. Generators bound to the CPU run the reference engine, a ChaCha
//! stream feeding a standard normal sampler. This is the engine to use when
//! results have to be reproduced across runs and across machines.
//!
//! Generators bound to an accelerator run a counter based Philox engine, as
//! accelerator libraries do. They are deterministic for a given seed but the
//! values they produce do not match the CPU ones.
use crate::error::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use tch::Device;

pub mod philox;

use philox::Philox;

/// The seed used by freshly created generators, matches libtorch's default.
pub const DEFAULT_SEED: u64 = 67280421310721;

#[derive(Clone)]
enum Engine {
    Reference(ChaCha8Rng),
    Philox(Philox),
}

impl Engine {
    fn new(device: Device, seed: u64) -> Self {
        match device {
            Device::Cpu => Self::Reference(ChaCha8Rng::seed_from_u64(seed)),
            _ => Self::Philox(Philox::new(seed)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Reference(_) => "reference",
            Self::Philox(_) => "philox",
        }
    }
}

/// A saved generator state, see [`Generator::get_state`].
#[derive(Clone)]
pub struct GeneratorState {
    engine: Engine,
    initial_seed: u64,
}

impl std::fmt::Debug for GeneratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorState")
            .field("engine", &self.engine.name())
            .field("initial_seed", &self.initial_seed)
            .finish()
    }
}

/// A random state bound to a device.
///
/// Each draw advances the state, drawing twice from the same generator
/// returns the next values of the sequence rather than repeating them.
#[derive(Clone)]
pub struct Generator {
    device: Device,
    initial_seed: u64,
    engine: Engine,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("device", &self.device)
            .field("engine", &self.engine.name())
            .field("initial_seed", &self.initial_seed)
            .finish()
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::cpu()
    }
}

impl Generator {
    /// Creates a generator bound to `device`, seeded with [`DEFAULT_SEED`].
    pub fn new(device: Device) -> Self {
        Self { device, initial_seed: DEFAULT_SEED, engine: Engine::new(device, DEFAULT_SEED) }
    }

    /// Creates a generator running the CPU reference engine.
    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    /// Resets the state from `seed`, returns the generator so that calls can
    /// be chained, e.g. `Generator::cpu().manual_seed(0)`.
    pub fn manual_seed(&mut self, seed: u64) -> &mut Self {
        self.initial_seed = seed;
        self.engine = Engine::new(self.device, seed);
        self
    }

    /// Builder flavor of [`Generator::manual_seed`].
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.manual_seed(seed);
        self
    }

    /// Reseeds from a non-deterministic source and returns the new seed.
    pub fn seed(&mut self) -> u64 {
        let seed = rand::thread_rng().gen::<u64>();
        self.manual_seed(seed);
        seed
    }

    pub fn initial_seed(&self) -> u64 {
        self.initial_seed
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Whether this generator samples on the reference device.
    pub fn is_reference(&self) -> bool {
        matches!(self.engine, Engine::Reference(_))
    }

    pub fn get_state(&self) -> GeneratorState {
        GeneratorState { engine: self.engine.clone(), initial_seed: self.initial_seed }
    }

    pub fn set_state(&mut self, state: &GeneratorState) -> Result<()> {
        if std::mem::discriminant(&state.engine) != std::mem::discriminant(&self.engine) {
            return Err(Error::StateMismatch {
                state: state.engine.name(),
                generator: self.engine.name(),
            });
        }
        self.engine = state.engine.clone();
        self.initial_seed = state.initial_seed;
        Ok(())
    }

    /// Fills `out` with single precision standard normal values, this is one
    /// draw.
    pub(crate) fn fill_f32(&mut self, out: &mut [f32]) {
        match &mut self.engine {
            Engine::Reference(rng) => out.iter_mut().for_each(|v| *v = rng.sample(StandardNormal)),
            Engine::Philox(philox) => philox.fill_normal_f32(out),
        }
    }

    /// Double precision flavor of [`Generator::fill_f32`].
    pub(crate) fn fill_f64(&mut self, out: &mut [f64]) {
        match &mut self.engine {
            Engine::Reference(rng) => out.iter_mut().for_each(|v| *v = rng.sample(StandardNormal)),
            Engine::Philox(philox) => philox.fill_normal_f64(out),
        }
    }
}

/// Creates one generator per seed, all bound to `device`.
///
/// Generating a batch with these and later regenerating element `i` alone
/// from `seeds[i]` gives back the same values.
pub fn generators_from_seeds(seeds: &[u64], device: Device) -> Vec<Generator> {
    seeds.iter().map(|&seed| Generator::new(device).with_seed(seed)).collect()
}
