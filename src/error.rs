//! Error types for noise generation.

use tch::{Device, Kind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The number of generators or the provided latents do not match the
    /// requested shape.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<i64>, got: Vec<i64> },

    #[error("cannot generate a {target:?} tensor from a generator of type {generator:?}")]
    DeviceMismatch { target: Device, generator: Device },

    /// Batched generators have to be bound to devices of the same kind.
    #[error("batched generators are bound to different devices: {first:?} and {other:?}")]
    MixedGeneratorDevices { first: Device, other: Device },

    #[error("invalid shape {shape:?}: {reason}")]
    InvalidShape { shape: Vec<i64>, reason: String },

    #[error("unsupported kind {0:?} for normal sampling")]
    UnsupportedKind(Kind),

    /// A saved generator state was restored into a generator running a
    /// different engine.
    #[error("cannot restore a {state} state into a {generator} generator")]
    StateMismatch { state: &'static str, generator: &'static str },

    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument { arg: &'static str, reason: String },

    #[error(transparent)]
    Torch(#[from] tch::TchError),
}
