//! rollcast-dice — dice spec parsing and rolling.
//!
//! Parses specs of the form `NdM(+NdM)*` and produces per-die face values
//! and an integer total. Rolling is a pure function over an injected
//! `rand::Rng`, so outcomes are deterministic under a seeded RNG in tests.

pub mod error;
pub mod roll;
pub mod spec;

pub use error::DiceError;
pub use roll::{roll, roll_spec, RollOutcome};
pub use spec::{DiceTerm, RollSpec, SUPPORTED_FACES};
