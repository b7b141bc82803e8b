//! # Flight Simulator
//!
//! Seeded synthetic data for exercising the flight gain pipeline without
//! the full on-time performance archive.
//!
//! ## Features
//!
//! - Reference airlines and airports with real coordinates
//! - Flight legs with delay distributions that carry a learnable gain signal
//! - Blank-carrier legs in the scoring year that the default correction rules recover
//! - Deterministic output for a given seed

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod generator;
pub mod reference;

pub use generator::{FlightGenerator, SimulatorConfig, SimulatorError, SyntheticDataset};
pub use reference::{reference_airlines, reference_airports};
