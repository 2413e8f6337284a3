//! Strain-introduction simulations of pathogen evolution under vertical and
//! horizontal transmission.
//!
//! [`engine::Engine`] integrates [`field::DensityField`] window by window,
//! seeding a new strain into the lowest empty slot between windows and
//! recording every sample in a [`model::PopulationMatrix`].

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod field;
pub mod integrator;
pub mod manager;
pub mod model;
pub mod params;
pub mod sampler;
pub mod stats;
