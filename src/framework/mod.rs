//! Unit contract and registry.
//!
//! This module provides the building blocks every hosted component is written against.
//!
//! # Main Components
//!
//! - [`Unit`] - The five-operation lifecycle contract
//! - [`BaseUnit`] - Default behaviour a unit embeds and delegates to
//! - [`UnitRegistry`] - Name-unique, insertion-ordered unit collection
//! - [`MachineryError`], [`UnitError`], [`ConfigError`] - Error types
//!
//! # Testing
//!
//! See [`mock`] for a recording log sink and a probe unit.

pub mod error;
pub mod mock;
pub mod registry;
pub mod unit;

pub use error::{ConfigError, MachineryError, UnitError};
pub use registry::UnitRegistry;
pub use unit::{BaseUnit, Capability, Unit};
