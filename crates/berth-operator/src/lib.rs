//! berth operator - runs the LRP and Task controllers
//!
//! The binary lives in `main.rs`; this library exposes controller wiring and
//! startup steps so they can be reused and tested.

#![deny(missing_docs)]

pub mod controller_runner;
pub mod startup;
