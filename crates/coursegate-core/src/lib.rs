//! coursegate-core: Progress tracking, skill adjustment and lockout gating.
//!
//! This crate defines the progress record model, the pure calculators
//! (tiering, progress percentage, skill rules), the collaborator traits and
//! the gating service that ties them together.

pub mod api;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod model;
pub mod progress;
pub mod skill;
pub mod tiering;
pub mod traits;
