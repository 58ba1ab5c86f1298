//! Central Pattern Generator: coupled oscillators for rhythmic limb control
//!
//! A small network of Hopf-style oscillators, one per limb, generates the
//! periodic joint-angle commands for a walking robot without any external
//! rhythmic input. Sensed ground-contact forces can modulate the rhythm
//! through a learned feedforward mapper (closed loop).

pub mod controller;
pub mod feedback;
pub mod oscillator;
pub mod topology;

pub use controller::CpgController;
pub use feedback::FeedbackNetwork;
pub use oscillator::{CpgNetwork, CpgParams};
pub use topology::GaitTopology;

/// Core constants for the pattern generator
pub mod constants {
    /// Default integration time step (1 ms)
    pub const DEFAULT_DT: f64 = 0.001;

    /// Default amplitude convergence rate
    pub const DEFAULT_GAMMA: f64 = 0.1;

    /// Oscillator count for a quadruped, one per limb
    pub const QUADRUPED_UNITS: usize = 4;
}
