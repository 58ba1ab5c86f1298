pub mod config;
pub mod cpg;

pub use config::{CpgConfig, FeedbackConfig, TopologySpec};
pub use cpg::controller::CpgController;
pub use cpg::feedback::FeedbackNetwork;
pub use cpg::oscillator::{CpgNetwork, CpgParams};
pub use cpg::topology::GaitTopology;
