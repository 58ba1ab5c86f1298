//! Serializable construction parameters for a pattern-generator controller
//!
//! Hosts and optimizers describe a controller as a plain data document
//! (typically JSON on disk) and build the validated controller from it.

use crate::cpg::controller::CpgController;
use crate::cpg::feedback::FeedbackNetwork;
use crate::cpg::oscillator::CpgParams;
use crate::cpg::topology::GaitTopology;
use anyhow::{bail, Context, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

/// Full construction document for one controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpgConfig {
    /// Target squared amplitude per unit
    pub mu: Vec<f64>,

    /// Target output offset per unit
    pub offset: Vec<f64>,

    /// Target angular frequency per unit (rad/s)
    pub omega: Vec<f64>,

    /// Duty factor per unit, strictly inside (0, 1)
    pub duty: Vec<f64>,

    /// Shared amplitude convergence rate
    pub gamma: f64,

    /// Integration time step (seconds)
    pub dt: f64,

    /// Gait topology derivation
    pub topology: TopologySpec,

    /// Closed-loop feedback section; absent for open-loop controllers
    pub feedback: Option<FeedbackConfig>,
}

/// How to derive the coupling and phase-bias matrices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TopologySpec {
    /// Fully-coupled quadruped from three reference angles
    FullyCoupled { phase_offsets: [f64; 3] },

    /// Quadruped from six explicit pairwise phase offsets
    Pairwise { phase_offsets: [f64; 6] },

    /// Legacy bound gait: front/back pairs at one offset, explicit coupling
    PairedBlocks {
        phase_offset: f64,
        coupling: Vec<Vec<f64>>,
    },

    /// Canonical explicit (C, Ψ) pair
    Explicit {
        coupling: Vec<Vec<f64>>,
        phase_bias: Vec<Vec<f64>>,
    },
}

/// Closed-loop feedback parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Feedback gain on radius per unit
    pub kappa_r: Vec<f64>,

    /// Feedback gain on phase per unit
    pub kappa_phi: Vec<f64>,

    /// Feedback gain on offset per unit
    pub kappa_o: Vec<f64>,

    /// Hidden-layer widths of the mapper; empty for a single dense layer
    pub hidden_layers: Vec<usize>,

    /// Flat mapper weights in layer, row, column order
    pub weights: Vec<f64>,
}

impl Default for CpgConfig {
    /// In-phase quadruped walk at one cycle per second
    fn default() -> Self {
        Self {
            mu: vec![1.0; 4],
            offset: vec![0.0; 4],
            omega: vec![2.0 * PI; 4],
            duty: vec![0.5; 4],
            gamma: 0.1,
            dt: 0.001,
            topology: TopologySpec::FullyCoupled {
                phase_offsets: [0.0; 3],
            },
            feedback: None,
        }
    }
}

impl TopologySpec {
    /// Build the concrete topology this variant describes
    pub fn build(&self) -> Result<GaitTopology> {
        match self {
            Self::FullyCoupled { phase_offsets } => Ok(GaitTopology::fully_coupled(phase_offsets)),
            Self::Pairwise { phase_offsets } => Ok(GaitTopology::from_pairwise(phase_offsets)),
            Self::PairedBlocks {
                phase_offset,
                coupling,
            } => GaitTopology::paired_blocks(*phase_offset, rows_to_matrix(coupling)?),
            Self::Explicit {
                coupling,
                phase_bias,
            } => GaitTopology::new(rows_to_matrix(coupling)?, rows_to_matrix(phase_bias)?),
        }
    }
}

impl CpgConfig {
    /// Load a config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read CPG config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse CPG config {}", path.display()))
    }

    /// Write the config to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write CPG config {}", path.display()))
    }

    /// Decode the legacy optimizer genome: a flat 17-element vector
    ///
    /// Layout: 4 amplitudes, 2 mirrored offsets, 2 mirrored frequencies,
    /// 2 mirrored duty factors (front pair / back pair each), 6 symmetric
    /// coupling weights, and one scalar phase offset for the paired-block
    /// topology. Decoding does not validate ranges; `build` does.
    pub fn from_legacy_genome(x: &[f64]) -> Result<Self> {
        if x.len() != 17 {
            bail!("legacy CPG genome has 17 parameters, got {}", x.len());
        }

        let coupling = vec![
            vec![0.0, x[10], x[11], x[13]],
            vec![x[10], 0.0, x[12], x[14]],
            vec![x[11], x[12], 0.0, x[15]],
            vec![x[13], x[14], x[15], 0.0],
        ];

        Ok(Self {
            mu: x[0..4].to_vec(),
            offset: vec![x[4], x[4], x[5], x[5]],
            omega: vec![x[6], x[6], x[7], x[7]],
            duty: vec![x[8], x[8], x[9], x[9]],
            topology: TopologySpec::PairedBlocks {
                phase_offset: x[16],
                coupling,
            },
            ..Self::default()
        })
    }

    /// Build a validated controller from this document
    pub fn build(&self) -> Result<CpgController> {
        let topology = self.topology.build()?;
        let mut params = CpgParams::new(
            self.mu.clone(),
            self.offset.clone(),
            self.omega.clone(),
            self.duty.clone(),
        );
        params.gamma = self.gamma;
        params.dt = self.dt;

        match &self.feedback {
            None => CpgController::open_loop(params, topology),
            Some(fb) => {
                let params = params.with_gains(
                    fb.kappa_r.clone(),
                    fb.kappa_phi.clone(),
                    fb.kappa_o.clone(),
                );
                let n = self.mu.len();
                let mut mapper = FeedbackNetwork::with_hidden(n, &fb.hidden_layers, 3 * n)?;
                mapper.set_weights(&fb.weights)?;
                CpgController::closed_loop(params, topology, mapper)
            }
        }
    }
}

/// Row-of-rows JSON representation to a dense matrix
fn rows_to_matrix(rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let nrows = rows.len();
    if nrows == 0 {
        bail!("matrix in config has no rows");
    }
    let ncols = rows[0].len();
    for (i, row) in rows.iter().enumerate() {
        if row.len() != ncols {
            bail!(
                "matrix in config is ragged: row {i} has {} entries, row 0 has {ncols}",
                row.len()
            );
        }
    }
    Ok(DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j]))
}
