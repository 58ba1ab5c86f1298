//! Coupled Hopf oscillator bank: the rhythm-generating core
//!
//! One oscillator per limb, each holding radius, phase, and offset state.
//! Amplitudes relax toward √μ at rate γ, phases advance at ω and are pulled
//! toward the gait's phase biases by diffusive coupling, and an asymmetric
//! stance/swing remapping turns the uniformly advancing phase into joint
//! angle commands with uneven stance and swing durations.

use crate::cpg::constants::{DEFAULT_DT, DEFAULT_GAMMA};
use crate::cpg::topology::GaitTopology;
use anyhow::{bail, Result};
use std::f64::consts::PI;

/// Static parameters of the oscillator bank, immutable after construction
#[derive(Debug, Clone)]
pub struct CpgParams {
    /// Target squared amplitude μ_i per unit; radius converges to √μ_i
    pub mu: Vec<f64>,

    /// Target output offset per unit, also the initial offset state
    pub offset: Vec<f64>,

    /// Target angular frequency ω_i per unit (rad/s)
    pub omega: Vec<f64>,

    /// Duty factor d_i per unit, fraction of the cycle spent in stance,
    /// strictly inside (0, 1)
    pub duty: Vec<f64>,

    /// Shared amplitude convergence rate γ
    pub gamma: f64,

    /// Fixed integration time step (seconds)
    pub dt: f64,

    /// Feedback gain on radius per unit
    pub kappa_r: Vec<f64>,

    /// Feedback gain on phase per unit
    pub kappa_phi: Vec<f64>,

    /// Feedback gain on offset per unit
    pub kappa_o: Vec<f64>,
}

impl CpgParams {
    /// Create parameters with unit feedback gains and default γ and dt
    pub fn new(mu: Vec<f64>, offset: Vec<f64>, omega: Vec<f64>, duty: Vec<f64>) -> Self {
        let n = mu.len();
        Self {
            mu,
            offset,
            omega,
            duty,
            gamma: DEFAULT_GAMMA,
            dt: DEFAULT_DT,
            kappa_r: vec![1.0; n],
            kappa_phi: vec![1.0; n],
            kappa_o: vec![1.0; n],
        }
    }

    /// Replace the per-unit feedback gains
    pub fn with_gains(mut self, kappa_r: Vec<f64>, kappa_phi: Vec<f64>, kappa_o: Vec<f64>) -> Self {
        self.kappa_r = kappa_r;
        self.kappa_phi = kappa_phi;
        self.kappa_o = kappa_o;
        self
    }

    /// Number of oscillator units
    pub fn unit_count(&self) -> usize {
        self.mu.len()
    }

    /// Validate dimensions and value ranges
    ///
    /// Every failure is a construction-time error; nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        let n = self.mu.len();
        if n < 2 {
            bail!("oscillator bank needs at least 2 units, got {n}");
        }
        for (name, len) in [
            ("offset", self.offset.len()),
            ("omega", self.omega.len()),
            ("duty", self.duty.len()),
            ("kappa_r", self.kappa_r.len()),
            ("kappa_phi", self.kappa_phi.len()),
            ("kappa_o", self.kappa_o.len()),
        ] {
            if len != n {
                bail!("{name} has {len} entries, expected {n} to match mu");
            }
        }
        for (i, &d) in self.duty.iter().enumerate() {
            // d = 0 or 1 would divide by zero in the stance/swing remapping
            if !(d > 0.0 && d < 1.0) {
                bail!("duty factor of unit {i} must lie strictly inside (0, 1), got {d}");
            }
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            bail!("integration step dt must be a positive finite value, got {}", self.dt);
        }
        if !self.gamma.is_finite() {
            bail!("convergence rate gamma must be finite, got {}", self.gamma);
        }

        Ok(())
    }
}

/// Bank of N coupled oscillators with in-place mutable state
#[derive(Debug, Clone)]
pub struct CpgNetwork {
    params: CpgParams,
    topology: GaitTopology,

    /// Radius state r_i, nominally positive
    r: Vec<f64>,

    /// Phase state φ_i in radians, unbounded; wrapped only at output time
    phi: Vec<f64>,

    /// Offset state o_i, unbounded
    offset: Vec<f64>,
}

impl CpgNetwork {
    /// Create a bank from validated parameters and a matching topology
    pub fn new(params: CpgParams, topology: GaitTopology) -> Result<Self> {
        params.validate()?;
        let n = params.unit_count();
        if topology.size() != n {
            bail!(
                "topology couples {} units but parameters describe {n}",
                topology.size()
            );
        }

        let offset = params.offset.clone();
        Ok(Self {
            params,
            topology,
            r: vec![1.0; n],
            phi: vec![1.0; n],
            offset,
        })
    }

    /// Number of oscillator units
    pub fn size(&self) -> usize {
        self.r.len()
    }

    /// Static parameters
    pub fn params(&self) -> &CpgParams {
        &self.params
    }

    /// Gait topology
    pub fn topology(&self) -> &GaitTopology {
        &self.topology
    }

    /// Advance the bank by one explicit-Euler step and return the actions
    ///
    /// `fr`, `fphi`, `fo` are the length-N radius/phase/offset modulation
    /// vectors, all zero in open-loop operation. All derivatives are
    /// evaluated on the pre-step state before any unit is updated.
    pub fn integrate_step(&mut self, fr: &[f64], fphi: &[f64], fo: &[f64]) -> Vec<f64> {
        let n = self.size();
        debug_assert_eq!(fr.len(), n);
        debug_assert_eq!(fphi.len(), n);
        debug_assert_eq!(fo.len(), n);

        let p = &self.params;
        let coupling = self.topology.coupling();
        let psi = self.topology.phase_bias();

        let mut d_r = vec![0.0; n];
        let mut d_phi = vec![0.0; n];
        let mut d_o = vec![0.0; n];
        for i in 0..n {
            d_r[i] = p.gamma * (p.mu[i] + p.kappa_r[i] * fr[i] - self.r[i] * self.r[i]) * self.r[i];

            let mut dp = p.omega[i] + p.kappa_phi[i] * fphi[i];
            for j in 0..n {
                dp += coupling[(i, j)] * (self.phi[j] - self.phi[i] - psi[(i, j)]).sin();
            }
            d_phi[i] = dp;

            d_o[i] = p.kappa_o[i] * fo[i];
        }

        for i in 0..n {
            self.r[i] += p.dt * d_r[i];
            self.phi[i] += p.dt * d_phi[i];
            self.offset[i] += p.dt * d_o[i];
        }

        self.read_actions()
    }

    /// Map the current state to joint actions without stepping
    pub fn read_actions(&self) -> Vec<f64> {
        (0..self.size())
            .map(|i| {
                let phi_l = duty_remap(self.phi[i], self.params.duty[i]);
                self.r[i] * phi_l.cos() + self.offset[i]
            })
            .collect()
    }

    /// Radius state per unit
    pub fn radii(&self) -> &[f64] {
        &self.r
    }

    /// Unwrapped phase state per unit (radians)
    pub fn phases(&self) -> &[f64] {
        &self.phi
    }

    /// Offset state per unit
    pub fn offsets(&self) -> &[f64] {
        &self.offset
    }

    /// Whether every state variable is still a finite number
    ///
    /// The stepping loop never checks this itself; it exists for hosts and
    /// tests that want to probe for numeric degeneracy.
    pub fn is_finite(&self) -> bool {
        self.r.iter().all(|v| v.is_finite())
            && self.phi.iter().all(|v| v.is_finite())
            && self.offset.iter().all(|v| v.is_finite())
    }

    /// Restore the initial state
    pub fn reset(&mut self) {
        self.r.fill(1.0);
        self.phi.fill(1.0);
        self.offset.copy_from_slice(&self.params.offset);
    }
}

/// Stance/swing phase remapping
///
/// Wraps the unbounded phase into [0, 2π), then maps the stance fraction
/// [0, 2π·d) linearly onto [0, π] and the swing fraction onto [π, 2π].
/// Both branches evaluate to π at the duty boundary, so the mapped angle is
/// continuous while stance and swing take unequal wall-clock time.
fn duty_remap(phi: f64, duty: f64) -> f64 {
    let two_pi = 2.0 * PI;
    let wrapped = phi.rem_euclid(two_pi);
    if wrapped < two_pi * duty {
        wrapped / (2.0 * duty)
    } else {
        (wrapped + two_pi * (1.0 - 2.0 * duty)) / (2.0 * (1.0 - duty))
    }
}
