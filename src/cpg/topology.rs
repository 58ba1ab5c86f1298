//! Gait topology: coupling weights and desired phase biases between limbs
//!
//! A gait is encoded as a pair of N×N matrices: coupling weights C that set
//! how strongly each oscillator pulls on each other one, and an antisymmetric
//! phase-bias matrix Ψ that sets the phase lag each pair settles into.

use anyhow::{bail, Result};
use nalgebra::DMatrix;

/// Tolerance for the antisymmetry check Ψ_ij = −Ψ_ji
const ANTISYMMETRY_TOL: f64 = 1e-9;

/// Coupling matrix plus phase-bias matrix for one gait pattern
///
/// Immutable after construction. The three historical constructor variants
/// (three reference angles, six pairwise offsets, single block offset) are
/// provided as helpers that all build the same canonical representation.
#[derive(Debug, Clone)]
pub struct GaitTopology {
    /// Coupling weights C, C_ii conventionally zero
    coupling: DMatrix<f64>,

    /// Desired phase biases Ψ, antisymmetric with zero diagonal
    phase_bias: DMatrix<f64>,
}

impl GaitTopology {
    /// Canonical constructor from an explicit (C, Ψ) pair
    ///
    /// Both matrices must be square, of equal size ≥ 2, and Ψ must satisfy
    /// Ψ_ij = −Ψ_ji (which forces a zero diagonal).
    pub fn new(coupling: DMatrix<f64>, phase_bias: DMatrix<f64>) -> Result<Self> {
        let n = coupling.nrows();
        if coupling.ncols() != n {
            bail!(
                "coupling matrix must be square, got {}x{}",
                coupling.nrows(),
                coupling.ncols()
            );
        }
        if phase_bias.nrows() != n || phase_bias.ncols() != n {
            bail!(
                "phase-bias matrix must be {n}x{n} to match coupling, got {}x{}",
                phase_bias.nrows(),
                phase_bias.ncols()
            );
        }
        if n < 2 {
            bail!("a gait topology needs at least 2 units, got {n}");
        }
        for i in 0..n {
            for j in i..n {
                let residual = phase_bias[(i, j)] + phase_bias[(j, i)];
                if residual.abs() > ANTISYMMETRY_TOL {
                    bail!(
                        "phase-bias matrix is not antisymmetric at ({i},{j}): \
                         {} + {} = {residual}",
                        phase_bias[(i, j)],
                        phase_bias[(j, i)]
                    );
                }
            }
        }

        Ok(Self {
            coupling,
            phase_bias,
        })
    }

    /// Fully-coupled quadruped topology from three reference angles
    ///
    /// Unit 0 is the reference limb; `offsets = [a, b, c]` are the desired
    /// phase leads of limbs 1..3 relative to it. Every remaining pairwise
    /// bias is the difference of two reference angles, and the coupling is
    /// all-ones off the diagonal.
    pub fn fully_coupled(offsets: &[f64; 3]) -> Self {
        let [a, b, c] = *offsets;
        Self::from_pairwise(&[a, b, c, a - b, a - c, b - c])
    }

    /// Quadruped topology from six explicit pairwise phase offsets
    ///
    /// `offsets` fills the upper triangle in row order:
    /// (0,1), (0,2), (0,3), (1,2), (1,3), (2,3). The lower triangle is the
    /// negation, and the coupling is all-ones off the diagonal.
    pub fn from_pairwise(offsets: &[f64; 6]) -> Self {
        let [a, b, c, d, e, f] = *offsets;
        let phase_bias = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, a, b, c, //
                -a, 0.0, d, e, //
                -b, -d, 0.0, f, //
                -c, -e, -f, 0.0,
            ],
        );

        Self {
            coupling: quadruped_full_coupling(),
            phase_bias,
        }
    }

    /// Legacy bound-gait topology: front pair and back pair separated by a
    /// single phase offset, with a caller-supplied 4×4 coupling matrix
    ///
    /// Within each pair the bias is zero; across pairs it is `phase_offset`
    /// front→back and `-phase_offset` back→front, keeping Ψ antisymmetric.
    pub fn paired_blocks(phase_offset: f64, coupling: DMatrix<f64>) -> Result<Self> {
        if coupling.nrows() != 4 || coupling.ncols() != 4 {
            bail!(
                "paired-block topology is quadruped-only, coupling must be 4x4, got {}x{}",
                coupling.nrows(),
                coupling.ncols()
            );
        }

        let p = phase_offset;
        let phase_bias = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 0.0, p, p, //
                0.0, 0.0, p, p, //
                -p, -p, 0.0, 0.0, //
                -p, -p, 0.0, 0.0,
            ],
        );

        Self::new(coupling, phase_bias)
    }

    /// Number of oscillator units this topology couples
    pub fn size(&self) -> usize {
        self.coupling.nrows()
    }

    /// Coupling weight matrix C
    pub fn coupling(&self) -> &DMatrix<f64> {
        &self.coupling
    }

    /// Phase-bias matrix Ψ
    pub fn phase_bias(&self) -> &DMatrix<f64> {
        &self.phase_bias
    }
}

/// All-ones coupling off the diagonal, the standard quadruped wiring
fn quadruped_full_coupling() -> DMatrix<f64> {
    DMatrix::from_fn(4, 4, |i, j| if i == j { 0.0 } else { 1.0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_construction() {
        let coupling = quadruped_full_coupling();
        let psi = DMatrix::zeros(4, 4);
        let topology = GaitTopology::new(coupling, psi).unwrap();

        assert_eq!(topology.size(), 4);
        assert_eq!(topology.coupling()[(0, 0)], 0.0);
        assert_eq!(topology.coupling()[(0, 1)], 1.0);
    }

    #[test]
    fn test_rejects_non_square() {
        let coupling = DMatrix::zeros(3, 4);
        let psi = DMatrix::zeros(3, 3);
        assert!(GaitTopology::new(coupling, psi).is_err());
    }

    #[test]
    fn test_rejects_mismatched_sizes() {
        let coupling = DMatrix::zeros(4, 4);
        let psi = DMatrix::zeros(3, 3);
        assert!(GaitTopology::new(coupling, psi).is_err());
    }

    #[test]
    fn test_rejects_single_unit() {
        let coupling = DMatrix::zeros(1, 1);
        let psi = DMatrix::zeros(1, 1);
        assert!(GaitTopology::new(coupling, psi).is_err());
    }

    #[test]
    fn test_rejects_symmetric_phase_bias() {
        let coupling = quadruped_full_coupling();
        // Symmetric off-diagonal entry violates Ψ_ij = −Ψ_ji
        let mut psi = DMatrix::zeros(4, 4);
        psi[(0, 1)] = 0.5;
        psi[(1, 0)] = 0.5;
        assert!(GaitTopology::new(coupling, psi).is_err());
    }

    #[test]
    fn test_rejects_nonzero_diagonal_bias() {
        let coupling = quadruped_full_coupling();
        let mut psi = DMatrix::zeros(4, 4);
        psi[(2, 2)] = 0.1;
        assert!(GaitTopology::new(coupling, psi).is_err());
    }

    #[test]
    fn test_fully_coupled_derivation() {
        let (a, b, c) = (0.3, -0.7, 1.1);
        let topology = GaitTopology::fully_coupled(&[a, b, c]);

        let psi = topology.phase_bias();
        assert_eq!(psi[(0, 1)], a);
        assert_eq!(psi[(0, 2)], b);
        assert_eq!(psi[(0, 3)], c);
        assert_eq!(psi[(1, 2)], a - b);
        assert_eq!(psi[(1, 3)], a - c);
        assert_eq!(psi[(2, 3)], b - c);

        // Lower triangle is the negation
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(psi[(j, i)], -psi[(i, j)]);
            }
        }

        // All-ones coupling off the diagonal
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 0.0 } else { 1.0 };
                assert_eq!(topology.coupling()[(i, j)], expected);
            }
        }
    }

    #[test]
    fn test_pairwise_fills_upper_triangle_in_row_order() {
        let topology = GaitTopology::from_pairwise(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let psi = topology.phase_bias();

        assert_eq!(psi[(0, 1)], 0.1);
        assert_eq!(psi[(0, 2)], 0.2);
        assert_eq!(psi[(0, 3)], 0.3);
        assert_eq!(psi[(1, 2)], 0.4);
        assert_eq!(psi[(1, 3)], 0.5);
        assert_eq!(psi[(2, 3)], 0.6);
        assert_eq!(psi[(3, 1)], -0.5);
    }

    #[test]
    fn test_paired_blocks_is_antisymmetric() {
        let topology = GaitTopology::paired_blocks(1.2, quadruped_full_coupling()).unwrap();
        let psi = topology.phase_bias();

        // Zero within pairs, ±offset across pairs
        assert_eq!(psi[(0, 1)], 0.0);
        assert_eq!(psi[(2, 3)], 0.0);
        assert_eq!(psi[(0, 2)], 1.2);
        assert_eq!(psi[(1, 3)], 1.2);
        assert_eq!(psi[(2, 0)], -1.2);
        assert_eq!(psi[(3, 1)], -1.2);
    }

    #[test]
    fn test_paired_blocks_rejects_wrong_coupling_shape() {
        let coupling = DMatrix::zeros(3, 3);
        assert!(GaitTopology::paired_blocks(0.5, coupling).is_err());
    }
}
