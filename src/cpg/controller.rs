//! Pattern-generator controller with time-catch-up scheduling
//!
//! The host simulation loop hands over an absolute time and (optionally) a
//! sensed force vector once per physics tick; the controller reconciles that
//! time with its own fixed-step counter, runs however many integration steps
//! are needed to catch up, and returns the joint actions from the last step.

use crate::cpg::feedback::FeedbackNetwork;
use crate::cpg::oscillator::{CpgNetwork, CpgParams};
use crate::cpg::topology::GaitTopology;
use anyhow::{bail, Result};
use tracing::debug;

/// Oscillator bank plus optional feedback mapper behind one `advance` call
///
/// Single-threaded by design: each call completes its whole catch-up loop
/// before returning, and callers that share an instance across threads must
/// serialize access themselves (there is no internal locking). Weight
/// reloads must likewise not race `advance`.
#[derive(Debug, Clone)]
pub struct CpgController {
    network: CpgNetwork,
    feedback: Option<FeedbackNetwork>,

    /// Integration steps performed so far; `None` means never stepped
    prev_step: Option<u64>,

    /// Actions from the most recent integration step, or from the initial
    /// state if no step has run yet
    last_actions: Vec<f64>,
}

impl CpgController {
    /// Open-loop controller: feedback modulation is always zero
    pub fn open_loop(params: CpgParams, topology: GaitTopology) -> Result<Self> {
        let network = CpgNetwork::new(params, topology)?;
        let last_actions = network.read_actions();
        Ok(Self {
            network,
            feedback: None,
            prev_step: None,
            last_actions,
        })
    }

    /// Closed-loop controller: sensed forces modulate the oscillators
    /// through the given mapper
    ///
    /// The mapper must be finalized, consume N force values, and produce
    /// exactly 3N modulation values (radius, phase, offset blocks).
    pub fn closed_loop(
        params: CpgParams,
        topology: GaitTopology,
        feedback: FeedbackNetwork,
    ) -> Result<Self> {
        let network = CpgNetwork::new(params, topology)?;
        let n = network.size();
        if !feedback.is_finalized() {
            bail!("feedback mapper must be finalized before constructing a controller");
        }
        if feedback.input_size() != n {
            bail!(
                "feedback mapper consumes {} inputs, expected {n} force values",
                feedback.input_size()
            );
        }
        if feedback.output_size() != 3 * n {
            bail!(
                "feedback mapper produces {} outputs, expected {} modulation values",
                feedback.output_size(),
                3 * n
            );
        }

        let last_actions = network.read_actions();
        Ok(Self {
            network,
            feedback: Some(feedback),
            prev_step: None,
            last_actions,
        })
    }

    /// Advance to the given absolute time and return the joint actions
    ///
    /// Runs `floor(absolute_time / dt) − steps_done` integration steps, so a
    /// caller that skipped several dt windows gets every intermediate step,
    /// and a repeated or earlier time is a no-op that returns the previous
    /// action vector. `forces = None` forces this call into open loop even
    /// on a closed-loop controller.
    ///
    /// When more than one sub-step runs in closed loop, the single supplied
    /// force vector is reused for every sub-step; forces are not refreshed
    /// mid-catch-up. See [`advance_resampled`](Self::advance_resampled) for
    /// the variant that does refresh them.
    pub fn advance(&mut self, absolute_time: f64, forces: Option<&[f64]>) -> Result<Vec<f64>> {
        if let Some(f) = forces {
            if self.feedback.is_some() && f.len() != self.network.size() {
                bail!(
                    "force vector has {} values, controller drives {} limbs",
                    f.len(),
                    self.network.size()
                );
            }
        }

        let target = self.target_step(absolute_time);
        let done = self.prev_step.unwrap_or(0);
        let steps = target.saturating_sub(done);
        if steps > 1 && forces.is_some() && self.feedback.is_some() {
            // Known staleness artifact: one force sample drives all
            // catch-up sub-steps of this call
            debug!(sub_steps = steps, "reusing one force sample across catch-up");
        }

        for _ in 0..steps {
            let (fr, fphi, fo) = self.modulation(forces)?;
            self.last_actions = self.network.integrate_step(&fr, &fphi, &fo);
        }

        self.prev_step = Some(done.max(target));
        Ok(self.last_actions.clone())
    }

    /// Strict-mode advance: the sampler is consulted at every sub-step
    ///
    /// `sampler` is called with the simulation time at the start of each
    /// sub-step and returns the force vector to use for that step (or
    /// `None` for open loop). Behaviorally identical to [`advance`](Self::advance)
    /// when at most one sub-step runs or the sampler is constant.
    pub fn advance_resampled(
        &mut self,
        absolute_time: f64,
        mut sampler: impl FnMut(f64) -> Option<Vec<f64>>,
    ) -> Result<Vec<f64>> {
        let target = self.target_step(absolute_time);
        let done = self.prev_step.unwrap_or(0);
        let dt = self.network.params().dt;

        for step in done..target {
            let forces = sampler(step as f64 * dt);
            if let Some(f) = &forces {
                if self.feedback.is_some() && f.len() != self.network.size() {
                    bail!(
                        "force vector has {} values, controller drives {} limbs",
                        f.len(),
                        self.network.size()
                    );
                }
            }
            let (fr, fphi, fo) = self.modulation(forces.as_deref())?;
            self.last_actions = self.network.integrate_step(&fr, &fphi, &fo);
        }

        self.prev_step = Some(done.max(target));
        Ok(self.last_actions.clone())
    }

    /// Reload the feedback mapper's weights without changing its shape
    ///
    /// Must not be called concurrently with `advance` on the same instance.
    pub fn set_feedback_weights(&mut self, flat: &[f64]) -> Result<()> {
        match &mut self.feedback {
            Some(feedback) => feedback.set_weights(flat),
            None => bail!("open-loop controller has no feedback mapper"),
        }
    }

    /// Integration steps performed so far
    pub fn step_count(&self) -> u64 {
        self.prev_step.unwrap_or(0)
    }

    /// Whether a feedback mapper is attached
    pub fn is_closed_loop(&self) -> bool {
        self.feedback.is_some()
    }

    /// The oscillator bank
    pub fn network(&self) -> &CpgNetwork {
        &self.network
    }

    /// Actions from the most recent integration step
    pub fn last_actions(&self) -> &[f64] {
        &self.last_actions
    }

    /// Which fixed step the given absolute time lands on
    ///
    /// Degenerate times (negative, NaN, infinite) land on step zero, so
    /// they can never run sub-steps or move the counter backwards.
    fn target_step(&self, absolute_time: f64) -> u64 {
        let steps = (absolute_time / self.network.params().dt).floor();
        if steps.is_finite() && steps > 0.0 {
            steps as u64
        } else {
            0
        }
    }

    /// Modulation vectors for one sub-step
    ///
    /// Closed loop with forces present: mapper output split into its
    /// radius/phase/offset thirds. Otherwise all zeros.
    fn modulation(&self, forces: Option<&[f64]>) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let n = self.network.size();
        match (&self.feedback, forces) {
            (Some(feedback), Some(f)) => {
                let out = feedback.forward(f)?;
                Ok((
                    out[..n].to_vec(),
                    out[n..2 * n].to_vec(),
                    out[2 * n..].to_vec(),
                ))
            }
            _ => Ok((vec![0.0; n], vec![0.0; n], vec![0.0; n])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    const DT: f64 = 0.001;

    fn quad_params() -> CpgParams {
        CpgParams::new(vec![1.0; 4], vec![0.0; 4], vec![2.0; 4], vec![0.5; 4])
    }

    fn in_phase_topology() -> GaitTopology {
        let coupling = DMatrix::from_fn(4, 4, |i, j| if i == j { 0.0 } else { 1.0 });
        GaitTopology::new(coupling, DMatrix::zeros(4, 4)).unwrap()
    }

    fn open_controller() -> CpgController {
        CpgController::open_loop(quad_params(), in_phase_topology()).unwrap()
    }

    fn closed_controller() -> CpgController {
        let mut mapper = FeedbackNetwork::with_hidden(4, &[], 12).unwrap();
        let weights: Vec<f64> = (0..48).map(|i| ((i % 7) as f64 - 3.0) * 0.1).collect();
        mapper.set_weights(&weights).unwrap();
        CpgController::closed_loop(quad_params(), in_phase_topology(), mapper).unwrap()
    }

    #[test]
    fn test_closed_loop_rejects_bad_mapper_shapes() {
        let unfinalized = FeedbackNetwork::new(4, 12);
        assert!(
            CpgController::closed_loop(quad_params(), in_phase_topology(), unfinalized).is_err()
        );

        let wrong_inputs = FeedbackNetwork::with_hidden(3, &[], 12).unwrap();
        assert!(
            CpgController::closed_loop(quad_params(), in_phase_topology(), wrong_inputs).is_err()
        );

        let wrong_outputs = FeedbackNetwork::with_hidden(4, &[], 8).unwrap();
        assert!(
            CpgController::closed_loop(quad_params(), in_phase_topology(), wrong_outputs).is_err()
        );
    }

    #[test]
    fn test_zero_step_call_returns_initial_actions() {
        let mut controller = open_controller();
        let initial = controller.network().read_actions();
        let radii_before = controller.network().radii().to_vec();

        // Below one dt: no integration at all
        let actions = controller.advance(DT / 2.0, None).unwrap();
        assert_eq!(actions, initial);
        assert_eq!(controller.step_count(), 0);
        assert_eq!(controller.network().radii(), radii_before.as_slice());
    }

    #[test]
    fn test_advance_is_idempotent_for_same_time() {
        let mut controller = open_controller();
        let first = controller.advance(0.02, None).unwrap();
        let steps = controller.step_count();

        let second = controller.advance(0.02, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(controller.step_count(), steps);
    }

    #[test]
    fn test_catch_up_equivalence() {
        let mut at_once = open_controller();
        let mut stepwise = open_controller();

        // Mid-window times keep floor(t/dt) away from rounding boundaries
        let final_direct = at_once.advance(5.5 * DT, None).unwrap();
        let mut final_stepped = Vec::new();
        for k in 1..=5 {
            final_stepped = stepwise.advance((k as f64 + 0.5) * DT, None).unwrap();
        }

        // Same sequence of operations, so the states match exactly
        assert_eq!(final_direct, final_stepped);
        assert_eq!(at_once.network().radii(), stepwise.network().radii());
        assert_eq!(at_once.network().phases(), stepwise.network().phases());
        assert_eq!(at_once.step_count(), stepwise.step_count());
    }

    #[test]
    fn test_closed_loop_catch_up_equivalence() {
        let mut at_once = closed_controller();
        let mut stepwise = closed_controller();
        let forces = [0.4, -0.2, 0.9, 0.1];

        let final_direct = at_once.advance(8.5 * DT, Some(&forces)).unwrap();
        let mut final_stepped = Vec::new();
        for k in 1..=8 {
            final_stepped = stepwise
                .advance((k as f64 + 0.5) * DT, Some(&forces))
                .unwrap();
        }

        assert_eq!(final_direct, final_stepped);
        assert_eq!(at_once.network().phases(), stepwise.network().phases());
    }

    #[test]
    fn test_negative_and_nonfinite_times_are_noops() {
        let mut controller = open_controller();
        let initial = controller.advance(-3.0, None).unwrap();
        assert_eq!(controller.step_count(), 0);
        assert_eq!(initial, controller.network().read_actions());

        controller.advance(f64::NAN, None).unwrap();
        controller.advance(f64::INFINITY, None).unwrap();
        assert_eq!(controller.step_count(), 0);
    }

    #[test]
    fn test_counter_never_decreases() {
        let mut controller = open_controller();
        controller.advance(10.5 * DT, None).unwrap();
        assert_eq!(controller.step_count(), 10);

        let held = controller.advance(4.5 * DT, None).unwrap();
        assert_eq!(controller.step_count(), 10);
        assert_eq!(held.as_slice(), controller.last_actions());
    }

    #[test]
    fn test_null_forces_degrade_to_open_loop() {
        let mut closed = closed_controller();
        let mut open = open_controller();

        let a = closed.advance(0.05, None).unwrap();
        let b = open.advance(0.05, None).unwrap();

        assert_eq!(a, b);
        assert_eq!(closed.network().phases(), open.network().phases());
    }

    #[test]
    fn test_forces_modulate_closed_loop() {
        let mut with_forces = closed_controller();
        let mut without = closed_controller();

        let a = with_forces.advance(0.05, Some(&[1.0, -1.0, 0.5, 0.0])).unwrap();
        let b = without.advance(0.05, None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_loop_ignores_forces() {
        let mut with_forces = open_controller();
        let mut without = open_controller();

        let a = with_forces.advance(0.05, Some(&[1.0, -1.0, 0.5, 0.0])).unwrap();
        let b = without.advance(0.05, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_wrong_force_length() {
        let mut controller = closed_controller();
        assert!(controller.advance(0.01, Some(&[1.0, 2.0])).is_err());
    }

    #[test]
    fn test_resampled_matches_advance_for_constant_forces() {
        let forces = [0.3, 0.3, -0.1, 0.7];
        let mut stale = closed_controller();
        let mut strict = closed_controller();

        let a = stale.advance(0.02, Some(&forces)).unwrap();
        let b = strict
            .advance_resampled(0.02, |_| Some(forces.to_vec()))
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(stale.network().phases(), strict.network().phases());
    }

    #[test]
    fn test_resampled_consults_sampler_per_substep() {
        let mut controller = closed_controller();
        let mut sampled_times = Vec::new();

        controller
            .advance_resampled(5.5 * DT, |t| {
                sampled_times.push(t);
                Some(vec![0.0; 4])
            })
            .unwrap();

        assert_eq!(sampled_times.len(), 5);
        for (k, &t) in sampled_times.iter().enumerate() {
            assert!((t - k as f64 * DT).abs() < 1e-12);
        }
    }

    #[test]
    fn test_weight_reload() {
        let mut controller = closed_controller();
        assert!(controller.set_feedback_weights(&vec![0.0; 48]).is_ok());
        assert!(controller.set_feedback_weights(&vec![0.0; 10]).is_err());

        let mut open = open_controller();
        assert!(open.set_feedback_weights(&vec![0.0; 48]).is_err());

        // Zeroed weights make the closed loop behave like the open loop
        let mut reference = open_controller();
        let a = controller.advance(0.03, Some(&[1.0; 4])).unwrap();
        let b = reference.advance(0.03, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_state_stays_finite_over_long_run() {
        let mut controller = closed_controller();
        for k in 1..=2000 {
            controller
                .advance(k as f64 * 0.005, Some(&[0.5, -0.5, 0.25, 0.0]))
                .unwrap();
        }
        assert!(controller.network().is_finite());
    }
}
