//! Feedforward force-to-modulation mapper
//!
//! A small bias-free tanh network that turns a sensed ground-contact force
//! vector into the radius/phase/offset modulation blocks consumed by the
//! oscillator bank. Stateless between calls; it holds nothing but its
//! weight matrices.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};

/// Dense feedforward network without bias terms
///
/// Layers are declared up front: `new(inputs, outputs)`, zero or more
/// `add_layer(width)` calls for hidden layers, then `finalize()` appends
/// the output layer and freezes the shape. Weight values are loaded
/// afterwards as one flat sequence and may be reloaded at any time without
/// changing shape.
#[derive(Debug, Clone)]
pub struct FeedbackNetwork {
    /// One weight matrix per layer, shaped (inputs-to-layer × layer-width)
    weights: Vec<DMatrix<f64>>,
    inputs: usize,
    outputs: usize,
    next_inputs: usize,
    finalized: bool,
}

impl FeedbackNetwork {
    /// Start declaring a network with the given input and output widths
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            weights: Vec::new(),
            inputs,
            outputs,
            next_inputs: inputs,
            finalized: false,
        }
    }

    /// Declare a network with the given hidden-layer widths, finalized
    pub fn with_hidden(inputs: usize, hidden: &[usize], outputs: usize) -> Result<Self> {
        let mut network = Self::new(inputs, outputs);
        for &width in hidden {
            network.add_layer(width)?;
        }
        network.finalize()?;
        Ok(network)
    }

    /// Append a hidden layer of the given width
    pub fn add_layer(&mut self, width: usize) -> Result<()> {
        if self.finalized {
            bail!("cannot add a layer to a finalized feedback network");
        }
        if width == 0 {
            bail!("feedback network layer width must be nonzero");
        }
        self.weights
            .push(DMatrix::zeros(self.next_inputs, width));
        self.next_inputs = width;
        Ok(())
    }

    /// Append the output layer and freeze the shape
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            bail!("feedback network is already finalized");
        }
        if self.inputs == 0 || self.outputs == 0 {
            bail!(
                "feedback network needs nonzero input and output widths, got {} -> {}",
                self.inputs,
                self.outputs
            );
        }
        self.weights
            .push(DMatrix::zeros(self.next_inputs, self.outputs));
        self.next_inputs = self.outputs;
        self.finalized = true;
        Ok(())
    }

    /// Whether the layer shapes are frozen
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Input vector width
    pub fn input_size(&self) -> usize {
        self.inputs
    }

    /// Output vector width
    pub fn output_size(&self) -> usize {
        self.outputs
    }

    /// Total number of weight values across all layers
    pub fn weight_count(&self) -> usize {
        self.weights.iter().map(|w| w.nrows() * w.ncols()).sum()
    }

    /// Load all weights from one flat sequence
    ///
    /// Values are consumed in layer order, then row order, then column
    /// order. A sequence of any other length is rejected outright; nothing
    /// is truncated or padded.
    pub fn set_weights(&mut self, flat: &[f64]) -> Result<()> {
        if !self.finalized {
            bail!("feedback network must be finalized before loading weights");
        }
        let expected = self.weight_count();
        if flat.len() != expected {
            bail!(
                "weight sequence has {} values, network expects {expected}",
                flat.len()
            );
        }

        let mut cursor = 0;
        for weights in &mut self.weights {
            for row in 0..weights.nrows() {
                for col in 0..weights.ncols() {
                    weights[(row, col)] = flat[cursor];
                    cursor += 1;
                }
            }
        }
        Ok(())
    }

    /// Read all weights back as one flat sequence, in loading order
    pub fn weights_flat(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.weight_count());
        for weights in &self.weights {
            for row in 0..weights.nrows() {
                for col in 0..weights.ncols() {
                    flat.push(weights[(row, col)]);
                }
            }
        }
        flat
    }

    /// Run the network: each layer computes tanh(inᵀ · W) elementwise
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if !self.finalized {
            bail!("feedback network must be finalized before use");
        }
        if input.len() != self.inputs {
            bail!(
                "feedback input has {} values, network expects {}",
                input.len(),
                self.inputs
            );
        }

        let mut values = DVector::from_column_slice(input);
        for weights in &self.weights {
            values = weights.tr_mul(&values).map(f64::tanh);
        }
        Ok(values.iter().copied().collect())
    }
}
