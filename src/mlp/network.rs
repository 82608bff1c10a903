use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::mlp::kernels::{argmax, relu_in_place, F32AccelKernel, F32Kernel, I16AccelKernel, I8Kernel, Kernel};
use crate::mlp::scratch::Scratch;
use crate::mlp::{Model, CLASS_COUNT, INPUT_LEN};

/// Numeric family used for one inference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Precision {
    Float32,
    Float32Accel,
    Int8,
    Int16Accel,
}

impl Precision {
    pub const ALL: [Precision; 4] = [Precision::Float32, Precision::Float32Accel, Precision::Int8, Precision::Int16Accel];
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Precision::Float32 => "float32",
            Precision::Float32Accel => "float32-accel",
            Precision::Int8 => "int8",
            Precision::Int16Accel => "int16-accel",
        };
        f.pad(s)
    }
}

/// Two-layer forward pass for one kernel family. Holds only scratch buffers
/// and a saturation counter; the model is borrowed per call.
pub struct Pipeline<K: Kernel> {
    scratch: Scratch<K::Elem, K::Acc>,
    saturated: u64,
}

impl<K: Kernel> Pipeline<K> {
    pub fn new() -> Self { Self { scratch: Scratch::new(), saturated: 0 } }

    /// Runs quantize -> mvm -> dequantize -> relu -> quantize -> mvm ->
    /// dequantize -> argmax and returns the predicted class.
    pub fn run(&mut self, model: &Model, input: &[f32; INPUT_LEN]) -> usize {
        let s = &mut self.scratch;
        let (l1, l2) = (&model.hidden, &model.output);

        let mut sat = K::quantize(input, l1.profile.input, &mut s.input_q);
        K::mvm(K::weights(l1), &s.input_q, l1.zero_points(), &mut s.hidden_acc);
        K::dequantize(&l1.profile, &s.hidden_acc, &mut s.hidden);
        relu_in_place(&mut s.hidden);

        sat += K::quantize(&s.hidden, l2.profile.input, &mut s.hidden_q);
        K::mvm(K::weights(l2), &s.hidden_q, l2.zero_points(), &mut s.output_acc);
        K::dequantize(&l2.profile, &s.output_acc, &mut s.output);

        if sat > 0 {
            self.saturated += sat as u64;
            debug!("{}: {} values saturated during quantization", K::NAME, sat);
        }
        argmax(&self.scratch.output)
    }

    /// Dequantized output of the last run.
    pub fn logits(&self) -> &[f32; CLASS_COUNT] { &self.scratch.output }

    /// Total saturated elements since construction.
    pub fn saturated(&self) -> u64 { self.saturated }
}

impl<K: Kernel> Default for Pipeline<K> {
    fn default() -> Self { Self::new() }
}

/// Every precision mode over one shared model, selected per request.
pub struct Engine {
    model: Arc<Model>,
    float: Pipeline<F32Kernel>,
    float_accel: Pipeline<F32AccelKernel>,
    int8: Pipeline<I8Kernel>,
    int16_accel: Pipeline<I16AccelKernel>,
}

impl Engine {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            float: Pipeline::new(),
            float_accel: Pipeline::new(),
            int8: Pipeline::new(),
            int16_accel: Pipeline::new(),
        }
    }

    pub fn model(&self) -> &Arc<Model> { &self.model }

    pub fn infer(&mut self, precision: Precision, input: &[f32; INPUT_LEN]) -> usize {
        let model = &*self.model;
        match precision {
            Precision::Float32 => self.float.run(model, input),
            Precision::Float32Accel => self.float_accel.run(model, input),
            Precision::Int8 => self.int8.run(model, input),
            Precision::Int16Accel => self.int16_accel.run(model, input),
        }
    }

    pub fn logits(&self, precision: Precision) -> &[f32; CLASS_COUNT] {
        match precision {
            Precision::Float32 => self.float.logits(),
            Precision::Float32Accel => self.float_accel.logits(),
            Precision::Int8 => self.int8.logits(),
            Precision::Int16Accel => self.int16_accel.logits(),
        }
    }

    /// Saturated quantization events across all integer pipelines.
    pub fn saturated(&self) -> u64 { self.int8.saturated() + self.int16_accel.saturated() }
}
