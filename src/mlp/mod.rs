pub mod kernels;
pub mod loader;
pub mod network;
pub mod quant;
pub mod scratch;

use anyhow::{bail, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::mlp::kernels::ZeroPoints;
use crate::mlp::quant::{LayerQuantProfile, QuantParams};

/// Length of the feature vector received from the host.
pub const INPUT_LEN: usize = 165;
/// Width of the hidden layer.
pub const HIDDEN_LEN: usize = 96;
/// Number of subject identities.
pub const CLASS_COUNT: usize = 15;

pub const MODEL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelMeta {
    pub version: u32,
    pub input_len: usize,
    pub hidden_len: usize,
    pub class_count: usize,
}

impl ModelMeta {
    pub const fn fixed() -> Self {
        Self { version: MODEL_VERSION, input_len: INPUT_LEN, hidden_len: HIDDEN_LEN, class_count: CLASS_COUNT }
    }
}

/// One fully connected layer: `rows x cols` weight tables (row-major) in
/// every precision plus the quantization profile shared by the integer paths.
#[derive(Debug, Clone)]
pub struct Layer {
    pub rows: usize,
    pub cols: usize,
    pub profile: LayerQuantProfile,
    pub weights_f32: Vec<f32>,
    pub weights_i8: Vec<i8>,
    pub weights_i16: Vec<i16>,
}

impl Layer {
    pub fn zero_points(&self) -> ZeroPoints {
        ZeroPoints { weights: self.profile.weights.zero, input: self.profile.input.zero }
    }

    fn check(&self, name: &str, rows: usize, cols: usize) -> Result<()> {
        if self.rows != rows || self.cols != cols {
            bail!("{name} layer is {}x{}, expected {rows}x{cols}", self.rows, self.cols);
        }
        let n = rows * cols;
        if self.weights_f32.len() != n || self.weights_i8.len() != n || self.weights_i16.len() != n {
            bail!(
                "{name} layer weight tables have lengths f32={} i8={} i16={}, expected {n}",
                self.weights_f32.len(), self.weights_i8.len(), self.weights_i16.len()
            );
        }
        if !self.profile.is_valid() {
            bail!("{name} layer has a non-positive or non-finite scale: {:?}", self.profile);
        }
        // One profile drives both integer paths, so the narrower int8 range applies.
        let zeros = self.zero_points();
        for (what, z) in [("input", zeros.input), ("weights", zeros.weights)] {
            if !(i8::MIN as i32..=i8::MAX as i32).contains(&z) {
                bail!("{name} layer {what} zero point {z} is outside the int8 range");
            }
        }
        Ok(())
    }
}

/// Read-only weight tables and quantization profiles for the two-layer network.
#[derive(Debug, Clone)]
pub struct Model {
    pub meta: ModelMeta,
    pub hidden: Layer,
    pub output: Layer,
}

impl Model {
    pub fn new(hidden: Layer, output: Layer) -> Result<Self> {
        hidden.check("hidden", HIDDEN_LEN, INPUT_LEN)?;
        output.check("output", CLASS_COUNT, HIDDEN_LEN)?;
        Ok(Self { meta: ModelMeta::fixed(), hidden, output })
    }

    /// Deterministic stand-in for trained tables, for demos, tests and benches.
    ///
    /// Inputs are expected in `[-1, 1]`. Hidden activations after ReLU are
    /// quantized asymmetrically over `[0, 4]`. Both layers dequantize to reals.
    pub fn synthetic(seed: u64) -> Result<Self> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let hidden = synthetic_layer(&mut rng, HIDDEN_LEN, INPUT_LEN, QuantParams::new(0, 1.0 / 127.0))?;
        let output = synthetic_layer(&mut rng, CLASS_COUNT, HIDDEN_LEN, QuantParams::new(-128, 4.0 / 255.0))?;
        Self::new(hidden, output)
    }
}

fn synthetic_layer(rng: &mut SmallRng, rows: usize, cols: usize, input: QuantParams) -> Result<Layer> {
    let normal = Normal::new(0.0f32, 1.0 / (cols as f32).sqrt())?;
    let raw: Vec<f32> = (0..rows * cols).map(|_| normal.sample(rng)).collect();
    let max_abs = raw.iter().fold(0.0f32, |m, w| m.max(w.abs()));
    // Small non-zero weight zero point so the correction path is always live.
    let w_zero = rng.gen_range(-3..=3);
    let weights = QuantParams::new(w_zero, max_abs.max(1e-6) / (127.0 - w_zero.abs() as f32));
    let mut weights_i8 = vec![0i8; rows * cols];
    quant::quantize(&raw, weights, &mut weights_i8);
    // Float tables are the dequantized int8 tables: every precision shares one set of weights.
    let mut weights_f32 = vec![0f32; rows * cols];
    quant::dequantize_values(&weights_i8, weights, &mut weights_f32);
    let weights_i16 = weights_i8.iter().map(|&w| w as i16).collect();
    Ok(Layer {
        rows,
        cols,
        profile: LayerQuantProfile { input, weights, output: QuantParams::IDENTITY },
        weights_f32,
        weights_i8,
        weights_i16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_is_deterministic() {
        let a = Model::synthetic(7).unwrap();
        let b = Model::synthetic(7).unwrap();
        assert_eq!(a.hidden.weights_i8, b.hidden.weights_i8);
        assert_eq!(a.output.weights_f32, b.output.weights_f32);
        assert_eq!(a.meta, ModelMeta::fixed());
    }

    #[test]
    fn zero_points_must_fit_int8() {
        let m = Model::synthetic(1).unwrap();
        let mut hidden = m.hidden.clone();
        hidden.profile.input.zero = i8::MIN as i32;
        assert!(Model::new(hidden.clone(), m.output.clone()).is_ok());
        hidden.profile.input.zero = i8::MAX as i32 + 1;
        let err = Model::new(hidden, m.output).unwrap_err();
        assert!(err.to_string().contains("input zero point"), "{}", err);
    }

    #[test]
    fn float_tables_sit_on_the_int8_grid() {
        let m = Model::synthetic(5).unwrap();
        let w = m.output.profile.weights;
        for (&f, &q) in m.output.weights_f32.iter().zip(&m.output.weights_i8) {
            assert_eq!(f, w.dequantize_one(q as i32));
        }
    }

    #[test]
    fn rejects_wrong_table_length() {
        let m = Model::synthetic(1).unwrap();
        let mut hidden = m.hidden.clone();
        hidden.weights_i16.pop();
        assert!(Model::new(hidden, m.output).is_err());
    }
}
