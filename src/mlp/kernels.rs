//! Dot-product and matrix-vector kernels for each numeric precision, plus the
//! precision-independent activation and selection ops.
use crate::mlp::quant::{self, AccumValue, LayerQuantProfile, QuantParams};
use crate::mlp::Layer;

/// Right shift baked into the fixed-point int16 dot-product primitive. The
/// primitive shifts its accumulator by `SHIFT - 15`, so 15 keeps the integer
/// scale of the weight/input tables.
pub const ACCEL_SHIFT: u32 = 15;

const _: () = assert!(ACCEL_SHIFT >= 15 && ACCEL_SHIFT < 15 + 48);

/// Zero points subtracted from weights and inputs before multiplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZeroPoints {
    pub weights: i32,
    pub input: i32,
}

#[inline]
pub fn dot_f32(x: &[f32], y: &[f32]) -> f32 {
    let mut acc = 0.0f32;
    for (a, b) in x.iter().zip(y) { acc += a * b; }
    acc
}

/// Four-lane variant of [`dot_f32`]. Same result up to float reassociation.
#[inline]
pub fn dot_f32_lanes(x: &[f32], y: &[f32]) -> f32 {
    let mut lanes = [0.0f32; 4];
    let xs = x.chunks_exact(4);
    let ys = y.chunks_exact(4);
    let (xt, yt) = (xs.remainder(), ys.remainder());
    for (a, b) in xs.zip(ys) {
        lanes[0] += a[0] * b[0];
        lanes[1] += a[1] * b[1];
        lanes[2] += a[2] * b[2];
        lanes[3] += a[3] * b[3];
    }
    let mut acc = (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]);
    for (a, b) in xt.iter().zip(yt) { acc += a * b; }
    acc
}

/// Zero-corrected int8 dot product. Each product fits in 17 bits, so an i32
/// accumulator holds any row shorter than 2^14 terms.
#[inline]
pub fn dot_i8(w_row: &[i8], x: &[i8], zeros: ZeroPoints) -> i32 {
    let mut acc: i32 = 0;
    for (&w, &v) in w_row.iter().zip(x) {
        acc += (w as i32 - zeros.weights) * (v as i32 - zeros.input);
    }
    acc
}

/// Zero-corrected int16 dot product accumulated in i64.
#[inline]
pub fn dot_i16(w_row: &[i16], x: &[i16], zeros: ZeroPoints) -> i64 {
    let mut acc: i64 = 0;
    for (&w, &v) in w_row.iter().zip(x) {
        acc += (w as i64 - zeros.weights as i64) * (v as i64 - zeros.input as i64);
    }
    acc
}

/// Emulates the fixed-point int16 dot-product primitive: the accumulator is
/// seeded with the rounding bias `0x7fff >> SHIFT` and the sum is shifted by
/// `SHIFT - 15` on the way out.
#[inline]
pub fn dot_i16_fixed<const SHIFT: u32>(w_row: &[i16], x: &[i16], zeros: ZeroPoints) -> i64 {
    let mut acc: i64 = 0x7fff_i64 >> SHIFT;
    for (&w, &v) in w_row.iter().zip(x) {
        acc += (w as i64 - zeros.weights as i64) * (v as i64 - zeros.input as i64);
    }
    let final_shift = SHIFT as i32 - 15;
    if final_shift > 0 { acc >> final_shift } else { acc << (-final_shift) }
}

#[inline]
pub fn relu_in_place(x: &mut [f32]) {
    for v in x.iter_mut() { *v = if *v > 0.0 { *v } else { 0.0 }; }
}

/// Index of the maximum; the first occurrence wins ties. Empty input yields 0.
pub fn argmax(x: &[f32]) -> usize {
    let mut best = 0usize;
    for i in 1..x.len() {
        if x[i] > x[best] { best = i; }
    }
    best
}

/// Capability set one precision family contributes to the pipeline.
pub trait Kernel {
    /// Element type of quantized activations and weight tables.
    type Elem: Copy + Default + Send + Sync + 'static;
    /// Accumulator type of one dot product.
    type Acc: AccumValue + Send;

    const NAME: &'static str;

    fn weights(layer: &Layer) -> &[Self::Elem];

    /// Returns the number of saturated elements.
    fn quantize(x: &[f32], params: QuantParams, out: &mut [Self::Elem]) -> usize;

    fn dot(w_row: &[Self::Elem], x: &[Self::Elem], zeros: ZeroPoints) -> Self::Acc;

    fn dequantize(profile: &LayerQuantProfile, acc: &[Self::Acc], out: &mut [f32]) {
        quant::dequantize(profile, acc, out);
    }

    /// Row-major `out = M v`, one dot product per output row.
    fn mvm(m: &[Self::Elem], v: &[Self::Elem], zeros: ZeroPoints, out: &mut [Self::Acc]) {
        let ncols = v.len();
        debug_assert_eq!(m.len(), ncols * out.len());
        for (row, o) in m.chunks_exact(ncols).zip(out.iter_mut()) {
            *o = Self::dot(row, v, zeros);
        }
    }
}

/// Float reference. Quantization and dequantization are plain copies.
pub struct F32Kernel;
/// Float with the lane-split dot product.
pub struct F32AccelKernel;
/// Int8 activations and weights, i32 accumulators.
pub struct I8Kernel;
/// Int16 reference kernel.
pub struct I16Kernel;
/// Int16 through the fixed-point primitive with [`ACCEL_SHIFT`].
pub struct I16AccelKernel;

fn copy_f32(x: &[f32], out: &mut [f32]) -> usize {
    out.copy_from_slice(x);
    0
}

impl Kernel for F32Kernel {
    type Elem = f32;
    type Acc = f32;
    const NAME: &'static str = "f32";

    fn weights(layer: &Layer) -> &[f32] { &layer.weights_f32 }
    fn quantize(x: &[f32], _params: QuantParams, out: &mut [f32]) -> usize { copy_f32(x, out) }
    #[inline]
    fn dot(w_row: &[f32], x: &[f32], _zeros: ZeroPoints) -> f32 { dot_f32(w_row, x) }
    fn dequantize(_profile: &LayerQuantProfile, acc: &[f32], out: &mut [f32]) { copy_f32(acc, out); }
}

impl Kernel for F32AccelKernel {
    type Elem = f32;
    type Acc = f32;
    const NAME: &'static str = "f32-accel";

    fn weights(layer: &Layer) -> &[f32] { &layer.weights_f32 }
    fn quantize(x: &[f32], _params: QuantParams, out: &mut [f32]) -> usize { copy_f32(x, out) }
    #[inline]
    fn dot(w_row: &[f32], x: &[f32], _zeros: ZeroPoints) -> f32 { dot_f32_lanes(w_row, x) }
    fn dequantize(_profile: &LayerQuantProfile, acc: &[f32], out: &mut [f32]) { copy_f32(acc, out); }
}

impl Kernel for I8Kernel {
    type Elem = i8;
    type Acc = i32;
    const NAME: &'static str = "i8";

    fn weights(layer: &Layer) -> &[i8] { &layer.weights_i8 }
    fn quantize(x: &[f32], params: QuantParams, out: &mut [i8]) -> usize { quant::quantize(x, params, out) }
    #[inline]
    fn dot(w_row: &[i8], x: &[i8], zeros: ZeroPoints) -> i32 { dot_i8(w_row, x, zeros) }
}

impl Kernel for I16Kernel {
    type Elem = i16;
    type Acc = i64;
    const NAME: &'static str = "i16";

    fn weights(layer: &Layer) -> &[i16] { &layer.weights_i16 }
    fn quantize(x: &[f32], params: QuantParams, out: &mut [i16]) -> usize { quant::quantize(x, params, out) }
    #[inline]
    fn dot(w_row: &[i16], x: &[i16], zeros: ZeroPoints) -> i64 { dot_i16(w_row, x, zeros) }
}

impl Kernel for I16AccelKernel {
    type Elem = i16;
    type Acc = i64;
    const NAME: &'static str = "i16-accel";

    fn weights(layer: &Layer) -> &[i16] { &layer.weights_i16 }
    fn quantize(x: &[f32], params: QuantParams, out: &mut [i16]) -> usize { quant::quantize(x, params, out) }
    #[inline]
    fn dot(w_row: &[i16], x: &[i16], zeros: ZeroPoints) -> i64 { dot_i16_fixed::<ACCEL_SHIFT>(w_row, x, zeros) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanes_handle_tail() {
        let x = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let y = [1.0f32; 7];
        assert_eq!(dot_f32_lanes(&x, &y), 28.0);
        assert_eq!(dot_f32(&x, &y), 28.0);
    }

    #[test]
    fn fixed_shift_left_when_below_fifteen() {
        let zeros = ZeroPoints::default();
        // SHIFT 14: bias 0x7fff >> 14 = 1, result shifted left by one.
        assert_eq!(dot_i16_fixed::<14>(&[3, 4], &[5, 6], zeros), (1 + 39) << 1);
        assert_eq!(dot_i16_fixed::<16>(&[3, 4], &[5, 6], zeros), 39 >> 1);
    }

    #[test]
    fn relu_zeroes_negatives_and_nan() {
        let mut x = [-1.0f32, 0.0, 2.5, -0.0, f32::NAN];
        relu_in_place(&mut x);
        assert_eq!(x, [0.0, 0.0, 2.5, 0.0, 0.0]);
    }
}
