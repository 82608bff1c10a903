//! Affine quantization: `real = (q - zero) * scale`, `q = round(real / scale) + zero`.
//!
//! Rounding is half away from zero (`f32::round`), matching the reference used
//! when the weight tables were generated. Narrowing saturates at the target
//! type's range instead of wrapping; every saturated element is counted.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub zero: i32,
    pub scale: f32,
}

impl QuantParams {
    pub const IDENTITY: QuantParams = QuantParams { zero: 0, scale: 1.0 };

    pub fn new(zero: i32, scale: f32) -> Self { Self { zero, scale } }

    /// Scales must be finite and strictly positive for the map to be invertible.
    pub fn is_valid(&self) -> bool { self.scale.is_finite() && self.scale > 0.0 }

    /// Unclamped quantized value, still in the real domain.
    #[inline]
    fn quantize_raw(&self, x: f32) -> f32 { (x / self.scale).round() + self.zero as f32 }

    #[inline]
    pub fn dequantize_one(&self, q: i32) -> f32 { (q - self.zero) as f32 * self.scale }
}

/// Affine maps needed by one layer: input quantization, weight interpretation
/// and output dequantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerQuantProfile {
    pub input: QuantParams,
    pub weights: QuantParams,
    pub output: QuantParams,
}

impl LayerQuantProfile {
    /// Scale of a raw accumulator: one input step times one weight step.
    #[inline]
    pub fn accumulator_scale(&self) -> f32 { self.input.scale * self.weights.scale }

    pub fn is_valid(&self) -> bool {
        self.input.is_valid() && self.weights.is_valid() && self.output.is_valid()
    }
}

/// Fixed-point element types a real tensor can be quantized into.
pub trait QuantTarget: Copy + Default {
    const MIN: i32;
    const MAX: i32;
    fn from_clamped(v: i32) -> Self;
    fn to_i32(self) -> i32;
}

impl QuantTarget for i8 {
    const MIN: i32 = i8::MIN as i32;
    const MAX: i32 = i8::MAX as i32;
    #[inline] fn from_clamped(v: i32) -> Self { v as i8 }
    #[inline] fn to_i32(self) -> i32 { self as i32 }
}

impl QuantTarget for i16 {
    const MIN: i32 = i16::MIN as i32;
    const MAX: i32 = i16::MAX as i32;
    #[inline] fn from_clamped(v: i32) -> Self { v as i16 }
    #[inline] fn to_i32(self) -> i32 { self as i32 }
}

/// Raw matrix-vector accumulator values that can be brought back to reals.
pub trait AccumValue: Copy + Default {
    fn to_f32(self) -> f32;
}

impl AccumValue for f32 { #[inline] fn to_f32(self) -> f32 { self } }
impl AccumValue for i32 { #[inline] fn to_f32(self) -> f32 { self as f32 } }
impl AccumValue for i64 { #[inline] fn to_f32(self) -> f32 { self as f32 } }

/// Quantizes `x` into `out`, returning how many elements saturated.
/// NaN maps to the zero point and counts as saturated.
pub fn quantize<T: QuantTarget>(x: &[f32], params: QuantParams, out: &mut [T]) -> usize {
    debug_assert_eq!(x.len(), out.len());
    let (lo, hi) = (T::MIN as f32, T::MAX as f32);
    let mut saturated = 0usize;
    for (o, &v) in out.iter_mut().zip(x) {
        let q = params.quantize_raw(v);
        let q = if q.is_nan() {
            saturated += 1;
            params.zero.clamp(T::MIN, T::MAX) as f32
        } else if q < lo || q > hi {
            saturated += 1;
            q.clamp(lo, hi)
        } else {
            q
        };
        *o = T::from_clamped(q as i32);
    }
    saturated
}

/// Per-element inverse of [`quantize`] for a single tensor.
pub fn dequantize_values<T: QuantTarget>(q: &[T], params: QuantParams, out: &mut [f32]) {
    debug_assert_eq!(q.len(), out.len());
    for (o, &v) in out.iter_mut().zip(q) { *o = params.dequantize_one(v.to_i32()); }
}

/// Brings a layer's raw accumulators back to reals.
///
/// The order is fixed: multiply by the accumulator scale, subtract the output
/// zero point, multiply by the output scale.
pub fn dequantize<A: AccumValue>(profile: &LayerQuantProfile, acc: &[A], out: &mut [f32]) {
    debug_assert_eq!(acc.len(), out.len());
    let mvm_scale = profile.accumulator_scale();
    let out_zero = profile.output.zero as f32;
    let out_scale = profile.output.scale;
    for (o, &a) in out.iter_mut().zip(acc) {
        let temp = a.to_f32() * mvm_scale;
        *o = (temp - out_zero) * out_scale;
    }
}
