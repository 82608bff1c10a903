use mlpface::mlp::kernels::{
    argmax, dot_f32, dot_f32_lanes, dot_i16, dot_i16_fixed, dot_i8, relu_in_place, F32AccelKernel, F32Kernel, I8Kernel, Kernel,
    ZeroPoints, ACCEL_SHIFT,
};

#[test]
fn argmax_prefers_first_of_equal_maxima() {
    assert_eq!(argmax(&[0.1, 3.0, -1.0, 3.0, 2.0]), 1);
    assert_eq!(argmax(&[5.0, 5.0]), 0);
    assert_eq!(argmax(&[-2.0, -1.0, -1.0]), 1);
    assert_eq!(argmax(&[]), 0);
}

#[test]
fn relu_clamps_negatives() {
    let mut x = [-3.0f32, -0.5, 0.0, 0.5, 3.0];
    relu_in_place(&mut x);
    assert_eq!(x, [0.0, 0.0, 0.0, 0.5, 3.0]);
}

#[test]
fn int8_accumulator_does_not_overflow() {
    // 4096 * 127 * 127 is far beyond what 8 or 16 bits can hold.
    let n = 4096;
    let w = vec![127i8; n];
    let x = vec![127i8; n];
    assert_eq!(dot_i8(&w, &x, ZeroPoints::default()), 4096 * 127 * 127);

    // Zero-point correction widens each factor to 255.
    let w = vec![-128i8; 1000];
    let x = vec![127i8; 1000];
    let zeros = ZeroPoints { weights: 127, input: -128 };
    assert_eq!(dot_i8(&w, &x, zeros), 1000 * -255 * 255);
}

#[test]
fn int16_accumulator_exceeds_i32() {
    let w = vec![i16::MAX; 165];
    let x = vec![i16::MAX; 165];
    let expected = 165i64 * (i16::MAX as i64) * (i16::MAX as i64);
    assert!(expected > i32::MAX as i64);
    assert_eq!(dot_i16(&w, &x, ZeroPoints::default()), expected);
    assert_eq!(dot_i16_fixed::<ACCEL_SHIFT>(&w, &x, ZeroPoints::default()), expected);
}

#[test]
fn int16_fixed_point_matches_reference() {
    let w: Vec<i16> = (0..96).map(|i| (i * 37 % 255 - 127) as i16).collect();
    let x: Vec<i16> = (0..96).map(|i| (i * 91 % 255 - 128) as i16).collect();
    let zeros = ZeroPoints { weights: 2, input: -128 };
    assert_eq!(dot_i16(&w, &x, zeros), dot_i16_fixed::<ACCEL_SHIFT>(&w, &x, zeros));
}

#[test]
fn float_lanes_within_tolerance() {
    let x: Vec<f32> = (0..165).map(|i| ((i * 13 % 29) as f32 - 14.0) * 0.071).collect();
    let y: Vec<f32> = (0..165).map(|i| ((i * 7 % 31) as f32 - 15.0) * 0.013).collect();
    let a = dot_f32(&x, &y);
    let b = dot_f32_lanes(&x, &y);
    assert!((a - b).abs() <= 1e-4 * (1.0 + a.abs()), "reference={} lanes={}", a, b);
}

#[test]
fn mvm_applies_one_dot_per_row() {
    let m = [1i8, 2, 3, 4, 5, 6];
    let v = [1i8, 1, 1];
    let mut out = [0i32; 2];
    I8Kernel::mvm(&m, &v, ZeroPoints::default(), &mut out);
    assert_eq!(out, [6, 15]);

    // The quantized input is read, never rewritten.
    let v = [3i8, 3, 3];
    I8Kernel::mvm(&m, &v, ZeroPoints { weights: 0, input: 2 }, &mut out);
    assert_eq!(out, [6, 15]);
    assert_eq!(v, [3, 3, 3]);

    let mf = [0.5f32, -1.0, 2.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
    let vf = [2.0f32, 1.0, 0.5, 1.0, 1.0];
    let mut a = [0f32; 2];
    let mut b = [0f32; 2];
    F32Kernel::mvm(&mf, &vf, ZeroPoints::default(), &mut a);
    F32AccelKernel::mvm(&mf, &vf, ZeroPoints::default(), &mut b);
    assert_eq!(a, [3.0, 5.5]);
    assert_eq!(a, b);
}
