use mlpface::mlp::{CLASS_COUNT, INPUT_LEN};
use mlpface::{Engine, Model, Precision};
use std::sync::Arc;
use std::fs::create_dir_all;

#[test]
fn model_file_round_trips() {
    create_dir_all("target").unwrap();
    let path = "target/mlpface_roundtrip.bin";
    let model = Model::synthetic(3).unwrap();
    model.save(path).unwrap();
    let loaded = Model::load(path).unwrap();
    assert_eq!(loaded.meta, model.meta);
    assert_eq!(loaded.hidden.profile, model.hidden.profile);
    assert_eq!(loaded.output.profile, model.output.profile);
    assert_eq!(loaded.hidden.weights_f32, model.hidden.weights_f32);
    assert_eq!(loaded.hidden.weights_i8, model.hidden.weights_i8);
    assert_eq!(loaded.output.weights_i16, model.output.weights_i16);
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = Vec::new();
    Model::synthetic(1).unwrap().write_to(&mut bytes).unwrap();
    bytes[0] = b'X';
    let err = Model::read_from(&bytes[..]).unwrap_err();
    assert!(err.to_string().contains("magic"), "{}", err);
}

#[test]
fn rejects_foreign_dimensions() {
    let mut bytes = Vec::new();
    Model::synthetic(1).unwrap().write_to(&mut bytes).unwrap();
    // input_len lives right after magic and version
    bytes[12..16].copy_from_slice(&132u32.to_le_bytes());
    let err = Model::read_from(&bytes[..]).unwrap_err();
    assert!(err.to_string().contains("compiled-in"), "{}", err);
}

#[test]
fn rejects_truncated_tables() {
    let mut bytes = Vec::new();
    Model::synthetic(1).unwrap().write_to(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 1);
    assert!(Model::read_from(&bytes[..]).is_err());
}

#[test]
fn rejects_zero_scale() {
    let mut model = Model::synthetic(1).unwrap();
    model.output.profile.weights.scale = 0.0;
    let mut bytes = Vec::new();
    model.write_to(&mut bytes).unwrap();
    assert!(Model::read_from(&bytes[..]).is_err());
}

fn reload(model: &Model) -> anyhow::Result<Model> {
    let mut bytes = Vec::new();
    model.write_to(&mut bytes).unwrap();
    Model::read_from(&bytes[..])
}

#[test]
fn rejects_non_finite_scales() {
    for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, -0.5] {
        let mut model = Model::synthetic(1).unwrap();
        model.hidden.profile.input.scale = bad;
        let err = reload(&model).unwrap_err();
        assert!(format!("{:#}", err).contains("scale"), "scale {}: {:#}", bad, err);
    }
}

#[test]
fn rejects_out_of_range_zero_point() {
    let mut model = Model::synthetic(1).unwrap();
    model.hidden.profile.weights.zero = 10_000_000;
    let err = reload(&model).unwrap_err();
    assert!(format!("{:#}", err).contains("zero point"), "{:#}", err);

    let mut model = Model::synthetic(1).unwrap();
    model.output.profile.input.zero = i8::MIN as i32 - 1;
    assert!(reload(&model).is_err());
}

#[test]
fn int8_zero_point_limits_still_infer() {
    let mut model = Model::synthetic(1).unwrap();
    model.hidden.profile.weights.zero = i8::MAX as i32;
    model.hidden.profile.input.zero = i8::MIN as i32;
    let loaded = Arc::new(reload(&model).unwrap());
    let mut engine = Engine::new(loaded);
    for p in Precision::ALL {
        assert!(engine.infer(p, &[0.5; INPUT_LEN]) < CLASS_COUNT);
    }
}
