use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::warn;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mlp::network::{Engine, Pipeline, Precision};
use crate::mlp::kernels::F32Kernel;
use crate::mlp::{Model, CLASS_COUNT, INPUT_LEN};

/// One labelled feature vector, stored as a JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub label: usize,
    pub features: Vec<f32>,
}

impl Sample {
    pub fn features(&self) -> Option<&[f32; INPUT_LEN]> { self.features.as_slice().try_into().ok() }
}

pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<Sample>> {
    let f = File::open(&path).with_context(|| format!("open dataset: {}", path.as_ref().display()))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line.with_context(|| format!("read dataset line {}", i + 1))?;
        let line = line.trim();
        if line.is_empty() { continue; }
        let s: Sample = serde_json::from_str(line).with_context(|| format!("parse dataset line {}", i + 1))?;
        if s.features.len() != INPUT_LEN {
            bail!("dataset line {} has {} features, expected {}", i + 1, s.features.len(), INPUT_LEN);
        }
        if s.label >= CLASS_COUNT {
            bail!("dataset line {} has label {}, expected < {}", i + 1, s.label, CLASS_COUNT);
        }
        out.push(s);
    }
    Ok(out)
}

pub fn save_jsonl<P: AsRef<Path>>(path: P, samples: &[Sample]) -> Result<()> {
    let f = File::create(&path).with_context(|| format!("create dataset: {}", path.as_ref().display()))?;
    let mut w = BufWriter::new(f);
    for s in samples {
        writeln!(w, "{}", serde_json::to_string(s)?)?;
    }
    w.flush()?;
    Ok(())
}

/// Uniform inputs in `[-1, 1]` labelled by the float pipeline.
pub fn synthetic_samples(model: &Model, count: usize, seed: u64) -> Vec<Sample> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut float = Pipeline::<F32Kernel>::new();
    let mut x = [0f32; INPUT_LEN];
    (0..count)
        .map(|_| {
            for v in x.iter_mut() { *v = rng.gen_range(-1.0f32..=1.0); }
            let label = float.run(model, &x);
            Sample { label, features: x.to_vec() }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalReport {
    pub precision: Precision,
    /// Samples classified.
    pub total: usize,
    /// Samples without exactly `INPUT_LEN` features; not classified.
    pub malformed: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgreementReport {
    pub a: Precision,
    pub b: Precision,
    /// Samples compared (margin at least `min_margin`).
    pub total: usize,
    /// Samples closer than `min_margin` to a decision boundary.
    pub skipped: usize,
    /// Samples without exactly `INPUT_LEN` features; not compared.
    pub malformed: usize,
    pub agreed: usize,
    pub rate: f64,
}

fn ratio(n: usize, d: usize) -> f64 { if d == 0 { 0.0 } else { n as f64 / d as f64 } }

/// Top-1 accuracy of one precision mode. `tick` runs once per sample.
pub fn evaluate<F: Fn() + Sync>(model: &Arc<Model>, samples: &[Sample], precision: Precision, tick: F) -> EvalReport {
    let (total, correct) = samples
        .par_iter()
        .map_init(
            || Engine::new(Arc::clone(model)),
            |engine, s| {
                tick();
                let Some(x) = s.features() else { return (0usize, 0usize) };
                (1, (engine.infer(precision, x) == s.label) as usize)
            },
        )
        .reduce(|| (0, 0), |l, r| (l.0 + r.0, l.1 + r.1));
    let malformed = samples.len() - total;
    if malformed > 0 { warn!("{} samples with the wrong feature count skipped", malformed); }
    EvalReport { precision, total, malformed, correct, accuracy: ratio(correct, total) }
}

/// Gap between the two largest float logits.
fn float_margin(engine: &Engine) -> f32 {
    let mut top = [f32::NEG_INFINITY; 2];
    for &v in engine.logits(Precision::Float32) {
        if v > top[0] { top = [v, top[0]]; } else if v > top[1] { top[1] = v; }
    }
    top[0] - top[1]
}

/// How often two precision modes pick the same class, over samples whose
/// float logits are at least `min_margin` apart at the top.
pub fn agreement<F: Fn() + Sync>(
    model: &Arc<Model>,
    samples: &[Sample],
    a: Precision,
    b: Precision,
    min_margin: f32,
    tick: F,
) -> AgreementReport {
    let (wellformed, total, agreed) = samples
        .par_iter()
        .map_init(
            || Engine::new(Arc::clone(model)),
            |engine, s| {
                tick();
                let Some(x) = s.features() else { return (0usize, 0usize, 0usize) };
                engine.infer(Precision::Float32, x);
                if float_margin(engine) < min_margin { return (1, 0, 0); }
                let same = engine.infer(a, x) == engine.infer(b, x);
                (1, 1, same as usize)
            },
        )
        .reduce(|| (0, 0, 0), |l, r| (l.0 + r.0, l.1 + r.1, l.2 + r.2));
    let malformed = samples.len() - wellformed;
    if malformed > 0 { warn!("{} samples with the wrong feature count skipped", malformed); }
    AgreementReport { a, b, total, skipped: wellformed - total, malformed, agreed, rate: ratio(agreed, total) }
}
