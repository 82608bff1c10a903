use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::mlp::quant::{LayerQuantProfile, QuantParams};
use crate::mlp::{Layer, Model, ModelMeta, MODEL_VERSION};

const MAGIC: &[u8; 8] = b"MLPFACE1";

// Format (all little-endian):
// magic: 8 bytes b"MLPFACE1"
// u32 version
// u32 input_len, u32 hidden_len, u32 class_count
// per layer (hidden, then output):
//   i32 input.zero,   f32 input.scale
//   i32 weights.zero, f32 weights.scale
//   i32 output.zero,  f32 output.scale
//   f32 weights[rows*cols]
//   i8  weights[rows*cols]
//   i16 weights[rows*cols]

struct TableReader<R: Read> {
    r: R,
}

impl<R: Read> TableReader<R> {
    fn bytes<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut b = [0u8; N];
        self.r.read_exact(&mut b).with_context(|| format!("read {what}"))?;
        Ok(b)
    }

    fn u32(&mut self, what: &str) -> Result<u32> { Ok(u32::from_le_bytes(self.bytes(what)?)) }
    fn i32(&mut self, what: &str) -> Result<i32> { Ok(i32::from_le_bytes(self.bytes(what)?)) }
    fn f32(&mut self, what: &str) -> Result<f32> { Ok(f32::from_le_bytes(self.bytes(what)?)) }

    fn raw(&mut self, n: usize, what: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.r.read_exact(&mut buf).with_context(|| format!("read {what} ({n} bytes)"))?;
        Ok(buf)
    }

    fn params(&mut self, what: &str) -> Result<QuantParams> {
        let zero = self.i32(&format!("{what} zero"))?;
        let scale = self.f32(&format!("{what} scale"))?;
        Ok(QuantParams { zero, scale })
    }

    fn layer(&mut self, name: &str, rows: usize, cols: usize) -> Result<Layer> {
        let profile = LayerQuantProfile {
            input: self.params(&format!("{name} input"))?,
            weights: self.params(&format!("{name} weights"))?,
            output: self.params(&format!("{name} output"))?,
        };
        let n = rows * cols;
        let weights_f32 = self
            .raw(n * 4, &format!("{name} f32 weights"))?
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let weights_i8 = self.raw(n, &format!("{name} i8 weights"))?.into_iter().map(|b| b as i8).collect();
        let weights_i16 = self
            .raw(n * 2, &format!("{name} i16 weights"))?
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(Layer { rows, cols, profile, weights_f32, weights_i8, weights_i16 })
    }
}

impl Model {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(&path).with_context(|| format!("open model file: {}", path.as_ref().display()))?;
        Self::read_from(BufReader::new(f)).with_context(|| format!("load model: {}", path.as_ref().display()))
    }

    pub fn read_from<R: Read>(r: R) -> Result<Self> {
        let mut r = TableReader { r };
        let magic: [u8; 8] = r.bytes("magic")?;
        if &magic != MAGIC { bail!("bad model magic"); }
        let version = r.u32("version")?;
        if version != MODEL_VERSION { bail!("unsupported model version {version}"); }
        let meta = ModelMeta {
            version,
            input_len: r.u32("input_len")? as usize,
            hidden_len: r.u32("hidden_len")? as usize,
            class_count: r.u32("class_count")? as usize,
        };
        if meta != ModelMeta::fixed() {
            let want = ModelMeta::fixed();
            bail!(
                "model dimensions {}x{}x{} do not match the compiled-in {}x{}x{}",
                meta.input_len, meta.hidden_len, meta.class_count,
                want.input_len, want.hidden_len, want.class_count
            );
        }
        let hidden = r.layer("hidden", meta.hidden_len, meta.input_len)?;
        let output = r.layer("output", meta.class_count, meta.hidden_len)?;
        Model::new(hidden, output)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let f = File::create(&path).with_context(|| format!("create model file: {}", path.as_ref().display()))?;
        let mut w = BufWriter::new(f);
        self.write_to(&mut w)?;
        w.flush().context("flush model file")?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&self.meta.version.to_le_bytes())?;
        for d in [self.meta.input_len, self.meta.hidden_len, self.meta.class_count] {
            w.write_all(&(d as u32).to_le_bytes())?;
        }
        for layer in [&self.hidden, &self.output] {
            let p = &layer.profile;
            for q in [p.input, p.weights, p.output] {
                w.write_all(&q.zero.to_le_bytes())?;
                w.write_all(&q.scale.to_le_bytes())?;
            }
            for v in &layer.weights_f32 { w.write_all(&v.to_le_bytes())?; }
            for v in &layer.weights_i8 { w.write_all(&v.to_le_bytes())?; }
            for v in &layer.weights_i16 { w.write_all(&v.to_le_bytes())?; }
        }
        Ok(())
    }
}
