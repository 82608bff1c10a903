use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use mlpface::clock::{CycleCounter, InstantCounter};
use mlpface::dataset::{self, Sample};
use mlpface::protocol::{self, Response, MSG_ERROR, MSG_READY, MSG_WAITING, RESPONSE_BYTES};
use mlpface::session::{Session, SessionConfig, ShortReadPolicy};
use mlpface::{Engine, Model, Precision};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mlpface", version, about = "Quantized MLP face classifier over a serial-style link")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serve the device protocol on a TCP port (one host at a time)
    Serve(ServeArgs),
    /// Write a synthetic model file and optionally a labelled dataset
    CreateModel(CreateArgs),
    /// Accuracy per precision and agreement with float over a JSONL dataset
    Eval(EvalArgs),
    /// Act as the host: send samples to a serving device and print responses
    Host(HostArgs),
}

#[derive(Args, Debug)]
struct ModelSource {
    /// Model file (MLPFACE1)
    #[arg(long, conflicts_with = "synthetic")]
    model: Option<PathBuf>,

    /// Use a synthetic model generated from this seed
    #[arg(long)]
    synthetic: Option<u64>,
}

impl ModelSource {
    fn load(&self) -> Result<Model> {
        match (&self.model, self.synthetic) {
            (Some(p), _) => Model::load(p),
            (None, Some(seed)) => Model::synthetic(seed),
            (None, None) => bail!("pass --model <file> or --synthetic <seed>"),
        }
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7878")]
    listen: String,

    #[command(flatten)]
    source: ModelSource,

    /// Nominal core frequency used to convert time to cycles
    #[arg(long, default_value_t = InstantCounter::DEFAULT_HZ)]
    clock_hz: u64,

    /// Sample the x86_64 time-stamp counter instead of the wall clock
    #[arg(long, default_value_t = false)]
    tsc: bool,

    /// Run inference even when the input block arrives short
    #[arg(long, default_value_t = false)]
    legacy_short_read: bool,

    /// Opcode poll interval in milliseconds
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,

    /// Input block timeout in seconds
    #[arg(long, default_value_t = 100)]
    input_timeout_s: u64,
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Output model path
    #[arg(long)]
    out: PathBuf,

    /// Generator seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Also write a labelled JSONL dataset here
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Samples in the dataset
    #[arg(long, default_value_t = 1000)]
    samples: usize,
}

#[derive(Args, Debug)]
struct EvalArgs {
    /// JSONL dataset ({"label":..,"features":[..]})
    #[arg(long)]
    data: PathBuf,

    #[command(flatten)]
    source: ModelSource,

    /// Skip samples whose top two float logits are closer than this
    #[arg(long, default_value_t = 0.0)]
    min_margin: f32,

    /// Print the reports as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct HostArgs {
    /// Device address
    #[arg(long, default_value = "127.0.0.1:7878")]
    connect: String,

    /// JSONL dataset to send
    #[arg(long)]
    data: PathBuf,

    #[arg(long, value_enum, default_value_t = Precision::Int8)]
    precision: Precision,

    /// Send at most this many samples
    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Serve(a) => serve(a),
        Cmd::CreateModel(a) => create_model(a),
        Cmd::Eval(a) => eval(a),
        Cmd::Host(a) => host(a),
    }
}

#[cfg(target_arch = "x86_64")]
fn tsc_counter() -> Option<Box<dyn CycleCounter>> {
    Some(Box::new(mlpface::clock::TscCounter))
}

#[cfg(not(target_arch = "x86_64"))]
fn tsc_counter() -> Option<Box<dyn CycleCounter>> {
    warn!("--tsc is only available on x86_64; using the wall clock");
    None
}

fn counter(args: &ServeArgs) -> Box<dyn CycleCounter> {
    if args.tsc {
        if let Some(c) = tsc_counter() { return c; }
    }
    Box::new(InstantCounter::new(args.clock_hz))
}

fn serve(args: ServeArgs) -> Result<()> {
    let model = Arc::new(args.source.load()?);
    let config = SessionConfig {
        command_poll: Duration::from_millis(args.poll_ms.max(1)),
        input_timeout: Duration::from_secs(args.input_timeout_s),
        short_read: if args.legacy_short_read { ShortReadPolicy::InferAnyway } else { ShortReadPolicy::Abort },
    };
    let listener = TcpListener::bind(&args.listen).with_context(|| format!("bind {}", args.listen))?;
    info!("listening on {} ({:?})", listener.local_addr()?, config);
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => { warn!("accept failed: {}", e); continue; }
        };
        let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".into());
        info!("host connected: {}", peer);
        let engine = Engine::new(Arc::clone(&model));
        let mut session = Session::new(stream, counter(&args), engine, config.clone());
        if let Err(e) = session.run() {
            error!("session with {} failed: {}", peer, e);
        }
        if session.engine().saturated() > 0 {
            info!("{} quantized values saturated during this session", session.engine().saturated());
        }
    }
    Ok(())
}

fn create_model(args: CreateArgs) -> Result<()> {
    let model = Model::synthetic(args.seed)?;
    model.save(&args.out)?;
    println!("wrote model to {}", args.out.display());
    if let Some(path) = &args.dataset {
        let samples = dataset::synthetic_samples(&model, args.samples, args.seed ^ 0x5eed);
        dataset::save_jsonl(path, &samples)?;
        println!("wrote {} samples to {}", samples.len(), path.display());
    }
    Ok(())
}

fn progress(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg:>14} [{bar:40}] {pos}/{len}") {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(label.to_string());
    pb
}

fn eval(args: EvalArgs) -> Result<()> {
    let model = Arc::new(args.source.load()?);
    let samples = dataset::load_jsonl(&args.data)?;
    let mut reports = Vec::new();
    for p in Precision::ALL {
        let pb = progress(samples.len(), &p.to_string());
        let r = dataset::evaluate(&model, &samples, p, || pb.inc(1));
        pb.finish_and_clear();
        reports.push(r);
    }
    let mut agreements = Vec::new();
    for p in Precision::ALL.into_iter().skip(1) {
        let pb = progress(samples.len(), &format!("agree {}", p));
        let r = dataset::agreement(&model, &samples, Precision::Float32, p, args.min_margin, || pb.inc(1));
        pb.finish_and_clear();
        agreements.push(r);
    }
    if args.json {
        let out = serde_json::json!({ "accuracy": reports, "agreement": agreements });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for r in &reports {
            println!("{:>14}: {}/{} correct ({:.2}%), {} malformed", r.precision, r.correct, r.total, r.accuracy * 100.0, r.malformed);
        }
        for r in &agreements {
            println!("{:>14} vs {}: {}/{} agree ({:.2}%), {} near boundary", r.a, r.b, r.agreed, r.total, r.rate * 100.0, r.skipped);
        }
    }
    Ok(())
}

/// Reads device text until `line` has been seen.
fn expect_line(stream: &mut TcpStream, line: &[u8]) -> Result<()> {
    let mut seen = Vec::new();
    let mut b = [0u8; 1];
    while !seen.ends_with(line) {
        stream.read_exact(&mut b).context("read from device")?;
        seen.push(b[0]);
    }
    if seen.len() > line.len() {
        warn!("device sent unexpected text: {:?}", String::from_utf8_lossy(&seen[..seen.len() - line.len()]));
    }
    Ok(())
}

fn host(args: HostArgs) -> Result<()> {
    let samples: Vec<Sample> = dataset::load_jsonl(&args.data)?;
    let limit = args.limit.unwrap_or(samples.len());
    let mut stream = TcpStream::connect(&args.connect).with_context(|| format!("connect {}", args.connect))?;
    expect_line(&mut stream, MSG_READY)?;
    let mut correct = 0usize;
    let mut sent = 0usize;
    for s in samples.iter().take(limit) {
        expect_line(&mut stream, MSG_WAITING)?;
        stream.write_all(&[args.precision.opcode()])?;
        stream.write_all(&protocol::encode_input(&s.features))?;
        let mut buf = [0u8; RESPONSE_BYTES];
        stream.read_exact(&mut buf).context("read response")?;
        if buf[..MSG_ERROR.len()] == *MSG_ERROR {
            bail!("device reported a short input read");
        }
        let r = Response::decode(&buf);
        println!("label {:>2} -> class {:>2} in {} cycles", s.label, r.class, r.cycles);
        correct += (r.class as usize == s.label) as usize;
        sent += 1;
    }
    println!("{}/{} correct with {}", correct, sent, args.precision);
    Ok(())
}
