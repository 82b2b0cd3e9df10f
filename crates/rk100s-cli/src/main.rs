mod config;
mod opt;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rk100s_ai::{AnthropicBackend, AnyBackend, OpenAiCompatBackend, ToolContext};
use rk100s_analysis::{analyze, compare};
use rk100s_device::DeviceSession;
use rk100s_patch::Patch;
use rk100s_proto::sysex::Codec;
use rk100s_proto::registry::Registry;

use config::{AiBackend, Config};
use opt::{Operation, Opts};

const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

struct App {
    registry: Arc<Registry>,
    channel: u8,
    codec: Codec,
}

impl App {
    fn new(channel: u8, model_id: Option<u8>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            channel,
            codec: model_id.map(Codec::new).unwrap_or_default(),
        }
    }

    async fn connect(&self, port_index: usize) -> Result<DeviceSession> {
        let ports = DeviceSession::list_ports().context("enumerating MIDI ports")?;
        let port_name = ports
            .get(port_index)
            .cloned()
            .with_context(|| format!("no MIDI port at index {port_index}"))?;
        let session = DeviceSession::new(self.codec, self.channel);
        session
            .connect(port_index, &port_name)
            .with_context(|| format!("connecting to {port_name:?}"))?;
        Ok(session)
    }

    async fn run(&self, operation: Operation) -> Result<()> {
        match operation {
            Operation::ListPorts => {
                for (i, name) in DeviceSession::list_ports()?.into_iter().enumerate() {
                    println!("{i}: {name}");
                }
            }
            Operation::PullSlot { port_index, slot, deadline_ms } => {
                let session = self.connect(port_index).await?;
                let payload = session.pull_slot(slot, deadline_ms).await?;
                let name = rk100s_proto::sysex::extract_name(&payload);
                println!("slot {slot}: {} bytes, name={:?}", payload.len(), name);
            }
            Operation::PullRange { port_index, start, end, deadline_each_ms } => {
                // Bulk pulls run on their own worker task, per the
                // foreground/worker split this tool stands in for.
                let session = self.connect(port_index).await?;
                let results = tokio::spawn(async move { session.pull_range(start, end, deadline_each_ms).await })
                    .await
                    .context("bulk pull worker task panicked")?;
                for (slot, result) in results {
                    match result {
                        Ok(payload) => {
                            let name = rk100s_proto::sysex::extract_name(&payload);
                            println!("slot {slot}: {} bytes, name={:?}", payload.len(), name);
                        }
                        Err(e) => println!("slot {slot}: {e}"),
                    }
                }
            }
            Operation::SetParameter { port_index, name, value } => {
                let param = self
                    .registry
                    .get(&name)
                    .with_context(|| format!("unknown parameter {name:?}"))?;
                let session = self.connect(port_index).await?;
                let message = param
                    .build_message(self.channel, value)
                    .with_context(|| format!("{name:?} has no live MIDI address"))?;
                session.send(&message)?;
                println!("set {name} to {}", param.clamp(value));
            }
            Operation::GetParameter { name } => {
                let param = self
                    .registry
                    .get(&name)
                    .with_context(|| format!("unknown parameter {name:?}"))?;
                println!(
                    "{name}: {} (range {}..={}, {})",
                    param.description, param.min, param.max, param.sonic_effect
                );
            }
            Operation::ListParameters => {
                for param in self.registry.list_all() {
                    println!("{}: {}", param.id, param.description);
                }
            }
            Operation::AnalyzeAudio { path } => {
                let samples = rk100s_ai::audio::read_wav_mono(
                    path.to_str().context("path is not valid UTF-8")?,
                )?;
                let report = analyze(&samples, DEFAULT_AUDIO_SAMPLE_RATE)?;
                println!(
                    "fundamental={:.1}Hz centroid={:.1}Hz harmonic_ratio={:.3} duration={:.2}s",
                    report.fundamental_hz, report.spectral_centroid_hz, report.harmonic_ratio, report.duration_s
                );
            }
            Operation::CompareAudio { target, recorded } => {
                let target_samples = rk100s_ai::audio::read_wav_mono(
                    target.to_str().context("target path is not valid UTF-8")?,
                )?;
                let recorded_samples = rk100s_ai::audio::read_wav_mono(
                    recorded.to_str().context("recorded path is not valid UTF-8")?,
                )?;
                let report = compare(&target_samples, &recorded_samples, DEFAULT_AUDIO_SAMPLE_RATE)?;
                println!(
                    "distance={:.4} Δf0={:.1}Hz Δcentroid={:.1}Hz Δharmonic_ratio={:.3}",
                    report.distance,
                    report.delta_fundamental_hz,
                    report.delta_spectral_centroid_hz,
                    report.delta_harmonic_ratio
                );
            }
            Operation::MatchSound { port_index, target, max_iterations } => {
                // The sound-matching loop is the longest-running operation
                // this tool offers (backend round trips plus audio capture
                // per iteration), so it gets its own worker task rather
                // than running inline in the foreground task.
                let config = Config::load_default().context("loading config")?;
                let backend = build_backend(&config)?;
                let session = self.connect(port_index).await?;
                let registry = self.registry.clone();
                let channel = self.channel;
                let target_path = target.to_str().context("target path is not valid UTF-8")?.to_string();

                let outcome = tokio::spawn(async move {
                    let ctx = ToolContext::new(&registry, &session, channel, DEFAULT_AUDIO_SAMPLE_RATE);
                    let stop_requested = AtomicBool::new(false);
                    rk100s_ai::match_sound(&backend, &ctx, &target_path, max_iterations, &stop_requested).await
                })
                .await
                .context("sound-matching worker task panicked")??;

                println!(
                    "ran {} iterations, final distance {:.4}, converged={}",
                    outcome.iterations_run, outcome.final_distance, outcome.converged
                );
            }
            Operation::SaveSlot { port_index, slot, bank, deadline_ms, category, notes } => {
                let session = self.connect(port_index).await?;
                let buffer = session.pull_slot(slot, deadline_ms).await?;
                let patch = Patch::from_buffer(buffer, slot as u16, category, notes)
                    .context("decoding pulled program as a patch")?;
                let mut patches = load_bank(&bank)?;
                let name = patch.name().map(str::to_string);
                patches.push(patch);
                println!("saved slot {slot} as {name:?} ({} patches now in bank)", patches.len());
                save_bank(&bank, &patches)?;
            }
            Operation::ListBank { bank } => {
                for (i, patch) in load_bank(&bank)?.iter().enumerate() {
                    println!(
                        "{i}: slot {} name={:?} category={:?}",
                        patch.program_slot,
                        patch.name(),
                        patch.category
                    );
                }
            }
        }
        Ok(())
    }
}

/// Bank files are a flat JSON array of [`Patch`]; a missing file is an
/// empty bank rather than an error, so `save_slot` can target a bank
/// that doesn't exist yet.
fn load_bank(path: &std::path::Path) -> Result<Vec<Patch>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading bank file {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing bank file {}", path.display()))
}

fn save_bank(path: &std::path::Path, patches: &[Patch]) -> Result<()> {
    let data = serde_json::to_string_pretty(patches).context("encoding bank file")?;
    std::fs::write(path, data).with_context(|| format!("writing bank file {}", path.display()))
}

fn build_backend(config: &Config) -> Result<AnyBackend> {
    match config.ai_backend {
        AiBackend::Claude => {
            let key = config
                .claude_api_key
                .clone()
                .context("ai_backend is claude but claude_api_key is not set")?;
            Ok(AnyBackend::Anthropic(AnthropicBackend::new(key)))
        }
        AiBackend::Groq => {
            let key = config
                .groq_api_key
                .clone()
                .context("ai_backend is groq but groq_api_key is not set")?;
            Ok(AnyBackend::OpenAiCompat(OpenAiCompatBackend::groq(key, "llama-3.1-70b-versatile")))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let opts = Opts::parse();

    if !(1..=16).contains(&opts.channel) {
        bail!("channel must be 1..=16, got {}", opts.channel);
    }

    let app = App::new(opts.channel, opts.model_id);
    app.run(opts.operation).await
}
