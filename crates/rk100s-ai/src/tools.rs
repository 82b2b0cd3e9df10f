//! The fixed 7-tool catalog the AI driver offers a backend, and the
//! closed `ToolCall` enum every raw tool-use request is resolved to
//! before dispatch — a `match` on name, not a name-keyed table of
//! boxed closures.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;
use rk100s_analysis::{analyze, compare};
use rk100s_device::DeviceSession;
use rk100s_proto::registry::Registry;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::audio::{read_wav_mono, record_to_wav, AudioError};
use crate::message::{ToolSpec, ToolUseRequest};

#[derive(Debug)]
pub enum ToolCall {
    SetParameter { name: String, value: i32 },
    GetParameter { name: String },
    ListParameters,
    TriggerNote { note: u8, velocity: u8, duration_ms: u64 },
    RecordAudio { duration_ms: u64, out_path: String },
    AnalyzeAudio { path: String },
    CompareAudio { target_path: String, recorded_path: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown tool {0:?}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TryFrom<&ToolUseRequest> for ToolCall {
    type Error = ToolCallError;

    fn try_from(req: &ToolUseRequest) -> Result<Self, Self::Error> {
        fn parse<T: for<'de> Deserialize<'de>>(
            tool: &str,
            args: &serde_json::Value,
        ) -> Result<T, ToolCallError> {
            serde_json::from_value(args.clone()).map_err(|source| ToolCallError::InvalidArguments {
                tool: tool.to_string(),
                source,
            })
        }

        match req.name.as_str() {
            "set_parameter" => {
                #[derive(Deserialize)]
                struct Args {
                    name: String,
                    value: i32,
                }
                let args: Args = parse("set_parameter", &req.arguments)?;
                Ok(ToolCall::SetParameter { name: args.name, value: args.value })
            }
            "get_parameter" => {
                #[derive(Deserialize)]
                struct Args {
                    name: String,
                }
                let args: Args = parse("get_parameter", &req.arguments)?;
                Ok(ToolCall::GetParameter { name: args.name })
            }
            "list_parameters" => Ok(ToolCall::ListParameters),
            "trigger_note" => {
                #[derive(Deserialize)]
                struct Args {
                    note: u8,
                    #[serde(default = "default_velocity")]
                    velocity: u8,
                    #[serde(default = "default_note_duration_ms")]
                    duration_ms: u64,
                }
                let args: Args = parse("trigger_note", &req.arguments)?;
                Ok(ToolCall::TriggerNote {
                    note: args.note,
                    velocity: args.velocity,
                    duration_ms: args.duration_ms,
                })
            }
            "record_audio" => {
                #[derive(Deserialize)]
                struct Args {
                    #[serde(default = "default_record_duration_ms")]
                    duration_ms: u64,
                    #[serde(default = "default_record_path")]
                    out_path: String,
                }
                let args: Args = parse("record_audio", &req.arguments)?;
                Ok(ToolCall::RecordAudio { duration_ms: args.duration_ms, out_path: args.out_path })
            }
            "analyze_audio" => {
                #[derive(Deserialize)]
                struct Args {
                    path: String,
                }
                let args: Args = parse("analyze_audio", &req.arguments)?;
                Ok(ToolCall::AnalyzeAudio { path: args.path })
            }
            "compare_audio" => {
                #[derive(Deserialize)]
                struct Args {
                    target_path: String,
                    recorded_path: String,
                }
                let args: Args = parse("compare_audio", &req.arguments)?;
                Ok(ToolCall::CompareAudio {
                    target_path: args.target_path,
                    recorded_path: args.recorded_path,
                })
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }
}

fn default_velocity() -> u8 {
    100
}

fn default_note_duration_ms() -> u64 {
    500
}

fn default_record_duration_ms() -> u64 {
    2000
}

fn default_record_path() -> String {
    "recorded.wav".to_string()
}

pub fn catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "set_parameter".to_string(),
            description: "Set a named synth parameter to a value, clamped to its documented range.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "value": {"type": "integer"}
                },
                "required": ["name", "value"]
            }),
        },
        ToolSpec {
            name: "get_parameter".to_string(),
            description: "Look up a named synth parameter's metadata (range, description, sonic effect).".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "list_parameters".to_string(),
            description: "List every named synth parameter available to set_parameter/get_parameter.".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSpec {
            name: "trigger_note".to_string(),
            description: "Play a single note for a short duration so the current patch can be heard.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "note": {"type": "integer"},
                    "velocity": {"type": "integer"},
                    "duration_ms": {"type": "integer"}
                },
                "required": ["note"]
            }),
        },
        ToolSpec {
            name: "record_audio".to_string(),
            description: "Record the device's audio output for a duration and save it as a WAV file.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "duration_ms": {"type": "integer"},
                    "out_path": {"type": "string"}
                }
            }),
        },
        ToolSpec {
            name: "analyze_audio".to_string(),
            description: "Extract fundamental frequency, spectral centroid, harmonic ratio, and envelope from a WAV file.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        },
        ToolSpec {
            name: "compare_audio".to_string(),
            description: "Compare two WAV files and report a spectral distance plus per-feature deltas.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "target_path": {"type": "string"},
                    "recorded_path": {"type": "string"}
                },
                "required": ["target_path", "recorded_path"]
            }),
        },
    ]
}

/// Everything a tool dispatch needs to actually touch the device or
/// the filesystem, plus the last value `set_parameter` wrote to each
/// named parameter this session — the device has no "read current
/// value" request, so this is the only source `get_parameter` and
/// `list_parameters` have for anything beyond static catalog metadata.
pub struct ToolContext<'a> {
    pub registry: &'a Registry,
    pub device: &'a DeviceSession,
    pub channel: u8,
    pub sample_rate: u32,
    last_values: Mutex<HashMap<String, i32>>,
}

impl<'a> ToolContext<'a> {
    pub fn new(registry: &'a Registry, device: &'a DeviceSession, channel: u8, sample_rate: u32) -> Self {
        Self {
            registry,
            device,
            channel,
            sample_rate,
            last_values: Mutex::new(HashMap::new()),
        }
    }

    fn last_value(&self, name: &str) -> Option<i32> {
        self.last_values.lock().get(name).copied()
    }

    fn record_value(&self, name: &str, value: i32) {
        self.last_values.lock().insert(name.to_string(), value);
    }
}

/// Run one resolved tool call, returning the text that goes back into
/// conversation history as the tool result. Every failure mode is
/// converted into an error-flagged string here — typed errors never
/// cross into the conversation.
pub async fn dispatch(call: ToolCall, ctx: &ToolContext<'_>) -> (String, bool) {
    match run(call, ctx).await {
        Ok(text) => (text, false),
        Err(text) => (text, true),
    }
}

async fn run(call: ToolCall, ctx: &ToolContext<'_>) -> Result<String, String> {
    match call {
        ToolCall::SetParameter { name, value } => {
            let param = ctx
                .registry
                .get(&name)
                .ok_or_else(|| format!("unknown parameter {name:?}"))?;
            let message = param
                .build_message(ctx.channel, value)
                .map_err(|e| format!("cannot set {name:?} directly: {e}"))?;
            ctx.device
                .send(&message)
                .map_err(|e| format!("failed to send {name:?}: {e}"))?;
            let clamped = param.clamp(value);
            ctx.record_value(&name, clamped);
            info!(name, value = clamped, "set_parameter dispatched");
            Ok(format!("set {name} to {clamped}"))
        }
        ToolCall::GetParameter { name } => {
            ctx.registry
                .get(&name)
                .ok_or_else(|| format!("unknown parameter {name:?}"))?;
            let value = ctx
                .last_value(&name)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Ok(format!("{name}: {value}"))
        }
        ToolCall::ListParameters => {
            let lines: Vec<String> = ctx
                .registry
                .list_all()
                .iter()
                .map(|p| {
                    let value = ctx
                        .last_value(p.id)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    format!("{}: {} (range {}..={}, current={value})", p.id, p.description, p.min, p.max)
                })
                .collect();
            Ok(lines.join("; "))
        }
        ToolCall::TriggerNote { note, velocity, duration_ms } => {
            ctx.device
                .send_note_on(ctx.channel, note, velocity)
                .map_err(|e| format!("note on failed: {e}"))?;
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
            ctx.device
                .send_note_off(ctx.channel, note)
                .map_err(|e| format!("note off failed: {e}"))?;
            Ok(format!("triggered note {note} for {duration_ms}ms"))
        }
        ToolCall::RecordAudio { duration_ms, out_path } => {
            let path = PathBuf::from(out_path);
            let sample_rate = ctx.sample_rate;
            let record_path = path.clone();
            tokio::task::spawn_blocking(move || {
                record_to_wav(&record_path, Duration::from_millis(duration_ms), sample_rate)
            })
            .await
            .map_err(|e| format!("recording task panicked: {e}"))?
            .map_err(|e: AudioError| {
                warn!(error = %e, "record_audio failed");
                format!("recording failed: {e}")
            })?;
            Ok(format!("recorded {duration_ms}ms to {}", path.display()))
        }
        ToolCall::AnalyzeAudio { path } => {
            let samples = read_wav_mono(&path).map_err(|e| format!("failed to read {path}: {e}"))?;
            let report = analyze(&samples, ctx.sample_rate).map_err(|e| e.to_string())?;
            Ok(format!(
                "fundamental={:.1}Hz centroid={:.1}Hz harmonic_ratio={:.3} duration={:.2}s",
                report.fundamental_hz, report.spectral_centroid_hz, report.harmonic_ratio, report.duration_s
            ))
        }
        ToolCall::CompareAudio { target_path, recorded_path } => {
            let target = read_wav_mono(&target_path).map_err(|e| format!("failed to read {target_path}: {e}"))?;
            let recorded = read_wav_mono(&recorded_path).map_err(|e| format!("failed to read {recorded_path}: {e}"))?;
            let report = compare(&target, &recorded, ctx.sample_rate).map_err(|e| e.to_string())?;
            Ok(format!(
                "distance={:.4} Δf0={:.1}Hz Δcentroid={:.1}Hz Δharmonic_ratio={:.3}",
                report.distance,
                report.delta_fundamental_hz,
                report.delta_spectral_centroid_hz,
                report.delta_harmonic_ratio
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolUseRequest;

    fn req(name: &str, args: serde_json::Value) -> ToolUseRequest {
        ToolUseRequest { id: "t1".to_string(), name: name.to_string(), arguments: args }
    }

    #[test]
    fn catalog_has_exactly_seven_tools() {
        assert_eq!(catalog().len(), 7);
    }

    #[test]
    fn parses_set_parameter() {
        let call = ToolCall::try_from(&req("set_parameter", json!({"name": "master_volume", "value": 100})))
            .unwrap();
        assert!(matches!(call, ToolCall::SetParameter { value: 100, .. }));
    }

    #[test]
    fn trigger_note_defaults_velocity_and_duration() {
        let call = ToolCall::try_from(&req("trigger_note", json!({"note": 60}))).unwrap();
        match call {
            ToolCall::TriggerNote { note, velocity, duration_ms } => {
                assert_eq!(note, 60);
                assert_eq!(velocity, 100);
                assert_eq!(duration_ms, 500);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_tool_name_is_rejected() {
        let err = ToolCall::try_from(&req("nonexistent_tool", json!({}))).unwrap_err();
        assert!(matches!(err, ToolCallError::UnknownTool(_)));
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        let err = ToolCall::try_from(&req("set_parameter", json!({"name": "x"}))).unwrap_err();
        assert!(matches!(err, ToolCallError::InvalidArguments { .. }));
    }
}
