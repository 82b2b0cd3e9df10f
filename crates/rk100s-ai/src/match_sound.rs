//! Sound-matching orchestrator: repeatedly let the assistant adjust
//! parameters, then record and compare against a target WAV, feeding
//! the measured distance back in as the next turn's context until the
//! sound converges or the iteration budget runs out.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rk100s_analysis::{analyze, compare};
use tracing::info;

use crate::audio::{read_wav_mono, record_to_wav};
use crate::backend::{BackendError, ChatBackend};
use crate::driver::run_single_turn;
use crate::message::Message;
use crate::tools::{catalog, ToolContext};

const DEFAULT_MAX_ITERATIONS: usize = 10;
const LISTEN_DURATION_MS: u64 = 1500;

const SYSTEM_PROMPT: &str = "You are a sound design assistant driving a Korg RK-100S 2 \
keytar synthesizer over MIDI. Use set_parameter, get_parameter, list_parameters, and \
trigger_note to shape the current patch toward the target sound you are told about. You \
will be shown a spectral distance after each attempt; smaller is closer. Make one focused \
adjustment per turn rather than many at once.";

#[derive(Debug, Clone)]
pub struct MatchSoundOutcome {
    pub iterations_run: usize,
    pub final_distance: f32,
    pub converged: bool,
}

/// Iteratively steer the patch currently loaded on the device toward
/// `target_wav_path`'s sound, recording a fresh take and re-comparing
/// after each backend turn. Stops when the model's own turn requests no
/// further tool calls, `stop_requested` is set, or `max_iterations`
/// turns have run — there is no numeric convergence threshold here;
/// that judgment belongs to the model, not the orchestrator.
pub async fn match_sound(
    backend: &impl ChatBackend,
    ctx: &ToolContext<'_>,
    target_wav_path: &str,
    max_iterations: usize,
    stop_requested: &AtomicBool,
) -> Result<MatchSoundOutcome, BackendError> {
    let max_iterations = if max_iterations == 0 {
        DEFAULT_MAX_ITERATIONS
    } else {
        max_iterations
    };

    let target_samples = read_wav_mono(target_wav_path).map_err(|e| {
        BackendError::Api(format!("could not read target wav {target_wav_path}: {e}"))
    })?;
    let target_analysis = analyze(&target_samples, ctx.sample_rate).map_err(|e| BackendError::Api(e.to_string()))?;

    let mut history = vec![Message::user(format!(
        "Target sound recorded at {target_wav_path}. Its measured features: fundamental={:.1}Hz, \
         spectral_centroid={:.1}Hz, harmonic_ratio={:.3}, duration={:.2}s. Make an initial best-guess \
         adjustment to the current patch, then trigger a note, listen to the recording, and keep \
         adjusting toward this target until you're satisfied, or say so explicitly if no further \
         adjustment is needed.",
        target_analysis.fundamental_hz,
        target_analysis.spectral_centroid_hz,
        target_analysis.harmonic_ratio,
        target_analysis.duration_s
    ))];
    let tools = catalog();
    let mut final_distance = f32::INFINITY;
    let mut converged = false;
    let mut iterations_run = 0;

    for iteration in 0..max_iterations {
        if stop_requested.load(Ordering::Acquire) {
            info!(iteration, "match_sound stopped by request");
            break;
        }
        iterations_run = iteration + 1;

        let turn = run_single_turn(backend, &mut history, SYSTEM_PROMPT, ctx, &tools).await?;
        if turn.is_final() {
            converged = true;
            info!(iteration, "match_sound converged: model requested no further tool calls");
            break;
        }

        let take_path = PathBuf::from(format!("match_attempt_{iteration}.wav"));
        let sample_rate = ctx.sample_rate;
        let recorded = tokio::task::spawn_blocking({
            let take_path = take_path.clone();
            move || record_to_wav(&take_path, Duration::from_millis(LISTEN_DURATION_MS), sample_rate)
        })
        .await
        .map_err(|e| BackendError::Api(format!("recording task panicked: {e}")))?;

        if let Err(e) = recorded {
            history.push(Message::user(format!(
                "Recording failed ({e}); continue adjusting parameters without feedback this round."
            )));
            continue;
        }

        let recorded_samples = read_wav_mono(take_path.to_str().unwrap_or_default())
            .map_err(|e| BackendError::Api(format!("could not read recorded take: {e}")))?;
        let report = compare(&target_samples, &recorded_samples, ctx.sample_rate)
            .map_err(|e| BackendError::Api(e.to_string()))?;

        final_distance = report.distance;
        info!(iteration, distance = report.distance, "match_sound progress");

        history.push(Message::user(format!(
            "Current distance from target: {:.4} (Δf0={:.1}Hz, Δcentroid={:.1}Hz, Δharmonic_ratio={:.3}). \
             Keep adjusting, or say so if you consider this close enough.",
            report.distance,
            report.delta_fundamental_hz,
            report.delta_spectral_centroid_hz,
            report.delta_harmonic_ratio
        )));
    }

    Ok(MatchSoundOutcome {
        iterations_run,
        final_distance,
        converged,
    })
}
