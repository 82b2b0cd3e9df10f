use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rk100s", about = "Patch librarian and AI sound-design driver for the Korg RK-100S 2")]
pub struct Opts {
    /// MIDI channel, 1-16.
    #[arg(long, global = true, default_value_t = 1)]
    pub channel: u8,

    /// SysEx model id (spec §9 open question; override once confirmed
    /// against hardware).
    #[arg(long, global = true)]
    pub model_id: Option<u8>,

    #[command(subcommand)]
    pub operation: Operation,
}

#[derive(Subcommand)]
pub enum Operation {
    /// List visible MIDI port names.
    ListPorts,
    /// Pull one program slot from the connected device.
    PullSlot {
        port_index: usize,
        slot: u8,
        #[arg(long, default_value_t = 2000)]
        deadline_ms: u64,
    },
    /// Pull a contiguous range of program slots, one at a time.
    PullRange {
        port_index: usize,
        start: u8,
        end: u8,
        #[arg(long, default_value_t = 2000)]
        deadline_each_ms: u64,
    },
    /// Send a named parameter's value live.
    SetParameter {
        port_index: usize,
        name: String,
        value: i32,
    },
    /// Look up a named parameter's documented metadata.
    GetParameter { name: String },
    /// List every named parameter this crate knows about.
    ListParameters,
    /// Extract fundamental/centroid/harmonic-ratio/envelope from a WAV file.
    AnalyzeAudio { path: PathBuf },
    /// Compare two WAV files and report spectral distance.
    CompareAudio { target: PathBuf, recorded: PathBuf },
    /// Run the AI sound-matching loop against a target recording.
    MatchSound {
        port_index: usize,
        target: PathBuf,
        #[arg(long, default_value_t = 10)]
        max_iterations: usize,
    },
    /// Pull a program slot and append it to a JSON bank file.
    SaveSlot {
        port_index: usize,
        slot: u8,
        bank: PathBuf,
        #[arg(long, default_value_t = 2000)]
        deadline_ms: u64,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List the patches stored in a JSON bank file.
    ListBank { bank: PathBuf },
}
