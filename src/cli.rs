// src/cli.rs
use clap::{Parser, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmitKind {
    /// The optimized IR after the pass pipeline.
    Ir,
    /// Stack-machine assembly.
    Asm,
}

impl std::fmt::Display for EmitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitKind::Ir => f.write_str("ir"),
            EmitKind::Asm => f.write_str("asm"),
        }
    }
}

/// Optimize textual IR and emit stack-machine assembly.
#[derive(Debug, Parser)]
#[command(
    name = "evmir",
    version,
    about,
    after_help = "Example:\n  evmir contract.venom --emit asm -O"
)]
pub struct Args {
    /// Input file containing textual IR.
    #[arg(value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// What to print.
    #[arg(long, value_enum, default_value_t = EmitKind::Asm)]
    pub emit: EmitKind,

    /// Run the final assembly peephole cleanup.
    #[arg(short = 'O', long)]
    pub optimize: bool,
}
