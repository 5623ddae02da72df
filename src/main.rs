// src/main.rs
use clap::Parser;
use console::style;
use evmir::cli::{Args, EmitKind};
use evmir::codegen::format_assembly;
use evmir::error::CompileError;
use evmir::parser::parse_ir;
use evmir::passes::PassManager;
use std::fs;
use std::process::ExitCode;

fn run(args: &Args) -> Result<String, CompileError> {
    let source = fs::read_to_string(&args.input)?;
    let mut ctx = parse_ir(&source)?;

    match args.emit {
        EmitKind::Ir => {
            PassManager::new().run_pipeline(&mut ctx)?;
            Ok(ctx.to_string())
        }
        EmitKind::Asm => {
            let asm = evmir::compile_context(&mut ctx, args.optimize)?;
            Ok(format_assembly(&asm))
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}
