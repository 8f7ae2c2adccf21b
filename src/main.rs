use std::{env, fs};

use color_eyre::eyre::{Result, WrapErr};
use log::info;
use simple_logger::SimpleLogger;

use regvm::io::{Logged, StdConsole};
use regvm::memory::StdMem;
use regvm::processor::Processor;

/// Program interpreted when no path is given on the command line.
const DEFAULT_PROGRAM: &str = "assembly_lang.asm";

/// Everything shown on screen is mirrored here.
const OUTPUT_LOG: &str = "output.txt";

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init().unwrap(); // logging

    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_PROGRAM.to_string());
    let program = fs::read_to_string(&path)
        .wrap_err_with(|| format!("failed to open program `{}`", path))?;
    info!("File opened successfully: {}", path);

    let mut memory = StdMem::default();
    let mut cpu = Processor::default();
    let mut console = Logged::create(StdConsole, OUTPUT_LOG)
        .wrap_err_with(|| format!("failed to create `{}`", OUTPUT_LOG))?;

    cpu.run(&program, &mut memory, &mut console);

    info!("File closed successfully.");
    Ok(())
}
