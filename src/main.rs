//! bwzip command line entry point.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::process::exit;

use clap::Parser;
use log::{error, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use bwzip::tools::cli::Args;
use bwzip::{BwError, Compressor, Decompressor};

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Let clap print help and version itself.
            if e.use_stderr() {
                eprintln!("{}", e);
                exit(1);
            }
            print!("{}", e);
            exit(0);
        }
    };

    TermLogger::init(
        args.level_filter(),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .expect("logger init");

    match run(&args) {
        Ok(()) => {
            info!("done");
        }
        Err(e) => {
            error!("{}", e);
            exit(1);
        }
    }
}

fn run(args: &Args) -> Result<(), BwError> {
    let options = args.to_options()?;

    let mut input: Box<dyn Read> = if args.stdin || args.input_file.is_none() {
        Box::new(io::stdin().lock())
    } else {
        let name = args.input_file.as_ref().unwrap();
        info!("input: {}", name);
        Box::new(BufReader::new(File::open(name)?))
    };
    let mut output: Box<dyn Write> = if args.stdout || args.output_file.is_none() {
        Box::new(io::stdout().lock())
    } else {
        let name = args.output_file.as_ref().unwrap();
        info!("output: {}", name);
        Box::new(BufWriter::new(File::create(name)?))
    };

    if args.decompress {
        let decompressor = Decompressor::with_threads(args.threads)?;
        decompressor.decompress(&mut input, &mut output)?;
    } else {
        info!("block size = {} kB", args.block);
        let compressor = Compressor::new(options)?;
        compressor.compress(&mut input, &mut output)?;
    }
    Ok(())
}
