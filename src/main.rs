//! crashpull - pull crash and panic reports off a device.

use anyhow::{Context, Result};
use std::time::Instant;

use crashpull::cli::{parse_lenient, Args};
use crashpull::config::load_settings;
use crashpull::error::Error;
use crashpull::logger::open_logger;
use crashpull::progress::Progress;
use crashpull::run::{prepare_output_dir, run, RunReport};
use crashpull::transfer::Interrupt;

fn main() -> Result<()> {
    let interrupt = Interrupt::default();
    let handler_interrupt = interrupt.clone();
    ctrlc::set_handler(move || {
        // A running download stops at its next chunk and cleans up; a second
        // Ctrl-C, or one outside a download, exits at once
        let repeated = handler_interrupt.is_requested();
        if !repeated && handler_interrupt.request() {
            eprintln!("\nInterrupted by user. Stopping after the current read (Ctrl-C)...");
            return;
        }
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    })
    .context("setting Ctrl-C handler")?;

    let args = parse_lenient(std::env::args_os());
    std::process::exit(execute(&args, interrupt));
}

fn execute(args: &Args, interrupt: Interrupt) -> i32 {
    // Checked before any device traffic
    let output_path = match prepare_output_dir(&args.output) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let mut settings = match load_settings(args.config.as_deref()) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    args.apply(&mut settings);
    if let Err(e) = settings.validate() {
        return fail(&e);
    }
    let extra = match args.adhoc_device() {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    for line in args.banner(&output_path) {
        println!("{line}");
    }
    println!();

    let config = args.run_config(&settings, output_path);
    let resolver = settings.resolver(extra);
    let logger = open_logger(args.log_file.as_deref(), args.log_format);
    let progress = Progress::auto();

    let mut transfer = settings.transfer_options();
    transfer.interrupt = interrupt;

    let started = Instant::now();
    match run(
        &config,
        &settings.session_options(),
        &transfer,
        &resolver,
        logger.as_ref(),
        &progress,
    ) {
        Ok(report) => summarize(&report, started),
        Err(e) => fail(&e),
    }
}

fn fail(e: &Error) -> i32 {
    println!("[!] Error: {e}");
    e.exit_code()
}

fn summarize(report: &RunReport, started: Instant) -> i32 {
    if !report.downloaded.is_empty() {
        println!(
            "+ {} report(s), {} bytes in {:.2}s",
            report.downloaded.len(),
            report.bytes_downloaded(),
            started.elapsed().as_secs_f64()
        );
    }
    if !report.removed.is_empty() || !report.unremoved.is_empty() {
        println!(
            "+ Removed {} entr(ies) from device, {} could not be removed",
            report.removed.len(),
            report.unremoved.len()
        );
    }
    if report.has_failures() {
        for (name, e) in &report.failures {
            println!("[!] {name}: {e}");
        }
        return 2;
    }
    0
}
