// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! vlt-dump - Print DLT storage files as text
//!
//! Reads a `.dlt` file (or stdin), decodes each frame and prints one line
//! per message. Resynchronizes past corrupted regions instead of aborting.

use clap::Parser;
use colored::*;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use vlt::protocol::argument::read_arguments;
use vlt::{DecodeOutcome, DltId, LogLevel, Message};

/// Print DLT storage files as text
#[derive(Parser, Debug)]
#[command(name = "vlt-dump")]
#[command(version = "0.1.0")]
#[command(about = "Decode and print DLT storage files")]
struct Args {
    /// Input file (reads stdin when omitted)
    file: Option<PathBuf>,

    /// Only show messages matching APP or APP:CTX
    #[arg(short, long)]
    filter: Option<String>,

    /// Also hex-dump each payload
    #[arg(short = 'x', long)]
    hex: bool,

    /// Quiet mode - suppress resync warnings
    #[arg(long)]
    quiet: bool,
}

struct Filter {
    app: DltId,
    ctx: Option<DltId>,
}

impl Filter {
    fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((app, ctx)) => Self {
                app: DltId::new(app),
                ctx: Some(DltId::new(ctx)),
            },
            None => Self {
                app: DltId::new(s),
                ctx: None,
            },
        }
    }

    fn matches(&self, message: &Message) -> bool {
        let Some(extended) = message.extended else {
            return false;
        };
        extended.apid == self.app && self.ctx.map_or(true, |ctx| extended.ctid == ctx)
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut data = Vec::new();
    match &args.file {
        Some(path) => {
            File::open(path)?.read_to_end(&mut data)?;
        }
        None => {
            io::stdin().read_to_end(&mut data)?;
        }
    }

    let filter = args.filter.as_deref().map(Filter::parse);
    let hex = args.hex;

    let mut offset = 0;
    let mut shown = 0usize;
    let mut skipped_total = 0usize;
    while offset < data.len() {
        match Message::decode_storage(&data[offset..]) {
            DecodeOutcome::Frame { message, consumed } => {
                offset += consumed;
                if filter.as_ref().map_or(true, |f| f.matches(&message)) {
                    print_message(&message, hex);
                    shown += 1;
                }
            }
            DecodeOutcome::NeedMore => {
                let tail = data.len() - offset;
                if !args.quiet && tail > 0 {
                    eprintln!(
                        "{} truncated frame, {tail} trailing bytes ignored",
                        "warning:".yellow().bold()
                    );
                }
                break;
            }
            DecodeOutcome::Resync { skipped } => {
                offset += skipped;
                skipped_total += skipped;
            }
        }
    }

    if !args.quiet && skipped_total > 0 {
        eprintln!(
            "{} skipped {skipped_total} bytes of corrupted data",
            "warning:".yellow().bold()
        );
    }
    if !args.quiet {
        eprintln!("{} {shown} messages", ">>>".green().bold());
    }
    Ok(())
}

fn level_of(message: &Message) -> Option<LogLevel> {
    let extended = message.extended?;
    // MTIN carries the level only for log messages
    if extended.message_type() != 0 {
        return None;
    }
    LogLevel::from_raw(extended.message_type_info() as i8).ok()
}

fn colored_level(level: Option<LogLevel>) -> ColoredString {
    match level {
        Some(LogLevel::Fatal) => "fatal".red().bold(),
        Some(LogLevel::Error) => "error".red(),
        Some(LogLevel::Warn) => "warn".yellow(),
        Some(LogLevel::Info) => "info".green(),
        Some(LogLevel::Debug) => "debug".blue(),
        Some(LogLevel::Verbose) => "verbose".dimmed(),
        _ => "-".normal(),
    }
}

fn print_message(message: &Message, hex: bool) {
    let time = message
        .storage
        .map(|s| format!("{}.{:06}", s.seconds, s.microseconds.max(0)))
        .unwrap_or_else(|| "-".into());
    let (apid, ctid, verbose, noar) = match message.extended {
        Some(e) => (e.apid, e.ctid, e.is_verbose(), e.noar),
        None => (DltId::default(), DltId::default(), false, 0),
    };
    let timestamp = message
        .extra
        .timestamp
        .map(|t| format!("{}.{:04}", t / 10_000, t % 10_000))
        .unwrap_or_else(|| "-".into());

    let payload = if verbose {
        match read_arguments(&message.payload, noar, message.standard.is_msbf()) {
            Ok(args) => args
                .iter()
                .map(|a| a.value.to_string())
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => format!("<{} undecodable bytes>", message.payload.len()),
        }
    } else if message.payload.len() >= 4 {
        let id = u32::from_le_bytes([
            message.payload[0],
            message.payload[1],
            message.payload[2],
            message.payload[3],
        ]);
        format!("[{}] {} bytes", id, message.payload.len() - 4)
    } else {
        format!("{} bytes", message.payload.len())
    };

    println!(
        "{time} {timestamp} {:>4} {apid} {ctid} [{}] {payload}",
        message.standard.mcnt,
        colored_level(level_of(message)),
    );

    if hex && !message.payload.is_empty() {
        for chunk in message.payload.chunks(16) {
            let bytes = chunk
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("    {}", bytes.dimmed());
        }
    }
}
