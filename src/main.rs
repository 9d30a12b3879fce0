// src/main.rs
//
// Line-oriented serial terminal built on the serimon engine. Lines typed on
// stdin are sent to the port; inbound data is printed as it arrives. Slash
// commands cover hex sends, file transfer, pause and export.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use serimon::{
    list_ports, ConnectionState, DiskFileSource, EntryKind, FileSendOptions, FlowControl,
    LogEntry, Parity, PortConfig, Renderer, SendPayload, SerialTransport, TerminalSession,
    Terminator,
};

#[derive(Parser)]
#[command(name = "serimon", about = "Interactive serial terminal")]
struct Args {
    /// Serial port to open (e.g. /dev/ttyUSB0). Omit with --list to enumerate.
    port: Option<String>,

    #[arg(long, default_value_t = 115200)]
    baud: u32,

    /// 7 or 8
    #[arg(long, default_value_t = 8)]
    data_bits: u8,

    /// 1 or 2
    #[arg(long, default_value_t = 1)]
    stop_bits: u8,

    /// none, odd or even
    #[arg(long, default_value = "none")]
    parity: String,

    /// Give every inbound packet its own log row instead of coalescing
    #[arg(long)]
    line_per_packet: bool,

    /// Append CRLF to every text send instead of LF
    #[arg(long)]
    crlf: bool,

    /// List available ports and exit
    #[arg(long)]
    list: bool,

    /// Write a timestamped log file to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Prints entries as they appear. Tracks how many entries it has already
/// printed; a merge into the last printed row is not re-printed.
struct StdoutRenderer {
    printed: AtomicUsize,
}

impl Renderer for StdoutRenderer {
    fn render(&self, entries: &[LogEntry], _lines_per_sec: usize) {
        let seen = self.printed.load(Ordering::Relaxed);
        // The store evicts from the front, so the backlog can only shrink
        // below `seen` after eviction; clamp to avoid re-printing everything.
        for e in entries.iter().skip(seen.min(entries.len())) {
            let tag = match e.kind {
                EntryKind::Receive => "<<",
                EntryKind::Transmit => ">>",
                EntryKind::System => "--",
                EntryKind::Error => "!!",
            };
            println!(
                "{} {} {}",
                e.timestamp.format("%H:%M:%S%.3f"),
                tag,
                e.text.trim_end_matches(['\r', '\n'])
            );
        }
        self.printed.store(entries.len(), Ordering::Relaxed);
    }
}

fn parse_parity(s: &str) -> Parity {
    match s.to_ascii_lowercase().as_str() {
        "odd" => Parity::Odd,
        "even" => Parity::Even,
        _ => Parity::None,
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    if args.list {
        for p in list_ports().map_err(|e| e.to_string())? {
            match p.product {
                Some(product) => println!("{}  [{}] {}", p.port_name, p.port_type, product),
                None => println!("{}  [{}]", p.port_name, p.port_type),
            }
        }
        return Ok(());
    }

    let Some(port) = args.port else {
        return Err("no port given (use --list to enumerate)".to_string());
    };

    if let Some(ref dir) = args.log_dir {
        serimon::init_file_logging(dir)?;
    }

    let config = PortConfig {
        port,
        baud_rate: args.baud,
        data_bits: args.data_bits,
        stop_bits: args.stop_bits,
        parity: parse_parity(&args.parity),
        flow_control: FlowControl::None,
    };

    let renderer = Arc::new(StdoutRenderer {
        printed: AtomicUsize::new(0),
    });
    let mut session = TerminalSession::new(Arc::new(SerialTransport), renderer);
    session.set_force_line_break(args.line_per_packet);
    session.connect(&config).await.map_err(|e| e.to_string())?;

    let terminator = if args.crlf { Terminator::CrLf } else { Terminator::Lf };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim_end();
        match trimmed.split_once(' ') {
            _ if trimmed == "/quit" => break,
            _ if trimmed == "/pause" => session.pause(),
            _ if trimmed == "/resume" => session.resume(),
            _ if trimmed == "/stats" => {
                let (rx, tx) = session.byte_totals();
                println!(
                    "-- rx {} bytes, tx {} bytes, {} lines/sec",
                    rx,
                    tx,
                    session.lines_per_sec()
                );
            }
            _ if trimmed == "/stoprepeat" => {
                if let Some(tx) = session.transmitter() {
                    tx.stop_repeat();
                }
            }
            Some(("/hex", rest)) => {
                if let Some(tx) = session.transmitter() {
                    if let Err(e) = tx.send(&SendPayload::hex(rest)).await {
                        eprintln!("!! {}", e);
                    }
                }
            }
            Some(("/file", rest)) => {
                if let Some(tx) = session.transmitter() {
                    let source = DiskFileSource::new(rest.trim());
                    // Runs in the background so /pause can still abort it
                    tokio::spawn(async move {
                        let result = tx
                            .send_file(&source, &FileSendOptions::default(), |pct| {
                                eprintln!("-- file send {}%", pct);
                            })
                            .await;
                        if let Err(e) = result {
                            eprintln!("!! {}", e);
                        }
                    });
                }
            }
            Some(("/repeat", rest)) => {
                if let Some((ms, text)) = rest.split_once(' ') {
                    match (ms.parse::<u64>(), session.transmitter()) {
                        (Ok(ms), Some(tx)) => {
                            let mut payload = SendPayload::text(text);
                            payload.terminator = terminator;
                            if let Err(e) = tx.start_repeat(payload, Duration::from_millis(ms)) {
                                eprintln!("!! {}", e);
                            }
                        }
                        _ => eprintln!("!! usage: /repeat <ms> <text>"),
                    }
                }
            }
            Some(("/export", rest)) => {
                let entries = session.log_snapshot();
                if let Err(e) = serimon::write_transcript(&PathBuf::from(rest.trim()), &entries) {
                    eprintln!("!! {}", e);
                }
            }
            _ => {
                if session.connection_state() == ConnectionState::Disconnected {
                    eprintln!("!! not connected");
                    break;
                }
                if let Some(tx) = session.transmitter() {
                    let mut payload = SendPayload::text(trimmed);
                    payload.terminator = terminator;
                    if let Err(e) = tx.send(&payload).await {
                        eprintln!("!! {}", e);
                    }
                }
            }
        }
    }

    session.disconnect().await;
    serimon::stop_file_logging();
    Ok(())
}
