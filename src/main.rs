use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use ssc_call::logger::init_logging;
use ssc_call::{CallConfig, CallSession, ManualChannel, MediaKind, Outbox, RtcMediaStack};

/// Serverless call: blobs are exchanged by copy and paste.
#[derive(Parser, Debug)]
#[command(name = "ssc-call", version, about)]
struct CliArgs {
    /// JSON config file (ICE servers, media constraints, log filter)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter, e.g. "ssc_call=trace" (RUST_LOG wins)
    #[arg(short = 'l', long, value_name = "FILTER")]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a session and print the offer for the other participant
    Offer,
    /// Join a session from the other participant's offer
    Answer {
        /// Offer blob; read from stdin when omitted
        blob: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => CallConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => CallConfig::default(),
    };
    init_logging(args.log.as_deref().unwrap_or(config.log_filter()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let channel = match args.command {
        Command::Offer => Arc::new(ManualChannel::create()),
        Command::Answer { blob } => {
            let blob = match blob {
                Some(blob) => blob,
                None => {
                    eprintln!("Paste the offer and press enter:");
                    lines
                        .next_line()
                        .await?
                        .context("stdin closed before an offer was pasted")?
                }
            };
            Arc::new(ManualChannel::join(&blob)?)
        }
    };

    let media = Arc::new(RtcMediaStack::new()?);
    let session = CallSession::start(media, channel.clone(), channel.session_id().clone(), &config).await?;
    info!("Session {} started as {}", session.session_id(), session.role());

    let mut outbox = channel.outbox();
    let mut shown = Outbox::default();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, hanging up");
                session.hangup().await;
                break;
            }
            reason = session.terminated() => {
                info!("Session ended: {}", reason);
                break;
            }
            changed = outbox.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = outbox.borrow_and_update().clone();
                show_new_blobs(&mut shown, current);
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) if line.trim_start().starts_with('/') => match parse_toggle(&line) {
                        Some((kind, enabled)) => {
                            let toggled = match kind {
                                MediaKind::Audio => session.set_audio_enabled(enabled),
                                MediaKind::Video => session.set_video_enabled(enabled),
                            };
                            match toggled {
                                Ok(()) => info!("Local {} {}", kind, if enabled { "on" } else { "off" }),
                                Err(e) => warn!("Toggle failed: {}", e),
                            }
                        }
                        None => warn!("Unknown command {:?}, expected /mic on|off or /cam on|off", line.trim()),
                    },
                    Some(line) => match channel.apply_pasted(&line) {
                        Ok(pasted) => info!("Applied {:?}", pasted),
                        Err(e) => warn!("Paste rejected: {}", e),
                    },
                    None => stdin_open = false,
                }
            }
        }
    }

    info!("Final state: {}", session.state());
    Ok(())
}

/// `/mic on`, `/cam off` and so on.
fn parse_toggle(line: &str) -> Option<(MediaKind, bool)> {
    let mut words = line.split_whitespace();
    let kind = match words.next()? {
        "/mic" => MediaKind::Audio,
        "/cam" => MediaKind::Video,
        _ => return None,
    };
    let enabled = match words.next()? {
        "on" => true,
        "off" => false,
        _ => return None,
    };
    words.next().is_none().then_some((kind, enabled))
}

fn show_new_blobs(shown: &mut Outbox, current: Outbox) {
    let fields = [
        ("description", &mut shown.description, current.description),
        ("candidates", &mut shown.candidates, current.candidates),
        ("bundle (description + candidates)", &mut shown.bundle, current.bundle),
    ];
    for (label, seen, now) in fields {
        if now.is_some() && *seen != now {
            if let Some(blob) = &now {
                eprintln!("--- send this {} to the other participant ---", label);
                println!("{}", blob);
            }
            *seen = now;
        }
    }
}
