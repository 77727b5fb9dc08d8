use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ecg_rs::ecg_client::{EcgClient, EcgClientConfig};
use ecg_rs::export::{self, ExportFormat};
use ecg_rs::monitor::{Monitor, StopOutcome};
use ecg_rs::protocol::{EVENT_CHANNEL_CAPACITY, SAMPLE_RATE_HZ};
use ecg_rs::store::{MemoryStore, Preferences, SessionStore};
use ecg_rs::types::{EcgEvent, Session};
use ecg_rs::waveform::{spawn_synthetic_source, WaveformGenerator};

const USAGE: &str = "usage: ecg-rs [--simulate] [--name <substr>] [--seconds <n>] \
                     [--export <csv|json|html>] [--no-auto-save]";

struct Args {
    simulate: bool,
    name: Option<String>,
    seconds: u64,
    export: Option<ExportFormat>,
    auto_save: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args { simulate: false, name: None, seconds: 30, export: None, auto_save: true };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--simulate" => args.simulate = true,
            "--no-auto-save" => args.auto_save = false,
            "--name" => args.name = Some(it.next().context("--name needs a value")?),
            "--seconds" => {
                let v = it.next().context("--seconds needs a value")?;
                args.seconds = v.parse().with_context(|| format!("invalid --seconds '{v}'"))?;
            }
            "--export" => {
                let v = it.next().context("--export needs a value")?;
                args.export = Some(v.parse().map_err(anyhow::Error::msg)?);
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }
    Ok(args)
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim(), "y" | "Y" | "yes"),
        Err(_) => false,
    }
}

fn print_summary(s: &Session) {
    println!("Session {}", s.id);
    println!("  started   {}", s.start_time.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  duration  {}", s.duration);
    println!("  samples   {}", s.sample_count);
    println!("  ECG       avg {} mV  min {} mV  max {} mV", s.avg_ecg, s.min_ecg, s.max_ecg);
    println!("  heart     {} bpm ({})", s.avg_heart_rate, s.status);
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=ecg_rs=debug cargo run -- --simulate
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let mut config = EcgClientConfig::default();
    if let Some(name) = args.name.clone() {
        config.name_filter = name;
    }

    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut client = EcgClient::new(config);
    let synthetic_cancel = CancellationToken::new();

    // ── Source ────────────────────────────────────────────────────────────────
    let connected = if args.simulate {
        false
    } else {
        info!("Scanning for '{}' …", client.config().name_filter);
        let outcome = tokio::select! {
            ok = client.connect(tx.clone()) => Some(ok),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(ok) = outcome else {
            info!("Interrupted while connecting.");
            client.disconnect().await;
            return Ok(());
        };
        ok
    };
    let synthetic = if connected {
        None
    } else {
        if !args.simulate {
            warn!("No peripheral connected; falling back to the synthetic waveform.");
            client.disconnect().await;
        }
        Some(spawn_synthetic_source(
            WaveformGenerator::with_noise(),
            tx.clone(),
            synthetic_cancel.clone(),
        ))
    };
    drop(tx);

    // ── Monitor ───────────────────────────────────────────────────────────────
    let mut monitor = Monitor::new(MemoryStore::new(), Preferences { auto_save: args.auto_save });
    monitor.start_monitoring();
    info!("Monitoring for {} s. Press Ctrl-C to stop early.", args.seconds);

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);
    let mut received: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Stop requested.");
                break;
            }
            event = rx.recv() => match event {
                Some(EcgEvent::Sample(sample)) => {
                    let bpm = monitor.handle_event(EcgEvent::Sample(sample));
                    received += 1;
                    // One line per second of signal.
                    if received % SAMPLE_RATE_HZ as u64 == 0 {
                        if let Some(bpm) = bpm {
                            println!("[ECG] {:+.3} mV  HR {bpm:3} bpm", sample.value);
                        }
                    }
                }
                Some(EcgEvent::Failure(e)) => {
                    error!("{e}");
                    monitor.handle_event(EcgEvent::Failure(e));
                }
                Some(event) => {
                    monitor.handle_event(event);
                }
                None => {
                    info!("All sources closed.");
                    break;
                }
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────
    // Close first so producers blocked on a full channel give up, then keep
    // whatever was already buffered.
    rx.close();
    while let Ok(event) = rx.try_recv() {
        monitor.handle_event(event);
    }
    synthetic_cancel.cancel();
    if let Some(task) = synthetic {
        let _ = task.await;
    }
    client.disconnect().await;

    let saved = match monitor.stop_monitoring() {
        StopOutcome::Discarded => {
            info!("No samples recorded.");
            None
        }
        StopOutcome::Saved(s) => Some(s),
        StopOutcome::AwaitingConfirmation(s) => {
            print_summary(&s);
            if confirm("Save this session?") {
                match monitor.save(s) {
                    StopOutcome::Saved(s) => Some(s),
                    StopOutcome::SaveFailed { error, .. } => {
                        error!("Save failed: {error}");
                        None
                    }
                    _ => None,
                }
            } else {
                None
            }
        }
        StopOutcome::SaveFailed { session, error } => {
            error!("Save failed: {error}; retrying once");
            match monitor.save(session) {
                StopOutcome::Saved(s) => Some(s),
                _ => None,
            }
        }
    };
    if let Some(s) = &saved {
        print_summary(s);
    }

    if let Some(format) = args.export {
        let sessions = monitor.store().get_all_sessions();
        println!("{}", export::export(format, &sessions)?);
    }

    info!("Done.");
    Ok(())
}
