//! taskq-worker: drives the task scheduler from line commands on stdin.
//!
//! Commands, one per line:
//! - `add <priority> <kind>`: queue a task (`simple` or `staged`)
//! - `update <id> <priority>`: reprioritize a waiting task
//! - `status`: print the current snapshot
//! - `metrics`: print scheduler metrics as JSON
//! - `quit`: stop reading, drain queued tasks, exit
//!
//! Every snapshot change is printed to stdout. EOF behaves like `quit`;
//! SIGINT/SIGTERM exit without draining.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use taskq_core::config::load_dotenv;
use taskq_core::{Config, Priority, TaskId, TaskKind};
use taskq_scheduler::{
    Command, KindDispatcher, Scheduler, SchedulerHandle, SchedulerSnapshot, SeededRandom,
    SharedRandom,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Priority task scheduler worker.
#[derive(Parser, Debug)]
#[command(name = "taskq-worker", version, about)]
struct Cli {
    /// Path to a taskq.toml config file. Without it, defaults plus
    /// `TASKQ_*` environment overrides are used.
    #[arg(long, env = "TASKQ_CONFIG")]
    config: Option<PathBuf>,

    /// Seed for the random source; overrides `rng_seed` from config.
    #[arg(long, env = "TASKQ_SEED")]
    seed: Option<u64>,

    /// Print snapshots as JSON lines instead of text.
    #[arg(long)]
    json: bool,
}

// ── Input ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Input {
    Submit(Command),
    Status,
    Metrics,
    Quit,
}

/// Parse one stdin line. Blank lines and `#` comments yield `None`.
fn parse_line(line: &str) -> anyhow::Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let input = match words.as_slice() {
        ["add", priority, kind] => Input::Submit(Command::AddTask {
            priority: priority.parse::<Priority>()?,
            kind: kind.parse::<TaskKind>()?,
        }),
        ["update", id, priority] => Input::Submit(Command::UpdatePriority {
            id: id
                .parse::<TaskId>()
                .with_context(|| format!("invalid task id {id:?}"))?,
            new_priority: priority.parse::<Priority>()?,
        }),
        ["status"] => Input::Status,
        ["metrics"] => Input::Metrics,
        ["quit" | "exit"] => Input::Quit,
        _ => bail!("unrecognized command: {line}"),
    };
    Ok(Some(input))
}

// ── Output ──────────────────────────────────────────────────────────

fn print_snapshot(snapshot: &SchedulerSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to serialize snapshot"),
        }
    } else {
        print!("{snapshot}");
    }
}

/// Print every published snapshot until the scheduler stops.
async fn print_snapshots(mut snapshots: watch::Receiver<SchedulerSnapshot>, json: bool) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        print_snapshot(&snapshot, json);
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// How reading commands ended.
#[derive(Debug, PartialEq)]
enum InputEnd {
    /// EOF or `quit`; queued work drains.
    Closed,
    /// Shutdown resolved first.
    Interrupted,
}

/// Forward commands from `input` until it closes or `shutdown` resolves.
async fn read_commands<R, F>(
    input: R,
    handle: &SchedulerHandle,
    mut shutdown: Pin<&mut F>,
    json: bool,
) -> anyhow::Result<InputEnd>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { return Ok(InputEnd::Closed) };
                match parse_line(&line) {
                    Ok(Some(Input::Submit(command))) => handle.send(command).await?,
                    Ok(Some(Input::Status)) => print_snapshot(&handle.snapshot(), json),
                    Ok(Some(Input::Metrics)) => {
                        println!("{}", serde_json::to_string(&handle.metrics())?);
                    }
                    Ok(Some(Input::Quit)) => return Ok(InputEnd::Closed),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "ignoring input line"),
                }
            }
            _ = shutdown.as_mut() => return Ok(InputEnd::Interrupted),
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::from_env().context("invalid TASKQ_* environment")?,
    };
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }
    Ok(config)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.log_summary();

    let rng = SharedRandom::new(SeededRandom::from_optional_seed(config.rng_seed));
    let runner = Arc::new(KindDispatcher::from_config(&config, rng));
    let (scheduler, handle) = Scheduler::new(runner);
    let metrics = scheduler.metrics_handle();
    let service = tokio::spawn(scheduler.run());
    let printer = tokio::spawn(print_snapshots(handle.subscribe(), cli.json));

    info!("taskq-worker ready, reading commands from stdin");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let stdin = BufReader::new(tokio::io::stdin());
    if read_commands(stdin, &handle, shutdown.as_mut(), cli.json).await? == InputEnd::Interrupted {
        info!("shutdown signal received, exiting without draining");
        return Ok(());
    }

    info!(queued = handle.snapshot().queue.len(), "input closed, draining");
    drop(handle);

    tokio::select! {
        result = service => result??,
        _ = &mut shutdown => {
            info!("shutdown signal received during drain");
            return Ok(());
        }
    }
    printer.await?;

    let final_metrics = metrics
        .read()
        .map(|m| m.clone())
        .unwrap_or_else(|e| e.into_inner().clone());
    info!(
        done = final_metrics.tasks_done,
        errored = final_metrics.tasks_errored,
        "taskq-worker exited cleanly"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    use super::*;

    fn p(value: u8) -> Priority {
        Priority::new(value).unwrap()
    }

    fn spawn_scheduler() -> SchedulerHandle {
        let rng = SharedRandom::new(SeededRandom::from_seed(1));
        let runner = Arc::new(KindDispatcher::from_config(&Config::default(), rng));
        let (handle, _join) = Scheduler::spawn(runner);
        handle
    }

    #[test]
    fn parse_add() {
        let input = parse_line("add 7 staged").unwrap().unwrap();
        assert_eq!(
            input,
            Input::Submit(Command::AddTask {
                priority: p(7),
                kind: TaskKind::Staged,
            })
        );
        let input = parse_line("  add 1 simple  ").unwrap().unwrap();
        assert_eq!(
            input,
            Input::Submit(Command::AddTask {
                priority: p(1),
                kind: TaskKind::SimpleAsync,
            })
        );
    }

    #[test]
    fn parse_update() {
        let input = parse_line("update #3 10").unwrap().unwrap();
        assert_eq!(
            input,
            Input::Submit(Command::UpdatePriority {
                id: TaskId::new(3),
                new_priority: p(10),
            })
        );
    }

    #[test]
    fn parse_simple_words() {
        assert_eq!(parse_line("status").unwrap(), Some(Input::Status));
        assert_eq!(parse_line("metrics").unwrap(), Some(Input::Metrics));
        assert_eq!(parse_line("quit").unwrap(), Some(Input::Quit));
        assert_eq!(parse_line("exit").unwrap(), Some(Input::Quit));
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# queue a few").unwrap(), None);
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse_line("add 11 staged").is_err());
        assert!(parse_line("add 0 simple").is_err());
        assert!(parse_line("add 5 batch").is_err());
        assert!(parse_line("add five simple").is_err());
        assert!(parse_line("update x 5").is_err());
        assert!(parse_line("add 5").is_err());
        assert!(parse_line("launch").is_err());
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from(["taskq-worker", "--seed", "9", "--json"]).unwrap();
        assert_eq!(cli.seed, Some(9));
        assert!(cli.json);
    }

    #[tokio::test(start_paused = true)]
    async fn eof_and_quit_close_input() {
        let handle = spawn_scheduler();
        let shutdown = std::future::pending::<()>();
        tokio::pin!(shutdown);

        let input: &[u8] = b"add 5 simple\n# comment\nbogus\nadd 7 staged\n";
        let end = read_commands(input, &handle, shutdown.as_mut(), false).await.unwrap();
        assert_eq!(end, InputEnd::Closed);
        let snap = handle.wait_for(|s| s.commands_applied >= 2).await.unwrap();
        assert_eq!(snap.tasks.len(), 2);

        let input: &[u8] = b"quit\nadd 1 simple\n";
        let end = read_commands(input, &handle, shutdown.as_mut(), false).await.unwrap();
        assert_eq!(end, InputEnd::Closed);
        assert_eq!(handle.snapshot().tasks.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_after_several_lines_interrupts() {
        let handle = spawn_scheduler();
        let (mut writer, reader) = tokio::io::duplex(256);
        let (stop, stopped) = oneshot::channel::<()>();
        let shutdown = async move {
            let _ = stopped.await;
        };
        tokio::pin!(shutdown);

        writer.write_all(b"add 5 simple\nstatus\nadd 6 staged\n").await.unwrap();
        let waiter = handle.clone();
        let (end, ()) = tokio::join!(
            read_commands(BufReader::new(reader), &handle, shutdown.as_mut(), false),
            async move {
                waiter.wait_for(|s| s.commands_applied >= 2).await.unwrap();
                stop.send(()).unwrap();
            }
        );
        assert_eq!(end.unwrap(), InputEnd::Interrupted);
        drop(writer);
    }
}
