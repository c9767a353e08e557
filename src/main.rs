use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rtr_client::runner::launcher::ProcessLauncher;
use rtr_client::{Config, RunEvent, TestCase, TestRunState, TestRunnerClient, TestState, store};

#[derive(Parser)]
#[command(name = "rtr", version, about = "Drive test runs inside a Revit-hosted runner service")]
struct Cli {
    /// Watched protocol directory shared with the host service.
    #[arg(long, global = true, env = "RTR_WATCH_DIR")]
    watch_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Wait for the runner service and print its home descriptor.
    Status {
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Enumerate the test cases in an assembly.
    Explore {
        assembly: PathBuf,
        /// Explore the assembly in place instead of freezing a versioned copy.
        #[arg(long)]
        exact_build: bool,
    },
    /// Execute test cases from an assembly.
    Run {
        assembly: PathBuf,
        /// Case to run, as Class.Method; repeatable.
        #[arg(long = "test", value_name = "CLASS.METHOD", required = true)]
        tests: Vec<String>,
        #[arg(long)]
        exact_build: bool,
    },
    /// Show the newest stored result for a test binary.
    Latest {
        /// File name of the test binary, e.g. MyTests.dll.
        binary: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = Config::load(&cwd);
    if let Some(watch_dir) = cli.watch_dir {
        config.watch_dir = watch_dir;
    }

    let mut client = TestRunnerClient::new(&config);
    if let Some(command) = &config.host.command {
        client = client.with_launcher(Arc::new(ProcessLauncher::new(command)));
    }

    match cli.command {
        CliCommand::Status { timeout_secs } => status(&client, timeout_secs).await,
        CliCommand::Explore {
            assembly,
            exact_build,
        } => explore(&client, assembly, exact_build).await,
        CliCommand::Run {
            assembly,
            tests,
            exact_build,
        } => run(&client, assembly, tests, exact_build).await,
        CliCommand::Latest { binary } => latest(&client, &binary).await,
    }
}

async fn status(client: &TestRunnerClient, timeout_secs: u64) -> Result<()> {
    let cancel = CancellationToken::new();
    let (handle, home_rx) = client.watch_status(cancel.clone());

    let home = tokio::time::timeout(Duration::from_secs(timeout_secs), home_rx).await;
    cancel.cancel();
    let _ = handle.await;

    match home {
        Ok(Ok(home)) => {
            println!("Runner service is up");
            println!("  Revit version: {}", home.revit_version);
            println!("  Log file:      {}", home.log_file_path);
            println!("  Explore path:  {}", home.explore_path.display());
            println!("  Test path:     {}", home.test_path.display());
            Ok(())
        }
        _ => bail!("no runner service responded within {timeout_secs}s"),
    }
}

async fn explore(client: &TestRunnerClient, assembly: PathBuf, exact_build: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let response = client
        .explore(&assembly, !exact_build, &cancel)
        .await
        .context("explore request failed")?;

    let Some(response) = response else {
        bail!("runner service not available");
    };

    println!("Explore file: {}", response.explore_file.display());
    if let Some(message) = response.message {
        println!("Message: {message}");
    }
    Ok(())
}

async fn run(
    client: &TestRunnerClient,
    assembly: PathBuf,
    tests: Vec<String>,
    exact_build: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();

    let assembly = if exact_build {
        assembly
    } else {
        let path = assembly.clone();
        tokio::task::spawn_blocking(move || rtr_client::resolver::resolve(&path))
            .await?
            .context("failed to freeze a versioned build")?
    };

    let assembly_str = assembly.to_string_lossy().into_owned();
    let cases: Vec<TestCase> = tests
        .iter()
        .map(|full_name| {
            let (class, method) = full_name
                .rsplit_once('.')
                .with_context(|| format!("expected CLASS.METHOD, got '{full_name}'"))?;
            Ok(TestCase::new(full_name.clone(), class, method, assembly_str.clone()))
        })
        .collect::<Result<_>>()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let run = client.run(cases, &tx, &cancel);
    tokio::pin!(run);

    let mut reported: Vec<String> = Vec::new();
    let mut last_snapshot = None;
    let mut terminated_message = None;

    loop {
        tokio::select! {
            result = &mut run => {
                result.context("test run failed")?;
                break;
            }
            Some(event) = rx.recv() => {
                handle_event(event, &mut reported, &mut last_snapshot, &mut terminated_message);
            }
        }
    }
    // Drain whatever is still buffered in the channel.
    while let Ok(event) = rx.try_recv() {
        handle_event(event, &mut reported, &mut last_snapshot, &mut terminated_message);
    }

    if let Some(message) = terminated_message {
        bail!("{message}");
    }
    let Some(final_state) = last_snapshot else {
        bail!("run produced no result");
    };

    let counts = final_state.summary();
    if !final_state.output.is_empty() {
        println!("{}", final_state.output);
    }
    println!(
        "{} - {} of {} passed ({} ms)",
        if counts.success() {
            "Run finished successfully"
        } else {
            "Run ended with errors"
        },
        counts.passed,
        counts.total,
        counts.duration,
    );

    if !counts.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn handle_event(
    event: RunEvent,
    reported: &mut Vec<String>,
    last_snapshot: &mut Option<TestRunState>,
    terminated_message: &mut Option<String>,
) {
    match event {
        RunEvent::Progress(snapshot) => {
            for case in &snapshot.cases {
                if case.state.is_terminal() && !reported.contains(&case.id) {
                    reported.push(case.id.clone());
                    print_case(case);
                }
            }
            *last_snapshot = Some(snapshot);
        }
        RunEvent::Terminated { message } => {
            *terminated_message = Some(message);
        }
    }
}

fn print_case(case: &TestCase) {
    println!("{} {}", case.state.icon(), case.full_name());
    if case.state == TestState::Failed {
        if let Some(message) = &case.message {
            println!("    {message}");
        }
        if let Some(stack_trace) = &case.stack_trace {
            for line in stack_trace.lines() {
                println!("    {line}");
            }
        }
    }
}

async fn latest(client: &TestRunnerClient, binary: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let home = client
        .discover(&cancel)
        .await
        .context("discovery failed")?
        .context("runner service not available")?;

    let Some(result) = store::find_latest_result(&home, binary) else {
        bail!("no stored result mentions '{binary}'");
    };

    for case in &result.cases {
        print_case(case);
    }
    let counts = result.summary();
    println!(
        "{} {} - {} of {} passed ({} ms)",
        result.state.icon(),
        if counts.success() { "Passed" } else { "Failed" },
        counts.passed,
        counts.total,
        counts.duration,
    );
    Ok(())
}
