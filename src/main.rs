// src/main.rs
use std::time::Duration;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use taskpipe::{
    result_channel, Capacity, Dispatcher, Multiplexer, Selected, SharedAccumulator, WorkUnit,
};

#[derive(Parser)]
#[command(name = "taskpipe")]
#[command(about = "Concurrent task pipeline demos: fan-out, fan-in, multiplexing")]
struct Args {
    #[command(subcommand)]
    command: Cli,

    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Cli {
    /// Fan out one factorial worker per input and collect the results
    Factorial {
        #[arg(long, value_delimiter = ',', default_value = "10,5,8,1,4,12,2,12")]
        inputs: Vec<u64>,

        #[arg(long, help = "Print the full batch report as JSON")]
        json: bool,
    },

    /// Multiplex two periodic producers with one consuming loop
    Multiplex {
        #[arg(long, default_value_t = 2000, help = "How long to consume, in ms")]
        duration_ms: u64,
    },

    /// Split sentences into words concurrently under one shared lock
    Words {
        #[arg(
            long,
            num_args = 1..,
            default_values_t = [
                "the quick brown fox jumps over the lazy dog".to_string(),
                "concurrency is not parallelism".to_string(),
                "share memory by communicating".to_string(),
            ]
        )]
        sentences: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    match args.command {
        Cli::Factorial { inputs, json } => run_factorial(inputs, json).await,
        Cli::Multiplex { duration_ms } => run_multiplex(Duration::from_millis(duration_ms)).await,
        Cli::Words { sentences } => run_words(sentences).await,
    }
}

fn factorial(n: u64) -> Result<u64> {
    let mut f: u64 = 1;
    for i in 2..=n {
        f = f
            .checked_mul(i)
            .ok_or_else(|| anyhow::anyhow!("factorial of {} overflows u64", n))?;
    }
    Ok(f)
}

async fn run_factorial(inputs: Vec<u64>, json: bool) -> Result<()> {
    let units: Vec<WorkUnit<(u64, u64)>> = inputs
        .into_iter()
        .map(|n| WorkUnit::labeled(format!("factorial-{n}"), move || Ok((n, factorial(n)?))))
        .collect();

    let report = Dispatcher::new().dispatch(units).collect().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for result in &report.results {
        match (&result.value, &result.error) {
            (Some((n, f)), _) => println!("factorial of {n} is {f}"),
            (None, Some(e)) => println!("{}: {e}", result.unit_id),
            (None, None) => {}
        }
    }
    info!(
        "{} of {} units succeeded in {:?}",
        report.summary.completed, report.summary.dispatched, report.summary.duration
    );
    Ok(())
}

async fn run_multiplex(duration: Duration) -> Result<()> {
    let (tx1, rx1) = result_channel(Capacity::Bounded(10));
    let (tx2, rx2) = result_channel(Capacity::Bounded(10));
    let (cancel_tx, cancel_rx) = watch::channel(false);

    info!("starting producer for channel1 (every 500ms)");
    tokio::spawn(async move {
        while tx1.send("channel1").await.is_ok() {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });

    info!("starting producer for channel2 (every 250ms)");
    tokio::spawn(async move {
        while tx2.send("channel2").await.is_ok() {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    });

    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        let _ = cancel_tx.send(true);
    });

    let mut mux = Multiplexer::new().with_cancel(cancel_rx);
    mux.register("channel1", rx1);
    mux.register("channel2", rx2);

    let mut counts = [0usize; 2];
    loop {
        match mux.select_next().await {
            Selected::Item { source, value } => {
                println!("Got data from {value}");
                counts[source] += 1;
            }
            Selected::Cancelled => break,
            Selected::Closed => break,
        }
    }

    println!(
        "consumed for {:?}: channel1 x{}, channel2 x{}",
        duration, counts[0], counts[1]
    );
    Ok(())
}

async fn run_words(sentences: Vec<String>) -> Result<()> {
    let words: SharedAccumulator<String> = SharedAccumulator::new();

    let units: Vec<WorkUnit<usize>> = sentences
        .into_iter()
        .map(|sentence| {
            let words = words.clone();
            WorkUnit::new(move || {
                let parts: Vec<String> = sentence.split_whitespace().map(str::to_string).collect();
                let count = parts.len();
                // One critical section per sentence keeps its words together.
                words.extend(parts);
                Ok(count)
            })
        })
        .collect();

    let report = Dispatcher::new().dispatch(units).collect().await;
    let total: usize = report
        .results
        .iter()
        .filter_map(|r| r.value)
        .sum();

    println!("{:?}", words.snapshot());
    info!("accumulated {} words from {} sentences", total, report.summary.dispatched);
    Ok(())
}
