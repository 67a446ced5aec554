use std::sync::mpsc;
use std::time::{Duration, Instant};

use clap::Parser;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use circuit_solver::generate::{random_circuit, GeneratorConfig};
use circuit_solver::pool::WorkerPool;
use circuit_solver::sequential::SequentialSolver;
use circuit_solver::solver::{CircuitSolver, ParallelSolver, SolverConfig};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of random circuits.
    #[arg(value_name = "INT", default_value = "100")]
    tests: usize,

    /// Chance that a leaf sleeps before producing its value.
    #[clap(long, value_name = "FLOAT", default_value = "0.8")]
    sleepy_chance: f64,

    /// Longest leaf sleep, in milliseconds.
    #[clap(long, value_name = "MS", default_value = "100")]
    max_sleep: u64,

    /// Depth budget of each circuit.
    #[clap(long, value_name = "INT", default_value = "20")]
    max_depth: usize,

    /// Largest input count of AND/OR/GT/LT gates.
    #[clap(long, value_name = "INT", default_value = "16")]
    max_args: usize,

    /// Soft cap on the number of nodes per circuit.
    #[clap(long, value_name = "INT", default_value = "1000")]
    node_limit: usize,

    /// Random seed.
    #[clap(long, value_name = "INT")]
    seed: Option<u64>,

    /// Reuse one solver for all circuits instead of a fresh one per circuit.
    #[clap(long)]
    shared: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    let config = GeneratorConfig::default()
        .with_sleepy_chance(args.sleepy_chance)
        .with_max_sleep(Duration::from_millis(args.max_sleep))
        .with_max_depth(args.max_depth)
        .with_max_args(args.max_args)
        .with_node_limit(args.node_limit);
    let mut rng = match args.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };

    let circuits: Vec<_> = (0..args.tests).map(|_| random_circuit(&mut rng, &config)).collect();
    let nodes: usize = circuits.iter().map(|c| c.root().size()).sum();
    println!("Generated {} circuits with {} nodes in total", circuits.len(), nodes);

    println!("Running parallel solver...");
    let shared = ParallelSolver::new();
    let mut results = Vec::with_capacity(circuits.len());
    let mut total = Duration::ZERO;
    for (i, circuit) in circuits.iter().enumerate() {
        let fresh;
        let solver = if args.shared {
            &shared
        } else {
            fresh = ParallelSolver::new();
            &fresh
        };
        let start = Instant::now();
        let value = solver.solve(circuit).get()?;
        let elapsed = start.elapsed();
        info!("circuit {} = {} in {:?}", i + 1, value, elapsed);
        if !args.shared {
            solver.stop();
        }
        total += elapsed;
        results.push(value);
    }
    shared.stop();
    let average = total / args.tests.max(1) as u32;
    println!("Average time taken by parallel solver: {:?}", average);

    println!("Verifying with the sequential solver, this may take a while with many sleepy leaves...");
    let pool = WorkerPool::new(&SolverConfig::default().with_thread_name("sequential"));
    let (tx, rx) = mpsc::channel();
    for (i, circuit) in circuits.into_iter().enumerate() {
        let tx = tx.clone();
        pool.execute(move || {
            let value = SequentialSolver::new().solve(&circuit).get();
            let _ = tx.send((i, value));
        })?;
    }
    drop(tx);

    let mut fails = 0;
    for (i, expected) in rx {
        if expected != Ok(results[i]) {
            println!("Test {} failed: expected {:?}, got {}", i + 1, expected, results[i]);
            fails += 1;
        }
    }
    pool.shutdown_now();

    if fails == 0 {
        println!("All tests passed.");
    } else {
        println!("{}/{} tests failed.", fails, args.tests);
    }

    Ok(())
}
