// Copyright (c) 2020 kprotty
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Contended lock throughput.
//!
//! Usage: `cargo bench -- [measure_ms] [threads,..] [locked_work] [unlocked_work]`
//! where the work amounts count `spin_loop` iterations.

use std::{
    fmt,
    hint::spin_loop,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Barrier,
    },
    time::Duration,
};

mod blocksync_lock;
mod parking_lot_lock;
mod spin_lock;
mod std_lock;

pub unsafe trait Lock: Send + Sync + 'static {
    const NAME: &'static str;

    fn new() -> Self;

    fn with(&self, f: impl FnOnce());
}

fn bench_all(b: &Benchmarker) {
    b.bench::<blocksync_lock::Lock>();
    b.bench::<spin_lock::Lock>();
    b.bench::<parking_lot_lock::Lock>();
    b.bench::<std_lock::Lock>();
}

fn arg<T: FromStr>(args: &[String], index: usize, default: T) -> T {
    match args.get(index) {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            eprintln!("Error: invalid argument {:?}", value);
            eprintln!("Usage: mutex [measure_ms] [threads,..] [locked_work] [unlocked_work]");
            std::process::exit(1)
        }),
    }
}

fn work(units: u64) {
    (0..units).for_each(|_| spin_loop());
}

#[derive(Default)]
struct BenchmarkResult {
    name: Option<&'static str>,
    mean: Option<f64>,
    stdev: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl BenchmarkResult {
    fn lower(value: f64) -> String {
        if value <= 1_000f64 {
            format!("{}", value.round())
        } else if value <= 1_000_000f64 {
            format!("{}k", (value / 1_000f64).round())
        } else {
            format!("{:.2}m", value / 1_000_000f64)
        }
    }

    fn column(value: Option<f64>, header: &str) -> String {
        value.map(Self::lower).unwrap_or_else(|| header.to_string())
    }
}

impl fmt::Debug for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<18} |", self.name.unwrap_or("name"))?;
        write!(f, " {:>7} |", Self::column(self.mean, "mean"))?;
        write!(f, " {:>7} |", Self::column(self.stdev, "stdev"))?;
        write!(f, " {:>7} |", Self::column(self.min, "min"))?;
        write!(f, " {:>7} |", Self::column(self.max, "max"))
    }
}

#[derive(Copy, Clone)]
struct Benchmarker {
    measure: Duration,
    threads: usize,
    locked: u64,
    unlocked: u64,
}

impl Benchmarker {
    fn bench<L: Lock>(&self) {
        #[repr(align(128))]
        struct CacheAlign<T>(T);
        struct Context<L> {
            lock: CacheAlign<L>,
            running: AtomicBool,
            barrier: Barrier,
        }

        let context = Arc::new(Context {
            lock: CacheAlign(L::new()),
            running: AtomicBool::new(true),
            barrier: Barrier::new(self.threads + 1),
        });

        let (locked, unlocked) = (self.locked, self.unlocked);
        let threads = (0..self.threads)
            .map(|_| {
                let context = context.clone();
                std::thread::spawn(move || {
                    let mut iterations = 0u64;
                    context.barrier.wait();
                    while context.running.load(Ordering::Relaxed) {
                        context.lock.0.with(|| work(locked));
                        iterations += 1;
                        work(unlocked);
                    }
                    iterations
                })
            })
            .collect::<Vec<_>>();

        context.barrier.wait();
        std::thread::sleep(self.measure);
        context.running.store(false, Ordering::Relaxed);

        let mut results = threads
            .into_iter()
            .map(|t| t.join().expect("failed to join OS thread") as f64)
            .collect::<Vec<_>>();

        let mean = results.iter().sum::<f64>() / results.len() as f64;
        let mut stdev = results.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>();
        if results.len() > 1 {
            stdev = (stdev / (results.len() - 1) as f64).sqrt();
        }
        results.sort_by(|a, b| a.partial_cmp(b).unwrap());

        println!(
            "{:?}",
            BenchmarkResult {
                name: Some(L::NAME),
                mean: Some(mean),
                stdev: Some(stdev),
                min: results.first().copied(),
                max: results.last().copied(),
            }
        );
    }
}

pub fn main() {
    // `cargo bench` appends `--bench`.
    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|a| !a.starts_with("--"))
        .collect();

    let measure = Duration::from_millis(arg(&args, 0, 1000));
    let threads: Vec<usize> = match args.get(1) {
        None => vec![1, 2, 4, 8],
        Some(list) => list.split(',').map(|t| arg(&[t.to_string()], 0, 1)).collect(),
    };
    let locked = arg(&args, 2, 50);
    let unlocked = arg(&args, 3, 100);

    for &threads in threads.iter() {
        println!(
            "measure={:?} threads={} locked={} unlocked={}\n{}\n{:?}",
            measure,
            threads,
            locked,
            unlocked,
            "-".repeat(60),
            BenchmarkResult::default(),
        );
        bench_all(&Benchmarker {
            measure,
            threads,
            locked,
            unlocked,
        });
        println!();
    }
}
