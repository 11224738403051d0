use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use crate::workloads::{WorkloadsConfig, prepare_workload, process_workload};

/// What a workload achieved within the test duration.
struct Report {
    concurrency: usize,
    task_durations: DDSketch,
    failures: usize,
    source_calls: usize,
}

pub async fn perform_stresstest(workloads: WorkloadsConfig, duration: Duration) -> Result<()> {
    // initialize workloads
    let workloads = workloads
        .workloads
        .into_iter()
        .map(|workload| prepare_workload(workload).map(Arc::new))
        .collect::<Result<Vec<_>>>()?;

    // warmup: run each workload once to make sure all tasks are up
    {
        let start = Instant::now();

        let futures = workloads.iter().map(|workload| {
            let workload = Arc::clone(workload);
            tokio::spawn(async move {
                process_workload(&workload).await;
            })
        });

        let _results = futures::future::join_all(futures).await;

        println!("Warmup: {:?}", start.elapsed());
    };
    println!();

    // run the workloads concurrently
    let mut tasks = Vec::with_capacity(workloads.len());
    for workload in workloads.iter() {
        let start = Instant::now();
        let deadline = tokio::time::Instant::from_std(start + duration);
        let workload = Arc::clone(workload);
        let concurrency = workload.concurrency;
        let calls_before = workload.source_calls();

        let task = tokio::spawn(async move {
            let task_durations = Arc::new(Mutex::new(DDSketch::default()));
            let failures = Arc::new(Mutex::new(0));
            let semaphore = Arc::new(Semaphore::new(concurrency));

            // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            loop {
                if deadline.elapsed() > Duration::ZERO {
                    break;
                }
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        let workload = Arc::clone(&workload);
                        let task_durations = Arc::clone(&task_durations);
                        let failures = Arc::clone(&failures);
                        let task_start = Instant::now();

                        tokio::spawn(async move {
                            if !process_workload(&workload).await {
                                *failures.lock() += 1;
                            }
                            task_durations.lock().add(task_start.elapsed().as_secs_f64());

                            drop(permit);
                        });
                    }
                    _ = &mut sleep => {
                        break;
                    }
                }
            }

            // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
            let _permits = semaphore.acquire_many(concurrency as u32).await;

            let task_durations = std::mem::take(&mut *task_durations.lock());
            let failures = *failures.lock();

            Report {
                concurrency,
                task_durations,
                failures,
                source_calls: workload.source_calls() - calls_before,
            }
        });
        tasks.push(task);
    }

    let finished_tasks = futures::future::join_all(tasks).await;

    for (workload, task) in workloads.iter().zip(finished_tasks) {
        let report = task?;
        print_report(workload.name(), &report, duration);
    }

    Ok(())
}

fn print_report(name: &str, report: &Report, duration: Duration) {
    let Report {
        concurrency,
        task_durations,
        failures,
        source_calls,
    } = report;

    let ops = task_durations.count();
    let ops_ps = ops as f64 / duration.as_secs_f64();
    println!("Workload {name} (concurrency: {concurrency}): {ops} operations, {ops_ps:.2} ops/s");
    if ops == 0 {
        return;
    }

    let quantile = |q| {
        let secs = task_durations.quantile(q).ok().flatten().unwrap_or_default();
        Duration::from_secs_f64(secs)
    };
    let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
    let (p50, p90, p99) = (quantile(0.5), quantile(0.9), quantile(0.99));
    println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");

    let hit_ratio = 1.0 - (*source_calls as f64 / ops as f64).min(1.0);
    println!("  fetches: {source_calls}; failed: {failures}; hit ratio: {hit_ratio:.4}");
}
