//! keystride driver
//!
//! Loads targets, derives lane geometry for the selected device and runs the
//! step loop until every target is retired or the iteration cap is hit.
//! Verified keys are logged and appended to the output file as JSON lines.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::{Duration, Instant};

use keystride::config::Config;
use keystride::device::create_backend;
use keystride::search::{KeySearchEngine, LaneGeometry};
use keystride::targets::TargetSet;
use keystride::types::SearchResult;
use keystride::KernelBackend;

const THROUGHPUT_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    config.validate().context("invalid arguments")?;

    let targets = TargetSet::load(&config.targets).context("loading targets")?;

    let backend = create_backend(config.device, &config.kernel_ptx, config.cpu)
        .context("acquiring device")?;
    let capability = backend.capability()?;
    info!(
        "Using {} ({} multiprocessors, {} max threads/block)",
        capability.name, capability.mp_count, capability.max_threads_per_block
    );

    let geometry = LaneGeometry::derive(
        config.threads,
        config.points_per_thread,
        config.blocks,
        &capability,
    )?;
    info!(
        "Geometry: {} blocks x {} threads x {} points = {} lanes",
        geometry.block_count,
        geometry.threads_per_block,
        geometry.points_per_thread,
        geometry.total_lanes()
    );

    let mut engine = KeySearchEngine::new(
        backend,
        geometry,
        config.start_exponent()?,
        config.stride_scalar()?,
        config.compression,
        targets,
    )?;
    engine.init()?;

    run_search(&mut engine, &config)
}

fn run_search<B: KernelBackend>(engine: &mut KeySearchEngine<B>, config: &Config) -> Result<()> {
    let lanes = engine.geometry().total_lanes();
    let started = Instant::now();
    let mut window_start = Instant::now();
    let mut window_iterations = 0u64;

    loop {
        engine.step()?;
        window_iterations += 1;

        for result in engine.drain_results() {
            write_result(config, &result)?;
        }

        if engine.remaining_targets() == 0 {
            info!("All targets found after {} iterations", engine.iterations());
            break;
        }
        if config.max_iterations > 0 && engine.iterations() >= config.max_iterations {
            info!("Iteration limit reached ({})", config.max_iterations);
            break;
        }

        let elapsed = window_start.elapsed();
        if elapsed >= THROUGHPUT_INTERVAL {
            let keys_per_sec =
                (window_iterations as f64 * lanes as f64) / elapsed.as_secs_f64();
            info!(
                "{:.2} MKey/s, {} iterations, {} targets remaining",
                keys_per_sec / 1_000_000.0,
                engine.iterations(),
                engine.remaining_targets()
            );
            window_start = Instant::now();
            window_iterations = 0;
        }
    }

    info!(
        "Searched {} keys in {:.1}s; next unexplored exponent {}",
        engine.iterations() * lanes,
        started.elapsed().as_secs_f64(),
        keystride::math::scalar_to_hex(&engine.next_unexplored_exponent())
    );
    Ok(())
}

/// Append one found key to the output file as a JSON line
fn write_result(config: &Config, result: &SearchResult) -> Result<()> {
    let (x, y) = result.public_key_hex();
    let line = json!({
        "private_key": result.private_key_hex(),
        "public_key_x": x,
        "public_key_y": y,
        "compressed": result.compressed,
        "hash160": result.digest.to_string(),
    });

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.out_file)
        .with_context(|| format!("opening {}", config.out_file.display()))?;
    writeln!(file, "{}", line)?;
    Ok(())
}
