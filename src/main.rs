use anyhow::Result;
use cache_exerciser::benchmark::BenchmarkEngine;
use cache_exerciser::config::Config;
use cache_exerciser::events::{self, EventRelay, LogSink};
use cache_exerciser::expiration::{CancelToken, ExpirationMonitor};
use cache_exerciser::registry::{ClientRegistry, DEFAULT_CLIENT};
use cache_exerciser::run::RunResult;
use cache_exerciser::server::CacheServer;
use cache_exerciser::stress::{Scenario, StressEngine};
use cache_exerciser::{logging, VERSION};
use log::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn report(result: &RunResult) {
    println!("{}", result.to_json());
}

#[async_std::main]
async fn main() -> Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load_or_default(path.as_deref())?;
    logging::init(&config.logging)?;

    info!("cache exerciser version: {}", VERSION);

    let server = CacheServer::start(config.server.clone()).await;
    let initial = match server.open(&config.connection).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("failed to initialize cache client, is the cache service running? {}", e);
            server.shutdown().await?;
            return Err(e.into());
        }
    };

    EventRelay::attach_all(initial.as_ref(), DEFAULT_CLIENT, Arc::new(LogSink)).await;
    let mut registry = ClientRegistry::new(initial);

    let (name, handle) = registry.active()?;
    let handle = handle.clone();
    info!("running against client: {}", name);

    if let Err(e) = events::run_notification_drill(handle.as_ref(), Duration::from_millis(500)).await {
        error!("event drill failed: {}", e);
    }

    let workloads = &config.workloads;
    let bench = BenchmarkEngine::new(workloads.benchmark_parallelism);
    for result in bench
        .run_suite(handle.clone(), workloads.benchmark_iterations)
        .await
        .iter()
    {
        report(result);
    }

    for scenario in Scenario::ALL {
        let spec = scenario.default_spec(workloads);
        let result = StressEngine::run_with_progress(handle.clone(), scenario, &spec, |p| {
            info!("{} progress: {}%", scenario, p.percent)
        })
        .await;
        report(&result);
    }

    let cancel = CancelToken::new();
    let outcome = ExpirationMonitor::run(
        handle.as_ref(),
        &workloads.expiration_ttls,
        &cancel,
        |p| {
            info!(
                "[{:?}] active: {}, expired: {}",
                p.elapsed, p.remaining, p.expired
            )
        },
    )
    .await?;
    println!("{}", serde_json::to_string(&outcome)?);

    registry.dispose_all().await;
    info!("cache service status: {}", server.status().await);
    server.shutdown().await?;
    info!("cache client disposed, goodbye");

    Ok(())
}
