//! Process entry point: runs the getter, tester and read API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use proxy_pool::config::{check_cycle, GETTER_CYCLE_RANGE, TESTER_CYCLE_RANGE};
use proxy_pool::{
    server, spawn_periodic, Fetcher, Getter, HttpProber, PoolConfig, PoolStore, Source,
    SourceRegistry, Tester, TesterSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "proxypool")]
#[command(version)]
#[command(about = "Crawl, validate and serve a pool of proxies")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every enabled component against one shared pool (default)
    Run {
        /// Getter period in seconds (30-180)
        #[arg(long)]
        getter_cycle: Option<u64>,
        /// Tester period in seconds (10-30)
        #[arg(long)]
        tester_cycle: Option<u64>,
    },
}

struct Plan {
    getter: Option<Duration>,
    tester: Option<Duration>,
    server: bool,
}

fn cycle(
    name: &'static str,
    flag: Option<u64>,
    default: Duration,
    range: std::ops::RangeInclusive<u64>,
) -> anyhow::Result<Duration> {
    let period = flag.map(Duration::from_secs).unwrap_or(default);
    check_cycle(name, period, range)?;
    Ok(period)
}

fn plan(command: Option<Command>, config: &PoolConfig) -> anyhow::Result<Plan> {
    let getter_cycle = |flag| cycle("getter cycle", flag, config.getter_cycle, GETTER_CYCLE_RANGE);
    let tester_cycle = |flag| cycle("tester cycle", flag, config.tester_cycle, TESTER_CYCLE_RANGE);

    let Command::Run {
        getter_cycle: g,
        tester_cycle: t,
    } = command.unwrap_or(Command::Run {
        getter_cycle: None,
        tester_cycle: None,
    });
    Ok(Plan {
        getter: config.enable_getter.then(|| getter_cycle(g)).transpose()?,
        tester: config.enable_tester.then(|| tester_cycle(t)).transpose()?,
        server: config.enable_server,
    })
}

fn sources(config: &PoolConfig) -> anyhow::Result<Vec<Box<dyn Source>>> {
    let fetcher = Fetcher::new(config.fetch_settings()).context("building source fetcher")?;
    let registry = SourceRegistry::with_defaults();
    if config.sources.is_empty() {
        Ok(registry.build_all(&fetcher))
    } else {
        Ok(registry.build(&config.sources, &fetcher)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = PoolConfig::from_env().context("loading configuration")?;
    let plan = plan(cli.command, &config)?;

    let store = Arc::new(PoolStore::in_memory());
    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    if let Some(period) = plan.getter {
        let getter = Getter::new(
            store.clone(),
            sources(&config)?,
            config.capacity_threshold,
            config.deduction,
        );
        info!("getter sources: {:?}", getter.source_names());
        handles.push(spawn_periodic(Arc::new(getter), period, shutdown.clone()));
    }

    if let Some(period) = plan.tester {
        let prober = HttpProber::new(&config).context("building prober")?;
        let tester = Tester::new(store.clone(), Arc::new(prober), TesterSettings::from(&config));
        handles.push(spawn_periodic(Arc::new(tester), period, shutdown.clone()));
    }

    if plan.server {
        let store = store.clone();
        let addr = config.api_addr;
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = server::serve(store, addr, shutdown).await {
                log::error!("read api stopped: {}", err);
            }
        }));
    }

    if handles.is_empty() {
        info!("nothing enabled, exit");
        return Ok(());
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    shutdown.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig::builder().build().unwrap()
    }

    #[test]
    fn bare_invocation_runs_everything() {
        let cli = Cli::try_parse_from(["proxypool"]).unwrap();
        let plan = plan(cli.command, &config()).unwrap();
        assert_eq!(plan.getter, Some(Duration::from_secs(100)));
        assert_eq!(plan.tester, Some(Duration::from_secs(20)));
        assert!(plan.server);
    }

    #[test]
    fn components_only_run_inside_the_shared_process() {
        for command in ["getter", "tester", "server"] {
            assert!(Cli::try_parse_from(["proxypool", command]).is_err());
        }
    }

    #[test]
    fn disabled_components_are_left_out() {
        let config = PoolConfig::builder()
            .enable_getter(false)
            .enable_server(false)
            .build()
            .unwrap();
        let cli = Cli::try_parse_from(["proxypool", "run", "--tester-cycle", "15"]).unwrap();
        let plan = plan(cli.command, &config).unwrap();
        assert_eq!(plan.getter, None);
        assert_eq!(plan.tester, Some(Duration::from_secs(15)));
        assert!(!plan.server);
    }

    #[test]
    fn out_of_range_cycles_are_rejected() {
        let cli = Cli::try_parse_from(["proxypool", "run", "--getter-cycle", "5"]).unwrap();
        assert!(plan(cli.command, &config()).is_err());
    }
}
