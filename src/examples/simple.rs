//! Simple example of using proxy-pool in-process.
//!
//! Crawls the plain-text sources once, validates what was found and sends a
//! request through the surviving proxies.

use proxy_pool::{
    Fetcher, Getter, HttpProber, PoolConfig, PoolStore, ProxyPoolMiddleware, SourceRegistry,
    Tester, TesterSettings,
};
use reqwest_middleware::ClientBuilder;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = PoolConfig::builder()
        .sources(vec!["plain"])
        .test_url("http://httpbin.org/get")
        .valid_statuses([200])
        .test_timeout(Duration::from_secs(5))
        .test_anonymous(false)
        .max_workers(50)
        .build()?;

    let store = Arc::new(PoolStore::in_memory());

    println!("Crawling sources...");
    let fetcher = Fetcher::new(config.fetch_settings())?;
    let sources = SourceRegistry::with_defaults().build(&config.sources, &fetcher)?;
    let getter = Getter::new(store.clone(), sources, config.capacity_threshold, config.deduction);
    let filled = getter.run().await?;
    println!("Admitted {} new proxies", filled.admitted);

    println!("Validating...");
    let tester = Tester::new(
        store.clone(),
        Arc::new(HttpProber::new(&config)?),
        TesterSettings::from(&config),
    );
    let swept = tester.run().await?;
    println!("{} of {} proxies passed", swept.kept, swept.tested);

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(
            ProxyPoolMiddleware::new(store)
                .retry_count(2)
                .max_requests_per_second(3),
        )
        .build();

    println!("Sending request...");
    let response = client.get("https://httpbin.org/ip").send().await?;

    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    Ok(())
}
