//! # proxy-pool
//!
//! A self-refreshing pool of verified HTTP proxies.
//!
//! Candidates are crawled from pluggable [`Source`]s by the [`Getter`],
//! stored in a [`PoolStore`] ranked by expiry, and validated under bounded
//! concurrency by the [`Tester`], which evicts every proxy that fails. The
//! pool is read through [`PoolStore`] directly, through the HTTP read API in
//! [`server`], or transparently through [`ProxyPoolMiddleware`] for reqwest.

pub mod clock;
pub mod config;
pub mod error;
pub mod getter;
pub mod memory;
pub mod middleware;
pub mod proxy;
pub mod retry;
pub mod scheduler;
pub mod server;
pub mod source;
pub mod store;
pub mod tester;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::{
    ConfigError, DecodeError, FetchError, InvalidRecord, PoolEmpty, PoolError, ProbeError,
    StoreError, SweepError,
};
pub use getter::{FillReport, Getter};
pub use memory::MemoryStore;
pub use middleware::ProxyPoolMiddleware;
pub use proxy::ProxyRecord;
pub use retry::{retry, RetryPolicy};
pub use scheduler::{spawn_periodic, Cycle};
pub use source::{Batches, FetchSettings, Fetcher, Source, SourceRegistry};
pub use store::{PoolStore, ScoredStore};
pub use tester::{HttpProber, Prober, SweepReport, Tester, TesterSettings};
