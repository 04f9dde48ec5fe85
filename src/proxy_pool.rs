use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::StatusCode;

use crate::config::PoolConfig;
use crate::error::Error;
use crate::proxy::Proxy;

/// Pool of candidate proxies with liveness checks and least-used selection.
///
/// Selection is lazy: the pool is re-sorted at pick time, not maintained
/// incrementally. Exclusion bookkeeping is keyed by connection URL.
#[derive(Debug, Clone)]
pub struct ProxyPool {
    pub proxies: Vec<Proxy>,
    check_url: String,
    check_timeout: Duration,
    max_in_flight: usize,
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyPool {
    pub fn new() -> Self {
        Self::with_config(&PoolConfig::default())
    }

    pub fn with_config(config: &PoolConfig) -> Self {
        ProxyPool {
            proxies: Vec::new(),
            check_url: config.check_url.clone(),
            check_timeout: Duration::from_secs(config.check_timeout_secs),
            max_in_flight: config.max_concurrent_checks.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Unchecked insert. The caller accepts that a dead proxy may be picked.
    pub fn add(&mut self, proxy: Proxy) {
        self.proxies.push(proxy);
    }

    /// Unchecked insert from a connection URL string.
    pub fn add_url(&mut self, url: &str) -> Result<(), Error> {
        self.add(Proxy::parse(url)?);
        Ok(())
    }

    /// Probe one candidate through the configured IP-echo endpoint.
    ///
    /// Returns the proxy with its measured latency on HTTP 200 within the
    /// timeout; any failure is logged and reported as `None`, never an error.
    pub async fn check(&self, proxy: Proxy) -> Option<Proxy> {
        probe(self.check_url.clone(), self.check_timeout, proxy).await
    }

    /// Validate then append a single proxy.
    pub async fn checkadd(&mut self, proxy: Proxy) -> bool {
        match probe(self.check_url.clone(), self.check_timeout, proxy).await {
            Some(proxy) => {
                self.proxies.push(proxy);
                true
            }
            None => false,
        }
    }

    /// Validate a batch with bounded concurrency, appending each proxy the
    /// moment its own probe completes so early passers are pickable before
    /// the batch finishes. Returns how many were added.
    pub async fn checkadd_all(&mut self, proxies: Vec<Proxy>) -> usize {
        let mut queue = proxies.into_iter();
        let mut in_flight = FuturesUnordered::new();
        for proxy in queue.by_ref().take(self.max_in_flight) {
            in_flight.push(probe(self.check_url.clone(), self.check_timeout, proxy));
        }

        let mut added = 0;
        while let Some(outcome) = in_flight.next().await {
            if let Some(proxy) = outcome {
                self.proxies.push(proxy);
                added += 1;
            }
            if let Some(next) = queue.next() {
                in_flight.push(probe(self.check_url.clone(), self.check_timeout, next));
            }
        }
        added
    }

    /// Order ascending by `(use_count, latency)`: least-used first, fastest
    /// first among equally used. An unmeasured latency sorts before any
    /// measured one so fresh proxies are tried eagerly.
    pub fn sort(&mut self) {
        self.proxies.sort_by_key(|p| (p.use_count, p.latency));
    }

    /// Re-sort and return the first proxy whose URL is not in `ignore`.
    /// When every proxy is excluded the first post-sort entry is returned
    /// anyway, so a non-empty pool always yields a candidate.
    pub fn pick(&mut self, ignore: &[String]) -> Option<&mut Proxy> {
        self.sort();
        if self.proxies.is_empty() {
            return None;
        }
        let index = self
            .proxies
            .iter()
            .position(|p| !ignore.contains(&p.url()))
            .unwrap_or(0);
        self.proxies.get_mut(index)
    }

    pub fn get_by_url(&mut self, url: &str) -> Option<&mut Proxy> {
        self.proxies.iter_mut().find(|p| p.url() == url)
    }
}

async fn probe(check_url: String, timeout: Duration, mut proxy: Proxy) -> Option<Proxy> {
    let upstream = match reqwest::Proxy::all(proxy.url()) {
        Ok(upstream) => upstream,
        Err(e) => {
            log::warn!("proxy {} rejected by transport: {}", proxy.url(), e);
            return None;
        }
    };
    // TLS terminates at the proxy for proxied traffic
    let transport = match reqwest::Client::builder()
        .proxy(upstream)
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
    {
        Ok(transport) => transport,
        Err(e) => {
            log::warn!("failed to build probe transport for {}: {}", proxy.url(), e);
            return None;
        }
    };

    let started = Instant::now();
    match transport.get(&check_url).send().await {
        Ok(response) if response.status() == StatusCode::OK => {
            proxy.latency = Some(started.elapsed().as_millis() as u64);
            Some(proxy)
        }
        Ok(response) => {
            log::warn!(
                "proxy {} failed liveness check: {}",
                proxy.url(),
                response.status()
            );
            None
        }
        Err(e) => {
            log::warn!("proxy {} failed liveness check: {}", proxy.url(), e);
            None
        }
    }
}
