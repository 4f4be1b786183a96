//! Prometheus metrics for RPC traffic and open transactions

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
    open_transactions: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("sidecar_rpc_requests_total", "RPC requests by method and outcome"),
            &["method", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "sidecar_rpc_request_duration_seconds",
                "RPC handling time in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["method"],
        )?;
        let open_transactions =
            IntGauge::new("sidecar_open_transactions", "Transactions currently open")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(open_transactions.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
            open_transactions,
        })
    }

    /// `outcome` is "ok" or an error kind label
    pub fn observe(&self, method: &str, outcome: &str, elapsed: Duration) {
        self.requests.with_label_values(&[method, outcome]).inc();
        self.duration
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_open_transactions(&self, count: usize) {
        self.open_transactions.set(count as i64);
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
