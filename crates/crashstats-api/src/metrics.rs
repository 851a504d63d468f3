//! Prometheus counters served at `/metrics`.
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Per-application registry, so that several routers can coexist in one process
#[derive(Clone)]
pub struct ApiMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    rate_limited_total: IntCounter,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            Opts::new("crashstats_api_requests_total", "Model requests by model and status."),
            &["model", "status"],
        )?;
        let rate_limited_total = IntCounter::new(
            "crashstats_api_rate_limited_total",
            "Requests rejected by the rate limiter.",
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        Ok(Self {
            registry,
            requests_total,
            rate_limited_total,
        })
    }

    pub fn observe_request(&self, model: &str, status: u16) {
        let status = status.to_string();
        self.requests_total
            .with_label_values(&[model, status.as_str()])
            .inc();
    }

    pub fn observe_rate_limited(&self) {
        self.rate_limited_total.inc();
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.observe_request("TCBS", 200);
        metrics.observe_request("TCBS", 200);
        metrics.observe_rate_limited();

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"crashstats_api_requests_total{model="TCBS",status="200"} 2"#));
        assert!(text.contains("crashstats_api_rate_limited_total 1"));
    }
}
