//! Prometheus counters served on `/metrics`

use dataqna_core::Stage;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("dataqna_requests_total", "Requests by endpoint and ResponseCode"),
            &["endpoint", "code"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new(
                "dataqna_pipeline_failures_total",
                "Failed pipeline requests by stage",
            ),
            &["stage"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(failures.clone()))?;

        Ok(Self {
            registry,
            requests,
            failures,
        })
    }

    pub fn observe(&self, endpoint: &str, code: u16) {
        let code = code.to_string();
        self.requests
            .with_label_values(&[endpoint, code.as_str()])
            .inc();
    }

    pub fn failure(&self, stage: Stage) {
        self.failures.with_label_values(&[stage.as_str()]).inc();
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_counts() {
        let metrics = Metrics::new().unwrap();
        metrics.observe("generate_sql", 200);
        metrics.observe("generate_sql", 200);
        metrics.failure(Stage::Execution);

        let text = metrics.render().unwrap();
        let requests = text
            .lines()
            .find(|l| l.starts_with("dataqna_requests_total{") && l.contains(r#"endpoint="generate_sql""#))
            .unwrap();
        assert!(requests.contains(r#"code="200""#));
        assert!(requests.ends_with(" 2"));
        assert!(text.contains(r#"dataqna_pipeline_failures_total{stage="execution"} 1"#));
    }
}
