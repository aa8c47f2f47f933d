use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::types::{MetricSample, ReleaseMetric};

pub use prometheus::TEXT_FORMAT as CONTENT_TYPE;

struct Families {
    revisions: CounterVec,
    info: GaugeVec,
    timestamp: GaugeVec,
}

impl Families {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        let families = Self {
            revisions: CounterVec::new(opts(ReleaseMetric::Revisions), ReleaseMetric::Revisions.label_names())?,
            info: GaugeVec::new(opts(ReleaseMetric::Info), ReleaseMetric::Info.label_names())?,
            timestamp: GaugeVec::new(opts(ReleaseMetric::Timestamp), ReleaseMetric::Timestamp.label_names())?,
        };
        registry.register(Box::new(families.revisions.clone()))?;
        registry.register(Box::new(families.info.clone()))?;
        registry.register(Box::new(families.timestamp.clone()))?;
        Ok(families)
    }

    fn record(&self, sample: &MetricSample) -> prometheus::Result<()> {
        let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
        match sample.metric {
            ReleaseMetric::Revisions => self.revisions
                .get_metric_with_label_values(&values)?
                .inc_by(sample.value.max(0.0)),
            ReleaseMetric::Info => self.info
                .get_metric_with_label_values(&values)?
                .set(sample.value),
            ReleaseMetric::Timestamp => self.timestamp
                .get_metric_with_label_values(&values)?
                .set(sample.value),
        }
        Ok(())
    }
}

fn opts(metric: ReleaseMetric) -> Opts {
    Opts::new(metric.name(), metric.help())
}

/// Render one scrape's samples in the Prometheus text format.
///
/// A fresh registry is built per call so concurrent scrapes never share
/// metric state. Families without samples are left out of the output.
pub fn encode_samples(samples: &[MetricSample]) -> prometheus::Result<String> {
    let registry = Registry::new();
    let families = Families::register(&registry)?;
    for sample in samples {
        families.record(sample)?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
