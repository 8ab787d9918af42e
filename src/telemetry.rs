use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;

const PREDICTION_DURATION_BOUNDARIES_MS: [f64; 12] = [
    5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    prediction_counter: Counter<u64>,
    history_write_failures: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("citrus_detection");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        // The first request also pays for loading the model, hence the long tail.
        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(PREDICTION_DURATION_BOUNDARIES_MS.to_vec())
            .with_description("Duration of prediction requests in milliseconds")
            .build();

        let prediction_counter = meter
            .u64_counter("predictions_total")
            .with_description("Successful predictions per class label")
            .build();

        let history_write_failures = meter
            .u64_counter("history_write_failures_total")
            .with_description("Predictions whose history row could not be written")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_duration,
            prediction_counter,
            history_write_failures,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.prediction_duration.record(duration_ms, &attributes);
    }

    pub fn record_prediction(&self, label: &str) {
        let attributes = vec![KeyValue::new("label", label.to_string())];
        self.prediction_counter.add(1, &attributes);
    }

    pub fn record_history_write_failure(&self) {
        self.history_write_failures.add(1, &[]);
    }
}
