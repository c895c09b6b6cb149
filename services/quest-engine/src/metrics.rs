use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Business metrics
    pub static ref QUEST_COMPLETIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("quest_completions_total", "Quest completion attempts by terminal state"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref POINTS_SPENT: IntCounter = IntCounter::new(
        "quest_points_spent_total",
        "Total points debited by committed completions"
    ).expect("metric can be created");

    pub static ref COMPLETION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("quest_completion_duration_seconds", "Completion transaction duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("metric can be created");

    pub static ref USERS_CREATED: IntCounter = IntCounter::new(
        "users_created_total",
        "Total users registered"
    ).expect("metric can be created");

    pub static ref QUESTS_CREATED: IntCounter = IntCounter::new(
        "quests_created_total",
        "Total quests defined"
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(QUEST_COMPLETIONS.clone()))?;
    registry.register(Box::new(POINTS_SPENT.clone()))?;
    registry.register(Box::new(COMPLETION_DURATION.clone()))?;
    registry.register(Box::new(USERS_CREATED.clone()))?;
    registry.register(Box::new(QUESTS_CREATED.clone()))?;
    Ok(())
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
