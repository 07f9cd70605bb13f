use kiln_core::BuildSubscriber;
use kiln_model::{BuildEvent, BuildTaskStatus};
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    proto::MetricFamily,
};

const DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0,
];

/// Build task metrics fed from committed transitions.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    transitions: IntCounterVec,
    completed: IntCounterVec,
    tasks: IntGaugeVec,
    duration: HistogramVec,
}

impl PrometheusMetrics {
    /// Metrics in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Metrics registered into an existing registry.
    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        let transitions = IntCounterVec::new(
            Opts::new(
                "kiln_build_transitions_total",
                "Committed build task transitions by target status",
            ),
            &["to"],
        )?;
        let completed = IntCounterVec::new(
            Opts::new(
                "kiln_builds_completed_total",
                "Build tasks that reached a terminal status",
            ),
            &["outcome"],
        )?;
        let tasks = IntGaugeVec::new(
            Opts::new("kiln_build_tasks", "Build tasks currently in each status"),
            &["status"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "kiln_build_duration_seconds",
                "Time build tasks spent running",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["outcome"],
        )?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(completed.clone()))?;
        registry.register(Box::new(tasks.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            transitions,
            completed,
            tasks,
            duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

fn label(status: BuildTaskStatus) -> &'static str {
    match status {
        BuildTaskStatus::Pending => "pending",
        BuildTaskStatus::Running => "running",
        BuildTaskStatus::Succeeded => "succeeded",
        BuildTaskStatus::Failed => "failed",
        BuildTaskStatus::TimedOut => "timed_out",
    }
}

impl BuildSubscriber for PrometheusMetrics {
    fn on_event(&self, event: &BuildEvent) {
        let to = label(event.to);
        self.transitions.with_label_values(&[to]).inc();

        if let Some(from) = event.from {
            self.tasks.with_label_values(&[label(from)]).dec();
        }
        self.tasks.with_label_values(&[to]).inc();

        if event.to.is_terminal() {
            self.completed.with_label_values(&[to]).inc();
        }
        if let Some(ms) = event.running_ms {
            self.duration
                .with_label_values(&[to])
                .observe(ms as f64 / 1000.0);
        }
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use kiln_model::{BuildTaskId, WorkspaceId};
    use prometheus::{Encoder, TextEncoder};

    use super::*;

    fn event(from: Option<BuildTaskStatus>, to: BuildTaskStatus, running_ms: Option<u64>) -> BuildEvent {
        BuildEvent {
            task_id: BuildTaskId::from("bt-1"),
            workspace_id: WorkspaceId::from("ws"),
            from,
            to,
            note: String::new(),
            at: SystemTime::now(),
            running_ms,
        }
    }

    #[test]
    fn lifecycle_updates_every_metric() {
        let m = PrometheusMetrics::new().unwrap();
        m.on_event(&event(None, BuildTaskStatus::Pending, None));
        m.on_event(&event(Some(BuildTaskStatus::Pending), BuildTaskStatus::Running, None));
        m.on_event(&event(
            Some(BuildTaskStatus::Running),
            BuildTaskStatus::Succeeded,
            Some(2_500),
        ));

        assert_eq!(m.transitions.with_label_values(&["running"]).get(), 1);
        assert_eq!(m.completed.with_label_values(&["succeeded"]).get(), 1);
        assert_eq!(m.tasks.with_label_values(&["pending"]).get(), 0);
        assert_eq!(m.tasks.with_label_values(&["running"]).get(), 0);
        assert_eq!(m.tasks.with_label_values(&["succeeded"]).get(), 1);

        let h = m.duration.with_label_values(&["succeeded"]);
        assert_eq!(h.get_sample_count(), 1);
        assert!((h.get_sample_sum() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn text_exposition_names() {
        let m = PrometheusMetrics::new().unwrap();
        m.on_event(&event(None, BuildTaskStatus::Pending, None));
        m.on_event(&event(
            Some(BuildTaskStatus::Pending),
            BuildTaskStatus::TimedOut,
            None,
        ));

        let mut buf = Vec::new();
        TextEncoder::new().encode(&m.gather(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("kiln_build_transitions_total{to=\"timed_out\"} 1"));
        assert!(text.contains("kiln_builds_completed_total{outcome=\"timed_out\"} 1"));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }
}
