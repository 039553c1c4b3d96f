//! Per-run orchestration context.

use std::time::Duration;

/// Configuration shared by every component of one orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    /// Run name; prefixes job names and result locators.
    pub run_name: String,
    /// Queue the jobs are submitted to.
    pub queue: String,
    /// Job definition each unit runs.
    pub job_definition: String,
    /// Base URI prepended to result locators in job parameters.
    pub results_uri_base: Option<String>,
    /// Fixed wait between polling iterations.
    pub poll_interval: Duration,
    /// Maximum in-flight submissions (1 = strictly sequential).
    pub submit_concurrency: usize,
    /// Value the estimate converges towards.
    pub reference: f64,
}

impl RunContext {
    /// Create a context with default polling and submission settings.
    pub fn new(
        run_name: impl Into<String>,
        queue: impl Into<String>,
        job_definition: impl Into<String>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            queue: queue.into(),
            job_definition: job_definition.into(),
            results_uri_base: None,
            poll_interval: Duration::from_secs(10),
            submit_concurrency: 1,
            reference: std::f64::consts::PI,
        }
    }

    pub fn with_results_uri_base(mut self, base: impl Into<String>) -> Self {
        self.results_uri_base = Some(base.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_submit_concurrency(mut self, concurrency: usize) -> Self {
        self.submit_concurrency = concurrency.max(1);
        self
    }

    pub fn with_reference(mut self, reference: f64) -> Self {
        self.reference = reference;
        self
    }

    /// Name given to the job running unit `index`.
    pub fn job_name(&self, index: usize) -> String {
        format!("{}-{}", self.run_name, index)
    }

    /// URI a unit is told to write its result to.
    pub fn results_uri(&self, locator: &str) -> String {
        match self.results_uri_base.as_deref() {
            Some(base) if !base.trim().is_empty() => {
                format!("{}/{}", base.trim_end_matches('/'), locator)
            }
            _ => locator.to_string(),
        }
    }
}
