//! A wrapper around the `prometheus` crate that provides a global, lazy
//! metrics registry with a `try_create_*` interface.
//!
//! Metric creation can fail (e.g. duplicate registration under tests), so
//! statics hold `Result`s and the accessor functions no-op on `Err`. This
//! keeps call sites to a single line:
//!
//! ```ignore
//! lazy_static! {
//!     pub static ref RUN_COUNT: Result<IntCounter> =
//!         try_create_int_counter("runs_total", "Total runs");
//! }
//! inc_counter(&RUN_COUNT);
//! ```

use prometheus::{HistogramOpts, Opts};

pub use prometheus::{Histogram, HistogramTimer, IntCounter, IntGauge, Result};

/// Attempt to create an `IntCounter`, returning `Err` if the registry does
/// not accept the counter (potentially due to naming conflict).
pub fn try_create_int_counter(name: &str, help: &str) -> Result<IntCounter> {
    let opts = Opts::new(name, help);
    let counter = IntCounter::with_opts(opts)?;
    prometheus::register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Attempt to create an `IntGauge`, returning `Err` if the registry does not
/// accept the gauge (potentially due to naming conflict).
pub fn try_create_int_gauge(name: &str, help: &str) -> Result<IntGauge> {
    let opts = Opts::new(name, help);
    let gauge = IntGauge::with_opts(opts)?;
    prometheus::register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Attempt to create a `Histogram`, returning `Err` if the registry does not
/// accept the histogram (potentially due to naming conflict).
pub fn try_create_histogram(name: &str, help: &str) -> Result<Histogram> {
    let opts = HistogramOpts::new(name, help);
    let histogram = Histogram::with_opts(opts)?;
    prometheus::register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

/// Start a timer that observes into `histogram` on drop or `stop_timer`.
pub fn start_timer(histogram: &Result<Histogram>) -> Option<HistogramTimer> {
    histogram.as_ref().ok().map(|h| h.start_timer())
}

pub fn stop_timer(timer: Option<HistogramTimer>) {
    if let Some(t) = timer {
        t.observe_duration()
    }
}

pub fn observe(histogram: &Result<Histogram>, value: f64) {
    if let Ok(h) = histogram {
        h.observe(value)
    }
}

pub fn inc_counter(counter: &Result<IntCounter>) {
    if let Ok(c) = counter {
        c.inc()
    }
}

pub fn inc_counter_by(counter: &Result<IntCounter>, value: u64) {
    if let Ok(c) = counter {
        c.inc_by(value)
    }
}

pub fn set_gauge(gauge: &Result<IntGauge>, value: i64) {
    if let Ok(g) = gauge {
        g.set(value)
    }
}

pub fn get_gauge_value(gauge: &Result<IntGauge>) -> Option<i64> {
    gauge.as_ref().ok().map(|g| g.get())
}
