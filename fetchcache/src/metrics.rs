//! Metrics declaration and recording.

use std::time::Duration;

use fetchcache_core::FetchResult;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Cache status metrics

    /// Track number of fetches served from disk.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchcache_cache_hit_total",
            "Total number of fetches served from the disk cache."
        );
        "fetchcache_cache_hit_total"
    };
    /// Track number of fetches that went to the network.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchcache_cache_miss_total",
            "Total number of fetches that called the transport."
        );
        "fetchcache_cache_miss_total"
    };
    /// Track number of failed cache writes.
    pub static ref CACHE_STORE_ERRORS: &'static str = {
        metrics::describe_counter!(
            "fetchcache_store_errors_total",
            "Total number of cache entries that could not be written."
        );
        "fetchcache_store_errors_total"
    };

    // Transport metrics

    /// Track number of DNS retries.
    pub static ref TRANSPORT_RETRY_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchcache_transport_retries_total",
            "Total number of transport attempts repeated after a resolution failure."
        );
        "fetchcache_transport_retries_total"
    };
    /// Track number of fetches that ended in a transport error.
    pub static ref TRANSPORT_ERROR_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchcache_transport_errors_total",
            "Total number of fetches that ended in a transport error."
        );
        "fetchcache_transport_errors_total"
    };

    // Latency metrics

    /// Histogram of fetch duration.
    pub static ref FETCH_DURATION: &'static str = {
        metrics::describe_histogram!(
            "fetchcache_fetch_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of fetch calls in seconds."
        );
        "fetchcache_fetch_duration_seconds"
    };
}

/// Records the outcome of one fetch.
///
/// When the `metrics` feature is disabled, this function is a no-op
/// and will be eliminated by the compiler.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_fetch(result: &FetchResult, duration: Duration) {
    let origin = result.origin.as_str();

    metrics::histogram!(*FETCH_DURATION, "origin" => origin).record(duration.as_secs_f64());

    if result.is_cached() {
        metrics::counter!(*CACHE_HIT_COUNTER).increment(1);
    } else {
        metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
    }

    if let Some(kind) = result.error {
        metrics::counter!(*TRANSPORT_ERROR_COUNTER, "code" => kind.code()).increment(1);
    }
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_fetch(_result: &FetchResult, _duration: Duration) {}

/// Records retries spent by one fetch.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_retries(retries: u32) {
    if retries > 0 {
        metrics::counter!(*TRANSPORT_RETRY_COUNTER).increment(u64::from(retries));
    }
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_retries(_retries: u32) {}

/// Records a cache write that failed.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_store_error() {
    metrics::counter!(*CACHE_STORE_ERRORS).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_store_error() {}
