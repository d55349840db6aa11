//! Span builder helpers for hop instrumentation.

/// Create a tracing span for one hop request.
///
/// Usage: `let span = hop_request_span!(hop_id, raw_pool_index);`
///
/// Recorded later by the sequencer:
/// - `pool`: name of the pool probed on this hop
/// - `outcome`: `chain`, `final`, or the error kind
#[macro_export]
macro_rules! hop_request_span {
    ($hop_id:expr, $pool_index:expr) => {
        tracing::info_span!(
            "hop_request",
            hop_id = %$hop_id,
            pool_index = ?$pool_index,
            pool = tracing::field::Empty,
            outcome = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for one probe round over a pool.
#[macro_export]
macro_rules! pool_probe_span {
    ($pool:expr, $domain_count:expr) => {
        tracing::info_span!(
            "pool_probe",
            pool = %$pool,
            domains = $domain_count,
            available = tracing::field::Empty,
            selected = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for a single domain health probe.
#[macro_export]
macro_rules! domain_probe_span {
    ($domain:expr) => {
        tracing::debug_span!(
            "domain_probe",
            domain = %$domain,
            available = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
