use tracing::trace;

// Lightweight metric helpers; counters ride the trace stream so the
// Prometheus recorder stays optional.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "catalog.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn upstream_elapsed(service: &'static str, elapsed_ms: u128) {
    trace!(
        target = "catalog.metrics",
        service = service,
        elapsed_ms = elapsed_ms as u64,
        "upstream_elapsed"
    );
}
