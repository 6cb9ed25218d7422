//! Prometheus metrics for the gateway, exposed via `GET /metrics`.
//!
//! A process-global `Registry` plus `LazyLock` statics registered against
//! it.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Tickets issued, labeled by outcome is not tracked here (issuance always succeeds
/// once validated); consumption outcomes are tracked separately.
pub static TICKETS_ISSUED_TOTAL: std::sync::LazyLock<prometheus::IntCounter> =
    std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "tty_agent_tickets_issued_total",
            "Total number of WebSocket tickets issued",
            REGISTRY.clone()
        )
        .expect("failed to register tty_agent_tickets_issued_total")
    });

/// Ticket consumption attempts, labeled by outcome ("ok", "invalid", "used", "expired").
pub static TICKETS_CONSUMED_TOTAL: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            Opts::new(
                "tty_agent_tickets_consumed_total",
                "Ticket consumption attempts by outcome"
            ),
            &["outcome"],
            REGISTRY.clone()
        )
        .expect("failed to register tty_agent_tickets_consumed_total")
    });

/// Sessions currently open, by state.
pub static SESSIONS_ACTIVE: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "tty_agent_sessions_active",
        "Number of WebSocket sessions currently open",
        REGISTRY.clone()
    )
    .expect("failed to register tty_agent_sessions_active")
});

/// Exec attach attempts, labeled by outcome ("started", "no_shell", "failed").
pub static EXEC_ATTACH_TOTAL: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        Opts::new("tty_agent_exec_attach_total", "Exec attach attempts by outcome"),
        &["outcome"],
        REGISTRY.clone()
    )
    .expect("failed to register tty_agent_exec_attach_total")
});

/// Sessions closed, labeled by close code.
pub static SESSIONS_CLOSED_TOTAL: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            Opts::new("tty_agent_sessions_closed_total", "Sessions closed by close code"),
            &["close_code"],
            REGISTRY.clone()
        )
        .expect("failed to register tty_agent_sessions_closed_total")
    });

/// Render the current registry in Prometheus text exposition format.
pub fn render() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("prometheus text encoding should not fail");
    String::from_utf8(buffer).expect("prometheus output should be utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metrics() {
        SESSIONS_ACTIVE.set(2);
        let output = render();
        assert!(output.contains("tty_agent_sessions_active"));
    }
}
