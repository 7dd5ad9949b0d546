//! Liveness and readiness probes from an LRP health check

use k8s_openapi::api::core::v1::{HTTPGetAction, Probe, TCPSocketAction};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use berth_common::crd::{Healthcheck, HealthcheckKind};

const LIVENESS_FAILURE_THRESHOLD: i32 = 4;
const READINESS_FAILURE_THRESHOLD: i32 = 1;

/// Liveness probe; checks start once the startup timeout has passed
pub fn liveness_probe(health: &Healthcheck) -> Option<Probe> {
    let initial_delay = i32::try_from(health.timeout_ms / 1000).unwrap_or(i32::MAX);
    probe(health, initial_delay, LIVENESS_FAILURE_THRESHOLD)
}

/// Readiness probe; one failure takes the instance out of rotation
pub fn readiness_probe(health: &Healthcheck) -> Option<Probe> {
    probe(health, 0, READINESS_FAILURE_THRESHOLD)
}

fn probe(health: &Healthcheck, initial_delay: i32, failure_threshold: i32) -> Option<Probe> {
    let port = IntOrString::Int(health.port);
    let base = Probe {
        initial_delay_seconds: Some(initial_delay),
        failure_threshold: Some(failure_threshold),
        ..Default::default()
    };

    match health.kind() {
        HealthcheckKind::Http => Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(health.endpoint.clone()),
                port,
                ..Default::default()
            }),
            ..base
        }),
        HealthcheckKind::Port => Some(Probe {
            tcp_socket: Some(TCPSocketAction { port, host: None }),
            ..base
        }),
        HealthcheckKind::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(type_: &str) -> Healthcheck {
        Healthcheck {
            type_: type_.to_string(),
            port: 8080,
            endpoint: "/healthz".to_string(),
            timeout_ms: 3000,
        }
    }

    #[test]
    fn http_check_probes_endpoint() {
        let probe = liveness_probe(&health("http")).expect("http probe");

        let get = probe.http_get.expect("http get");
        assert_eq!(get.path.as_deref(), Some("/healthz"));
        assert_eq!(get.port, IntOrString::Int(8080));
        assert!(probe.tcp_socket.is_none());
        assert_eq!(probe.initial_delay_seconds, Some(3));
        assert_eq!(probe.failure_threshold, Some(4));
    }

    #[test]
    fn port_check_opens_a_socket() {
        let probe = readiness_probe(&health("port")).expect("tcp probe");

        assert_eq!(
            probe.tcp_socket.map(|s| s.port),
            Some(IntOrString::Int(8080))
        );
        assert!(probe.http_get.is_none());
        assert_eq!(probe.initial_delay_seconds, Some(0));
        assert_eq!(probe.failure_threshold, Some(1));
    }

    #[test]
    fn other_checks_have_no_probe() {
        assert!(liveness_probe(&health("process")).is_none());
        assert!(readiness_probe(&health("")).is_none());
    }
}
