//! Pod identity helper (§10.7), grounded on the `POD_NAME`-preferring lookup
//! used for the Kafka consumer group suffix and structured log fields.

/// Prefers the downward-API `POD_NAME` env var (set by the Kubernetes pod
/// spec); falls back to the kernel hostname when running outside a pod.
pub fn pod_identity() -> String {
    std::env::var("POD_NAME")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()))
        .unwrap_or_else(|| "unknown-pod".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn pod_name_env_var_takes_precedence() {
        std::env::set_var("POD_NAME", "ws-gateway-7f8");
        assert_eq!(pod_identity(), "ws-gateway-7f8");
        std::env::remove_var("POD_NAME");
    }

    #[test]
    #[serial]
    fn falls_back_to_kernel_hostname_when_unset() {
        std::env::remove_var("POD_NAME");
        let identity = pod_identity();
        assert!(!identity.is_empty());
    }
}
