//! Runtime tunables shared by every component of a node.

use std::time::Duration;

/// Configuration for one node's RPC machinery.
///
/// Built with `RpcConfig::default()` and adjusted through the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// How long a request waits for its reply.
    pub request_timeout: Duration,
    /// Longest call chain a node accepts or extends.
    pub max_call_depth: usize,
    /// Root of all service addresses.
    pub service_domain: String,
    /// Root of all client addresses.
    pub client_domain: String,
    /// Address segment separator.
    pub separator: char,
    /// Service name of the gates relaying client traffic.
    pub gate_service: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            max_call_depth: 16,
            service_domain: "service".into(),
            client_domain: "client".into(),
            separator: '.',
            gate_service: "gate".into(),
        }
    }
}

impl RpcConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_service_domain(mut self, domain: impl Into<String>) -> Self {
        self.service_domain = domain.into();
        self
    }

    pub fn with_client_domain(mut self, domain: impl Into<String>) -> Self {
        self.client_domain = domain.into();
        self
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_gate_service(mut self, name: impl Into<String>) -> Self {
        self.gate_service = name.into();
        self
    }
}
