//! Permission checks for calls that entered the cluster from a client.
//!
//! Only calls whose first hop was recorded in the client domain are
//! validated; service-to-service traffic is trusted. With no validator
//! installed every client call is rejected.

use std::sync::Arc;

use tiderpc::CallChain;
use tiderpc::CallPath;

use crate::address::NodeDetails;
use crate::error::CallError;

/// A predicate deciding whether a client-originated call may run.
pub type PermissionValidator = Arc<dyn Fn(&CallChain, &CallPath) -> bool + Send + Sync>;

/// Wraps a closure as a validator.
pub fn validator(f: impl Fn(&CallChain, &CallPath) -> bool + Send + Sync + 'static) -> PermissionValidator {
    Arc::new(f)
}

pub fn allow_all() -> PermissionValidator {
    validator(|_, _| true)
}

pub fn deny_all() -> PermissionValidator {
    validator(|_, _| false)
}

#[derive(Clone)]
pub struct Permission {
    validator: PermissionValidator,
    client: NodeDetails,
}

impl Permission {
    pub fn new(validator: Option<PermissionValidator>, client: NodeDetails) -> Self {
        Self { validator: validator.unwrap_or_else(deny_all), client }
    }

    /// True if the chain's first hop came from a client.
    pub fn is_client_call(&self, chain: &CallChain) -> bool {
        chain.first().is_some_and(|call| self.client.in_domain(&call.addr))
    }

    pub fn check(&self, chain: &CallChain, path: &CallPath) -> Result<(), CallError> {
        if !self.is_client_call(chain) || (self.validator)(chain, path) {
            return Ok(());
        }
        let from = chain.first().map(|c| c.addr.as_str()).unwrap_or_default();
        Err(CallError::PermissionDenied(format!("{} from {}", path, from)))
    }
}

impl std::fmt::Debug for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permission").field("client", &self.client.domain).finish()
    }
}
