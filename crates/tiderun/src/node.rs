//! # Node Assembly
//!
//! Wires one service node together: network, futures, targets, the outbound
//! deliverer list and the inbound dispatcher list, plus gate forwarding when
//! the node holds client sessions.
//!
//! ```rust,ignore
//! let node = NodeBuilder::new("game", "n1")
//!     .broker(broker)
//!     .locator(locator)
//!     .service_plugin("bag", bag_methods)
//!     .build()?;
//! node.start().await?;
//! ```
//!
//! ## Pipelines
//!
//! | direction | order                                                     |
//! |-----------|-----------------------------------------------------------|
//! | outbound  | extra deliverers, `ServiceDeliverer`, `ForwardDeliverer`  |
//! | inbound   | extra dispatchers, `GateOutbound` (gates only), `ServiceDispatcher` |
//!
//! ## Subscriptions
//!
//! `start()` subscribes the service's broadcast address, its balance address
//! (as a queue group named after the service), and the node's own address.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use tiderpc::Codec;
use tiderpc::MsgRegistry;

use crate::address::NodeDetails;
use crate::broker::Broker;
use crate::config::RpcConfig;
use crate::deliverer::Deliverer;
use crate::deliverer::ForwardDeliverer;
use crate::deliverer::ServiceDeliverer;
use crate::dispatcher::Dispatcher;
use crate::dispatcher::ServiceDispatcher;
use crate::error::CallError;
use crate::gate::GateInbound;
use crate::gate::GateOutbound;
use crate::gate::ReplyOwners;
use crate::gate::SessionRouter;
use crate::handler::MethodTable;
use crate::locator::DistNode;
use crate::locator::EntityLocator;
use crate::net::Dispatchers;
use crate::net::Network;
use crate::pending::Futures;
use crate::permission::Permission;
use crate::permission::PermissionValidator;
use crate::rpc::Rpc;
use crate::target::Targets;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    MissingBroker,
    MissingLocator,
    /// A service name or node id that is empty or contains the separator.
    InvalidName(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBroker => write!(f, "No broker configured"),
            Self::MissingLocator => write!(f, "No entity locator configured"),
            Self::InvalidName(name) => write!(f, "Invalid name: {:?}", name),
        }
    }
}

impl std::error::Error for BuildError {}

/// Fluent builder for a `Node`.
pub struct NodeBuilder {
    service: String,
    node_id: String,
    broker: Option<Arc<dyn Broker>>,
    locator: Option<Arc<dyn EntityLocator>>,
    config: RpcConfig,
    validator: Option<PermissionValidator>,
    registry: Option<Arc<MsgRegistry>>,
    plugins: Vec<(String, MethodTable)>,
    deliverers: Vec<Arc<dyn Deliverer>>,
    dispatchers: Vec<Arc<dyn Dispatcher>>,
    sessions: Option<Arc<dyn SessionRouter>>,
}

impl NodeBuilder {
    pub fn new(service: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            node_id: node_id.into(),
            broker: None,
            locator: None,
            config: RpcConfig::default(),
            validator: None,
            registry: None,
            plugins: Vec::new(),
            deliverers: Vec::new(),
            dispatchers: Vec::new(),
            sessions: None,
        }
    }

    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn locator(mut self, locator: Arc<dyn EntityLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    /// Decides which client-originated calls may run. Without one, none may.
    pub fn validator(mut self, validator: PermissionValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Shares a message registry, e.g. one holding custom messages.
    pub fn registry(mut self, registry: Arc<MsgRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn service_plugin(mut self, name: impl Into<String>, table: MethodTable) -> Self {
        self.plugins.push((name.into(), table));
        self
    }

    /// Adds a deliverer consulted before the builtin ones.
    pub fn deliverer(mut self, deliverer: Arc<dyn Deliverer>) -> Self {
        self.deliverers.push(deliverer);
        self
    }

    /// Adds a dispatcher consulted before the builtin ones.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatchers.push(dispatcher);
        self
    }

    /// Makes the node a gate for the sessions in `sessions`.
    pub fn sessions(mut self, sessions: Arc<dyn SessionRouter>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    fn check_name(&self, name: &str) -> Result<(), BuildError> {
        if name.is_empty() || name.contains(self.config.separator) {
            return Err(BuildError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    pub fn build(self) -> Result<Node, BuildError> {
        self.check_name(&self.service)?;
        self.check_name(&self.node_id)?;
        let broker = self.broker.ok_or(BuildError::MissingBroker)?;
        let locator = self.locator.ok_or(BuildError::MissingLocator)?;
        let config = self.config;

        let service_details = NodeDetails::new(config.service_domain.as_str(), config.separator);
        let client_details = NodeDetails::new(config.client_domain.as_str(), config.separator);
        let node_addr = service_details.node_addr(&self.service, &self.node_id);

        let registry = self.registry.unwrap_or_else(|| Arc::new(MsgRegistry::with_builtins()));
        let net = Arc::new(Network::new(broker, Codec::new(registry), self.service.as_str(), node_addr.as_str()));
        let cancel = CancellationToken::new();
        let futures = Futures::new();

        let targets = Arc::new(Targets::new());
        for (name, table) in self.plugins {
            targets.add_service_plugin(name, table);
        }

        let mut deliverers = self.deliverers;
        deliverers.push(Arc::new(ServiceDeliverer::new(
            net.clone(),
            futures.clone(),
            service_details.clone(),
            config.request_timeout,
        )));
        deliverers.push(Arc::new(ForwardDeliverer::new(
            net.clone(),
            futures.clone(),
            locator.clone(),
            client_details.clone(),
            service_details.clone(),
            config.gate_service.as_str(),
            config.request_timeout,
        )));

        let mut dispatchers = self.dispatchers;
        let mut gate = None;
        let mut gate_futures = None;
        if let Some(sessions) = self.sessions {
            let relay_futures = Futures::new();
            let owners = ReplyOwners::default();
            dispatchers.push(Arc::new(GateOutbound::new(
                net.clone(),
                sessions.clone(),
                relay_futures.clone(),
                owners.clone(),
                client_details.clone(),
                config.request_timeout,
                cancel.child_token(),
            )));
            gate = Some(GateInbound::new(
                net.clone(),
                sessions,
                locator,
                relay_futures.clone(),
                owners,
                config.gate_service.as_str(),
            ));
            gate_futures = Some(relay_futures);
        }
        dispatchers.push(Arc::new(ServiceDispatcher::new(
            net.clone(),
            targets.clone(),
            futures.clone(),
            Permission::new(self.validator, client_details.clone()),
            service_details.clone(),
            config.max_call_depth,
        )));

        let rpc = Rpc::new(deliverers, config.clone(), cancel.child_token());

        Ok(Node {
            service: self.service,
            node_id: self.node_id,
            config,
            service_details,
            client_details,
            net,
            futures,
            targets,
            rpc,
            dispatchers: Arc::from(dispatchers),
            cancel,
            gate,
            gate_futures,
            started: AtomicBool::new(false),
        })
    }
}

/// One running service node.
pub struct Node {
    service: String,
    node_id: String,
    config: RpcConfig,
    service_details: NodeDetails,
    client_details: NodeDetails,
    net: Arc<Network>,
    futures: Futures,
    targets: Arc<Targets>,
    rpc: Rpc,
    dispatchers: Dispatchers,
    cancel: CancellationToken,
    gate: Option<GateInbound>,
    gate_futures: Option<Futures>,
    started: AtomicBool,
}

impl Node {
    /// Subscribes the node's addresses and starts their pumps. Idempotent.
    pub async fn start(&self) -> Result<(), CallError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let broadcast = self.service_details.broadcast_addr(&self.service);
        let balance = self.service_details.balance_addr(&self.service);
        for (topic, queue) in [
            (broadcast.as_str(), None),
            (balance.as_str(), Some(self.service.as_str())),
            (self.net.addr(), None),
        ] {
            self.serve(topic, queue).await?;
        }
        tracing::debug!(service = %self.service, node = %self.node_id, "node started");
        Ok(())
    }

    /// Joins a service-domain multicast group.
    pub async fn join_multicast(&self, group: &str) -> Result<(), CallError> {
        let topic = self.service_details.multicast_addr(group);
        self.serve(&topic, None).await
    }

    async fn serve(&self, topic: &str, queue: Option<&str>) -> Result<(), CallError> {
        let sub = self.net.subscribe(topic, queue).await?;
        self.net.serve(sub, self.dispatchers.clone(), self.cancel.child_token());
        Ok(())
    }

    /// Stops every pump and terminates all pending calls with `Closed`.
    pub fn shutdown(&self) {
        self.futures.close();
        if let Some(futures) = &self.gate_futures {
            futures.close();
        }
        self.cancel.cancel();
        tracing::debug!(service = %self.service, node = %self.node_id, "node shut down");
    }

    pub fn rpc(&self) -> &Rpc {
        &self.rpc
    }

    pub fn targets(&self) -> &Arc<Targets> {
        &self.targets
    }

    pub fn futures(&self) -> &Futures {
        &self.futures
    }

    /// The gate entry point, if this node holds sessions.
    pub fn gate(&self) -> Option<&GateInbound> {
        self.gate.as_ref()
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_addr(&self) -> &str {
        self.net.addr()
    }

    pub fn balance_addr(&self) -> String {
        self.service_details.balance_addr(&self.service)
    }

    pub fn broadcast_addr(&self) -> String {
        self.service_details.broadcast_addr(&self.service)
    }

    pub fn service_details(&self) -> &NodeDetails {
        &self.service_details
    }

    pub fn client_details(&self) -> &NodeDetails {
        &self.client_details
    }

    /// This node as an entity locator records it.
    pub fn dist_node(&self) -> DistNode {
        DistNode::new(&self.service_details, &self.service, &self.node_id)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("service", &self.service)
            .field("node_id", &self.node_id)
            .field("gate", &self.gate.is_some())
            .finish()
    }
}
