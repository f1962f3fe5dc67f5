//! # Local Targets
//!
//! Where an inbound call ends up on this node, keyed by call path category:
//!
//! - **Service**: a service plugin, looked up by plugin name. Calls run
//!   concurrently.
//! - **Runtime**: a plugin of the runtime hosting the path's entity.
//! - **Entity**: a component of the path's entity.
//!
//! ## Invariants
//! - **Runtime Serialisation**: every call into a runtime, whether to one of
//!   its plugins or to any entity it hosts, holds that runtime's lock for the
//!   duration of the handler. Calls into different runtimes run in parallel.
//!   A handler that awaits a call back into its own runtime, directly or via
//!   RPC through another node, waits on the lock it holds and only returns
//!   once that inner call times out; use a one-way call for such re-entry.
//! - A lookup miss at any level is `NotFound`; a `Client` path is
//!   `InvalidPath` since clients are never hosted on a service node.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use tiderpc::Category;
use tiderpc::Value;

use crate::error::CallError;
use crate::handler::CallContext;
use crate::handler::MethodTable;
use crate::pending::Ret;

/// A single-threaded execution context hosting plugins and entities.
///
/// Calls into one runtime are serialised, including calls the running
/// handler itself awaits, so a handler must not wait on its own runtime.
#[derive(Debug)]
pub struct LocalRuntime {
    id: String,
    plugins: DashMap<String, Arc<MethodTable>>,
    lock: Mutex<()>,
}

impl LocalRuntime {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugins: DashMap::new(),
            lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_plugin(&self, name: impl Into<String>, table: MethodTable) {
        self.plugins.insert(name.into(), Arc::new(table));
    }

    fn plugin(&self, name: &str) -> Option<Arc<MethodTable>> {
        self.plugins.get(name).map(|p| p.clone())
    }

    async fn run(&self, table: &MethodTable, ctx: CallContext, args: Vec<Value>) -> Ret {
        let method = ctx.path.method.clone();
        let _guard = self.lock.lock().await;
        table.invoke(&method, ctx, args).await
    }
}

/// An entity and its components, living inside one runtime.
#[derive(Debug)]
pub struct LocalEntity {
    id: String,
    runtime: Arc<LocalRuntime>,
    components: DashMap<String, Arc<MethodTable>>,
}

impl LocalEntity {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn runtime(&self) -> &Arc<LocalRuntime> {
        &self.runtime
    }

    pub fn add_component(&self, name: impl Into<String>, table: MethodTable) {
        self.components.insert(name.into(), Arc::new(table));
    }

    fn component(&self, name: &str) -> Option<Arc<MethodTable>> {
        self.components.get(name).map(|c| c.clone())
    }
}

/// Every invocable target on this node.
#[derive(Debug, Default)]
pub struct Targets {
    services: DashMap<String, Arc<MethodTable>>,
    runtimes: DashMap<String, Arc<LocalRuntime>>,
    entities: DashMap<String, Arc<LocalEntity>>,
}

impl Targets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service_plugin(&self, name: impl Into<String>, table: MethodTable) {
        self.services.insert(name.into(), Arc::new(table));
    }

    pub fn add_runtime(&self, id: impl Into<String>) -> Arc<LocalRuntime> {
        let runtime = Arc::new(LocalRuntime::new(id));
        self.runtimes.insert(runtime.id.clone(), runtime.clone());
        runtime
    }

    pub fn runtime(&self, id: &str) -> Option<Arc<LocalRuntime>> {
        self.runtimes.get(id).map(|r| r.clone())
    }

    /// Creates `entity_id` inside `runtime`, replacing any entity of that id.
    pub fn add_entity(&self, entity_id: impl Into<String>, runtime: &Arc<LocalRuntime>) -> Arc<LocalEntity> {
        let entity = Arc::new(LocalEntity {
            id: entity_id.into(),
            runtime: runtime.clone(),
            components: DashMap::new(),
        });
        self.entities.insert(entity.id.clone(), entity.clone());
        entity
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<LocalEntity>> {
        self.entities.get(entity_id).map(|e| e.clone())
    }

    pub fn remove_entity(&self, entity_id: &str) -> Option<Arc<LocalEntity>> {
        self.entities.remove(entity_id).map(|(_, e)| e)
    }

    fn entity_or_missing(&self, entity_id: &str) -> Result<Arc<LocalEntity>, CallError> {
        self.entity(entity_id)
            .ok_or_else(|| CallError::NotFound(format!("entity {:?}", entity_id)))
    }

    /// Resolves `ctx.path` to a local target and runs it.
    pub async fn invoke(&self, ctx: CallContext, args: Vec<Value>) -> Ret {
        let path = &ctx.path;
        match path.category {
            Category::Service => {
                let table = self
                    .services
                    .get(&path.plugin)
                    .map(|t| t.clone())
                    .ok_or_else(|| CallError::NotFound(format!("service plugin {:?}", path.plugin)))?;
                let method = path.method.clone();
                table.invoke(&method, ctx, args).await
            }
            Category::Runtime => {
                let entity = self.entity_or_missing(&path.entity_id)?;
                let runtime = entity.runtime.clone();
                let table = runtime.plugin(&path.plugin).ok_or_else(|| {
                    CallError::NotFound(format!("runtime plugin {:?} in {}", path.plugin, runtime.id))
                })?;
                runtime.run(&table, ctx, args).await
            }
            Category::Entity => {
                let entity = self.entity_or_missing(&path.entity_id)?;
                let table = entity.component(&path.component).ok_or_else(|| {
                    CallError::NotFound(format!("component {:?} of {}", path.component, entity.id))
                })?;
                entity.runtime.run(&table, ctx, args).await
            }
            Category::Client => Err(CallError::InvalidPath(format!(
                "client path {} cannot be served by a service node",
                path
            ))),
        }
    }
}
