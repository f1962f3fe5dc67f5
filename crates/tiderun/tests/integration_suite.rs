//! Integration tests for service-to-service calls over the memory broker.

mod common;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tiderpc::Call;
use tiderpc::CallChain;
use tiderpc::CallPath;
use tiderpc::IntoValue;
use tiderpc::Value;
use tiderun::AsyncRet;
use tiderun::Broker;
use tiderun::CallError;
use tiderun::DeliveryReliability;
use tiderun::Deliverer;
use tiderun::MemoryBroker;
use tiderun::MethodTable;
use tiderun::RpcConfig;
use tiderun::permission;

use common::Cluster;
use common::eventually;

fn answer_plugin() -> MethodTable {
    MethodTable::new()
        .method("answer", |_, ()| async { Ok(42i32) })
        .method("add", |_, (a, b): (i64, i64)| async move { Ok(a + b) })
        .method("boom", |_, ()| async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        })
        .method("slow", |_, ()| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
}

// --- Test 1: One-way entity call ---

#[tokio::test]
async fn test_one_way_entity_call_sends_no_reply() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let b = cluster.start(cluster.builder("beta", "b1")).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let rt = b.targets().add_runtime("rt1");
    let e1 = b.targets().add_entity("e1", &rt);
    let log = seen.clone();
    e1.add_component("c", MethodTable::new().method("m", move |_, (arg,): (String,)| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(arg);
            Ok(())
        }
    }));

    let mut spy = cluster.broker.subscribe(a.node_addr(), None).await?;
    a.rpc()
        .notify(b.node_addr(), &CallPath::entity("e1", "c", "m"), vec!["x".into_value()])
        .await?;

    assert!(eventually(|| seen.lock().unwrap().len() == 1).await);
    assert_eq!(*seen.lock().unwrap(), vec!["x".to_string()]);
    let reply = tokio::time::timeout(Duration::from_millis(50), spy.recv()).await;
    assert!(reply.is_err(), "one-way call produced a reply");
    assert_eq!(a.futures().pending(), 0);
    Ok(())
}

// --- Test 2: Correlated request ---

#[tokio::test]
async fn test_request_resolves_with_reply() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let b = cluster.start(cluster.builder("beta", "b1").service_plugin("calc", answer_plugin())).await;

    let pending = a.rpc().request(b.node_addr(), &CallPath::service("calc", "answer"), vec![]).await;
    assert_eq!(a.futures().pending(), 1);
    assert_eq!(pending.await?, vec![Value::I32(42)]);
    assert_eq!(a.futures().pending(), 0);

    let sum = a
        .rpc()
        .call(&b.balance_addr(), &CallPath::service("calc", "add"), vec![Value::U8(40), Value::I32(2)])
        .await?;
    assert_eq!(sum, vec![Value::I64(42)]);
    Ok(())
}

// --- Test 3: Remote errors keep their kind ---

#[tokio::test]
async fn test_remote_errors_surface_with_their_kind() {
    let cluster = Cluster::new();
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let b = cluster.start(cluster.builder("beta", "b1").service_plugin("calc", answer_plugin())).await;
    let call = |path: CallPath, args: Vec<Value>| {
        let rpc = a.rpc().clone();
        let dst = b.node_addr().to_string();
        async move { rpc.call(&dst, &path, args).await }
    };

    let err = call(CallPath::service("calc", "nope"), vec![]).await.unwrap_err();
    assert!(matches!(err, CallError::NotFound(_)), "{:?}", err);

    let err = call(CallPath::service("calc", "add"), vec![Value::I64(1)]).await.unwrap_err();
    assert!(matches!(err, CallError::TypeMismatch(_)), "{:?}", err);

    let err = call(CallPath::service("calc", "boom"), vec![]).await.unwrap_err();
    assert_eq!(err, CallError::Panicked("kaboom".into()));

    let err = call(CallPath::entity("ghost", "c", "m"), vec![]).await.unwrap_err();
    assert!(matches!(err, CallError::NotFound(_)), "{:?}", err);

    // The node survived the panic.
    assert_eq!(call(CallPath::service("calc", "answer"), vec![]).await, Ok(vec![Value::I32(42)]));
}

// --- Test 4: Deliverer ordering ---

struct Intercept {
    hits: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Deliverer for Intercept {
    fn matches(&self, dst: &str, _: &CallChain, _: &CallPath, _: bool) -> bool {
        dst.starts_with("service.lb.")
    }

    async fn request(&self, _: &CancellationToken, _: &str, _: CallChain, _: &CallPath, _: Vec<Value>) -> AsyncRet {
        self.hits.fetch_add(1, Ordering::SeqCst);
        AsyncRet::ready(Ok(vec![Value::String("intercepted".into())]))
    }

    async fn notify(&self, _: &str, _: CallChain, _: &CallPath, _: Vec<Value>) -> Result<(), CallError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_registered_deliverer_takes_priority() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let a = cluster
        .start(cluster.builder("alpha", "a1").deliverer(Arc::new(Intercept { hits: hits.clone() })))
        .await;
    let b = cluster.start(cluster.builder("beta", "b1").service_plugin("calc", answer_plugin())).await;

    let path = CallPath::service("calc", "answer");
    let ret = a.rpc().call(&b.balance_addr(), &path, vec![]).await?;
    assert_eq!(ret, vec![Value::String("intercepted".into())]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Node addresses fall through to the builtin service deliverer.
    assert_eq!(a.rpc().call(b.node_addr(), &path, vec![]).await?, vec![Value::I32(42)]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_unmatched_destination_is_undeliverable() {
    let cluster = Cluster::new();
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let path = CallPath::service("calc", "answer");

    let err = a.rpc().call("elsewhere.nd.x", &path, vec![]).await.unwrap_err();
    assert!(matches!(err, CallError::Undeliverable(_)));

    // Requests need a single responder.
    let err = a.rpc().call("service.bc.beta", &path, vec![]).await.unwrap_err();
    assert!(matches!(err, CallError::Undeliverable(_)));
    assert!(a.rpc().notify("service.bc.beta", &path, vec![]).await.is_ok());
}

// --- Test 5: Permission validation ---

fn client_chain() -> CallChain {
    CallChain::from_calls(vec![Call::new("gate", "client.nd.e1", "service.nd.gate.g1")])
}

#[tokio::test]
async fn test_client_calls_need_permission() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let closed = cluster.start(cluster.builder("beta", "b1").service_plugin("calc", answer_plugin())).await;
    let open = cluster
        .start(
            cluster
                .builder("gamma", "c1")
                .service_plugin("calc", answer_plugin())
                .validator(permission::validator(|_, path| path.method == "answer")),
        )
        .await;
    let ctx = CancellationToken::new();
    let answer = CallPath::service("calc", "answer");

    let err = a
        .rpc()
        .request_with(&ctx, closed.node_addr(), client_chain(), &answer, vec![])
        .await
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::PermissionDenied(_)), "{:?}", err);

    let ret = a.rpc().request_with(&ctx, open.node_addr(), client_chain(), &answer, vec![]).await.await?;
    assert_eq!(ret, vec![Value::I32(42)]);

    let add = CallPath::service("calc", "add");
    let err = a
        .rpc()
        .request_with(&ctx, open.node_addr(), client_chain(), &add, vec![Value::I64(1), Value::I64(2)])
        .await
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::PermissionDenied(_)));

    // Service-originated chains are never validated.
    let service_chain = CallChain::from_calls(vec![Call::new("alpha", a.node_addr(), "")]);
    let ret = a
        .rpc()
        .request_with(&ctx, closed.node_addr(), service_chain, &add, vec![Value::I64(1), Value::I64(2)])
        .await
        .await?;
    assert_eq!(ret, vec![Value::I64(3)]);
    Ok(())
}

// --- Test 6: Chain depth ---

#[tokio::test]
async fn test_overlong_chain_rejected_by_receiver() {
    let cluster = Cluster::new();
    let a = cluster
        .start(cluster.builder("alpha", "a1").config(RpcConfig::default().with_max_call_depth(64)))
        .await;
    let b = cluster.start(cluster.builder("beta", "b1").service_plugin("calc", answer_plugin())).await;

    let hop = Call::new("alpha", a.node_addr(), "");
    let chain = CallChain::from_calls(vec![hop; 17]);
    let err = a
        .rpc()
        .request_with(&CancellationToken::new(), b.node_addr(), chain, &CallPath::service("calc", "answer"), vec![])
        .await
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::ChainTooDeep(_)), "{:?}", err);
}

// --- Test 7: Timeouts, cancellation, shutdown ---

#[tokio::test]
async fn test_slow_target_times_out() {
    let cluster = Cluster::new();
    let a = cluster
        .start(
            cluster
                .builder("alpha", "a1")
                .config(RpcConfig::default().with_request_timeout(Duration::from_millis(50))),
        )
        .await;
    let b = cluster.start(cluster.builder("beta", "b1").service_plugin("calc", answer_plugin())).await;

    let err = a.rpc().call(b.node_addr(), &CallPath::service("calc", "slow"), vec![]).await;
    assert_eq!(err, Err(CallError::Timeout));
}

#[tokio::test]
async fn test_cancel_and_shutdown_end_pending_calls() {
    let cluster = Cluster::new();
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let b = cluster.start(cluster.builder("beta", "b1").service_plugin("calc", answer_plugin())).await;
    let slow = CallPath::service("calc", "slow");

    let ctx = CancellationToken::new();
    let cancelled = a.rpc().request_with(&ctx, b.node_addr(), CallChain::EMPTY, &slow, vec![]).await;
    ctx.cancel();
    assert_eq!(cancelled.await, Err(CallError::Cancelled));

    let pending = a.rpc().request(b.node_addr(), &slow, vec![]).await;
    a.shutdown();
    let ret = tokio::time::timeout(Duration::from_millis(200), pending).await.expect("closed promptly");
    assert_eq!(ret, Err(CallError::Closed));
}

// --- Test 8: Balance and broadcast ---

#[tokio::test]
async fn test_balance_spreads_over_nodes() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let mut nodes = Vec::new();
    for id in ["w1", "w2"] {
        let node = cluster.start(cluster.builder("worker", id)).await;
        let me = id.to_string();
        node.targets().add_service_plugin("who", MethodTable::new().method("am_i", move |_, ()| {
            let me = me.clone();
            async move { Ok(me) }
        }));
        nodes.push(node);
    }

    let mut seen = Vec::new();
    for _ in 0..4 {
        let ret = a.rpc().call("service.lb.worker", &CallPath::service("who", "am_i"), vec![]).await?;
        seen.push(ret);
    }
    seen.sort_by_key(|r| format!("{:?}", r));
    seen.dedup();
    assert_eq!(seen.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_broadcast_exclude_src_skips_sender() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let counts = Arc::new(Mutex::new(Vec::new()));
    let mut nodes = Vec::new();
    for id in ["g1", "g2"] {
        let node = cluster.start(cluster.builder("game", id)).await;
        let log = counts.clone();
        let me = id.to_string();
        node.targets().add_service_plugin("news", MethodTable::new().method("tick", move |_, ()| {
            let log = log.clone();
            let me = me.clone();
            async move {
                log.lock().unwrap().push(me);
                Ok(())
            }
        }));
        nodes.push(node);
    }

    let g1 = &nodes[0];
    g1.rpc().notify(&g1.broadcast_addr(), &CallPath::service("news", "tick"), vec![]).await?;
    assert!(eventually(|| counts.lock().unwrap().len() == 2).await);

    counts.lock().unwrap().clear();
    g1.rpc()
        .notify(&g1.broadcast_addr(), &CallPath::service("news", "tick").exclude_src(), vec![])
        .await?;
    assert!(eventually(|| counts.lock().unwrap().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(*counts.lock().unwrap(), vec!["g2".to_string()]);
    Ok(())
}

// --- Test 9: At-least-once delivery ---

#[tokio::test]
async fn test_duplicated_frames_execute_once() -> anyhow::Result<()> {
    let broker = MemoryBroker::new().with_reliability(DeliveryReliability::AtLeastOnce);
    broker.set_duplicate_delivery(true);
    let cluster = Cluster::with_broker(broker);
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let b = cluster.start(cluster.builder("beta", "b1").service_plugin("calc", answer_plugin())).await;

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    b.targets().add_service_plugin("count", MethodTable::new().method("hit", move |_, ()| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    for _ in 0..5 {
        a.rpc().notify(b.node_addr(), &CallPath::service("count", "hit"), vec![]).await?;
    }
    assert!(eventually(|| hits.load(Ordering::SeqCst) >= 5).await);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 5);

    // The duplicated reply resolves the future once and is otherwise ignored.
    let ret = a.rpc().call(b.node_addr(), &CallPath::service("calc", "answer"), vec![]).await?;
    assert_eq!(ret, vec![Value::I32(42)]);
    Ok(())
}

// --- Test 10: Runtime serialisation across entities ---

#[tokio::test]
async fn test_runtime_plugin_reached_through_entity() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let a = cluster.start(cluster.builder("alpha", "a1")).await;
    let b = cluster.start(cluster.builder("beta", "b1")).await;

    let rt = b.targets().add_runtime("rt1");
    rt.add_plugin("clock", MethodTable::new().method("owner", |ctx: tiderun::CallContext, ()| async move {
        Ok(ctx.entity_id().to_string())
    }));
    b.targets().add_entity("e7", &rt);

    let ret = a.rpc().call(b.node_addr(), &CallPath::runtime("e7", "clock", "owner"), vec![]).await?;
    assert_eq!(ret, vec![Value::String("e7".into())]);
    Ok(())
}

// --- Test 11: Restarted sender on an at-least-once broker ---

#[tokio::test]
async fn test_restarted_node_keeps_reaching_peers() -> anyhow::Result<()> {
    let cluster = Cluster::with_broker(MemoryBroker::new().with_reliability(DeliveryReliability::AtLeastOnce));
    let a = cluster.start(cluster.builder("alpha", "a1")).await;

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    a.targets().add_service_plugin("count", MethodTable::new().method("hit", move |_, ()| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    let b = cluster.start(cluster.builder("beta", "b1")).await;
    for _ in 0..3 {
        b.rpc().notify(a.node_addr(), &CallPath::service("count", "hit"), vec![]).await?;
    }
    assert!(eventually(|| hits.load(Ordering::SeqCst) == 3).await);
    b.shutdown();
    drop(b);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let b = cluster.start(cluster.builder("beta", "b1")).await;
    b.rpc().notify(a.node_addr(), &CallPath::service("count", "hit"), vec![]).await?;
    assert!(eventually(|| hits.load(Ordering::SeqCst) == 4).await);
    Ok(())
}
