//! # Method Tables
//!
//! The registration table standing in for reflective method lookup. A target
//! (service plugin, runtime plugin, entity component) is a `MethodTable`:
//! names mapped to async handlers that take typed arguments and return typed
//! results.
//!
//! ```rust,ignore
//! let bag = MethodTable::new()
//!     .method("add", |_ctx, (item, count): (String, u32)| async move {
//!         Ok(format!("{item} x{count}"))
//!     });
//! ```
//!
//! ## Invariants
//! - **Argument Fit**: the wire argument array must have exactly as many values
//!   as the handler's argument tuple, each converting through `FromValue`;
//!   otherwise the call fails with `TypeMismatch` before the handler runs.
//! - **Panic Containment**: a panicking handler yields `CallError::Panicked`;
//!   it never unwinds into the dispatcher.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;

use tiderpc::CallChain;
use tiderpc::CallPath;
use tiderpc::Fault;
use tiderpc::FromValue;
use tiderpc::IntoValue;
use tiderpc::Origin;
use tiderpc::Value;

use crate::error::CallError;
use crate::pending::Ret;

/// What a handler knows about the call it is serving.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Provenance of the call.
    pub chain: CallChain,
    /// The parsed target.
    pub path: CallPath,
    /// Sender of the envelope that carried the call.
    pub origin: Origin,
}

impl CallContext {
    pub fn new(chain: CallChain, path: CallPath, origin: Origin) -> Self {
        Self { chain, path, origin }
    }

    /// Entity the call is addressed to; empty for service calls.
    pub fn entity_id(&self) -> &str {
        &self.path.entity_id
    }
}

// ============================================================================
//  ARGUMENTS
// ============================================================================

/// Decodes a wire argument array into a handler's argument type.
pub trait FromArgs: Sized + Send + 'static {
    fn from_args(args: Vec<Value>) -> Result<Self, CallError>;
}

/// The raw argument array, for handlers that inspect values themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(pub Vec<Value>);

impl FromArgs for Args {
    fn from_args(args: Vec<Value>) -> Result<Self, CallError> {
        Ok(Args(args))
    }
}

fn arity(expected: usize, args: &[Value]) -> Result<(), CallError> {
    if args.len() != expected {
        return Err(CallError::TypeMismatch(format!(
            "expected {} arguments, got {}",
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn arg<T: FromValue>(args: &[Value], at: usize) -> Result<T, CallError> {
    T::from_value(&args[at]).map_err(|e| CallError::TypeMismatch(format!("argument {}: {}", at, e)))
}

impl FromArgs for () {
    fn from_args(args: Vec<Value>) -> Result<Self, CallError> {
        arity(0, &args)
    }
}

macro_rules! impl_from_args {
    ($n:expr; $($ty:ident => $idx:tt),+) => {
        impl<$($ty),+> FromArgs for ($($ty,)+)
        where
            $($ty: FromValue + Send + 'static),+
        {
            fn from_args(args: Vec<Value>) -> Result<Self, CallError> {
                arity($n, &args)?;
                Ok(($(arg::<$ty>(&args, $idx)?,)+))
            }
        }
    };
}

impl_from_args!(1; A => 0);
impl_from_args!(2; A => 0, B => 1);
impl_from_args!(3; A => 0, B => 1, C => 2);
impl_from_args!(4; A => 0, B => 1, C => 2, D => 3);
impl_from_args!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_from_args!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);

// ============================================================================
//  RESULTS
// ============================================================================

/// Encodes a handler's success value into the reply's return array.
pub trait IntoRets {
    fn into_rets(self) -> Vec<Value>;
}

/// A raw return array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rets(pub Vec<Value>);

impl IntoRets for Rets {
    fn into_rets(self) -> Vec<Value> {
        self.0
    }
}

impl IntoRets for () {
    fn into_rets(self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! impl_into_rets_single {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoRets for $ty {
                fn into_rets(self) -> Vec<Value> {
                    vec![self.into_value()]
                }
            }
        )*
    };
}

impl_into_rets_single!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64,
    String, &'static str, Bytes, Value, CallChain, Fault,
);

impl<T: IntoValue> IntoRets for Vec<T> {
    fn into_rets(self) -> Vec<Value> {
        vec![self.into_value()]
    }
}

impl<T: IntoValue> IntoRets for Option<T> {
    fn into_rets(self) -> Vec<Value> {
        vec![self.into_value()]
    }
}

impl<K: IntoValue, V: IntoValue> IntoRets for HashMap<K, V> {
    fn into_rets(self) -> Vec<Value> {
        vec![self.into_value()]
    }
}

macro_rules! impl_into_rets_tuple {
    ($($ty:ident => $idx:tt),+) => {
        impl<$($ty: IntoValue),+> IntoRets for ($($ty,)+) {
            fn into_rets(self) -> Vec<Value> {
                vec![$(self.$idx.into_value()),+]
            }
        }
    };
}

impl_into_rets_tuple!(A => 0);
impl_into_rets_tuple!(A => 0, B => 1);
impl_into_rets_tuple!(A => 0, B => 1, C => 2);
impl_into_rets_tuple!(A => 0, B => 1, C => 2, D => 3);

// ============================================================================
//  HANDLERS
// ============================================================================

/// A type-erased method.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: CallContext, args: Vec<Value>) -> BoxFuture<'static, Ret>;
}

/// Adapts an async closure with typed arguments into a `Handler`.
pub struct FnHandler<F, A> {
    f: F,
    _args: PhantomData<fn(A)>,
}

impl<F, A> FnHandler<F, A> {
    pub fn new(f: F) -> Self {
        Self { f, _args: PhantomData }
    }
}

impl<F, A, Fut, R> Handler for FnHandler<F, A>
where
    F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
    A: FromArgs,
    Fut: Future<Output = Result<R, CallError>> + Send + 'static,
    R: IntoRets + 'static,
{
    fn call(&self, ctx: CallContext, args: Vec<Value>) -> BoxFuture<'static, Ret> {
        let args = match A::from_args(args) {
            Ok(args) => args,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        let fut = (self.f)(ctx, args);
        Box::pin(async move { fut.await.map(IntoRets::into_rets) })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Named methods of one target.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, Arc<dyn Handler>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a typed async method, replacing any previous one of that name.
    pub fn method<F, A, Fut, R>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
        A: FromArgs,
        Fut: Future<Output = Result<R, CallError>> + Send + 'static,
        R: IntoRets + 'static,
    {
        self.methods.insert(name.into(), Arc::new(FnHandler::new(f)));
        self
    }

    /// Adds an already type-erased handler.
    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.methods.insert(name.into(), handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Runs `name`, turning a missing method or a panic into an error.
    pub async fn invoke(&self, name: &str, ctx: CallContext, args: Vec<Value>) -> Ret {
        let Some(handler) = self.methods.get(name).cloned() else {
            return Err(CallError::NotFound(format!("method {:?}", name)));
        };

        // The closure itself may panic before it produces a future.
        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(ctx, args))) {
            Ok(fut) => fut,
            Err(panic) => return Err(CallError::Panicked(panic_message(&*panic))),
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(ret) => ret,
            Err(panic) => Err(CallError::Panicked(panic_message(&*panic))),
        }
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("MethodTable").field("methods", &names).finish()
    }
}
