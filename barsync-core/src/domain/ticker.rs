//! Ticker: a resolved, provider-specific instrument handle.
//!
//! A ticker carries a copy of its provider's operation table so helpers such
//! as "save the symbol dictionary" can be invoked through the ticker without
//! the caller holding the provider.

use crate::data::provider::ProviderError;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type BoundFn = dyn Fn(&Ticker, &[Value]) -> Result<Value, ProviderError> + Send + Sync;
type FreeFn = dyn Fn(&[Value]) -> Result<Value, ProviderError> + Send + Sync;

/// A single forwarded provider operation.
#[derive(Clone)]
pub enum Operation {
    /// Takes the instrument as its first argument; the ticker is bound in.
    Bound(Arc<BoundFn>),
    /// Does not refer to any instrument; called with the arguments only.
    Free(Arc<FreeFn>),
}

impl Operation {
    pub fn bound<F>(f: F) -> Self
    where
        F: Fn(&Ticker, &[Value]) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        Self::Bound(Arc::new(f))
    }

    pub fn free<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        Self::Free(Arc::new(f))
    }

    pub fn takes_ticker(&self) -> bool {
        matches!(self, Self::Bound(_))
    }
}

/// Named operation table published by a provider.
#[derive(Clone, Default)]
pub struct Operations {
    table: IndexMap<String, Operation>,
}

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration; a later entry replaces an earlier one.
    pub fn with(mut self, name: impl Into<String>, op: Operation) -> Self {
        self.table.insert(name.into(), op);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.table.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Call `name` directly. Instrument-bound operations need `ticker`.
    pub fn call(
        &self,
        name: &str,
        ticker: Option<&Ticker>,
        args: &[Value],
    ) -> Result<Value, ProviderError> {
        match (self.table.get(name), ticker) {
            (Some(Operation::Bound(f)), Some(t)) => f(t, args),
            (Some(Operation::Bound(_)), None) => Err(ProviderError::UnsupportedOperation(
                format!("{name} needs an instrument"),
            )),
            (Some(Operation::Free(f)), _) => f(args),
            (None, _) => Err(ProviderError::UnsupportedOperation(name.to_string())),
        }
    }
}

impl fmt::Debug for Operations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Instrument handle produced by a provider's `find`.
#[derive(Debug, Clone)]
pub struct Ticker {
    pub symbol: String,
    pub metadata: IndexMap<String, Value>,
    operations: Operations,
}

impl Ticker {
    pub fn new(symbol: impl Into<String>, metadata: IndexMap<String, Value>) -> Self {
        Self {
            symbol: symbol.into(),
            metadata,
            operations: Operations::default(),
        }
    }

    /// Attach the owning provider's operation table.
    pub fn with_operations(mut self, operations: Operations) -> Self {
        self.operations = operations;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn operations(&self) -> &Operations {
        &self.operations
    }

    /// Invoke a forwarded operation by name.
    ///
    /// Operations that take the instrument receive this ticker; the others
    /// receive `args` only.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, ProviderError> {
        self.operations.call(name, Some(self), args)
    }
}

impl PartialEq for Ticker {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol && self.metadata == other.metadata
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)?;
        for (key, value) in &self.metadata {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_ticker() -> Ticker {
        let mut metadata = IndexMap::new();
        metadata.insert("market".to_string(), json!(14));
        let ops = Operations::new()
            .with(
                "describe",
                Operation::bound(|t, args| Ok(json!(format!("{}:{}", t.symbol, args.len())))),
            )
            .with("echo", Operation::free(|args| Ok(Value::Array(args.to_vec()))));
        Ticker::new("SPFB.RTS", metadata).with_operations(ops)
    }

    #[test]
    fn bound_operation_receives_ticker() {
        let t = sample_ticker();
        assert_eq!(t.invoke("describe", &[json!(1)]).unwrap(), json!("SPFB.RTS:1"));
    }

    #[test]
    fn free_operation_receives_args_only() {
        let t = sample_ticker();
        assert_eq!(
            t.invoke("echo", &[json!("a"), json!(2)]).unwrap(),
            json!(["a", 2])
        );
    }

    #[test]
    fn unknown_operation_is_unsupported() {
        let t = sample_ticker();
        match t.invoke("bogus", &[]) {
            Err(ProviderError::UnsupportedOperation(name)) => assert_eq!(name, "bogus"),
            other => panic!("expected UnsupportedOperation, got {other:?}"),
        }
    }

    #[test]
    fn operation_kinds() {
        let t = sample_ticker();
        assert!(t.operations().get("describe").unwrap().takes_ticker());
        assert!(!t.operations().get("echo").unwrap().takes_ticker());
        assert_eq!(t.operations().names().collect::<Vec<_>>(), ["describe", "echo"]);
    }

    #[test]
    fn direct_call_needs_ticker_for_bound_operations() {
        let ops = sample_ticker().operations().clone();
        assert_eq!(ops.call("echo", None, &[json!(1)]).unwrap(), json!([1]));
        assert!(matches!(
            ops.call("describe", None, &[]),
            Err(ProviderError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn display_includes_metadata() {
        assert_eq!(sample_ticker().to_string(), "SPFB.RTS market=14");
    }
}
