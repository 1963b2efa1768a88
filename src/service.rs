//! External service invocation (C5): a `Call` statement looks up a service by
//! name and hands it evaluated arguments. Failures never propagate — they are
//! encoded as an `{error: ...}` value so the script can branch on them like
//! any other result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::interpreter::ExecutionContext;
use crate::value::Value;

/// Implemented by anything a `Call` statement can invoke.
pub trait ServiceHandler: Send + Sync {
    fn call(&self, name: &str, args: &[Value], ctx: &ExecutionContext) -> Value;
}

type ServiceFn = Box<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Name-to-callable registry. Scripts never see the callables themselves,
/// only the names they were registered under.
pub struct DefaultServiceHandler {
    services: HashMap<String, ServiceFn>,
}

impl DefaultServiceHandler {
    pub fn new() -> Self {
        let mut handler = Self { services: HashMap::new() };
        handler.register_default_services();
        handler
    }

    pub fn register_service(&mut self, name: impl Into<String>, f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) {
        self.services.insert(name.into(), Box::new(f));
    }

    fn register_default_services(&mut self) {
        self.register_service("book_appointment", |args| {
            let department = args.first().map(Value::to_string).unwrap_or_default();
            let doctor = args.get(1).map(Value::to_string).unwrap_or_else(|| "Dr. Li".to_string());
            Value::Map(vec![
                ("order_id".into(), Value::String(format!("H{:04}", next_sequence() % 10_000))),
                ("department".into(), Value::String(department)),
                ("doctor".into(), Value::String(doctor)),
            ])
        });

        self.register_service("reserve_table", |args| {
            let party_size = args.first().and_then(Value::as_f64).unwrap_or(1.0) as i64;
            let time_slot = args.get(1).map(Value::to_string).unwrap_or_else(|| "19:00".to_string());
            Value::Map(vec![
                ("reservation_id".into(), Value::String(format!("D{:04}", next_sequence() % 10_000))),
                ("party_size".into(), Value::Int(party_size)),
                ("time_slot".into(), Value::String(time_slot)),
            ])
        });

        self.register_service("book_seats", |args| {
            let show = args.first().map(Value::to_string).unwrap_or_default();
            let quantity = args.get(1).and_then(Value::as_f64).unwrap_or(1.0) as i64;
            Value::Map(vec![
                ("ticket_id".into(), Value::String(format!("P{:04}", next_sequence() % 10_000))),
                ("show".into(), Value::String(show)),
                ("quantity".into(), Value::Int(quantity)),
            ])
        });
    }
}

impl Default for DefaultServiceHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceHandler for DefaultServiceHandler {
    fn call(&self, name: &str, args: &[Value], _ctx: &ExecutionContext) -> Value {
        match self.services.get(name) {
            Some(service) => service(args),
            None => Value::error(format!("unknown service: {name}")),
        }
    }
}

/// Monotonic counter for demo order numbers; deterministic, unlike a clock
/// read, so tests can assert exact IDs.
static SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Test double usable both by this crate's own unit tests and by downstream
/// integration tests that need a service handler without a real backend.
pub mod testutil {
    use super::*;
    use std::sync::Mutex;

    /// Service test double: records every call it receives and returns a
    /// pre-programmed value (or `Value::Null` if none was set for that name).
    pub struct MockServiceHandler {
        responses: HashMap<String, Value>,
        calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl MockServiceHandler {
        pub fn new() -> Self {
            Self { responses: HashMap::new(), calls: Mutex::new(Vec::new()) }
        }

        pub fn with_response(mut self, name: impl Into<String>, value: Value) -> Self {
            self.responses.insert(name.into(), value);
            self
        }

        pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Default for MockServiceHandler {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ServiceHandler for MockServiceHandler {
        fn call(&self, name: &str, args: &[Value], _ctx: &ExecutionContext) -> Value {
            self.calls.lock().unwrap().push((name.to_string(), args.to_vec()));
            self.responses.get(name).cloned().unwrap_or(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ExecutionContext;

    #[test]
    fn unknown_service_returns_error_value() {
        let handler = DefaultServiceHandler::new();
        let ctx = ExecutionContext::new("s1".to_string());
        let result = handler.call("nonexistent", &[], &ctx);
        match result {
            Value::Map(entries) => assert_eq!(entries[0].0, "error"),
            other => panic!("expected error map, got {other:?}"),
        }
    }

    #[test]
    fn hospital_booking_returns_structured_result() {
        let handler = DefaultServiceHandler::new();
        let ctx = ExecutionContext::new("s1".to_string());
        let result = handler.call("book_appointment", &[Value::String("Cardiology".into())], &ctx);
        match result {
            Value::Map(entries) => {
                assert!(entries.iter().any(|(k, _)| k == "order_id"));
                assert!(entries.iter().any(|(k, v)| k == "department" && *v == Value::String("Cardiology".into())));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn register_service_adds_a_callable() {
        let mut handler = DefaultServiceHandler::new();
        handler.register_service("echo", |args| args.first().cloned().unwrap_or(Value::Null));
        let ctx = ExecutionContext::new("s1".to_string());
        let result = handler.call("echo", &[Value::Int(7)], &ctx);
        assert_eq!(result, Value::Int(7));
    }
}
