//! Functions available to every output template

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use minijinja::value::{Rest, Value};
use minijinja::{Environment, Error, ErrorKind};

/// RFC 822 layout used by `now()`
pub const TIMESTAMP_FORMAT: &str = "%d %b %y %H:%M UTC";

type Clock = Arc<dyn Fn() -> String + Send + Sync>;

/// Function set registered on the template environment
///
/// Provides `now`, `decr`, `lower` and `mkMap`. Only the clock can be
/// replaced, which keeps rendering deterministic under test.
#[derive(Clone)]
pub struct FunctionSet {
    clock: Clock,
}

impl FunctionSet {
    /// Function set backed by the system clock
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Arc::new(|| Utc::now().format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Replace the source of `now()`
    #[must_use]
    pub fn with_clock(clock: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
        }
    }

    /// Register every function on `env`
    pub fn register(&self, env: &mut Environment<'static>) {
        let clock = Arc::clone(&self.clock);
        env.add_function("now", move || clock());
        env.add_function("decr", decr);
        env.add_function("lower", lower);
        env.add_function("mkMap", mk_map);
    }
}

impl Default for FunctionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FunctionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSet").finish_non_exhaustive()
    }
}

fn decr(value: i64) -> Result<i64, Error> {
    value.checked_sub(1).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("decr({value}) overflows"),
        )
    })
}

fn lower(value: String) -> String {
    value.to_lowercase()
}

/// Tokens that do not split into exactly `key` and `value` are skipped
fn mk_map(tokens: Rest<String>) -> Value {
    let map: BTreeMap<&str, &str> = tokens
        .iter()
        .filter_map(|token| {
            let mut parts = token.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Some((key, value)),
                _ => None,
            }
        })
        .collect();

    Value::from_serialize(&map)
}
