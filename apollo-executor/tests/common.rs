#![allow(dead_code)]

use std::sync::Arc;

use apollo_executor::Executor;
use apollo_executor::ExecutorBuilder;
use apollo_executor::Schema;
use apollo_executor::TraceHook;
use apollo_executor::error::BoxError;
use apollo_executor::trace::MultiplexInfo;
use apollo_executor::trace::QueryInfo;
use parking_lot::Mutex;

pub const SDL: &str = r#"
    type Query {
      f1(a1: Int): String
      findX(kind: String, first: Int): [Bird!]!
      users: [User!]!
      legacy: Legacy
      slow: Int
      fast: Int
      broken: String
      items: [String]
    }
    type Mutation { increment: Int! }
    type Bird { name: String wingspan: Int habitat: String }
    type User { id: ID! name: String friend: User }
    type Legacy { value: Int nested: Legacy }
"#;

macro_rules! assert_eq_and_ordered {
    ($a:expr, $b:expr $(,)?) => {
        match (&$a, &$b) {
            (a, b) => assert!(
                apollo_executor::json_ext::ValueExt::eq_and_ordered(a, b),
                "assertion failed: objects are not the same:\
                \n\nleft: {}\n\nright: {}\n",
                serde_json::to_string_pretty(a).unwrap(),
                serde_json::to_string_pretty(b).unwrap(),
            ),
        }
    };
}
pub(crate) use assert_eq_and_ordered;

pub fn builder() -> ExecutorBuilder {
    Executor::builder().schema(Schema::parse(SDL).unwrap())
}

pub type Log = Arc<Mutex<Vec<String>>>;

/// Records every phase it sees.
pub struct Recorder {
    pub name: &'static str,
    pub log: Log,
    /// Index of a query whose `before_query` fails
    pub refuse: Option<usize>,
    /// Index of a query whose `after_query` fails
    pub fail_after: Option<usize>,
}

impl Recorder {
    pub fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
            refuse: None,
            fail_after: None,
        }
    }

    fn record(&self, event: String) {
        self.log.lock().push(format!("{} {event}", self.name));
    }
}

impl TraceHook for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn before_multiplex(&self, info: &MultiplexInfo<'_>) -> Result<(), BoxError> {
        self.record(format!("before_multiplex {}", info.query_count));
        Ok(())
    }

    fn after_multiplex(&self, _info: &MultiplexInfo<'_>) -> Result<(), BoxError> {
        self.record("after_multiplex".to_string());
        Ok(())
    }

    fn before_query(&self, info: &QueryInfo<'_>) -> Result<(), BoxError> {
        self.record(format!("before_query {}", info.index));
        if self.refuse == Some(info.index) {
            return Err(format!("{} refused query {}", self.name, info.index).into());
        }
        Ok(())
    }

    fn after_query(&self, info: &QueryInfo<'_>) -> Result<(), BoxError> {
        self.record(format!("after_query {}", info.index));
        if self.fail_after == Some(info.index) {
            return Err(format!("{} failed after query {}", self.name, info.index).into());
        }
        Ok(())
    }
}

/// Entries of `log` that are hook phases, in order.
pub fn phases(log: &Log) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|entry| entry.contains("_query") || entry.contains("_multiplex"))
        .cloned()
        .collect()
}
