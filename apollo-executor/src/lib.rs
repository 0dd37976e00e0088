//! GraphQL execution core.
//!
//! Walks validated selection trees against host-provided resolvers, batches deferred
//! (lazy) work by selection depth, runs several queries through one shared resolution
//! pass, and lets hooks wrap every step of the way.
//!
//! ```ignore
//! let executor = Executor::builder()
//!     .schema(schema)
//!     .resolvers(Resolvers::new().field("Query", "hello", |_| Ok(json!("world").into())))
//!     .build()?;
//! let result = executor.execute(Request::builder().query("{ hello }").build())?;
//! ```

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod configuration;
mod context;
pub mod error;
mod execution;
mod executor;
pub mod json_ext;
pub mod lazy;
pub mod lookahead;
mod request;
pub mod resolvers;
mod response;
pub mod spec;
pub mod trace;

pub use crate::configuration::Configuration;
pub use crate::context::Context;
pub use crate::context::Extensions;
pub use crate::error::ExecutionAbort;
pub use crate::error::ExecutionError;
pub use crate::error::FieldError;
pub use crate::error::Location;
pub use crate::error::RaisedError;
pub use crate::error::ResolveError;
pub use crate::executor::BuildError;
pub use crate::executor::Executor;
pub use crate::executor::ExecutorBuilder;
pub use crate::lazy::FieldValue;
pub use crate::lazy::LazyValue;
pub use crate::lookahead::Lookahead;
pub use crate::request::Request;
pub use crate::resolvers::Extra;
pub use crate::resolvers::FieldDefinition;
pub use crate::resolvers::HandlerInfo;
pub use crate::resolvers::ResolveInfo;
pub use crate::resolvers::Resolvers;
pub use crate::response::ExecutionResult;
pub use crate::spec::PreparedQuery;
pub use crate::spec::Schema;
pub use crate::spec::SelectionTree;
pub use crate::trace::TraceHook;
