use std::sync::Arc;

use displaydoc::Display;
use static_assertions::assert_impl_all;
use thiserror::Error;

use crate::configuration::Configuration;
use crate::configuration::ConfigurationError;
use crate::context::Context;
use crate::error::ExecutionAbort;
use crate::error::FieldError;
use crate::execution::Engine;
use crate::json_ext::Value;
use crate::request::Request;
use crate::resolvers::Resolvers;
use crate::response::ExecutionResult;
use crate::spec::PreparedQuery;
use crate::spec::Schema;
use crate::spec::SelectionTree;
use crate::trace::FieldService;
use crate::trace::TraceChain;
use crate::trace::TraceHook;

/// Error building an [`Executor`].
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum BuildError {
    /// no schema was provided
    MissingSchema,
    /// invalid configuration: {0}
    InvalidConfiguration(#[from] ConfigurationError),
}

/// Executes GraphQL requests against a schema and its resolvers.
///
/// Cheap to clone. Every run gets its own state, so one executor can serve any number of
/// runs, from any number of threads.
#[derive(Clone, Debug)]
pub struct Executor {
    engine: Arc<Engine>,
}

assert_impl_all!(Executor: Send, Sync);

impl Executor {
    /// Creates a new builder.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    /// Runs `requests` in one multiplex run sharing `shared` and one lazy queue.
    ///
    /// Results come back in request order. Errors that do not concern a single field
    /// abort the whole run, unless a hook isolates them.
    pub fn multiplex(
        &self,
        requests: Vec<Request>,
        shared: Context,
    ) -> Result<Vec<ExecutionResult>, ExecutionAbort> {
        self.engine.multiplex(&requests, shared)
    }

    /// Runs a single request, as a multiplex run of one.
    pub fn execute(&self, request: Request) -> Result<ExecutionResult, ExecutionAbort> {
        Ok(self
            .multiplex(vec![request], Context::new())?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Completes a prepared selection tree on `root_value`.
    ///
    /// Only field level hooks run. Query and multiplex phases do not.
    pub fn resolve(
        &self,
        root_value: Value,
        tree: Arc<SelectionTree>,
        context: Context,
    ) -> Result<ExecutionResult, ExecutionAbort> {
        self.engine.resolve(root_value, tree, context)
    }

    /// Parses, validates and selects the operation of `request`, without executing it.
    pub fn prepare(&self, request: &Request) -> Result<PreparedQuery, Vec<FieldError>> {
        self.engine.prepare(request)
    }

    pub fn schema(&self) -> &Schema {
        &self.engine.schema
    }

    pub fn configuration(&self) -> &Configuration {
        &self.engine.configuration
    }
}

/// Builder for an [`Executor`].
// Not using buildstructor because `hook` has non-trivial signature and behavior
#[derive(Default)]
pub struct ExecutorBuilder {
    schema: Option<Schema>,
    resolvers: Resolvers,
    configuration: Configuration,
    hooks: Vec<Arc<dyn TraceHook>>,
}

impl ExecutorBuilder {
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Adds a trace hook.
    ///
    /// May be called multiple times. The first hook added is the outermost layer.
    pub fn hook<H: TraceHook>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Adds a callback-based hook similar to [`TraceHook::execute_field`]
    pub fn field_hook(
        self,
        callback: impl Fn(FieldService) -> FieldService + Send + Sync + 'static,
    ) -> Self {
        self.hook(FieldServiceHook(callback))
    }

    pub fn build(self) -> Result<Executor, BuildError> {
        let schema = self.schema.ok_or(BuildError::MissingSchema)?;
        let configuration = self.configuration.validate()?;
        tracing::debug!(hooks = self.hooks.len(), "building executor");
        Ok(Executor {
            engine: Arc::new(Engine {
                schema,
                resolvers: self.resolvers,
                configuration,
                chain: TraceChain::new(self.hooks),
            }),
        })
    }
}

struct FieldServiceHook<F>(F);

impl<F> TraceHook for FieldServiceHook<F>
where
    F: Fn(FieldService) -> FieldService + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "field_hook"
    }

    fn execute_field(&self, service: FieldService) -> FieldService {
        (self.0)(service)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::lazy::FieldValue;

    fn executor() -> ExecutorBuilder {
        Executor::builder()
            .schema(Schema::parse("type Query { hello: String }").unwrap())
            .resolvers(Resolvers::new().field("Query", "hello", |_| Ok(json!("world").into())))
    }

    #[test]
    fn schema_is_required() {
        assert!(matches!(
            Executor::builder().build(),
            Err(BuildError::MissingSchema)
        ));
    }

    #[test]
    fn configuration_is_validated_at_build_time() {
        let mut configuration = Configuration::default();
        configuration.lazy.max_chain_length = 0;
        let error = executor()
            .configuration(configuration)
            .build()
            .unwrap_err();
        assert!(matches!(error, BuildError::InvalidConfiguration(_)));
        assert_eq!(
            error.to_string(),
            "invalid configuration: lazy.max_chain_length: must be greater than 0"
        );
    }

    #[test]
    fn execute_runs_a_single_request() {
        let result = executor()
            .build()
            .unwrap()
            .execute(Request::builder().query("{ hello }").build())
            .unwrap();
        insta::assert_json_snapshot!(result, @r#"
        {
          "data": {
            "hello": "world"
          }
        }
        "#);
    }

    #[test]
    fn field_hook_wraps_resolution() {
        let executor = executor()
            .field_hook(|service| {
                FieldService::new(move |request| {
                    let resolved = service.call(request)?;
                    match resolved {
                        FieldValue::Value(Value::String(s)) => {
                            Ok(json!(s.as_str().to_uppercase()).into())
                        }
                        other => Ok(other),
                    }
                })
            })
            .build()
            .unwrap();
        let result = executor
            .execute(Request::builder().query("{ hello }").build())
            .unwrap();
        assert_eq!(result.data, Some(json!({ "hello": "WORLD" })));
    }

    #[test]
    fn prepare_reports_document_errors() {
        let executor = executor().build().unwrap();
        let errors = executor
            .prepare(&Request::builder().query("{ hello").build())
            .unwrap_err();
        assert!(!errors.is_empty());
        assert_eq!(
            errors[0].extensions.get("code"),
            Some(&json!("GRAPHQL_VALIDATION_FAILED"))
        );

        let prepared = executor
            .prepare(&Request::builder().query("{ hello }").build())
            .unwrap();
        let result = executor
            .resolve(json!({}), prepared.tree().clone(), Context::new())
            .unwrap();
        assert_eq!(result.data, Some(json!({ "hello": "world" })));
    }
}
