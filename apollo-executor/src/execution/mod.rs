//! Runs queries against the resolvers.
//!
//! A multiplex run starts every query in turn, each resolving as far as it can without
//! settling lazy values. Lazy work of all the queries lands in one queue and is then
//! settled shallowest depth first, so that a data loader sees every key requested at a
//! depth before the first of them is needed.

mod result;
mod runtime;
mod stack;

use std::sync::Arc;

use tracing::field;

use self::runtime::Pending;
use self::runtime::QueryRun;
use self::runtime::Runtime;
use crate::configuration::Configuration;
use crate::context::Context;
use crate::error::ExecutionAbort;
use crate::error::FieldError;
use crate::json_ext::Value;
use crate::lazy::LazyQueue;
use crate::request::Request;
use crate::resolvers::Resolvers;
use crate::response::ExecutionResult;
use crate::spec::PreparedQuery;
use crate::spec::Schema;
use crate::spec::SelectionTree;
use crate::trace::MultiplexInfo;
use crate::trace::QueryInfo;
use crate::trace::QueryOutcome;
use crate::trace::QueryRequest;
use crate::trace::Scope;
use crate::trace::StartQuery;
use crate::trace::TraceChain;

/// Everything a run needs that does not change between runs.
#[derive(Debug)]
pub(crate) struct Engine {
    pub(crate) schema: Schema,
    pub(crate) resolvers: Resolvers,
    pub(crate) configuration: Configuration,
    pub(crate) chain: TraceChain,
}

impl Engine {
    pub(crate) fn prepare(&self, request: &Request) -> Result<PreparedQuery, Vec<FieldError>> {
        PreparedQuery::parse(
            &self.schema,
            &request.query,
            request.operation_name.as_deref(),
            &request.variables,
            &self.configuration,
        )
        .map_err(|error| {
            tracing::debug!(%error, "query could not be prepared");
            error.into_field_errors()
        })
    }

    /// Runs `requests` as one multiplex run.
    ///
    /// Results are aligned with `requests`. An aborted query fails the whole run unless a
    /// hook isolates it.
    pub(crate) fn multiplex(
        &self,
        requests: &[Request],
        shared: Context,
    ) -> Result<Vec<ExecutionResult>, ExecutionAbort> {
        let span = tracing::info_span!("multiplex", query_count = requests.len());
        span.in_scope(|| self.run_multiplex(requests, shared))
    }

    fn run_multiplex(
        &self,
        requests: &[Request],
        shared: Context,
    ) -> Result<Vec<ExecutionResult>, ExecutionAbort> {
        let info = MultiplexInfo {
            query_count: requests.len(),
            shared: &shared,
        };
        self.chain.begin(Scope::Multiplex(&info))?;

        let infos: Vec<QueryInfo<'_>> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| QueryInfo {
                index,
                query: &request.query,
                operation_name: request.operation_name.as_deref(),
                context: &request.context,
                shared: &shared,
            })
            .collect();

        let mut batch = Batch::new(self, shared.clone(), requests.len());
        let mut began = vec![false; requests.len()];
        for (index, request) in requests.iter().enumerate() {
            let span = tracing::debug_span!(
                "query",
                query_index = index,
                operation_kind = field::Empty
            );
            span.in_scope(|| match self.chain.begin(Scope::Query(&infos[index])) {
                Ok(()) => {
                    began[index] = true;
                    batch.run_query(index, request);
                }
                Err(abort) => batch.abort(index, abort),
            });
        }

        batch.drain();
        let mut results = batch.finish();

        for (index, info) in infos.iter().enumerate() {
            if !began[index] {
                continue;
            }
            if let Err(abort) = self.chain.end(Scope::Query(info)) {
                if results[index].is_ok() {
                    results[index] = Err(abort);
                } else {
                    tracing::debug!(%abort, "teardown error after abort swallowed");
                }
            }
        }
        let after = self.chain.end(Scope::Multiplex(&info));

        let mut output = Vec::with_capacity(results.len());
        let mut failure = None;
        for (result, info) in results.into_iter().zip(&infos) {
            match result {
                Ok(result) => output.push(result),
                Err(abort) => match self.chain.isolate(info, &abort) {
                    Some(result) => {
                        tracing::debug!(%abort, query_index = info.index, "query abort isolated");
                        output.push(result);
                    }
                    None => {
                        if failure.is_none() {
                            failure = Some(abort);
                        }
                        output.push(ExecutionResult::default());
                    }
                },
            }
        }
        if let Some(abort) = failure {
            return Err(abort);
        }
        after?;
        Ok(output)
    }

    /// Completes `tree` on `root_value` outside of any multiplex run.
    ///
    /// Only field level hooks apply.
    pub(crate) fn resolve(
        &self,
        root_value: Value,
        tree: Arc<SelectionTree>,
        context: Context,
    ) -> Result<ExecutionResult, ExecutionAbort> {
        let mut batch = Batch::new(self, Context::new(), 1);
        batch.start(0, tree, root_value, context)?;
        batch.drain();
        batch
            .finish()
            .pop()
            .unwrap_or_else(|| Ok(ExecutionResult::default()))
    }
}

#[derive(Debug)]
enum QuerySlot {
    /// No resolution started, the query service never called through
    Idle,
    Running(QueryRun),
    Complete(ExecutionResult),
    Aborted(ExecutionAbort),
}

/// The mutable state of one multiplex run.
struct Batch<'e> {
    engine: &'e Engine,
    shared: Context,
    queue: LazyQueue<Pending>,
    slots: Vec<QuerySlot>,
}

impl<'e> Batch<'e> {
    fn new(engine: &'e Engine, shared: Context, query_count: usize) -> Self {
        Self {
            engine,
            shared,
            queue: LazyQueue::new(),
            slots: (0..query_count).map(|_| QuerySlot::Idle).collect(),
        }
    }

    fn abort(&mut self, index: usize, abort: ExecutionAbort) {
        tracing::debug!(%abort, query_index = index, "query aborted");
        self.slots[index] = QuerySlot::Aborted(abort);
    }

    /// Runs one query through the query service.
    fn run_query(&mut self, index: usize, request: &Request) {
        let engine = self.engine;
        let shared = self.shared.clone();
        let outcome = {
            let mut starter = Starter {
                batch: self,
                index,
                request,
            };
            engine.chain.query.call(QueryRequest {
                index,
                query: &request.query,
                operation_name: request.operation_name.as_deref(),
                variables: &request.variables,
                context: &request.context,
                shared: &shared,
                start: &mut starter,
            })
        };
        match outcome {
            Ok(QueryOutcome::Pending) => {}
            Ok(QueryOutcome::Complete(result)) => self.slots[index] = QuerySlot::Complete(result),
            Err(abort) => self.abort(index, abort),
        }
    }

    /// Prepares the query and resolves its eager part.
    fn start_query(
        &mut self,
        index: usize,
        request: &Request,
    ) -> Result<QueryOutcome, ExecutionAbort> {
        let prepared = match self.engine.prepare(request) {
            Ok(prepared) => prepared,
            Err(errors) => return Ok(QueryOutcome::Complete(ExecutionResult::from_errors(errors))),
        };
        tracing::Span::current().record("operation_kind", prepared.operation_kind().as_str());
        self.start(
            index,
            prepared.tree().clone(),
            request.root_value.clone(),
            request.context.clone(),
        )?;
        Ok(QueryOutcome::Pending)
    }

    fn start(
        &mut self,
        index: usize,
        tree: Arc<SelectionTree>,
        root_value: Value,
        context: Context,
    ) -> Result<(), ExecutionAbort> {
        let mut run = QueryRun::new(tree, root_value, context);
        Runtime {
            engine: self.engine,
            shared: &self.shared,
            queue: &mut self.queue,
            run: &mut run,
            query: index,
        }
        .execute_operation()?;
        self.slots[index] = QuerySlot::Running(run);
        Ok(())
    }

    /// Settles the shared lazy queue, shallowest depth first.
    fn drain(&mut self) {
        while let Some((depth, batch)) = self.queue.pop_batch() {
            tracing::trace!(depth, size = batch.len(), "settling lazy batch");
            for pending in batch {
                let Some(QuerySlot::Running(run)) = self.slots.get_mut(pending.query) else {
                    continue;
                };
                let resumed = Runtime {
                    engine: self.engine,
                    shared: &self.shared,
                    queue: &mut self.queue,
                    run,
                    query: pending.query,
                }
                .resume(pending.step);
                if let Err(abort) = resumed {
                    self.abort(pending.query, abort);
                }
            }
        }
    }

    fn finish(self) -> Vec<Result<ExecutionResult, ExecutionAbort>> {
        self.slots
            .into_iter()
            .map(|slot| match slot {
                QuerySlot::Idle => Ok(ExecutionResult::default()),
                QuerySlot::Running(run) => run.finish(),
                QuerySlot::Complete(result) => Ok(result),
                QuerySlot::Aborted(abort) => Err(abort),
            })
            .collect()
    }
}

/// The innermost query service: what runs when every hook called through.
struct Starter<'b, 'e> {
    batch: &'b mut Batch<'e>,
    index: usize,
    request: &'b Request,
}

impl StartQuery for Starter<'_, '_> {
    fn start(&mut self) -> Result<QueryOutcome, ExecutionAbort> {
        self.batch.start_query(self.index, self.request)
    }
}
