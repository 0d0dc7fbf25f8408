//! Transactional execution core: dependency-ordered action graphs with
//! bounded concurrency, wrapped in nestable transactions with two rollback
//! policies (lazy display-only guidance, best-effort inverse replay).
//!
//! Parsing, statement building, storage, and remote invocation are external
//! collaborators consumed through the [`action`] and [`statement`] traits;
//! this crate owns scheduling, undo-log accumulation, and transaction
//! semantics only.

pub mod action;
pub mod config;
pub mod graph;
pub mod operation;
pub mod oplog;
pub mod orchestrator;
pub mod provider;
pub mod statement;
pub mod txn;

pub use action::{Action, ActionError, ActionOutput};
pub use config::{ConfigError, CoreConfig};
pub use graph::holder::GraphHolder;
pub use graph::{ExecutionGraph, GraphError, GraphPolicy, NodeId};
pub use operation::{Operation, OperationError};
pub use oplog::OpLog;
pub use orchestrator::{DispatchReport, Orchestrator, StatementDisposition};
pub use provider::Provider;
pub use statement::{Statement, StatementBuilder};
pub use txn::{CommitOutcome, RollbackPolicy, TxnCoordinator, TxnError};
