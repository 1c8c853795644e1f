//! Scripted in-memory store for unit tests.

use crate::client::{CancelHook, Executor, Store, TxExecutor};
use crate::error::{OrmError, OrmResult};
use crate::row::Record;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Query(String, Vec<Value>),
    Execute(String, Vec<Value>),
    TxQuery(String, Vec<Value>),
    TxExecute(String, Vec<Value>),
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    RollbackTo(String),
    Release(String),
    Cancel,
}

#[derive(Default)]
struct Script {
    log: Vec<Call>,
    rows: VecDeque<Vec<Record>>,
    delay: Option<Duration>,
    fail_query: Option<String>,
    fail_execute: Option<String>,
    fail_begin: Option<String>,
    fail_commit: Option<String>,
    fail_rollback: Option<String>,
    fail_release: Option<String>,
}

/// Records every call and replays scripted rows and failures.
///
/// Failures are sticky: once set, every matching call fails.
#[derive(Clone, Default)]
pub(crate) struct MockStore {
    script: Arc<Mutex<Script>>,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the rows returned by the next query.
    pub(crate) fn push_rows(&self, rows: Vec<Record>) {
        self.script.lock().unwrap().rows.push_back(rows);
    }

    pub(crate) fn delay(&self, delay: Duration) {
        self.script.lock().unwrap().delay = Some(delay);
    }

    pub(crate) fn fail_query(&self, message: &str) {
        self.script.lock().unwrap().fail_query = Some(message.to_string());
    }

    pub(crate) fn fail_execute(&self, message: &str) {
        self.script.lock().unwrap().fail_execute = Some(message.to_string());
    }

    pub(crate) fn fail_begin(&self, message: &str) {
        self.script.lock().unwrap().fail_begin = Some(message.to_string());
    }

    pub(crate) fn fail_commit(&self, message: &str) {
        self.script.lock().unwrap().fail_commit = Some(message.to_string());
    }

    /// Fails full rollbacks and savepoint rollbacks.
    pub(crate) fn fail_rollback(&self, message: &str) {
        self.script.lock().unwrap().fail_rollback = Some(message.to_string());
    }

    pub(crate) fn fail_release(&self, message: &str) {
        self.script.lock().unwrap().fail_release = Some(message.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().log.clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.script.lock().unwrap().log.iter().filter(|c| pred(c)).count()
    }

    /// SQL of every statement sent, in order.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Query(sql, _)
                | Call::Execute(sql, _)
                | Call::TxQuery(sql, _)
                | Call::TxExecute(sql, _) => Some(sql),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call, failure: impl Fn(&Script) -> Option<String>) -> OrmResult<()> {
        let mut script = self.script.lock().unwrap();
        script.log.push(call);
        match failure(&script) {
            Some(message) => Err(OrmError::Other(message)),
            None => Ok(()),
        }
    }

    async fn pause(&self) {
        let delay = self.script.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn cancel(&self) -> Option<CancelHook> {
        let store = self.clone();
        Some(Box::new(move || store.script.lock().unwrap().log.push(Call::Cancel)))
    }

    fn next_rows(&self) -> Vec<Record> {
        self.script.lock().unwrap().rows.pop_front().unwrap_or_default()
    }
}

impl Executor for MockStore {
    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Record>> {
        self.pause().await;
        self.record(Call::Query(sql.into(), args.to_vec()), |s| s.fail_query.clone())?;
        Ok(self.next_rows())
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<u64> {
        self.pause().await;
        self.record(Call::Execute(sql.into(), args.to_vec()), |s| s.fail_execute.clone())?;
        Ok(1)
    }

    fn cancel_hook(&self) -> Option<CancelHook> {
        self.cancel()
    }
}

impl Store for MockStore {
    type Tx = MockTx;

    async fn begin(&self) -> OrmResult<MockTx> {
        self.record(Call::Begin, |s| s.fail_begin.clone())?;
        Ok(MockTx { store: self.clone() })
    }
}

/// Transaction over a [`MockStore`]; shares its call log.
pub(crate) struct MockTx {
    store: MockStore,
}

impl Executor for MockTx {
    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Record>> {
        self.store
            .record(Call::TxQuery(sql.into(), args.to_vec()), |s| s.fail_query.clone())?;
        Ok(self.store.next_rows())
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<u64> {
        self.store
            .record(Call::TxExecute(sql.into(), args.to_vec()), |s| s.fail_execute.clone())?;
        Ok(1)
    }

    fn cancel_hook(&self) -> Option<CancelHook> {
        self.store.cancel()
    }
}

impl TxExecutor for MockTx {
    async fn commit(self) -> OrmResult<()> {
        self.store.record(Call::Commit, |s| s.fail_commit.clone())
    }

    async fn rollback(self) -> OrmResult<()> {
        self.store.record(Call::Rollback, |s| s.fail_rollback.clone())
    }

    async fn savepoint(&self, name: &str) -> OrmResult<()> {
        self.store.record(Call::Savepoint(name.into()), |_| None)
    }

    async fn rollback_to(&self, name: &str) -> OrmResult<()> {
        self.store
            .record(Call::RollbackTo(name.into()), |s| s.fail_rollback.clone())
    }

    async fn release(&self, name: &str) -> OrmResult<()> {
        self.store
            .record(Call::Release(name.into()), |s| s.fail_release.clone())
    }
}
