//! In-memory driver for tests.
//!
//! Records every call and replays queued outcomes in FIFO order.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::driver::{Driver, RawResult, TransactionStatus};
use super::error::{DriverError, DriverResult};
use super::types::WireParameter;

/// A recorded driver call for verification.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    SimpleQuery(String),
    Prepare(String, String),
    Execute(String, Vec<WireParameter>),
    Deallocate(String),
    Reset,
    Close,
}

pub struct StubDriver {
    outcomes: VecDeque<DriverResult<RawResult>>,
    prepare_failures: VecDeque<DriverError>,
    calls: Vec<DriverCall>,
    alive: bool,
    fail_deallocate: bool,
    fail_reset: bool,
    status: TransactionStatus,
}

impl StubDriver {
    pub fn new() -> Self {
        Self {
            outcomes: VecDeque::new(),
            prepare_failures: VecDeque::new(),
            calls: Vec::new(),
            alive: true,
            fail_deallocate: false,
            fail_reset: false,
            status: TransactionStatus::Idle,
        }
    }

    /// Queue the outcome of the next query or prepared execution.
    pub fn push(&mut self, outcome: DriverResult<RawResult>) {
        self.outcomes.push_back(outcome);
    }

    pub fn with_result(mut self, result: RawResult) -> Self {
        self.push(Ok(result));
        self
    }

    pub fn with_error(mut self, err: DriverError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn fail_next_prepare(&mut self, err: DriverError) {
        self.prepare_failures.push_back(err);
    }

    pub fn fail_deallocate(&mut self, fail: bool) {
        self.fail_deallocate = fail;
    }

    pub fn fail_reset(&mut self, fail: bool) {
        self.fail_reset = fail;
    }

    pub fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    pub fn set_transaction_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.clone()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn prepare_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DriverCall::Prepare(..)))
            .count()
    }

    pub fn deallocated(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DriverCall::Deallocate(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn simple_queries(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DriverCall::SimpleQuery(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    fn next_outcome(&mut self) -> DriverResult<RawResult> {
        let outcome = self.outcomes.pop_front().unwrap_or_else(|| Ok(RawResult::empty()));
        if let Err(e) = &outcome {
            if e.is_connection_failure() {
                self.alive = false;
            }
        }
        outcome
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for StubDriver {
    async fn simple_query(&mut self, sql: &str) -> DriverResult<RawResult> {
        self.calls.push(DriverCall::SimpleQuery(sql.to_string()));
        if !self.alive {
            return Err(DriverError::Connection("connection is closed".into()));
        }
        self.next_outcome()
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> DriverResult<()> {
        self.calls
            .push(DriverCall::Prepare(name.to_string(), sql.to_string()));
        if !self.alive {
            return Err(DriverError::Connection("connection is closed".into()));
        }
        match self.prepare_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn execute_prepared(
        &mut self,
        name: &str,
        params: &[WireParameter],
    ) -> DriverResult<RawResult> {
        self.calls
            .push(DriverCall::Execute(name.to_string(), params.to_vec()));
        if !self.alive {
            return Err(DriverError::Connection("connection is closed".into()));
        }
        self.next_outcome()
    }

    async fn deallocate(&mut self, name: &str) -> DriverResult<()> {
        self.calls.push(DriverCall::Deallocate(name.to_string()));
        if self.fail_deallocate {
            return Err(DriverError::Connection("deallocate failed".into()));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    async fn reset(&mut self) -> DriverResult<()> {
        self.calls.push(DriverCall::Reset);
        if self.fail_reset {
            return Err(DriverError::Connection("server unreachable".into()));
        }
        self.alive = true;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.calls.push(DriverCall::Close);
        self.alive = false;
        Ok(())
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.status
    }
}
