//! A backend whose calls can be delayed, hung or failed on demand.

use async_trait::async_trait;
use parking_lot::Mutex;
use peersync_engine::{Backend, BackendError, BackendResult, CommitAck, MemoryBackend, ScannedRecord};
use peersync_protocol::Record;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// A backend call that can be scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    /// [`Backend::connect`].
    Connect,
    /// [`Backend::start_scan`].
    StartScan,
    /// [`Backend::scan_next`].
    ScanNext,
    /// [`Backend::commit`].
    Commit,
    /// [`Backend::finalize`].
    Finalize,
    /// [`Backend::disconnect`].
    Disconnect,
}

/// What happens before a scripted call reaches the records.
#[derive(Debug, Clone)]
pub enum Step {
    /// Sleep, then run the call.
    Delay(Duration),
    /// Never return.
    Hang,
    /// Return this error without running the call.
    Fail(BackendError),
    /// Panic inside the call.
    Panic,
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<Call, VecDeque<Step>>,
    standing: HashMap<Call, Step>,
    calls: HashMap<Call, usize>,
}

impl Script {
    fn next(&mut self, call: Call) -> Option<Step> {
        *self.calls.entry(call).or_default() += 1;
        self.queued
            .get_mut(&call)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.standing.get(&call).cloned())
    }
}

/// A [`MemoryBackend`] with a script of per-call behaviors.
///
/// Queued steps run once each, in order; a standing step applies to every
/// call once the queue for that call is empty. Clones share the records
/// and the script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    records: MemoryBackend,
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    /// Creates a backend with no records and an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record store, to edit records as the resource would.
    pub fn records(&self) -> &MemoryBackend {
        &self.records
    }

    /// Queues `step` for the next unscripted `call`.
    pub fn once(&self, call: Call, step: Step) -> &Self {
        self.script
            .lock()
            .queued
            .entry(call)
            .or_default()
            .push_back(step);
        self
    }

    /// Applies `step` to every future `call`.
    pub fn always(&self, call: Call, step: Step) -> &Self {
        self.script.lock().standing.insert(call, step);
        self
    }

    /// Removes every queued and standing step of `call`.
    pub fn clear(&self, call: Call) -> &Self {
        let mut script = self.script.lock();
        script.queued.remove(&call);
        script.standing.remove(&call);
        self
    }

    /// Returns how many times `call` was made.
    pub fn calls(&self, call: Call) -> usize {
        self.script.lock().calls.get(&call).copied().unwrap_or(0)
    }

    async fn step(&self, call: Call) -> BackendResult<()> {
        let step = self.script.lock().next(call);
        match step {
            None => Ok(()),
            Some(Step::Delay(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Panic) => panic!("scripted panic in {call:?}"),
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn connect(&mut self) -> BackendResult<()> {
        self.step(Call::Connect).await?;
        self.records.connect().await
    }

    async fn start_scan(&mut self, full: bool) -> BackendResult<()> {
        self.step(Call::StartScan).await?;
        self.records.start_scan(full).await
    }

    async fn scan_next(&mut self) -> BackendResult<Option<ScannedRecord>> {
        self.step(Call::ScanNext).await?;
        self.records.scan_next().await
    }

    async fn commit(&mut self, record: &Record) -> BackendResult<CommitAck> {
        self.step(Call::Commit).await?;
        self.records.commit(record).await
    }

    async fn finalize(&mut self) -> BackendResult<()> {
        self.step(Call::Finalize).await?;
        self.records.finalize().await
    }

    async fn disconnect(&mut self) -> BackendResult<()> {
        self.step(Call::Disconnect).await?;
        self.records.disconnect().await
    }

    fn watched_identities(&self) -> Vec<String> {
        self.records.watched_identities()
    }

    fn resource_identity(&self, field_name: &str) -> BackendResult<String> {
        self.records.resource_identity(field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_steps_run_before_standing_ones() {
        let mut backend = ScriptedBackend::new();
        backend
            .once(Call::Connect, Step::Fail(BackendError::connection("first")))
            .always(Call::Connect, Step::Fail(BackendError::connection("always")));

        let first = backend.connect().await.unwrap_err();
        assert_eq!(first.message, "first");
        let second = backend.connect().await.unwrap_err();
        assert_eq!(second.message, "always");

        backend.clear(Call::Connect);
        backend.connect().await.unwrap();
        assert_eq!(backend.calls(Call::Connect), 3);
    }

    #[tokio::test]
    #[should_panic(expected = "scripted panic in Commit")]
    async fn panic_step_panics() {
        let mut backend = ScriptedBackend::new();
        backend.once(Call::Commit, Step::Panic);
        let _ = backend.commit(&Record::deleted("x")).await;
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_returns() {
        let mut backend = ScriptedBackend::new();
        backend.always(Call::Finalize, Step::Hang);
        let result = tokio::time::timeout(Duration::from_secs(60), backend.finalize()).await;
        assert!(result.is_err());
    }
}
