#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::{Value, json};
use threatflow_core::{
    BackendError, CaseBackend, Incident, JobId, JobStatus, LookupTable, SearchBackend,
    lookup::LookupRow,
};

/// How the fake search backend answers the next job.
#[derive(Debug, Clone)]
pub enum Script {
    Rows(Vec<Value>),
    NeverDone,
    Failed,
    CreateFails,
}

#[derive(Debug, Default)]
pub struct FakeSearch {
    script: Mutex<VecDeque<Script>>,
    fallback: Mutex<Option<Script>>,
    current: Mutex<Option<Script>>,
    ping_failures: AtomicU32,
    pings: AtomicU32,
    created: AtomicU32,
    cancelled: AtomicU32,
    status_polls: AtomicU32,
}

impl FakeSearch {
    pub fn new(script: impl IntoIterator<Item = Script>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Answer every job with `script` once the queue is drained.
    pub fn repeating(script: Script) -> Self {
        let fake = Self::default();
        *fake.fallback.lock().unwrap() = Some(script);
        fake
    }

    pub fn failing_pings(self, count: u32) -> Self {
        self.ping_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn pings(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> u32 {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> u32 {
        self.status_polls.load(Ordering::SeqCst)
    }

    fn current(&self) -> Script {
        self.current
            .lock()
            .unwrap()
            .clone()
            .expect("job status requested before create_job")
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn ping(&self) -> Result<(), BackendError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let remaining = self.ping_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.ping_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::Other("connection refused".into()));
        }
        Ok(())
    }

    async fn create_job(&self, _query: &str) -> Result<JobId, BackendError> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone())
            .expect("search script exhausted");

        if let Script::CreateFails = next {
            return Err(BackendError::Other("search head unavailable".into()));
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        *self.current.lock().unwrap() = Some(next);
        Ok(JobId(format!("sid-{n}")))
    }

    async fn job_status(&self, _job: &JobId) -> Result<JobStatus, BackendError> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.current() {
            Script::NeverDone => JobStatus::running(),
            Script::Failed => JobStatus {
                is_done: false,
                is_failed: true,
                dispatch_state: Some("FAILED".into()),
            },
            _ => JobStatus::done(),
        })
    }

    async fn results(&self, _job: &JobId) -> Result<Vec<Value>, BackendError> {
        match self.current() {
            Script::Rows(rows) => Ok(rows),
            other => panic!("results requested for {other:?}"),
        }
    }

    async fn cancel(&self, _job: &JobId) -> Result<(), BackendError> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake-search"
    }
}

#[derive(Debug, Default)]
pub struct FakeCase {
    submitted: Mutex<Vec<Incident>>,
    submit_failures: AtomicU32,
    ping_failures: AtomicU32,
    pings: AtomicU32,
    unconfigured: bool,
}

impl FakeCase {
    pub fn failing_submissions(self, count: u32) -> Self {
        self.submit_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_pings(self, count: u32) -> Self {
        self.ping_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn unconfigured() -> Self {
        Self {
            unconfigured: true,
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<Incident> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn pings(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaseBackend for FakeCase {
    async fn ping(&self) -> Result<(), BackendError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let remaining = self.ping_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.ping_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::Other("connection refused".into()));
        }
        Ok(())
    }

    async fn create_alert(&self, incident: &Incident) -> Result<(), BackendError> {
        let remaining = self.submit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.submit_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::Status {
                endpoint: "/api/alert".into(),
                status: 502,
                body: "bad gateway".into(),
            });
        }
        self.submitted.lock().unwrap().push(incident.clone());
        Ok(())
    }

    fn is_configured(&self) -> bool {
        !self.unconfigured
    }

    fn name(&self) -> &'static str {
        "fake-case"
    }
}

pub fn row(event_code: u32, time: &str) -> Value {
    json!({
        "_time": time,
        "EventCode": event_code.to_string(),
        "event_description": "An account failed to log on",
        "host": "WS01",
        "SourceName": "Microsoft-Windows-Security-Auditing",
    })
}

pub fn lookup_table() -> LookupTable {
    LookupTable::from_rows([
        LookupRow {
            event_id: "4625".into(),
            description: "An account failed to log on".into(),
            see_on: "https://learn.microsoft.com/event-4625".into(),
        },
        LookupRow {
            event_id: "4624".into(),
            description: "An account was successfully logged on".into(),
            see_on: "https://learn.microsoft.com/event-4624".into(),
        },
    ])
}
