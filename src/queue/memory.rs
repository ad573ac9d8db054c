//! In-memory job queue for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Job, JobKind, JobQueue, QueueResult};

#[derive(Default)]
pub struct MemoryJobQueue {
    queued: Mutex<VecDeque<Job>>,
    finished: Mutex<Vec<(Uuid, Option<String>)>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds and project filters currently queued, oldest first.
    pub fn queued_jobs(&self) -> Vec<(JobKind, Option<String>)> {
        self.queued
            .lock()
            .expect("queue lock")
            .iter()
            .map(|j| (j.kind, j.project_id.clone()))
            .collect()
    }

    /// Finished job ids with their failure message, if any.
    pub fn finished_jobs(&self) -> Vec<(Uuid, Option<String>)> {
        self.finished.lock().expect("queue lock").clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, kind: JobKind, project_id: Option<String>) -> QueueResult<bool> {
        let mut queued = self.queued.lock().expect("queue lock");
        if queued
            .iter()
            .any(|j| j.kind == kind && j.project_id == project_id)
        {
            return Ok(false);
        }

        queued.push_back(Job {
            id: Uuid::new_v4(),
            kind,
            project_id,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn claim_next(&self) -> QueueResult<Option<Job>> {
        Ok(self.queued.lock().expect("queue lock").pop_front())
    }

    async fn mark_done(&self, id: Uuid) -> QueueResult<()> {
        self.finished.lock().expect("queue lock").push((id, None));
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> QueueResult<()> {
        self.finished
            .lock()
            .expect("queue lock")
            .push((id, Some(error.to_string())));
        Ok(())
    }

    async fn queued_len(&self) -> QueueResult<u64> {
        Ok(self.queued.lock().expect("queue lock").len() as u64)
    }
}
