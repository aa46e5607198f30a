//! Job queue messages and the broker-facing trait. Jobs are independent and
//! idempotent per `document_id`, except as noted for Process-Document
//! reprocessing (see `pipeline::process`).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    ProcessDocument(ProcessDocumentJob),
    ExtractRelationships(ExtractRelationshipsJob),
    HealthCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDocumentJob {
    pub document_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRelationshipsJob {
    pub document_id: i64,
    #[serde(default)]
    pub target_doc_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub limit_per_chunk: Option<usize>,
}

/// A durable job queue. Prefetch of one job per worker and the restart-after-N
/// policy live in the worker loop, not in this trait.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<()>;

    /// Blocks until a job is available or the queue is closed.
    async fn dequeue(&self) -> Result<Option<Job>>;
}

/// A process-local FIFO queue, used in tests and single-process deployments.
pub struct InMemoryJobQueue {
    jobs: Mutex<VecDeque<Job>>,
    notify: Notify,
    closed: Mutex<bool>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: Mutex::new(false),
        }
    }

    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.notify.notify_waiters();
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        self.jobs.lock().unwrap().push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        loop {
            if let Some(job) = self.jobs.lock().unwrap().pop_front() {
                return Ok(Some(job));
            }
            if *self.closed.lock().unwrap() {
                return Ok(None);
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_serializes_with_type_tag() {
        let job = Job::ProcessDocument(ProcessDocumentJob { document_id: 42 });
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"type\":\"process_document\""));
        assert!(json.contains("\"document_id\":42"));
    }

    #[test]
    fn test_health_check_round_trips() {
        let json = serde_json::to_string(&Job::HealthCheck).unwrap();
        let job: Job = serde_json::from_str(&json).unwrap();
        assert!(matches!(job, Job::HealthCheck));
    }

    #[test]
    fn test_extract_relationships_defaults() {
        let json = r#"{"type":"extract_relationships","document_id":7}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        match job {
            Job::ExtractRelationships(j) => {
                assert_eq!(j.document_id, 7);
                assert!(j.target_doc_ids.is_none());
                assert!(j.threshold.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn test_in_memory_queue_dequeues_in_fifo_order() {
        let queue = InMemoryJobQueue::new();
        queue
            .enqueue(Job::ProcessDocument(ProcessDocumentJob { document_id: 1 }))
            .await
            .unwrap();
        queue
            .enqueue(Job::ProcessDocument(ProcessDocumentJob { document_id: 2 }))
            .await
            .unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        match first {
            Job::ProcessDocument(j) => assert_eq!(j.document_id, 1),
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn test_in_memory_queue_dequeue_returns_none_after_close() {
        let queue = InMemoryJobQueue::new();
        queue.close();
        assert!(queue.dequeue().await.unwrap().is_none());
    }
}
