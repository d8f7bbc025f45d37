//! FIFO hand-off between request handlers and the transcription worker.
//!
//! `JobQueue` is the cloneable producer side; `JobConsumer` is the single
//! receiving side and is not `Clone`, so there is exactly one consumer.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Job;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue operation cancelled")]
    Cancelled,
    #[error("queue closed")]
    Closed,
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

pub struct JobConsumer {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl JobQueue {
    pub fn new() -> (JobQueue, JobConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (JobQueue { tx }, JobConsumer { rx })
    }

    /// Makes `job` visible to the consumer after every job enqueued before it.
    /// The queue is unbounded, so this never waits; an already cancelled
    /// caller gets `Cancelled` and nothing is enqueued.
    pub fn enqueue(&self, job: Job, cancel: &CancellationToken) -> Result<(), QueueError> {
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        self.tx.send(job).map_err(|_| QueueError::Closed)
    }
}

impl JobConsumer {
    /// Waits for the next job. Cancellation wins over a ready job.
    pub async fn dequeue(&mut self, cancel: &CancellationToken) -> Result<Job, QueueError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueueError::Cancelled),
            job = self.rx.recv() => job.ok_or(QueueError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(id: &str) -> Job {
        Job::new(id, format!("{id}.wav"), format!("/tmp/{id}.wav"))
    }

    #[tokio::test]
    async fn test_single_producer_fifo() {
        let (queue, mut consumer) = JobQueue::new();
        let cancel = CancellationToken::new();

        for id in ["a", "b", "c"] {
            queue.enqueue(job(id), &cancel).unwrap();
        }

        for expected in ["a", "b", "c"] {
            assert_eq!(consumer.dequeue(&cancel).await.unwrap().id, expected);
        }
    }

    #[tokio::test]
    async fn test_concurrent_producers_keep_their_own_order() {
        let (queue, mut consumer) = JobQueue::new();
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for producer in 0..4 {
            let queue = queue.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..25 {
                    queue.enqueue(job(&format!("p{producer}-{seq:02}")), &cancel).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut last_seen = [-1i32; 4];
        for _ in 0..100 {
            let id = consumer.dequeue(&cancel).await.unwrap().id;
            let (producer, seq) = id[1..].split_once('-').unwrap();
            let producer: usize = producer.parse().unwrap();
            let seq: i32 = seq.parse().unwrap();
            assert!(seq > last_seen[producer], "out of order: {id}");
            last_seen[producer] = seq;
        }
        assert_eq!(last_seen, [24; 4]);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let (queue, mut consumer) = JobQueue::new();
        let cancel = CancellationToken::new();

        let producer_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            queue.enqueue(job("late"), &producer_cancel).unwrap();
        });

        assert_eq!(consumer.dequeue(&cancel).await.unwrap().id, "late");
    }

    #[tokio::test]
    async fn test_dequeue_observes_cancellation() {
        let (_queue, mut consumer) = JobQueue::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        assert_eq!(consumer.dequeue(&cancel).await, Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn test_enqueue_rejected_when_cancelled() {
        let (queue, mut consumer) = JobQueue::new();
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        assert_eq!(queue.enqueue(job("x"), &cancelled), Err(QueueError::Cancelled));

        let live = CancellationToken::new();
        queue.enqueue(job("y"), &live).unwrap();
        assert_eq!(consumer.dequeue(&live).await.unwrap().id, "y");
    }

    #[tokio::test]
    async fn test_enqueue_after_consumer_dropped() {
        let (queue, consumer) = JobQueue::new();
        drop(consumer);
        let cancel = CancellationToken::new();
        assert_eq!(queue.enqueue(job("x"), &cancel), Err(QueueError::Closed));
    }
}
