use models::{JobMessage, ReceivedMessage};
use queue::JobQueue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Batch size and long-poll wait of each receive call.
const RECEIVE_BATCH: i32 = 5;
const RECEIVE_WAIT_SECONDS: i32 = 10;

/// Idle sleep between empty polls.
const IDLE_SLEEP: std::time::Duration = std::time::Duration::from_secs(1);

/// MessageProcessor executes one dequeued message to completion. An Ok
/// return means the outcome is durably recorded and the message may be
/// acknowledged.
#[async_trait::async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
    async fn process(&self, message: JobMessage) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl<S, V, E> MessageProcessor for crate::processor::Processor<S, V, E>
where
    S: object_store::ObjectStore,
    V: vector_store::VectorStore,
    E: embeddings::Embeddings,
{
    async fn process(&self, message: JobMessage) -> anyhow::Result<()> {
        crate::processor::Processor::process(self, message).await
    }
}

/// Consumer long-polls the job queue and fans each batch out to the
/// processor. A message is acknowledged only after its processor returns
/// success; failures leave it for the broker to redeliver after the
/// visibility timeout.
pub struct Consumer<Q, P> {
    queue: Arc<Q>,
    processor: Arc<P>,
}

impl<Q: JobQueue, P: MessageProcessor> Consumer<Q, P> {
    pub fn new(queue: Arc<Q>, processor: Arc<P>) -> Self {
        Self { queue, processor }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("consumer started");

        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => break,
                received = self.queue.receive(RECEIVE_BATCH, RECEIVE_WAIT_SECONDS) => {
                    match received {
                        Ok(batch) => batch,
                        Err(err) => {
                            tracing::error!(?err, "failed to receive from queue");
                            Vec::new()
                        }
                    }
                }
            };

            if batch.is_empty() {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(IDLE_SLEEP) => continue,
                }
            }

            tracing::info!(messages = batch.len(), "received message batch");

            // Messages are independent; process the whole batch concurrently
            // and await it so in-flight work finishes before the next poll.
            futures::future::join_all(
                batch
                    .into_iter()
                    .map(|message| self.process_and_ack(message)),
            )
            .await;
        }

        tracing::info!("consumer stopped");
    }

    async fn process_and_ack(&self, message: ReceivedMessage) {
        let message_id = message.message_id.clone();

        match self.processor.process(message.body).await {
            Ok(()) => {
                if let Err(err) = self.queue.ack(&message.receipt_handle).await {
                    // Redelivery is safe: processing is idempotent.
                    tracing::error!(message_id, ?err, "failed to ack processed message");
                } else {
                    tracing::info!(message_id, "processed and acknowledged message");
                }
            }
            Err(err) => {
                tracing::error!(
                    message_id,
                    ?err,
                    "processing failed, message will be redelivered"
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use models::IngestionFile;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeQueue {
        pending: Mutex<VecDeque<ReceivedMessage>>,
        acked: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl JobQueue for FakeQueue {
        async fn send(&self, _message: &JobMessage) -> Result<(), queue::Error> {
            unimplemented!("consumer never sends")
        }

        async fn receive(
            &self,
            max_messages: i32,
            _wait_seconds: i32,
        ) -> Result<Vec<ReceivedMessage>, queue::Error> {
            let mut pending = self.pending.lock().unwrap();
            let take = (max_messages as usize).min(pending.len());
            Ok(pending.drain(..take).collect())
        }

        async fn ack(&self, receipt_handle: &str) -> Result<(), queue::Error> {
            self.acked.lock().unwrap().push(receipt_handle.to_string());
            Ok(())
        }
    }

    /// Fails every message whose job id is negative.
    struct FakeProcessor {
        processed: Mutex<Vec<i64>>,
    }

    #[async_trait::async_trait]
    impl MessageProcessor for FakeProcessor {
        async fn process(&self, message: JobMessage) -> anyhow::Result<()> {
            self.processed.lock().unwrap().push(message.ingestion_job_id);
            anyhow::ensure!(message.ingestion_job_id >= 0, "poisoned message");
            Ok(())
        }
    }

    fn message(job_id: i64, receipt: &str) -> ReceivedMessage {
        ReceivedMessage {
            message_id: format!("m-{job_id}"),
            receipt_handle: receipt.to_string(),
            body: JobMessage {
                ingestion_job_id: job_id,
                kb_id: 1,
                collection_name: "_c".to_string(),
                category: "default".to_string(),
                user_id: 1,
                index_kb_doc_id: Some(vec![IngestionFile {
                    kb_doc_id: 1,
                    doc_id: 1,
                    file_name: "a.txt".to_string(),
                    object_key: "1/a.txt".to_string(),
                }]),
                delete_kb_doc_id: None,
            },
        }
    }

    #[tokio::test]
    async fn acks_successes_and_leaves_failures() {
        let queue = Arc::new(FakeQueue {
            pending: Mutex::new(VecDeque::from([
                message(1, "receipt-1"),
                message(-2, "receipt-2"),
                message(3, "receipt-3"),
            ])),
            acked: Mutex::new(Vec::new()),
        });
        let processor = Arc::new(FakeProcessor {
            processed: Mutex::new(Vec::new()),
        });

        let cancel = CancellationToken::new();
        let consumer = Consumer::new(queue.clone(), processor.clone());
        let handle = tokio::spawn(consumer.run(cancel.clone()));

        // Wait until every message has been processed.
        for _ in 0..200 {
            if processor.processed.lock().unwrap().len() == 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        cancel.cancel();
        handle.await.unwrap();

        let mut acked = queue.acked.lock().unwrap().clone();
        acked.sort();
        assert_eq!(acked, vec!["receipt-1", "receipt-3"]);

        let processed = processor.processed.lock().unwrap().clone();
        assert_eq!(processed.len(), 3);
    }

    #[tokio::test]
    async fn stops_promptly_when_cancelled_while_idle() {
        let queue = Arc::new(FakeQueue {
            pending: Mutex::new(VecDeque::new()),
            acked: Mutex::new(Vec::new()),
        });
        let processor = Arc::new(FakeProcessor {
            processed: Mutex::new(Vec::new()),
        });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Consumer::new(queue, processor).run(cancel.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("consumer exits within the shutdown window")
            .unwrap();
    }
}
