use aws_sdk_sqs::error::ProvideErrorMetadata;
use models::{JobMessage, ReceivedMessage};

/// Broker caps on a single receive call.
const MAX_RECEIVE_MESSAGES: i32 = 10;
const MAX_WAIT_SECONDS: i32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to send message ({code}): {message}")]
    Send { code: String, message: String },
    #[error("failed to receive messages ({code}): {message}")]
    Receive { code: String, message: String },
    #[error("failed to acknowledge message ({code}): {message}")]
    Ack { code: String, message: String },
    #[error("failed to encode message body")]
    Encode(#[from] serde_json::Error),
}

/// JobQueue carries ingestion job envelopes between admission and the
/// worker with at-least-once, visibility-timeout semantics.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync + 'static {
    async fn send(&self, message: &JobMessage) -> Result<(), Error>;

    /// Long-poll up to `max_messages` envelopes, waiting up to `wait_seconds`.
    /// Bodies that fail to parse are logged and skipped; the broker's
    /// dead-letter policy eventually removes them.
    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, Error>;

    /// Delete a delivered message. Acknowledging an already-deleted receipt
    /// is not an error.
    async fn ack(&self, receipt_handle: &str) -> Result<(), Error>;
}

pub struct SqsJobQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsJobQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }

    fn code_and_message<E: ProvideErrorMetadata>(err: &E) -> (String, String) {
        (
            err.code().unwrap_or("Unknown").to_string(),
            err.message().unwrap_or_default().to_string(),
        )
    }
}

#[async_trait::async_trait]
impl JobQueue for SqsJobQueue {
    async fn send(&self, message: &JobMessage) -> Result<(), Error> {
        let body = serde_json::to_string(message)?;

        let response = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|err| {
                let (code, message) = Self::code_and_message(&err);
                Error::Send { code, message }
            })?;

        tracing::info!(
            message_id = response.message_id().unwrap_or_default(),
            job_id = message.ingestion_job_id,
            "queued ingestion job message"
        );
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, Error> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.min(MAX_RECEIVE_MESSAGES))
            .wait_time_seconds(wait_seconds.min(MAX_WAIT_SECONDS))
            .send()
            .await
            .map_err(|err| {
                let (code, message) = Self::code_and_message(&err);
                Error::Receive { code, message }
            })?;

        let mut parsed = Vec::new();
        for raw in response.messages() {
            let (Some(message_id), Some(receipt_handle), Some(body)) =
                (raw.message_id(), raw.receipt_handle(), raw.body())
            else {
                tracing::error!("received message missing id, receipt handle, or body");
                continue;
            };

            match serde_json::from_str::<JobMessage>(body) {
                Ok(body) => parsed.push(ReceivedMessage {
                    message_id: message_id.to_string(),
                    receipt_handle: receipt_handle.to_string(),
                    body,
                }),
                Err(err) => {
                    // Leave the message for the dead-letter policy.
                    tracing::error!(message_id, ?err, "failed to parse queue message body");
                }
            }
        }

        Ok(parsed)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), Error> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|err| {
                let (code, message) = Self::code_and_message(&err);
                Error::Ack { code, message }
            })?;

        tracing::debug!("acknowledged queue message");
        Ok(())
    }
}
