use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;

use crate::error::DispatchError;
use crate::types::WorkerRequest;

/// Hands a request to the worker without waiting for it to run.
///
/// Success means "accepted for execution". The underlying transports deliver
/// at least once, so the worker may see the same request again.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &WorkerRequest) -> Result<(), DispatchError>;
}

/// Re-invokes this same function asynchronously (`InvocationType::Event`).
pub struct LambdaDispatcher {
    client: aws_sdk_lambda::Client,
    function_name: Option<String>,
}

impl LambdaDispatcher {
    pub fn new(client: aws_sdk_lambda::Client, function_name: Option<String>) -> Self {
        Self { client, function_name }
    }
}

#[async_trait]
impl Dispatcher for LambdaDispatcher {
    async fn dispatch(&self, request: &WorkerRequest) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(request)?;

        let Some(function_name) = self.function_name.as_deref() else {
            // Running outside Lambda; there is nothing to invoke.
            tracing::warn!(
                interaction_id = %request.interaction_id,
                "AWS_LAMBDA_FUNCTION_NAME not set, skipping async invoke"
            );
            return Ok(());
        };

        self.client
            .invoke()
            .function_name(function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| DispatchError::Invoke(aws_sdk_lambda::error::DisplayErrorContext(&e).to_string()))?;

        tracing::info!(
            interaction_id = %request.interaction_id,
            kind = request.action.kind(),
            "dispatched to worker"
        );
        Ok(())
    }
}

/// Sends the request to an SQS queue that triggers this function.
pub struct SqsDispatcher {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsDispatcher {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl Dispatcher for SqsDispatcher {
    async fn dispatch(&self, request: &WorkerRequest) -> Result<(), DispatchError> {
        let message_body = serde_json::to_string(request)?;

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(message_body)
            .send()
            .await
            .map_err(|e| DispatchError::Queue(aws_sdk_sqs::error::DisplayErrorContext(&e).to_string()))?;

        tracing::info!(
            interaction_id = %request.interaction_id,
            kind = request.action.kind(),
            "queued for worker"
        );
        Ok(())
    }
}
