use chrono::Utc;
use std::sync::Arc;

use crate::discord::{MessageSurface, MessageTarget};
use crate::error::{DiscordError, WorkerError};
use crate::repository::TodoStore;
use crate::title::TitleFetcher;
use crate::todo::ControlCodec;
use crate::types::{MessagePayload, WorkerAction, WorkerRequest};

const ERROR_PREFIX: &str = "エラー: ";

/// Runs deferred work and writes the outcome back to Discord.
pub struct Worker {
    pub(crate) store: Arc<dyn TodoStore>,
    pub(crate) surface: Arc<dyn MessageSurface>,
    pub(crate) titles: TitleFetcher,
    pub(crate) codec: ControlCodec,
}

impl Worker {
    pub fn new(
        store: Arc<dyn TodoStore>,
        surface: Arc<dyn MessageSurface>,
        titles: TitleFetcher,
        codec: ControlCodec,
    ) -> Self {
        Self {
            store,
            surface,
            titles,
            codec,
        }
    }

    pub async fn handle(&self, request: &WorkerRequest) -> Result<(), WorkerError> {
        tracing::info!(
            interaction_id = %request.interaction_id,
            channel_id = %request.channel_id,
            kind = request.action.kind(),
            "worker started"
        );

        // Route by interaction kind, then command name
        match &request.action {
            WorkerAction::Command {
                command_name,
                command_args,
            } => match command_name.as_str() {
                "summarize" => self.summarize(request, command_args, Utc::now()).await,
                "list" => self.list_command(request, command_args).await,
                other => {
                    tracing::error!(interaction_id = %request.interaction_id, command = other, "unknown command");
                    Err(WorkerError::UnknownCommand(other.to_string()))
                }
            },
            WorkerAction::Component { custom_id } => self.list_component(request, custom_id).await,
        }
    }

    /// Replaces the deferred "thinking" placeholder with `content`.
    pub(crate) async fn reply(&self, request: &WorkerRequest, content: impl Into<String>) -> Result<(), DiscordError> {
        let target = MessageTarget::Original {
            application_id: request.application_id.clone(),
            token: request.interaction_token.clone(),
        };
        self.surface
            .edit_message(&target, &MessagePayload::text(content))
            .await
    }

    pub(crate) async fn reply_error(&self, request: &WorkerRequest, message: &str) -> Result<(), WorkerError> {
        tracing::warn!(interaction_id = %request.interaction_id, error = message, "command failed");
        // Replace the placeholder with the error
        self.reply(request, format!("{ERROR_PREFIX}{message}")).await?;
        Ok(())
    }

    /// Error report for button presses. Goes out as a follow-up so the
    /// anchor keeps showing the list.
    pub(crate) async fn notify_error(&self, request: &WorkerRequest, message: &str) -> Result<(), WorkerError> {
        tracing::warn!(interaction_id = %request.interaction_id, error = message, "control failed");
        // Send ephemeral follow-up
        self.surface
            .send_ephemeral(
                &request.application_id,
                &request.interaction_token,
                &format!("{ERROR_PREFIX}{message}"),
            )
            .await?;
        Ok(())
    }
}
