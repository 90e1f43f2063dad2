use aws_lambda_events::apigw::ApiGatewayProxyResponse;
use aws_lambda_events::encodings::Body;
use aws_lambda_events::http::header::CONTENT_TYPE;
use aws_lambda_events::http::{HeaderMap, HeaderValue};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::Dispatcher;
use crate::signature::verify_signature;
use crate::types::{
    CommandArgs, CommandData, CommandOption, ComponentData, GatewayRequest,
    Interaction, InteractionResponse, InteractionType, WorkerAction, WorkerRequest,
    OPTION_SUB_COMMAND, OPTION_SUB_COMMAND_GROUP,
};

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("invalid interaction payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("unknown interaction type")]
    UnknownType,
    #[error("interaction is missing {0}")]
    Missing(&'static str),
    #[error("option {0} is nested deeper than one sub-command")]
    TooDeep(String),
}

/// What a verified interaction turns into.
#[derive(Debug)]
pub enum Classified {
    Ping,
    /// Work for the worker, and the acknowledgment to send once it is handed off.
    Deferred {
        request: WorkerRequest,
        ack: InteractionResponse,
    },
}

fn response(status_code: i64, content_type: &'static str, body: String) -> ApiGatewayProxyResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    ApiGatewayProxyResponse {
        status_code,
        headers,
        body: Some(Body::Text(body)),
        ..ApiGatewayProxyResponse::default()
    }
}

/// Plain-text proxy response, used for rejections.
pub fn text_response(status_code: i64, body: &str) -> ApiGatewayProxyResponse {
    response(status_code, "text/plain", body.to_string())
}

/// 200 with a JSON body. Valid for both REST and HTTP API integrations.
pub fn json_response<T: Serialize>(body: &T) -> Result<ApiGatewayProxyResponse, serde_json::Error> {
    Ok(response(200, "application/json", serde_json::to_string(body)?))
}

/// Handles one webhook call from API Gateway and produces the synchronous
/// reply Discord is waiting for.
pub async fn handle_gateway(
    request: GatewayRequest,
    public_key: &str,
    dispatcher: &dyn Dispatcher,
) -> Result<ApiGatewayProxyResponse, serde_json::Error> {
    // Get raw body bytes
    let body = if request.is_base64_encoded {
        match BASE64.decode(request.body.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "error decoding base64 body");
                return Ok(text_response(400, "invalid body encoding"));
            }
        }
    } else {
        request.body.into_bytes()
    };

    // Verify Discord signature
    if !verify_signature(&request.headers, &body, public_key) {
        tracing::warn!("signature verification failed");
        return Ok(text_response(401, "invalid request signature"));
    }

    // Parse interaction
    let (worker_request, ack) = match classify(&body) {
        Ok(Classified::Ping) => return json_response(&InteractionResponse::pong()),
        Ok(Classified::Deferred { request, ack }) => (request, ack),
        Err(e) => {
            tracing::warn!(error = %e, "rejecting interaction");
            return Ok(text_response(400, "bad request"));
        }
    };

    // Hand off to the worker, then acknowledge
    match dispatcher.dispatch(&worker_request).await {
        Ok(()) => json_response(&ack),
        Err(e) => {
            tracing::error!(
                interaction_id = %worker_request.interaction_id,
                error = %e,
                "failed to hand off interaction"
            );
            json_response(&InteractionResponse::ephemeral(format!(
                "処理の開始に失敗しました: {e}"
            )))
        }
    }
}

pub fn classify(body: &[u8]) -> Result<Classified, ClassifyError> {
    let interaction: Interaction = serde_json::from_slice(body)?;

    let action = match interaction.kind {
        InteractionType::Ping => return Ok(Classified::Ping),
        InteractionType::ApplicationCommand => {
            let data: CommandData = serde_json::from_value(
                interaction.data.clone().ok_or(ClassifyError::Missing("data"))?,
            )?;
            WorkerAction::Command {
                command_name: data.name,
                command_args: flatten_options(&data.options)?,
            }
        }
        InteractionType::MessageComponent => {
            let data: ComponentData = serde_json::from_value(
                interaction.data.clone().ok_or(ClassifyError::Missing("data"))?,
            )?;
            WorkerAction::Component {
                custom_id: data.custom_id,
            }
        }
        InteractionType::Other(_) => return Err(ClassifyError::UnknownType),
    };

    let ack = match action {
        WorkerAction::Command { .. } => InteractionResponse::deferred_message(),
        WorkerAction::Component { .. } => InteractionResponse::deferred_update(),
    };

    let channel_id = interaction
        .channel_id
        .filter(|id| !id.is_empty())
        .ok_or(ClassifyError::Missing("channel_id"))?;
    if interaction.token.is_empty() {
        return Err(ClassifyError::Missing("token"));
    }

    Ok(Classified::Deferred {
        request: WorkerRequest {
            interaction_id: interaction.id,
            interaction_token: interaction.token,
            channel_id,
            application_id: interaction.application_id,
            guild_id: interaction.guild_id,
            action,
        },
        ack,
    })
}

/// Collapses command options into one map. A sub-command contributes its
/// name under `sub_command` and its own options alongside.
pub fn flatten_options(options: &[CommandOption]) -> Result<CommandArgs, ClassifyError> {
    let mut args = CommandArgs::default();

    for option in options {
        match option.kind {
            OPTION_SUB_COMMAND => {
                args.insert(CommandArgs::SUB_COMMAND, option.name.clone().into());
                for nested in &option.options {
                    if !nested.options.is_empty()
                        || matches!(nested.kind, OPTION_SUB_COMMAND | OPTION_SUB_COMMAND_GROUP)
                    {
                        return Err(ClassifyError::TooDeep(nested.name.clone()));
                    }
                    args.insert(nested.name.clone(), nested.value.clone().unwrap_or_default());
                }
            }
            OPTION_SUB_COMMAND_GROUP => return Err(ClassifyError::TooDeep(option.name.clone())),
            _ => args.insert(option.name.clone(), option.value.clone().unwrap_or_default()),
        }
    }

    Ok(args)
}
