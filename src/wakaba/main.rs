mod config;
mod date;
mod discord;
mod dispatch;
mod error;
mod gateway;
mod links;
mod list;
mod repository;
mod signature;
mod summarize;
#[cfg(test)]
mod testing;
mod title;
mod todo;
mod types;
mod worker;

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayV2httpRequest};
use aws_lambda_events::event::sqs::SqsEvent;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;

use config::Config;
use discord::DiscordClient;
use dispatch::{Dispatcher, LambdaDispatcher, SqsDispatcher};
use error::{ConfigError, WorkerError};
use repository::DynamoStore;
use title::TitleFetcher;
use todo::ControlCodec;
use types::{GatewayRequest, WorkerTag, WorkerRequest};
use worker::Worker;

/// Clients and settings built once per cold start.
struct App {
    config: Config,
    dispatcher: Arc<dyn Dispatcher>,
    worker: Option<Worker>,
}

impl App {
    async fn from_config(config: Config) -> Result<Self, Error> {
        let aws = aws_config::load_from_env().await;

        let dispatcher: Arc<dyn Dispatcher> = match &config.queue_url {
            Some(queue_url) => Arc::new(SqsDispatcher::new(aws_sdk_sqs::Client::new(&aws), queue_url.clone())),
            None => Arc::new(LambdaDispatcher::new(
                aws_sdk_lambda::Client::new(&aws),
                config.function_name.clone(),
            )),
        };

        let worker = match &config.bot_token {
            Some(bot_token) => {
                let codec = match &config.control_secret {
                    Some(secret) => ControlCodec::signed(secret.as_bytes()).map_err(|e| ConfigError::InvalidValue {
                        key: "TODO_CONTROL_SECRET".to_string(),
                        message: e.to_string(),
                    })?,
                    None => ControlCodec::plain(),
                };
                Some(Worker::new(
                    Arc::new(DynamoStore::new(
                        aws_sdk_dynamodb::Client::new(&aws),
                        config.table_name.clone(),
                    )),
                    Arc::new(DiscordClient::new(bot_token.clone(), config.discord_api_base.clone())),
                    TitleFetcher::new(config.title_timeout, config.title_concurrency)?,
                    codec,
                ))
            }
            None => {
                tracing::warn!("DISCORD_BOT_TOKEN not set, worker events will fail");
                None
            }
        };

        Ok(Self {
            config,
            dispatcher,
            worker,
        })
    }

    fn worker(&self) -> Result<&Worker, ConfigError> {
        self.worker.as_ref().ok_or(ConfigError::Missing("DISCORD_BOT_TOKEN"))
    }
}

fn non_empty(event: &Value, pointer: &str) -> bool {
    event
        .pointer(pointer)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// Works out which of the four event shapes arrived and handles it.
async fn route_event(app: &App, event: Value) -> Result<Value, Error> {
    if non_empty(&event, "/requestContext/httpMethod") {
        let request: ApiGatewayProxyRequest = serde_json::from_value(event)?;
        return handle_http(app, request.into()).await;
    }

    if non_empty(&event, "/requestContext/http/method") {
        let request: ApiGatewayV2httpRequest = serde_json::from_value(event)?;
        return handle_http(app, request.into()).await;
    }

    if non_empty(&event, "/interaction_id") {
        let tag: WorkerTag = serde_json::from_value(event.clone())?;
        if tag.kind != "command" && tag.kind != "component" {
            return Err(WorkerError::UnknownKind(tag.kind).into());
        }
        let request: WorkerRequest = serde_json::from_value(event).map_err(WorkerError::Malformed)?;
        app.worker()?.handle(&request).await?;
        return Ok(Value::Null);
    }

    if event
        .get("Records")
        .and_then(Value::as_array)
        .is_some_and(|records| !records.is_empty())
    {
        let batch: SqsEvent = serde_json::from_value(event)?;
        let worker = app.worker()?;
        for record in batch.records {
            let Some(body) = record.body else {
                tracing::warn!(message_id = ?record.message_id, "skipping record without body");
                continue;
            };
            let request: WorkerRequest = serde_json::from_str(&body).map_err(WorkerError::Malformed)?;
            worker.handle(&request).await?;
        }
        return Ok(Value::Null);
    }

    Err("unknown event type".into())
}

async fn handle_http(app: &App, request: GatewayRequest) -> Result<Value, Error> {
    tracing::debug!(method = %request.method, "gateway request");

    let Some(public_key) = app.config.public_key.as_deref() else {
        tracing::error!("DISCORD_PUBLIC_KEY not set");
        return Ok(serde_json::to_value(gateway::text_response(500, "DISCORD_PUBLIC_KEY not set"))?);
    };

    let response = gateway::handle_gateway(request, public_key, app.dispatcher.as_ref()).await?;
    Ok(serde_json::to_value(response)?)
}

async fn function_handler(app: &App, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let result = route_event(app, event.payload).await;
    if let Err(e) = &result {
        tracing::error!(request_id = %event.context.request_id, error = %e, "invocation failed");
    }
    result
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;
    let app = App::from_config(config).await?;
    let app = &app;

    run(service_fn(move |event: LambdaEvent<Value>| async move {
        function_handler(app, event).await
    }))
    .await
}
