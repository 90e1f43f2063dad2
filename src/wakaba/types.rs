use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayV2httpRequest};
use aws_lambda_events::http::HeaderMap;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Lambda event shapes
// ---------------------------------------------------------------------------

/// Both API Gateway flavours collapse into this before verification.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

// Values that are not visible ASCII cannot be signature headers; drop them
fn header_strings(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

impl From<ApiGatewayProxyRequest> for GatewayRequest {
    fn from(req: ApiGatewayProxyRequest) -> Self {
        Self {
            method: req.request_context.http_method.to_string(),
            headers: header_strings(&req.headers),
            body: req.body.unwrap_or_default(),
            is_base64_encoded: req.is_base64_encoded,
        }
    }
}

impl From<ApiGatewayV2httpRequest> for GatewayRequest {
    fn from(req: ApiGatewayV2httpRequest) -> Self {
        Self {
            method: req.request_context.http.method.to_string(),
            headers: header_strings(&req.headers),
            body: req.body.unwrap_or_default(),
            is_base64_encoded: req.is_base64_encoded,
        }
    }
}

// ---------------------------------------------------------------------------
// Discord interactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum InteractionType {
    Ping,
    ApplicationCommand,
    MessageComponent,
    Other(u8),
}

impl From<u8> for InteractionType {
    fn from(value: u8) -> Self {
        match value {
            1 => InteractionType::Ping,
            2 => InteractionType::ApplicationCommand,
            3 => InteractionType::MessageComponent,
            other => InteractionType::Other(other),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

pub const OPTION_SUB_COMMAND: u8 = 1;
pub const OPTION_SUB_COMMAND_GROUP: u8 = 2;

#[derive(Debug, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Deserialize)]
pub struct ComponentData {
    pub custom_id: String,
}

pub const RESPONSE_PONG: u8 = 1;
pub const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
pub const RESPONSE_DEFERRED_CHANNEL_MESSAGE: u8 = 5;
pub const RESPONSE_DEFERRED_UPDATE_MESSAGE: u8 = 6;

pub const FLAG_EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<InteractionResponseData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionResponseData {
    pub content: String,
    pub flags: u64,
}

impl InteractionResponse {
    pub fn pong() -> Self {
        Self { kind: RESPONSE_PONG, data: None }
    }

    pub fn deferred_message() -> Self {
        Self { kind: RESPONSE_DEFERRED_CHANNEL_MESSAGE, data: None }
    }

    pub fn deferred_update() -> Self {
        Self { kind: RESPONSE_DEFERRED_UPDATE_MESSAGE, data: None }
    }

    pub fn ephemeral(content: String) -> Self {
        Self {
            kind: RESPONSE_CHANNEL_MESSAGE,
            data: Some(InteractionResponseData { content, flags: FLAG_EPHEMERAL }),
        }
    }
}

// ---------------------------------------------------------------------------
// Discord messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
}

impl From<ButtonStyle> for u8 {
    fn from(style: ButtonStyle) -> Self {
        match style {
            ButtonStyle::Primary => 1,
            ButtonStyle::Secondary => 2,
            ButtonStyle::Success => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: u8,
    pub style: ButtonStyle,
    pub label: String,
    pub custom_id: String,
    pub disabled: bool,
}

impl Button {
    pub fn new(label: String, custom_id: String, style: ButtonStyle) -> Self {
        Self { kind: 2, style, label, custom_id, disabled: false }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<Button>,
}

impl ActionRow {
    pub fn new(components: Vec<Button>) -> Self {
        Self { kind: 1, components }
    }
}

/// Body of a create/edit message call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<ActionRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Self::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: User,
    pub timestamp: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
}

// ---------------------------------------------------------------------------
// Worker hand-off
// ---------------------------------------------------------------------------

/// Flattened `name -> value` view of a command's options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandArgs(pub BTreeMap<String, Value>);

impl CommandArgs {
    pub const SUB_COMMAND: &'static str = "sub_command";

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn sub_command(&self) -> Option<&str> {
        self.str(Self::SUB_COMMAND)
    }
}

/// Payload carried from the gateway to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub interaction_id: String,
    pub interaction_token: String,
    pub channel_id: String,
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(flatten)]
    pub action: WorkerAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerAction {
    Command {
        command_name: String,
        #[serde(default)]
        command_args: CommandArgs,
    },
    Component {
        custom_id: String,
    },
}

impl WorkerAction {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerAction::Command { .. } => "command",
            WorkerAction::Component { .. } => "component",
        }
    }
}

/// Just enough of a worker payload to recognise one before decoding it fully.
#[derive(Debug, Default, Deserialize)]
pub struct WorkerTag {
    #[serde(default)]
    pub interaction_id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}
