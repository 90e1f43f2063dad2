use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::todo::{ItemStatus, TodoItem, TodoList};

/// Persistence for one TODO list per channel.
///
/// Writes are unconditional: two workers mutating the same channel at once
/// race, and the last `put` wins.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Returns the stored list, or an empty one keyed by `channel_id`.
    async fn get(&self, channel_id: &str) -> Result<TodoList, StoreError>;

    async fn put(&self, list: &TodoList) -> Result<(), StoreError>;
}

pub struct DynamoStore {
    client: Client,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl TodoStore for DynamoStore {
    async fn get(&self, channel_id: &str) -> Result<TodoList, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("channel_id", AttributeValue::S(channel_id.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

        match output.item() {
            Some(item) => list_from_item(item),
            None => Ok(TodoList::new(channel_id)),
        }
    }

    async fn put(&self, list: &TodoList) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(list_to_item(list)))
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

pub(crate) fn list_to_item(list: &TodoList) -> HashMap<String, AttributeValue> {
    let items = list
        .items
        .iter()
        .map(|item| {
            AttributeValue::M(HashMap::from([
                ("id".to_string(), AttributeValue::S(item.id.clone())),
                ("content".to_string(), AttributeValue::S(item.content.clone())),
                ("status".to_string(), AttributeValue::S(item.status.as_str().to_string())),
            ]))
        })
        .collect();

    HashMap::from([
        ("channel_id".to_string(), AttributeValue::S(list.channel_id.clone())),
        ("items".to_string(), AttributeValue::L(items)),
        ("message_id".to_string(), AttributeValue::S(list.message_id.clone())),
    ])
}

pub(crate) fn list_from_item(item: &HashMap<String, AttributeValue>) -> Result<TodoList, StoreError> {
    let channel_id = string_attr(item, "channel_id")?;
    let message_id = optional_string_attr(item, "message_id")?.unwrap_or_default();

    let items = match item.get("items") {
        None | Some(AttributeValue::Null(_)) => Vec::new(),
        Some(AttributeValue::L(entries)) => entries
            .iter()
            .map(|entry| match entry {
                AttributeValue::M(fields) => item_from_map(fields),
                _ => Err(StoreError::Malformed("items entry is not a map".to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(StoreError::Malformed("items is not a list".to_string())),
    };

    Ok(TodoList {
        channel_id,
        items,
        message_id,
    })
}

fn item_from_map(fields: &HashMap<String, AttributeValue>) -> Result<TodoItem, StoreError> {
    let status = string_attr(fields, "status")?;
    Ok(TodoItem {
        id: string_attr(fields, "id")?,
        content: optional_string_attr(fields, "content")?.unwrap_or_default(),
        status: ItemStatus::parse(&status)
            .ok_or_else(|| StoreError::Malformed(format!("unknown status {status:?}")))?,
    })
}

fn string_attr(fields: &HashMap<String, AttributeValue>, name: &str) -> Result<String, StoreError> {
    optional_string_attr(fields, name)?
        .ok_or_else(|| StoreError::Malformed(format!("missing attribute {name}")))
}

fn optional_string_attr(
    fields: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<Option<String>, StoreError> {
    match fields.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::S(value)) => Ok(Some(value.clone())),
        Some(_) => Err(StoreError::Malformed(format!("attribute {name} is not a string"))),
    }
}
