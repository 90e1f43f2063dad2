//! Per-channel TODO list and the button protocol that drives it.
//!
//! Buttons are stateless on Discord's side: everything needed to act on a
//! click is packed into its `custom_id` when the list is rendered and
//! unpacked again when the click comes back.
//!
//! ```text
//! todo:prev:<page>
//! todo:next:<page>
//! todo:complete:<page>:<item id>
//! ```
//!
//! With a signing secret configured each id carries one more field, a
//! truncated HMAC-SHA256 of everything before it.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::types::{ActionRow, Button, ButtonStyle, Embed, EmbedFooter, MessagePayload};

pub const PAGE_SIZE: usize = 10;
pub const CONTROL_NAMESPACE: &str = "todo";

const BUTTONS_PER_ROW: usize = 5;
const TAG_BYTES: usize = 8;
const EMBED_TITLE: &str = "TODO リスト";
const EMBED_COLOR: u32 = 0x00ff00;
const EMPTY_PLACEHOLDER: &str = "（タスクはありません）";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Open,
    Done,
}

impl ItemStatus {
    pub fn toggled(self) -> Self {
        match self {
            ItemStatus::Open => ItemStatus::Done,
            ItemStatus::Done => ItemStatus::Open,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Open => "open",
            ItemStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ItemStatus::Open),
            "done" => Some(ItemStatus::Done),
            _ => None,
        }
    }

    fn glyph(self) -> &'static str {
        match self {
            ItemStatus::Open => "⬜",
            ItemStatus::Done => "✅",
        }
    }

    fn button_style(self) -> ButtonStyle {
        match self {
            ItemStatus::Open => ButtonStyle::Secondary,
            ItemStatus::Done => ButtonStyle::Success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    pub channel_id: String,
    pub items: Vec<TodoItem>,
    /// Anchor message rendering this list; empty until `/list create`.
    pub message_id: String,
}

impl TodoList {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            items: Vec::new(),
            message_id: String::new(),
        }
    }

    pub fn has_anchor(&self) -> bool {
        !self.message_id.is_empty()
    }

    /// Appends an open item whose id is its 1-based position.
    pub fn add_item(&mut self, content: impl Into<String>) -> &TodoItem {
        let id = (self.items.len() + 1).to_string();
        self.items.push(TodoItem {
            id,
            content: content.into(),
            status: ItemStatus::Open,
        });
        &self.items[self.items.len() - 1]
    }

    /// Flips the item's status. Returns false when no item has that id.
    pub fn toggle(&mut self, item_id: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == item_id) {
            Some(item) => {
                item.status = item.status.toggled();
                true
            }
            None => false,
        }
    }

    pub fn page_count(&self) -> usize {
        self.items.len().div_ceil(PAGE_SIZE).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Prev { page: i64 },
    Next { page: i64 },
    Complete { page: i64, item_id: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("control {0:?} belongs to another feature")]
    Foreign(String),
    #[error("malformed control id {0:?}")]
    Malformed(String),
    #[error("control id {0:?} failed signature check")]
    BadSignature(String),
}

/// Encodes and decodes button ids, optionally sealing them with an HMAC tag.
#[derive(Clone, Default)]
pub struct ControlCodec {
    mac: Option<HmacSha256>,
}

impl ControlCodec {
    pub fn plain() -> Self {
        Self { mac: None }
    }

    pub fn signed(secret: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: Some(HmacSha256::new_from_slice(secret)?),
        })
    }

    pub fn encode(&self, control: &Control) -> String {
        let body = match control {
            Control::Prev { page } => format!("{CONTROL_NAMESPACE}:prev:{page}"),
            Control::Next { page } => format!("{CONTROL_NAMESPACE}:next:{page}"),
            Control::Complete { page, item_id } => {
                format!("{CONTROL_NAMESPACE}:complete:{page}:{item_id}")
            }
        };

        match &self.mac {
            Some(mac) => {
                let mut mac = mac.clone();
                mac.update(body.as_bytes());
                let tag = mac.finalize().into_bytes();
                format!("{body}:{}", hex::encode(&tag[..TAG_BYTES]))
            }
            None => body,
        }
    }

    pub fn decode(&self, custom_id: &str) -> Result<Control, ControlError> {
        if custom_id.split(':').next() != Some(CONTROL_NAMESPACE) {
            return Err(ControlError::Foreign(custom_id.to_string()));
        }

        let body = match &self.mac {
            Some(mac) => {
                let bad = || ControlError::BadSignature(custom_id.to_string());
                let (body, tag) = custom_id.rsplit_once(':').ok_or_else(bad)?;
                let tag = hex::decode(tag).map_err(|_| bad())?;
                if tag.len() != TAG_BYTES {
                    return Err(bad());
                }
                let mut mac = mac.clone();
                mac.update(body.as_bytes());
                mac.verify_truncated_left(&tag).map_err(|_| bad())?;
                body
            }
            None => custom_id,
        };

        let malformed = || ControlError::Malformed(custom_id.to_string());
        let parts: Vec<&str> = body.split(':').collect();
        let page = |raw: &str| raw.parse::<i64>().map_err(|_| malformed());

        match parts.as_slice() {
            [_, "prev", p] => Ok(Control::Prev { page: page(*p)? }),
            [_, "next", p] => Ok(Control::Next { page: page(*p)? }),
            [_, "complete", p, item_id] if !item_id.is_empty() => Ok(Control::Complete {
                page: page(*p)?,
                item_id: item_id.to_string(),
            }),
            _ => Err(malformed()),
        }
    }
}

/// Outcome of a button press: the page to show next and whether the list
/// changed and has to be written back first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub target_page: i64,
    pub mutated: bool,
}

pub fn apply(list: &mut TodoList, control: &Control) -> Transition {
    match control {
        Control::Prev { page } => Transition {
            target_page: page.saturating_sub(1).max(0),
            mutated: false,
        },
        // Overshooting the last page is clamped by render.
        Control::Next { page } => Transition {
            target_page: page.saturating_add(1),
            mutated: false,
        },
        Control::Complete { page, item_id } => Transition {
            target_page: *page,
            mutated: list.toggle(item_id),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedList {
    pub page: usize,
    pub page_count: usize,
    pub embed: Embed,
    pub components: Vec<ActionRow>,
}

impl RenderedList {
    pub fn into_message(self) -> MessagePayload {
        MessagePayload {
            embeds: Some(vec![self.embed]),
            components: Some(self.components),
            ..MessagePayload::default()
        }
    }
}

/// Renders one page of the list. Out-of-range pages are clamped.
pub fn render(list: &TodoList, page: i64, codec: &ControlCodec) -> RenderedList {
    let total = list.items.len();
    let page_count = list.page_count();
    let page = page.clamp(0, page_count as i64 - 1) as usize;

    let start = page * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(total);

    let mut description = String::new();
    let mut buttons = Vec::with_capacity(end - start);
    for (position, item) in list.items[start..end].iter().enumerate() {
        description.push_str(&format!("{} {}\n", item.status.glyph(), item.content));
        buttons.push(Button::new(
            (position + 1).to_string(),
            codec.encode(&Control::Complete {
                page: page as i64,
                item_id: item.id.clone(),
            }),
            item.status.button_style(),
        ));
    }
    if description.is_empty() {
        description.push_str(EMPTY_PLACEHOLDER);
    }

    let mut components: Vec<ActionRow> = buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|row| ActionRow::new(row.to_vec()))
        .collect();
    components.push(ActionRow::new(vec![
        Button::new(
            "⬅️ 前へ".to_string(),
            codec.encode(&Control::Prev { page: page as i64 }),
            ButtonStyle::Primary,
        )
        .disabled(page == 0),
        Button::new(
            "次へ ➡️".to_string(),
            codec.encode(&Control::Next { page: page as i64 }),
            ButtonStyle::Primary,
        )
        .disabled(page + 1 >= page_count),
    ]));

    RenderedList {
        page,
        page_count,
        embed: Embed {
            title: EMBED_TITLE.to_string(),
            description,
            color: EMBED_COLOR,
            footer: EmbedFooter {
                text: format!("Page {}/{} ({} items)", page + 1, page_count, total),
            },
        },
        components,
    }
}
