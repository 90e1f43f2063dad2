use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::sync::LazyLock;

use crate::discord::{snowflake_timestamp, MessageSurface};
use crate::error::DiscordError;
use crate::types::Message;

const HISTORY_PAGE_SIZE: u8 = 100;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[\w!?/+\-_~=;.,*&@#$%()'\[\]]+").expect("URL pattern compiles")
});

pub fn extract_urls(text: &str) -> Vec<String> {
    URL_PATTERN.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[derive(Debug, Default, PartialEq)]
pub struct LinkHarvest {
    pub links: Vec<String>,
    pub message_count: usize,
}

/// Walks channel history backwards and returns, oldest first, every URL
/// posted between `start` and `end` by anyone but the bot itself.
pub async fn collect_links(
    surface: &dyn MessageSurface,
    channel_id: &str,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    bot_id: &str,
) -> Result<LinkHarvest, DiscordError> {
    let mut messages: Vec<Message> = Vec::new();
    let mut before: Option<String> = None;

    'paging: loop {
        let batch = surface
            .channel_messages(channel_id, before.as_deref(), HISTORY_PAGE_SIZE)
            .await?;
        let Some(last) = batch.last() else {
            break;
        };
        before = Some(last.id.clone());

        for message in batch {
            let posted_at = snowflake_timestamp(&message.id).unwrap_or(message.timestamp);
            if posted_at > end {
                continue;
            }
            if posted_at < start {
                break 'paging;
            }
            if message.author.id == bot_id {
                continue;
            }
            messages.push(message);
        }
    }

    messages.sort_by_key(|m| m.id.parse::<u64>().unwrap_or(u64::MAX));

    let links = messages.iter().flat_map(|m| extract_urls(&m.content)).collect();
    Ok(LinkHarvest {
        links,
        message_count: messages.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::jst;
    use crate::testing::RecordingSurface;
    use chrono::TimeZone;

    #[test]
    fn extracts_urls_in_order() {
        assert_eq!(extract_urls("Check this out https://google.com"), vec!["https://google.com"]);
        assert_eq!(
            extract_urls("Start http://example.com and end https://test.org/path?q=1"),
            vec!["http://example.com", "https://test.org/path?q=1"]
        );
        assert!(extract_urls("Just some text 1234").is_empty());
        assert_eq!(
            extract_urls("Complex: https://site.com/foo_bar-baz?a=b&c=d#anchor"),
            vec!["https://site.com/foo_bar-baz?a=b&c=d#anchor"]
        );
    }

    #[test]
    fn stops_at_whitespace_and_unlisted_characters() {
        assert_eq!(
            extract_urls("<https://a.example/x> and https://b.example/y\nnext"),
            vec!["https://a.example/x", "https://b.example/y"]
        );
    }

    /// Snowflake for a given instant, so message times are driven by ids.
    fn snowflake_at(t: DateTime<FixedOffset>, seq: u64) -> String {
        let millis = (t.timestamp_millis() - 1_420_070_400_000) as u64;
        ((millis << 22) | seq).to_string()
    }

    #[tokio::test]
    async fn collects_window_oldest_first_skipping_bot() {
        let day = |h| jst().with_ymd_and_hms(2024, 12, 25, h, 0, 0).unwrap();
        let start = jst().with_ymd_and_hms(2024, 12, 25, 0, 0, 0).unwrap();
        let end = jst().with_ymd_and_hms(2024, 12, 25, 23, 59, 59).unwrap();
        let next_day = jst().with_ymd_and_hms(2024, 12, 26, 9, 0, 0).unwrap();
        let prev_day = jst().with_ymd_and_hms(2024, 12, 24, 9, 0, 0).unwrap();

        let surface = RecordingSurface::default();
        // newest first, as Discord returns them; page size 2 splits the walk
        surface.set_history(
            vec![
                RecordingSurface::message(&snowflake_at(next_day, 0), "U1", "https://tomorrow.example"),
                RecordingSurface::message(&snowflake_at(day(18), 0), "U2", "late https://b.example"),
                RecordingSurface::message(&snowflake_at(day(12), 0), "BOT", "https://bot.example"),
                RecordingSurface::message(&snowflake_at(day(9), 0), "U1", "https://a.example x https://a2.example"),
                RecordingSurface::message(&snowflake_at(prev_day, 0), "U1", "https://yesterday.example"),
            ],
            2,
        );

        let harvest = collect_links(&surface, "C1", start, end, "BOT").await.unwrap();
        assert_eq!(
            harvest.links,
            vec!["https://a.example", "https://a2.example", "https://b.example"]
        );
        assert_eq!(harvest.message_count, 2);
    }

    #[tokio::test]
    async fn empty_history_yields_nothing() {
        let surface = RecordingSurface::default();
        let start = jst().with_ymd_and_hms(2024, 12, 25, 0, 0, 0).unwrap();
        let harvest = collect_links(&surface, "C1", start, start, "BOT").await.unwrap();
        assert_eq!(harvest, LinkHarvest::default());
    }
}
