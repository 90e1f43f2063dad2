use chrono::{DateTime, Utc};

use crate::date::parse_date_input;
use crate::error::WorkerError;
use crate::links::collect_links;
use crate::types::{CommandArgs, WorkerRequest};
use crate::worker::Worker;

/// Discord rejects message content longer than this.
const MESSAGE_LIMIT: usize = 2000;
const TRUNCATED_LENGTH: usize = 1900;
const TRUNCATION_MARKER: &str = "\n...(略)\n```";
const NO_TITLE: &str = "(no title)";

impl Worker {
    /// `/summarize date:<MMDD|YYYYMMDD> [with_title]`: lists every link
    /// posted in the channel on that day.
    pub(crate) async fn summarize(
        &self,
        request: &WorkerRequest,
        args: &CommandArgs,
        now: DateTime<Utc>,
    ) -> Result<(), WorkerError> {
        // Parse date window
        let input = args.str("date").unwrap_or_default();
        let (start, end) = match parse_date_input(input, &now) {
            Ok(window) => window,
            Err(e) => {
                return self
                    .reply_error(request, &format!("日付の形式が正しくありません: {e}"))
                    .await
            }
        };

        // Collect links from channel history
        let harvest = match collect_links(
            self.surface.as_ref(),
            &request.channel_id,
            start,
            end,
            &request.application_id,
        )
        .await
        {
            Ok(harvest) => harvest,
            Err(e) => {
                return self
                    .reply_error(request, &format!("メッセージの取得に失敗しました: {e}"))
                    .await
            }
        };

        tracing::info!(
            channel_id = %request.channel_id,
            messages = harvest.message_count,
            links = harvest.links.len(),
            "collected links"
        );

        if harvest.links.is_empty() {
            self.reply(
                request,
                format!(
                    "{} のリンクは見つかりませんでした。(検索数: {}件)",
                    start.format("%Y/%m/%d"),
                    harvest.message_count
                ),
            )
            .await?;
            return Ok(());
        }

        // Fetch titles when asked
        let titles = if args.bool("with_title").unwrap_or(false) {
            Some(self.titles.fetch_all(&harvest.links).await)
        } else {
            None
        };

        let digest = truncate_digest(render_digest(&harvest.links, titles.as_deref()));
        self.reply(request, digest).await?;
        Ok(())
    }
}

/// Builds the code-block digest. `titles[i]` belongs to `links[i]`; a
/// `None` slot is a lookup that failed.
pub fn render_digest(links: &[String], titles: Option<&[Option<String>]>) -> String {
    let mut digest = format!("count: {}\n```\n", links.len());

    match titles {
        Some(titles) => {
            for (index, link) in links.iter().enumerate() {
                let title = titles
                    .get(index)
                    .and_then(Option::as_deref)
                    .unwrap_or(NO_TITLE);
                if !title.is_empty() {
                    digest.push_str(title);
                    digest.push('\n');
                }
                digest.push_str(link);
                digest.push_str("\n\n");
            }
        }
        None => {
            digest.push_str(&links.join("\n"));
            digest.push('\n');
        }
    }

    digest.push_str("```");
    digest
}

/// Cuts an oversized digest down so it fits in one message, closing the
/// code block again.
pub fn truncate_digest(digest: String) -> String {
    if digest.chars().count() <= MESSAGE_LIMIT {
        return digest;
    }
    let mut truncated: String = digest.chars().take(TRUNCATED_LENGTH).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::MessageTarget;
    use crate::testing::{MemoryStore, RecordingSurface};
    use crate::title::TitleFetcher;
    use crate::worker::tests::{command, worker};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 2024-12-25 12:00, 14:00 and 14:30 JST, then 2024-12-26 12:00 JST.
    const MORNING: &str = "1321311456460800000";
    const NOON: &str = "1321341655449600000";
    const LATER: &str = "1321349205196800000";
    const NEXT_DAY: &str = "1321673844326400000";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 27, 0, 0, 0).unwrap()
    }

    async fn run(worker: &Worker, args: CommandArgs) -> Result<(), WorkerError> {
        let request = command("summarize", args.clone());
        worker.summarize(&request, &args, now()).await
    }

    fn args(date: &str, with_title: bool) -> CommandArgs {
        let mut args = CommandArgs::default();
        args.insert("date", json!(date));
        args.insert("with_title", json!(with_title));
        args
    }

    #[test]
    fn snowflake_fixtures_fall_on_the_right_days() {
        let day = |id: &str| {
            crate::discord::snowflake_timestamp(id)
                .unwrap()
                .with_timezone(&crate::date::jst())
                .format("%Y-%m-%d")
                .to_string()
        };
        assert_eq!(day(MORNING), "2024-12-25");
        assert_eq!(day(NOON), "2024-12-25");
        assert_eq!(day(LATER), "2024-12-25");
        assert_eq!(day(NEXT_DAY), "2024-12-26");
    }

    #[test]
    fn digest_lists_urls() {
        let links = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        assert_eq!(
            render_digest(&links, None),
            "count: 2\n```\nhttps://a.example\nhttps://b.example\n```"
        );
    }

    #[test]
    fn digest_with_titles_keeps_input_order() {
        let links = vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
            "https://c.example".to_string(),
        ];
        let titles = vec![Some("A".to_string()), None, Some(String::new())];
        assert_eq!(
            render_digest(&links, Some(&titles)),
            "count: 3\n```\nA\nhttps://a.example\n\n(no title)\nhttps://b.example\n\nhttps://c.example\n\n```"
        );
    }

    #[test]
    fn long_digests_are_truncated_with_marker() {
        let links: Vec<String> = (0..200).map(|i| format!("https://example.com/{i:04}")).collect();
        let digest = truncate_digest(render_digest(&links, None));
        assert!(digest.chars().count() <= MESSAGE_LIMIT);
        assert!(digest.ends_with("\n...(略)\n```"));
        assert!(digest.starts_with("count: 200\n```\nhttps://example.com/0000\n"));

        let short = render_digest(&links[..3], None);
        assert_eq!(truncate_digest(short.clone()), short);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let digest = "あ".repeat(1999);
        assert_eq!(truncate_digest(digest.clone()), digest);

        let truncated = truncate_digest("あ".repeat(2001));
        assert_eq!(truncated.chars().count(), TRUNCATED_LENGTH + TRUNCATION_MARKER.chars().count());
    }

    #[tokio::test]
    async fn reports_when_no_links_were_found() {
        let surface = Arc::new(RecordingSurface::default());
        surface.set_history(
            vec![
                RecordingSurface::message(NEXT_DAY, "U1", "https://tomorrow.example"),
                RecordingSurface::message(NOON, "U1", "no links here"),
                RecordingSurface::message(MORNING, "U2", "good morning"),
            ],
            100,
        );
        let worker = worker(Arc::new(MemoryStore::default()), surface.clone());

        run(&worker, args("1225", false)).await.unwrap();
        assert_eq!(
            surface.last_reply().as_deref(),
            Some("2024/12/25 のリンクは見つかりませんでした。(検索数: 2件)")
        );
    }

    #[tokio::test]
    async fn summarizes_links_oldest_first_skipping_the_bot() {
        let surface = Arc::new(RecordingSurface::default());
        surface.set_history(
            vec![
                RecordingSurface::message(LATER, "U1", "see https://b.example and https://c.example"),
                RecordingSurface::message(NOON, "A1", "https://bot.example"),
                RecordingSurface::message(MORNING, "U2", "https://a.example"),
            ],
            100,
        );
        let worker = worker(Arc::new(MemoryStore::default()), surface.clone());

        run(&worker, args("20241225", false)).await.unwrap();

        let edits = surface.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(
            edits[0].0,
            MessageTarget::Original { application_id: "A1".to_string(), token: "tok".to_string() }
        );
        assert_eq!(
            surface.last_reply().as_deref(),
            Some("count: 3\n```\nhttps://a.example\nhttps://b.example\nhttps://c.example\n```")
        );
    }

    #[tokio::test]
    async fn bad_dates_are_reported() {
        let surface = Arc::new(RecordingSurface::default());
        let worker = worker(Arc::new(MemoryStore::default()), surface.clone());

        run(&worker, args("1301", false)).await.unwrap();
        let reply = surface.last_reply().unwrap();
        assert!(reply.starts_with("エラー: 日付の形式が正しくありません: "), "{reply}");
    }

    #[tokio::test]
    async fn history_failures_are_reported() {
        let surface = Arc::new(RecordingSurface::default());
        surface.fail_history();
        let worker = worker(Arc::new(MemoryStore::default()), surface.clone());

        run(&worker, args("1225", false)).await.unwrap();
        let reply = surface.last_reply().unwrap();
        assert!(reply.starts_with("エラー: メッセージの取得に失敗しました: "), "{reply}");
    }

    #[tokio::test]
    async fn failed_title_lookups_use_placeholder() {
        // nothing serves plain http on localhost here, so the lookup fails
        let surface = Arc::new(RecordingSurface::default());
        surface.set_history(vec![RecordingSurface::message(MORNING, "U1", "http://127.0.0.1/page")], 100);
        let worker = worker(Arc::new(MemoryStore::default()), surface.clone());

        run(&worker, args("1225", true)).await.unwrap();
        assert_eq!(
            surface.last_reply().as_deref(),
            Some("count: 1\n```\n(no title)\nhttp://127.0.0.1/page\n\n```")
        );
    }

    #[tokio::test]
    async fn titles_fill_their_own_slots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><title> First </title></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let links = vec![format!("{}/first", server.uri()), format!("{}/second", server.uri())];
        let fetcher = TitleFetcher::new(Duration::from_secs(5), Some(1)).unwrap();
        let titles = fetcher.fetch_all(&links).await;
        assert_eq!(
            render_digest(&links, Some(&titles)),
            format!("count: 2\n```\nFirst\n{}\n\n(no title)\n{}\n\n```", links[0], links[1])
        );
    }
}
