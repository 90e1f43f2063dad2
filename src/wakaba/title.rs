use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Cap on how much of a page is read while looking for `<title>`.
const MAX_BODY_BYTES: usize = 500 * 1024;
/// How far into the body a `<meta charset>` declaration is looked for.
const SNIFF_BYTES: usize = 1024;

static TITLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<title>(.*?)</title>").expect("title pattern compiles"));
static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset=["']?([\w-]+)"#).expect("meta charset pattern compiles")
});

#[derive(Debug, Error)]
pub enum TitleError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("status code: {0}")]
    Status(u16),
    #[error("title not found")]
    NotFound,
}

#[derive(Clone)]
pub struct TitleFetcher {
    client: Client,
    concurrency: Option<usize>,
}

impl TitleFetcher {
    pub fn new(timeout: Duration, concurrency: Option<usize>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, concurrency })
    }

    pub async fn fetch_title(&self, url: &str) -> Result<String, TitleError> {
        let mut response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(TitleError::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = MAX_BODY_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_BODY_BYTES {
                break;
            }
        }

        let html = decode_body(&body, content_type.as_deref()).replace('\n', " ");
        TITLE_PATTERN
            .captures(&html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .ok_or(TitleError::NotFound)
    }

    /// Resolves every URL concurrently. Slot `i` of the result always belongs to
    /// `urls[i]`, whatever order the fetches finish in.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<Option<String>> {
        let permits = self.concurrency.unwrap_or(urls.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        for (index, url) in urls.iter().cloned().enumerate() {
            let fetcher = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let title = match fetcher.fetch_title(&url).await {
                    Ok(title) => Some(title),
                    Err(e) => {
                        tracing::debug!(url = %url, error = %e, "title lookup failed");
                        None
                    }
                };
                (index, title)
            });
        }

        let mut slots = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, title)) => slots[index] = title,
                Err(e) => tracing::warn!(error = %e, "title task aborted"),
            }
        }
        slots
    }
}

/// Decodes a page using the charset from `Content-Type`, then from a
/// `<meta charset>` near the top, else UTF-8.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let label = content_type
        .and_then(charset_param)
        .or_else(|| {
            let head = String::from_utf8_lossy(&body[..body.len().min(SNIFF_BYTES)]);
            META_CHARSET
                .captures(&head)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        });

    let encoding = label
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}
