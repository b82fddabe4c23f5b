use anyhow::{Result, anyhow};
use chrono::FixedOffset;
use futures::{StreamExt, TryStreamExt, stream};
use std::time::Duration;

use crate::domain::email::RenderedEmail;
use crate::mail::decoders::{DEFAULT_TIME_FORMAT, format_internal_date};
use crate::mail::mailbox::{GmailMessage, Mailbox};
use crate::mail::payload::{NO_CONTENT_PLACEHOLDER, extract_body};

pub const UNKNOWN_SENDER: &str = "unknown sender";
pub const NO_SUBJECT: &str = "no subject";

#[derive(Debug, Clone)]
pub struct InboxOptions {
    pub max_results: u32,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
    pub time_format: String,
    /// `None` renders times in the server's local zone.
    pub utc_offset: Option<FixedOffset>,
}

impl Default for InboxOptions {
    fn default() -> Self {
        Self {
            max_results: 50,
            max_concurrent_fetches: 10,
            fetch_timeout: Duration::from_secs(15),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            utc_offset: None,
        }
    }
}

/// Messages addressed to `recipient`, rendered for display, in search order.
///
/// `recipient` must already be a normalized single address. The search and
/// each fetch are bounded by `fetch_timeout`. Fetches run concurrently up to
/// `max_concurrent_fetches`. The batch is all-or-nothing: the first fetch
/// that fails or times out fails the whole call and the rest are dropped.
pub async fn fetch_inbox_for(
    mailbox: &dyn Mailbox,
    recipient: &str,
    opts: &InboxOptions,
) -> Result<Vec<RenderedEmail>> {
    // quoted so the address is matched as one term
    let query = format!("to:\"{recipient}\"");
    let refs = tokio::time::timeout(opts.fetch_timeout, mailbox.search(&query, opts.max_results))
        .await
        .map_err(|_| anyhow!("timed out searching {query}"))??;
    if refs.is_empty() {
        return Ok(vec![]);
    }
    log::debug!("{} messages match {query}", refs.len());

    stream::iter(refs)
        .map(|r| async move {
            let msg = tokio::time::timeout(opts.fetch_timeout, mailbox.get_message(&r.id))
                .await
                .map_err(|_| anyhow!("timed out fetching message {}", r.id))??;
            Ok::<_, anyhow::Error>(render_message(&msg, opts))
        })
        // `buffered` yields in input order regardless of completion order
        .buffered(opts.max_concurrent_fetches.max(1))
        .try_collect()
        .await
}

pub fn render_message(msg: &GmailMessage, opts: &InboxOptions) -> RenderedEmail {
    let payload = msg.payload.as_ref();
    let from = payload
        .and_then(|p| p.header("From"))
        .unwrap_or(UNKNOWN_SENDER)
        .to_string();
    let subject = payload
        .and_then(|p| p.header("Subject"))
        .unwrap_or(NO_SUBJECT)
        .to_string();
    let body = payload
        .map(extract_body)
        .unwrap_or_else(|| NO_CONTENT_PLACEHOLDER.to_string());
    let time = format_internal_date(msg.internal_date.as_deref(), opts.utc_offset, &opts.time_format);

    RenderedEmail {
        from,
        subject,
        body,
        time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::mailbox::MessageRef;
    use crate::mail::payload::{Header, PartBody, PayloadNode};
    use async_trait::async_trait;
    use base64::{Engine as _, engine::general_purpose};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory mailbox; per-message delays let tests reorder completions.
    #[derive(Default)]
    struct FakeMailbox {
        ids: Vec<String>,
        delays_ms: HashMap<String, u64>,
        search_delay_ms: u64,
        failing: Option<String>,
        queries: Mutex<Vec<(String, u32)>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl FakeMailbox {
        fn with_ids(ids: &[&str]) -> Self {
            Self {
                ids: ids.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    fn message(id: &str) -> GmailMessage {
        GmailMessage {
            id: id.into(),
            thread_id: None,
            internal_date: Some("0".into()),
            payload: Some(PayloadNode {
                mime_type: Some("text/html".into()),
                headers: vec![
                    Header {
                        name: "from".into(),
                        value: format!("sender-{id}"),
                    },
                    Header {
                        name: "SUBJECT".into(),
                        value: format!("subject-{id}"),
                    },
                ],
                body: Some(PartBody {
                    data: Some(general_purpose::URL_SAFE_NO_PAD.encode(format!("body-{id}"))),
                    ..Default::default()
                }),
                parts: vec![],
            }),
        }
    }

    #[async_trait]
    impl Mailbox for FakeMailbox {
        async fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageRef>> {
            tokio::time::sleep(Duration::from_millis(self.search_delay_ms)).await;
            self.queries
                .lock()
                .unwrap()
                .push((query.to_string(), max_results));
            Ok(self
                .ids
                .iter()
                .map(|id| MessageRef {
                    id: id.clone(),
                    thread_id: None,
                })
                .collect())
        }

        async fn get_message(&self, id: &str) -> Result<GmailMessage> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(ms) = self.delays_ms.get(id) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.failing.as_deref() == Some(id) {
                return Err(anyhow!("boom on {id}"));
            }
            Ok(message(id))
        }
    }

    fn utc_opts() -> InboxOptions {
        InboxOptions {
            utc_offset: FixedOffset::east_opt(0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_search_is_empty_inbox() {
        let mailbox = FakeMailbox::default();
        let out = fetch_inbox_for(&mailbox, "a@x.com", &utc_opts()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn searches_by_recipient_with_cap() {
        let mailbox = FakeMailbox::default();
        fetch_inbox_for(&mailbox, "a@x.com", &utc_opts()).await.unwrap();
        let queries = mailbox.queries.lock().unwrap().clone();
        assert_eq!(queries, vec![("to:\"a@x.com\"".to_string(), 50)]);
    }

    #[tokio::test]
    async fn keeps_search_order_when_completions_arrive_reversed() {
        let mut mailbox = FakeMailbox::with_ids(&["m1", "m2", "m3"]);
        mailbox.delays_ms = HashMap::from([
            ("m1".to_string(), 60),
            ("m2".to_string(), 30),
            ("m3".to_string(), 0),
        ]);

        let out = fetch_inbox_for(&mailbox, "a@x.com", &utc_opts()).await.unwrap();
        let subjects: Vec<_> = out.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, ["subject-m1", "subject-m2", "subject-m3"]);
        assert_eq!(out[0].from, "sender-m1");
        assert_eq!(out[0].body, "body-m1");
        assert_eq!(out[0].time, "01/01/1970, 00.00.00");
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let ids: Vec<String> = (0..8).map(|i| format!("m{i}")).collect();
        let mut mailbox = FakeMailbox::with_ids(&ids.iter().map(String::as_str).collect::<Vec<_>>());
        mailbox.delays_ms = ids.iter().map(|id| (id.clone(), 20)).collect();

        let opts = InboxOptions {
            max_concurrent_fetches: 3,
            ..utc_opts()
        };
        let out = fetch_inbox_for(&mailbox, "a@x.com", &opts).await.unwrap();
        assert_eq!(out.len(), 8);
        let peak = mailbox.peak_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak}");
        assert!(peak >= 2, "fetches never overlapped");
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch() {
        let mut mailbox = FakeMailbox::with_ids(&["m1", "m2", "m3"]);
        mailbox.failing = Some("m2".into());

        let err = fetch_inbox_for(&mailbox, "a@x.com", &utc_opts())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom on m2"));
    }

    #[tokio::test]
    async fn slow_fetch_times_out_the_batch() {
        let mut mailbox = FakeMailbox::with_ids(&["m1", "slow"]);
        mailbox.delays_ms = HashMap::from([("slow".to_string(), 5_000)]);

        let opts = InboxOptions {
            fetch_timeout: Duration::from_millis(50),
            ..utc_opts()
        };
        let err = fetch_inbox_for(&mailbox, "a@x.com", &opts).await.unwrap_err();
        assert!(err.to_string().contains("timed out fetching message slow"));
    }

    #[tokio::test]
    async fn slow_search_times_out() {
        let mut mailbox = FakeMailbox::with_ids(&["m1"]);
        mailbox.search_delay_ms = 5_000;

        let opts = InboxOptions {
            fetch_timeout: Duration::from_millis(50),
            ..utc_opts()
        };
        let err = fetch_inbox_for(&mailbox, "a@x.com", &opts).await.unwrap_err();
        assert!(err.to_string().contains("timed out searching"), "{err}");
    }

    #[test]
    fn missing_headers_and_payload_use_defaults() {
        let msg = GmailMessage {
            id: "bare".into(),
            ..Default::default()
        };
        let out = render_message(&msg, &utc_opts());
        assert_eq!(out.from, UNKNOWN_SENDER);
        assert_eq!(out.subject, NO_SUBJECT);
        assert_eq!(out.body, NO_CONTENT_PLACEHOLDER);
        assert_eq!(out.time, crate::mail::decoders::INVALID_DATE);
    }
}
