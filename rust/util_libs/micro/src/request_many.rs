use async_nats::{HeaderMap, Message};
use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Applied when neither `max_wait` nor `max_interval` is set.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(500);

/// Subject that terminates the stream form when `stop_on_sentinel` is set.
pub const SENTINEL_SUBJECT: &str = "sentinel";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SentinelMode {
    /// Batch form: a reply with an empty payload terminates collection.
    EmptyPayload,
    /// Stream form: a reply on the sentinel subject terminates collection.
    Subject,
}

/// Collect an unknown number of replies from an unknown number of
/// responders.
///
/// One request is published with a fresh reply inbox; collection ends
/// when the first of the configured termination conditions fires:
/// the overall `max_wait` deadline, `max_count` received replies,
/// `max_interval` elapsing with no reply, or a sentinel reply.
///
/// An empty reply set is valid output, not an error.
#[derive(Clone, Debug)]
pub struct RequestMany {
    client: async_nats::Client,
    max_wait: Option<Duration>,
    max_count: Option<u64>,
    max_interval: Option<Duration>,
    stop_on_sentinel: bool,
}

impl RequestMany {
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            client,
            max_wait: None,
            max_count: None,
            max_interval: None,
            stop_on_sentinel: false,
        }
    }

    /// Overall deadline, counted from publication.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Stop after this many replies; the subscription is auto-unsubscribed
    /// at that count.
    pub fn max_count(mut self, max_count: u64) -> Self {
        self.max_count = Some(max_count);
        self
    }

    /// Stop when this much time elapses without a reply.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    /// Stop when a sentinel reply arrives.
    pub fn stop_on_sentinel(mut self) -> Self {
        self.stop_on_sentinel = true;
        self
    }

    /// Collect all replies into a list.
    pub async fn request(
        &self,
        subject: String,
        payload: Bytes,
        headers: Option<HeaderMap>,
    ) -> Result<Vec<Message>, async_nats::Error> {
        let stream = self
            .collect(subject, payload, headers, SentinelMode::EmptyPayload)
            .await?;
        Ok(stream.collect().await)
    }

    /// Stream each reply as it arrives, closing on any termination
    /// condition.
    pub async fn stream(
        &self,
        subject: String,
        payload: Bytes,
        headers: Option<HeaderMap>,
    ) -> Result<impl Stream<Item = Message> + Send + Unpin, async_nats::Error> {
        self.collect(subject, payload, headers, SentinelMode::Subject)
            .await
    }

    async fn collect(
        &self,
        subject: String,
        payload: Bytes,
        headers: Option<HeaderMap>,
        sentinel_mode: SentinelMode,
    ) -> Result<Pin<Box<dyn Stream<Item = Message> + Send>>, async_nats::Error> {
        let inbox = self.client.new_inbox();
        let mut sub = self.client.subscribe(inbox.clone()).await?;
        if let Some(max_count) = self.max_count {
            sub.unsubscribe_after(max_count).await?;
        }

        match headers {
            Some(headers) => {
                self.client
                    .publish_with_reply_and_headers(subject, inbox, headers, payload)
                    .await?
            }
            None => {
                self.client
                    .publish_with_reply(subject, inbox, payload)
                    .await?
            }
        }
        self.client.flush().await?;

        let max_wait = match (self.max_wait, self.max_interval) {
            (None, None) => Some(DEFAULT_MAX_WAIT),
            (max_wait, _) => max_wait,
        };
        let max_interval = self.max_interval;
        let max_count = self.max_count;
        let stop_on_sentinel = self.stop_on_sentinel;

        Ok(Box::pin(stream! {
            let mut deadline: Pin<Box<dyn Future<Output = ()> + Send>> = match max_wait {
                Some(wait) => Box::pin(tokio::time::sleep(wait)),
                None => Box::pin(std::future::pending()),
            };
            let mut received: u64 = 0;
            loop {
                let next = async {
                    match max_interval {
                        Some(idle) => tokio::time::timeout(idle, sub.next()).await.ok().flatten(),
                        None => sub.next().await,
                    }
                };
                // None covers the overall deadline, the idle interval, the
                // max_count auto-unsubscribe and a closed connection alike.
                let maybe_msg = tokio::select! {
                    _ = &mut deadline => None,
                    maybe_msg = next => maybe_msg,
                };
                let Some(msg) = maybe_msg else { break };
                if stop_on_sentinel && is_sentinel(sentinel_mode, &msg) {
                    break;
                }
                received += 1;
                yield msg;
                if Some(received) == max_count {
                    break;
                }
            }
            let _ = sub.unsubscribe().await;
        }))
    }
}

fn is_sentinel(mode: SentinelMode, msg: &Message) -> bool {
    match mode {
        SentinelMode::EmptyPayload => msg.payload.is_empty(),
        SentinelMode::Subject => msg.subject.as_str() == SENTINEL_SUBJECT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_utils::nats_message::NatsMessage;

    #[test]
    fn test_batch_sentinel_is_an_empty_payload() {
        let empty = NatsMessage::new("_INBOX.reply", Vec::new()).into_message();
        assert!(is_sentinel(SentinelMode::EmptyPayload, &empty));

        let full = NatsMessage::new("_INBOX.reply", b"data".to_vec()).into_message();
        assert!(!is_sentinel(SentinelMode::EmptyPayload, &full));

        // The subject plays no role in the batch form.
        let named = NatsMessage::new(SENTINEL_SUBJECT, b"data".to_vec()).into_message();
        assert!(!is_sentinel(SentinelMode::EmptyPayload, &named));
    }

    #[test]
    fn test_stream_sentinel_is_the_subject() {
        let sentinel = NatsMessage::new(SENTINEL_SUBJECT, b"data".to_vec()).into_message();
        assert!(is_sentinel(SentinelMode::Subject, &sentinel));

        // An empty payload alone does not terminate the stream form.
        let empty = NatsMessage::new("_INBOX.reply", Vec::new()).into_message();
        assert!(!is_sentinel(SentinelMode::Subject, &empty));
    }
}
