//! Comment change feed
//!
//! In-process fan-out of comment events over a `tokio::sync::broadcast`
//! channel. The SSE endpoint subscribes here; nothing is persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::data::{Attachment, Comment};

/// Event name sent as the SSE `event:` field
pub const COMMENT_CREATED: &str = "comment.created";

/// A change to a comment thread
#[derive(Debug, Clone, Serialize)]
pub struct CommentEvent {
    /// Dot-separated event name, e.g. `"comment.created"`
    pub event_type: &'static str,
    /// Thread the comment belongs to
    pub attachment: Attachment,
    pub comment: Comment,
    pub timestamp: DateTime<Utc>,
}

impl CommentEvent {
    pub fn created(attachment: Attachment, comment: Comment) -> Self {
        Self {
            event_type: COMMENT_CREATED,
            attachment,
            comment,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast hub shared via `Arc<EventBus>`
pub struct EventBus {
    sender: broadcast::Sender<CommentEvent>,
}

impl EventBus {
    /// Create a bus buffering at most `capacity` events per subscriber.
    ///
    /// Slow subscribers observe `RecvError::Lagged` and skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; dropped when nobody listens.
    pub fn publish(&self, event: CommentEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommentEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    fn event(id: &str) -> CommentEvent {
        CommentEvent::created(
            Attachment::Item("item".to_string()),
            Comment {
                id: id.to_string(),
                category_id: None,
                item_id: Some("item".to_string()),
                parent_id: None,
                user_id: "user".to_string(),
                content: "hi".to_string(),
                created_at: Utc::now(),
            },
        )
    }

    #[tokio::test]
    async fn every_subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(event("c1"));

        assert_eq!(first.recv().await.unwrap().comment.id, "c1");
        let received = second.recv().await.unwrap();
        assert_eq!(received.event_type, COMMENT_CREATED);
        assert_eq!(received.attachment, Attachment::Item("item".to_string()));
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(8);
        bus.publish(event("nobody"));

        let mut rx = bus.subscribe();
        bus.publish(event("c2"));

        assert_eq!(rx.recv().await.unwrap().comment.id, "c2");
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_old_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for id in ["c1", "c2", "c3"] {
            bus.publish(event(id));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().comment.id, "c2");
    }
}
