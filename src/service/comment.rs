//! Comment service
//!
//! Threads of user comments attached to a category or an item.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::thread::{CommentNode, build_thread};
use crate::data::{Attachment, Comment, Database, EntityId, Profile};
use crate::error::AppError;
use crate::events::{CommentEvent, EventBus};
use crate::metrics::COMMENTS_POSTED_TOTAL;

fn attachment_kind(attachment: &Attachment) -> &'static str {
    match attachment {
        Attachment::Category(_) => "category",
        Attachment::Item(_) => "item",
    }
}

/// Comment service
pub struct CommentService {
    db: Arc<Database>,
    events: Arc<EventBus>,
    max_length: usize,
    max_depth: usize,
}

impl CommentService {
    pub fn new(
        db: Arc<Database>,
        events: Arc<EventBus>,
        max_length: usize,
        max_depth: usize,
    ) -> Self {
        Self {
            db,
            events,
            max_length,
            max_depth,
        }
    }

    async fn ensure_attachment_exists(&self, attachment: &Attachment) -> Result<(), AppError> {
        let exists = match attachment {
            Attachment::Category(id) => self.db.get_category(id).await?.is_some(),
            Attachment::Item(id) => self.db.get_item(id).await?.is_some(),
        };
        if exists { Ok(()) } else { Err(AppError::NotFound) }
    }

    /// Reply forest for a category or item, newest first
    pub async fn thread(&self, attachment: &Attachment) -> Result<Vec<CommentNode>, AppError> {
        self.ensure_attachment_exists(attachment).await?;
        let comments = self.db.list_comments(attachment).await?;
        Ok(build_thread(comments))
    }

    /// Post a comment or a reply
    ///
    /// # Errors
    /// - `NotFound` if the category/item does not exist
    /// - `Validation` for empty or oversized content, a parent that is
    ///   missing or belongs to a different thread, or a reply nested deeper
    ///   than `max_depth`
    pub async fn post(
        &self,
        attachment: Attachment,
        author: &Profile,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Comment, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("comment content is required".to_string()));
        }
        if content.chars().count() > self.max_length {
            return Err(AppError::Validation(format!(
                "comment exceeds {} characters",
                self.max_length
            )));
        }

        self.ensure_attachment_exists(&attachment).await?;

        let parent_id = parent_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(parent_id) = parent_id {
            let parent = self.db.get_comment(parent_id).await?.ok_or_else(|| {
                AppError::Validation(format!("parent comment {parent_id} does not exist"))
            })?;
            if parent.attachment()? != attachment {
                return Err(AppError::Validation(
                    "parent comment belongs to a different thread".to_string(),
                ));
            }
            let depth = self.db.comment_depth(&parent.id, self.max_depth).await? + 1;
            if depth > self.max_depth {
                return Err(AppError::Validation(format!(
                    "replies cannot nest more than {} levels",
                    self.max_depth
                )));
            }
        }

        let comment = Comment {
            id: EntityId::new().0,
            category_id: attachment.category_id().map(str::to_string),
            item_id: attachment.item_id().map(str::to_string),
            parent_id: parent_id.map(str::to_string),
            user_id: author.id.clone(),
            content: content.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.db.insert_comment(&comment).await?;

        COMMENTS_POSTED_TOTAL
            .with_label_values(&[attachment_kind(&attachment)])
            .inc();
        tracing::debug!(
            comment_id = %comment.id,
            user_id = %comment.user_id,
            is_reply = comment.parent_id.is_some(),
            "Comment posted"
        );
        self.events
            .publish(CommentEvent::created(attachment, comment.clone()));

        Ok(comment)
    }

    /// Delete a comment and its replies
    ///
    /// Allowed for the author and for admins.
    pub async fn delete(&self, id: &str, actor: &Profile) -> Result<(), AppError> {
        let comment = self.db.get_comment(id).await?.ok_or(AppError::NotFound)?;
        if comment.user_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden);
        }

        if !self.db.delete_comment(id).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!(comment_id = %id, actor = %actor.id, "Comment deleted");

        Ok(())
    }

    /// Live `comment.created` events
    pub fn subscribe(&self) -> broadcast::Receiver<CommentEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::data::{Category, Item, Role};

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service-comment.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    async fn seed_catalog(db: &Database) {
        let now = Utc::now();
        db.insert_category(&Category {
            id: "cat".to_string(),
            name: "Gaming".to_string(),
            description: None,
            image_url: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
        db.insert_item(&Item {
            id: "item".to_string(),
            category_id: Some("cat".to_string()),
            name: "Steam Wallet".to_string(),
            description: None,
            price_cents: 1000,
            image_url: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    }

    async fn seed_profile(db: &Database, id: &str, role: Role) -> Profile {
        db.ensure_profile(id, None).await.unwrap();
        db.set_profile_role(id, role).await.unwrap();
        db.get_profile(id).await.unwrap().unwrap()
    }

    fn create_service(db: Arc<Database>) -> (CommentService, Arc<EventBus>) {
        let events = Arc::new(EventBus::new(16));
        (CommentService::new(db, events.clone(), 20, 2), events)
    }

    #[tokio::test]
    async fn post_and_reply_build_a_thread() {
        let (db, _temp_dir) = create_test_db().await;
        seed_catalog(&db).await;
        let alice = seed_profile(&db, "alice", Role::User).await;
        let (service, _) = create_service(db);
        let item = Attachment::Item("item".to_string());

        let root = service.post(item.clone(), &alice, "  works?  ", None).await.unwrap();
        assert_eq!(root.content, "works?");
        service
            .post(item.clone(), &alice, "yes", Some(&root.id))
            .await
            .unwrap();

        let thread = service.thread(&item).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].comment.id, root.id);
        assert_eq!(thread[0].replies.len(), 1);
        assert_eq!(thread[0].replies[0].comment.content, "yes");
    }

    #[tokio::test]
    async fn post_publishes_created_event() {
        let (db, _temp_dir) = create_test_db().await;
        seed_catalog(&db).await;
        let alice = seed_profile(&db, "alice", Role::User).await;
        let (service, _) = create_service(db);
        let mut feed = service.subscribe();

        let comment = service
            .post(Attachment::Category("cat".to_string()), &alice, "hello", None)
            .await
            .unwrap();

        let event = feed.recv().await.unwrap();
        assert_eq!(event.event_type, "comment.created");
        assert_eq!(event.comment.id, comment.id);
        assert_eq!(event.attachment, Attachment::Category("cat".to_string()));
    }

    #[tokio::test]
    async fn post_validates_content_and_targets() {
        let (db, _temp_dir) = create_test_db().await;
        seed_catalog(&db).await;
        let alice = seed_profile(&db, "alice", Role::User).await;
        let (service, _) = create_service(db);
        let item = Attachment::Item("item".to_string());

        assert!(matches!(
            service.post(item.clone(), &alice, "   ", None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.post(item.clone(), &alice, &"x".repeat(21), None).await,
            Err(AppError::Validation(_))
        ));
        // Multi-byte characters count once each.
        assert!(service.post(item.clone(), &alice, &"é".repeat(20), None).await.is_ok());
        assert!(matches!(
            service
                .post(Attachment::Item("ghost".to_string()), &alice, "hi", None)
                .await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            service.post(item, &alice, "hi", Some("missing")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn reply_must_stay_in_parent_thread() {
        let (db, _temp_dir) = create_test_db().await;
        seed_catalog(&db).await;
        let alice = seed_profile(&db, "alice", Role::User).await;
        let (service, _) = create_service(db);

        let on_category = service
            .post(Attachment::Category("cat".to_string()), &alice, "first", None)
            .await
            .unwrap();

        assert!(matches!(
            service
                .post(
                    Attachment::Item("item".to_string()),
                    &alice,
                    "wrong thread",
                    Some(&on_category.id),
                )
                .await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn replies_stop_at_max_depth() {
        let (db, _temp_dir) = create_test_db().await;
        seed_catalog(&db).await;
        let alice = seed_profile(&db, "alice", Role::User).await;
        let (service, _) = create_service(db.clone());
        let item = Attachment::Item("item".to_string());

        let root = service.post(item.clone(), &alice, "root", None).await.unwrap();
        let first = service
            .post(item.clone(), &alice, "level 1", Some(&root.id))
            .await
            .unwrap();
        let second = service
            .post(item.clone(), &alice, "level 2", Some(&first.id))
            .await
            .unwrap();
        assert_eq!(db.comment_depth(&second.id, 10).await.unwrap(), 2);

        assert!(matches!(
            service.post(item.clone(), &alice, "level 3", Some(&second.id)).await,
            Err(AppError::Validation(message)) if message.contains("2 levels")
        ));
        // Siblings at an allowed level are still fine.
        assert!(service
            .post(item.clone(), &alice, "another level 2", Some(&first.id))
            .await
            .is_ok());
        assert_eq!(service.thread(&item).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn depth_walk_is_bounded() {
        let (db, _temp_dir) = create_test_db().await;
        seed_catalog(&db).await;
        seed_profile(&db, "alice", Role::User).await;
        let item = Attachment::Item("item".to_string());

        let mut parent: Option<String> = None;
        for i in 0..10 {
            let comment = Comment {
                id: format!("c{i}"),
                category_id: None,
                item_id: Some("item".to_string()),
                parent_id: parent.clone(),
                user_id: "alice".to_string(),
                content: "deep".to_string(),
                created_at: Utc::now(),
            };
            db.insert_comment(&comment).await.unwrap();
            parent = Some(comment.id);
        }

        assert_eq!(db.comment_depth("c0", 3).await.unwrap(), 0);
        assert_eq!(db.comment_depth("c9", 100).await.unwrap(), 9);
        assert_eq!(db.comment_depth("c9", 3).await.unwrap(), 4);
        assert_eq!(db.list_comments(&item).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn delete_allowed_for_author_and_admin_only() {
        let (db, _temp_dir) = create_test_db().await;
        seed_catalog(&db).await;
        let alice = seed_profile(&db, "alice", Role::User).await;
        let bob = seed_profile(&db, "bob", Role::User).await;
        let admin = seed_profile(&db, "admin", Role::Admin).await;
        let (service, _) = create_service(db);
        let item = Attachment::Item("item".to_string());

        let first = service.post(item.clone(), &alice, "one", None).await.unwrap();
        let reply = service
            .post(item.clone(), &bob, "reply", Some(&first.id))
            .await
            .unwrap();
        let second = service.post(item.clone(), &alice, "two", None).await.unwrap();

        assert!(matches!(
            service.delete(&first.id, &bob).await,
            Err(AppError::Forbidden)
        ));

        service.delete(&first.id, &alice).await.unwrap();
        service.delete(&second.id, &admin).await.unwrap();

        assert!(service.thread(&item).await.unwrap().is_empty());
        assert!(matches!(
            service.delete(&reply.id, &bob).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn thread_of_unknown_item_is_not_found() {
        let (db, _temp_dir) = create_test_db().await;
        let (service, _) = create_service(db);

        assert!(matches!(
            service.thread(&Attachment::Item("ghost".to_string())).await,
            Err(AppError::NotFound)
        ));
    }
}
