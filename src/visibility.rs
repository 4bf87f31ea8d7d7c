//! Post Visibility Rules
//!
//! Which posts are servable to anonymous readers and which only to admins,
//! and in what order.

use std::{cmp::Ordering, sync::Arc};

use crate::{error::AppError, models::Post};

/// Feed
///
/// An ordered, immutable snapshot of posts. Cloning shares the snapshot and
/// `iter()` may be called any number of times without side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    posts: Arc<[Post]>,
}

impl Feed {
    fn ordered(mut posts: Vec<Post>) -> Self {
        posts.sort_by(feed_order);
        Self { posts: posts.into() }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Post> {
        self.posts.iter()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn contains(&self, id: uuid::Uuid) -> bool {
        self.posts.iter().any(|p| p.id == id)
    }

    pub fn to_vec(&self) -> Vec<Post> {
        self.posts.to_vec()
    }
}

impl<'a> IntoIterator for &'a Feed {
    type Item = &'a Post;
    type IntoIter = std::slice::Iter<'a, Post>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Newest first; equal timestamps fall back to id so the order is stable.
fn feed_order(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

pub fn is_publicly_visible(post: &Post) -> bool {
    post.published
}

/// public_feed
///
/// Published posts only, newest first.
pub fn public_feed<I>(posts: I) -> Feed
where
    I: IntoIterator<Item = Post>,
{
    Feed::ordered(posts.into_iter().filter(is_publicly_visible).collect())
}

/// admin_feed
///
/// Every post regardless of `published`, in feed order.
pub fn admin_feed<I>(posts: I) -> Feed
where
    I: IntoIterator<Item = Post>,
{
    Feed::ordered(posts.into_iter().collect())
}

/// partition
///
/// Splits one snapshot into (published, drafts). Each post lands in exactly
/// one side.
pub fn partition<I>(posts: I) -> (Feed, Feed)
where
    I: IntoIterator<Item = Post>,
{
    let (published, drafts): (Vec<Post>, Vec<Post>) =
        posts.into_iter().partition(is_publicly_visible);
    (Feed::ordered(published), Feed::ordered(drafts))
}

/// public_post
///
/// Gates single-post retrieval for anonymous readers. An unpublished post is
/// reported exactly like a missing one.
pub fn public_post(post: Option<Post>) -> Result<Post, AppError> {
    post.filter(is_publicly_visible).ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn post(id: u128, day: u32, published: bool) -> Post {
        let at = Utc.with_ymd_and_hms(2025, 6, day, 10, 0, 0).unwrap();
        Post {
            id: Uuid::from_u128(id),
            title: format!("post {id}"),
            content: "body".into(),
            author_id: Uuid::from_u128(100),
            author_name: "Alice".into(),
            published,
            created_at: at,
            updated_at: at,
        }
    }

    fn ids(feed: &Feed) -> Vec<u128> {
        feed.iter().map(|p| p.id.as_u128()).collect()
    }

    #[test]
    fn public_feed_drops_drafts_and_orders_newest_first() {
        let posts = vec![post(3, 15, true), post(1, 25, true), post(4, 10, false), post(2, 20, true)];
        assert_eq!(ids(&public_feed(posts)), vec![1, 2, 3]);
    }

    #[test]
    fn ties_break_by_id() {
        let posts = vec![post(9, 1, true), post(2, 1, true), post(5, 1, true)];
        assert_eq!(ids(&public_feed(posts.clone())), vec![2, 5, 9]);
        assert_eq!(ids(&admin_feed(posts)), vec![2, 5, 9]);
    }

    #[test]
    fn public_feed_of_empty_and_all_draft_sets_is_empty() {
        assert!(public_feed(Vec::new()).is_empty());
        assert!(public_feed(vec![post(1, 1, false), post(2, 2, false)]).is_empty());
    }

    #[test]
    fn public_feed_is_idempotent_and_restartable() {
        let posts = vec![post(1, 3, true), post(2, 2, false), post(3, 1, true)];
        let once = public_feed(posts);
        let twice = public_feed(once.to_vec());
        assert_eq!(once, twice);
        assert_eq!(ids(&once), ids(&once));
        assert_eq!(once.iter().count(), (&once).into_iter().count());
    }

    #[test]
    fn admin_feed_keeps_everything() {
        let posts = vec![post(1, 1, false), post(2, 2, true)];
        assert_eq!(ids(&admin_feed(posts)), vec![2, 1]);
    }

    #[test]
    fn partition_places_each_post_once() {
        let posts = vec![post(1, 1, false), post(2, 2, true), post(3, 3, false)];
        let (published, drafts) = partition(posts.clone());
        for p in &posts {
            assert!(published.contains(p.id) ^ drafts.contains(p.id));
        }
        assert_eq!(published.len() + drafts.len(), posts.len());
    }

    #[test]
    fn unpublished_single_post_is_not_found() {
        assert!(matches!(public_post(Some(post(4, 10, false))), Err(AppError::NotFound)));
        assert!(matches!(public_post(None), Err(AppError::NotFound)));
        assert_eq!(public_post(Some(post(1, 1, true))).unwrap().id, Uuid::from_u128(1));
    }
}
