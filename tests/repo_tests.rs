#![cfg(feature = "inmem-store")]

use rbb::{
    cache::CategoryCache,
    models::NewThread,
    repo::{inmem::InMemRepo, CategoryStore, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use rbb::repo::{CategoryRepo, Repo, ThreadRepo};
use serial_test::serial;
use std::sync::Arc;

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    // isolate state: do not persist to the default snapshot path
    std::env::set_var("RBB_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

fn store(repo: InMemRepo) -> CategoryStore {
    CategoryStore::new(Arc::new(repo) as Arc<dyn Repo>, CategoryCache::new())
}

fn new_thread(subcategory_id: i64, subject: &str, message: &str) -> NewThread {
    NewThread {
        subcategory_id,
        subject: subject.into(),
        author_name: String::new(),
        author_email: String::new(),
        message: message.into(),
        file: None,
        reply_to: None,
        root_thread: None,
    }
}

fn reply_to(
    subcategory_id: i64,
    parent_id: i64,
    root_id: i64,
    subject: &str,
    message: &str,
) -> NewThread {
    NewThread {
        reply_to: Some(parent_id),
        root_thread: Some(root_id),
        ..new_thread(subcategory_id, subject, message)
    }
}

#[tokio::test]
#[serial]
async fn categories_with_subcategories_and_cache() {
    let r = repo();
    let sport = r.create_category("Sport", false).await.unwrap();
    r.create_subcategory(sport.id, "Football").await.unwrap();
    r.create_subcategory(sport.id, "Basketball").await.unwrap();

    let cats = store(r.clone());
    let all = cats.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].subcategories.len(), 2);
    assert_eq!(all[0].subcategories[0].name, "Football");

    // a later write is invisible until the cache is explicitly invalidated
    r.create_category("Programming", true).await.unwrap();
    assert_eq!(cats.get_all().await.unwrap().len(), 1);
    cats.invalidate();
    assert_eq!(cats.get_all().await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn subcategory_lookup_is_case_insensitive() {
    let r = repo();
    let tech = r.create_category("Programming", false).await.unwrap();
    let linux = r.create_subcategory(tech.id, "Linux").await.unwrap();

    let cats = store(r);
    let lower = cats.subcategory_by_name("linux").await.unwrap().unwrap();
    let upper = cats.subcategory_by_name("LINUX").await.unwrap().unwrap();
    assert_eq!(lower.subcategory.id, linux.id);
    assert_eq!(upper.subcategory.id, linux.id);
    assert_eq!(lower.category_name, "Programming");

    assert!(cats.subcategory_by_name("Unknown").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn lookup_returns_first_match_in_iteration_order() {
    // subcategory names are not unique; category-then-subcategory order wins
    let r = repo();
    let a = r.create_category("First", false).await.unwrap();
    let b = r.create_category("Second", false).await.unwrap();
    let wanted = r.create_subcategory(a.id, "General").await.unwrap();
    r.create_subcategory(b.id, "General").await.unwrap();

    let found = store(r)
        .subcategory_by_name("general")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.subcategory.id, wanted.id);
}

#[tokio::test]
#[serial]
async fn create_and_get_root_thread() {
    let r = repo();
    let c = r.create_category("Sport", false).await.unwrap();
    let sc = r.create_subcategory(c.id, "Football").await.unwrap();

    let mut new = new_thread(sc.id, "First Thread", "Hello World");
    new.author_name = "Author name".into();
    new.author_email = "author@mail.com".into();
    new.file = Some("thread_files/python.txt".into());
    let created = r.create_thread(new).await.unwrap();

    let fetched = r.get_thread(created.id).await.unwrap();
    assert_eq!(fetched.subject, "First Thread");
    assert!(fetched.reply_to.is_none());
    assert!(fetched.root_thread.is_none());
    assert!(fetched.is_root());
    assert_eq!(fetched.file_name(), Some("python.txt"));
    assert_eq!(fetched.created_date, fetched.updated_date);

    assert!(matches!(
        r.get_thread(9999).await.unwrap_err(),
        RepoError::NotFound
    ));
}

#[tokio::test]
#[serial]
async fn reply_appears_under_root() {
    let r = repo();
    let c = r.create_category("Sport", false).await.unwrap();
    let sc = r.create_subcategory(c.id, "Football").await.unwrap();

    let root = r
        .create_thread(new_thread(sc.id, "First Thread", "Hello World"))
        .await
        .unwrap();
    let reply = r
        .create_thread(reply_to(sc.id, root.id, root.id, "First Reply", "Adding"))
        .await
        .unwrap();

    let root_replies = r.root_replies(root.id).await.unwrap();
    assert_eq!(root_replies[0].id, reply.id);
    assert_eq!(root_replies[0].subject, "First Reply");
}

#[tokio::test]
#[serial]
async fn nested_reply_hangs_under_intermediate_not_root() {
    let r = repo();
    let c = r.create_category("Sport", false).await.unwrap();
    let sc = r.create_subcategory(c.id, "Football").await.unwrap();

    let root = r
        .create_thread(new_thread(sc.id, "First Thread", "Hello World"))
        .await
        .unwrap();
    let first = r
        .create_thread(reply_to(sc.id, root.id, root.id, "", "first reply"))
        .await
        .unwrap();
    let nested = r
        .create_thread(reply_to(sc.id, first.id, root.id, "", "reply to reply"))
        .await
        .unwrap();

    let under_first = r.direct_replies(first.id).await.unwrap();
    assert_eq!(under_first[0].id, nested.id);

    let under_root = r.direct_replies(root.id).await.unwrap();
    assert!(under_root.iter().all(|t| t.id != nested.id));

    // both replies share the root pointer
    let all_under_root = r.root_replies(root.id).await.unwrap();
    assert_eq!(
        all_under_root.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![first.id, nested.id]
    );
}

#[tokio::test]
#[serial]
async fn root_pointer_must_reference_a_true_root() {
    let r = repo();
    let c = r.create_category("Sport", false).await.unwrap();
    let sc = r.create_subcategory(c.id, "Football").await.unwrap();

    let root = r
        .create_thread(new_thread(sc.id, "Root", "Hello"))
        .await
        .unwrap();
    let reply = r
        .create_thread(reply_to(sc.id, root.id, root.id, "", "reply"))
        .await
        .unwrap();

    // pointing root_thread at a reply violates the depth-two contract
    let err = r
        .create_thread(reply_to(sc.id, reply.id, reply.id, "", "bad"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidLink));

    // unknown parent is a plain not-found
    let err = r
        .create_thread(reply_to(sc.id, 9999, root.id, "", "bad"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
#[serial]
async fn latest_roots_excludes_replies_and_orders_by_update() {
    let r = repo();
    let c = r.create_category("Sport", false).await.unwrap();
    let sc = r.create_subcategory(c.id, "Football").await.unwrap();

    let mut root_ids = Vec::new();
    for i in 1..=6 {
        let t = r
            .create_thread(new_thread(sc.id, &format!("Thread {i}"), "Hello"))
            .await
            .unwrap();
        root_ids.push(t.id);
    }
    // a reply carries the newest updated_date of all
    let reply = r
        .create_thread(reply_to(sc.id, root_ids[0], root_ids[0], "", "comment"))
        .await
        .unwrap();
    r.touch(reply.id).await.unwrap();
    // bump the first root so it leads the digest
    r.touch(root_ids[0]).await.unwrap();

    let latest = r.latest_roots(5).await.unwrap();
    assert_eq!(latest.len(), 5);
    assert_eq!(latest[0].id, root_ids[0]);
    assert_eq!(latest[0].subcategory_name, "Football");
    assert!(latest.iter().all(|d| d.id != reply.id));
}

#[tokio::test]
#[serial]
async fn subcategory_latest_lists_roots_newest_first() {
    let r = repo();
    let c = r.create_category("Sport", false).await.unwrap();
    let sc = r.create_subcategory(c.id, "Football").await.unwrap();
    let other = r.create_subcategory(c.id, "Basketball").await.unwrap();

    let t1 = r
        .create_thread(new_thread(sc.id, "Older", "a"))
        .await
        .unwrap();
    let t2 = r
        .create_thread(new_thread(sc.id, "Newer", "b"))
        .await
        .unwrap();
    r.create_thread(new_thread(other.id, "Elsewhere", "c"))
        .await
        .unwrap();
    r.create_thread(reply_to(sc.id, t1.id, t1.id, "", "reply"))
        .await
        .unwrap();

    let latest = r.subcategory_latest(sc.id).await.unwrap();
    assert_eq!(
        latest.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![t2.id, t1.id]
    );
}

#[tokio::test]
#[serial]
async fn touch_and_replace_message() {
    let r = repo();
    let c = r.create_category("Sport", false).await.unwrap();
    let sc = r.create_subcategory(c.id, "Football").await.unwrap();
    let t = r
        .create_thread(new_thread(sc.id, "First", "Hello World"))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    r.touch(t.id).await.unwrap();
    let touched = r.get_thread(t.id).await.unwrap();
    assert!(touched.updated_date > t.updated_date);
    assert_eq!(touched.message, "Hello World");

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    r.replace_message(t.id, "New Message").await.unwrap();
    let edited = r.get_thread(t.id).await.unwrap();
    assert_eq!(edited.message, "New Message");
    assert!(edited.updated_date > touched.updated_date);
    // created_date is immutable
    assert_eq!(edited.created_date, t.created_date);

    // updates on a missing id succeed trivially with zero effect
    r.touch(9999).await.unwrap();
    r.replace_message(9999, "noop").await.unwrap();
}

#[tokio::test]
#[serial]
async fn recent_root_replies_skips_short_threads() {
    let r = repo();
    let c = r.create_category("Sport", false).await.unwrap();
    let sc = r.create_subcategory(c.id, "Football").await.unwrap();
    let root = r
        .create_thread(new_thread(sc.id, "First Thread", "Hello World"))
        .await
        .unwrap();

    let mut ids = Vec::new();
    for subject in ["First Reply", "Second Reply", "Third Reply"] {
        let reply = r
            .create_thread(reply_to(sc.id, root.id, root.id, subject, "something"))
            .await
            .unwrap();
        ids.push(reply.id);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let replies = r.root_replies(root.id).await.unwrap();
    let recent = rbb::models::recent_root_replies(&replies);
    // three replies: the last two, ascending
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].subject, "Second Reply");
    assert_eq!(recent[1].subject, "Third Reply");

    // two or fewer: empty
    assert!(rbb::models::recent_root_replies(&replies[..2]).is_empty());
    assert!(rbb::models::recent_root_replies(&replies[..1]).is_empty());
}
