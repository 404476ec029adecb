use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Maximum lengths enforced on thread creation (see `validate_new_thread`).
pub const SUBJECT_MAX: usize = 50;
pub const AUTHOR_NAME_MAX: usize = 150;
pub const AUTHOR_EMAIL_MAX: usize = 254;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub auth_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Subcategory {
    pub id: Id,
    pub category_id: Id,
    pub name: String,
}

/// A category with its subcategories eagerly attached, as cached and served
/// by the category store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryWithSubcategories {
    pub id: Id,
    pub name: String,
    pub auth_required: bool,
    pub subcategories: Vec<Subcategory>,
}

/// Reply linkage of a thread. Depth is capped at two levels: a reply hangs
/// either directly under a root or under another reply, and in both cases
/// `root_id` must name a true root (a `Linkage::Root` thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Linkage {
    Root,
    Reply { parent_id: Id, root_id: Id },
}

fn linkage_of(reply_to: Option<Id>, root_thread: Option<Id>) -> Linkage {
    match (reply_to, root_thread) {
        (None, None) => Linkage::Root,
        (Some(parent), Some(root)) => Linkage::Reply { parent_id: parent, root_id: root },
        // reply pointer alone: a direct reply whose root is its parent
        (Some(parent), None) => Linkage::Reply { parent_id: parent, root_id: parent },
        // root pointer alone: treat the root as the parent
        (None, Some(root)) => Linkage::Reply { parent_id: root, root_id: root },
    }
}

/// Threads and replies share one record type, discriminated by the two
/// nullable self-references (`reply_to`, `root_thread`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Thread {
    pub id: Id,
    pub subcategory_id: Id,
    pub subject: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    /// Stored upload reference. May carry a storage-path prefix; `file_name`
    /// strips it down to the base name.
    pub file: Option<String>,
    pub reply_to: Option<Id>,
    pub root_thread: Option<Id>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl Thread {
    /// Tagged view of the two denormalized parent columns.
    pub fn linkage(&self) -> Linkage {
        linkage_of(self.reply_to, self.root_thread)
    }

    pub fn is_root(&self) -> bool {
        self.reply_to.is_none() && self.root_thread.is_none()
    }

    /// Base name of the stored file, without any storage-path prefix.
    /// `thread_files/scale.jpg` becomes `scale.jpg`.
    pub fn file_name(&self) -> Option<&str> {
        self.file
            .as_deref()
            .map(|f| f.rsplit('/').next().unwrap_or(f))
    }
}

/// The last two root replies in ascending creation order, or nothing when
/// there are two or fewer. With two or fewer the view is intentionally empty
/// rather than echoing the whole collection; the thread page already shows
/// short threads in full.
pub fn recent_root_replies(root_replies: &[Thread]) -> Vec<Thread> {
    if root_replies.len() <= 2 {
        return Vec::new();
    }
    root_replies[root_replies.len() - 2..].to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewThread {
    pub subcategory_id: Id,
    pub subject: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub file: Option<String>,
    pub reply_to: Option<Id>,
    pub root_thread: Option<Id>,
}

impl NewThread {
    pub fn linkage(&self) -> Linkage {
        linkage_of(self.reply_to, self.root_thread)
    }
}

/// Dashboard projection of a root thread: just the columns the recent-updates
/// panel needs, not the full record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct ThreadDigest {
    pub id: Id,
    pub subject: String,
    pub subcategory_name: String,
    pub updated_date: DateTime<Utc>,
}

/// Per-field validation errors for thread creation, echoed back so the form
/// layer can re-render with prior input.
pub fn validate_new_thread(new: &NewThread) -> Vec<(String, String)> {
    let mut errors = Vec::new();
    if new.message.trim().is_empty() {
        errors.push(("message".into(), "message is required".into()));
    }
    if new.subject.chars().count() > SUBJECT_MAX {
        errors.push(("subject".into(), format!("at most {SUBJECT_MAX} characters")));
    }
    if new.author_name.chars().count() > AUTHOR_NAME_MAX {
        errors.push((
            "author_name".into(),
            format!("at most {AUTHOR_NAME_MAX} characters"),
        ));
    }
    if new.author_email.chars().count() > AUTHOR_EMAIL_MAX {
        errors.push((
            "author_email".into(),
            format!("at most {AUTHOR_EMAIL_MAX} characters"),
        ));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: Id, reply_to: Option<Id>, root: Option<Id>) -> Thread {
        Thread {
            id,
            subcategory_id: 1,
            subject: String::new(),
            author_name: String::new(),
            author_email: String::new(),
            message: "m".into(),
            file: None,
            reply_to,
            root_thread: root,
            created_date: Utc::now(),
            updated_date: Utc::now(),
        }
    }

    #[test]
    fn linkage_variants() {
        assert_eq!(thread(1, None, None).linkage(), Linkage::Root);
        assert_eq!(
            thread(3, Some(1), Some(1)).linkage(),
            Linkage::Reply { parent_id: 1, root_id: 1 }
        );
        assert_eq!(
            thread(4, Some(3), Some(1)).linkage(),
            Linkage::Reply { parent_id: 3, root_id: 1 }
        );
        assert_eq!(
            thread(5, Some(1), None).linkage(),
            Linkage::Reply { parent_id: 1, root_id: 1 }
        );
    }

    #[test]
    fn file_name_strips_prefix() {
        let mut t = thread(1, None, None);
        t.file = Some("thread_files/scale.jpg".into());
        assert_eq!(t.file_name(), Some("scale.jpg"));
        t.file = Some("plain.txt".into());
        assert_eq!(t.file_name(), Some("plain.txt"));
        t.file = None;
        assert_eq!(t.file_name(), None);
    }

    #[test]
    fn recent_root_replies_boundary() {
        let replies: Vec<Thread> = (1..=3).map(|i| thread(i, Some(0), Some(0))).collect();
        // three replies: the last two, ascending
        let recent = recent_root_replies(&replies);
        assert_eq!(recent.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 3]);
        // two or fewer: empty, not the replies themselves
        assert!(recent_root_replies(&replies[..2]).is_empty());
        assert!(recent_root_replies(&replies[..1]).is_empty());
        assert!(recent_root_replies(&[]).is_empty());
    }

    #[test]
    fn validation_limits() {
        let mut new = NewThread {
            subcategory_id: 1,
            subject: "ok".into(),
            author_name: "a".into(),
            author_email: "a@b.c".into(),
            message: "hello".into(),
            file: None,
            reply_to: None,
            root_thread: None,
        };
        assert!(validate_new_thread(&new).is_empty());
        new.message = "   ".into();
        new.subject = "s".repeat(SUBJECT_MAX + 1);
        let errors = validate_new_thread(&new);
        let fields: Vec<_> = errors.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["message", "subject"]);
    }
}
