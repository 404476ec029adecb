use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Credential;
use crate::cache::CategoryCache;
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("invalid reply linkage")] InvalidLink,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    /// All categories with their subcategories eagerly attached, in id order.
    async fn list_categories(&self) -> RepoResult<Vec<CategoryWithSubcategories>>;
    async fn create_category(&self, name: &str, auth_required: bool) -> RepoResult<Category>;
    async fn create_subcategory(&self, category_id: Id, name: &str) -> RepoResult<Subcategory>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    /// Insert a thread or reply. Stamps `created_date`/`updated_date`; the
    /// caller supplies everything else including the reply linkage, which is
    /// checked against the depth-two contract (a reply's root pointer must
    /// name a true root).
    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread>;
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    /// Projection of the `limit` most recently updated root threads
    /// (`root_thread` null), newest first.
    async fn latest_roots(&self, limit: i64) -> RepoResult<Vec<ThreadDigest>>;
    /// All root threads (`reply_to` null) of a subcategory, newest first.
    async fn subcategory_latest(&self, subcategory_id: Id) -> RepoResult<Vec<Thread>>;
    /// Set `updated_date` to now. Missing id is a silent zero-row no-op.
    async fn touch(&self, thread_id: Id) -> RepoResult<()>;
    /// Replace `message` and set `updated_date` in one write. Missing id is
    /// a silent zero-row no-op.
    async fn replace_message(&self, thread_id: Id, new_message: &str) -> RepoResult<()>;
    /// Replies whose `reply_to` is this thread, oldest first.
    async fn direct_replies(&self, thread_id: Id) -> RepoResult<Vec<Thread>>;
    /// Replies whose `root_thread` is this thread (including replies to
    /// replies), oldest first.
    async fn root_replies(&self, thread_id: Id) -> RepoResult<Vec<Thread>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn user_by_username(&self, username: &str) -> RepoResult<Option<Credential>>;
    async fn user_by_email(&self, email: &str) -> RepoResult<Option<Credential>>;
    async fn create_user(&self, cred: Credential) -> RepoResult<Credential>;
}

pub trait Repo: CategoryRepo + ThreadRepo + UserRepo {}

impl<T> Repo for T where T: CategoryRepo + ThreadRepo + UserRepo {}

/// Read-through wrapper over [`CategoryRepo`] holding the injected cache.
/// First call loads and populates; later calls serve the cached list until
/// `invalidate` evicts it. No write path here touches the cache.
#[derive(Clone)]
pub struct CategoryStore {
    repo: Arc<dyn Repo>,
    cache: CategoryCache,
}

/// A subcategory resolved by name together with its owning category's gate.
#[derive(Debug, Clone)]
pub struct ResolvedSubcategory {
    pub subcategory: Subcategory,
    pub category_name: String,
    pub auth_required: bool,
}

impl CategoryStore {
    pub fn new(repo: Arc<dyn Repo>, cache: CategoryCache) -> Self {
        Self { repo, cache }
    }

    pub async fn get_all(&self) -> RepoResult<Arc<Vec<CategoryWithSubcategories>>> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached);
        }
        let loaded = self.repo.list_categories().await?;
        Ok(self.cache.set(loaded))
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// First case-insensitive match in category-then-subcategory iteration
    /// order. `None` is a normal outcome, not an error; subcategory names
    /// are not unique and callers get whichever comes first.
    pub async fn subcategory_by_name(&self, name: &str) -> RepoResult<Option<ResolvedSubcategory>> {
        let wanted = name.to_lowercase();
        let categories = self.get_all().await?;
        for category in categories.iter() {
            for subcat in &category.subcategories {
                if subcat.name.to_lowercase() == wanted {
                    return Ok(Some(ResolvedSubcategory {
                        subcategory: subcat.clone(),
                        category_name: category.name.clone(),
                        auth_required: category.auth_required,
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::RwLock;

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        categories: HashMap<Id, Category>,
        subcategories: HashMap<Id, Subcategory>,
        threads: HashMap<Id, Thread>,
        users: HashMap<Id, Credential>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("RBB_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("RBB_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        tracing::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    tracing::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        fn check_linkage(state: &State, linkage: Linkage) -> RepoResult<()> {
            if let Linkage::Reply { parent_id, root_id } = linkage {
                if !state.threads.contains_key(&parent_id) {
                    return Err(RepoError::NotFound);
                }
                let root = state.threads.get(&root_id).ok_or(RepoError::NotFound)?;
                if root.reply_to.is_some() {
                    return Err(RepoError::InvalidLink);
                }
            }
            Ok(())
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl CategoryRepo for InMemRepo {
        async fn list_categories(&self) -> RepoResult<Vec<CategoryWithSubcategories>> {
            let s = self.state.read().unwrap();
            let mut categories: Vec<_> = s.categories.values().cloned().collect();
            categories.sort_by_key(|c| c.id);
            Ok(categories
                .into_iter()
                .map(|c| {
                    let mut subcategories: Vec<_> = s
                        .subcategories
                        .values()
                        .filter(|sc| sc.category_id == c.id)
                        .cloned()
                        .collect();
                    subcategories.sort_by_key(|sc| sc.id);
                    CategoryWithSubcategories {
                        id: c.id,
                        name: c.name,
                        auth_required: c.auth_required,
                        subcategories,
                    }
                })
                .collect())
        }

        async fn create_category(&self, name: &str, auth_required: bool) -> RepoResult<Category> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let category = Category { id, name: name.to_string(), auth_required };
            s.categories.insert(id, category.clone());
            drop(s);
            self.persist();
            Ok(category)
        }

        async fn create_subcategory(&self, category_id: Id, name: &str) -> RepoResult<Subcategory> {
            let mut s = self.state.write().unwrap();
            if !s.categories.contains_key(&category_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let subcategory = Subcategory { id, category_id, name: name.to_string() };
            s.subcategories.insert(id, subcategory.clone());
            drop(s);
            self.persist();
            Ok(subcategory)
        }
    }

    #[async_trait]
    impl ThreadRepo for InMemRepo {
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            let mut s = self.state.write().unwrap();
            if !s.subcategories.contains_key(&new.subcategory_id) {
                return Err(RepoError::NotFound);
            }
            Self::check_linkage(&s, new.linkage())?;
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let thread = Thread {
                id,
                subcategory_id: new.subcategory_id,
                subject: new.subject,
                author_name: new.author_name,
                author_email: new.author_email,
                message: new.message,
                file: new.file,
                reply_to: new.reply_to,
                root_thread: new.root_thread,
                created_date: now,
                updated_date: now,
            };
            s.threads.insert(id, thread.clone());
            drop(s);
            self.persist();
            Ok(thread)
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let s = self.state.read().unwrap();
            s.threads.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn latest_roots(&self, limit: i64) -> RepoResult<Vec<ThreadDigest>> {
            let s = self.state.read().unwrap();
            let mut roots: Vec<_> = s
                .threads
                .values()
                .filter(|t| t.root_thread.is_none())
                .collect();
            roots.sort_by(|a, b| b.updated_date.cmp(&a.updated_date).then(b.id.cmp(&a.id)));
            roots.truncate(limit.max(0) as usize);
            Ok(roots
                .into_iter()
                .map(|t| ThreadDigest {
                    id: t.id,
                    subject: t.subject.clone(),
                    subcategory_name: s
                        .subcategories
                        .get(&t.subcategory_id)
                        .map(|sc| sc.name.clone())
                        .unwrap_or_default(),
                    updated_date: t.updated_date,
                })
                .collect())
        }

        async fn subcategory_latest(&self, subcategory_id: Id) -> RepoResult<Vec<Thread>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .threads
                .values()
                .filter(|t| t.subcategory_id == subcategory_id && t.reply_to.is_none())
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_date.cmp(&a.created_date).then(b.id.cmp(&a.id)));
            Ok(v)
        }

        async fn touch(&self, thread_id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if let Some(t) = s.threads.get_mut(&thread_id) {
                t.updated_date = Utc::now();
                drop(s);
                self.persist();
            }
            Ok(())
        }

        async fn replace_message(&self, thread_id: Id, new_message: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if let Some(t) = s.threads.get_mut(&thread_id) {
                t.message = new_message.to_string();
                t.updated_date = Utc::now();
                drop(s);
                self.persist();
            }
            Ok(())
        }

        async fn direct_replies(&self, thread_id: Id) -> RepoResult<Vec<Thread>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .threads
                .values()
                .filter(|t| t.reply_to == Some(thread_id))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_date.cmp(&b.created_date).then(a.id.cmp(&b.id)));
            Ok(v)
        }

        async fn root_replies(&self, thread_id: Id) -> RepoResult<Vec<Thread>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .threads
                .values()
                .filter(|t| t.root_thread == Some(thread_id))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_date.cmp(&b.created_date).then(a.id.cmp(&b.id)));
            Ok(v)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn user_by_username(&self, username: &str) -> RepoResult<Option<Credential>> {
            let s = self.state.read().unwrap();
            Ok(s.users
                .values()
                .find(|u| u.username.eq_ignore_ascii_case(username))
                .cloned())
        }

        async fn user_by_email(&self, email: &str) -> RepoResult<Option<Credential>> {
            let s = self.state.read().unwrap();
            Ok(s.users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned())
        }

        async fn create_user(&self, mut cred: Credential) -> RepoResult<Credential> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            cred.id = id;
            s.users.insert(id, cred.clone());
            drop(s);
            self.persist();
            Ok(cred)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        fn internal(e: sqlx::Error) -> RepoError {
            RepoError::Internal(e.to_string())
        }
    }

    #[async_trait]
    impl CategoryRepo for PgRepo {
        async fn list_categories(&self) -> RepoResult<Vec<CategoryWithSubcategories>> {
            let categories = sqlx::query_as::<_, Category>(
                "SELECT id, name, auth_required FROM categories ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)?;
            let subcategories = sqlx::query_as::<_, Subcategory>(
                "SELECT id, category_id, name FROM subcategories ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)?;
            Ok(categories
                .into_iter()
                .map(|c| CategoryWithSubcategories {
                    subcategories: subcategories
                        .iter()
                        .filter(|sc| sc.category_id == c.id)
                        .cloned()
                        .collect(),
                    id: c.id,
                    name: c.name,
                    auth_required: c.auth_required,
                })
                .collect())
        }

        async fn create_category(&self, name: &str, auth_required: bool) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>(
                "INSERT INTO categories (name, auth_required) VALUES ($1,$2) RETURNING id, name, auth_required",
            )
            .bind(name)
            .bind(auth_required)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn create_subcategory(&self, category_id: Id, name: &str) -> RepoResult<Subcategory> {
            sqlx::query_as::<_, Subcategory>(
                "INSERT INTO subcategories (category_id, name) VALUES ($1,$2) RETURNING id, category_id, name",
            )
            .bind(category_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(_) => RepoError::NotFound,
                other => Self::internal(other),
            })
        }
    }

    const THREAD_COLUMNS: &str = "id, subcategory_id, subject, author_name, author_email, \
                                  message, file, reply_to, root_thread, created_date, updated_date";

    #[async_trait]
    impl ThreadRepo for PgRepo {
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            if let Linkage::Reply { parent_id, root_id } = new.linkage() {
                let _ = self.get_thread(parent_id).await?;
                let root = self.get_thread(root_id).await?;
                if root.reply_to.is_some() {
                    return Err(RepoError::InvalidLink);
                }
            }
            sqlx::query_as::<_, Thread>(&format!(
                "INSERT INTO threads (subcategory_id, subject, author_name, author_email, message, file, reply_to, root_thread) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {THREAD_COLUMNS}"
            ))
            .bind(new.subcategory_id)
            .bind(&new.subject)
            .bind(&new.author_name)
            .bind(&new.author_email)
            .bind(&new.message)
            .bind(&new.file)
            .bind(new.reply_to)
            .bind(new.root_thread)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(_) => RepoError::NotFound,
                other => Self::internal(other),
            })
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn latest_roots(&self, limit: i64) -> RepoResult<Vec<ThreadDigest>> {
            sqlx::query_as::<_, ThreadDigest>(
                "SELECT t.id, t.subject, s.name AS subcategory_name, t.updated_date \
                 FROM threads t JOIN subcategories s ON s.id = t.subcategory_id \
                 WHERE t.root_thread IS NULL ORDER BY t.updated_date DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn subcategory_latest(&self, subcategory_id: Id) -> RepoResult<Vec<Thread>> {
            sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads \
                 WHERE subcategory_id = $1 AND reply_to IS NULL ORDER BY created_date DESC"
            ))
            .bind(subcategory_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn touch(&self, thread_id: Id) -> RepoResult<()> {
            sqlx::query("UPDATE threads SET updated_date = now() WHERE id = $1")
                .bind(thread_id)
                .execute(&self.pool)
                .await
                .map_err(Self::internal)?;
            Ok(())
        }

        async fn replace_message(&self, thread_id: Id, new_message: &str) -> RepoResult<()> {
            sqlx::query("UPDATE threads SET message = $2, updated_date = now() WHERE id = $1")
                .bind(thread_id)
                .bind(new_message)
                .execute(&self.pool)
                .await
                .map_err(Self::internal)?;
            Ok(())
        }

        async fn direct_replies(&self, thread_id: Id) -> RepoResult<Vec<Thread>> {
            sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads WHERE reply_to = $1 ORDER BY created_date ASC"
            ))
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn root_replies(&self, thread_id: Id) -> RepoResult<Vec<Thread>> {
            sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads WHERE root_thread = $1 ORDER BY created_date ASC"
            ))
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn user_by_username(&self, username: &str) -> RepoResult<Option<Credential>> {
            sqlx::query_as::<_, Credential>(
                "SELECT id, username, email, password_digest FROM users WHERE lower(username) = lower($1)",
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn user_by_email(&self, email: &str) -> RepoResult<Option<Credential>> {
            sqlx::query_as::<_, Credential>(
                "SELECT id, username, email, password_digest FROM users WHERE lower(email) = lower($1)",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn create_user(&self, cred: Credential) -> RepoResult<Credential> {
            sqlx::query_as::<_, Credential>(
                "INSERT INTO users (username, email, password_digest) VALUES ($1,$2,$3) \
                 RETURNING id, username, email, password_digest",
            )
            .bind(&cred.username)
            .bind(&cred.email)
            .bind(&cred.password_digest)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::internal)
        }
    }
}
