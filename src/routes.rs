use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;

use crate::auth::{create_jwt, resolve_identifier, verify_password, Auth};
use crate::error::ApiError;
use crate::media;
use crate::models::*;
use crate::repo::{CategoryStore, Repo};
use crate::storage::FileStore;

/// Fixed dashboard limit; there is no pagination beyond it.
pub const DASHBOARD_LIMIT: i64 = 5;

const UPLOAD_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

/// Leading bytes fetched for image-signature probing.
const SNIFF_LEN: usize = 16;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/categories").route(web::get().to(list_categories)))
            .service(web::resource("/subcategories/{name}").route(web::get().to(subcategory_view)))
            .service(
                web::resource("/subcategories/{name}/threads")
                    .route(web::post().to(create_thread)),
            )
            .service(web::resource("/threads/{id}").route(web::get().to(thread_view)))
            .service(
                web::resource("/threads/{id}/replies").route(web::post().to(create_reply)),
            )
            .service(
                web::resource("/threads/{id}/updated").route(web::get().to(thread_updated_date)),
            )
            // marker + verb validated inside; non-POST must answer 400, not 405
            .service(web::resource("/threads/{id}/message").route(web::route().to(edit_message)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me))),
    );
    // public fetch route (no /api/v1 prefix so <img src="/files/..."> works)
    cfg.route("/files/{stored:.*}", web::get().to(serve_file));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub categories: CategoryStore,
    pub file_store: Arc<dyn FileStore>,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct DashboardResponse {
    pub recent_updates: Vec<ThreadDigest>,
    pub categories: Vec<CategoryWithSubcategories>,
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses((status = 200, description = "Latest root threads and the category list", body = DashboardResponse))
)]
pub async fn dashboard(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let recent_updates = data.repo.latest_roots(DASHBOARD_LIMIT).await?;
    let categories = data.categories.get_all().await?;
    Ok(HttpResponse::Ok().json(DashboardResponse {
        recent_updates,
        categories: categories.as_ref().clone(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses((status = 200, description = "All categories with subcategories", body = [CategoryWithSubcategories]))
)]
pub async fn list_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let categories = data.categories.get_all().await?;
    Ok(HttpResponse::Ok().json(categories.as_ref()))
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct SubcategoryView {
    pub subcategory: Subcategory,
    pub category_name: String,
    pub auth_required: bool,
    pub threads: Vec<Thread>,
    /// Prefill for the posting form when a session is present.
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/subcategories/{name}",
    params(("name" = String, Path, description = "Subcategory name, case-insensitive")),
    responses(
        (status = 200, description = "Subcategory with its root threads", body = SubcategoryView),
        (status = 401, description = "Owning category requires authentication"),
        (status = 404, description = "No subcategory with that name")
    )
)]
pub async fn subcategory_view(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    let name = urlencoding::decode(&name).map_err(|_| ApiError::BadRequest)?;
    let resolved = data
        .categories
        .subcategory_by_name(&name)
        .await?
        .ok_or(ApiError::NotFound)?;

    if resolved.auth_required && auth.is_none() {
        return Err(ApiError::Unauthorized { next: Some(req.path().to_string()) });
    }

    let threads = data.repo.subcategory_latest(resolved.subcategory.id).await?;
    let (author_name, author_email) = match &auth {
        Some(a) => (Some(a.0.username.clone()), Some(a.0.email.clone())),
        None => (None, None),
    };
    Ok(HttpResponse::Ok().json(SubcategoryView {
        subcategory: resolved.subcategory,
        category_name: resolved.category_name,
        auth_required: resolved.auth_required,
        threads,
        author_name,
        author_email,
    }))
}

#[derive(Default)]
struct ThreadForm {
    subject: String,
    author_name: String,
    author_email: String,
    message: String,
    reply_to: Option<Id>,
    file: Option<(String, Vec<u8>)>,
}

/// Drain a multipart submission into the form fields the posting form
/// carries: subject, author_name, author_email, message, reply_to, file.
async fn read_thread_form(mut payload: Multipart) -> Result<ThreadForm, ApiError> {
    let mut form = ThreadForm::default();
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest
    })? {
        let Some(name) = field.content_disposition().get_name().map(str::to_string) else {
            continue;
        };
        if name == "file" {
            let file_name = field.content_disposition().get_filename().map(str::to_string);
            let mut bytes: Vec<u8> = Vec::new();
            let mut stream = field;
            while let Some(chunk) = stream.try_next().await.map_err(|e| {
                log::error!("stream read error: {e}");
                ApiError::BadRequest
            })? {
                if bytes.len() + chunk.len() > UPLOAD_SIZE_LIMIT {
                    return Err(ApiError::validation(vec![(
                        "file".into(),
                        "upload too large".into(),
                    )]));
                }
                bytes.extend_from_slice(&chunk);
            }
            if let Some(file_name) = file_name.filter(|f| !f.is_empty()) {
                if !bytes.is_empty() {
                    form.file = Some((file_name, bytes));
                }
            }
        } else {
            let mut buf: Vec<u8> = Vec::new();
            let mut stream = field;
            while let Some(chunk) = stream.try_next().await.map_err(|e| {
                log::error!("stream read error: {e}");
                ApiError::BadRequest
            })? {
                buf.extend_from_slice(&chunk);
            }
            let value = String::from_utf8(buf).map_err(|_| ApiError::BadRequest)?;
            match name.as_str() {
                "subject" => form.subject = value,
                "author_name" => form.author_name = value,
                "author_email" => form.author_email = value,
                "message" => form.message = value,
                "reply_to" => form.reply_to = value.trim().parse().ok(),
                _ => {}
            }
        }
    }
    Ok(form)
}

/// Resolve the top-level ancestor for a reply target: the target itself when
/// it is a root, otherwise the root it already points at.
fn root_of(target: &Thread) -> Id {
    match target.linkage() {
        Linkage::Root => target.id,
        Linkage::Reply { root_id, .. } => root_id,
    }
}

async fn build_new_thread(
    data: &AppState,
    auth: &Option<Auth>,
    subcategory_id: Id,
    form: ThreadForm,
    root_override: Option<Id>,
) -> Result<NewThread, ApiError> {
    let root_thread = match (root_override, form.reply_to) {
        (Some(root), _) => Some(root),
        (None, Some(parent_id)) => {
            let parent = data.repo.get_thread(parent_id).await?;
            Some(root_of(&parent))
        }
        (None, None) => None,
    };
    // a reply posted straight at a root has the root as its parent
    let reply_to = form.reply_to.or(root_override);

    let mut new = NewThread {
        subcategory_id,
        subject: form.subject,
        author_name: form.author_name,
        author_email: form.author_email,
        message: form.message,
        file: None,
        reply_to,
        root_thread,
    };

    // the acting user's identity overrides whatever the form supplied
    if let Some(a) = auth {
        new.author_name = a.0.username.clone();
        new.author_email = a.0.email.clone();
    }

    let errors = validate_new_thread(&new);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    // store the upload only once the fields validated
    if let Some((file_name, bytes)) = form.file {
        let stored = data
            .file_store
            .save(&file_name, &bytes)
            .await
            .map_err(|e| {
                log::error!("file store save error: {e}");
                ApiError::Internal
            })?;
        new.file = Some(stored);
    }
    Ok(new)
}

#[utoipa::path(
    post,
    path = "/api/v1/subcategories/{name}/threads",
    params(("name" = String, Path, description = "Subcategory name, case-insensitive")),
    responses(
        (status = 201, description = "Thread created", body = Thread),
        (status = 404, description = "No subcategory with that name"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_thread(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    let name = urlencoding::decode(&name).map_err(|_| ApiError::BadRequest)?;
    let resolved = data
        .categories
        .subcategory_by_name(&name)
        .await?
        .ok_or(ApiError::NotFound)?;

    let form = read_thread_form(payload).await?;
    let new = build_new_thread(&data, &auth, resolved.subcategory.id, form, None).await?;
    let thread = data.repo.create_thread(new).await?;
    Ok(HttpResponse::Created().json(thread))
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ThreadView {
    pub thread: Thread,
    pub file_name: Option<String>,
    pub is_file_image: bool,
    pub direct_replies: Vec<Thread>,
    pub root_replies: Vec<Thread>,
    pub recent_root_replies: Vec<Thread>,
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread with reply collections", body = ThreadView),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn thread_view(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.get_thread(path.into_inner()).await?;
    let direct_replies = data.repo.direct_replies(thread.id).await?;
    let root_replies = data.repo.root_replies(thread.id).await?;
    let recent = recent_root_replies(&root_replies);

    // unreadable or absent file simply reads as "not an image"
    let is_file_image = match thread.file.as_deref() {
        Some(stored) => match data.file_store.probe(stored, SNIFF_LEN).await {
            Ok(leading) => media::is_image(&leading),
            Err(_) => false,
        },
        None => false,
    };

    Ok(HttpResponse::Ok().json(ThreadView {
        file_name: thread.file_name().map(str::to_string),
        is_file_image,
        thread,
        direct_replies,
        root_replies,
        recent_root_replies: recent,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/replies",
    params(("id" = Id, Path, description = "Root thread id")),
    responses(
        (status = 201, description = "Reply created", body = Thread),
        (status = 404, description = "Root thread not found"),
        (status = 422, description = "Validation failed or linkage rejected")
    )
)]
pub async fn create_reply(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let root_id = path.into_inner();
    let root = data.repo.get_thread(root_id).await?;

    let form = read_thread_form(payload).await?;
    let new = build_new_thread(&data, &auth, root.subcategory_id, form, Some(root_id)).await?;
    let reply = data.repo.create_thread(new).await?;
    // a new reply bumps the root thread
    data.repo.touch(root_id).await?;
    Ok(HttpResponse::Created().json(reply))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}/updated",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Bare UNIX timestamp of updated_date"),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn thread_updated_date(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.get_thread(path.into_inner()).await?;
    Ok(HttpResponse::Ok().body(thread.updated_date.timestamp().to_string()))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    pub new_message: String,
    pub reply_id: Option<Id>,
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/message",
    request_body = EditMessageRequest,
    params(("id" = Id, Path, description = "Root thread id")),
    responses(
        (status = 204, description = "Message replaced"),
        (status = 400, description = "Not a programmatic POST request")
    )
)]
pub async fn edit_message(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let is_programmatic = req
        .headers()
        .get("X-Requested-With")
        .and_then(|v| v.to_str().ok())
        == Some("XMLHttpRequest");
    if !is_programmatic || req.method() != actix_web::http::Method::POST {
        return Err(ApiError::BadRequest);
    }

    let edit: EditMessageRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest)?;
    let thread_id = path.into_inner();
    let target = edit.reply_id.unwrap_or(thread_id);

    // missing targets are tolerated zero-row no-ops
    data.repo.replace_message(target, &edit.new_message).await?;
    if edit.reply_id.is_some() {
        // editing a reply bumps the root's timestamp, not its message
        data.repo.touch(thread_id).await?;
    }
    Ok(HttpResponse::NoContent().finish())
}

pub async fn serve_file(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let stored = path.into_inner();
    match data.file_store.load(&stored).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .body(bytes)),
        Err(crate::storage::FileStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("file store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// Username or email, matched case-insensitively.
    pub identifier: String,
    pub password: String,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token", body = TokenResponse),
        (status = 401, description = "Unknown identifier or wrong password")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let cred = resolve_identifier(data.repo.as_ref(), &payload.identifier)
        .await?
        .filter(|c| verify_password(&c.password_digest, &payload.password))
        .ok_or(ApiError::Unauthorized { next: None })?;
    let token = create_jwt(&cred).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current session identity", body = MeResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(MeResponse {
        id: auth.0.sub.clone(),
        username: auth.0.username.clone(),
        email: auth.0.email.clone(),
    }))
}
