use crate::models::{
    Category, CategoryWithSubcategories, NewThread, Subcategory, Thread, ThreadDigest,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::dashboard,
        crate::routes::list_categories,
        crate::routes::subcategory_view,
        crate::routes::create_thread,
        crate::routes::thread_view,
        crate::routes::create_reply,
        crate::routes::thread_updated_date,
        crate::routes::edit_message,
        crate::routes::login,
        crate::routes::auth_me,
    ),
    components(schemas(
        Category, Subcategory, CategoryWithSubcategories, Thread, NewThread, ThreadDigest,
        crate::routes::DashboardResponse, crate::routes::SubcategoryView,
        crate::routes::ThreadView, crate::routes::EditMessageRequest,
        crate::routes::LoginRequest, crate::routes::TokenResponse, crate::routes::MeResponse
    )),
    tags(
        (name = "categories", description = "Category and subcategory reads"),
        (name = "threads", description = "Thread and reply operations"),
        (name = "auth", description = "Session handling"),
    )
)]
pub struct ApiDoc;
