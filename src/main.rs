use actix_web::{middleware::Compress, web, App, HttpServer};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

use rbb::auth::hash_password;
use rbb::cache::CategoryCache;
use rbb::openapi::ApiDoc;
use rbb::repo::{CategoryStore, Repo};
#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use rbb::repo::inmem::InMemRepo;
use rbb::routes::{config, AppState};
use rbb::storage::build_file_store;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker).
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping rbb server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo: Arc<dyn Repo> = {
        info!("Using in-memory repository backend");
        Arc::new(InMemRepo::new())
    };

    #[cfg(feature = "postgres-store")]
    let repo: Arc<dyn Repo> = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        Arc::new(rbb::repo::pg::PgRepo::new(pool))
    };

    if std::env::var("RBB_SEED").map(|v| v == "1").unwrap_or(false) {
        seed_demo_data(repo.as_ref()).await;
    }

    let categories = CategoryStore::new(repo.clone(), CategoryCache::new());
    let file_store = build_file_store();
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(web::Data::new(AppState {
                repo: repo.clone(),
                categories: categories.clone(),
                file_store: file_store.clone(),
            }))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}

/// Validate that required environment variables are set.
fn validate_env_vars() {
    use std::env;

    if env::var("JWT_SECRET").is_err() {
        eprintln!("Missing required environment variable JWT_SECRET");
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }
    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long");
            std::process::exit(1);
        }
    }
}

/// Opt-in starter content (`RBB_SEED=1`): a couple of categories with
/// subcategories and one account, enough to click around an empty instance.
async fn seed_demo_data(repo: &dyn Repo) {
    let existing = match repo.list_categories().await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("seed skipped, cannot list categories: {e}");
            return;
        }
    };
    if !existing.is_empty() {
        return;
    }
    let seed = async {
        let sport = repo.create_category("Sport", false).await?;
        repo.create_subcategory(sport.id, "Football").await?;
        repo.create_subcategory(sport.id, "Basketball").await?;
        let tech = repo.create_category("Programming", true).await?;
        repo.create_subcategory(tech.id, "Linux").await?;
        repo.create_subcategory(tech.id, "Python").await?;
        repo.create_user(rbb::auth::Credential {
            id: 0,
            username: "admin".into(),
            email: "admin@example.com".into(),
            password_digest: hash_password("seed", "changeme-please"),
        })
        .await?;
        Ok::<_, anyhow::Error>(())
    };
    match seed.await {
        Ok(()) => info!("seeded demo categories and admin account"),
        Err(e) => tracing::warn!("seed failed: {e}"),
    }
}
