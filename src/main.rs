mod api;
mod database;
mod models;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Get configuration from environment
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3002".to_string());
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    log::info!("🚀 Starting Mortgage Sync Service...");
    log::info!("📊 Database: {}", database_url);

    // Initialize MongoDB connection (creates the uniqueness indexes)
    let db = database::MongoDB::new(&database_url)
        .await
        .expect("Failed to connect to MongoDB");

    let db_data = web::Data::new(db.clone());

    log::info!("✅ MongoDB connected successfully");
    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .supports_credentials()
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // ==================== APPLICATIONS ====================
            .service(
                web::scope("/api/v1/applications")
                    .route("", web::post().to(api::applications::create_application))
                    .route("/{id}", web::get().to(api::applications::get_application))
                    .route("/{id}", web::patch().to(api::applications::patch_application))
                    .route("/{id}/steps/{step}", web::post().to(api::applications::save_step))
                    .route("/{id}/submit", web::post().to(api::applications::submit_application))
                    // Co-applicants: dynamic participant set + role-scoped steps
                    .route(
                        "/{id}/co-applicants",
                        web::put().to(api::co_applicants::reconcile_co_applicants),
                    )
                    .route(
                        "/{id}/co-applicants/{index}",
                        web::delete().to(api::co_applicants::delete_co_applicant),
                    )
                    .route(
                        "/{id}/co-applicants/{index}/steps/{step}",
                        web::post().to(api::co_applicants::save_co_applicant_step),
                    ),
            )
            // ==================== CONTINUATION ====================
            .service(
                web::scope("/api/v1/continuation")
                    .route("/request", web::post().to(api::continuation::request_continuation))
                    .route("/redeem", web::post().to(api::continuation::redeem_code)),
            )
            // ==================== OAUTH ====================
            .service(
                web::scope("/api/v1/oauth")
                    .route("/authorize", web::get().to(api::oauth::authorize))
                    .route("/callback", web::get().to(api::oauth::callback)),
            )
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}
