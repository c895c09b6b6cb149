use crate::errors::QuestEngineError;
use crate::metrics;
use crate::models::{CompleteQuestRequest, CreateQuestRequest, CreateUserRequest, UserId};
use crate::services::QuestService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "quest-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Register user endpoint
pub async fn create_user(
    service: web::Data<Arc<QuestService>>,
    request: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, QuestEngineError> {
    let user = service.create_user(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}

/// Define quest endpoint
pub async fn create_quest(
    service: web::Data<Arc<QuestService>>,
    request: web::Json<CreateQuestRequest>,
) -> Result<HttpResponse, QuestEngineError> {
    let quest = service.create_quest(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(quest))
}

/// Complete quest endpoint; success carries no body
pub async fn complete_quest(
    service: web::Data<Arc<QuestService>>,
    request: web::Json<CompleteQuestRequest>,
) -> Result<HttpResponse, QuestEngineError> {
    service.complete_quest(request.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// User history endpoint
pub async fn get_user_history(
    service: web::Data<Arc<QuestService>>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, QuestEngineError> {
    let history = service.get_user_history(user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(history))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| QuestEngineError::Validation(err.to_string()).into());
    let path_config = web::PathConfig::default()
        .error_handler(|err, _req| QuestEngineError::Validation(err.to_string()).into());

    cfg.app_data(json_config)
        .app_data(path_config)
        .route("/users", web::post().to(create_user))
        .route("/quests", web::post().to(create_quest))
        .route("/complete-quest", web::post().to(complete_quest))
        .route("/users/{id}/history", web::get().to(get_user_history))
        .route("/metrics", web::get().to(metrics_endpoint))
        .route("/health", web::get().to(health_check));
}
