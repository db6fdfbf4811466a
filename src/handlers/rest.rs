/// REST handlers: health check and conversation-history queries. History
/// is served straight from the store, independently of live routing.
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use serde_json::json;

use crate::db::{Database, DbPool};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user1: Option<String>,
    pub user2: Option<String>,
    pub group_name: Option<String>,
}

/// Conversation history, oldest first.
/// GET /messages?user1=..&user2=..  or  GET /messages?group_name=..
pub async fn get_messages(
    pool: web::Data<DbPool>,
    query: web::Query<HistoryQuery>,
) -> ActixResult<HttpResponse> {
    if let Some(group_name) = &query.group_name {
        return match Database::group_history(&pool, group_name).await {
            Ok(messages) => Ok(HttpResponse::Ok().json(messages)),
            Err(e) => {
                log::error!("failed to query group history: {}", e);
                Ok(HttpResponse::InternalServerError().json(json!({
                    "error": "Failed to fetch messages"
                })))
            }
        };
    }

    match (&query.user1, &query.user2) {
        (Some(user1), Some(user2)) => match Database::direct_history(&pool, user1, user2).await {
            Ok(messages) => Ok(HttpResponse::Ok().json(messages)),
            Err(e) => {
                log::error!("failed to query direct history: {}", e);
                Ok(HttpResponse::InternalServerError().json(json!({
                    "error": "Failed to fetch messages"
                })))
            }
        },
        _ => Ok(HttpResponse::BadRequest().json(json!({
            "error": "user1 and user2 or group_name required"
        }))),
    }
}

/// Health check endpoint
/// GET /health
pub async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}
