use actix_web::{web, HttpResponse};

use crate::auth::AuthService;

/// GET /health_check
///
/// `OK` while the token store answers.
pub async fn health_check(auth: web::Data<AuthService>) -> HttpResponse {
    match auth.ping().await {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().body("UNAVAILABLE")
        }
    }
}
