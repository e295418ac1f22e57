/// Bearer-protected routes
///
/// The `BearerAuth` middleware has already validated the token and put the
/// `BearerPrincipal` into the request extensions.

use actix_web::{web, HttpResponse};
use tracing::Instrument;

use crate::auth::{AuthService, BearerPrincipal};
use crate::error::{AppError, ErrorContext};

/// GET /api/me
pub async fn get_current_user(principal: web::ReqData<BearerPrincipal>) -> HttpResponse {
    HttpResponse::Ok().json(&principal.user)
}

/// POST /api/logout
///
/// Revokes every refresh token of the caller's (client, user) pair.
pub async fn logout(
    principal: web::ReqData<BearerPrincipal>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("logout").with_client_id(principal.client_id.clone());

    let revoked = auth.logout(&principal).instrument(context.span()).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %principal.user.id,
        revoked = revoked,
        "User logged out"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "revoked": revoked })))
}
