/// Token Endpoint
///
/// OAuth 2.0 `POST /token` for the `password` and `refresh_token` grants.
/// The client is identified by HTTP Basic credentials or the `client_id`
/// form field; its secret is checked upstream, not here.

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::auth::AuthService;
use crate::error::{AppError, AuthError, ErrorContext};

/// Form body of a token request
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
}

/// Successful token response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// POST /token
///
/// # Errors
/// - 400 `invalid_grant`: bad credentials, unknown/expired refresh token
/// - 400 `invalid_request`: missing grant parameters
/// - 400 `unsupported_grant_type`
/// - 401 `invalid_client`: no client identity
/// - 503: token store or user repository unavailable
pub async fn token(
    req: HttpRequest,
    form: web::Form<TokenRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let client_id = client_identity(&req, &form)?;
    let context = ErrorContext::new(format!("{}_grant", form.grant_type)).with_client_id(&client_id);

    let outcome = match form.grant_type.as_str() {
        "password" => {
            let email = required(form.username, "username")?;
            let password = required(form.password, "password")?;
            auth.password_grant(&client_id, &email, &password)
                .instrument(context.span())
                .await
        }
        "refresh_token" => {
            let refresh_token = required(form.refresh_token, "refresh_token")?;
            auth.refresh_grant(&client_id, &refresh_token)
                .instrument(context.span())
                .await
        }
        other => return Err(AppError::UnsupportedGrantType(other.to_string())),
    };

    let pair = outcome?.into_result()?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        }))
}

/// Client id from `Authorization: Basic` or the form, in that order
fn client_identity(req: &HttpRequest, form: &TokenRequest) -> Result<String, AppError> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .map(|credentials| match credentials.split_once(':') {
            Some((id, _secret)) => id.to_string(),
            None => credentials,
        });

    from_header
        .or_else(|| form.client_id.clone())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(AppError::Auth(AuthError::InvalidClient))
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidRequest(format!("missing parameter `{}`", name)))
}
