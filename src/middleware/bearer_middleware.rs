/// Bearer Authentication Middleware
///
/// Validates opaque bearer tokens from the Authorization header against the
/// token store and injects the `BearerPrincipal` into request extensions
/// for use by route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{AuthService, Outcome};
use crate::error::AuthError;

/// Bearer middleware for protecting routes
pub struct BearerAuth {
    auth: AuthService,
}

impl BearerAuth {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = BearerAuthService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(BearerAuthService {
            service: Rc::new(service),
            auth: self.auth.clone(),
        }))
    }
}

pub struct BearerAuthService<S> {
    service: Rc<S>,
    auth: AuthService,
}

impl<S, B> Service<ServiceRequest> for BearerAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let service = self.service.clone();
        let auth = self.auth.clone();

        Box::pin(async move {
            let token = match token {
                Some(token) => token,
                None => {
                    tracing::warn!("Missing or invalid Authorization header");
                    return Err(unauthorized(AuthError::MissingToken));
                }
            };

            // Store faults surface as 503, never as a pass.
            match auth.validate_bearer(&token).await? {
                Outcome::Granted(principal) => {
                    tracing::debug!(
                        client_id = %principal.client_id,
                        user_id = %principal.user.id,
                        "Bearer token validated"
                    );
                    req.extensions_mut().insert(principal);
                    service.call(req).await
                }
                Outcome::Rejected(e) => {
                    tracing::warn!("Bearer token rejected: {}", e);
                    Err(unauthorized(e))
                }
            }
        })
    }
}

fn unauthorized(reason: AuthError) -> Error {
    let (code, challenge) = match reason {
        AuthError::MissingToken => ("invalid_request", "Bearer".to_string()),
        _ => ("invalid_token", "Bearer error=\"invalid_token\"".to_string()),
    };

    let response = HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, challenge))
        .json(serde_json::json!({
            "error": code,
            "error_description": reason.to_string(),
        }));

    actix_web::error::InternalError::from_response(reason, response).into()
}
