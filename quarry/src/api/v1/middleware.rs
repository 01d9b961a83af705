//! Principal resolution middleware.
//!
//! Every request below `/api/v1` (health excepted) passes through here: the
//! identity gateway turns the bearer token and/or anonymous cookie into a
//! [`Principal`] placed in request extensions. A freshly minted anonymous
//! session gets its cookie set on the way out. Each request also receives a
//! correlation id, echoed as `x-request-id` for support.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::auth::SESSION_COOKIE;

pub async fn principal_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);
    let cookie = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());

    let resolved = match state
        .gateway
        .resolve(bearer.as_deref(), cookie.as_deref())
        .await
    {
        Ok(resolved) => resolved,
        Err(error) => {
            tracing::warn!(correlation_id = %correlation_id, "Identity resolution rejected");
            let mut response = error.into_response();
            attach_correlation_id(&mut response, &correlation_id);
            return response;
        }
    };

    request.extensions_mut().insert(resolved.principal.clone());
    if let Some(claims) = resolved.claims.clone() {
        request.extensions_mut().insert(claims);
    }

    let mut response = next.run(request).await;
    attach_correlation_id(&mut response, &correlation_id);

    if let Some(session_id) = resolved.set_cookie {
        let max_age_secs = state.config.auth.anonymous_ttl_days * 24 * 3600;
        let secure = if state.config.server.cookie_secure {
            "; Secure"
        } else {
            ""
        };
        let value = format!(
            "{SESSION_COOKIE}={session_id}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Lax{secure}"
        );
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            response.headers_mut().append(header::SET_COOKIE, header_value);
        }
    }

    response
}

/// Expired cookie header used to clear the anonymous session after a
/// successful migration.
pub fn clear_session_cookie() -> (header::HeaderName, String) {
    (
        header::SET_COOKIE,
        format!("{SESSION_COOKIE}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax"),
    )
}

fn attach_correlation_id(response: &mut Response, correlation_id: &str) {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert("x-request-id", value);
    }
}
