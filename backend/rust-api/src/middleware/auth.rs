use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, Cookie, HeaderMapExt};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::database::MerchantStore;
use crate::error::ApiError;
use crate::models::UserId;
use crate::AppState;

/// Claim names accepted for the merchant id, in lookup order. Older tokens
/// used the camel-cased spellings.
pub const IDENTITY_CLAIMS: &[&str] = &["user_id", "userId", "userID"];

/// Cookie read when no Authorization header is present.
const TOKEN_COOKIE: &str = "token";

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// First non-empty identity claim that parses as a merchant id.
pub fn resolve_identity(claims: &Map<String, Value>) -> Option<UserId> {
    IDENTITY_CLAIMS
        .iter()
        .filter_map(|name| claims.get(*name).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .and_then(|value| Uuid::parse_str(value).ok())
}

fn bearer_token(req: &Request) -> Option<String> {
    if let Some(Authorization(bearer)) = req.headers().typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    req.headers()
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(TOKEN_COOKIE).map(str::to_string))
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        return ApiError::Unauthorized.into_response();
    };

    let decoding_key = DecodingKey::from_secret(state.config.jwt_secret.as_ref());
    let validation = Validation::new(Algorithm::HS256);

    let claims = match decode::<Map<String, Value>>(&token, &decoding_key, &validation) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::debug!("Rejected token: {}", e);
            return ApiError::Unauthorized.into_response();
        }
    };

    let Some(user_id) = resolve_identity(&claims) else {
        return ApiError::Unauthorized.into_response();
    };

    // The merchant must still exist.
    match state.store.find_merchant(user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return ApiError::Unauthorized.into_response(),
        Err(e) => return ApiError::Store(e).into_response(),
    }

    req.extensions_mut().insert(AuthUser { user_id });
    next.run(req).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn snake_case_claim_wins_over_legacy_spellings() {
        let primary = Uuid::new_v4();
        let legacy = Uuid::new_v4();
        let c = claims(json!({"user_id": primary.to_string(), "userId": legacy.to_string()}));
        assert_eq!(resolve_identity(&c), Some(primary));
    }

    #[test]
    fn empty_claim_falls_through_to_next_alias() {
        let id = Uuid::new_v4();
        let c = claims(json!({"userId": "", "userID": id.to_string()}));
        assert_eq!(resolve_identity(&c), Some(id));
    }

    #[test]
    fn missing_or_malformed_identity_is_rejected() {
        assert_eq!(resolve_identity(&claims(json!({"email": "a@b.c"}))), None);
        assert_eq!(resolve_identity(&claims(json!({"user_id": "not-a-uuid"}))), None);
    }
}
