use crate::AppState;
use crate::utils::auth::{get_bearer_token, validate_jwt};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = match get_bearer_token(req.headers()) {
        Ok(token) => token.to_string(),
        Err(e) => {
            tracing::debug!("Rejecting request without usable bearer token: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    match validate_jwt(&token, &state.config.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(e) => {
            tracing::debug!("Rejecting invalid bearer token: {}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
