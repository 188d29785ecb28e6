use axum::{
    body::Body,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::core::error::AppError;
use crate::features::auth::model::{AuthenticatedUser, TokenSession};

/// JSON body extractor whose rejections use the API error envelope
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppJsonRejection;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(AppJsonRejection)
    }
}

pub struct AppJsonRejection(JsonRejection);

impl From<AppJsonRejection> for AppError {
    fn from(rejection: AppJsonRejection) -> Self {
        match rejection.0 {
            JsonRejection::JsonDataError(err) => {
                AppError::Validation(format!("Invalid request body: {}", err.body_text()))
            }
            JsonRejection::JsonSyntaxError(_) => {
                AppError::BadRequest("Request body is not valid JSON".to_string())
            }
            JsonRejection::MissingJsonContentType(_) => AppError::UnsupportedMediaType(
                "Expected Content-Type: application/json".to_string(),
            ),
            JsonRejection::BytesRejection(_) => {
                AppError::BadRequest("Failed to read request body".to_string())
            }
            _ => AppError::BadRequest("Failed to parse JSON body".to_string()),
        }
    }
}

impl IntoResponse for AppJsonRejection {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

fn not_signed_in() -> AppError {
    AppError::Unauthorized("Sign in to continue".to_string())
}

/// Set by `auth_middleware`; absent means the route was mounted without it
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(not_signed_in)
    }
}

impl<S> FromRequestParts<S> for TokenSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TokenSession>()
            .copied()
            .ok_or_else(not_signed_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, StatusCode},
        routing::{get, post},
        Router,
    };
    use axum_test::TestServer;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Deserialize)]
    struct Greeting {
        name: String,
    }

    async fn greet(AppJson(body): AppJson<Greeting>) -> String {
        format!("hello {}", body.name)
    }

    async fn whoami(user: AuthenticatedUser, session: TokenSession) -> String {
        format!("{} {}", user.email, session.token_id)
    }

    fn server() -> TestServer {
        let app = Router::new()
            .route("/greet", post(greet))
            .route("/whoami", get(whoami));
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn test_app_json_accepts_valid_body() {
        let response = server().post("/greet").json(&json!({ "name": "ada" })).await;
        response.assert_status_ok();
        response.assert_text("hello ada");
    }

    #[tokio::test]
    async fn test_app_json_rejections_use_error_envelope() {
        let server = server();

        let wrong_shape = server.post("/greet").json(&json!({ "nom": "ada" })).await;
        wrong_shape.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = wrong_shape.json();
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body"));

        let broken = server
            .post("/greet")
            .bytes(axum::body::Bytes::from_static(b"{\"name\":"))
            .content_type("application/json")
            .await;
        broken.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            broken.json::<Value>()["message"],
            "Request body is not valid JSON"
        );

        server
            .post("/greet")
            .text("name=ada")
            .await
            .assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_identity_extractors_require_auth_middleware() {
        let response = server().get("/whoami").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["message"], "Sign in to continue");
        assert_eq!(
            response.header(header::WWW_AUTHENTICATE),
            "Bearer realm=\"bahasha\""
        );
    }
}
