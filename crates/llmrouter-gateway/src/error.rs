//! Maps [`llmrouter_core::models::error::RouterError`] onto HTTP responses.

use actix_web::{http::StatusCode, HttpResponse};
use llmrouter_core::models::error::RouterError;
use serde_json::json;

pub struct HttpRouterError(pub RouterError);

impl From<RouterError> for HttpRouterError {
    fn from(e: RouterError) -> Self {
        Self(e)
    }
}

impl HttpRouterError {
    pub fn into_response(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "error": {
                "message": self.0.to_string(),
            }
        });

        if let RouterError::AllModelsFailed { errors } = &self.0 {
            body["error"]["errors"] = json!(errors);
        }

        let mut response = HttpResponse::build(status).json(body);
        if let Some(retry_after) = self.0.retry_after_secs() {
            if let Ok(value) = actix_web::http::header::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(actix_web::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}
