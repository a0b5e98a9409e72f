mod execute;
mod languages;

pub use execute::{ExecuteRequest, post_execute_handler};
pub use languages::get_languages_handler;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

/// Bearer token required from callers; `None` accepts every request
#[derive(Debug, Clone, Default)]
pub struct ApiToken(pub Option<String>);

impl ApiToken {
    fn permits(&self, req: &HttpRequest) -> bool {
        let Some(expected) = &self.0 else {
            return true;
        };
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| token.trim() == expected)
    }
}

/// Registers every route of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/execute")
            .route(web::post().to(post_execute_handler))
            .default_service(web::route().to(method_not_allowed)),
    )
    .service(
        web::resource("/languages")
            .route(web::get().to(get_languages_handler))
            .default_service(web::route().to(method_not_allowed)),
    );
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponseWithMessage {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
        message: err.to_string(),
    });
    InternalError::from_response(err, response).into()
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse {
        reason: "ERR_UNAUTHORIZED",
        code: 2,
    })
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ErrorResponse {
        reason: "ERR_METHOD_NOT_ALLOWED",
        code: 7,
    })
}
