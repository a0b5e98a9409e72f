use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Deserialize;

use super::{ApiToken, ErrorResponse, ErrorResponseWithMessage, unauthorized};
use crate::sandbox::{ExecutionRequest, Executor, Language};

/// Body of `POST /execute`
///
/// Fields are optional here so that missing ones produce a structured 400
/// rather than a deserialization error.
#[derive(Deserialize, Debug, Default)]
pub struct ExecuteRequest {
    pub code: Option<String>,
    pub language: Option<String>,
    pub input: Option<String>,
}

impl ExecuteRequest {
    fn validate(self) -> Result<ExecutionRequest, &'static str> {
        let code = self.code.filter(|c| !c.trim().is_empty());
        let language = self.language.filter(|l| !l.trim().is_empty());

        match (code, language) {
            (Some(code), Some(language)) => Ok(ExecutionRequest {
                code,
                language: Language::parse(&language),
                stdin: self.input.unwrap_or_default(),
            }),
            (None, _) => Err("Code is required"),
            (_, None) => Err("Language is required"),
        }
    }
}

pub async fn post_execute_handler(
    req: HttpRequest,
    executor: web::Data<Executor>,
    api_token: web::Data<ApiToken>,
    body: web::Json<ExecuteRequest>,
) -> impl Responder {
    if !api_token.permits(&req) {
        log::info!("Rejected unauthenticated execution request");
        return unauthorized();
    }

    let request = match body.into_inner().validate() {
        Ok(request) => request,
        Err(message) => {
            log::info!("Rejected execution request: {message}");
            return HttpResponse::BadRequest().json(ErrorResponseWithMessage {
                reason: "ERR_INVALID_ARGUMENT",
                code: 1,
                message: message.to_string(),
            });
        }
    };

    match executor.execute(request).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            log::error!("Execution failed internally: {e:#}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 6,
            })
        }
    }
}
