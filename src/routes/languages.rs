use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Serialize;

use super::{ApiToken, unauthorized};
use crate::sandbox::Language;

#[derive(Serialize)]
struct LanguagesResponse {
    languages: Vec<String>,
}

pub async fn get_languages_handler(
    req: HttpRequest,
    api_token: web::Data<ApiToken>,
) -> impl Responder {
    if !api_token.permits(&req) {
        return unauthorized();
    }

    HttpResponse::Ok().json(LanguagesResponse {
        languages: Language::SUPPORTED
            .iter()
            .map(|language| language.name().to_string())
            .collect(),
    })
}
