use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::ServerConfig;
use crate::routes::{ApiToken, configure, json_error_handler};
use crate::sandbox::Executor;

pub fn build_server(server_config: ServerConfig, executor: Executor) -> std::io::Result<Server> {
    let ServerConfig {
        bind_address,
        bind_port,
        api_token,
    } = server_config;

    if api_token.is_none() {
        log::warn!("No api_token configured, execution requests are not authenticated");
    }

    let executor = web::Data::new(executor);
    let api_token = web::Data::new(ApiToken(api_token));
    let bind_address = bind_address.unwrap_or("127.0.0.1".to_string());
    let bind_port = bind_port.unwrap_or(12345);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(executor.clone())
            .app_data(api_token.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind((bind_address.as_str(), bind_port))?
    .run();

    log::info!("Listening on {bind_address}:{bind_port}");
    Ok(server)
}
