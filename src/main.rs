use clap::Parser;
use tokio_util::sync::CancellationToken;

use coderun::config::{CliArgs, Config};
use coderun::sandbox::{Executor, probe_toolchain};
use coderun::web_server::build_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let Config {
        server: server_config,
        execution: execution_config,
        languages: language_config,
    } = cli.to_config().expect("Failed to load configuration");

    let shutdown_token = CancellationToken::new();
    probe_toolchain(&language_config, &shutdown_token).await;

    let executor = Executor::new(&execution_config, &language_config, shutdown_token.clone());
    log::info!(
        "Workspaces under {}, {}ms per process, {} concurrent executions",
        executor.context().workspace_root.display(),
        execution_config.timeout_ms,
        execution_config.max_concurrent
    );

    let server = build_server(server_config, executor).expect("Failed to build server");
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // 1. Kill in-flight processes so pending requests can answer
    shutdown_token.cancel();

    // 2. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    log::info!("Shutdown complete");
    Ok(())
}
