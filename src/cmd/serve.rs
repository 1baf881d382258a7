static USAGE: &str = r#"
Serve the read-only price lookup API.

Exposes GET /api/v0/prices/{id}, returning the stored price as JSON with
the decimal price converted to a number at the wire boundary. Responds
404 for unknown ids. Runs until interrupted (SIGINT/SIGTERM).

Usage:
    prices serve [options]
    prices serve --help

serve options:
    -c, --config <file>    Path to the TOML config file.
                           [default: configs/prices.toml]

Common options:
    -h, --help             Display this message
"#;

use log::info;
use serde::Deserialize;

use crate::{CliResult, api, config, repository, util};

#[derive(Deserialize)]
struct Args {
    flag_config: String,
}

pub fn run(argv: &[&str]) -> CliResult<()> {
    let args: Args = util::get_args(USAGE, argv)?;
    let config = config::ApiServer::load(Some(&args.flag_config))?;

    info!(
        "init prices repository for storage driver={}",
        config.storage.driver
    );
    let repo = repository::new_prices(&config.storage)?;
    let app = api::router(repo);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api.port)).await?;
        info!("start listening on port={}", config.api.port);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    })?;

    info!("api server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }
}
