use std::sync::Arc;

#[tokio::main]
async fn main() {
    mailroom_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });

    let services = match mailroom_api::app::services::build_services().await {
        Ok(services) => Arc::new(services),
        Err(err) => {
            tracing::error!(error = %err, "failed to wire services");
            std::process::exit(1);
        }
    };

    let app = mailroom_api::app::build_app(jwt_secret, services);

    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %bind, error = %err, "failed to bind");
            std::process::exit(1);
        }
    };

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("listening on {addr}");
    }

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "server terminated");
        std::process::exit(1);
    }
}
