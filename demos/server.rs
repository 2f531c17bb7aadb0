mod hello;

use procrpc::{Server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), procrpc::ServerError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    Server::with_config(hello::router(), ServerConfig::from_env())
        .run()
        .await
}
