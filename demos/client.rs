mod hello;

use hello::Greet;
use procrpc::{ServerConfig, TransportError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let endpoint = format!("http://{}/", ServerConfig::from_env().addr);

    match hello::hello()
        .call(&endpoint, Greet { name: "Magnus".into() })
        .await
    {
        Ok(resp) => println!("success! {}", resp.greeting),
        Err(procrpc::CallError::Transport(TransportError::Send(err))) => {
            eprintln!("is the server running on {endpoint}? {err}");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    }

    let subtract = hello::subtract().bind_endpoint(endpoint);
    match subtract((57, 15)).await {
        Ok(difference) => println!("success! {difference}"),
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
