use serde::{Deserialize, Serialize};
use sockrpc::{Outcome, Params, RequestId, Result, Server, ServerOptions, Signal};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = ServerOptions {
        addr: std::env::args()
            .nth(1)
            .unwrap_or_else(|| ServerOptions::default().addr),
        ..ServerOptions::default()
    };
    let mut server = Server::bind(&options).await?;
    server.endpoint("echo", |_, params, _| Outcome::success(params.into_value()))?;
    server.endpoint("hello", hello)?;
    server.on_cleanup(|| tracing::info!("cleaning up"));

    let signal = server.run().await?;
    if signal == Signal::Exit {
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct HelloRequest {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HelloResponse {
    message: String,
}

fn hello(_method: &str, params: Params, _id: Option<&RequestId>) -> Result<Outcome> {
    let r: HelloRequest = params.to()?;
    Outcome::success(HelloResponse {
        message: format!("Hello, {}!", r.name),
    })
}
