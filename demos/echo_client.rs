use serde_json::json;
use sockrpc::{Callbacks, Client, DEFAULT_ADDR};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let mut client = Client::connect(addr).await?;

    let callbacks = Callbacks::new()
        .on_success(|r| println!("{:?} => {}", r.id, r.result))
        .on_error(|r| {
            let error = serde_json::to_string(&r.error).unwrap_or_default();
            println!("{:?} => error {error}", r.id);
        });

    let batch = vec![
        client.request("echo", json!({"x": 1})),
        client.request("hello", json!({"name": "world"})),
        client.request("missing", json!([])),
    ];
    client.send(batch, callbacks).await?;
    while client.pending() > 0 {
        client.turn().await?;
    }

    let request = client.request("shutdown", json!([]));
    client.send(request, Callbacks::default()).await?;
    Ok(())
}
