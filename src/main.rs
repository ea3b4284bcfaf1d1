#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kelivo_gateway::run().await
}
