#[tokio::main]
async fn main() -> anyhow::Result<()> {
    voicescribe::run().await
}
