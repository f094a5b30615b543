#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ssc_share::run().await
}
