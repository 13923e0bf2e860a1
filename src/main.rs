#[tokio::main]
async fn main() -> anyhow::Result<()> {
    companies_api::run().await?;

    Ok(())
}
