//! Background removal CLI binary

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bgremove_lite::cli::main().await
}
