#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = quiz_runner::run().await {
        eprintln!("quiz-runner fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
