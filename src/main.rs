#[tokio::main]
async fn main() {
    if let Err(err) = landns::bootstrap::run().await {
        eprintln!("; 500: {:#}", err);
        std::process::exit(1);
    }
}
