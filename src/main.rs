use calcboard::app;

/// Main entry point for the calculator web service.
///
/// Initializes logging, loads configuration from the environment, and runs
/// the HTTP server until it is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    app::run().await
}
