use nextstep::{SettingsStore, TerminalResult, TerminalWidget};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Logs go to stderr so they never interleave with the chat transcript.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let code = match run().await {
        Ok(()) => 0,
        Err(error) => {
            tracing::error!(error = %error, "nextstep exited with an error");
            eprintln!("error: {error}");
            1
        }
    };

    // The stdin reader can still be parked on a blocking read; don't wait for it.
    std::process::exit(code)
}

async fn run() -> TerminalResult<()> {
    let settings = SettingsStore::load();
    {
        let current = settings.settings();
        tracing::info!(
            config_path = ?settings.config_path(),
            backend_id = %current.backend_id,
            base_url = %current.base_url,
            "settings loaded"
        );
    }

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut widget = TerminalWidget::from_settings(settings, std::io::stdout())?;
    widget.run(input).await
}
