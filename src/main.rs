use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use counsel::constants;
use counsel::llm_interaction::GeminiClient;
use counsel::web_server::{self, ServerConfig};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the counseling form web server.
    Serve {
        #[arg(long, env = "COUNSEL_HOST", default_value = "0.0.0.0", help = "Address to bind.")]
        host: IpAddr,
        #[arg(long, env = "COUNSEL_PORT", default_value_t = 9900, help = "Port for the web server.")]
        port: u16,
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, help = "Gemini API key.")]
        api_key: Option<String>,
        #[arg(long, default_value_t = constants::GEMINI_MODEL.clone(), help = "Gemini model identifier (env GEMINI_MODEL).")]
        model: String,
        #[arg(long, default_value_t = constants::GEMINI_BASE_URL.clone(), help = "Gemini API base URL (env GEMINI_BASE_URL).")]
        base_url: String,
        #[arg(long, env = "COUNSEL_TEMPLATES_DIR", default_value = "templates", help = "Directory holding index.html.")]
        templates_dir: PathBuf,
        #[arg(long, env = "COUNSEL_STATIC_DIR", default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
        #[arg(long, env = "COUNSEL_MAX_SESSIONS", default_value_t = 1024, help = "Sessions kept in memory before the oldest is dropped.")]
        max_sessions: usize,
    },
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Initialize tracing (logging) subscriber
    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,counsel=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            api_key,
            model,
            base_url,
            templates_dir,
            static_dir,
            max_sessions,
        } => {
            if api_key.is_none() {
                // Not fatal: every submission will fail and show the apology text
                warn!("GEMINI_API_KEY is not set; generation requests will fail");
            }
            let generator = Arc::new(GeminiClient::new(base_url, model, api_key));
            info!(model = generator.model(), "Text generation client ready");

            let config = ServerConfig {
                addr: SocketAddr::new(host, port),
                templates_dir,
                static_dir,
                max_sessions,
            };

            let mut web_server_handle =
                tokio::spawn(web_server::start_web_server(config, generator));

            // Keep the main task alive until Ctrl-C or the server stops on its own
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, shutting down...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(Ok(())) => info!("Web server task completed."),
                        Ok(Err(e)) => {
                            error!("Web server failed: {:?}", e);
                            return Err(e);
                        }
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
    }

    Ok(())
}
