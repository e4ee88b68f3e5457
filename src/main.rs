//! switchboard-server: the orchestrator binary. `serve` boots the full
//! pipeline (session store, agent/tool registries, client boundaries,
//! control plane) behind the HTTP ingress; `healthcheck` is a thin CLI
//! probe against a running instance's `/health/ready`, meant for
//! container liveness/readiness probes.
//!
//! Exit codes: `0` ok, `1` config error, `2` dependency unavailable,
//! `3` fatal runtime.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use switchboard_core::adapters::AdapterRegistry;
use switchboard_core::agents::conversational::ConversationalAgent;
use switchboard_core::agents::echo::EchoAgent;
use switchboard_core::agents::intent_router::IntentRouterAgent;
use switchboard_core::agents::summarizer::SummarizerAgent;
use switchboard_core::agents::tool_invoking::ToolInvokingAgent;
use switchboard_core::agents::AgentRegistry;
use switchboard_core::clients::guardrail::GuardrailClient;
use switchboard_core::clients::llm::{LlmClient, LlmModelConfig};
use switchboard_core::clients::stt::{SttClient, SttClientConfig};
use switchboard_core::clients::tts::{TtsClient, TtsClientConfig};
use switchboard_core::control::{AuthContext, Metrics};
use switchboard_core::http::{self, AppState};
use switchboard_core::session::memory::InMemorySessionStore;
use switchboard_core::session::sql::SqlSessionStore;
use switchboard_core::session::{OverflowPolicy, SessionStore};
use switchboard_core::tools::ToolRegistry;
use switchboard_core::{AppConfig, Orchestrator};

/// Voice-agent orchestration fabric: audio pipeline, agent router, and
/// control plane behind one HTTP surface.
#[derive(Parser, Debug)]
#[command(name = "switchboard-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the configuration file (YAML). Applies to `serve`.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SWITCHBOARD_LOG_LEVEL", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the orchestrator HTTP server (default).
    Serve {
        /// Bind address override (host:port).
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
    /// Probe a running instance's readiness endpoint and exit 0/1.
    Healthcheck {
        /// Base URL of the instance, e.g. http://localhost:8080.
        url: String,
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let exit_code = match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => run_serve(cli.config.as_deref(), bind).await,
        Command::Healthcheck { url, timeout } => run_healthcheck(&url, timeout).await,
    };

    std::process::exit(exit_code);
}

async fn run_serve(config_path: Option<&std::path::Path>, bind_override: Option<SocketAddr>) -> i32 {
    let mut config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return 1;
        }
    };
    if let Some(bind) = bind_override {
        config.bind_addr = bind.to_string();
    }
    let config = Arc::new(config);

    let metrics = Arc::new(Metrics::new());

    let sessions: Arc<dyn SessionStore> = match config.sessions.backend.as_str() {
        "sqlite" => {
            let Some(path) = &config.sessions.sqlite_path else {
                error!("sessions.backend = \"sqlite\" requires sessions.sqlite_path");
                return 1;
            };
            Arc::new(SqlSessionStore::open(path.clone()))
        }
        "memory" => Arc::new(InMemorySessionStore::new(
            config.sessions.session_max,
            Duration::from_secs(config.sessions.session_ttl_minutes * 60),
            config.sessions.context_max_turns,
            OverflowPolicy::DropOldest,
        )),
        other => {
            error!(backend = other, "unknown sessions.backend");
            return 1;
        }
    };

    let guardrail = Arc::new(GuardrailClient::new(config.clients.guardrail_output_endpoint.clone()));

    let mut stt_config = SttClientConfig::new(config.clients.stt_endpoint.clone());
    stt_config.timeout = Duration::from_millis(config.clients.stt_timeout_ms);
    let stt = Arc::new(SttClient::new(stt_config));

    let mut tts_config = TtsClientConfig::new(config.clients.tts_endpoint.clone());
    tts_config.timeout = Duration::from_millis(config.clients.tts_timeout_ms);
    tts_config.loudnorm_enabled = config.audio.loudnorm_enabled;
    tts_config.target_lufs = config.audio.loudnorm_i;
    tts_config.true_peak_dbfs = config.audio.loudnorm_tp;
    tts_config.lra = config.audio.loudnorm_lra;
    let tts = Arc::new(TtsClient::new(tts_config));

    let primary_llm_config = LlmModelConfig {
        name: "primary".to_string(),
        endpoint: config.clients.llm_endpoint.clone(),
        api_key: None,
    };
    let fallback_llm_config = config.clients.llm_fallback_endpoint.clone().map(|endpoint| LlmModelConfig {
        name: "fallback".to_string(),
        endpoint,
        api_key: None,
    });
    let llm = Arc::new(LlmClient::new(primary_llm_config.clone(), fallback_llm_config.clone()));

    let tools = Arc::new(ToolRegistry::new());

    let agents = Arc::new(AgentRegistry::new(config.agents.agent_default.clone()).with_budget(Duration::from_millis(config.agents.agent_timeout_ms)));
    if config.agents.agent_routing_enabled {
        agents.register(Arc::new(IntentRouterAgent));
    }
    agents.register(Arc::new(EchoAgent));
    agents.register(Arc::new(SummarizerAgent));
    let tool_descriptors: Vec<_> = Vec::new();
    agents.register(Arc::new(ToolInvokingAgent::new(
        LlmClient::new(primary_llm_config.clone(), fallback_llm_config.clone()),
        &tool_descriptors,
    )));
    agents.register(Arc::new(ConversationalAgent::new(LlmClient::new(primary_llm_config, fallback_llm_config))));

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        sessions,
        agents,
        tools,
        guardrail,
        stt,
        tts,
        llm,
        metrics.clone(),
    ));

    if config.adapters.audio_session_enabled {
        spawn_configured_audio_session(&config, orchestrator.clone());
    }

    let auth = Arc::new(AuthContext::new(
        config.auth.bearer_tokens.clone(),
        config.auth.rps_per_client,
        Duration::from_secs(config.auth.window_s),
    ));
    let state = Arc::new(AppState { orchestrator, config: config.clone() });
    let router = http::router(state, auth).into_make_service_with_connect_info::<SocketAddr>();

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %config.bind_addr, "failed to bind");
            return 3;
        }
    };
    info!(addr = %config.bind_addr, "switchboard-server listening");

    let result = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await;
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "server exited with error");
            3
        }
    }
}

/// Boots a single long-lived audio session from the adapters configured
/// in `adapters.audio_input_adapter`/`audio_output_adapter`. This is a
/// convenience path for deployments fronted directly by a
/// streaming transport rather than the text-in/text-out HTTP API; most
/// deployments leave `audio_session_enabled = false` and drive the
/// pipeline purely through `/api/v1/transcripts`. See DESIGN.md.
fn spawn_configured_audio_session(config: &Arc<AppConfig>, orchestrator: Arc<Orchestrator>) {
    let registry = AdapterRegistry::with_builtins();
    let input = registry.get_input(&config.adapters.audio_input_adapter, &config.adapters.input_config);
    let output = registry.get_output(&config.adapters.audio_output_adapter, &config.adapters.output_config);
    match (input, output) {
        (Ok(input), Ok(output)) => {
            let session_id = uuid::Uuid::new_v4();
            let cancellation = tokio_util::sync::CancellationToken::new();
            tokio::spawn(async move {
                if let Err(e) = orchestrator
                    .run_audio_session(session_id, "boot-session".to_string(), "default".to_string(), input, output, cancellation)
                    .await
                {
                    error!(error = %e, "configured audio session ended with an error");
                }
            });
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "failed to construct configured audio adapters; continuing without an audio session");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

async fn run_healthcheck(base_url: &str, timeout_s: u64) -> i32 {
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(timeout_s)).build() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to build HTTP client: {e}");
            return 3;
        }
    };

    let url = format!("{}/health/ready", base_url.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            println!("ready");
            0
        }
        Ok(resp) => {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            eprintln!("not ready: HTTP {status}: {body}");
            2
        }
        Err(e) => {
            eprintln!("dependency unavailable: {e}");
            2
        }
    }
}
