use anyhow::Result;
use cua_operator::sinks::DiskFrameStore;
use cua_operator::{
    controls, BrowserConfig, ChromiumEnvironment, DomConfig, DomEnvironment, Environment,
    GeminiOracle, Operator, OperatorConfig, OracleConfig, Session, TaskInput,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let task = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let task = if task.trim().is_empty() {
        std::env::var("OPERATOR_TASK")
            .unwrap_or_else(|_| "Search for the weather in Paris.".to_string())
    } else {
        task
    };

    // OPERATOR_SURFACE=dom drives an already-open tab with synthetic events.
    let surface = std::env::var("OPERATOR_SURFACE").unwrap_or_default();
    let env: Arc<dyn Environment> = if surface.eq_ignore_ascii_case("dom") {
        Arc::new(DomEnvironment::new(DomConfig::default()))
    } else {
        let ws_url = std::env::var("CHROME_WS_URL").ok().filter(|s| !s.trim().is_empty());
        Arc::new(ChromiumEnvironment::new(BrowserConfig {
            headless: false,
            ws_url,
            start_url: Some("https://www.google.com".to_string()),
            ..BrowserConfig::default()
        }))
    };

    let oracle = GeminiOracle::new(OracleConfig::default())?;
    let frames_dir = std::env::temp_dir().join("cua_operator_runs");
    let operator = Operator::new(env, oracle, OperatorConfig::from_env())
        .with_frame_store(Arc::new(DiskFrameStore::new(&frames_dir)));

    let (handle, mut ctl) = controls();
    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let mut session = Session::new();
    operator.start(&mut session).await?;
    let outcome = operator
        .run_task(&mut session, TaskInput::Typed(task), &mut ctl)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("{}", serde_json::to_string_pretty(session.history())?);
    println!("frames saved under {}", frames_dir.join(session.id()).display());
    Ok(())
}
