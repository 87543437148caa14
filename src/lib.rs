pub(crate) mod api;
pub(crate) mod console;
pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use tokio::sync::mpsc;

use crate::console::ConsoleView;
use crate::core::{config::Settings, metrics, shutdown, state::AppState, telemetry};
use crate::services::quiz_session::{FlowEnd, QuizFlow};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    metrics::init(&settings)?;

    let state = AppState::from_settings(settings)?;
    tracing::info!(
        api = %state.settings().api().base_url.as_str(),
        environment = %state.settings().runtime().environment.as_str(),
        "Quiz runner starting"
    );

    let flow = QuizFlow::new(&state);
    let (events_tx, events_rx) = mpsc::channel(32);
    console::spawn_input(events_tx);

    let mut view = ConsoleView::new(std::io::stdout());
    let interrupts = shutdown::watch_interrupts(shutdown::abandon_signal, || {
        std::process::exit(130);
    });
    let abandon = async move {
        if interrupts.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let end = flow.run(&mut view, events_rx, abandon).await;

    for line in console::describe_end(&end, flow.route_for(&end)) {
        println!("{line}");
    }

    if matches!(end, FlowEnd::Submitted(_)) {
        if let Some(student_id) = state.auth().current_user() {
            for line in console::fetch_results(state.api().as_ref(), &student_id).await {
                println!("{line}");
            }
        }
    }

    if let Some(snapshot) = metrics::render() {
        tracing::info!(metrics = %snapshot, "Quiz runner metrics");
    }

    Ok(())
}
