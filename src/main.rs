use newsletter_campaigns::configuration::Settings;
use newsletter_campaigns::startup::Application;
use newsletter_campaigns::telemetry::config_tracing;
use std::fmt::{Debug, Display};
use tokio::task::JoinError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::get_configuration().expect("Failed to read configuration");

    config_tracing(&settings.application);

    let newsletter = settings.newsletter.clone();
    let app = Application::build(settings).await?;
    let worker = newsletter
        .sweeper_enabled
        .then(|| app.sweeper_worker(newsletter.sweep_interval()));

    let app_task = tokio::spawn(app.run_until_terminated());
    match worker {
        Some(worker) => {
            let worker_task = tokio::spawn(worker.run_until_terminated());
            tokio::select! {
                outcome = app_task => report_exit("API", outcome),
                outcome = worker_task => report_exit("Campaign sweeper", outcome),
            }
        }
        None => report_exit("API", app_task.await),
    }

    Ok(())
}

fn report_exit(task_name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => tracing::info!("{} has exited", task_name),
        Ok(Err(e)) => tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "{} failed",
            task_name
        ),
        Err(e) => tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "{} task failed to complete",
            task_name
        ),
    }
}
