use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::controller::{AdaptiveController, ControllerEvent, RunReport, Scope, UnitOfWork};
use crate::provider::LanguageModel;
use crate::retry::WorkError;
use crate::search::WebSearch;
use crate::tasks::{build_tasks, compose_prompt};
use crate::telemetry::TelemetrySink;

/// `June 2025`, the form the task prompts expect.
pub fn current_month_year() -> String {
    chrono::Local::now().format("%B %Y").to_string()
}

/// Sequential three-agent analysis, parameterized by scope.
///
/// Each call starts from scratch; nothing from an abandoned attempt carries
/// over into the next one.
pub struct AnalysisPipeline {
    model: Arc<dyn LanguageModel>,
    search: Arc<dyn WebSearch>,
    product: String,
    search_results: usize,
    current_date: String,
}

impl AnalysisPipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn WebSearch>,
        product: impl Into<String>,
        search_results: usize,
        current_date: impl Into<String>,
    ) -> Self {
        Self {
            model,
            search,
            product: product.into(),
            search_results,
            current_date: current_date.into(),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }
}

#[async_trait]
impl UnitOfWork for AnalysisPipeline {
    async fn run(&self, scope: Scope) -> Result<String, WorkError> {
        let tasks = build_tasks(&self.product, scope, &self.current_date, self.search_results);
        let mut sections: Vec<(&'static str, String)> = Vec::with_capacity(tasks.len());
        let mut rendered = String::new();

        for task in &tasks {
            let evidence = match &task.search {
                Some(plan) => {
                    let bundle = self.search.search(&plan.query, plan.num_results).await?;
                    tracing::debug!(
                        task = task.title,
                        hits = bundle.results.len(),
                        "search evidence collected"
                    );
                    Some(bundle.to_prompt_text())
                }
                None => None,
            };

            let context = sections
                .iter()
                .map(|(title, output)| (*title, output.as_str()))
                .collect::<Vec<_>>();
            let prompt = compose_prompt(task, &context, evidence.as_deref());

            tracing::info!(task = task.title, agent = task.agent.id, %scope, "running task");
            let output = self.model.generate(&prompt.system, &prompt.user).await?;

            if !rendered.is_empty() {
                rendered.push_str("\n\n");
            }
            rendered.push_str(&format!(
                "## {} ({})\n\n{}",
                task.agent.role,
                task.title,
                output.trim()
            ));
            sections.push((task.title, output));
        }

        Ok(rendered)
    }
}

/// Drive the pipeline through the controller, mirroring every event to
/// telemetry before handing it to `on_event`.
pub async fn run_analysis(
    controller: &AdaptiveController,
    pipeline: &AnalysisPipeline,
    telemetry: &TelemetrySink,
    on_event: &mut (dyn FnMut(&ControllerEvent) + Send),
) -> RunReport {
    telemetry.emit(
        "run_started",
        json!({
            "product": pipeline.product(),
            "strategies": controller
                .strategies()
                .iter()
                .map(|strategy| strategy.name.as_str())
                .collect::<Vec<_>>(),
            "max_retries": controller.policy().max_retries,
        }),
    );

    let report = controller
        .run_with_observer(pipeline, &mut |event| {
            telemetry.emit_controller_event(event);
            on_event(event);
        })
        .await;

    telemetry.emit_run_completed(&report);
    tracing::info!(
        success = report.is_success(),
        attempts = report.attempts.len(),
        backoffs = report.backoff_delays.len(),
        "analysis run finished"
    );
    report
}
