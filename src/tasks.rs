//! Prompt templates for the three analysis tasks.
//!
//! Everything here is a pure function of its inputs; the caller supplies the
//! current date so output is reproducible.

use crate::agents::{AgentProfile, BUSINESS_CONSULTANT, MARKET_RESEARCH_ANALYST, TECHNOLOGY_EXPERT};
use crate::controller::Scope;

/// Hits used by the quick scope, regardless of the configured count.
pub const QUICK_SEARCH_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub query: String,
    pub num_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub title: &'static str,
    pub agent: &'static AgentProfile,
    pub description: String,
    pub expected_output: &'static str,
    pub search: Option<SearchPlan>,
    /// Feed the outputs of earlier tasks into this one.
    pub uses_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptParts {
    pub system: String,
    pub user: String,
}

pub fn build_tasks(product: &str, scope: Scope, current_date: &str, search_results: usize) -> Vec<TaskSpec> {
    match scope {
        Scope::Full => standard_tasks(product, current_date, |_| Some(search_results.max(1))),
        Scope::Quick => standard_tasks(product, current_date, |index| {
            (index == 0).then_some(search_results.clamp(1, QUICK_SEARCH_RESULTS))
        }),
        Scope::Emergency => emergency_tasks(product),
    }
}

fn standard_tasks(
    product: &str,
    current_date: &str,
    search_for: impl Fn(usize) -> Option<usize>,
) -> Vec<TaskSpec> {
    let plan = |index: usize, query: String| {
        search_for(index).map(|num_results| SearchPlan { query, num_results })
    };

    vec![
        TaskSpec {
            title: "Market Analysis",
            agent: &MARKET_RESEARCH_ANALYST,
            description: format!(
                "Conduct a rapid market analysis for {product}.\n\
                 Focus ONLY on essential information. Current date is {current_date}.\n\
                 \n\
                 Provide exactly these 5 points (keep each under 2 sentences):\n\
                 1. Primary target customer (age, income, behavior)\n\
                 2. Market size estimate (global/regional)\n\
                 3. Top 3 direct competitors\n\
                 4. Best marketing channel (online/offline/hybrid)\n\
                 5. Suggested price range\n\
                 \n\
                 Total response: Maximum 300 words. Be direct and specific."
            ),
            expected_output: "5-point market analysis covering target customers, market size, \
                              competitors, marketing channel, and pricing (max 300 words).",
            search: plan(0, format!("{product} market size target customers competitors price")),
            uses_context: false,
        },
        TaskSpec {
            title: "Technical Assessment",
            agent: &TECHNOLOGY_EXPERT,
            description: format!(
                "Provide a basic technical assessment for {product}.\n\
                 Focus on practical implementation only.\n\
                 \n\
                 Cover exactly these 4 areas (2 sentences each):\n\
                 1. Manufacturing method (how it's made)\n\
                 2. Key equipment needed\n\
                 3. Main quality control point\n\
                 4. Biggest technical challenge\n\
                 \n\
                 Total response: Maximum 250 words. Focus on practicality."
            ),
            expected_output: "4-point technical assessment covering manufacturing, equipment, \
                              quality control, and challenges (max 250 words).",
            search: plan(1, format!("how is {product} made manufacturing equipment quality control")),
            uses_context: false,
        },
        TaskSpec {
            title: "Business Strategy",
            agent: &BUSINESS_CONSULTANT,
            description: format!(
                "Create a focused business strategy for {product} using the previous analyses.\n\
                 Current date is {current_date}.\n\
                 \n\
                 Provide exactly these 6 elements (keep each concise):\n\
                 1. Business model (B2B/B2C/subscription/one-time)\n\
                 2. Primary revenue stream\n\
                 3. Launch timeline (3-6-12 months)\n\
                 4. Success metric (1 key KPI)\n\
                 5. Biggest risk\n\
                 6. Initial funding estimate\n\
                 \n\
                 Total response: Maximum 350 words. Be actionable and realistic."
            ),
            expected_output: "6-point business strategy with model, revenue, timeline, metrics, \
                              risks, and funding (max 350 words).",
            search: plan(2, format!("{product} business model revenue launch strategy")),
            uses_context: true,
        },
    ]
}

fn emergency_tasks(product: &str) -> Vec<TaskSpec> {
    vec![
        TaskSpec {
            title: "Customer Snapshot",
            agent: &MARKET_RESEARCH_ANALYST,
            description: format!(
                "Quick analysis: Who would buy {product} and why?\n\
                 Answer in exactly 3 sentences. No research needed if obvious."
            ),
            expected_output: "3-sentence customer analysis.",
            search: None,
            uses_context: false,
        },
        TaskSpec {
            title: "Technical Difficulty",
            agent: &TECHNOLOGY_EXPERT,
            description: format!(
                "Simple question: How difficult is it to make {product}?\n\
                 Answer in exactly 2 sentences."
            ),
            expected_output: "2-sentence technical difficulty assessment.",
            search: None,
            uses_context: false,
        },
        TaskSpec {
            title: "Basic Business Plan",
            agent: &BUSINESS_CONSULTANT,
            description: format!(
                "Basic business plan: How would you sell {product}?\n\
                 Answer in exactly 4 sentences covering: how to sell, pricing, timeline, main challenge."
            ),
            expected_output: "4-sentence basic business plan.",
            search: None,
            uses_context: true,
        },
    ]
}

/// Assemble the model request for one task.
///
/// `context` holds `(title, output)` pairs of earlier tasks and is only used
/// when the task asks for it.
pub fn compose_prompt(task: &TaskSpec, context: &[(&str, &str)], evidence: Option<&str>) -> PromptParts {
    let mut user = format!(
        "{}\n\nExpected output: {}",
        task.description, task.expected_output
    );

    if task.uses_context && !context.is_empty() {
        user.push_str("\n\nContext from earlier analyses:");
        for (title, output) in context {
            user.push_str(&format!("\n\n### {title}\n{}", output.trim()));
        }
    }

    if let Some(evidence) = evidence.map(str::trim).filter(|e| !e.is_empty()) {
        user.push_str("\n\nWeb search evidence (cite only what is relevant):\n");
        user.push_str(evidence);
    }

    PromptParts {
        system: task.agent.system_instruction(),
        user,
    }
}
