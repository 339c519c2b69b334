use anyhow::Result;

/// A named persona. Every agent talks to the same model; only the
/// instruction differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    pub id: &'static str,
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

impl AgentProfile {
    pub fn system_instruction(&self) -> String {
        format!(
            "You are a {}.\n\
             Goal: {}\n\
             \n\
             {}\n\
             \n\
             Answer in plain text. Follow the requested structure and word limits exactly.",
            self.role, self.goal, self.backstory
        )
    }
}

pub const MARKET_RESEARCH_ANALYST: AgentProfile = AgentProfile {
    id: "market_analyst",
    role: "Market Research Analyst",
    goal: "Provide quick, focused market analysis with key insights",
    backstory: "You are an efficient market research analyst who provides concise, actionable \
                insights. You focus on the most important market data and avoid lengthy \
                explanations.",
};

pub const TECHNOLOGY_EXPERT: AgentProfile = AgentProfile {
    id: "tech_expert",
    role: "Technology Expert",
    goal: "Assess technical feasibility with practical recommendations",
    backstory: "You are a practical technology expert who focuses on implementable solutions. \
                You provide clear technical assessments without unnecessary complexity.",
};

pub const BUSINESS_CONSULTANT: AgentProfile = AgentProfile {
    id: "business_consultant",
    role: "Business Consultant",
    goal: "Create actionable business strategies and launch plans",
    backstory: "You are a results-oriented business consultant who creates practical, \
                implementable business strategies. You focus on clear action items and \
                realistic timelines.",
};

/// Agents in delegation order.
pub const CREW: [AgentProfile; 3] = [
    MARKET_RESEARCH_ANALYST,
    TECHNOLOGY_EXPERT,
    BUSINESS_CONSULTANT,
];

pub fn find_agent(name: &str) -> Option<&'static AgentProfile> {
    let needle = name.trim();
    CREW.iter()
        .find(|agent| agent.id.eq_ignore_ascii_case(needle) || agent.role.eq_ignore_ascii_case(needle))
}

pub fn run_agents_list() -> Result<()> {
    println!("Analysis crew (delegation order):");
    for (index, agent) in CREW.iter().enumerate() {
        println!("{}. {} ({})", index + 1, agent.role, agent.id);
    }
    Ok(())
}

pub fn run_agents_show(requested_name: String) -> Result<()> {
    let agent = find_agent(&requested_name).ok_or_else(|| {
        let names = CREW.iter().map(|agent| agent.id).collect::<Vec<&str>>();
        anyhow::anyhow!(
            "agent '{}' not found. Available agents: {}",
            requested_name.trim(),
            names.join(", ")
        )
    })?;

    println!("Agent: {} ({})", agent.role, agent.id);
    println!("Goal: {}", agent.goal);
    println!("Backstory: {}", agent.backstory);
    Ok(())
}
