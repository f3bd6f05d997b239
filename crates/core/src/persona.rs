//! Agent persona configuration
//!
//! A persona is the configured script/behavior profile the agent uses for a
//! conversation: display names, message templates with named placeholders,
//! keyword lists and the turn cap. At most one persona is active at a time;
//! when none is configured the built-in default keeps the engine running.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configured conversation profile for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPersona {
    /// None for the built-in default persona
    pub id: Option<Uuid>,
    pub agent_name: String,
    pub company_name: String,
    /// Templates support `{lead_name}`, `{agent_name}` and `{company_name}`
    pub greeting_template: String,
    pub pitch_template: String,
    pub closing_template: String,
    pub positive_keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
    pub max_turns: u32,
    pub recording_enabled: bool,
    pub analytics_enabled: bool,
    pub active: bool,
    pub voice_id: Option<String>,
}

impl Default for AgentPersona {
    fn default() -> Self {
        Self {
            id: None,
            agent_name: "AI Assistant".to_string(),
            company_name: "our company".to_string(),
            greeting_template: "Hello {lead_name}, this is {agent_name} calling from \
                                {company_name}. Do you have a moment to talk?"
                .to_string(),
            pitch_template: "I am reaching out to tell you about our services and see \
                             whether they could be useful for you."
                .to_string(),
            closing_template: "Thank you for your time, {lead_name}. Have a great day!"
                .to_string(),
            positive_keywords: vec![
                "yes".to_string(),
                "interested".to_string(),
                "tell me more".to_string(),
            ],
            negative_keywords: vec!["not interested".to_string(), "stop calling".to_string()],
            max_turns: 10,
            recording_enabled: false,
            analytics_enabled: false,
            active: true,
            voice_id: None,
        }
    }
}

impl AgentPersona {
    /// Fill a template's named placeholders.
    pub fn render(&self, template: &str, lead_name: &str) -> String {
        template
            .replace("{lead_name}", lead_name)
            .replace("{agent_name}", &self.agent_name)
            .replace("{company_name}", &self.company_name)
    }

    pub fn greeting(&self, lead_name: &str) -> String {
        self.render(&self.greeting_template, lead_name)
    }

    pub fn closing(&self, lead_name: &str) -> String {
        self.render(&self.closing_template, lead_name)
    }

    /// System prompt handed to the reply generator alongside the history.
    pub fn system_prompt(&self, lead_name: &str) -> String {
        let mut prompt = format!(
            "You are {agent}, a friendly phone agent for {company}, speaking with \
             {lead}. Keep replies short and conversational; this is a voice call, \
             so answer in one or two spoken sentences. {pitch}",
            agent = self.agent_name,
            company = self.company_name,
            lead = lead_name,
            pitch = self.render(&self.pitch_template, lead_name),
        );
        if !self.positive_keywords.is_empty() {
            prompt.push_str(&format!(
                " Signs of interest to build on: {}.",
                self.positive_keywords.join(", ")
            ));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_persona_agent_name() {
        let persona = AgentPersona::default();
        assert_eq!(persona.agent_name, "AI Assistant");
        assert_eq!(persona.max_turns, 10);
        assert!(persona.active);
        assert!(persona.id.is_none());
    }

    #[test]
    fn test_render_fills_all_placeholders() {
        let persona = AgentPersona {
            agent_name: "Priya".to_string(),
            company_name: "Acme".to_string(),
            ..Default::default()
        };
        let greeting = persona.greeting("Ravi");
        assert!(greeting.contains("Ravi"));
        assert!(greeting.contains("Priya"));
        assert!(greeting.contains("Acme"));
        assert!(!greeting.contains('{'));
    }

    #[test]
    fn test_system_prompt_mentions_lead() {
        let persona = AgentPersona::default();
        let prompt = persona.system_prompt("Ravi");
        assert!(prompt.contains("Ravi"));
        assert!(prompt.contains("AI Assistant"));
    }
}
