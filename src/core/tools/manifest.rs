//! Tool manifest and agent profiles.
//!
//! A session advertises a fixed set of tools chosen by its [`AgentProfile`].
//! Profiles are plain configuration values; switching the agent's role means
//! picking a different profile when the session opens.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ToolError;
use crate::core::realtime::{FunctionDefinition, ToolDefinition};

/// Wire name of the knowledge base search tool.
pub const KNOWLEDGE_BASE_SEARCH: &str = "knowledge_base_search";

const KNOWLEDGE_BASE_SEARCH_DESCRIPTION: &str = "Search the company knowledge base for specific information about history, products, services, and technology.";

const KNOWLEDGE_ASSISTANT_INSTRUCTIONS: &str = "\
You are a knowledgeable voice assistant with access to a specialized knowledge base about our company.

Your capabilities:
- Answer questions about the company's history, products, and services
- Provide information about our technology stack and offerings
- Help users understand our business and contact information

When users ask questions that require specific company information, use the knowledge_base_search tool to get accurate, up-to-date information from our knowledge base.

Be conversational, helpful, and professional. If you don't have specific information in your knowledge base, let the user know and offer to help with what you can.

Always maintain a friendly and engaging tone during voice conversations.";

const PLAIN_INSTRUCTIONS: &str = "\
You are a friendly voice assistant. Keep answers short and conversational. \
If you do not know something, say so.";

/// Tools the relay knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    KnowledgeBaseSearch,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::KnowledgeBaseSearch => KNOWLEDGE_BASE_SEARCH,
        }
    }

    /// Look a tool up by the name the model uses.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            KNOWLEDGE_BASE_SEARCH => Some(ToolKind::KnowledgeBaseSearch),
            _ => None,
        }
    }

    /// Function definition advertised to the model.
    pub fn definition(&self) -> ToolDefinition {
        match self {
            ToolKind::KnowledgeBaseSearch => ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: KNOWLEDGE_BASE_SEARCH.to_string(),
                    description: Some(KNOWLEDGE_BASE_SEARCH_DESCRIPTION.to_string()),
                    parameters: Some(json!({
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "The search query to find relevant information in the knowledge base"
                            }
                        },
                        "required": ["query"]
                    })),
                },
            },
        }
    }
}

/// The tools enabled for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSet {
    tools: Vec<ToolKind>,
}

impl ToolSet {
    pub fn new(tools: impl IntoIterator<Item = ToolKind>) -> Self {
        let mut set = Vec::new();
        for tool in tools {
            if !set.contains(&tool) {
                set.push(tool);
            }
        }
        Self { tools: set }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve a requested tool name against this set.
    pub fn resolve(&self, name: &str) -> Result<ToolKind, ToolError> {
        ToolKind::from_name(name)
            .filter(|kind| self.tools.contains(kind))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolKind::definition).collect()
    }

    pub fn contains(&self, kind: ToolKind) -> bool {
        self.tools.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Agent role selected at session-config time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentProfile {
    /// Company assistant backed by the knowledge base
    #[default]
    KnowledgeAssistant,
    /// Conversation only, no tools
    Plain,
}

impl AgentProfile {
    pub fn tools(&self) -> ToolSet {
        match self {
            AgentProfile::KnowledgeAssistant => ToolSet::new([ToolKind::KnowledgeBaseSearch]),
            AgentProfile::Plain => ToolSet::empty(),
        }
    }

    pub fn instructions(&self) -> &'static str {
        match self {
            AgentProfile::KnowledgeAssistant => KNOWLEDGE_ASSISTANT_INSTRUCTIONS,
            AgentProfile::Plain => PLAIN_INSTRUCTIONS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentProfile::KnowledgeAssistant => "knowledge_assistant",
            AgentProfile::Plain => "plain",
        }
    }
}

impl FromStr for AgentProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "knowledge_assistant" => Ok(AgentProfile::KnowledgeAssistant),
            "plain" => Ok(AgentProfile::Plain),
            other => Err(format!(
                "unknown agent profile '{other}', expected knowledge_assistant or plain"
            )),
        }
    }
}

impl std::fmt::Display for AgentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_base_search_definition() {
        let def = ToolKind::KnowledgeBaseSearch.definition();
        assert_eq!(def.tool_type, "function");
        assert_eq!(def.function.name, "knowledge_base_search");

        let params = def.function.parameters.unwrap();
        assert_eq!(params["properties"]["query"]["type"], "string");
        assert_eq!(params["required"], json!(["query"]));
    }

    #[test]
    fn test_profile_tool_sets() {
        let tools = AgentProfile::KnowledgeAssistant.tools();
        assert_eq!(tools.len(), 1);
        assert!(tools.contains(ToolKind::KnowledgeBaseSearch));
        assert!(AgentProfile::Plain.tools().is_empty());
        assert!(
            AgentProfile::KnowledgeAssistant
                .instructions()
                .contains("knowledge_base_search")
        );
    }

    #[test]
    fn test_resolve_rejects_tools_outside_set() {
        let tools = AgentProfile::KnowledgeAssistant.tools();
        assert_eq!(
            tools.resolve("knowledge_base_search"),
            Ok(ToolKind::KnowledgeBaseSearch)
        );
        assert_eq!(
            tools.resolve("book_appointment"),
            Err(ToolError::UnknownTool("book_appointment".into()))
        );
        assert!(AgentProfile::Plain.tools().resolve("knowledge_base_search").is_err());
    }

    #[test]
    fn test_tool_set_deduplicates() {
        let set = ToolSet::new([ToolKind::KnowledgeBaseSearch, ToolKind::KnowledgeBaseSearch]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.definitions().len(), 1);
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(
            "knowledge-assistant".parse::<AgentProfile>(),
            Ok(AgentProfile::KnowledgeAssistant)
        );
        assert_eq!("PLAIN".parse::<AgentProfile>(), Ok(AgentProfile::Plain));
        assert!("triage".parse::<AgentProfile>().is_err());
        assert_eq!(AgentProfile::Plain.to_string(), "plain");
    }
}
