//! Persona Response Generation
//!
//! Builds prompts from the collected snippets and the conversation history and
//! asks the LLM to speak as the persona. LLM failures are absorbed here: the
//! caller always receives usable text, either the model's or a fixed fallback
//! that still names the persona.

use crate::{
    llm_client::{LLMClient, PromptMessage},
    snippet::Snippet,
    state::{ConversationState, PersonaWorkflowState},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

const DEFAULT_STYLE_TEMPLATE: &str = include_str!("../../../prompts/persona_style.md");
const DEFAULT_CHAT_TEMPLATE: &str = include_str!("../../../prompts/persona_chat.md");

/// The two prompt templates the generator fills in.
///
/// Placeholders: `{person_name}`, `{material}`, and `{style}` (chat only).
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub style: String,
    pub chat: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            style: DEFAULT_STYLE_TEMPLATE.to_string(),
            chat: DEFAULT_CHAT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Overrides the built-in templates with `persona_style` / `persona_chat`
    /// entries of a prompt map, keeping the defaults for missing keys.
    pub fn with_overrides(mut self, prompts: &HashMap<String, String>) -> Self {
        if let Some(style) = prompts.get("persona_style") {
            self.style = style.clone();
        }
        if let Some(chat) = prompts.get("persona_chat") {
            self.chat = chat.clone();
        }
        self
    }
}

/// Bounds on how much collected material goes into a prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub max_snippets: usize,
    pub max_snippet_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_snippets: 8,
            max_snippet_chars: 800,
        }
    }
}

pub struct PersonaResponseGenerator {
    llm: Arc<dyn LLMClient>,
    templates: PromptTemplates,
    limits: PromptLimits,
}

impl PersonaResponseGenerator {
    pub fn new(llm: Arc<dyn LLMClient>, templates: PromptTemplates, limits: PromptLimits) -> Self {
        Self {
            llm,
            templates,
            limits,
        }
    }

    /// Renders the first `max_snippets` snippets as a bullet list.
    fn material(&self, snippets: &[Snippet]) -> String {
        if snippets.is_empty() {
            return "(no public material was found)".to_string();
        }
        snippets
            .iter()
            .take(self.limits.max_snippets)
            .map(|s| format!("- {}", s.truncated(self.limits.max_snippet_chars).trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Synthesizes the persona's speaking style from the collected material.
    pub async fn synthesize_style(&self, state: &PersonaWorkflowState) -> String {
        let material = self.material(&state.collected_snippets);
        let prompt = render(
            &self.templates.style,
            &[
                ("person_name", state.person_name.as_str()),
                ("material", material.as_str()),
            ],
        );

        let messages = vec![
            PromptMessage::System(
                "You are an expert at extracting meaningful quotes and analyzing communication styles from text."
                    .to_string(),
            ),
            PromptMessage::User(prompt),
        ];

        match self.llm.complete(messages).await {
            Ok(style) => {
                info!(persona = %state.person_name, chars = style.len(), "Synthesized persona style");
                style
            }
            Err(e) => {
                warn!(persona = %state.person_name, error = ?e, "Style synthesis failed; using fallback style");
                fallback_style(&state.person_name)
            }
        }
    }

    /// Builds the full prompt for a chat turn: instructions, history, new query.
    pub fn chat_prompt(&self, conversation: &ConversationState, query: &str) -> Vec<PromptMessage> {
        let name = conversation.person_name();
        let style = if conversation.persona_context.trim().is_empty() {
            fallback_style(name)
        } else {
            conversation.persona_context.clone()
        };
        let material = self.material(&conversation.workflow.collected_snippets);
        let system = render(
            &self.templates.chat,
            &[
                ("person_name", name),
                ("style", style.as_str()),
                ("material", material.as_str()),
            ],
        );

        let mut messages = Vec::with_capacity(conversation.history.len() + 2);
        messages.push(PromptMessage::System(system));
        messages.extend(
            conversation
                .history
                .iter()
                .map(|turn| PromptMessage::from_turn(turn.role, &turn.text)),
        );
        messages.push(PromptMessage::User(query.to_string()));
        messages
    }

    /// Generates a reply and returns the conversation with the exchange recorded.
    ///
    /// The user turn is recorded even when the LLM fails; the fallback apology
    /// is recorded as the persona's turn so history keeps alternating.
    pub async fn reply(
        &self,
        conversation: ConversationState,
        query: &str,
        max_history: usize,
    ) -> (ConversationState, String) {
        let messages = self.chat_prompt(&conversation, query);
        let reply = match self.llm.complete(messages).await {
            Ok(text) => text,
            Err(e) => {
                warn!(persona = %conversation.person_name(), error = ?e, "Reply generation failed; using fallback reply");
                fallback_reply(conversation.person_name())
            }
        };
        let next = conversation.with_exchange(query, &reply, max_history);
        (next, reply)
    }
}

/// Fills `{key}` placeholders in one left-to-right pass.
///
/// Substituted values are copied verbatim, so braces inside a persona name or
/// a snippet are never expanded again. Unknown placeholders are left as-is.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// In-character instruction used when no style could be synthesized.
pub fn fallback_style(person_name: &str) -> String {
    format!(
        "{person_name} appears to have a friendly, professional and direct communication style. \
         When introducing yourself or asked who you are, always mention your name \"{person_name}\"."
    )
}

/// Apology returned in the persona's name when the LLM cannot be reached.
pub fn fallback_reply(person_name: &str) -> String {
    format!(
        "{person_name} here. Sorry, I'm having trouble finding the right words at the moment. Could you ask me that again in a little while?"
    )
}
