use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Role };

/// System instruction policy for the model-facing prompt.
#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub web_search_suffix: String,
}

impl PromptConfig {
    pub fn new(system_prompt: impl Into<String>, web_search_suffix: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            web_search_suffix: web_search_suffix.into(),
        }
    }

    pub fn from_args(args: &Args) -> Self {
        Self::new(args.system_prompt.clone(), args.web_search_prompt.clone())
    }

    /// Builds `[system, ..transcript, user]`. A transcript that already opens with a system
    /// message keeps it in place of the configured one.
    pub fn assemble(
        &self,
        transcript: &[ChatMessage],
        user: &ChatMessage,
        web_search: bool
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(transcript.len() + 2);
        let rest = match transcript.first() {
            Some(first) if first.role == Role::System => {
                messages.push(self.with_flags(first.clone(), web_search));
                &transcript[1..]
            }
            _ => {
                messages.push(self.with_flags(ChatMessage::system(&self.system_prompt), web_search));
                transcript
            }
        };
        messages.extend_from_slice(rest);
        messages.push(user.clone());
        messages
    }

    fn with_flags(&self, mut system: ChatMessage, web_search: bool) -> ChatMessage {
        let suffix = self.web_search_suffix.trim();
        if web_search && !suffix.is_empty() && !system.content.contains(suffix) {
            system.content = format!("{}\n\n{}", system.content.trim_end(), suffix);
        }
        system
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PromptConfig {
        PromptConfig::new("Be helpful.", "Search is on.")
    }

    #[test]
    fn inserts_system_prompt_ahead_of_history() {
        let history = vec![ChatMessage::user("a"), ChatMessage::assistant("b", false)];
        let out = config().assemble(&history, &ChatMessage::user("c"), false);

        let roles: Vec<Role> = out.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(out[0].content, "Be helpful.");
        assert_eq!(out[3].content, "c");
    }

    #[test]
    fn reuses_existing_leading_system_message() {
        let history = vec![ChatMessage::system("Custom persona."), ChatMessage::user("a")];
        let out = config().assemble(&history, &ChatMessage::user("b"), false);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].content, "Custom persona.");
        assert_eq!(out.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[test]
    fn web_search_flag_appends_suffix_once() {
        let cfg = config();
        let out = cfg.assemble(&[], &ChatMessage::user("q"), true);
        assert_eq!(out[0].content, "Be helpful.\n\nSearch is on.");

        let again = cfg.assemble(&out[..1], &ChatMessage::user("q"), true);
        assert_eq!(again[0].content, "Be helpful.\n\nSearch is on.");
    }
}
