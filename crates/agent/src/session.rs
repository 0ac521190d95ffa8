use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::ChatMessage;

pub const DEFAULT_GREETING: &str = "Hello! I can estimate greenhouse-gas emissions for freight \
shipments, electricity use and fuel combustion. Tell me what you want to calculate.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: SessionRole,
    pub content: String,
}

/// One conversation. Owned by the caller and never shared between users.
///
/// The greeting is shown to the user but is not part of the model history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    greeting: String,
    messages: Vec<SessionMessage>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}

impl Session {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4().to_string(), greeting: greeting.into(), messages: Vec::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(SessionMessage { role: SessionRole::User, content: content.into() });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages
            .push(SessionMessage { role: SessionRole::Assistant, content: content.into() });
    }

    /// Drops the trailing user message of a turn that produced no answer.
    pub(crate) fn discard_pending_user(&mut self) {
        if self.messages.last().is_some_and(|message| message.role == SessionRole::User) {
            self.messages.pop();
        }
    }

    /// History as sent to the model: user and assistant text only, greeting excluded.
    pub fn model_history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(|message| match message.role {
                SessionRole::User => ChatMessage::user(message.content.clone()),
                SessionRole::Assistant => ChatMessage::assistant(message.content.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionRole};
    use crate::llm::ChatRole;

    #[test]
    fn greeting_is_never_part_of_model_history() {
        let mut session = Session::new("Hi there");
        session.push_user("100 kWh in Sumatera");
        session.push_assistant("That is 81 kgCO2e.");

        let history = session.model_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[1].role, ChatRole::Assistant);
        assert!(history.iter().all(|message| message.content != "Hi there"));
        assert_eq!(session.greeting(), "Hi there");
        assert_eq!(session.messages()[1].role, SessionRole::Assistant);
    }

    #[test]
    fn discarding_pending_user_keeps_answered_turns() {
        let mut session = Session::default();
        session.push_user("20 L diesel");
        session.push_assistant("53.6 kgCO2e");
        session.discard_pending_user();
        assert_eq!(session.messages().len(), 2);

        session.push_user("and gasoline?");
        session.discard_pending_user();
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, SessionRole::Assistant);
    }

    #[test]
    fn sessions_get_distinct_ids() {
        assert_ne!(Session::default().id(), Session::default().id());
    }
}
