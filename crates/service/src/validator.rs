//! Order validation for outgoing transcripts.
//!
//! A finite-state machine walks the sequence once. Legal moves live in
//! [`TRANSITIONS`]; anything not listed there is an order error that names
//! the offending index, the role found and the roles that would have been
//! accepted. The sequence itself is never touched.

use promptline_core::error::{Error, Result};
use promptline_core::message::{Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    SeenSystem,
    /// Last message was a user turn.
    ExpectAssistant,
    /// Last message was an assistant turn without tool calls.
    ExpectUser,
    /// Last message was an assistant turn that requested tools.
    ExpectToolResult,
    AfterToolResult,
    Invalid,
}

/// Role as the state machine sees it: assistant turns split on whether they
/// request tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    System,
    User,
    Assistant,
    AssistantWithTools,
    ToolResult,
}

impl Kind {
    fn of(message: &Message) -> Self {
        match message.role() {
            Role::System => Kind::System,
            Role::User => Kind::User,
            Role::Assistant if message.has_tool_calls() => Kind::AssistantWithTools,
            Role::Assistant => Kind::Assistant,
            Role::ToolResult => Kind::ToolResult,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Kind::System => "system",
            Kind::User => "user",
            Kind::Assistant => "assistant",
            Kind::AssistantWithTools => "assistant (tool calls)",
            Kind::ToolResult => "tool_result",
        }
    }
}

const TRANSITIONS: &[(State, Kind, State)] = &[
    (State::Start, Kind::System, State::SeenSystem),
    (State::Start, Kind::User, State::ExpectAssistant),
    (State::SeenSystem, Kind::System, State::SeenSystem),
    (State::SeenSystem, Kind::User, State::ExpectAssistant),
    (State::ExpectAssistant, Kind::User, State::ExpectAssistant),
    (State::ExpectAssistant, Kind::Assistant, State::ExpectUser),
    (State::ExpectAssistant, Kind::AssistantWithTools, State::ExpectToolResult),
    (State::ExpectUser, Kind::User, State::ExpectAssistant),
    (State::ExpectToolResult, Kind::ToolResult, State::AfterToolResult),
    (State::AfterToolResult, Kind::ToolResult, State::AfterToolResult),
    (State::AfterToolResult, Kind::User, State::ExpectAssistant),
    (State::AfterToolResult, Kind::Assistant, State::ExpectUser),
    (State::AfterToolResult, Kind::AssistantWithTools, State::ExpectToolResult),
];

fn next(state: State, kind: Kind) -> State {
    TRANSITIONS
        .iter()
        .find(|(from, on, _)| *from == state && *on == kind)
        .map(|(_, _, to)| *to)
        .unwrap_or(State::Invalid)
}

fn expected(state: State) -> String {
    let kinds: Vec<&str> = TRANSITIONS
        .iter()
        .filter(|(from, _, _)| *from == state)
        .map(|(_, on, _)| on.label())
        .collect();
    kinds.join(" or ")
}

fn accepts_end(state: State) -> bool {
    !matches!(state, State::ExpectToolResult | State::Invalid)
}

/// Check that `messages` form a legal transcript.
///
/// Accepts zero or more leading system messages followed by a user turn and
/// any well-formed continuation. Empty and system-only sequences pass.
pub fn validate(messages: &[Message]) -> Result<()> {
    let mut state = State::Start;

    for (index, message) in messages.iter().enumerate() {
        let kind = Kind::of(message);
        let to = next(state, kind);
        if to != State::Invalid {
            state = to;
            continue;
        }

        let message = match state {
            State::Start | State::SeenSystem => format!(
                "conversation must begin with a user message after optional system messages, found {}",
                kind.label()
            ),
            _ if kind == Kind::System => {
                "system messages are only allowed at the start of the conversation".to_string()
            }
            _ => format!("expected {}, found {}", expected(state), kind.label()),
        };
        return Err(Error::Validation { index, message });
    }

    if !accepts_end(state) {
        return Err(Error::Validation {
            index: messages.len(),
            message: format!(
                "conversation ends before the requested tool calls were answered; expected {}",
                expected(state)
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptline_core::message::ToolCall;

    fn call() -> ToolCall {
        ToolCall::new("call_1", "search", r#"{"q":"rust"}"#)
    }

    fn index_of(err: Error) -> usize {
        match err {
            Error::Validation { index, .. } => index,
            other => panic!("Expected Validation, got: {other:?}"),
        }
    }

    #[test]
    fn empty_and_system_only_pass() {
        assert!(validate(&[]).is_ok());
        assert!(validate(&[Message::system("a"), Message::system("b")]).is_ok());
    }

    #[test]
    fn leading_systems_then_user() {
        let messages = vec![
            Message::system("one"),
            Message::system("two"),
            Message::user("hi"),
        ];
        assert!(validate(&messages).is_ok());
    }

    #[test]
    fn assistant_first_is_rejected() {
        let err = validate(&[Message::assistant("hi"), Message::user("hello")]).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Invalid message order"));
        assert!(text.contains("must begin with a user message"));
        assert_eq!(index_of(err), 0);
    }

    #[test]
    fn tool_result_first_is_rejected() {
        let err = validate(&[Message::system("s"), Message::tool_result("x", "y")]).unwrap_err();
        assert_eq!(index_of(err), 1);
    }

    #[test]
    fn alternating_conversation_passes() {
        let messages = vec![
            Message::system("s"),
            Message::user("hello"),
            Message::assistant("hi"),
            Message::user("how are you?"),
        ];
        assert!(validate(&messages).is_ok());
    }

    #[test]
    fn consecutive_users_are_tolerated() {
        assert!(validate(&[Message::user("a"), Message::user("b")]).is_ok());
    }

    #[test]
    fn consecutive_assistants_are_rejected() {
        let err = validate(&[
            Message::user("a"),
            Message::assistant("b"),
            Message::assistant("c"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("expected user, found assistant"));
        assert_eq!(index_of(err), 2);
    }

    #[test]
    fn system_mid_conversation_is_rejected() {
        let err = validate(&[
            Message::user("a"),
            Message::assistant("b"),
            Message::system("late"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("only allowed at the start"));
        assert_eq!(index_of(err), 2);
    }

    #[test]
    fn tool_round_trip_passes() {
        let messages = vec![
            Message::user("search rust"),
            Message::assistant_tool_calls(vec![call()]),
            Message::tool_result("call_1", "results"),
            Message::assistant("Here is what I found"),
            Message::user("thanks"),
        ];
        assert!(validate(&messages).is_ok());
    }

    #[test]
    fn multiple_tool_results_then_user() {
        let messages = vec![
            Message::user("go"),
            Message::assistant_tool_calls(vec![
                call(),
                ToolCall::new("call_2", "fetch", "{}"),
            ]),
            Message::tool_result("call_1", "a"),
            Message::tool_result("call_2", "b"),
            Message::user("continue"),
        ];
        assert!(validate(&messages).is_ok());
    }

    #[test]
    fn user_before_tool_result_is_rejected() {
        let err = validate(&[
            Message::user("go"),
            Message::assistant_tool_calls(vec![call()]),
            Message::user("too early"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("expected tool_result, found user"));
        assert_eq!(index_of(err), 2);
    }

    #[test]
    fn unanswered_tool_calls_at_end_are_rejected() {
        let messages = vec![
            Message::user("go"),
            Message::assistant_tool_calls(vec![call()]),
        ];
        let err = validate(&messages).unwrap_err();
        assert_eq!(index_of(err), 2);
    }

    #[test]
    fn stray_tool_result_is_rejected() {
        let err = validate(&[
            Message::user("a"),
            Message::assistant("b"),
            Message::tool_result("call_1", "c"),
        ])
        .unwrap_err();
        assert_eq!(index_of(err), 2);
    }

    #[test]
    fn every_live_state_has_transitions() {
        for state in [
            State::Start,
            State::SeenSystem,
            State::ExpectAssistant,
            State::ExpectUser,
            State::ExpectToolResult,
            State::AfterToolResult,
        ] {
            assert!(!expected(state).is_empty(), "{state:?} has no transitions");
        }
    }
}
