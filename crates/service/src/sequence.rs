//! Message sequence assembly.
//!
//! Merges the four possible sources of an outgoing transcript into one
//! ordered sequence:
//!
//! 1. **System turn** from the resolved system template
//! 2. **Stored history** read from conversation memory
//! 3. **Dynamic messages** supplied by the caller
//! 4. **Trailing user turn** from the resolved trailing-user template
//!
//! History is only read when the caller supplied no messages, so 2 and 3
//! never both contribute. The template system turn is skipped whenever the
//! history or dynamic messages already open with a system message; the result
//! never starts with two system turns that way.
//!
//! Assembly is pure: memory I/O happens before this runs.

use promptline_core::invocation::InvocationSpec;
use promptline_core::message::{Message, Role};

/// Inputs for one assembly.
#[derive(Debug, Default)]
pub struct SequenceInput {
    /// Resolved system template text, if the operation has one.
    pub system_text: Option<String>,
    /// Stored history (empty unless memory was read).
    pub history: Vec<Message>,
    /// Caller-supplied messages; `None` is treated as empty.
    pub dynamic: Option<Vec<Message>>,
    /// Resolved trailing-user template text, if the operation has one.
    pub trailing_user_text: Option<String>,
}

/// The assembled sequence plus bookkeeping for memory write-back.
#[derive(Debug, Clone)]
pub struct AssembledSequence {
    pub messages: Vec<Message>,
    system_added: bool,
    history_len: usize,
}

impl AssembledSequence {
    /// Whether the template system turn was prepended.
    pub fn system_added(&self) -> bool {
        self.system_added
    }

    /// How many leading messages (after the template system turn) came from
    /// memory.
    pub fn history_len(&self) -> usize {
        self.history_len
    }

    /// Messages new to this turn, in order: everything except the replayed
    /// history. This is what gets written back to memory.
    pub fn fresh_messages(&self) -> Vec<Message> {
        let head = usize::from(self.system_added);
        let history_end = head + self.history_len;
        self.messages[..head]
            .iter()
            .chain(self.messages[history_end..].iter())
            .cloned()
            .collect()
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

/// Assemble the outgoing sequence for `spec`.
pub fn assemble(spec: &InvocationSpec, input: SequenceInput) -> AssembledSequence {
    let SequenceInput {
        system_text,
        history,
        dynamic,
        trailing_user_text,
    } = input;

    let dynamic = dynamic.unwrap_or_default();
    let opens_with_system = history
        .first()
        .or_else(|| dynamic.first())
        .is_some_and(|m| m.role() == Role::System);

    let system = if spec.include_system_message && !opens_with_system {
        non_blank(system_text)
    } else {
        None
    };
    let trailing = non_blank(trailing_user_text);

    let mut messages = Vec::with_capacity(
        usize::from(system.is_some()) + history.len() + dynamic.len() + usize::from(trailing.is_some()),
    );

    let system_added = system.is_some();
    if let Some(text) = system {
        messages.push(Message::system(text));
    }

    let history_len = history.len();
    messages.extend(history);
    messages.extend(dynamic);

    if let Some(text) = trailing {
        messages.push(Message::user(text));
    }

    AssembledSequence {
        messages,
        system_added,
        history_len,
    }
}
