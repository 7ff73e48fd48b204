//! # Promptline Service
//!
//! The invocation pipeline: registered operations turn caller input,
//! templates and conversation memory into one ordered message sequence,
//! check its role order, and send it to the model backend under a retry
//! policy. A token estimator reuses the same backend through zero-output
//! probes.

pub mod dispatcher;
pub mod estimator;
pub mod sequence;
pub mod service;
pub mod template;
pub mod validator;

pub use dispatcher::Dispatcher;
pub use estimator::{EstimationTarget, TokenCountEstimator};
pub use sequence::{AssembledSequence, SequenceInput};
pub use service::{AiService, InvocationArgs, PreparedInvocation};
pub use template::{PromptTemplate, TemplateResolver};
pub use validator::validate;
