//! Executor - runs a matched action through the handler table
//!
//! Parameters are bound by name. If a rule's params do not fit its handler
//! (extra, missing or mistyped), the handler is called again with no
//! parameters. That fallback hides configuration mistakes, so every use of
//! it is logged as a warning, and `strict_params` turns it off.

use crate::handlers::{HandlerError, HandlerTable, InvokeError};
use crate::registry::ActionDefinition;
use crate::speech::Speech;

pub const UNKNOWN_ACTION_MESSAGE: &str = "I don't know how to perform this action.";
pub const FAILED_MESSAGE: &str = "That action failed.";
pub const REJECTED_MESSAGE: &str = "That command's settings don't fit its action.";

#[derive(Debug)]
pub enum Execution {
    /// Ran with its params bound by name
    Completed,
    /// Params did not fit; ran with no parameters instead
    FellBack { reason: String },
    /// Params did not fit and strict mode refused to run it
    Rejected { reason: String },
    /// No handler registered for the action id
    UnknownAction,
    Failed(HandlerError),
}

impl Execution {
    pub fn handler_ran(&self) -> bool {
        matches!(self, Execution::Completed | Execution::FellBack { .. } | Execution::Failed(_))
    }
}

pub struct Executor {
    handlers: HandlerTable,
    speech: Speech,
    strict_params: bool,
}

impl Executor {
    pub fn new(handlers: HandlerTable, speech: Speech) -> Self {
        Self {
            handlers,
            speech,
            strict_params: false,
        }
    }

    pub fn with_strict_params(mut self, strict: bool) -> Self {
        self.strict_params = strict;
        self
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn execute(&self, def: &ActionDefinition) -> Execution {
        let Some(handler) = self.handlers.get(&def.action) else {
            tracing::warn!("Command '{}': no handler for action '{}'", def.name, def.action);
            self.speech.say(UNKNOWN_ACTION_MESSAGE);
            return Execution::UnknownAction;
        };

        let reason = match handler.invoke(Some(&def.params)) {
            Ok(()) => {
                tracing::info!("Command '{}' ran '{}'", def.name, def.action);
                return Execution::Completed;
            }
            Err(InvokeError::Handler(e)) => return self.failed(def, e),
            Err(InvokeError::Binding(e)) => e.to_string(),
        };

        if self.strict_params {
            tracing::warn!(
                "Command '{}': params do not fit '{}' ({}); not running",
                def.name,
                def.action,
                reason
            );
            self.speech.say(REJECTED_MESSAGE);
            return Execution::Rejected { reason };
        }

        tracing::warn!(
            "Command '{}': params do not fit '{}' ({}); running without parameters",
            def.name,
            def.action,
            reason
        );
        match handler.invoke(None) {
            Ok(()) => Execution::FellBack { reason },
            Err(InvokeError::Handler(e)) => self.failed(def, e),
            Err(InvokeError::Binding(e)) => self.failed(def, HandlerError::Other(e.to_string())),
        }
    }

    fn failed(&self, def: &ActionDefinition, error: HandlerError) -> Execution {
        tracing::error!("Command '{}' failed: {}", def.name, error);
        self.speech.say(FAILED_MESSAGE);
        Execution::Failed(error)
    }
}
