//! Handler table - typed automation handlers registered by action id
//!
//! A handler declares the shape of its parameters as a serde type. The table
//! erases that type so the executor can bind a rule's `params` map by name
//! and, when binding fails, call the handler with no parameters at all.

use crate::automation::{Automation, AutomationError};
use crate::registry::Params;
use crate::speech::Speech;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::marker::PhantomData;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("missing parameter '{0}'")]
    MissingParameter(&'static str),
    #[error(transparent)]
    Automation(#[from] AutomationError),
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("parameters do not fit the handler: {0}")]
    Binding(#[source] serde_json::Error),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

pub trait Handler: Send + Sync {
    /// Named parameters this handler accepts
    type Args: DeserializeOwned;

    /// `None` when invoked without parameters
    fn run(&self, args: Option<Self::Args>) -> Result<(), HandlerError>;
}

/// Object-safe view of a `Handler`
pub trait DynHandler: Send + Sync {
    /// Bind `params` and run. Binding happens before the handler is called,
    /// so a `Binding` error means nothing ran.
    fn invoke(&self, params: Option<&Params>) -> Result<(), InvokeError>;
}

impl<H: Handler> DynHandler for H {
    fn invoke(&self, params: Option<&Params>) -> Result<(), InvokeError> {
        let args = params
            .map(|p| serde_json::from_value::<H::Args>(Value::Object(p.clone())))
            .transpose()
            .map_err(InvokeError::Binding)?;
        Ok(self.run(args)?)
    }
}

/// Handler backed by a closure
pub struct FnHandler<A, F> {
    f: F,
    _args: PhantomData<fn() -> A>,
}

pub fn from_fn<A, F>(f: F) -> FnHandler<A, F>
where
    A: DeserializeOwned,
    F: Fn(Option<A>) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler {
        f,
        _args: PhantomData,
    }
}

impl<A, F> Handler for FnHandler<A, F>
where
    A: DeserializeOwned,
    F: Fn(Option<A>) -> Result<(), HandlerError> + Send + Sync,
{
    type Args = A;

    fn run(&self, args: Option<A>) -> Result<(), HandlerError> {
        (self.f)(args)
    }
}

// ============================================================================
// Built-in actions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    SayText,
    OpenProgram,
    OpenUrl,
    TypeText,
    MovePointer,
}

impl Builtin {
    pub const ALL: [Builtin; 5] = [
        Builtin::SayText,
        Builtin::OpenProgram,
        Builtin::OpenUrl,
        Builtin::TypeText,
        Builtin::MovePointer,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Builtin::SayText => "say_text",
            Builtin::OpenProgram => "open_program",
            Builtin::OpenUrl => "open_url",
            Builtin::TypeText => "type_text",
            Builtin::MovePointer => "move_pointer",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.id() == id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextArgs {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramArgs {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UrlArgs {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointArgs {
    pub x: i32,
    pub y: i32,
}

pub struct SayText {
    speech: Speech,
}

impl Handler for SayText {
    type Args = TextArgs;

    fn run(&self, args: Option<TextArgs>) -> Result<(), HandlerError> {
        let args = args.ok_or(HandlerError::MissingParameter("text"))?;
        self.speech.say(args.text);
        Ok(())
    }
}

pub struct OpenProgram;

impl Handler for OpenProgram {
    type Args = ProgramArgs;

    fn run(&self, args: Option<ProgramArgs>) -> Result<(), HandlerError> {
        let args = args.ok_or(HandlerError::MissingParameter("program"))?;
        let child = Command::new(&args.program)
            .args(&args.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| HandlerError::Launch {
                program: args.program.clone(),
                source,
            })?;
        tracing::info!("Launched {} (pid {})", args.program, child.id());
        if let Err(e) = reap(child) {
            tracing::warn!("Cannot watch {}: {}", args.program, e);
        }
        Ok(())
    }
}

/// Wait for a launched program on a detached thread so it is not left
/// behind as a zombie
fn reap(mut child: Child) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
    let pid = child.id();
    thread::Builder::new()
        .name(format!("reap-{}", pid))
        .spawn(move || {
            let status = child.wait();
            tracing::debug!("Program {} exited: {:?}", pid, status);
            status
        })
}

pub struct OpenUrl;

impl Handler for OpenUrl {
    type Args = UrlArgs;

    fn run(&self, args: Option<UrlArgs>) -> Result<(), HandlerError> {
        let args = args.ok_or(HandlerError::MissingParameter("url"))?;
        open::that(&args.url).map_err(|source| HandlerError::Open {
            target: args.url.clone(),
            source,
        })
    }
}

pub struct TypeText {
    automation: Arc<dyn Automation>,
}

impl Handler for TypeText {
    type Args = TextArgs;

    fn run(&self, args: Option<TextArgs>) -> Result<(), HandlerError> {
        let args = args.ok_or(HandlerError::MissingParameter("text"))?;
        Ok(self.automation.type_text(&args.text)?)
    }
}

pub struct MovePointer {
    automation: Arc<dyn Automation>,
}

impl Handler for MovePointer {
    type Args = PointArgs;

    fn run(&self, args: Option<PointArgs>) -> Result<(), HandlerError> {
        let args = args.ok_or(HandlerError::MissingParameter("x"))?;
        Ok(self.automation.move_pointer(args.x, args.y)?)
    }
}

// ============================================================================
// Table
// ============================================================================

/// Action id -> handler, built once at startup
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Box<dyn DynHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins(speech: Speech, automation: Arc<dyn Automation>) -> Self {
        let mut table = Self::new();
        for builtin in Builtin::ALL {
            table.register_builtin(builtin, &speech, &automation);
        }
        table
    }

    pub fn register_builtin(
        &mut self,
        builtin: Builtin,
        speech: &Speech,
        automation: &Arc<dyn Automation>,
    ) -> &mut Self {
        match builtin {
            Builtin::SayText => self.register(
                builtin.id(),
                SayText {
                    speech: speech.clone(),
                },
            ),
            Builtin::OpenProgram => self.register(builtin.id(), OpenProgram),
            Builtin::OpenUrl => self.register(builtin.id(), OpenUrl),
            Builtin::TypeText => self.register(
                builtin.id(),
                TypeText {
                    automation: Arc::clone(automation),
                },
            ),
            Builtin::MovePointer => self.register(
                builtin.id(),
                MovePointer {
                    automation: Arc::clone(automation),
                },
            ),
        }
    }

    /// Register or replace the handler for `id`
    pub fn register(&mut self, id: impl Into<String>, handler: impl Handler + 'static) -> &mut Self {
        let id = id.into();
        if self.handlers.insert(id.clone(), Box::new(handler)).is_some() {
            tracing::debug!("Replaced handler '{}'", id);
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&dyn DynHandler> {
        self.handlers.get(id).map(|h| h.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
