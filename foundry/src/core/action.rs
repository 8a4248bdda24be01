//! Normalization of generator-emitted file-system actions.
//!
//! Generators describe the same action in several shapes:
//!
//! - `{"command": "create_file", "args": {...}}`
//! - `{"action": "create_file", "parameters": {...}}`
//! - `{"create_file": {...}}`
//!
//! [`normalize`] reduces all of them to a canonical [`NormalizedAction`];
//! [`Action::try_from`] then turns that pair into the closed [`Action`] union.
//! Anything unrecognized yields `None` so callers can skip and log it.

use serde_json::{Map, Value};
use thiserror::Error;

/// The closed set of action kinds agents may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionCommand {
    CreateDirectory,
    CreateFile,
    AppendToFile,
    ExecuteShell,
}

impl ActionCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionCommand::CreateDirectory => "create_directory",
            ActionCommand::CreateFile => "create_file",
            ActionCommand::AppendToFile => "append_to_file",
            ActionCommand::ExecuteShell => "execute_shell",
        }
    }

    /// Parse a command name, ignoring case and `-`/space separators.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "create_directory" | "create_dir" | "mkdir" => Some(ActionCommand::CreateDirectory),
            "create_file" | "write_file" => Some(ActionCommand::CreateFile),
            "append_to_file" | "append_file" => Some(ActionCommand::AppendToFile),
            "execute_shell" | "execute_command" | "run_command" | "shell" => {
                Some(ActionCommand::ExecuteShell)
            }
            _ => None,
        }
    }
}

/// Canonical `(command, args)` pair. Argument keys are lowercased.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAction {
    pub command: ActionCommand,
    pub args: Map<String, Value>,
}

const COMMAND_KEYS: &[&str] = &["command", "action"];
const ARGS_KEYS: &[&str] = &["args", "parameters"];
const COMMAND_LINE_KEY: &str = "command_line";
const COMMAND_LINE_SYNONYMS: &[&str] = &["command", "cmd", "shell_command", "command_string", "script"];

/// Reduce any accepted action shape to its canonical pair.
pub fn normalize(raw: &Value) -> Option<NormalizedAction> {
    let object = raw.as_object()?;
    let (command, args) = parse_explicit(object).or_else(|| parse_single_key(object))?;
    Some(finish(command, args))
}

/// `{command|action: name, args|parameters: {...}}`
fn parse_explicit(object: &Map<String, Value>) -> Option<(ActionCommand, &Map<String, Value>)> {
    let name = find_key(object, COMMAND_KEYS)?.as_str()?;
    let command = ActionCommand::parse(name)?;
    let args = find_key(object, ARGS_KEYS)?.as_object()?;
    Some((command, args))
}

/// `{name: {...}}`
fn parse_single_key(object: &Map<String, Value>) -> Option<(ActionCommand, &Map<String, Value>)> {
    if object.len() != 1 {
        return None;
    }
    let (name, args) = object.iter().next()?;
    let command = ActionCommand::parse(name)?;
    Some((command, args.as_object()?))
}

fn find_key<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn finish(command: ActionCommand, args: &Map<String, Value>) -> NormalizedAction {
    let mut args: Map<String, Value> = args
        .iter()
        .map(|(key, value)| (key.to_lowercase(), value.clone()))
        .collect();

    if command == ActionCommand::ExecuteShell && !args.contains_key(COMMAND_LINE_KEY) {
        let synonym = COMMAND_LINE_SYNONYMS
            .iter()
            .find(|key| args.contains_key(**key))
            .map(|key| key.to_string());
        let recovered = match synonym {
            Some(key) => args.remove(&key),
            None if args.len() == 1 => {
                let sole = args.keys().next().cloned();
                sole.and_then(|key| args.remove(&key))
            }
            None => None,
        };
        if let Some(value) = recovered {
            args.insert(COMMAND_LINE_KEY.to_string(), value);
        }
    }

    NormalizedAction { command, args }
}

/// Typed action ready to be applied under a project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateDirectory { path: String },
    CreateFile { path: String, content: String },
    AppendToFile { path: String, content: String },
    ExecuteShell { command_line: String },
}

/// Why a normalized action could not become a typed [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("{command} is missing required argument '{key}'")]
    MissingArgument { command: &'static str, key: &'static str },
    #[error("{command} argument '{key}' must be a string")]
    NotAString { command: &'static str, key: &'static str },
}

impl TryFrom<NormalizedAction> for Action {
    type Error = ActionError;

    fn try_from(action: NormalizedAction) -> Result<Self, Self::Error> {
        let command = action.command.as_str();
        let args = &action.args;
        match action.command {
            ActionCommand::CreateDirectory => Ok(Action::CreateDirectory {
                path: required(args, command, "path")?,
            }),
            ActionCommand::CreateFile => Ok(Action::CreateFile {
                path: required(args, command, "path")?,
                content: content(args, command)?,
            }),
            ActionCommand::AppendToFile => Ok(Action::AppendToFile {
                path: required(args, command, "path")?,
                content: content(args, command)?,
            }),
            ActionCommand::ExecuteShell => Ok(Action::ExecuteShell {
                command_line: required(args, command, COMMAND_LINE_KEY)?,
            }),
        }
    }
}

fn required(
    args: &Map<String, Value>,
    command: &'static str,
    key: &'static str,
) -> Result<String, ActionError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(ActionError::MissingArgument { command, key }),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(ActionError::NotAString { command, key }),
    }
}

fn content(args: &Map<String, Value>, command: &'static str) -> Result<String, ActionError> {
    for key in ["content", "contents"] {
        match args.get(key) {
            Some(Value::String(value)) => return Ok(value.clone()),
            Some(Value::Null) | None => {}
            Some(_) => return Err(ActionError::NotAString { command, key }),
        }
    }
    Ok(String::new())
}

/// Extract the list of raw actions from a generator reply document.
///
/// Accepts a JSON array, an object with an `actions` array, or a single action
/// object.
pub fn action_list(document: &Value) -> Option<Vec<Value>> {
    match document {
        Value::Array(items) => Some(items.clone()),
        Value::Object(object) => match find_key(object, &["actions"]) {
            Some(Value::Array(items)) => Some(items.clone()),
            Some(_) => None,
            None => Some(vec![document.clone()]),
        },
        _ => None,
    }
}
