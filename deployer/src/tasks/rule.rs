//! `if`/`then` rules of rule based tasks
//!
//! A rule is a YAML mapping:
//!
//! ```yaml
//! if:
//!   changelist_match: '\.scss$'
//! then:
//!   exec:
//!     - 'cd {$repo_dir} && npm run build'
//!   upload:
//!     - public/css/
//! ```

use regex::Regex;
use serde_yaml::Value;
use tracing::warn;

use crate::errors::DeployError;
use crate::models::changeset::Changeset;

/// Placeholder in `exec` commands replaced by the working copy path
pub const REPO_DIR_PLACEHOLDER: &str = "{$repo_dir}";

/// A condition of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A changed path matches the regular expression
    ChangelistMatch(String),

    /// Condition kind this version does not know
    Unknown(String),
}

impl Condition {
    fn parse(kind: &str, arguments: &Value) -> Result<Self, DeployError> {
        match kind {
            "changelist_match" => match arguments {
                Value::String(pattern) => Ok(Condition::ChangelistMatch(pattern.clone())),
                _ => Err(DeployError::ConfigError(
                    "changelist_match expects a pattern".to_string(),
                )),
            },
            other => Ok(Condition::Unknown(other.to_string())),
        }
    }

    /// Evaluate against the current changeset
    pub fn matches(&self, changeset: &Changeset) -> bool {
        match self {
            Condition::ChangelistMatch(pattern) => changelist_match(pattern, changeset),
            Condition::Unknown(kind) => {
                warn!("Unknown condition type in task: {}", kind);
                false
            }
        }
    }
}

/// An action run when the conditions of a rule match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consequent {
    /// Local shell commands
    Exec(Vec<String>),

    /// Extra repository paths to upload
    Upload(Vec<String>),

    /// Action kind this version does not know
    Unknown(String),
}

impl Consequent {
    fn parse(kind: &str, arguments: &Value) -> Result<Self, DeployError> {
        match kind {
            "exec" => Ok(Consequent::Exec(string_list(kind, arguments)?)),
            "upload" => Ok(Consequent::Upload(string_list(kind, arguments)?)),
            other => Ok(Consequent::Unknown(other.to_string())),
        }
    }
}

/// A parsed rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRule {
    pub conditions: Vec<Condition>,
    pub consequents: Vec<Consequent>,
}

impl TaskRule {
    /// Parse the YAML `arguments` of a task.
    ///
    /// Both `if` and `then` have to be present; an empty (or null) block is
    /// allowed. Order of the entries is kept.
    pub fn parse(source: &str) -> Result<Self, DeployError> {
        let value: Value = serde_yaml::from_str(source)?;
        let Value::Mapping(root) = value else {
            return Err(DeployError::ConfigError(
                "task arguments must be a mapping".to_string(),
            ));
        };

        let conditions = root
            .get("if")
            .ok_or_else(|| DeployError::ConfigError("missing `if` block".to_string()))?;
        let consequents = root
            .get("then")
            .ok_or_else(|| DeployError::ConfigError("missing `then` block".to_string()))?;

        Ok(Self {
            conditions: entries("if", conditions)?
                .into_iter()
                .map(|(kind, args)| Condition::parse(&kind, args))
                .collect::<Result<_, _>>()?,
            consequents: entries("then", consequents)?
                .into_iter()
                .map(|(kind, args)| Consequent::parse(&kind, args))
                .collect::<Result<_, _>>()?,
        })
    }

    /// All conditions hold. A rule without conditions always matches.
    pub fn conditions_match(&self, changeset: &Changeset) -> bool {
        self.conditions.iter().all(|c| c.matches(changeset))
    }
}

/// True if `pattern` matches any uploaded or deleted path
pub fn changelist_match(pattern: &str, changeset: &Changeset) -> bool {
    if changeset.is_empty() {
        return false;
    }
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            warn!("Invalid changelist_match pattern {}: {}", pattern, e);
            return false;
        }
    };
    changeset.paths().any(|path| regex.is_match(path))
}

fn entries<'a>(block: &str, value: &'a Value) -> Result<Vec<(String, &'a Value)>, DeployError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) if items.is_empty() => Ok(Vec::new()),
        Value::Mapping(map) => map
            .iter()
            .map(|(key, args)| match key {
                Value::String(kind) => Ok((kind.clone(), args)),
                _ => Err(DeployError::ConfigError(format!(
                    "`{}` keys must be strings",
                    block
                ))),
            })
            .collect(),
        _ => Err(DeployError::ConfigError(format!(
            "`{}` must be a mapping",
            block
        ))),
    }
}

fn string_list(kind: &str, value: &Value) -> Result<Vec<String>, DeployError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(single) => Ok(vec![single.clone()]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(DeployError::ConfigError(format!(
                    "`{}` expects a list of strings",
                    kind
                ))),
            })
            .collect(),
        _ => Err(DeployError::ConfigError(format!(
            "`{}` expects a list of strings",
            kind
        ))),
    }
}
