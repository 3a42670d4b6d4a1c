//! Turning task-agent output into a typed [`TaskRecord`].
//!
//! Model text is parsed once, then checked field by field; a failure lists
//! every offending field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    Personal,
    Work,
    Shopping,
    Health,
    Other,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 5] = [
        TaskCategory::Personal,
        TaskCategory::Work,
        TaskCategory::Shopping,
        TaskCategory::Health,
        TaskCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Personal => "Personal",
            TaskCategory::Work => "Work",
            TaskCategory::Shopping => "Shopping",
            TaskCategory::Health => "Health",
            TaskCategory::Other => "Other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 3] = [TaskPriority::Low, TaskPriority::Medium, TaskPriority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub key: String,
}

/// The auto-filled task, serialized with the keys the app reads.
///
/// Category and priority stay as the model wrote them; in lenient mode they
/// may fall outside the enumerations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_name: String,
    pub task_description: String,
    pub task_category: String,
    pub task_priority: String,
    pub sub_tasks: Vec<SubTask>,
}

impl TaskRecord {
    pub fn category(&self) -> Option<TaskCategory> {
        TaskCategory::parse(&self.task_category)
    }

    pub fn priority(&self) -> Option<TaskPriority> {
        TaskPriority::parse(&self.task_priority)
    }
}

/// Whether category/priority must come from the documented value sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    Lenient,
    Strict,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(ValidationMode::Lenient),
            "strict" => Ok(ValidationMode::Strict),
            other => Err(format!(
                "unknown validation mode '{}', expected 'lenient' or 'strict'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub problem: FieldProblem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    WrongType { expected: &'static str },
    NotAllowed { value: String },
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            FieldProblem::Missing => write!(f, "{} is missing", self.field),
            FieldProblem::WrongType { expected } => {
                write!(f, "{} must be {}", self.field, expected)
            }
            FieldProblem::NotAllowed { value } => {
                write!(f, "{} has unsupported value '{}'", self.field, value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskParseError {
    #[error("response is not a JSON object: {0}")]
    Malformed(String),
    #[error("response failed validation: {}", join_issues(.0))]
    InvalidFields(Vec<FieldIssue>),
}

impl TaskParseError {
    /// Human-readable problems, one per entry.
    pub fn details(&self) -> Vec<String> {
        match self {
            TaskParseError::Malformed(reason) => vec![reason.clone()],
            TaskParseError::InvalidFields(issues) => issues.iter().map(ToString::to_string).collect(),
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn validate_task_response(
    raw_text: &str,
    mode: ValidationMode,
) -> Result<TaskRecord, TaskParseError> {
    let object = parse_object(raw_text)?;
    let mut issues = Vec::new();

    let task_name = required_string(&object, "taskName", &mut issues);
    let task_description = required_string(&object, "taskDescription", &mut issues);
    let task_category = required_string(&object, "taskCategory", &mut issues);
    let task_priority = required_string(&object, "taskPriority", &mut issues);
    let sub_tasks = required_sub_tasks(&object, &mut issues);

    if mode == ValidationMode::Strict {
        if let Some(category) = &task_category {
            if TaskCategory::parse(category).is_none() {
                issues.push(FieldIssue {
                    field: "taskCategory".to_string(),
                    problem: FieldProblem::NotAllowed {
                        value: category.clone(),
                    },
                });
            }
        }
        if let Some(priority) = &task_priority {
            if TaskPriority::parse(priority).is_none() {
                issues.push(FieldIssue {
                    field: "taskPriority".to_string(),
                    problem: FieldProblem::NotAllowed {
                        value: priority.clone(),
                    },
                });
            }
        }
    }

    match (task_name, task_description, task_category, task_priority, sub_tasks) {
        (Some(task_name), Some(task_description), Some(task_category), Some(task_priority), Some(sub_tasks))
            if issues.is_empty() =>
        {
            Ok(TaskRecord {
                task_name,
                task_description,
                task_category,
                task_priority,
                sub_tasks,
            })
        }
        _ => Err(TaskParseError::InvalidFields(issues)),
    }
}

/// Bare JSON first; failing that, a fenced ```json block, then the outermost braces.
fn parse_object(raw_text: &str) -> Result<Map<String, Value>, TaskParseError> {
    let trimmed = raw_text.trim();
    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(first_error) => match extract_json_candidate(trimmed) {
            Some(candidate) => serde_json::from_str::<Value>(candidate)
                .map_err(|e| TaskParseError::Malformed(e.to_string()))?,
            None => return Err(TaskParseError::Malformed(first_error.to_string())),
        },
    };

    match value {
        Value::Object(object) => Ok(object),
        other => Err(TaskParseError::Malformed(format!(
            "expected an object, found {}",
            json_type_name(&other)
        ))),
    }
}

fn extract_json_candidate(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let after_start = &text[start + 7..];
        if let Some(end) = after_start.find("```") {
            return Some(after_start[..end].trim());
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn required_string(
    object: &Map<String, Value>,
    field: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<String> {
    match object.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => {
            issues.push(FieldIssue {
                field: field.to_string(),
                problem: FieldProblem::Missing,
            });
            None
        }
        Some(_) => {
            issues.push(FieldIssue {
                field: field.to_string(),
                problem: FieldProblem::WrongType {
                    expected: "a string",
                },
            });
            None
        }
    }
}

fn required_sub_tasks(
    object: &Map<String, Value>,
    issues: &mut Vec<FieldIssue>,
) -> Option<Vec<SubTask>> {
    let items = match object.get("subTasks") {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => {
            issues.push(FieldIssue {
                field: "subTasks".to_string(),
                problem: FieldProblem::Missing,
            });
            return None;
        }
        Some(_) => {
            issues.push(FieldIssue {
                field: "subTasks".to_string(),
                problem: FieldProblem::WrongType {
                    expected: "an array",
                },
            });
            return None;
        }
    };

    let before = issues.len();
    let mut sub_tasks = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if !item.is_object() {
            issues.push(FieldIssue {
                field: format!("subTasks[{}]", index),
                problem: FieldProblem::WrongType {
                    expected: "an object",
                },
            });
            continue;
        }
        let field = format!("subTasks[{}].key", index);
        match item.get("key") {
            Some(Value::String(key)) => sub_tasks.push(SubTask { key: key.clone() }),
            None | Some(Value::Null) => issues.push(FieldIssue {
                field,
                problem: FieldProblem::Missing,
            }),
            Some(_) => issues.push(FieldIssue {
                field,
                problem: FieldProblem::WrongType {
                    expected: "a string",
                },
            }),
        }
    }

    (issues.len() == before).then_some(sub_tasks)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
