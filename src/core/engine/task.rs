//! Task nodes and the doubly linked task list.
//!
//! Nodes live in an arena owned by the list; `next`/`previous` links are arena
//! indices. Nodes are immutable once added. Execution state (input, output,
//! logs) is recorded separately by the executor, indexed by position.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One pipeline step as declared in the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub command: String,
    /// Raw task value: a description string, or a list whose first element is
    /// `{name: ...}` followed by parameter mappings.
    pub task: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub keyword_params: Map<String, Value>,
}

impl TaskNode {
    pub fn new(command: &str, description: &str) -> Self {
        Self {
            command: command.trim().to_uppercase(),
            task: Value::String(description.trim().to_string()),
            keyword_params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.keyword_params.insert(key.to_string(), value);
        self
    }

    /// The human-readable description, unwrapping the structured form.
    pub fn task_description(&self) -> String {
        match &self.task {
            Value::String(s) => s.clone(),
            Value::Array(items) => match items.first() {
                Some(Value::Object(first)) => first
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// One decoded entry of a job's task list.
#[derive(Debug, Clone)]
pub enum TaskEntry {
    Node(TaskNode),
    /// `"COMMAND:description"`
    Text(String),
    /// `{COMMAND: description}` or `{COMMAND: [{name: ...}, {key: value}]}`
    Mapping(Map<String, Value>),
}

impl From<TaskNode> for TaskEntry {
    fn from(node: TaskNode) -> Self {
        TaskEntry::Node(node)
    }
}

impl From<&str> for TaskEntry {
    fn from(text: &str) -> Self {
        TaskEntry::Text(text.to_string())
    }
}

impl TaskEntry {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(TaskEntry::Text(s)),
            Value::Object(map) => Ok(TaskEntry::Mapping(map)),
            other => Err(Error::job_invalid_task(
                other.to_string(),
                "expected a \"COMMAND:description\" string or a {COMMAND: description} mapping",
            )),
        }
    }

    fn into_node(self) -> Result<TaskNode> {
        match self {
            TaskEntry::Node(mut node) => {
                node.command = node.command.trim().to_uppercase();
                if node.command.is_empty() {
                    return Err(Error::job_invalid_task(
                        node.task_description(),
                        "command is empty",
                    ));
                }
                Ok(node)
            }
            TaskEntry::Text(text) => {
                let (command, description) = text.split_once(':').ok_or_else(|| {
                    Error::job_invalid_task(text.clone(), "missing ':' between command and description")
                })?;
                if command.trim().is_empty() {
                    return Err(Error::job_invalid_task(text.clone(), "command is empty"));
                }
                Ok(TaskNode::new(command, description))
            }
            TaskEntry::Mapping(map) => {
                let mut entries = map.into_iter();
                let (command, task) = entries.next().ok_or_else(|| {
                    Error::job_invalid_task("{}", "mapping has no command key")
                })?;
                if command.trim().is_empty() {
                    return Err(Error::job_invalid_task(task.to_string(), "command is empty"));
                }
                let task = match task {
                    Value::String(s) => Value::String(s.trim().to_string()),
                    other => other,
                };
                Ok(TaskNode {
                    command: command.trim().to_uppercase(),
                    task,
                    keyword_params: entries.collect(),
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node: TaskNode,
    next: Option<usize>,
    previous: Option<usize>,
}

/// Append-only doubly linked list of task nodes.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    slots: Vec<Slot>,
    head: Option<usize>,
    tail: Option<usize>,
    status: bool,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaskEntry>,
    {
        let mut list = Self::new();
        for entry in entries {
            list.add_task(entry)?;
        }
        Ok(list)
    }

    /// Append a node built from `entry`. Returns its position.
    pub fn add_task(&mut self, entry: impl Into<TaskEntry>) -> Result<usize> {
        let node = entry.into().into_node()?;
        let position = self.slots.len();
        self.slots.push(Slot {
            node,
            next: None,
            previous: self.tail,
        });

        match self.tail {
            Some(tail) => self.slots[tail].next = Some(position),
            None => self.head = Some(position),
        }
        self.tail = Some(position);
        Ok(position)
    }

    /// Node count, by walking from the head.
    pub fn length(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head;
        while let Some(position) = cursor {
            count += 1;
            cursor = self.slots[position].next;
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    pub fn get(&self, position: usize) -> Option<&TaskNode> {
        self.slots.get(position).map(|slot| &slot.node)
    }

    pub fn next(&self, position: usize) -> Option<usize> {
        self.slots.get(position).and_then(|slot| slot.next)
    }

    pub fn previous(&self, position: usize) -> Option<usize> {
        self.slots.get(position).and_then(|slot| slot.previous)
    }

    /// Positions of every node whose command matches, case-insensitively.
    pub fn search_tasks_for_cmd(&self, command: &str) -> Vec<usize> {
        let wanted = command.trim().to_uppercase();
        self.iter()
            .filter(|(_, node)| node.command == wanted)
            .map(|(position, _)| position)
            .collect()
    }

    /// Head-to-tail traversal.
    pub fn iter(&self) -> TaskIter<'_> {
        TaskIter {
            list: self,
            cursor: self.head,
        }
    }

    /// Whether the most recently executed node produced a non-empty output.
    pub fn status(&self) -> bool {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: bool) {
        self.status = status;
    }
}

pub struct TaskIter<'a> {
    list: &'a TaskList,
    cursor: Option<usize>,
}

impl<'a> Iterator for TaskIter<'a> {
    type Item = (usize, &'a TaskNode);

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.cursor?;
        let slot = &self.list.slots[position];
        self.cursor = slot.next;
        Some((position, &slot.node))
    }
}
