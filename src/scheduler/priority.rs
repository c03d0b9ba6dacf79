//! Priority classes and the table of named levels.

use crate::error::{Error, Result};
use std::fmt;

/// Priority class of a task, expressed as a weight.
///
/// Lower weights are more urgent: `Priority::new(1) < Priority::new(3)` and
/// the queue dispatches the smaller one first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u32);

impl Priority {
    pub const fn new(weight: u32) -> Self {
        Priority(weight)
    }

    pub const fn weight(self) -> u32 {
        self.0
    }

    /// Returns true if `self` is dispatched before `other`.
    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Priority {
    fn from(weight: u32) -> Self {
        Priority(weight)
    }
}

/// Built-in task classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum TaskType {
    Computational = 1,
    Io = 2,
    Other = 3,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::Computational, TaskType::Io, TaskType::Other];

    pub fn priority(self) -> Priority {
        Priority(self as u32)
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskType::Computational => "computational",
            TaskType::Io => "io",
            TaskType::Other => "other",
        }
    }
}

impl Default for TaskType {
    fn default() -> Self {
        TaskType::Other
    }
}

impl From<TaskType> for Priority {
    fn from(task_type: TaskType) -> Self {
        task_type.priority()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityLevel {
    pub name: String,
    pub priority: Priority,
}

/// Ordered, finite set of named priority classes.
///
/// Levels are kept sorted most-urgent-first. Names and weights are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityLevels {
    levels: Vec<PriorityLevel>,
}

impl PriorityLevels {
    pub fn new<I, S>(levels: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut levels: Vec<PriorityLevel> = levels
            .into_iter()
            .map(|(name, weight)| PriorityLevel {
                name: name.into(),
                priority: Priority(weight),
            })
            .collect();

        if levels.is_empty() {
            return Err(Error::config("priority table must have at least one level"));
        }

        levels.sort_by_key(|l| l.priority);

        for pair in levels.windows(2) {
            if pair[0].priority == pair[1].priority {
                return Err(Error::config(format!(
                    "duplicate priority weight {}",
                    pair[0].priority
                )));
            }
        }
        for (i, level) in levels.iter().enumerate() {
            if levels[i + 1..].iter().any(|l| l.name == level.name) {
                return Err(Error::config(format!(
                    "duplicate priority name {:?}",
                    level.name
                )));
            }
        }

        Ok(Self { levels })
    }

    /// Class used when a submission carries no priority.
    pub fn lowest_urgency(&self) -> Priority {
        self.levels[self.levels.len() - 1].priority
    }

    pub fn most_urgent(&self) -> Priority {
        self.levels[0].priority
    }

    pub fn contains(&self, priority: Priority) -> bool {
        self.levels
            .binary_search_by_key(&priority, |l| l.priority)
            .is_ok()
    }

    pub fn by_name(&self, name: &str) -> Option<Priority> {
        self.levels
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .map(|l| l.priority)
    }

    pub fn name_of(&self, priority: Priority) -> Option<&str> {
        self.levels
            .binary_search_by_key(&priority, |l| l.priority)
            .ok()
            .map(|idx| self.levels[idx].name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriorityLevel> {
        self.levels.iter()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl Default for PriorityLevels {
    fn default() -> Self {
        Self {
            levels: TaskType::ALL
                .iter()
                .map(|t| PriorityLevel {
                    name: t.name().to_string(),
                    priority: t.priority(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskType::Computational.priority() < TaskType::Io.priority());
        assert!(TaskType::Io.priority() < TaskType::Other.priority());
        assert!(Priority::new(0).is_more_urgent_than(Priority::new(1)));
        assert!(!Priority::new(2).is_more_urgent_than(Priority::new(2)));
    }

    #[test]
    fn test_default_levels() {
        let levels = PriorityLevels::default();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels.most_urgent(), Priority::new(1));
        assert_eq!(levels.lowest_urgency(), TaskType::Other.priority());
        assert_eq!(levels.by_name("IO"), Some(Priority::new(2)));
        assert_eq!(levels.name_of(Priority::new(1)), Some("computational"));
        assert!(!levels.contains(Priority::new(7)));
    }

    #[test]
    fn test_custom_levels_sorted() {
        let levels =
            PriorityLevels::new([("background", 40), ("realtime", 0), ("normal", 20)]).unwrap();
        let names: Vec<_> = levels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["realtime", "normal", "background"]);
        assert_eq!(levels.lowest_urgency(), Priority::new(40));
    }

    #[test]
    fn test_invalid_levels() {
        assert!(PriorityLevels::new(Vec::<(String, u32)>::new()).is_err());
        assert!(PriorityLevels::new([("a", 1), ("b", 1)]).is_err());
        assert!(PriorityLevels::new([("a", 1), ("a", 2)]).is_err());
    }
}
