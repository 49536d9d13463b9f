//! Free-text plan parsing.
//!
//! The orchestrating agent replies with a plan in a line-oriented
//! grammar, treated here as a versioned wire contract:
//!
//! ```text
//! Task <N>: @<agent> - <description>[ (depends on Task <i>[, Task <j>...])]
//! ```
//!
//! Parsing is a pure function from text to an ordered task-spec list.
//! It tolerates surrounding prose, extra whitespace, and markdown
//! decoration, but fails fast on duplicate or non-sequential task
//! numbers, a missing `@agent` token, or a dependency reference to a
//! task number that never appears in the text. No partial plans are
//! ever returned.

use regex::Regex;

use crate::error::{Error, Result};

/// One parsed task line, before ids are generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// 1-based task number as written in the plan.
    pub local_index: usize,
    /// Instruction text for the assigned agent.
    pub description: String,
    /// Agent name without the `@` prefix, lowercased.
    pub agent: String,
    /// 1-based task numbers this task depends on.
    pub depends_on_local: Vec<usize>,
}

/// Parse a plan text into an ordered list of task specs.
pub fn parse_plan(text: &str) -> Result<Vec<TaskSpec>> {
    let task_line = Regex::new(r"(?i)^task\s+(\d+)\s*:\s*(.*)$").expect("static regex");
    let agent_prefix =
        Regex::new(r"^@([A-Za-z][A-Za-z0-9_-]*)\s*-\s*(.*)$").expect("static regex");
    let depends_suffix =
        Regex::new(r"(?i)\(\s*depends\s+on\s+([^)]*)\)\s*$").expect("static regex");
    let dep_number = Regex::new(r"(?i)task\s+(\d+)").expect("static regex");

    let mut specs: Vec<TaskSpec> = Vec::new();

    for raw_line in text.lines() {
        let line = strip_markdown(raw_line.trim());
        let Some(caps) = task_line.captures(&line) else {
            // Prose and blank lines around the plan are fine.
            continue;
        };

        let number: usize = caps[1]
            .parse()
            .map_err(|_| Error::PlanParse(format!("unreadable task number in line: {}", line)))?;
        let rest = caps[2].trim();

        let Some(agent_caps) = agent_prefix.captures(rest) else {
            return Err(Error::PlanParse(format!(
                "Task {}: missing @agent assignment",
                number
            )));
        };
        let agent = agent_caps[1].to_lowercase();
        let mut description = agent_caps[2].trim().to_string();

        let mut depends_on_local = Vec::new();
        if let Some(dep_caps) = depends_suffix.captures(&description) {
            let dep_text = dep_caps[1].to_string();
            for num in dep_number.captures_iter(&dep_text) {
                let dep: usize = num[1].parse().map_err(|_| {
                    Error::PlanParse(format!("Task {}: unreadable dependency number", number))
                })?;
                depends_on_local.push(dep);
            }
            if depends_on_local.is_empty() {
                return Err(Error::PlanParse(format!(
                    "Task {}: dependency clause names no tasks: ({})",
                    number, dep_text
                )));
            }
            description = depends_suffix.replace(&description, "").trim_end().to_string();
        }

        if description.is_empty() {
            return Err(Error::PlanParse(format!(
                "Task {}: empty description",
                number
            )));
        }

        specs.push(TaskSpec {
            local_index: number,
            description,
            agent,
            depends_on_local,
        });
    }

    if specs.is_empty() {
        return Err(Error::PlanParse("no task lines found in plan".to_string()));
    }

    // Task numbers must be exactly 1..=N in declaration order.
    for (i, spec) in specs.iter().enumerate() {
        let expected = i + 1;
        if spec.local_index != expected {
            return Err(Error::PlanParse(format!(
                "task numbers must be sequential: expected Task {}, found Task {}",
                expected, spec.local_index
            )));
        }
    }

    // Every dependency must name a task defined somewhere in this plan.
    // Cycles (including forward references that loop back) are left to
    // the graph validator.
    let total = specs.len();
    for spec in &specs {
        for &dep in &spec.depends_on_local {
            if dep == 0 || dep > total {
                return Err(Error::PlanParse(format!(
                    "Task {}: depends on unknown Task {}",
                    spec.local_index, dep
                )));
            }
        }
    }

    Ok(specs)
}

/// Strip markdown decoration from a single plan line.
///
/// Orchestrating agents habitually bold task headers or wrap plans in
/// lists even when told not to. Underscore emphasis is deliberately
/// left alone so snake_case identifiers and file paths survive.
fn strip_markdown(line: &str) -> String {
    static DECORATIONS: std::sync::OnceLock<[(Regex, &str); 7]> = std::sync::OnceLock::new();
    let decorations = DECORATIONS.get_or_init(|| {
        [
            (Regex::new(r"`([^`]+)`").expect("static regex"), "$1"),
            (Regex::new(r"\*\*([^*]+)\*\*").expect("static regex"), "$1"),
            (Regex::new(r"~~([^~]+)~~").expect("static regex"), "$1"),
            (Regex::new(r"\*([^*]+)\*").expect("static regex"), "$1"),
            (Regex::new(r"^#{1,6}\s+").expect("static regex"), ""),
            (Regex::new(r"^>\s*").expect("static regex"), ""),
            (
                Regex::new(r"^\s*(?:[-*+]|\d+\.)\s+").expect("static regex"),
                "",
            ),
        ]
    });

    let mut line = line.replace("```", "");
    for (pattern, replacement) in decorations {
        line = pattern.replace_all(&line, *replacement).into_owned();
    }
    line.trim().to_string()
}
