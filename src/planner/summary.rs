//! Per-resource change summary.

use std::fmt::Write as _;

use colored::Colorize;

use crate::cloudformation::{ChangeAction, ResourceChange};

/// Describes one resource change in a single line.
#[must_use]
pub fn describe_change(change: &ResourceChange) -> String {
    let subject = format!("{} ({})", change.resource_type, change.logical_id);

    match change.action {
        ChangeAction::Add => format!("{subject} will be added"),
        ChangeAction::Remove => format!("{subject} will be deleted"),
        ChangeAction::Modify => {
            let mut line = format!("{subject} will be modified ");
            if change.replacement_required {
                line.push_str("by deletion and recreation ");
            }
            if !change.scopes.is_empty() {
                let causes: Vec<String> = change
                    .scopes
                    .iter()
                    .map(|scope| match change.causing_entities.get(scope) {
                        Some(entities) if !entities.is_empty() => {
                            format!("{scope} ({})", entities.join(", "))
                        }
                        _ => scope.clone(),
                    })
                    .collect();
                let _ = write!(line, "caused by changes to: {}", causes.join(", "));
            }
            line.trim_end().to_string()
        }
    }
}

/// Renders the summary of every change, colored by action.
#[must_use]
pub fn render_changes(changes: &[ResourceChange]) -> String {
    let mut out = String::new();
    for change in changes {
        let line = describe_change(change);
        let _ = match change.action {
            ChangeAction::Add => writeln!(out, "{}", line.green()),
            ChangeAction::Modify => writeln!(out, "{}", line.yellow()),
            ChangeAction::Remove => writeln!(out, "{}", line.red()),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let add = ResourceChange::new("Queue", "AWS::SQS::Queue", ChangeAction::Add);
        assert_eq!(describe_change(&add), "AWS::SQS::Queue (Queue) will be added");

        let remove = ResourceChange::new("Topic", "AWS::SNS::Topic", ChangeAction::Remove);
        assert_eq!(describe_change(&remove), "AWS::SNS::Topic (Topic) will be deleted");
    }

    #[test]
    fn test_modify_with_replacement_and_causes() {
        let mut change = ResourceChange::new("Table", "AWS::DynamoDB::Table", ChangeAction::Modify);
        change.replacement_required = true;
        change.scopes = vec![String::from("Properties"), String::from("Tags")];
        change
            .causing_entities
            .insert(String::from("Properties"), vec![String::from("TableName")]);

        assert_eq!(
            describe_change(&change),
            "AWS::DynamoDB::Table (Table) will be modified by deletion and recreation caused by changes to: Properties (TableName), Tags"
        );
    }

    #[test]
    fn test_modify_without_scopes() {
        let change = ResourceChange::new("Queue", "AWS::SQS::Queue", ChangeAction::Modify);
        assert_eq!(describe_change(&change), "AWS::SQS::Queue (Queue) will be modified");
    }

    #[test]
    fn test_render_changes_one_line_each() {
        let changes = vec![
            ResourceChange::new("Queue", "AWS::SQS::Queue", ChangeAction::Add),
            ResourceChange::new("Topic", "AWS::SNS::Topic", ChangeAction::Remove),
        ];
        let text = render_changes(&changes);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("will be added"));
    }
}
