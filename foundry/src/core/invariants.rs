//! Semantic plan invariants not expressible via JSON Schema.

use crate::core::types::Plan;

/// Check semantic invariants not expressible in JSON Schema:
/// - `project_id` is not blank
/// - `action_plan` has at least one task
/// - every task names an agent
pub fn validate_plan(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();

    if plan.project_id.trim().is_empty() {
        errors.push("project_id must not be blank".to_string());
    }

    if plan.action_plan.is_empty() {
        errors.push("action_plan must contain at least one task".to_string());
    }

    for (index, task) in plan.action_plan.iter().enumerate() {
        if task.agent.trim().is_empty() {
            errors.push(format!("action_plan[{index}]: agent must not be blank"));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Task;

    fn task(agent: &str) -> Task {
        Task {
            agent: agent.to_string(),
            task: "t".to_string(),
            target_file: None,
            command: None,
        }
    }

    #[test]
    fn accepts_well_formed_plan() {
        let plan = Plan {
            project_id: "demo".to_string(),
            description: String::new(),
            action_plan: vec![task("backend_dev")],
        };
        assert!(validate_plan(&plan).is_empty());
    }

    #[test]
    fn reports_every_violation() {
        let plan = Plan {
            project_id: "  ".to_string(),
            description: String::new(),
            action_plan: Vec::new(),
        };
        let errors = validate_plan(&plan);
        assert_eq!(errors.len(), 2);

        let plan = Plan {
            project_id: "demo".to_string(),
            description: String::new(),
            action_plan: vec![task("executor"), task("")],
        };
        assert_eq!(
            validate_plan(&plan),
            vec!["action_plan[1]: agent must not be blank".to_string()]
        );
    }
}
