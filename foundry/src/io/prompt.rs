//! Prompt rendering for the command-backed Generator and Planner.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use super::generator::{GenerateKind, GenerateRequest, PlanRequest};

const CODE_TEMPLATE: &str = include_str!("prompts/code.md");
const ACTIONS_TEMPLATE: &str = include_str!("prompts/actions.md");
const PATCH_TEMPLATE: &str = include_str!("prompts/patch.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const TICKET_TEMPLATE: &str = include_str!("prompts/ticket.md");

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker pattern compiles")
});

/// Droppable sections, least important first.
const DROP_ORDER: &[&str] = &["map", "existing"];

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("code", CODE_TEMPLATE)
            .expect("code template should be valid");
        env.add_template("actions", ACTIONS_TEMPLATE)
            .expect("actions template should be valid");
        env.add_template("patch", PATCH_TEMPLATE)
            .expect("patch template should be valid");
        env.add_template("plan", PLAN_TEMPLATE)
            .expect("plan template should be valid");
        env.add_template("ticket", TICKET_TEMPLATE)
            .expect("ticket template should be valid");
        Self { env }
    }

    fn render_generate(&self, request: &GenerateRequest) -> Result<String> {
        let name = match request.kind {
            GenerateKind::Code => "code",
            GenerateKind::Actions => "actions",
            GenerateKind::Patch => "patch",
        };
        let template = self.env.get_template(name)?;
        let rendered = template.render(context! {
            agent => &request.agent,
            project_id => &request.project_id,
            description => non_blank(&request.description),
            task => request.task.trim(),
            target_file => &request.target_file,
            existing => request.existing_content.as_deref().and_then(non_blank),
            project_map => request.project_map.as_deref().and_then(non_blank),
        })?;
        Ok(rendered)
    }

    fn render_plan(&self, request: &PlanRequest) -> Result<String> {
        let template = self.env.get_template("plan")?;
        let rendered = template.render(context! {
            request => request.request.trim(),
            agents => &request.agents,
            housekeeping_project => &request.housekeeping_project,
            project_map => request.project_map.as_deref().and_then(non_blank),
        })?;
        Ok(rendered)
    }

    fn render_ticket(&self, kind: &str, name: &str, body: &str) -> Result<String> {
        let template = self.env.get_template("ticket")?;
        let rendered = template.render(context! {
            kind => kind,
            name => name,
            body => body.trim(),
        })?;
        Ok(rendered)
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, body_start, key, required)) in markers.iter().enumerate() {
        let body_end = markers
            .get(i + 1)
            .map_or(rendered.len(), |(next_start, ..)| *next_start);
        let content = rendered[*body_start..body_end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Drop droppable sections (in `DROP_ORDER`) until the total fits `budget`,
/// then truncate the last section if still over.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = *key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    if let Some(last) = sections.last_mut() {
        let allowed = last.content.len().saturating_sub(total - budget);
        let cut = floor_char_boundary(&last.content, allowed.saturating_sub(12));
        last.content.truncate(cut);
        last.content.push_str("\n[truncated]");
        debug!(section = %last.key, after_len = last.content.len(), "truncated section for budget");
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn join_sections(sections: &[ParsedSection]) -> String {
    let mut out = sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_generate(&self, request: &GenerateRequest) -> Result<String> {
        let rendered = PromptEngine::new()
            .render_generate(request)
            .context("render generator prompt")?;
        Ok(self.fit(&rendered))
    }

    pub fn build_plan(&self, request: &PlanRequest) -> Result<String> {
        let rendered = PromptEngine::new()
            .render_plan(request)
            .context("render planner prompt")?;
        Ok(self.fit(&rendered))
    }

    fn fit(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes);
        join_sections(&sections)
    }
}

/// Natural-language maintenance request for a bug ticket.
pub fn ticket_request(kind: &str, name: &str, body: &str) -> Result<String> {
    PromptEngine::new()
        .render_ticket(kind, name, body)
        .context("render ticket request")
}
