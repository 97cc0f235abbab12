// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use forge_skills::SkillEntry;
use forge_tools::ToolSchema;

/// The fixed identity-and-discipline preamble of every system prompt.
const BASE_PREAMBLE: &str = "\
You are Forge, an AI programming assistant operating inside the user's \
project workspace. You work by calling tools and reasoning over their \
results until the task is complete, then you answer.

File modification discipline:
- Prefer `edit_file` for changing existing files; use `write_file` only to \
create new files or for full rewrites.
- Never output partial code with placeholders — make complete, working edits.

Context discipline:
- Do not re-read files whose content you already have in this conversation.
- Keep tool output usage focused; request line ranges instead of whole files \
when you know where to look.

You may issue multiple independent tool calls in a single assistant turn; \
they run in parallel and their results come back in order.";

/// Compose the system prompt from the base preamble, the tool catalog, the
/// numbered rules, and the skill catalog.
pub fn build_system_prompt(
    rules: &[String],
    skills: &[SkillEntry],
    tools: &[ToolSchema],
) -> String {
    let mut prompt = String::from(BASE_PREAMBLE);

    if !tools.is_empty() {
        prompt.push_str("\n\n## Tools\n");
        for t in tools {
            prompt.push_str(&format!("- `{}`: {}\n", t.name, first_line(&t.description)));
        }
    }

    if !rules.is_empty() {
        prompt.push_str("\n## Rules\n");
        for (i, rule) in rules.iter().enumerate() {
            prompt.push_str(&format!("Rule {}: {}\n", i + 1, rule));
        }
    }

    if !skills.is_empty() {
        prompt.push_str(
            "\n## Skills\n\
             The following skills provide detailed guidance on demand. When a \
             task matches one, call `load_skill` with its slug before starting.\n\n\
             | slug | name | summary |\n\
             |---|---|---|\n",
        );
        for s in skills {
            prompt.push_str(&format!("| {} | {} | {} |\n", s.slug, s.name, s.summary));
        }
    }

    prompt
}

/// The reminder appended to every tool result injected back into context.
/// Empty when there are no rules.
pub fn rules_reminder(rules: &[String]) -> String {
    if rules.is_empty() {
        return String::new();
    }
    let listed = rules
        .iter()
        .enumerate()
        .map(|(i, r)| format!("({}) {}", i + 1, r))
        .collect::<Vec<_>>()
        .join(" ");
    format!("[Rule review] Ensure your next action complies with: {listed}")
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    fn schema(name: &str, desc: &str) -> ToolSchema {
        ToolSchema {
            name: name.into(),
            description: desc.into(),
            parameters: json!({ "type": "object" }),
        }
    }

    #[test]
    fn preamble_always_present() {
        let p = build_system_prompt(&[], &[], &[]);
        assert!(p.contains("Forge"));
        assert!(p.contains("edit_file"));
        assert!(p.contains("multiple independent tool calls"));
    }

    #[test]
    fn tool_catalog_lists_one_line_per_tool() {
        let tools = vec![
            schema("read_file", "Read a file.\nMore detail that must not appear."),
            schema("write_file", "Write a file."),
        ];
        let p = build_system_prompt(&[], &[], &tools);
        assert!(p.contains("- `read_file`: Read a file."));
        assert!(p.contains("- `write_file`: Write a file."));
        assert!(!p.contains("More detail"), "only first line of description");
    }

    #[test]
    fn rules_numbered_from_one_contiguously() {
        let r = rules(&["always run tests", "never force-push", "ask before deleting"]);
        let p = build_system_prompt(&r, &[], &[]);
        assert!(p.contains("## Rules"));
        assert!(p.contains("Rule 1: always run tests"));
        assert!(p.contains("Rule 2: never force-push"));
        assert!(p.contains("Rule 3: ask before deleting"));
        assert!(!p.contains("Rule 4:"));
    }

    #[test]
    fn no_rules_block_when_empty() {
        let p = build_system_prompt(&[], &[], &[]);
        assert!(!p.contains("## Rules"));
    }

    #[test]
    fn skills_table_lists_slug_name_summary() {
        let skills = vec![SkillEntry {
            slug: "git-helper".into(),
            name: "Git Helper".into(),
            summary: "commit and branch workflows".into(),
        }];
        let p = build_system_prompt(&[], &skills, &[]);
        assert!(p.contains("## Skills"));
        assert!(p.contains("| git-helper | Git Helper | commit and branch workflows |"));
        assert!(p.contains("load_skill"));
    }

    #[test]
    fn no_skills_block_when_empty() {
        let p = build_system_prompt(&[], &[], &[]);
        assert!(!p.contains("## Skills"));
    }

    #[test]
    fn reminder_lists_rules_in_order() {
        let r = rules(&["rule one", "rule two"]);
        assert_eq!(
            rules_reminder(&r),
            "[Rule review] Ensure your next action complies with: (1) rule one (2) rule two"
        );
    }

    #[test]
    fn reminder_empty_without_rules() {
        assert_eq!(rules_reminder(&[]), "");
    }
}
