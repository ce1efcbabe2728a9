//! Prompts for the benchmark agent.

use crate::swe::SweInstance;

/// Sentinel the agent prints to finish and submit its patch.
pub const COMPLETION_MARKER: &str = "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT";

/// Placeholder replaced with the tool catalogue listing.
pub const TOOLS_PLACEHOLDER: &str = "{tools_description}";

/// Default system prompt template.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = r#"You are a software engineer helping fix issues in a codebase.

You have access to the following tools:
{tools_description}

For each response:
1. Explain your reasoning in a THOUGHT section
2. Call one or more tools to investigate or make changes

When done, create a patch and submit:
1. git diff -- <changed_files> > patch.txt
2. Verify patch.txt looks correct
3. echo COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT && cat patch.txt
"#;

/// Substitute the tool listing into a system prompt template.
pub fn render_system_prompt(template: &str, tools_description: &str) -> String {
    template.replace(TOOLS_PLACEHOLDER, tools_description)
}

/// Wrap an instance's problem statement into the task given to the agent.
pub fn format_task_prompt(instance: &SweInstance, cwd: &str) -> String {
    format!(
        "<pr_description>\n{problem}\n</pr_description>\n\n\
         Repository: {repo}\n\
         Base commit: {commit}\n\n\
         Your task is to fix the issue described above by modifying the source files in {cwd}.\n\
         Do NOT modify tests or configuration files.\n\n\
         When done:\n\
         1. Create patch: git diff -- <modified_files> > patch.txt\n\
         2. Verify patch.txt\n\
         3. Submit: echo {marker} && cat patch.txt\n",
        problem = instance.problem_statement,
        repo = instance.repo,
        commit = instance.base_commit,
        cwd = cwd,
        marker = COMPLETION_MARKER,
    )
}
