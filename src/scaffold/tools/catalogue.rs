//! The fixed tool catalogue offered to the model.
//!
//! Declared statically and turned into OpenAI function schemas once per
//! run; every query in that run passes the same definitions.

use serde_json::{json, Map, Value};

use crate::llm::ToolDefinition;

/// One parameter of a catalogue tool.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    /// JSON-schema type ("string", "integer", "boolean", "array").
    pub ty: &'static str,
    pub required: bool,
    pub description: &'static str,
    pub enum_values: &'static [&'static str],
    /// Item type for array parameters.
    pub items: Option<&'static str>,
}

impl ParamSpec {
    const fn new(name: &'static str, ty: &'static str, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            description,
            enum_values: &[],
            items: None,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.enum_values = values;
        self
    }

    const fn of(mut self, items: &'static str) -> Self {
        self.items = Some(items);
        self
    }

    fn schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.ty));
        if !self.description.is_empty() {
            prop.insert("description".into(), json!(self.description));
        }
        if !self.enum_values.is_empty() {
            prop.insert("enum".into(), json!(self.enum_values));
        }
        if let Some(items) = self.items {
            prop.insert("items".into(), json!({ "type": items }));
        }
        Value::Object(prop)
    }
}

/// A catalogue tool: name, description and parameters.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl ToolSpec {
    /// JSON-schema object describing this tool's parameters.
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name, self.description, self.parameters_schema())
    }
}

pub const TOOL_CATALOGUE: &[ToolSpec] = &[
    ToolSpec {
        name: "read_file",
        description: "Read file contents with line numbers",
        params: &[
            ParamSpec::new("file_path", "string", "Path of the file to read").required(),
            ParamSpec::new("offset", "integer", "First line to show, 1-indexed (default 1)"),
            ParamSpec::new("limit", "integer", "Maximum number of lines (default 100)"),
        ],
    },
    ToolSpec {
        name: "grep_files",
        description: "Search for pattern in files using ripgrep",
        params: &[
            ParamSpec::new("pattern", "string", "Regular expression to search for").required(),
            ParamSpec::new("path", "string", "Directory or file to search (default .)"),
            ParamSpec::new("include", "string", "Glob of files to include, e.g. *.py"),
            ParamSpec::new("limit", "integer", "Maximum number of matches (default 100)"),
        ],
    },
    ToolSpec {
        name: "text_editor",
        description: "Edit files: view, str_replace, insert, create",
        params: &[
            ParamSpec::new("command", "string", "Editor operation")
                .required()
                .one_of(&["view", "str_replace", "insert", "create"]),
            ParamSpec::new("path", "string", "Path of the file").required(),
            ParamSpec::new("view_range", "array", "[start, end] lines for view").of("integer"),
            ParamSpec::new("old_str", "string", "Exact text to replace (must be unique)"),
            ParamSpec::new("new_str", "string", "Replacement text"),
            ParamSpec::new("insert_line", "integer", "Insert after this line (0 = start)"),
            ParamSpec::new("insert_text", "string", "Text to insert"),
            ParamSpec::new("file_text", "string", "Content of the file to create"),
        ],
    },
    ToolSpec {
        name: "shell",
        description: "Execute shell command",
        params: &[
            ParamSpec::new("command", "string", "Command line run with bash -c").required(),
            ParamSpec::new("timeout_secs", "integer", "Timeout in seconds"),
        ],
    },
    ToolSpec {
        name: "git_status",
        description: "Show git status",
        params: &[ParamSpec::new("short", "boolean", "Use the short format")],
    },
    ToolSpec {
        name: "git_diff",
        description: "Show git diff",
        params: &[
            ParamSpec::new("staged", "boolean", "Diff the index instead of the worktree"),
            ParamSpec::new("paths", "array", "Limit the diff to these paths").of("string"),
        ],
    },
];

/// Function-tool definitions for every catalogue entry.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    TOOL_CATALOGUE.iter().map(ToolSpec::definition).collect()
}

/// Human-readable catalogue listing for the system prompt.
pub fn tools_description() -> String {
    TOOL_CATALOGUE
        .iter()
        .map(|tool| {
            let params = tool
                .params
                .iter()
                .map(|p| format!("{}: {}", p.name, p.ty))
                .collect::<Vec<_>>()
                .join(", ");
            format!("- {}({}): {}", tool.name, params, tool.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_names() {
        let names: Vec<&str> = TOOL_CATALOGUE.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["read_file", "grep_files", "text_editor", "shell", "git_status", "git_diff"]
        );
    }

    #[test]
    fn test_text_editor_schema() {
        let editor = TOOL_CATALOGUE
            .iter()
            .find(|t| t.name == "text_editor")
            .expect("text_editor");
        let schema = editor.parameters_schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["command", "path"]));
        assert_eq!(
            schema["properties"]["command"]["enum"],
            json!(["view", "str_replace", "insert", "create"])
        );
        assert_eq!(schema["properties"]["view_range"]["items"]["type"], "integer");
    }

    #[test]
    fn test_tool_definitions_shape() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), TOOL_CATALOGUE.len());
        let value = serde_json::to_value(&defs[3]).expect("serialize");
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "shell");
        assert_eq!(value["function"]["parameters"]["required"], json!(["command"]));
    }

    #[test]
    fn test_tools_description_lines() {
        let description = tools_description();
        assert!(description
            .lines()
            .any(|l| l == "- shell(command: string, timeout_secs: integer): Execute shell command"));
        assert!(description.lines().any(|l| l == "- git_status(short: boolean): Show git status"));
        assert_eq!(description.lines().count(), TOOL_CATALOGUE.len());
    }
}
