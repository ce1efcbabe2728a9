//! Shell emulation of the catalogue tools.
//!
//! Used when the native tool binary is not available inside the sandbox.
//! Each tool maps to a program invocation run with `exec` in the working
//! directory. Untrusted values never become shell text: path and pattern
//! commands are fixed `bash -c` scripts that read positional parameters,
//! and the editor operations run a fixed Python script that reads its
//! arguments as JSON from stdin.

use serde_json::{json, Value};
use std::time::Duration;

const READ_RANGE_SCRIPT: &str = r#"set -o pipefail; sed -n "$1,$2p" -- "$3" | nl -ba -v "$1""#;

const GREP_SCRIPT: &str = r#"if [ -n "$3" ]; then
  grep -rn --include="$3" -e "$1" -- "$2" 2>/dev/null | head -n "$4"
else
  grep -rn -e "$1" -- "$2" 2>/dev/null | head -n "$4"
fi"#;

const EDITOR_SCRIPT: &str = r#"import json, os, sys

args = json.load(sys.stdin)
command = args["command"]
path = args["path"]

if command == "str_replace":
    old, new = args["old_str"], args["new_str"]
    with open(path) as f:
        content = f.read()
    count = content.count(old)
    if count == 0:
        sys.exit("ERROR: No match found for old_str in " + path)
    if count > 1:
        sys.exit("ERROR: Multiple matches (%d) for old_str in %s. Must be unique." % (count, path))
    with open(path, "w") as f:
        f.write(content.replace(old, new, 1))
    print("Replaced 1 occurrence in " + path)
elif command == "insert":
    line, text = args["insert_line"], args["insert_text"]
    with open(path) as f:
        lines = f.readlines()
    idx = max(0, min(line, len(lines)))
    if idx > 0 and not lines[idx - 1].endswith("\n"):
        lines[idx - 1] += "\n"
    if text.endswith("\n"):
        text = text[:-1]
    lines[idx:idx] = [l + "\n" for l in text.split("\n")]
    with open(path, "w") as f:
        f.writelines(lines)
    print("Inserted %d line(s) after line %d of %s" % (text.count("\n") + 1, idx, path))
elif command == "create":
    os.makedirs(os.path.dirname(path) or ".", exist_ok=True)
    with open(path, "w") as f:
        f.write(args["file_text"])
    print("Created: " + path)
else:
    sys.exit("ERROR: Unknown editor command: " + command)
"#;

/// A program invocation that emulates one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatedCommand {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Data piped to the program's stdin.
    pub stdin: Option<String>,
    /// Per-call timeout requested by the tool arguments.
    pub timeout: Option<Duration>,
}

impl EmulatedCommand {
    fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
            timeout: None,
        }
    }

    /// `bash -c <script> _ <args...>`; the script sees the values as `$1..$n`.
    fn bash_script(script: &str, args: &[String]) -> Self {
        let mut argv = vec![
            "bash".to_string(),
            "-c".to_string(),
            script.to_string(),
            "_".to_string(),
        ];
        argv.extend(args.iter().cloned());
        Self::new(argv)
    }

    fn editor(payload: Value) -> Self {
        Self {
            stdin: Some(payload.to_string()),
            ..Self::new(["python3", "-c", EDITOR_SCRIPT])
        }
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    match str_arg(args, key) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(format!("Missing required argument: {}", key)),
    }
}

fn int_arg(args: &Value, key: &str, default: i64) -> Result<i64, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| format!("Argument {} must be an integer", key)),
    }
}

/// Largest line number or line count accepted from the model.
const MAX_LINE_ARG: i64 = 100_000_000;

fn check_line_value(value: i64, key: &str) -> Result<i64, String> {
    if (-MAX_LINE_ARG..=MAX_LINE_ARG).contains(&value) {
        Ok(value)
    } else {
        Err(format!("Argument {} out of range", key))
    }
}

/// Integer argument used as a line number or count; bounded so range arithmetic cannot overflow.
fn line_arg(args: &Value, key: &str, default: i64) -> Result<i64, String> {
    check_line_value(int_arg(args, key, default)?, key)
}

fn bool_arg(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn read_range(start: i64, end: Option<i64>, path: &str) -> EmulatedCommand {
    let end = end.map_or_else(|| "$".to_string(), |e| e.to_string());
    EmulatedCommand::bash_script(
        READ_RANGE_SCRIPT,
        &[start.to_string(), end, path.to_string()],
    )
}

/// Build the emulation for `tool_name`, or explain why it cannot be emulated.
pub fn emulate(tool_name: &str, args: &Value) -> Result<EmulatedCommand, String> {
    match tool_name {
        "shell" => {
            let command = required_str(args, "command")?;
            let mut cmd = EmulatedCommand::new(["bash", "-c", command]);
            let timeout_secs = int_arg(args, "timeout_secs", 0)?;
            if timeout_secs > 0 {
                cmd.timeout = Some(Duration::from_secs(timeout_secs as u64));
            }
            Ok(cmd)
        }
        "read_file" => {
            let path = required_str(args, "file_path")?;
            let offset = line_arg(args, "offset", 1)?.max(1);
            let limit = line_arg(args, "limit", 100)?.max(1);
            Ok(read_range(offset, Some(offset + limit - 1), path))
        }
        "grep_files" => {
            let pattern = required_str(args, "pattern")?;
            let path = str_arg(args, "path").filter(|p| !p.is_empty()).unwrap_or(".");
            let include = str_arg(args, "include").unwrap_or("");
            let limit = line_arg(args, "limit", 100)?.max(1);
            Ok(EmulatedCommand::bash_script(
                GREP_SCRIPT,
                &[
                    pattern.to_string(),
                    path.to_string(),
                    include.to_string(),
                    limit.to_string(),
                ],
            ))
        }
        "git_status" => {
            let mut argv = vec!["git", "status"];
            if bool_arg(args, "short") {
                argv.push("-s");
            }
            Ok(EmulatedCommand::new(argv))
        }
        "git_diff" => {
            let mut argv = vec!["git".to_string(), "diff".to_string()];
            if bool_arg(args, "staged") {
                argv.push("--staged".to_string());
            }
            let paths: Vec<String> = args
                .get("paths")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            if !paths.is_empty() {
                argv.push("--".to_string());
                argv.extend(paths);
            }
            Ok(EmulatedCommand::new(argv))
        }
        "text_editor" => emulate_editor(args),
        other => Err(format!("Unknown tool: {}", other)),
    }
}

fn emulate_editor(args: &Value) -> Result<EmulatedCommand, String> {
    let command = str_arg(args, "command").unwrap_or("view");
    let path = required_str(args, "path")?;

    match command {
        "view" => {
            let range = args
                .get("view_range")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_i64)
                        .map(|v| check_line_value(v, "view_range"))
                        .collect::<Result<Vec<i64>, String>>()
                })
                .transpose()?
                .unwrap_or_default();
            let start = range.first().copied().unwrap_or(1).max(1);
            let end = match range.get(1).copied() {
                Some(e) if e < 0 => None,
                Some(e) => Some(e.max(start)),
                None => Some(start + 99),
            };
            Ok(read_range(start, end, path))
        }
        "str_replace" => {
            let old_str = str_arg(args, "old_str").unwrap_or("");
            if old_str.is_empty() {
                return Err("str_replace requires a non-empty old_str".to_string());
            }
            Ok(EmulatedCommand::editor(json!({
                "command": "str_replace",
                "path": path,
                "old_str": old_str,
                "new_str": str_arg(args, "new_str").unwrap_or(""),
            })))
        }
        "insert" => {
            let insert_text = str_arg(args, "insert_text").unwrap_or("");
            if insert_text.is_empty() {
                return Err("insert requires a non-empty insert_text".to_string());
            }
            Ok(EmulatedCommand::editor(json!({
                "command": "insert",
                "path": path,
                "insert_line": line_arg(args, "insert_line", 0)?.max(0),
                "insert_text": insert_text,
            })))
        }
        "create" => Ok(EmulatedCommand::editor(json!({
            "command": "create",
            "path": path,
            "file_text": str_arg(args, "file_text").unwrap_or(""),
        }))),
        other => Err(format!("Unknown editor command: {}", other)),
    }
}
