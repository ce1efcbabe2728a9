//! Loading and selecting benchmark instances.
//!
//! Datasets are local exports of SWE-bench splits, either a JSON array or
//! JSON Lines with one instance per line.

use regex::Regex;
use std::path::Path;

use super::SweInstance;
use crate::error::DatasetError;

/// Which instances of a dataset to run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceSelection {
    /// A single instance id, or a numeric index into the selection.
    pub instance: Option<String>,
    /// Python-style `start:end` slice.
    pub slice: Option<String>,
    /// Regex matched against `instance_id`.
    pub filter: Option<String>,
    /// Reorder by a stable hash of the instance id before slicing.
    pub shuffle: bool,
}

/// Load all instances from a `.json` array or a `.jsonl` file.
pub async fn load_instances(path: &Path) -> Result<Vec<SweInstance>, DatasetError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DatasetError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let instances = if contents.trim_start().starts_with('[') {
        serde_json::from_str(&contents).map_err(|source| DatasetError::InvalidRecord {
            location: path.display().to_string(),
            source,
        })?
    } else {
        parse_jsonl(path, &contents)?
    };

    tracing::info!(path = %path.display(), count = instances.len(), "Loaded instances");
    Ok(instances)
}

fn parse_jsonl(path: &Path, contents: &str) -> Result<Vec<SweInstance>, DatasetError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| DatasetError::InvalidRecord {
                location: format!("{}:{}", path.display(), idx + 1),
                source,
            })
        })
        .collect()
}

fn resolve_index(raw: &str, len: usize, spec: &str) -> Result<usize, DatasetError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| DatasetError::InvalidSlice(spec.to_string()))?;
    let len = len as i64;
    let idx = if value < 0 { len + value } else { value };
    Ok(idx.clamp(0, len) as usize)
}

/// Resolve a `start:end` slice against a sequence of `len` items.
///
/// Either end may be omitted and negative values count from the end.
pub fn parse_slice(spec: &str, len: usize) -> Result<(usize, usize), DatasetError> {
    let (start, end) = spec
        .split_once(':')
        .ok_or_else(|| DatasetError::InvalidSlice(spec.to_string()))?;
    let start = if start.trim().is_empty() {
        0
    } else {
        resolve_index(start, len, spec)?
    };
    let end = if end.trim().is_empty() {
        len
    } else {
        resolve_index(end, len, spec)?
    };
    Ok((start, end.max(start)))
}

/// FNV-1a over the id; stable across runs and platforms.
fn shuffle_key(id: &str) -> u64 {
    id.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Apply a selection: filter, shuffle, slice, then single-instance pick.
pub fn select_instances(
    mut instances: Vec<SweInstance>,
    selection: &InstanceSelection,
) -> Result<Vec<SweInstance>, DatasetError> {
    if let Some(pattern) = selection.filter.as_deref().filter(|p| !p.is_empty()) {
        let re = Regex::new(pattern)?;
        instances.retain(|i| re.is_match(&i.instance_id));
    }

    if selection.shuffle {
        instances.sort_by_key(|i| (shuffle_key(&i.instance_id), i.instance_id.clone()));
    }

    if let Some(spec) = selection.slice.as_deref().filter(|s| !s.is_empty()) {
        let (start, end) = parse_slice(spec, instances.len())?;
        instances = instances.drain(start..end).collect();
    }

    if let Some(wanted) = selection.instance.as_deref() {
        let by_id = instances.iter().position(|i| i.instance_id == wanted);
        let by_index = wanted
            .parse::<usize>()
            .ok()
            .filter(|&idx| idx < instances.len());
        return match by_id.or(by_index) {
            Some(idx) => Ok(vec![instances.swap_remove(idx)]),
            None => Err(DatasetError::InstanceNotFound(wanted.to_string())),
        };
    }

    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn instances(ids: &[&str]) -> Vec<SweInstance> {
        ids.iter()
            .map(|id| SweInstance::new(*id, "o/r", "abc", "p"))
            .collect()
    }

    fn ids(instances: &[SweInstance]) -> Vec<&str> {
        instances.iter().map(|i| i.instance_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_load_json_array() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("lite.json");
        std::fs::write(
            &path,
            r#"[{"instance_id": "a-1", "repo": "o/a", "base_commit": "c1", "problem_statement": "p1"},
                {"instance_id": "b-2", "repo": "o/b", "base_commit": "c2", "problem_statement": "p2",
                 "env_image_key": "img:b"}]"#,
        )
        .expect("write");

        let loaded = load_instances(&path).await.expect("load");
        assert_eq!(ids(&loaded), vec!["a-1", "b-2"]);
        assert_eq!(loaded[1].resolve_image(), "img:b");
    }

    #[tokio::test]
    async fn test_load_jsonl_reports_bad_line() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("lite.jsonl");
        std::fs::write(
            &path,
            "{\"instance_id\": \"a\", \"repo\": \"o/a\", \"base_commit\": \"c\", \"problem_statement\": \"p\"}\n\n{\"instance_id\": \"b\"}\n",
        )
        .expect("write");

        let err = load_instances(&path).await.expect_err("must fail");
        match err {
            DatasetError::InvalidRecord { location, .. } => assert!(location.ends_with(":3")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_instances(Path::new("/nonexistent/data.jsonl"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, DatasetError::Read { .. }));
    }

    #[test]
    fn test_parse_slice() {
        assert_eq!(parse_slice("0:10", 5).expect("slice"), (0, 5));
        assert_eq!(parse_slice(":3", 5).expect("slice"), (0, 3));
        assert_eq!(parse_slice("2:", 5).expect("slice"), (2, 5));
        assert_eq!(parse_slice("-2:", 5).expect("slice"), (3, 5));
        assert_eq!(parse_slice("4:1", 5).expect("slice"), (4, 4));
        assert!(parse_slice("3", 5).is_err());
        assert!(parse_slice("a:b", 5).is_err());
    }

    #[test]
    fn test_filter_then_slice() {
        let all = instances(&["django-1", "sympy-1", "django-2", "django-3"]);
        let selection = InstanceSelection {
            filter: Some("^django".to_string()),
            slice: Some("1:".to_string()),
            ..Default::default()
        };
        let selected = select_instances(all, &selection).expect("select");
        assert_eq!(ids(&selected), vec!["django-2", "django-3"]);
    }

    #[test]
    fn test_single_instance_by_id_or_index() {
        let selection = InstanceSelection {
            instance: Some("b".to_string()),
            ..Default::default()
        };
        let selected = select_instances(instances(&["a", "b", "c"]), &selection).expect("select");
        assert_eq!(ids(&selected), vec!["b"]);

        let selection = InstanceSelection {
            instance: Some("2".to_string()),
            ..Default::default()
        };
        let selected = select_instances(instances(&["a", "b", "c"]), &selection).expect("select");
        assert_eq!(ids(&selected), vec!["c"]);

        let selection = InstanceSelection {
            instance: Some("zzz".to_string()),
            ..Default::default()
        };
        let err = select_instances(instances(&["a"]), &selection).expect_err("missing");
        assert!(matches!(err, DatasetError::InstanceNotFound(_)));
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let selection = InstanceSelection {
            shuffle: true,
            ..Default::default()
        };
        let names = ["a", "b", "c", "d", "e", "f"];
        let first = select_instances(instances(&names), &selection).expect("select");
        let mut reversed = names;
        reversed.reverse();
        let second = select_instances(instances(&reversed), &selection).expect("select");
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.len(), names.len());
    }

    #[test]
    fn test_invalid_filter() {
        let selection = InstanceSelection {
            filter: Some("(".to_string()),
            ..Default::default()
        };
        let err = select_instances(instances(&["a"]), &selection).expect_err("bad regex");
        assert!(matches!(err, DatasetError::InvalidFilter(_)));
    }
}
