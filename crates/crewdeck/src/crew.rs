use std::path::Path;
use std::sync::LazyLock;
use regex::Regex;

// ── YAML config files ────────────────────────────────────────────────────────

/// Reads a crew YAML file as JSON for the API. Missing or malformed
/// files come back as an empty object so the editor UI always has
/// something to render.
pub fn read_yaml(path: &Path) -> serde_json::Value {
	let content = match std::fs::read_to_string(path) {
		Ok(c) => c,
		Err(_) => return serde_json::json!({}),
	};
	let value: serde_yaml::Value = match serde_yaml::from_str(&content) {
		Ok(serde_yaml::Value::Null) => return serde_json::json!({}),
		Ok(v) => v,
		Err(_) => return serde_json::json!({}),
	};
	serde_json::to_value(&value).unwrap_or_else(|_| serde_json::json!({}))
}

/// Validates the payload by parsing it, then writes it back normalized.
/// Invalid YAML is the caller's error; a write failure is ours.
pub fn write_yaml(path: &Path, content: &str) -> Result<(), String> {
	let value: serde_yaml::Value =
		serde_yaml::from_str(content).map_err(|e| format!("invalid YAML: {}", e))?;
	let normalized =
		serde_yaml::to_string(&value).map_err(|e| format!("failed to serialize: {}", e))?;
	std::fs::write(path, normalized)
		.map_err(|e| format!("failed to write {}: {}", path.display(), e))
}

// ── Topic materializer ───────────────────────────────────────────────────────

// The crew entry script declares its inputs as `'topic': '<value>'`;
// runs pick their topic up from there, so starting a run means rewriting
// that literal first.
static TOPIC_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"('topic'\s*:\s*)'([^']*)'").expect("topic pattern"));

pub fn read_topic(entry: &Path) -> String {
	let content = match std::fs::read_to_string(entry) {
		Ok(c) => c,
		Err(_) => return String::new(),
	};
	TOPIC_RE
		.captures(&content)
		.map(|caps| caps[2].to_string())
		.unwrap_or_default()
}

pub fn apply_topic(entry: &Path, topic: &str) -> Result<(), String> {
	let content = std::fs::read_to_string(entry)
		.map_err(|e| format!("failed to read {}: {}", entry.display(), e))?;
	let replacement = topic.replace('\'', "\\'");
	let updated = TOPIC_RE
		.replace_all(&content, |caps: &regex::Captures| {
			format!("{}'{}'", &caps[1], replacement)
		})
		.into_owned();
	std::fs::write(entry, updated)
		.map_err(|e| format!("failed to write {}: {}", entry.display(), e))
}

// ── Output directory ─────────────────────────────────────────────────────────

/// File names in the crew's output directory, sorted. Empty on any
/// error, mirroring the original endpoint.
pub fn list_output(dir: &Path) -> Vec<String> {
	let entries = match std::fs::read_dir(dir) {
		Ok(e) => e,
		Err(_) => return Vec::new(),
	};
	let mut files: Vec<String> = entries
		.flatten()
		.map(|e| e.file_name().to_string_lossy().to_string())
		.collect();
	files.sort();
	files
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;
	use std::sync::atomic::{AtomicU32, Ordering};

	static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

	fn temp_dir(name: &str) -> PathBuf {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = std::env::temp_dir().join(format!("crewdeck-crew-test-{}-{}", n, name));
		let _ = std::fs::create_dir_all(&dir);
		dir
	}

	#[test]
	fn read_yaml_missing_file_is_empty_object() {
		let dir = temp_dir("yaml-missing");
		assert_eq!(read_yaml(&dir.join("nope.yaml")), serde_json::json!({}));
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn yaml_round_trip() {
		let dir = temp_dir("yaml-rt");
		let path = dir.join("agents.yaml");

		write_yaml(&path, "researcher:\n  role: Researcher\n").unwrap();
		let value = read_yaml(&path);
		assert_eq!(value["researcher"]["role"], "Researcher");

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn write_yaml_rejects_invalid_input() {
		let dir = temp_dir("yaml-invalid");
		let path = dir.join("tasks.yaml");

		let err = write_yaml(&path, "a: [unclosed").unwrap_err();
		assert!(err.contains("invalid YAML"));
		assert!(!path.exists());

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn topic_extract_and_apply() {
		let dir = temp_dir("topic");
		let entry = dir.join("main.py");
		std::fs::write(
			&entry,
			"inputs = {\n    'topic': 'Old Topic',\n    'year': '2025'\n}\n",
		)
		.unwrap();

		assert_eq!(read_topic(&entry), "Old Topic");

		apply_topic(&entry, "Build landing page").unwrap();
		assert_eq!(read_topic(&entry), "Build landing page");

		// The rest of the file is untouched.
		let content = std::fs::read_to_string(&entry).unwrap();
		assert!(content.contains("'year': '2025'"));

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn topic_missing_is_empty() {
		let dir = temp_dir("topic-missing");
		let entry = dir.join("main.py");
		std::fs::write(&entry, "print('no inputs here')\n").unwrap();

		assert_eq!(read_topic(&entry), "");
		// Applying to a file without the marker is a no-op, not an error.
		apply_topic(&entry, "whatever").unwrap();
		assert_eq!(read_topic(&entry), "");

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn list_output_sorted_and_safe() {
		let dir = temp_dir("output");
		std::fs::write(dir.join("b.html"), "x").unwrap();
		std::fs::write(dir.join("a.html"), "x").unwrap();

		assert_eq!(list_output(&dir), vec!["a.html".to_string(), "b.html".to_string()]);
		assert!(list_output(&dir.join("missing")).is_empty());

		let _ = std::fs::remove_dir_all(&dir);
	}
}
