use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use serde::Deserialize;

use crewdeck_run::RunSpec;

// ── crewdeck.toml ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
	#[serde(default)]
	pub server: ServerConfig,
	#[serde(default)]
	pub crew: CrewConfig,
	/// Remote inference machines for the ping endpoint: name → base URL.
	#[serde(default)]
	pub machines: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	#[serde(default = "default_bind")]
	pub bind: String,
	#[serde(default = "default_port")]
	pub port: u16,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self { bind: default_bind(), port: default_port() }
	}
}

fn default_bind() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8311 }

#[derive(Debug, Clone, Deserialize)]
pub struct CrewConfig {
	#[serde(default = "default_crew_dir")]
	pub dir: PathBuf,
	#[serde(default = "default_package")]
	pub package: String,
	#[serde(default = "default_output_dir")]
	pub output_dir: PathBuf,
	#[serde(default = "default_static_dir")]
	pub static_dir: PathBuf,
	/// Overrides the generated `python3 -c ...` entry command.
	pub command: Option<String>,
	#[serde(default)]
	pub env: HashMap<String, String>,
}

impl Default for CrewConfig {
	fn default() -> Self {
		Self {
			dir: default_crew_dir(),
			package: default_package(),
			output_dir: default_output_dir(),
			static_dir: default_static_dir(),
			command: None,
			env: HashMap::new(),
		}
	}
}

fn default_crew_dir() -> PathBuf { PathBuf::from("/crewai/website_builder") }
fn default_package() -> String { "website_builder".to_string() }
fn default_output_dir() -> PathBuf { PathBuf::from("/crewai/output") }
fn default_static_dir() -> PathBuf { PathBuf::from("static") }

impl CrewConfig {
	pub fn src_dir(&self) -> PathBuf {
		self.dir.join("src")
	}

	pub fn config_dir(&self) -> PathBuf {
		self.src_dir().join(&self.package).join("config")
	}

	pub fn agents_path(&self) -> PathBuf {
		self.config_dir().join("agents.yaml")
	}

	pub fn tasks_path(&self) -> PathBuf {
		self.config_dir().join("tasks.yaml")
	}

	/// The crew's entry script, where the topic lives.
	pub fn entry_path(&self) -> PathBuf {
		self.src_dir().join(&self.package).join("main.py")
	}

	pub fn command(&self) -> String {
		self.command.clone().unwrap_or_else(|| {
			format!("python3 -c 'from {}.main import run; run()'", self.package)
		})
	}

	/// Build the supervisor's run spec for one topic. The child always
	/// sees the crew sources on PYTHONPATH; `[crew.env]` is merged on top
	/// so a virtualenv or extra site-packages can be layered in.
	pub fn run_spec(&self, topic: &str) -> RunSpec {
		let mut env = HashMap::new();
		env.insert(
			"PYTHONPATH".to_string(),
			self.src_dir().to_string_lossy().to_string(),
		);
		env.extend(self.env.clone());
		RunSpec {
			topic: topic.to_string(),
			command: self.command(),
			dir: self.dir.clone(),
			env,
		}
	}
}

// ── Loading ──────────────────────────────────────────────────────────────────

/// Reads crewdeck.toml (CREWDECK_CONFIG overrides the path), then applies
/// the env overrides the original deployment relied on. Every field has a
/// default, so a missing file just means "run with defaults".
pub fn load() -> Config {
	let path = std::env::var("CREWDECK_CONFIG")
		.map(PathBuf::from)
		.unwrap_or_else(|_| PathBuf::from("crewdeck.toml"));
	let mut config = load_file(&path);

	if let Ok(dir) = std::env::var("CREWAI_DIR") {
		config.crew.dir = PathBuf::from(dir);
	}
	if let Ok(dir) = std::env::var("OUTPUT_DIR") {
		config.crew.output_dir = PathBuf::from(dir);
	}

	config
}

fn load_file(path: &Path) -> Config {
	if path.exists() {
		match std::fs::read_to_string(path) {
			Ok(content) => match toml::from_str(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	Config::default()
}
