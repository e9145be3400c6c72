//! The configuration DTO the Transport consumes (spec §4.2, "Argument
//! assembly"). Modelled on the teacher's `ClaudePrintRequest`/
//! `ClaudeClientBuilder` shape: plain fields plus fluent setters, a pure
//! `argv()`/`to_argv()` method, no reflection, no sprawling builder crate.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on the NDJSON reassembly buffer (spec §4.2): 1 MiB.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// Whether the transport is being driven one-shot (`--print`) or as a long
/// lived duplex session (`--input-format stream-json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    OneShot,
    Streaming,
}

#[derive(Debug, Clone, Default)]
pub struct ClaudeAgentOptions {
    pub binary: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,

    pub system_prompt: Option<String>,
    pub tools: Option<Vec<String>>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub max_turns: Option<u32>,
    pub max_budget_usd: Option<f64>,
    pub model: Option<String>,
    pub fallback_model: Option<String>,
    pub betas: Vec<String>,
    pub permission_prompt_tool_name: Option<String>,
    pub permission_mode: Option<String>,
    pub resume_continue: bool,
    pub resume_session_id: Option<String>,
    pub settings: Option<String>,
    pub sandbox: Option<serde_json::Value>,
    pub add_dirs: Vec<PathBuf>,
    pub mcp_config: Option<String>,
    pub include_partial_messages: bool,
    pub fork_session: bool,
    pub agents: Option<serde_json::Value>,
    pub setting_sources: Option<Vec<String>>,
    pub plugin_dirs: Vec<PathBuf>,
    pub max_thinking_tokens: Option<u32>,
    pub effort: Option<String>,
    pub json_schema: Option<String>,

    pub max_buffer_bytes: usize,
    pub stderr_callback: bool,
}

/// Platform command-line length limit above which an oversized `--agents`
/// payload is spilled to a temp file (spec §4.2).
#[cfg(windows)]
const MAX_COMMAND_LINE_LEN: usize = 8_000;
#[cfg(not(windows))]
const MAX_COMMAND_LINE_LEN: usize = 100_000;

impl ClaudeAgentOptions {
    pub fn new() -> Self {
        Self {
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            ..Default::default()
        }
    }

    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn disallowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.disallowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn permission_mode(mut self, mode: impl Into<String>) -> Self {
        self.permission_mode = Some(mode.into());
        self
    }

    pub fn add_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.add_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn mcp_config(mut self, config: impl Into<String>) -> Self {
        self.mcp_config = Some(config.into());
        self
    }

    pub fn include_partial_messages(mut self, enabled: bool) -> Self {
        self.include_partial_messages = enabled;
        self
    }

    pub fn max_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_buffer_bytes = bytes;
        self
    }

    pub fn timeout_default() -> Option<Duration> {
        Some(Duration::from_secs(120))
    }

    /// Assemble the flat, ordered argument vector described in spec §4.2.
    ///
    /// Returns the argv plus, if the `--agents` payload was spilled to a
    /// temp file to stay under the platform command-line limit, the path of
    /// that file (the caller owns cleanup on transport close).
    pub fn to_argv(&self, mode: TransportMode, prompt: Option<&str>) -> (Vec<String>, Option<PathBuf>) {
        let mut out = Vec::new();
        out.push("--output-format".to_string());
        out.push("stream-json".to_string());
        out.push("--verbose".to_string());

        if let Some(prompt_text) = self.system_prompt.as_ref() {
            out.push("--system-prompt".to_string());
            out.push(prompt_text.clone());
        }

        match self.tools.as_ref() {
            Some(tools) => {
                out.push("--tools".to_string());
                out.push(tools.join(","));
            }
            None => {}
        }

        if !self.allowed_tools.is_empty() {
            out.push("--allowedTools".to_string());
            out.push(self.allowed_tools.join(","));
        }
        if !self.disallowed_tools.is_empty() {
            out.push("--disallowedTools".to_string());
            out.push(self.disallowed_tools.join(","));
        }
        if let Some(turns) = self.max_turns {
            out.push("--max-turns".to_string());
            out.push(turns.to_string());
        }
        if let Some(budget) = self.max_budget_usd {
            out.push("--max-budget-usd".to_string());
            out.push(budget.to_string());
        }
        if let Some(model) = self.model.as_ref() {
            out.push("--model".to_string());
            out.push(model.clone());
        }
        if let Some(fallback) = self.fallback_model.as_ref() {
            out.push("--fallback-model".to_string());
            out.push(fallback.clone());
        }
        if !self.betas.is_empty() {
            out.push("--betas".to_string());
            out.push(self.betas.join(","));
        }
        if let Some(tool_name) = self.permission_prompt_tool_name.as_ref() {
            out.push("--permission-prompt-tool".to_string());
            out.push(tool_name.clone());
        }
        if let Some(perm_mode) = self.permission_mode.as_ref() {
            out.push("--permission-mode".to_string());
            out.push(perm_mode.clone());
        }
        if self.resume_continue {
            out.push("--continue".to_string());
        }
        if let Some(session_id) = self.resume_session_id.as_ref() {
            out.push("--resume".to_string());
            out.push(session_id.clone());
        }
        if let Some(settings) = self.settings_with_sandbox() {
            out.push("--settings".to_string());
            out.push(settings);
        }
        for dir in &self.add_dirs {
            out.push("--add-dir".to_string());
            out.push(dir.to_string_lossy().into_owned());
        }
        if let Some(mcp_config) = self.mcp_config.as_ref() {
            out.push("--mcp-config".to_string());
            out.push(mcp_config.clone());
        }
        if self.include_partial_messages {
            out.push("--include-partial-messages".to_string());
        }
        if self.fork_session {
            out.push("--fork-session".to_string());
        }

        let mut spilled = None;
        if let Some(agents) = self.agents.as_ref() {
            let serialized = serde_json::to_string(agents).unwrap_or_default();
            let projected_len: usize = out.iter().map(|s| s.len() + 1).sum::<usize>() + serialized.len();
            if projected_len > MAX_COMMAND_LINE_LEN {
                if let Ok(path) = spill_agents_to_temp_file(&serialized) {
                    out.push("--agents".to_string());
                    out.push(format!("@{}", path.display()));
                    spilled = Some(path);
                } else {
                    out.push("--agents".to_string());
                    out.push(serialized);
                }
            } else {
                out.push("--agents".to_string());
                out.push(serialized);
            }
        }

        match self.setting_sources.as_ref() {
            Some(sources) if sources.is_empty() => {
                out.push("--setting-sources".to_string());
                out.push(String::new());
            }
            Some(sources) => {
                out.push("--setting-sources".to_string());
                out.push(sources.join(","));
            }
            None => {}
        }
        for dir in &self.plugin_dirs {
            out.push("--plugin-dir".to_string());
            out.push(dir.to_string_lossy().into_owned());
        }
        if let Some(tokens) = self.max_thinking_tokens {
            out.push("--max-thinking-tokens".to_string());
            out.push(tokens.to_string());
        }
        if let Some(effort) = self.effort.as_ref() {
            out.push("--effort".to_string());
            out.push(effort.clone());
        }
        if let Some(schema) = self.json_schema.as_ref() {
            out.push("--json-schema".to_string());
            out.push(schema.clone());
        }

        match mode {
            TransportMode::OneShot => {
                out.push("--print".to_string());
                out.push("--".to_string());
                out.push(prompt.unwrap_or_default().to_string());
            }
            TransportMode::Streaming => {
                out.push("--input-format".to_string());
                out.push("stream-json".to_string());
            }
        }

        (out, spilled)
    }

    fn settings_with_sandbox(&self) -> Option<String> {
        match (&self.settings, &self.sandbox) {
            (None, None) => None,
            (Some(settings), None) => Some(settings.clone()),
            (settings, Some(sandbox)) => {
                let mut merged = settings
                    .as_ref()
                    .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
                    .unwrap_or_else(|| serde_json::json!({}));
                if let Some(obj) = merged.as_object_mut() {
                    obj.insert("sandbox".to_string(), sandbox.clone());
                }
                serde_json::to_string(&merged).ok()
            }
        }
    }
}

fn spill_agents_to_temp_file(serialized: &str) -> std::io::Result<PathBuf> {
    use std::io::Write;
    let mut path = std::env::temp_dir();
    path.push(format!("claude-agent-sdk-agents-{}.json", uuid::Uuid::new_v4()));
    let mut file = std::fs::File::create(&path)?;
    file.write_all(serialized.as_bytes())?;
    Ok(path)
}
