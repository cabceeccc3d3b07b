//! User-defined command backend.
//!
//! Any tool that prints text for a document on stdout can join the chain:
//!
//! ```toml
//! [commands.marker]
//! command = "marker_single"
//! args = ["{file}", "--langs", "{lang}"]
//! ```
//!
//! Placeholders: `{file}`, `{lang}`, `{device}`, `{method}`, plus any key
//! of `ExtractOptions::extra`.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::process::{check_binary, run_abortable};
use super::{Backend, BackendError, ExtractContext, ExtractOptions};

/// Configuration of one custom command backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Executable name or path.
    pub command: String,
    /// Arguments; `{file}` is appended if no argument mentions it.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Backend that shells out to a configured command.
pub struct CommandBackend {
    name: String,
    config: CommandConfig,
}

impl CommandBackend {
    pub fn new(name: &str, config: CommandConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
        }
    }

    fn render_args(&self, path: &Path, options: &ExtractOptions, ctx: &ExtractContext) -> Vec<String> {
        let file = path.to_string_lossy();
        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| {
                let mut rendered = arg
                    .replace("{file}", &file)
                    .replace("{lang}", &options.language)
                    .replace("{device}", ctx.device.as_str())
                    .replace("{method}", &options.parse_method);
                for (key, value) in &options.extra {
                    rendered = rendered.replace(&format!("{{{}}}", key), value);
                }
                rendered
            })
            .collect();

        if !self.config.args.iter().any(|a| a.contains("{file}")) {
            args.push(file.to_string());
        }
        args
    }
}

impl Backend for CommandBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        check_binary(&self.config.command)
    }

    fn availability_hint(&self) -> String {
        if check_binary(&self.config.command) {
            format!("{} is available", self.config.command)
        } else {
            format!("{} not found in PATH", self.config.command)
        }
    }

    fn supports_abort(&self) -> bool {
        true
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
        ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(self.render_args(path, options, ctx));
        let hint = format!("{} not found in PATH", self.config.command);
        Ok(run_abortable(cmd, &ctx.abort, &hint)?.stdout)
    }
}
