//! Pipeline configuration management.
//!
//! Handles loading, parsing, and validating the optional `elm-pipe.toml`.
//! Every field has a default, so a project without a config file builds
//! `src/` into `dist/` and serves it on port 3000.

use crate::{cli::Cli, utils::glob::GlobPattern};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default values for serde deserialization
pub mod config_defaults {
    pub fn r#true() -> bool {
        true
    }

    pub fn r#false() -> bool {
        false
    }

    pub mod paths {
        use std::path::PathBuf;

        pub fn dest() -> PathBuf {
            "dist".into()
        }
        pub fn elm() -> String {
            "src/**/*.elm".into()
        }
        pub fn sass() -> String {
            "src/scss/index.scss".into()
        }
        pub fn r#static() -> String {
            "src/**/*.html".into()
        }
    }

    pub mod elm {
        pub fn command() -> Vec<String> {
            vec!["elm".into()]
        }
    }

    pub mod css {
        pub fn command() -> Vec<String> {
            vec!["sass".into()]
        }
    }

    pub mod serve {
        pub fn interface() -> String {
            "127.0.0.1".into()
        }
        pub fn port() -> u16 {
            3000
        }
    }
}

/// Artifact type produced by `elm make`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElmOutput {
    /// JavaScript module to embed in a page (default)
    #[default]
    Js,
    /// Self-contained HTML page
    Html,
}

impl ElmOutput {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Html => "html",
        }
    }
}

/// Sass output style
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SassStyle {
    #[default]
    Expanded,
    Compressed,
}

impl SassStyle {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expanded => "expanded",
            Self::Compressed => "compressed",
        }
    }
}

/// `[paths]` section: output directory and the three source globs
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Output directory, relative to the project root
    #[serde(default = "config_defaults::paths::dest")]
    #[educe(Default = config_defaults::paths::dest())]
    pub dest: PathBuf,

    /// Elm sources
    #[serde(default = "config_defaults::paths::elm")]
    #[educe(Default = config_defaults::paths::elm())]
    pub elm: String,

    /// Sass entry file
    #[serde(default = "config_defaults::paths::sass")]
    #[educe(Default = config_defaults::paths::sass())]
    pub sass: String,

    /// Static files copied verbatim
    #[serde(default = "config_defaults::paths::r#static")]
    #[educe(Default = config_defaults::paths::r#static())]
    pub r#static: String,
}

/// `[elm]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ElmConfig {
    /// Compiler command, e.g. `["elm"]` or `["npx", "elm"]`
    #[serde(default = "config_defaults::elm::command")]
    #[educe(Default = config_defaults::elm::command())]
    pub command: Vec<String>,

    /// Pass `--debug` (time-travelling debugger in the output)
    #[serde(default = "config_defaults::r#true")]
    #[educe(Default = config_defaults::r#true())]
    pub debug: bool,

    /// Pass `--optimize`; cannot be combined with `debug`
    #[serde(default = "config_defaults::r#false")]
    #[educe(Default = config_defaults::r#false())]
    pub optimize: bool,

    #[serde(default)]
    pub output: ElmOutput,
}

/// `[css]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CssConfig {
    /// Sass compiler command (dart-sass CLI)
    #[serde(default = "config_defaults::css::command")]
    #[educe(Default = config_defaults::css::command())]
    pub command: Vec<String>,

    #[serde(default)]
    pub style: SassStyle,

    /// Emit a `.css.map` next to the stylesheet
    #[serde(default = "config_defaults::r#false")]
    #[educe(Default = config_defaults::r#false())]
    pub source_map: bool,
}

/// `[serve]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Interface to bind on
    #[serde(default = "config_defaults::serve::interface")]
    #[educe(Default = config_defaults::serve::interface())]
    pub interface: String,

    #[serde(default = "config_defaults::serve::port")]
    #[educe(Default = config_defaults::serve::port())]
    pub port: u16,
}

/// Root configuration structure representing `elm-pipe.toml`
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Project root; globs and `dest` are relative to it
    #[serde(skip)]
    #[educe(Default = PathBuf::from("./"))]
    pub root: PathBuf,

    /// Path of the loaded config file (may not exist)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub elm: ElmConfig,

    #[serde(default)]
    pub css: CssConfig,

    #[serde(default)]
    pub serve: ServeConfig,
}

impl PipelineConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Load `<root>/<config>` if it exists, defaults otherwise.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else {
            Self::default()
        };
        config.root = root.to_path_buf();
        config.config_path = config_path;
        config.update_with_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Output directory (absolute once `update_with_cli` ran).
    pub fn dest(&self) -> &Path {
        &self.paths.dest
    }

    pub fn elm_glob(&self) -> Result<GlobPattern> {
        GlobPattern::new(&self.paths.elm)
    }

    pub fn sass_glob(&self) -> Result<GlobPattern> {
        GlobPattern::new(&self.paths.sass)
    }

    pub fn static_glob(&self) -> Result<GlobPattern> {
        GlobPattern::new(&self.paths.r#static)
    }

    /// Apply CLI overrides and resolve paths against the project root.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.root, cli.root.as_ref());
        Self::update_option(&mut self.paths.dest, cli.output.as_ref());
        Self::update_option(&mut self.serve.interface, cli.interface.as_ref());
        Self::update_option(&mut self.serve.port, cli.port.as_ref());

        self.resolve_root();
    }

    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Make `root` absolute and `dest` relative to it.
    pub fn resolve_root(&mut self) {
        if let Ok(root) = self.root.canonicalize() {
            self.root = root;
        }
        self.paths.dest = self.root.join(&self.paths.dest);
    }

    /// Validate config values that would otherwise fail deep inside a task.
    pub fn validate(&self) -> Result<()> {
        if self.elm.debug && self.elm.optimize {
            bail!(ConfigError::Validation(
                "[elm.debug] and [elm.optimize] cannot both be enabled".into()
            ));
        }

        for (field, command) in [("[elm.command]", &self.elm.command), ("[css.command]", &self.css.command)] {
            if command.is_empty() {
                bail!(ConfigError::Validation(format!(
                    "{field} must have at least one element"
                )));
            }
        }

        for (field, pattern) in [
            ("[paths.elm]", &self.paths.elm),
            ("[paths.sass]", &self.paths.sass),
            ("[paths.static]", &self.paths.r#static),
        ] {
            GlobPattern::new(pattern).with_context(|| format!("{field} is not a valid glob"))?;
        }

        self.serve
            .interface
            .parse::<std::net::IpAddr>()
            .map_err(|_| {
                ConfigError::Validation(format!(
                    "[serve.interface] `{}` is not an IP address",
                    self.serve.interface
                ))
            })?;

        Ok(())
    }

    /// Ensure the first element of `command` resolves on `PATH`.
    pub fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        let Some(cmd) = command.first() else {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        };

        which::which(cmd).with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }
}
