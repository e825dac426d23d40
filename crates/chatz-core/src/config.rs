use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::markdown::{DEFAULT_ROUTE_PREFIX, RenderOptions};

/// Env var consulted when a profile has no `api_key`.
pub const API_KEY_ENV: &str = "CHATZ_API_KEY";
/// Env var consulted when a profile has no `csrf_token`.
pub const CSRF_TOKEN_ENV: &str = "CHATZ_CSRF_TOKEN";

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// New template comments and sections show up while the user's values win.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;
    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for chatz configuration and data directories.
    //!
    //! CHATZ_HOME resolution order:
    //! 1. CHATZ_HOME environment variable (if set)
    //! 2. ~/.config/chatz (default)

    use std::path::PathBuf;

    pub fn chatz_home() -> PathBuf {
        if let Ok(home) = std::env::var("CHATZ_HOME")
            && !home.is_empty()
        {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".chatz"),
            |h| h.join(".config").join("chatz"),
        )
    }

    pub fn config_path() -> PathBuf {
        chatz_home().join("config.toml")
    }

    /// One JSONL file per conversation lives here.
    pub fn history_dir() -> PathBuf {
        chatz_home().join("history")
    }

    pub fn logs_dir() -> PathBuf {
        chatz_home().join("logs")
    }

    pub fn local_store_path() -> PathBuf {
        chatz_home().join("local_storage.json")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "chatz_core=debug".
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One named endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiProfile {
    /// Base URL of the OpenAI-compatible API (e.g. "https://api.openai.com/v1")
    pub api_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model_name: String,
    /// Models last reported by the endpoint (`chatz models fetch --save`)
    pub available_models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub include_csrf_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    pub csrf_header: String,
    pub enabled: bool,
    /// Selectable by every signed-in user
    pub allow_for_all: bool,
    /// Used for anonymous sessions; at most one profile may set this
    pub is_guest_default: bool,
    pub widget_title: String,
    pub widget_icon: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub greeting_message: String,
}

impl ApiProfile {
    pub const DEFAULT_CSRF_HEADER: &str = "X-Frappe-CSRF-Token";
    pub const DEFAULT_WIDGET_TITLE: &str = "Chatz";
    pub const DEFAULT_GREETING: &str = "Hello! How can I help you today?";

    /// Returns the configured key, or `CHATZ_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty_owned(self.api_key.as_deref())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }

    /// Returns the configured CSRF token, or `CHATZ_CSRF_TOKEN`.
    pub fn resolved_csrf_token(&self) -> Option<String> {
        non_empty_owned(self.csrf_token.as_deref())
            .or_else(|| std::env::var(CSRF_TOKEN_ENV).ok().filter(|t| !t.is_empty()))
    }

    pub fn greeting(&self) -> &str {
        if self.greeting_message.trim().is_empty() {
            Self::DEFAULT_GREETING
        } else {
            &self.greeting_message
        }
    }

    pub fn title(&self) -> &str {
        if self.widget_title.trim().is_empty() {
            Self::DEFAULT_WIDGET_TITLE
        } else {
            &self.widget_title
        }
    }

    /// Checks the fields every request depends on.
    ///
    /// # Errors
    /// Returns an error naming the profile when the endpoint or model is
    /// missing, or the endpoint is not an absolute URL.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.api_endpoint.trim().is_empty() {
            bail!("API '{name}': api_endpoint is required");
        }
        Url::parse(&self.api_endpoint)
            .with_context(|| format!("API '{name}': invalid api_endpoint '{}'", self.api_endpoint))?;
        if self.model_name.trim().is_empty() {
            bail!("API '{name}': model_name is required");
        }
        Ok(())
    }
}

impl Default for ApiProfile {
    fn default() -> Self {
        Self {
            api_endpoint: String::new(),
            api_key: None,
            model_name: String::new(),
            available_models: Vec::new(),
            system_prompt: None,
            include_csrf_token: false,
            csrf_token: None,
            csrf_header: Self::DEFAULT_CSRF_HEADER.to_string(),
            enabled: true,
            allow_for_all: false,
            is_guest_default: false,
            widget_title: Self::DEFAULT_WIDGET_TITLE.to_string(),
            widget_icon: "comment".to_string(),
            primary_color: "#667eea".to_string(),
            secondary_color: "#764ba2".to_string(),
            greeting_message: Self::DEFAULT_GREETING.to_string(),
        }
    }
}

fn non_empty_owned(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(str::to_string)
}

/// A profile picked for a session, with its table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApi {
    pub name: String,
    pub profile: ApiProfile,
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Acting user; unset means guest operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_api: Option<String>,
    /// Prior messages sent with each request
    pub history_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_origin: Option<String>,
    pub route_prefix: String,
    pub logging: LoggingConfig,
    pub apis: BTreeMap<String, ApiProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: None,
            default_api: None,
            history_limit: Self::DEFAULT_HISTORY_LIMIT,
            page_origin: None,
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            logging: LoggingConfig::default(),
            apis: BTreeMap::new(),
        }
    }
}

impl Config {
    pub const DEFAULT_HISTORY_LIMIT: usize = 10;

    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn is_guest(&self) -> bool {
        self.user.as_deref().is_none_or(|u| u.trim().is_empty())
    }

    /// Validates every profile and the single-guest-default rule.
    pub fn validate(&self) -> Result<()> {
        for (name, profile) in &self.apis {
            profile.validate(name)?;
        }

        let guest_defaults: Vec<&str> = self
            .apis
            .iter()
            .filter(|(_, p)| p.is_guest_default)
            .map(|(name, _)| name.as_str())
            .collect();
        if guest_defaults.len() > 1 {
            bail!(
                "Only one API configuration can be the guest default (found: {})",
                guest_defaults.join(", ")
            );
        }
        Ok(())
    }

    /// Profiles the acting user may pick, ordered by widget title.
    pub fn available_apis(&self) -> Vec<(&str, &ApiProfile)> {
        let guest = self.is_guest();
        let mut apis: Vec<(&str, &ApiProfile)> = self
            .apis
            .iter()
            .filter(|(_, p)| p.enabled && (!guest || p.is_guest_default))
            .map(|(name, p)| (name.as_str(), p))
            .collect();
        apis.sort_by(|a, b| a.1.title().cmp(b.1.title()).then(a.0.cmp(b.0)));
        apis
    }

    /// Picks the profile for a session.
    ///
    /// Guests get the enabled guest default. Signed-in users get `selected`
    /// if it names an enabled profile, then `default_api`, then the first
    /// enabled `allow_for_all` profile by widget title.
    ///
    /// # Errors
    /// Returns an error when nothing matches.
    pub fn resolve_api(&self, selected: Option<&str>) -> Result<ResolvedApi> {
        let enabled = |name: &str| self.apis.get(name).filter(|p| p.enabled);

        if self.is_guest() {
            return self
                .apis
                .iter()
                .find(|(_, p)| p.enabled && p.is_guest_default)
                .map(|(name, p)| ResolvedApi {
                    name: name.clone(),
                    profile: p.clone(),
                })
                .context("No guest API configuration is available (set is_guest_default on one [apis] entry)");
        }

        for name in [selected, self.default_api.as_deref()].into_iter().flatten() {
            if let Some(profile) = enabled(name) {
                return Ok(ResolvedApi {
                    name: name.to_string(),
                    profile: profile.clone(),
                });
            }
        }

        self.available_apis()
            .into_iter()
            .find(|(_, p)| p.allow_for_all)
            .map(|(name, p)| ResolvedApi {
                name: name.to_string(),
                profile: p.clone(),
            })
            .context("No API configuration available. Add one under [apis] in config.toml")
    }

    /// Link rendering options derived from `page_origin` and `route_prefix`.
    pub fn render_options(&self) -> Result<RenderOptions> {
        let page_origin = match self.page_origin.as_deref().filter(|o| !o.trim().is_empty()) {
            Some(origin) => Some(
                Url::parse(origin).with_context(|| format!("Invalid page_origin '{origin}'"))?,
            ),
            None => None,
        };
        Ok(RenderOptions {
            page_origin,
            route_prefix: self.route_prefix.clone(),
        })
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Generates a fresh config TOML from Rust defaults.
    ///
    /// Used by `xtask update-default-config` to keep `default_config.toml`
    /// in sync with `Config::default()`.
    pub fn generate() -> Result<String> {
        use toml_edit::DocumentMut;

        let generated_toml = toml::to_string(&Config::default())
            .context("Failed to serialize default config to TOML")?;

        let mut doc: DocumentMut = default_config_template()
            .parse()
            .context("Failed to parse default config template")?;
        let generated_doc: DocumentMut = generated_toml
            .parse()
            .context("Failed to parse generated config")?;

        merge_items(doc.as_table_mut(), generated_doc.as_table());

        Ok(doc.to_string())
    }

    pub fn save_available_models(api: &str, models: &[String]) -> Result<()> {
        Self::save_available_models_to(&paths::config_path(), api, models)
    }

    /// Stores `available_models` for one profile, preserving comments.
    pub fn save_available_models_to(path: &Path, api: &str, models: &[String]) -> Result<()> {
        use toml_edit::{Array, DocumentMut, value};

        let user_config = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let contents = merge_with_template(&user_config)?;
        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        if doc.get("apis").and_then(|apis| apis.get(api)).is_none() {
            bail!("API '{api}' is not defined in {}", path.display());
        }

        let mut list = Array::new();
        for model in models {
            list.push(model.as_str());
        }
        doc["apis"][api]["available_models"] = value(list);

        Self::write_config(path, &doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        crate::fsutil::write_atomic(path, content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn profile(endpoint: &str, model: &str) -> ApiProfile {
        ApiProfile {
            api_endpoint: endpoint.to_string(),
            model_name: model.to_string(),
            ..ApiProfile::default()
        }
    }

    fn config_with(user: Option<&str>, apis: Vec<(&str, ApiProfile)>) -> Config {
        Config {
            user: user.map(str::to_string),
            apis: apis
                .into_iter()
                .map(|(name, p)| (name.to_string(), p))
                .collect(),
            ..Config::default()
        }
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.route_prefix, "/app/");
    }

    #[test]
    fn test_load_profile_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "user = \"bob\"\n\n[apis.local]\napi_endpoint = \"http://localhost:8080/v1\"\nmodel_name = \"llama\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        let api = &config.apis["local"];
        assert!(api.enabled);
        assert_eq!(api.csrf_header, "X-Frappe-CSRF-Token");
        assert_eq!(api.greeting(), "Hello! How can I help you today?");
        assert_eq!(api.primary_color, "#667eea");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_endpoint_and_model() {
        let err = profile("", "m").validate("a").unwrap_err();
        assert!(err.to_string().contains("api_endpoint is required"));
        let err = profile("https://x.io", " ").validate("a").unwrap_err();
        assert!(err.to_string().contains("model_name is required"));
        assert!(profile("not a url", "m").validate("a").is_err());
    }

    #[test]
    fn test_validate_single_guest_default() {
        let mut a = profile("https://a.io", "m");
        a.is_guest_default = true;
        let b = a.clone();
        let err = config_with(None, vec![("a", a), ("b", b)])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("found: a, b"));
    }

    #[test]
    fn test_resolve_guest_uses_guest_default() {
        let mut guest = profile("https://g.io", "m");
        guest.is_guest_default = true;
        let config = config_with(None, vec![("main", profile("https://a.io", "m")), ("guest", guest)]);

        assert_eq!(config.resolve_api(Some("main")).unwrap().name, "guest");
        assert_eq!(config.available_apis().len(), 1);
    }

    #[test]
    fn test_resolve_guest_without_default_fails() {
        let config = config_with(None, vec![("main", profile("https://a.io", "m"))]);
        assert!(config.resolve_api(None).is_err());
    }

    #[test]
    fn test_resolve_user_precedence() {
        let mut shared_b = profile("https://b.io", "m");
        shared_b.allow_for_all = true;
        shared_b.widget_title = "Beta".to_string();
        let mut shared_a = profile("https://a.io", "m");
        shared_a.allow_for_all = true;
        shared_a.widget_title = "Alpha".to_string();
        let mut disabled = profile("https://d.io", "m");
        disabled.enabled = false;

        let mut config = config_with(
            Some("bob"),
            vec![
                ("zeta", shared_b),
                ("omega", shared_a),
                ("off", disabled),
                ("mine", profile("https://m.io", "m")),
            ],
        );

        assert_eq!(config.resolve_api(Some("mine")).unwrap().name, "mine");
        assert_eq!(config.resolve_api(Some("off")).unwrap().name, "omega");
        assert_eq!(config.resolve_api(Some("missing")).unwrap().name, "omega");

        config.default_api = Some("zeta".to_string());
        assert_eq!(config.resolve_api(None).unwrap().name, "zeta");
    }

    #[test]
    fn test_available_apis_sorted_by_title() {
        let mut a = profile("https://a.io", "m");
        a.widget_title = "Zed".to_string();
        let mut b = profile("https://b.io", "m");
        b.widget_title = "Ace".to_string();
        let config = config_with(Some("bob"), vec![("a", a), ("b", b)]);

        let names: Vec<&str> = config.available_apis().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_render_options_parses_origin() {
        let config = Config {
            page_origin: Some("https://erp.example.com".to_string()),
            ..Config::default()
        };
        let options = config.render_options().unwrap();
        assert_eq!(
            options.page_origin.unwrap().host_str(),
            Some("erp.example.com")
        );

        let bad = Config {
            page_origin: Some("::nope".to_string()),
            ..Config::default()
        };
        assert!(bad.render_options().is_err());
    }

    #[test]
    fn test_init_creates_config_and_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        Config::init(&path).unwrap();
        let parsed = Config::load_from(&path).unwrap();
        assert_eq!(parsed, Config::default());

        assert!(Config::init(&path).is_err());
    }

    #[test]
    fn test_generate_matches_defaults() {
        let generated = Config::generate().unwrap();
        let parsed: Config = toml::from_str(&generated).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_save_available_models_preserves_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "# my settings\nuser = \"bob\"\n\n[apis.local]\n# local llama\napi_endpoint = \"http://localhost:8080/v1\"\nmodel_name = \"llama\"\n",
        )
        .unwrap();

        Config::save_available_models_to(&path, "local", &["a".to_string(), "b".to_string()])
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("# local llama"));
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.apis["local"].available_models, vec!["a", "b"]);
        assert_eq!(config.user.as_deref(), Some("bob"));

        assert!(Config::save_available_models_to(&path, "missing", &[]).is_err());
    }
}
