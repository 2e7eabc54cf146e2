use pgresource::{EngineConfig, PoolSettings, ResourceBinding, ResourceRegistry, SchemaCache};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Route names the server mounts itself.
const RESERVED_ROUTES: &[&str] = &["healthz"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: PathBuf,
    pub file: ConfigFile,
}

impl AppConfig {
    pub fn load(config_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            anyhow::anyhow!(
                "failed to read config file {}: {e}",
                config_path.display()
            )
        })?;

        let file = ConfigFile::parse(&raw).map_err(|e| {
            anyhow::anyhow!("invalid config file {}: {e:#}", config_path.display())
        })?;

        Ok(Self { config_path, file })
    }

    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let engine = &self.file.engine;
        let mut config = EngineConfig::default();
        if let Some(owner) = engine.owner_id()? {
            config = config.with_default_owner(owner);
        }
        if let Some(max_limit) = engine.max_limit {
            config = config.with_max_limit(max_limit);
        }
        Ok(config)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        let mut settings = PoolSettings::default();
        if let Some(size) = self.file.database.pool_size {
            settings.max_size = size;
        }
        settings
    }

    pub fn schema_cache(&self) -> SchemaCache {
        SchemaCache::new(Duration::from_secs(self.file.engine.schema_cache_ttl_secs))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.file
            .server
            .request_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Mount every configured resource on a fresh registry.
    pub fn registry(&self) -> anyhow::Result<ResourceRegistry> {
        let mut registry = ResourceRegistry::new(self.engine_config()?, Arc::new(self.schema_cache()));
        for resource in &self.file.resources {
            registry.mount(resource.binding()?)?;
        }
        Ok(registry)
    }

    pub fn resource(&self, name: &str) -> anyhow::Result<&ResourceConfig> {
        self.file
            .resources
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| anyhow::anyhow!("no resource named '{name}' in {}", self.config_path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub pool_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSection {
    #[serde(default)]
    pub default_owner_id: Option<String>,
    /// Zero disables the schema cache.
    #[serde(default)]
    pub schema_cache_ttl_secs: u64,
    #[serde(default)]
    pub max_limit: Option<i64>,
}

impl EngineSection {
    fn owner_id(&self) -> anyhow::Result<Option<Uuid>> {
        let Some(raw) = self.default_owner_id.as_deref() else {
            return Ok(None);
        };
        Uuid::parse_str(raw.trim())
            .map(Some)
            .map_err(|e| anyhow::anyhow!("engine.default_owner_id is not a UUID ({raw}): {e}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub search_columns: Vec<String>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl ResourceConfig {
    pub fn binding(&self) -> anyhow::Result<ResourceBinding> {
        let binding = ResourceBinding::new(self.name.clone(), &self.table)
            .map_err(|e| anyhow::anyhow!("resource '{}': {e}", self.name))?;
        Ok(binding
            .with_primary_key(self.primary_key.clone())
            .with_search_columns(self.search_columns.iter().cloned()))
    }
}

impl ConfigFile {
    /// Parse, expand `${VAR}` references and validate.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let mut file: ConfigFile = toml::from_str(raw)?;
        file.expand_env()?;
        file.validate()?;
        Ok(file)
    }

    fn expand_env(&mut self) -> anyhow::Result<()> {
        self.database.url = expand_env_vars(&self.database.url)?;
        self.server.bind = expand_env_vars(&self.server.bind)?;

        if let Some(owner) = self.engine.default_owner_id.as_mut() {
            *owner = expand_env_vars(owner)?;
        }

        for r in &mut self.resources {
            r.table = expand_env_vars(&r.table)?;
        }

        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.version.trim() != "1" {
            anyhow::bail!("unsupported config version: {}", self.version);
        }

        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url must not be empty");
        }
        if self.database.pool_size == Some(0) {
            anyhow::bail!("database.pool_size must be greater than zero");
        }

        self.engine.owner_id()?;
        if let Some(max_limit) = self.engine.max_limit {
            if max_limit <= 0 {
                anyhow::bail!("engine.max_limit must be positive");
            }
        }

        if self.resources.is_empty() {
            anyhow::bail!("at least one [[resources]] entry is required");
        }

        let mut seen = std::collections::HashSet::<&str>::new();
        for r in &self.resources {
            if RESERVED_ROUTES.contains(&r.name.as_str()) {
                anyhow::bail!("resources.name '{}' is reserved", r.name);
            }
            if !seen.insert(r.name.as_str()) {
                anyhow::bail!("duplicate resources.name: {}", r.name);
            }
            if r.primary_key.trim().is_empty() {
                anyhow::bail!("resources.primary_key must not be empty (resource: {})", r.name);
            }
            r.binding()?;
        }

        Ok(())
    }
}

fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            out.push(c);
            continue;
        }
        chars.next();

        let mut key = String::new();
        let mut closed = false;
        for ch in chars.by_ref() {
            if ch == '}' {
                closed = true;
                break;
            }
            key.push(ch);
        }

        if !closed {
            anyhow::bail!("unterminated env var reference: ${{{key}}}");
        }
        if key.is_empty() {
            anyhow::bail!("invalid env var reference: ${{}}");
        }

        let v = std::env::var(&key)
            .map_err(|_| anyhow::anyhow!("missing env var for config expansion: {key}"))?;
        out.push_str(&v);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = "1"

[database]
url = "postgres://localhost/app"
pool_size = 4

[server]
request_timeout_ms = 2500

[engine]
default_owner_id = "00000000-0000-0000-0000-000000000001"
schema_cache_ttl_secs = 30
max_limit = 500

[[resources]]
name = "prompts"
table = "prompts"
search_columns = ["title", "body"]

[[resources]]
name = "gallery-items"
table = "media.gallery_items"
primary_key = "item_id"
"#;

    fn app(raw: &str) -> AppConfig {
        AppConfig {
            config_path: PathBuf::from("pgresource.toml"),
            file: ConfigFile::parse(raw).unwrap(),
        }
    }

    #[test]
    fn parses_full_config() {
        let config = app(SAMPLE);
        assert_eq!(config.file.server.bind, "127.0.0.1:8080");
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.pool_settings().max_size, 4);
        assert_eq!(config.schema_cache().ttl(), Duration::from_secs(30));

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.max_limit, Some(500));
        assert_eq!(
            engine.default_owner_id.map(|u| u.to_string()).as_deref(),
            Some("00000000-0000-0000-0000-000000000001")
        );

        let registry = config.registry().unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["gallery-items", "prompts"]);

        let gallery = config.resource("gallery-items").unwrap().binding().unwrap();
        assert_eq!(gallery.primary_key, "item_id");
        assert_eq!(gallery.table.to_sql(), "media.gallery_items");
        assert!(config.resource("missing").is_err());
    }

    #[test]
    fn defaults_are_conservative() {
        let config = app(
            r#"
version = "1"
[database]
url = "postgres://localhost/app"
[[resources]]
name = "items"
table = "items"
"#,
        );
        assert_eq!(config.request_timeout(), None);
        assert!(!config.schema_cache().is_enabled());
        assert_eq!(config.engine_config().unwrap(), EngineConfig::default());
        let items = config.resource("items").unwrap();
        assert_eq!(items.primary_key, "id");
        assert!(items.search_columns.is_empty());
    }

    #[test]
    fn expands_env_vars() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("PGRESOURCE_TEST_DB_URL", "postgres://env/db") };
        let config = app(
            r#"
version = "1"
[database]
url = "${PGRESOURCE_TEST_DB_URL}"
[[resources]]
name = "items"
table = "items"
"#,
        );
        assert_eq!(config.file.database.url, "postgres://env/db");

        assert!(expand_env_vars("${PGRESOURCE_TEST_UNSET_VAR}").is_err());
        assert!(expand_env_vars("${unterminated").is_err());
        assert!(expand_env_vars("${}").is_err());
        assert_eq!(expand_env_vars("plain $ text").unwrap(), "plain $ text");
    }

    #[test]
    fn rejects_invalid_configs() {
        let base = |resources: &str, extra: &str| {
            format!(
                "version = \"1\"\n[database]\nurl = \"postgres://x\"\n{extra}\n{resources}"
            )
        };
        let items = "[[resources]]\nname = \"items\"\ntable = \"items\"\n";

        assert!(ConfigFile::parse(&base("", "")).is_err());
        assert!(ConfigFile::parse(&base(&format!("{items}{items}"), "")).is_err());
        assert!(ConfigFile::parse(&base("[[resources]]\nname = \"a/b\"\ntable = \"t\"\n", "")).is_err());
        assert!(ConfigFile::parse(&base("[[resources]]\nname = \"healthz\"\ntable = \"t\"\n", "")).is_err());
        assert!(ConfigFile::parse(&base("[[resources]]\nname = \"x\"\ntable = \"t; drop\"\n", "")).is_err());
        assert!(ConfigFile::parse(&base(items, "[engine]\ndefault_owner_id = \"nope\"")).is_err());
        assert!(ConfigFile::parse(&base(items, "[engine]\nmax_limit = 0")).is_err());
        assert!(ConfigFile::parse(&base(items, "")).is_ok());
        assert!(ConfigFile::parse(&base(items, "").replace("version = \"1\"", "version = \"2\"")).is_err());
    }
}
