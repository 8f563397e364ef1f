//! Configuration management for MemoriGraph
//!
//! All configurable parameters in one place with environment variable overrides.
//! Everything has a default except the OpenAI API key, without which the
//! process refuses to start.

use anyhow::{bail, Result};
use std::env;
use tracing::info;

use crate::engine::{graphiti::DEFAULT_MAX_FACTS, EmbedderConfig, GraphitiConfig};
use crate::graph_store::Neo4jConfig;

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (empty = allow all)
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Whether to allow credentials
    pub allow_credentials: bool,
    /// Max age for preflight cache (seconds)
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(), // Empty = allow all origins
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string(), "X-Request-ID".to_string()],
            allow_credentials: false,
            max_age_seconds: 86400, // 24 hours
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl CorsConfig {
    fn from_source(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(origins) = lookup("MEMORIGRAPH_CORS_ORIGINS") {
            config.allowed_origins = split_list(&origins);
        }

        if let Some(methods) = lookup("MEMORIGRAPH_CORS_METHODS") {
            config.allowed_methods = split_list(&methods)
                .into_iter()
                .map(|m| m.to_uppercase())
                .collect();
        }

        if let Some(headers) = lookup("MEMORIGRAPH_CORS_HEADERS") {
            config.allowed_headers = split_list(&headers);
        }

        if let Some(val) = lookup("MEMORIGRAPH_CORS_CREDENTIALS") {
            config.allow_credentials = parse_flag(&val);
        }

        if let Some(val) = lookup("MEMORIGRAPH_CORS_MAX_AGE") {
            if let Ok(n) = val.parse() {
                config.max_age_seconds = n;
            }
        }

        config
    }

    /// Check if any origin restrictions are configured
    pub fn is_restricted(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    /// Convert to tower-http CorsLayer
    pub fn to_layer(&self) -> tower_http::cors::CorsLayer {
        use tower_http::cors::{AllowOrigin, Any, CorsLayer};

        let mut layer = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            layer = layer.allow_origin(Any);
        } else {
            let mut valid_origins = Vec::new();
            for origin_str in &self.allowed_origins {
                match origin_str.parse::<axum::http::HeaderValue>() {
                    Ok(origin) => valid_origins.push(origin),
                    Err(_) => tracing::warn!("CORS: Invalid origin '{}' - skipping", origin_str),
                }
            }

            if valid_origins.is_empty() {
                // Never fall back to permissive on a broken origin list
                tracing::error!(
                    "CORS: All {} configured origin(s) failed to parse. \
                     Rejecting all cross-origin requests. Fix MEMORIGRAPH_CORS_ORIGINS.",
                    self.allowed_origins.len()
                );
            }
            layer = layer.allow_origin(AllowOrigin::list(valid_origins));
        }

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        if methods.is_empty() {
            layer = layer.allow_methods(Any);
        } else {
            layer = layer.allow_methods(methods);
        }

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        if headers.is_empty() {
            layer = layer.allow_headers(Any);
        } else {
            layer = layer.allow_headers(headers);
        }

        // tower-http rejects credentials combined with a wildcard origin
        if self.allow_credentials {
            if self.is_restricted() {
                layer = layer.allow_credentials(true);
            } else {
                tracing::warn!("CORS: credentials ignored because all origins are allowed");
            }
        }

        layer.max_age(std::time::Duration::from_secs(self.max_age_seconds))
    }
}

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0)
    pub host: String,

    /// Bind port (default: 8000)
    pub port: u16,

    /// Maximum concurrent requests (default: 200)
    pub max_concurrent_requests: usize,

    /// Expose internal error messages in 500 responses
    pub debug: bool,

    /// Log level name, e.g. INFO or debug (default: INFO)
    pub log_level: String,

    pub cors: CorsConfig,

    pub neo4j: Neo4jConfig,

    pub engine: GraphitiConfig,
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup; empty values count as unset
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let Some(api_key) = get("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY must be set");
        };

        let neo4j_url = get_or("NEO4J_URL", "http://localhost:7474");
        if !(neo4j_url.starts_with("http://") || neo4j_url.starts_with("https://")) {
            bail!("NEO4J_URL must be an http(s) URL of the Neo4j HTTP API, got {neo4j_url}");
        }

        let mut config = Self {
            host: get_or("MEMORIGRAPH_HOST", "0.0.0.0"),
            port: 8000,
            max_concurrent_requests: 200,
            debug: get("DEBUG").as_deref().map(parse_flag).unwrap_or(false),
            log_level: get_or("LOG_LEVEL", "INFO"),
            cors: CorsConfig::from_source(&get),
            neo4j: Neo4jConfig {
                url: neo4j_url,
                username: get_or("NEO4J_USERNAME", "neo4j"),
                password: get_or("NEO4J_PASSWORD", "password"),
                database: get_or("NEO4J_DATABASE", "neo4j"),
            },
            engine: GraphitiConfig {
                base_url: get_or("GRAPHITI_URL", "http://localhost:8001"),
                llm_model: get_or("OPENAI_MODEL", "gpt-4"),
                max_facts: DEFAULT_MAX_FACTS,
                embedder: EmbedderConfig {
                    base_url: get_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                    api_key,
                    model: get_or("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),
                },
            },
        };

        if let Some(val) = get("MEMORIGRAPH_PORT") {
            match val.parse() {
                Ok(port) => config.port = port,
                Err(_) => bail!("MEMORIGRAPH_PORT is not a valid port: {val}"),
            }
        }

        if let Some(val) = get("GRAPHITI_MAX_FACTS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.engine.max_facts = n,
                _ => bail!("GRAPHITI_MAX_FACTS must be a positive integer, got {val}"),
            }
        }

        if let Some(val) = get("MEMORIGRAPH_MAX_CONCURRENT") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_concurrent_requests = n.max(1);
            }
        }

        Ok(config)
    }

    /// Log the current configuration (secrets redacted)
    pub fn log(&self) {
        info!("📋 Configuration:");
        info!("   Bind: {}:{}", self.host, self.port);
        info!("   Debug: {}", self.debug);
        info!("   Log level: {}", self.log_level);
        info!("   Max concurrent: {}", self.max_concurrent_requests);
        if self.cors.is_restricted() {
            info!("   CORS origins: {:?}", self.cors.allowed_origins);
        } else {
            info!("   CORS: Permissive (all origins allowed)");
        }
        info!(
            "   Neo4j: {} (database: {}, user: {})",
            self.neo4j.url, self.neo4j.database, self.neo4j.username
        );
        info!(
            "   Knowledge engine: {} (model: {}, max facts: {})",
            self.engine.base_url, self.engine.llm_model, self.engine.max_facts
        );
        info!(
            "   Embeddings: {} (model: {}, key: {})",
            self.engine.embedder.base_url,
            self.engine.embedder.model,
            redact(&self.engine.embedder.api_key)
        );
    }
}

fn redact(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{tail}")
    }
}

/// Environment variable documentation
pub fn print_env_help() {
    println!("MemoriGraph Configuration Environment Variables:");
    println!();
    println!("  MEMORIGRAPH_HOST           - Bind address (default: 0.0.0.0)");
    println!("  MEMORIGRAPH_PORT           - Server port (default: 8000)");
    println!("  MEMORIGRAPH_MAX_CONCURRENT - Max concurrent requests (default: 200)");
    println!("  DEBUG                      - Expose internal error messages (default: false)");
    println!("  LOG_LEVEL                  - Log level; RUST_LOG is used when unset (default: INFO)");
    println!("  MEMORIGRAPH_LOG_DIR        - Directory for app and error log files, \"off\" to disable (default: logs)");
    println!();
    println!("Graph database:");
    println!("  NEO4J_URL                  - Neo4j HTTP API URL (default: http://localhost:7474)");
    println!("  NEO4J_USERNAME             - (default: neo4j)");
    println!("  NEO4J_PASSWORD             - (default: password)");
    println!("  NEO4J_DATABASE             - (default: neo4j)");
    println!();
    println!("Knowledge engine:");
    println!("  GRAPHITI_URL               - Engine service URL (default: http://localhost:8001)");
    println!("  GRAPHITI_MAX_FACTS         - Facts requested per search (default: 10)");
    println!("  OPENAI_API_KEY             - Required");
    println!("  OPENAI_BASE_URL            - Embeddings API (default: https://api.openai.com/v1)");
    println!("  OPENAI_MODEL               - Extraction model (default: gpt-4)");
    println!("  OPENAI_EMBEDDING_MODEL     - (default: text-embedding-3-small)");
    println!();
    println!("CORS Configuration:");
    println!("  MEMORIGRAPH_CORS_ORIGINS     - Comma-separated allowed origins (default: all)");
    println!("  MEMORIGRAPH_CORS_METHODS     - Comma-separated allowed methods (default: GET,POST,DELETE,OPTIONS)");
    println!("  MEMORIGRAPH_CORS_HEADERS     - Comma-separated allowed headers (default: Content-Type,X-Request-ID)");
    println!("  MEMORIGRAPH_CORS_CREDENTIALS - Allow credentials true/false (default: false)");
    println!("  MEMORIGRAPH_CORS_MAX_AGE     - Preflight cache seconds (default: 86400)");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_concurrent_requests, 200);
        assert!(!config.debug);
        assert_eq!(config.neo4j.url, "http://localhost:7474");
        assert_eq!(config.neo4j.database, "neo4j");
        assert_eq!(config.engine.llm_model, "gpt-4");
        assert_eq!(config.engine.max_facts, 10);
        assert_eq!(config.engine.embedder.model, "text-embedding-3-small");
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        assert!(load(&[]).is_err());
        assert!(load(&[("OPENAI_API_KEY", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MEMORIGRAPH_PORT", "9000"),
            ("DEBUG", "True"),
            ("NEO4J_URL", "https://graph.internal:7473"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.debug);
        assert_eq!(config.neo4j.url, "https://graph.internal:7473");
        assert_eq!(config.engine.llm_model, "gpt-4o-mini");
    }

    #[test]
    fn test_rejects_bolt_and_bad_port() {
        assert!(load(&[("OPENAI_API_KEY", "k"), ("NEO4J_URL", "bolt://localhost:7687")]).is_err());
        assert!(load(&[("OPENAI_API_KEY", "k"), ("MEMORIGRAPH_PORT", "eighty")]).is_err());
    }

    #[test]
    fn test_max_facts() {
        let config = load(&[("OPENAI_API_KEY", "k"), ("GRAPHITI_MAX_FACTS", "50")]).unwrap();
        assert_eq!(config.engine.max_facts, 50);
        assert!(load(&[("OPENAI_API_KEY", "k"), ("GRAPHITI_MAX_FACTS", "0")]).is_err());
        assert!(load(&[("OPENAI_API_KEY", "k"), ("GRAPHITI_MAX_FACTS", "all")]).is_err());
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("short"), "****");
        assert_eq!(redact("sk-abcdefgh1234"), "****1234");
    }

    #[test]
    fn test_cors_default_is_permissive() {
        let cors = CorsConfig::default();
        assert!(!cors.is_restricted());
        assert!(!cors.allowed_methods.is_empty());
    }

    #[test]
    fn test_cors_from_source() {
        let config = load(&[
            ("OPENAI_API_KEY", "k"),
            ("MEMORIGRAPH_CORS_ORIGINS", "https://a.example, https://b.example"),
            ("MEMORIGRAPH_CORS_CREDENTIALS", "1"),
        ])
        .unwrap();
        assert_eq!(config.cors.allowed_origins.len(), 2);
        assert!(config.cors.allow_credentials);
        let _layer = config.cors.to_layer();
    }

    #[test]
    fn test_cors_credentials_without_origins_does_not_panic() {
        let cors = CorsConfig {
            allow_credentials: true,
            ..Default::default()
        };
        let _layer = cors.to_layer();
    }
}
