/// Tunable constants for a [`Database`](crate::database::Database) instance.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Result cap applied when a query doesn't specify its own `limit`.
    pub default_query_limit: usize,
    /// Bound on `extends` chain traversal depth (cycle guard).
    pub max_inheritance_depth: usize,
    /// Bound on re-entrant automation firing depth (cycle guard).
    pub max_automation_depth: usize,
    /// Whether opening a `Database` seeds the bootstrap nodes automatically.
    pub bootstrap_on_open: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_query_limit: 500,
            max_inheritance_depth: 16,
            max_automation_depth: 16,
            bootstrap_on_open: true,
        }
    }
}

impl DatabaseConfig {
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct DatabaseConfigBuilder {
    inner: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    pub fn default_query_limit(mut self, limit: usize) -> Self {
        self.inner.default_query_limit = limit;
        self
    }

    pub fn max_inheritance_depth(mut self, depth: usize) -> Self {
        self.inner.max_inheritance_depth = depth;
        self
    }

    pub fn max_automation_depth(mut self, depth: usize) -> Self {
        self.inner.max_automation_depth = depth;
        self
    }

    pub fn bootstrap_on_open(mut self, enabled: bool) -> Self {
        self.inner.bootstrap_on_open = enabled;
        self
    }

    pub fn build(self) -> DatabaseConfig {
        self.inner
    }
}
