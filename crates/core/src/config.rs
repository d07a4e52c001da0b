//! Environment knobs.

/// Entry-point group consulted when resolving the default lookup.
pub const DEFAULT_GROUP: &str = "lookup.default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    /// `LOOKUPS_DEFAULT_GROUP`
    pub default_group: String,
    /// `LOOKUPS_NOTIFY_INLINE`: ignore configured executors and notify on the
    /// mutating thread.
    pub notify_inline: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self { default_group: DEFAULT_GROUP.to_string(), notify_inline: false }
    }
}

impl LookupConfig {
    pub fn from_env() -> Self {
        let default_group = std::env::var("LOOKUPS_DEFAULT_GROUP")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GROUP.to_string());
        let notify_inline = std::env::var("LOOKUPS_NOTIFY_INLINE")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { default_group, notify_inline }
    }
}
