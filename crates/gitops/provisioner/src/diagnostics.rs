//! Warning sink for tolerated configuration problems
//!
//! Deprecated fields and auto-corrected values never fail a pass. They are
//! logged through `tracing` and collected so callers (and tests) can inspect
//! what was corrected.

/// A tolerated configuration problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Inline `password` set on a V1 datasource
    DeprecatedPassword { datasource: String },

    /// Inline `basicAuthPassword` set on a V1 datasource
    DeprecatedBasicAuthPassword { datasource: String },

    /// Document uses the legacy (apiVersion 0) schema
    LegacySchema { source: String },

    /// Access mode was not `direct` or `proxy` and was replaced by `proxy`
    InvalidAccess { datasource: String, value: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::DeprecatedPassword { datasource } => write!(
                f,
                "[Deprecated] the use of password field is deprecated, use secureJsonData.password (datasource {datasource})"
            ),
            Warning::DeprecatedBasicAuthPassword { datasource } => write!(
                f,
                "[Deprecated] the use of basicAuthPassword field is deprecated, use secureJsonData.basicAuthPassword (datasource {datasource})"
            ),
            Warning::LegacySchema { source } => write!(
                f,
                "[Deprecated] the provisioning config is outdated, please upgrade ({source})"
            ),
            Warning::InvalidAccess { datasource, value } => write!(
                f,
                "invalid access value {value:?} on datasource {datasource}, using 'proxy' instead"
            ),
        }
    }
}

/// Collects warnings emitted during one normalization/validation pass
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and log it
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(warning = %warning, "provisioning config warning");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
