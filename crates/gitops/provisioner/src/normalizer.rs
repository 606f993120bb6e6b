//! Schema normalization
//!
//! Configuration arrives in two schema generations, selected by the leading
//! `apiVersion` field:
//!
//! - **0 (legacy)**: flat snake_case scalars used verbatim
//! - **>= 1 (current)**: camelCase fields, every scalar a [`ValueCell`]
//!   interpolated against the environment
//!
//! Both decode into their own variant of a tagged union and converge on
//! [`CanonicalResourceSpec`]. Dashboards carry a free-form model and are
//! normalized separately; their `$variables` are template syntax and are
//! never interpolated.

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::SchemaError;
use crate::values::{
    bool_cell, int_cell, interpolate_json, string_cell, Environment, ProcessEnvironment,
    RawScalar, ValueCell,
};
use gitops_types::{CanonicalResourceSpec, DeleteIntent, ResourceKind, TenantId};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parse `raw` as JSON (when it looks like JSON) or YAML.
///
/// Returns `None` for an empty or null document.
fn parse_tree(raw: &[u8], api_version: i64) -> Result<Option<Value>, SchemaError> {
    let decode_err = |reason: String| SchemaError::Decode {
        api_version,
        reason,
    };

    let first = raw.iter().find(|b| !b.is_ascii_whitespace());
    let tree = match first {
        None => return Ok(None),
        Some(b'{') | Some(b'[') => {
            serde_json::from_slice::<Value>(raw).map_err(|e| decode_err(e.to_string()))?
        }
        Some(_) => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_slice(raw).map_err(|e| decode_err(e.to_string()))?;
            serde_json::to_value(yaml).map_err(|e| decode_err(e.to_string()))?
        }
    };

    Ok(if tree.is_null() { None } else { Some(tree) })
}

/// Read the `apiVersion` probe field, falling back to `declared` when the
/// field is absent.
fn probe_tree(tree: Option<&Value>, declared: i64) -> Result<i64, SchemaError> {
    let version = match tree.and_then(|t| t.get("apiVersion")) {
        None | Some(Value::Null) => declared,
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| SchemaError::InvalidApiVersion(n.to_string()))?,
        Some(other) => return Err(SchemaError::InvalidApiVersion(other.to_string())),
    };

    if version < 0 {
        return Err(SchemaError::NegativeApiVersion(version));
    }
    Ok(version)
}

/// Effective schema version of a raw document
pub fn probe_api_version(raw: &[u8], declared: i64) -> Result<i64, SchemaError> {
    if declared < 0 {
        return Err(SchemaError::NegativeApiVersion(declared));
    }
    let tree = parse_tree(raw, declared)?;
    probe_tree(tree.as_ref(), declared)
}

fn decode<T: DeserializeOwned>(tree: Value, api_version: i64) -> Result<T, SchemaError> {
    serde_json::from_value(tree).map_err(|e| SchemaError::Decode {
        api_version,
        reason: e.to_string(),
    })
}

/// Legacy datasource entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatasourceV0 {
    pub org_id: i64,
    pub version: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub access: String,
    pub url: String,
    pub password: String,
    pub user: String,
    pub database: String,
    pub basic_auth: bool,
    pub basic_auth_user: String,
    pub basic_auth_password: String,
    pub with_credentials: bool,
    pub is_default: bool,
    pub json_data: Option<serde_json::Map<String, Value>>,
    pub secure_json_data: Option<BTreeMap<String, String>>,
    pub editable: bool,
}

/// Current-schema datasource entry; scalars are still uninterpolated
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatasourceV1 {
    pub org_id: Option<RawScalar>,
    pub version: Option<RawScalar>,
    pub name: Option<RawScalar>,
    #[serde(rename = "type")]
    pub type_name: Option<RawScalar>,
    pub access: Option<RawScalar>,
    pub url: Option<RawScalar>,
    pub password: Option<RawScalar>,
    pub user: Option<RawScalar>,
    pub database: Option<RawScalar>,
    pub basic_auth: Option<RawScalar>,
    pub basic_auth_user: Option<RawScalar>,
    pub basic_auth_password: Option<RawScalar>,
    pub with_credentials: Option<RawScalar>,
    pub is_default: Option<RawScalar>,
    pub json_data: Option<Value>,
    pub secure_json_data: Option<BTreeMap<String, RawScalar>>,
    pub editable: Option<RawScalar>,
    /// Exported instances write `readOnly` instead of `editable`
    pub read_only: Option<RawScalar>,
    pub uid: Option<RawScalar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeleteV0 {
    pub org_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteV1 {
    pub org_id: Option<RawScalar>,
    pub name: Option<RawScalar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigsV0 {
    pub datasources: Option<Vec<DatasourceV0>>,
    pub delete_datasources: Option<Vec<DeleteV0>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigsV1 {
    pub datasources: Option<Vec<DatasourceV1>>,
    pub delete_datasources: Option<Vec<DeleteV1>>,
}

/// A whole configuration file, keyed by its schema generation
#[derive(Debug, Clone)]
pub enum ConfigDocument {
    Legacy(ConfigsV0),
    Current { api_version: i64, configs: ConfigsV1 },
}

/// A single resource payload, keyed by kind and schema generation
#[derive(Debug, Clone)]
pub enum ResourceDocument {
    LegacyDatasource(DatasourceV0),
    Datasource(Box<DatasourceV1>),
    Dashboard(serde_json::Map<String, Value>),
}

/// Output of normalizing a configuration file
#[derive(Debug, Clone, Default)]
pub struct NormalizedDocument {
    pub api_version: i64,
    pub upserts: Vec<CanonicalResourceSpec>,
    pub deletes: Vec<DeleteIntent>,
}

impl ConfigDocument {
    /// Decode a configuration file; a missing `apiVersion` means `declared`
    pub fn parse(raw: &[u8], declared: i64) -> Result<Self, SchemaError> {
        if declared < 0 {
            return Err(SchemaError::NegativeApiVersion(declared));
        }
        let tree = parse_tree(raw, declared)?;
        let api_version = probe_tree(tree.as_ref(), declared)?;

        let Some(tree) = tree else {
            return Ok(if api_version > 0 {
                ConfigDocument::Current {
                    api_version,
                    configs: ConfigsV1::default(),
                }
            } else {
                ConfigDocument::Legacy(ConfigsV0::default())
            });
        };

        if api_version > 0 {
            Ok(ConfigDocument::Current {
                api_version,
                configs: decode(tree, api_version)?,
            })
        } else {
            Ok(ConfigDocument::Legacy(decode(tree, api_version)?))
        }
    }

    pub fn api_version(&self) -> i64 {
        match self {
            ConfigDocument::Legacy(_) => 0,
            ConfigDocument::Current { api_version, .. } => *api_version,
        }
    }
}

impl ResourceDocument {
    /// Decode one resource payload of `kind`
    pub fn parse(kind: ResourceKind, raw: &[u8], declared: i64) -> Result<Self, SchemaError> {
        if declared < 0 {
            return Err(SchemaError::NegativeApiVersion(declared));
        }
        let tree = parse_tree(raw, declared)?;
        let api_version = probe_tree(tree.as_ref(), declared)?;
        // an empty payload decodes as zero-valued fields at the probed version
        let Some(tree) = tree else {
            return Ok(match kind {
                ResourceKind::Dashboard => ResourceDocument::Dashboard(serde_json::Map::new()),
                ResourceKind::Datasource if api_version > 0 => {
                    ResourceDocument::Datasource(Box::default())
                }
                ResourceKind::Datasource => {
                    ResourceDocument::LegacyDatasource(DatasourceV0::default())
                }
            });
        };

        match kind {
            ResourceKind::Dashboard => match tree {
                Value::Object(model) => Ok(ResourceDocument::Dashboard(model)),
                other => Err(SchemaError::Decode {
                    api_version,
                    reason: format!("dashboard must be an object, got {}", type_name(&other)),
                }),
            },
            ResourceKind::Datasource if api_version > 0 => {
                Ok(ResourceDocument::Datasource(Box::new(decode(tree, api_version)?)))
            }
            ResourceKind::Datasource => {
                Ok(ResourceDocument::LegacyDatasource(decode(tree, api_version)?))
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Maps raw documents to canonical specs
#[derive(Clone)]
pub struct Normalizer {
    env: Arc<dyn Environment>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnvironment))
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }

    /// Normalize one versioned resource payload.
    ///
    /// `declared_api_version` applies when the payload has no `apiVersion`
    /// of its own.
    pub fn normalize(
        &self,
        kind: ResourceKind,
        raw: &[u8],
        declared_api_version: i64,
        diagnostics: &mut Diagnostics,
    ) -> Result<CanonicalResourceSpec, SchemaError> {
        match ResourceDocument::parse(kind, raw, declared_api_version)? {
            ResourceDocument::LegacyDatasource(ds) => Ok(legacy_to_spec(ds)),
            ResourceDocument::Datasource(ds) => {
                self.current_to_spec(&ds, true, diagnostics)
                    .map_err(|reason| SchemaError::Decode {
                        api_version: declared_api_version.max(1),
                        reason,
                    })
            }
            ResourceDocument::Dashboard(model) => dashboard_to_spec(model),
        }
    }

    /// Normalize a whole configuration file (upserts and delete intents)
    pub fn normalize_document(
        &self,
        raw: &[u8],
        declared_api_version: i64,
        source: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<NormalizedDocument, SchemaError> {
        let document = ConfigDocument::parse(raw, declared_api_version)?;
        let api_version = document.api_version();

        match document {
            ConfigDocument::Legacy(configs) => {
                diagnostics.warn(Warning::LegacySchema {
                    source: source.to_string(),
                });
                Ok(NormalizedDocument {
                    api_version,
                    upserts: configs
                        .datasources
                        .unwrap_or_default()
                        .into_iter()
                        .map(legacy_to_spec)
                        .collect(),
                    deletes: configs
                        .delete_datasources
                        .unwrap_or_default()
                        .into_iter()
                        .map(|d| DeleteIntent {
                            tenant_id: TenantId::new(d.org_id),
                            name: d.name,
                        })
                        .collect(),
                })
            }
            ConfigDocument::Current { configs, .. } => {
                let decode_err = |reason: String| SchemaError::Decode {
                    api_version,
                    reason,
                };

                let upserts = configs
                    .datasources
                    .unwrap_or_default()
                    .iter()
                    .map(|ds| self.current_to_spec(ds, false, diagnostics))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(decode_err)?;

                let deletes = configs
                    .delete_datasources
                    .unwrap_or_default()
                    .iter()
                    .map(|d| {
                        let org = int_cell(d.org_id.as_ref(), self.env.as_ref())?;
                        Ok(DeleteIntent {
                            tenant_id: TenantId::new(org.resolved),
                            name: string_cell(d.name.as_ref(), self.env.as_ref()).resolved,
                        })
                    })
                    .collect::<Result<Vec<_>, String>>()
                    .map_err(decode_err)?;

                Ok(NormalizedDocument {
                    api_version,
                    upserts,
                    deletes,
                })
            }
        }
    }

    fn current_to_spec(
        &self,
        ds: &DatasourceV1,
        editable_default: bool,
        diagnostics: &mut Diagnostics,
    ) -> Result<CanonicalResourceSpec, String> {
        let env = self.env.as_ref();
        let text = |input: &Option<RawScalar>| string_cell(input.as_ref(), env).resolved;
        let flag = |input: &Option<RawScalar>| bool_cell(input.as_ref(), env).map(|c| c.resolved);

        let name = text(&ds.name);
        let password: ValueCell<String> = string_cell(ds.password.as_ref(), env);
        let basic_auth_password: ValueCell<String> =
            string_cell(ds.basic_auth_password.as_ref(), env);

        // raw, not resolved: a variable that expands to nothing is still a configured field
        if password.is_configured() {
            diagnostics.warn(Warning::DeprecatedPassword {
                datasource: name.clone(),
            });
        }
        if basic_auth_password.is_configured() {
            diagnostics.warn(Warning::DeprecatedBasicAuthPassword {
                datasource: name.clone(),
            });
        }

        let editable = match (&ds.editable, &ds.read_only) {
            (Some(_), _) => flag(&ds.editable)?,
            (None, Some(_)) => !flag(&ds.read_only)?,
            (None, None) => editable_default,
        };

        let json_data = match ds.json_data.as_ref().map(|v| interpolate_json(v, env)) {
            None | Some(Value::Null) => serde_json::Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => return Err(format!("jsonData must be an object, got {}", type_name(&other))),
        };

        let secure_json_data = ds
            .secure_json_data
            .as_ref()
            .map(|secrets| {
                secrets
                    .iter()
                    .map(|(k, v)| (k.clone(), string_cell(Some(v), env).resolved))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CanonicalResourceSpec {
            kind: ResourceKind::Datasource,
            tenant_id: TenantId::new(int_cell(ds.org_id.as_ref(), env)?.resolved),
            uid: text(&ds.uid),
            name,
            type_name: text(&ds.type_name),
            access: text(&ds.access),
            url: text(&ds.url),
            user: text(&ds.user),
            password: password.resolved,
            database: text(&ds.database),
            basic_auth: flag(&ds.basic_auth)?,
            basic_auth_user: text(&ds.basic_auth_user),
            basic_auth_password: basic_auth_password.resolved,
            with_credentials: flag(&ds.with_credentials)?,
            json_data,
            secure_json_data,
            is_default: flag(&ds.is_default)?,
            editable,
            version: int_cell(ds.version.as_ref(), env)?.resolved,
        })
    }
}

fn legacy_to_spec(ds: DatasourceV0) -> CanonicalResourceSpec {
    CanonicalResourceSpec {
        kind: ResourceKind::Datasource,
        tenant_id: TenantId::new(ds.org_id),
        uid: String::new(),
        name: ds.name,
        type_name: ds.type_name,
        access: ds.access,
        url: ds.url,
        user: ds.user,
        password: ds.password,
        database: ds.database,
        basic_auth: ds.basic_auth,
        basic_auth_user: ds.basic_auth_user,
        basic_auth_password: ds.basic_auth_password,
        with_credentials: ds.with_credentials,
        json_data: ds.json_data.unwrap_or_default(),
        secure_json_data: ds.secure_json_data.unwrap_or_default(),
        is_default: ds.is_default,
        editable: ds.editable,
        version: ds.version,
    }
}

fn dashboard_to_spec(
    mut model: serde_json::Map<String, Value>,
) -> Result<CanonicalResourceSpec, SchemaError> {
    let decode_err = |reason: &str| SchemaError::Decode {
        api_version: 1,
        reason: reason.to_string(),
    };

    let title = match model.get("title") {
        Some(Value::String(t)) if !t.is_empty() => t.clone(),
        _ => return Err(decode_err("dashboard has no title")),
    };
    let uid = match model.get("uid") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(u)) => u.clone(),
        Some(_) => return Err(decode_err("dashboard uid must be a string")),
    };
    let tenant_id = match model.get("orgId") {
        None | Some(Value::Null) => TenantId::UNSET,
        Some(v) => TenantId::new(v.as_i64().ok_or_else(|| decode_err("orgId must be an integer"))?),
    };
    let version = model.get("version").and_then(Value::as_i64).unwrap_or(0);

    // local ids belong to the instance the dashboard was exported from
    model.remove("id");

    let mut spec = CanonicalResourceSpec::empty(ResourceKind::Dashboard);
    spec.tenant_id = tenant_id;
    spec.uid = uid;
    spec.name = title;
    spec.type_name = "dashboard".to_string();
    spec.json_data = model;
    spec.editable = true;
    spec.version = version;
    Ok(spec)
}
