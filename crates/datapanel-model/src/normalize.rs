//! Schema normalization
//!
//! Turns a raw, possibly stale document into a [`ProjectState`] that has the
//! full field set of the current variant definitions. Each entity is merged
//! onto a freshly constructed default of its variant:
//! - primitives present in the raw input override the default
//! - objects merge field by field, recursively
//! - plain arrays (`headers`, `columns`) are replaced wholesale
//! - `pages`, `panels` and `connectors` are re-typed per element by
//!   re-dispatching on each element's own `type` tag
//!
//! Fields the current schema does not know are dropped when the merged value
//! is decoded. A present value the schema rejects (a negative index, an
//! unknown enum name) falls back to its default on its own; its siblings
//! keep their values. Nothing here fails: unknown variants are skipped and
//! every repair is reported as a [`NormalizeIssue`].

use crate::connector::{ConnectorInfo, ConnectorKind};
use crate::id::EntityId;
use crate::panel::{PanelInfo, PanelKind};
use crate::project::{ProjectPage, ProjectState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Entity family named in dispatch issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Page panels
    Panel,
    /// Project connectors
    Connector,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Panel => f.write_str("panel"),
            Family::Connector => f.write_str("connector"),
        }
    }
}

/// What the normalizer had to repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// Input document is not a JSON object
    NotAnObject,
    /// `type` names no known variant; the entity was skipped
    UnknownVariant {
        /// Entity family
        family: Family,
        /// Tag found
        found: String,
    },
    /// `type` missing or not a string; the entity was skipped
    MissingType {
        /// Entity family
        family: Family,
    },
    /// Raw value of the wrong JSON kind; the default was kept
    KindMismatch {
        /// Kind of the default
        expected: &'static str,
        /// Kind found in the raw input
        found: &'static str,
    },
    /// Value rejected by the schema; the default was kept
    InvalidValue(String),
}

/// One repair, located by a JSON-pointer style path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeIssue {
    /// Location in the raw document
    pub path: String,
    /// What happened
    pub kind: IssueKind,
}

impl std::fmt::Display for NormalizeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            IssueKind::NotAnObject => write!(f, "{}: document is not an object", self.path),
            IssueKind::UnknownVariant { family, found } => {
                write!(f, "{}: unknown {family} type '{found}', skipped", self.path)
            }
            IssueKind::MissingType { family } => {
                write!(f, "{}: {family} has no type, skipped", self.path)
            }
            IssueKind::KindMismatch { expected, found } => write!(
                f,
                "{}: expected {expected}, found {found}, default kept",
                self.path
            ),
            IssueKind::InvalidValue(reason) => {
                write!(f, "{}: invalid value, default kept ({reason})", self.path)
            }
        }
    }
}

/// Normalized document plus the repairs made
#[derive(Debug, Clone)]
pub struct Normalized {
    /// Current-schema document
    pub state: ProjectState,
    /// Repairs, in document order
    pub issues: Vec<NormalizeIssue>,
}

/// Normalize a raw document, discarding the repair report
#[must_use]
pub fn normalize(raw: &Value) -> ProjectState {
    normalize_with_report(raw).state
}

/// Normalize a raw document
#[must_use]
pub fn normalize_with_report(raw: &Value) -> Normalized {
    let mut normalizer = Normalizer::default();
    let state = normalizer.project(raw);
    Normalized {
        state,
        issues: normalizer.issues,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectHeader {
    id: EntityId,
    project_name: String,
}

#[derive(Deserialize)]
struct PageHeader {
    id: EntityId,
    name: String,
}

#[derive(Default)]
struct Normalizer {
    issues: Vec<NormalizeIssue>,
}

impl Normalizer {
    fn report(&mut self, path: &str, kind: IssueKind) {
        let issue = NormalizeIssue {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            kind,
        };
        tracing::warn!(issue = %issue, "normalized stale document");
        self.issues.push(issue);
    }

    fn project(&mut self, raw: &Value) -> ProjectState {
        let defaults = ProjectState::default();
        let Value::Object(raw_map) = raw else {
            self.report("", IssueKind::NotAnObject);
            return defaults;
        };

        let mut scalars = raw_map.clone();
        let raw_pages = scalars.remove("pages");
        let raw_connectors = scalars.remove("connectors");

        let mut base = default_value(&defaults);
        if let Value::Object(map) = &mut base {
            map.remove("pages");
            map.remove("connectors");
        }
        let merged = self.merge(base, &Value::Object(scalars), "");
        let header = serde_json::from_value::<ProjectHeader>(merged).unwrap_or(ProjectHeader {
            id: defaults.id,
            project_name: defaults.project_name,
        });

        let pages = self
            .elements(raw_pages.as_ref(), "/pages")
            .into_iter()
            .filter_map(|(path, value)| self.page(value, &path))
            .collect();
        let connectors = self
            .elements(raw_connectors.as_ref(), "/connectors")
            .into_iter()
            .filter_map(|(path, value)| self.connector(value, &path))
            .collect();

        ProjectState {
            id: header.id,
            project_name: header.project_name,
            pages,
            connectors,
        }
    }

    /// Elements of a record-shaped array, with their paths
    fn elements<'a>(&mut self, raw: Option<&'a Value>, path: &str) -> Vec<(String, &'a Value)> {
        match raw {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("{path}/{i}"), item))
                .collect(),
            Some(other) => {
                self.report(
                    path,
                    IssueKind::KindMismatch {
                        expected: "array",
                        found: kind_name(other),
                    },
                );
                Vec::new()
            }
        }
    }

    fn page(&mut self, raw: &Value, path: &str) -> Option<ProjectPage> {
        let Value::Object(raw_map) = raw else {
            self.report(
                path,
                IssueKind::KindMismatch {
                    expected: "object",
                    found: kind_name(raw),
                },
            );
            return None;
        };

        let mut scalars = raw_map.clone();
        let raw_panels = scalars.remove("panels");

        let defaults = ProjectPage::default();
        let mut base = default_value(&defaults);
        if let Value::Object(map) = &mut base {
            map.remove("panels");
        }
        let merged = self.merge(base, &Value::Object(scalars), path);
        let header = serde_json::from_value::<PageHeader>(merged).unwrap_or(PageHeader {
            id: defaults.id,
            name: defaults.name,
        });

        let panels_path = format!("{path}/panels");
        let panels = self
            .elements(raw_panels.as_ref(), &panels_path)
            .into_iter()
            .filter_map(|(path, value)| self.panel(value, &path))
            .collect();

        Some(ProjectPage {
            id: header.id,
            name: header.name,
            panels,
        })
    }

    fn panel(&mut self, raw: &Value, path: &str) -> Option<PanelInfo> {
        let kind = self.dispatch::<PanelKind>(raw, path, Family::Panel)?;
        let raw = match kind {
            PanelKind::Sql | PanelKind::Http => lift_embedded_connector(raw, kind.as_str()),
            PanelKind::Literal | PanelKind::Program | PanelKind::Table | PanelKind::Graph => {
                raw.clone()
            }
        };

        let default = default_value(&PanelInfo::new(kind));
        let merged = self.merge(default.clone(), &raw, path);
        self.decode(default, merged, path)
    }

    fn connector(&mut self, raw: &Value, path: &str) -> Option<ConnectorInfo> {
        let kind = self.dispatch::<ConnectorKind>(raw, path, Family::Connector)?;

        let default = default_value(&ConnectorInfo::new(kind));
        let merged = self.merge(default.clone(), raw, path);
        self.decode(default, merged, path)
    }

    /// Decode a merged entity, keeping every value the schema accepts
    ///
    /// When the whole value does not decode, the merged leaves are grafted
    /// one at a time onto the default and any leaf that breaks decoding is
    /// reverted and reported.
    fn decode<T: DeserializeOwned>(&mut self, default: Value, merged: Value, path: &str) -> Option<T> {
        if let Ok(entity) = serde_json::from_value::<T>(merged.clone()) {
            return Some(entity);
        }
        let mut accepted = default;
        if let Value::Object(fields) = &merged {
            self.graft::<T>(&mut accepted, "", fields, path);
        }
        match serde_json::from_value::<T>(accepted) {
            Ok(entity) => Some(entity),
            Err(e) => {
                self.report(path, IssueKind::InvalidValue(e.to_string()));
                None
            }
        }
    }

    fn graft<T: DeserializeOwned>(
        &mut self,
        accepted: &mut Value,
        pointer: &str,
        fields: &Map<String, Value>,
        path: &str,
    ) {
        for (key, value) in fields {
            let child = format!("{pointer}/{}", key.replace('~', "~0").replace('/', "~1"));
            let child_path = format!("{path}/{key}");
            let nested = match (accepted.pointer(&child), value) {
                (Some(current), _) if current == value => continue,
                (Some(Value::Object(_)), Value::Object(inner)) => Some(inner),
                _ => None,
            };
            if let Some(inner) = nested {
                self.graft::<T>(accepted, &child, inner, &child_path);
                continue;
            }

            let Some(Value::Object(parent)) = accepted.pointer_mut(pointer) else {
                continue;
            };
            let previous = parent.insert(key.clone(), value.clone());
            if let Err(e) = serde_json::from_value::<T>(accepted.clone()) {
                if let Some(Value::Object(parent)) = accepted.pointer_mut(pointer) {
                    match previous {
                        Some(previous) => parent.insert(key.clone(), previous),
                        None => parent.remove(key),
                    };
                }
                self.report(&child_path, IssueKind::InvalidValue(e.to_string()));
            }
        }
    }

    /// Read and parse an element's `type` tag
    fn dispatch<K: FromStr>(&mut self, raw: &Value, path: &str, family: Family) -> Option<K> {
        match raw.get("type") {
            Some(Value::String(tag)) => match tag.parse::<K>() {
                Ok(kind) => Some(kind),
                Err(_) => {
                    self.report(
                        path,
                        IssueKind::UnknownVariant {
                            family,
                            found: tag.clone(),
                        },
                    );
                    None
                }
            },
            _ => {
                self.report(path, IssueKind::MissingType { family });
                None
            }
        }
    }

    /// Merge `raw` onto `default`
    fn merge(&mut self, default: Value, raw: &Value, path: &str) -> Value {
        match (default, raw) {
            (Value::Object(mut base), Value::Object(overlay)) => {
                for (key, raw_val) in overlay {
                    match base.get_mut(key) {
                        Some(slot) => {
                            let default_val = slot.take();
                            *slot = self.merge(default_val, raw_val, &format!("{path}/{key}"));
                        }
                        None => {
                            base.insert(key.clone(), raw_val.clone());
                        }
                    }
                }
                Value::Object(base)
            }
            (Value::Array(_), Value::Array(items)) => Value::Array(items.clone()),
            (Value::Null, raw_val) => raw_val.clone(),
            (Value::Bool(_), raw_val @ Value::Bool(_))
            | (Value::Number(_), raw_val @ Value::Number(_))
            | (Value::String(_), raw_val @ Value::String(_)) => raw_val.clone(),
            (default_val, raw_val) => {
                self.report(
                    path,
                    IssueKind::KindMismatch {
                        expected: kind_name(&default_val),
                        found: kind_name(raw_val),
                    },
                );
                default_val
            }
        }
    }
}

/// Hoist a whole connector record stored inside a panel payload
///
/// Older documents kept `sql: {id, name, type, sql: {...}}` on SQL panels
/// (and the same shape under `http`). The inner payload becomes the panel
/// payload; other outer fields survive unless the inner payload has them.
fn lift_embedded_connector(raw: &Value, key: &str) -> Value {
    let mut lifted: Map<String, Value> = match raw.get(key).and_then(|outer| outer.get(key)) {
        Some(Value::Object(inner)) => inner.clone(),
        _ => return raw.clone(),
    };

    let mut raw = raw.clone();
    if let Some(Value::Object(outer)) = raw.get_mut(key) {
        for (field, value) in outer.iter() {
            if matches!(field.as_str(), "id" | "name" | "type") || field == key {
                continue;
            }
            lifted.entry(field.clone()).or_insert_with(|| value.clone());
        }
        *outer = lifted;
    }
    raw
}

fn default_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "default entity failed to serialize");
        Value::Null
    })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
