//! Route compiler and compiled route table.

use crate::error::RouteError;
use crate::http::{merge_unique, MiddlewareRegistry};
use crate::routing::declare::{ControllerDecl, ParamSpec};
use crate::routing::path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serializable form of one compiled route; this is what the route cache stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub path: String,
    pub pattern: String,
    pub methods: Vec<String>,
    pub controller: String,
    pub action: String,
    /// Canonical identifiers, class-level first, de-duplicated.
    pub middleware: Vec<String>,
    pub params: Vec<ParamSpec>,
}

#[derive(Clone, Debug)]
pub struct RouteEntry {
    pub record: RouteRecord,
    matcher: Regex,
}

impl RouteEntry {
    pub fn allows(&self, method: &str) -> bool {
        self.record.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Named captures of a normalized path. Captures that did not participate are absent.
    pub fn captures(&self, normalized: &str) -> Option<HashMap<String, String>> {
        let caps = self.matcher.captures(normalized)?;
        Some(
            self.matcher
                .capture_names()
                .flatten()
                .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                .collect(),
        )
    }
}

/// Routes in declaration order. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Compile stored records, e.g. loaded from the route cache.
    pub fn from_records(records: Vec<RouteRecord>) -> Result<Self, RouteError> {
        let entries = records
            .into_iter()
            .map(|record| {
                let matcher = Regex::new(&record.pattern).map_err(|e| RouteError::InvalidTemplate {
                    template: record.path.clone(),
                    reason: e.to_string(),
                })?;
                Ok(RouteEntry { record, matcher })
            })
            .collect::<Result<Vec<_>, RouteError>>()?;
        Ok(RouteTable { entries })
    }

    pub fn records(&self) -> Vec<RouteRecord> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry allowing `method` whose pattern matches the normalized path.
    pub fn find(&self, method: &str, normalized: &str) -> Option<(&RouteEntry, HashMap<String, String>)> {
        self.entries
            .iter()
            .filter(|e| e.allows(method))
            .find_map(|e| e.captures(normalized).map(|caps| (e, caps)))
    }
}

pub struct RouteCompiler;

impl RouteCompiler {
    /// Build route records from controller declarations. A second registration of the same
    /// verb and expanded path fails the whole build.
    pub fn compile_records(
        controllers: &[ControllerDecl],
        middleware: &MiddlewareRegistry,
    ) -> Result<Vec<RouteRecord>, RouteError> {
        let mut records = Vec::new();
        let mut claimed: HashMap<(String, String), (String, String)> = HashMap::new();

        for controller in controllers {
            let class_middleware: Vec<String> =
                controller.middleware.iter().map(|id| middleware.canonical(id)).collect();
            for action in &controller.actions {
                if action.routes.is_empty() {
                    continue;
                }
                let action_middleware: Vec<String> =
                    action.middleware.iter().map(|id| middleware.canonical(id)).collect();
                let merged = merge_unique([class_middleware.as_slice(), action_middleware.as_slice()]);

                for route in &action.routes {
                    let full = path::join(&controller.prefix, &route.path);
                    let mut methods: Vec<String> = Vec::new();
                    for method in &route.methods {
                        let method = method.to_uppercase();
                        if methods.contains(&method) {
                            continue;
                        }
                        let key = (method.clone(), full.clone());
                        if let Some((first_controller, first_action)) = claimed.get(&key) {
                            return Err(RouteError::Conflict {
                                method,
                                path: full,
                                first_controller: first_controller.clone(),
                                first_action: first_action.clone(),
                                second_controller: controller.name.clone(),
                                second_action: action.name.clone(),
                            });
                        }
                        claimed.insert(key, (controller.name.clone(), action.name.clone()));
                        methods.push(method);
                    }
                    records.push(RouteRecord {
                        pattern: path::compile(&full)?,
                        path: full,
                        methods,
                        controller: controller.name.clone(),
                        action: action.name.clone(),
                        middleware: merged.clone(),
                        params: action.params.clone(),
                    });
                }
            }
        }
        Ok(records)
    }

    pub fn compile(controllers: &[ControllerDecl], middleware: &MiddlewareRegistry) -> Result<RouteTable, RouteError> {
        let table = RouteTable::from_records(Self::compile_records(controllers, middleware)?)?;
        tracing::info!(routes = table.len(), "route table compiled");
        Ok(table)
    }
}
