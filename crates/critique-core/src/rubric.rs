//! Rubric corpus loading.
//!
//! Two layouts are accepted:
//!
//! - a directory of category files (`*.json`, `*.yaml`, `*.yml`), loaded in file-name
//!   order, each mapping a category key to `{ category, items }`;
//! - a single merged file `{ totalPossible?, categories: { key: { category, items } } }`.
//!
//! Either way the result is one immutable [`RubricSet`]. Any defect is a
//! startup misconfiguration and fails the load.

use crate::model::{RubricCategory, RubricItem};
use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct CategoryDoc {
    category: String,
    items: Vec<RubricItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RubricSet {
    categories: Vec<RubricCategory>,
    declared_total: Option<u32>,
}

impl RubricSet {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("config error: rubric source not found: {}", path.display()))?;

        let set = if meta.is_dir() {
            load_dir(path)?
        } else {
            let doc = read_document(path)?;
            parse_document(path, doc, true)?
        };

        info!(
            source = %path.display(),
            categories = set.categories.len(),
            derived_total = set.derived_total(),
            declared_total = ?set.declared_total,
            "rubric corpus loaded"
        );
        Ok(set)
    }

    pub fn from_categories(
        categories: Vec<RubricCategory>,
        declared_total: Option<u32>,
    ) -> anyhow::Result<Self> {
        if categories.is_empty() {
            bail!("config error: rubric corpus contains no categories");
        }
        let mut keys = HashSet::new();
        for cat in &categories {
            if !keys.insert(cat.key.as_str()) {
                bail!("config error: duplicate rubric category key '{}'", cat.key);
            }
            if cat.category.trim().is_empty() {
                bail!("config error: rubric category '{}' has an empty display name", cat.key);
            }
            if cat.items.is_empty() {
                bail!("config error: rubric category '{}' has no items", cat.key);
            }
            let mut names = HashSet::new();
            for item in &cat.items {
                if item.name.trim().is_empty() {
                    bail!("config error: rubric category '{}' has an item without a name", cat.key);
                }
                if !names.insert(item.name.as_str()) {
                    bail!(
                        "config error: rubric category '{}' repeats item '{}'",
                        cat.key,
                        item.name
                    );
                }
            }
        }
        Ok(Self {
            categories,
            declared_total,
        })
    }

    pub fn categories(&self) -> &[RubricCategory] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&RubricCategory> {
        self.categories.iter().find(|c| c.key == key)
    }

    /// Match a model-reported category name against display names, then keys.
    pub fn find_by_name(&self, name: &str) -> Option<&RubricCategory> {
        let name = name.trim();
        self.categories
            .iter()
            .find(|c| c.category == name)
            .or_else(|| self.categories.iter().find(|c| c.key == name))
    }

    /// Sum of category maxScores.
    pub fn derived_total(&self) -> u32 {
        self.categories.iter().map(RubricCategory::max_score).sum()
    }

    /// Total declared by a merged rubric document, if any.
    pub fn declared_total(&self) -> Option<u32> {
        self.declared_total
    }
}

fn load_dir(dir: &Path) -> anyhow::Result<RubricSet> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("config error: failed to read rubric directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_rubric_file(p))
        .collect();
    files.sort();

    if files.is_empty() {
        bail!(
            "config error: rubric directory {} contains no .json/.yaml files",
            dir.display()
        );
    }

    let mut categories = Vec::new();
    for file in &files {
        let doc = read_document(file)?;
        let parsed = parse_document(file, doc, false)?;
        debug!(file = %file.display(), categories = parsed.categories.len(), "rubric file parsed");
        categories.extend(parsed.categories);
    }
    RubricSet::from_categories(categories, None)
        .with_context(|| format!("invalid rubric directory {}", dir.display()))
}

fn is_rubric_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml")
    )
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("config error: failed to read rubric file {}", path.display()))?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let doc: Value = if is_json {
        serde_json::from_str(&raw).with_context(|| {
            format!("config error: failed to parse rubric JSON {}", path.display())
        })?
    } else {
        serde_yaml::from_str(&raw).with_context(|| {
            format!("config error: failed to parse rubric YAML {}", path.display())
        })?
    };
    Ok(doc)
}

fn parse_document(path: &Path, doc: Value, allow_merged: bool) -> anyhow::Result<RubricSet> {
    let Value::Object(mut root) = doc else {
        bail!(
            "config error: rubric file {} must contain an object at the top level",
            path.display()
        );
    };

    if root.contains_key("categories") {
        if !allow_merged {
            bail!(
                "config error: merged rubric document {} cannot be mixed with category files",
                path.display()
            );
        }
        let declared_total = match root.remove("totalPossible") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        anyhow!(
                            "config error: totalPossible in {} must be a positive integer",
                            path.display()
                        )
                    })?,
            ),
        };
        let Some(Value::Object(cats)) = root.remove("categories") else {
            bail!(
                "config error: 'categories' in {} must map category keys to rubrics",
                path.display()
            );
        };
        let categories = categories_from_map(path, cats)?;
        return RubricSet::from_categories(categories, declared_total)
            .with_context(|| format!("invalid rubric document {}", path.display()));
    }

    let categories = categories_from_map(path, root)?;
    RubricSet::from_categories(categories, None)
        .with_context(|| format!("invalid rubric file {}", path.display()))
}

fn categories_from_map(path: &Path, map: Map<String, Value>) -> anyhow::Result<Vec<RubricCategory>> {
    map.into_iter()
        .map(|(key, body)| {
            let doc: CategoryDoc = serde_json::from_value(body).with_context(|| {
                format!(
                    "config error: rubric category '{}' in {} is malformed",
                    key,
                    path.display()
                )
            })?;
            Ok(RubricCategory {
                key,
                category: doc.category,
                items: doc.items,
            })
        })
        .collect()
}
