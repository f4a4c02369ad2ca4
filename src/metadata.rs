//! Lookup tables shipped alongside the raw data.
//!
//! `translations.json` maps French DOM labels to English, per column.
//! `group_mappings.json` maps each source's POI types to a coarse group.
//! A value missing from either table is an error carrying the value, never a
//! silent default.

use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::Path;

use _model::{Field, Source};
use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnknownCategory {
    #[error("no translation for {field} '{value}'")]
    Translation { field: Field, value: String },
    #[error("no {provider} group for type '{value}'")]
    Group { provider: Source, value: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct Translations(BTreeMap<String, BTreeMap<String, String>>);

#[derive(Debug, Default, Deserialize)]
pub struct GroupMappings(BTreeMap<String, BTreeMap<String, String>>);

fn load<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = read_to_string(path).with_context(|| format!("Failed to read {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {path:?}"))
}

impl Translations {
    pub fn load(path: &Path) -> Result<Self> {
        load(path)
    }

    pub fn translate(&self, field: Field, value: &str) -> Result<&str, UnknownCategory> {
        self.0
            .get(field.slug())
            .and_then(|x| x.get(value))
            .map(String::as_str)
            .ok_or_else(|| UnknownCategory::Translation {
                field,
                value: value.to_string(),
            })
    }
}

impl GroupMappings {
    pub fn load(path: &Path) -> Result<Self> {
        load(path)
    }

    pub fn group(&self, source: Source, kind: &str) -> Result<&str, UnknownCategory> {
        self.0
            .get(source.slug())
            .and_then(|x| x.get(kind))
            .map(String::as_str)
            .ok_or_else(|| UnknownCategory::Group {
                provider: source,
                value: kind.to_string(),
            })
    }
}
