//! Reading terraform outputs.
//!
//! Single values come from plain `terraform output <key>`; lists, maps and the
//! all-outputs dump come from `terraform output -json`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as Json;

use crate::core::decode::{decode_keys, decode_list, decode_map};
use crate::error::{Error, Result};
use crate::io::terraform::Terraform;
use crate::options::Options;

/// Shape a caller wants an output decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    Single,
    Required,
    List,
    Map,
    All,
}

/// An output decoded into the requested [`OutputShape`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedOutput {
    Single(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
    All(BTreeMap<String, Json>),
}

impl Terraform {
    /// Value of output `key`, whitespace-trimmed.
    pub fn output(&self, options: &Options, key: &str) -> Result<String> {
        let out = self.run_command(options, &["output", "-no-color", key])?;
        Ok(out.trim().to_string())
    }

    /// Like [`Terraform::output`], but an empty value is an [`Error::EmptyOutput`].
    pub fn output_required(&self, options: &Options, key: &str) -> Result<String> {
        let out = self.output(options, key)?;
        if out.is_empty() {
            return Err(Error::EmptyOutput(key.to_string()));
        }
        Ok(out)
    }

    /// Output `key` as a list. Fails if the output is not a list.
    ///
    /// String members are returned as-is. Any other member is rendered as compact
    /// JSON: `1`, `true`, `null`, `[1,2]`, `{"x":1}`.
    pub fn output_list(&self, options: &Options, key: &str) -> Result<Vec<String>> {
        let out = self.run_command(options, &["output", "-no-color", "-json", key])?;
        Ok(decode_list(key, &out)?)
    }

    /// Output `key` as a map of strings. Fails if the output is not a map.
    ///
    /// Values are stringified like [`Terraform::output_list`] members.
    pub fn output_map(&self, options: &Options, key: &str) -> Result<BTreeMap<String, String>> {
        let out = self.run_command(options, &["output", "-no-color", "-json", key])?;
        Ok(decode_map(key, &out)?)
    }

    /// Values of the given output keys. Every key must be present.
    pub fn output_for_keys(
        &self,
        options: &Options,
        keys: &[String],
    ) -> Result<BTreeMap<String, Json>> {
        self.outputs(options, Some(keys))
    }

    /// Every output, keyed by name.
    pub fn output_all(&self, options: &Options) -> Result<BTreeMap<String, Json>> {
        self.outputs(options, None)
    }

    /// Decode into a shape chosen at runtime.
    ///
    /// `Single`, `Required`, `List` and `Map` take exactly one key; `All` takes any
    /// number, none meaning every output.
    pub fn output_shaped(
        &self,
        options: &Options,
        shape: OutputShape,
        keys: &[String],
    ) -> anyhow::Result<DecodedOutput> {
        if shape != OutputShape::All && keys.len() != 1 {
            anyhow::bail!("{shape:?} output needs exactly one key, got {}", keys.len());
        }
        let decoded = match shape {
            OutputShape::Single => DecodedOutput::Single(self.output(options, &keys[0])?),
            OutputShape::Required => {
                DecodedOutput::Single(self.output_required(options, &keys[0])?)
            }
            OutputShape::List => DecodedOutput::List(self.output_list(options, &keys[0])?),
            OutputShape::Map => DecodedOutput::Map(self.output_map(options, &keys[0])?),
            OutputShape::All if keys.is_empty() => DecodedOutput::All(self.output_all(options)?),
            OutputShape::All => DecodedOutput::All(self.output_for_keys(options, keys)?),
        };
        Ok(decoded)
    }

    fn outputs(
        &self,
        options: &Options,
        keys: Option<&[String]>,
    ) -> Result<BTreeMap<String, Json>> {
        let out = self.run_command(options, &["output", "-no-color", "-json"])?;
        Ok(decode_keys(&out, keys)?)
    }
}
