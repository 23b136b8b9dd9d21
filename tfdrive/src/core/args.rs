//! Argument formatting for terraform commands.
//!
//! Variables are passed on the command line in HCL syntax (`-var key=value`).
//! There is no library for rendering arbitrary values as HCL, so [`to_hcl_string`]
//! covers the shapes tests actually pass: scalars, lists and maps.

use std::collections::BTreeMap;

use crate::core::value::{Scalar, Value};
use crate::options::Options;

/// Build the full argument vector: `base`, then `-var`, `-var-file` and `-target` pairs.
///
/// Order among `-var` pairs follows the map's iteration order and callers must not
/// rely on it. Files and targets keep their list order.
pub fn format_args<S: AsRef<str>>(options: &Options, base: &[S]) -> Vec<String> {
    let mut args: Vec<String> = base.iter().map(|a| a.as_ref().to_string()).collect();
    args.extend(format_vars_as_args(&options.vars));
    args.extend(format_flag_args("-var-file", &options.var_files));
    args.extend(format_flag_args("-target", &options.targets));
    args
}

/// Format variables as `-var key=value` pairs.
pub fn format_vars_as_args(vars: &BTreeMap<String, Value>) -> Vec<String> {
    format_prefixed(vars, "-var")
}

/// Format backend config as `-backend-config key=value` pairs.
pub fn format_backend_config_as_args(vars: &BTreeMap<String, Value>) -> Vec<String> {
    format_prefixed(vars, "-backend-config")
}

/// Repeat `name` before each value: `("-target", [a, b])` gives `-target a -target b`.
pub fn format_flag_args<S: AsRef<str>>(name: &str, values: &[S]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| [name.to_string(), v.as_ref().to_string()])
        .collect()
}

/// Append `-no-color` when the options ask for it and the args don't carry it yet.
pub fn with_common_flags(options: &Options, mut args: Vec<String>) -> Vec<String> {
    if options.no_color && !args.iter().any(|a| a == "-no-color") {
        args.push("-no-color".to_string());
    }
    args
}

fn format_prefixed(vars: &BTreeMap<String, Value>, prefix: &str) -> Vec<String> {
    vars.iter()
        .flat_map(|(key, value)| [prefix.to_string(), format!("{key}={}", to_hcl_string(value))])
        .collect()
}

/// Render a value in the HCL syntax terraform accepts for `-var`.
///
/// Booleans become `"1"`/`"0"` and every other scalar is wrapped in double quotes,
/// numbers included. Terraform misreads bare booleans and numerals passed this way
/// (hashicorp/terraform#7962), so the quoting keeps argument compatibility with
/// existing modules. Check the target terraform version before changing it.
pub fn to_hcl_string(value: &Value) -> String {
    // Explicit work stack: nesting depth is bounded by memory, not the call stack.
    let mut out = String::new();
    let mut stack = vec![Piece::Value(value)];
    while let Some(piece) = stack.pop() {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Value(Value::List(items)) => {
                out.push('[');
                stack.push(Piece::Text("]"));
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push(Piece::Value(item));
                    if i > 0 {
                        stack.push(Piece::Text(", "));
                    }
                }
            }
            Piece::Value(Value::Map(entries)) => {
                out.push('{');
                stack.push(Piece::Text("}"));
                for (i, (key, item)) in entries.iter().enumerate().rev() {
                    stack.push(Piece::Value(item));
                    stack.push(Piece::Text(" = "));
                    stack.push(Piece::Text(key));
                    if i > 0 {
                        stack.push(Piece::Text(", "));
                    }
                }
            }
            Piece::Value(Value::Scalar(Scalar::Bool(true))) => out.push_str("\"1\""),
            Piece::Value(Value::Scalar(Scalar::Bool(false))) => out.push_str("\"0\""),
            Piece::Value(Value::Scalar(scalar)) => {
                out.push('"');
                out.push_str(&scalar.to_string());
                out.push('"');
            }
        }
    }
    out
}

/// Pending output of [`to_hcl_string`]: a value still to encode, or literal text.
enum Piece<'a> {
    Value(&'a Value),
    Text(&'a str),
}
