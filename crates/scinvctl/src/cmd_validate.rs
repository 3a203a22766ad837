use anyhow::{Context, Result};
use scinv::core::{validate, FieldKind};
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct Verdict<'a> {
    kind: String,
    value: &'a str,
    accepted: bool,
    canonical: Option<String>,
    rule: Option<String>,
}

/// Check `value` against a field kind without touching any document.
pub fn run(kind: &str, value: &str, json: bool) -> Result<()> {
    let kind: FieldKind = kind.parse().context("parse field kind")?;
    let verdict = match validate(kind, value) {
        Ok(parsed) => Verdict {
            kind: kind.to_string(),
            value,
            accepted: true,
            canonical: Some(common::describe_value(&parsed)?),
            rule: None,
        },
        Err(err) => Verdict {
            kind: kind.to_string(),
            value,
            accepted: false,
            canonical: None,
            rule: Some(err.rule.to_string()),
        },
    };

    if json {
        common::print_json(&verdict)?;
    } else if let Some(canonical) = &verdict.canonical {
        println!("ok: {canonical}");
    }

    match verdict.rule {
        Some(rule) => Err(anyhow::anyhow!("{kind} value {value:?} rejected: {rule}")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_rejects() {
        run("latitude", "45.0", true).expect("in range");
        let err = run("coordinate", "91.0", true).expect_err("out of range");
        assert!(err.to_string().contains("91.0"));
        assert!(run("sample-rate", "0", true).is_err());
        run("sample-rate", "100", true).expect("positive rate");
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let err = run("colour", "red", false).expect_err("unknown kind");
        assert!(format!("{err:#}").contains("colour"));
    }
}
