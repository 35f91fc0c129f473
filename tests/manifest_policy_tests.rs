#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the Imposter client.
//!
//! These tests parse `Cargo.toml` (and the fuzz manifest) and verify that
//! lints, features and demo targets conform to project policy. If any test
//! fails, the manifest has drifted from the agreed-upon standards.
//!
//! All checks are synchronous filesystem reads; no network access or async
//! runtime needed.

use std::path::PathBuf;

use toml::{Table, Value};

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Reads and parses a manifest relative to the project root.
fn read_manifest(relative_path: &str) -> Table {
    let path = project_root().join(relative_path);
    let contents = std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!(
            "Failed to read '{}': {}. This file is required by project policy.",
            path.display(),
            e
        )
    });
    contents
        .parse::<Table>()
        .unwrap_or_else(|e| panic!("'{}' is not valid TOML: {e}", path.display()))
}

fn table<'a>(root: &'a Table, key: &str) -> &'a Table {
    root.get(key)
        .and_then(Value::as_table)
        .unwrap_or_else(|| panic!("manifest is missing [{key}]"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: lint_policy
// ─────────────────────────────────────────────────────────────────────────────

mod lint_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn panic_prone_lints_are_denied() {
        let cargo = read_manifest("Cargo.toml");
        let clippy = table(table(&cargo, "lints"), "clippy");

        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(Value::as_str),
                Some("deny"),
                "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy] so library \
                 code stays panic-free."
            );
        }
    }

    #[test]
    fn msrv_is_declared() {
        let cargo = read_manifest("Cargo.toml");
        let version = table(&cargo, "package")
            .get("rust-version")
            .and_then(Value::as_str)
            .expect("Cargo.toml must declare a rust-version");
        assert!(
            version.split('.').count() == 3,
            "rust-version '{version}' should be a full MAJOR.MINOR.PATCH version"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: feature_policy
// ─────────────────────────────────────────────────────────────────────────────

mod feature_policy {
    use super::*;

    #[test]
    fn websocket_transport_is_default() {
        let cargo = read_manifest("Cargo.toml");
        let default = table(&cargo, "features")
            .get("default")
            .and_then(Value::as_array)
            .expect("[features] must declare default");
        assert!(
            default
                .iter()
                .any(|f| f.as_str() == Some("transport-websocket")),
            "transport-websocket must be a default feature"
        );
    }

    #[test]
    fn optional_dependencies_are_feature_gated() {
        let cargo = read_manifest("Cargo.toml");
        let deps = table(&cargo, "dependencies");
        let features = table(&cargo, "features");
        let gated: Vec<&str> = features
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(Value::as_str)
            .filter_map(|f| f.strip_prefix("dep:"))
            .collect();

        for (name, spec) in deps {
            let optional = spec
                .as_table()
                .and_then(|t| t.get("optional"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if optional {
                assert!(
                    gated.contains(&name.as_str()),
                    "optional dependency '{name}' is not enabled by any feature"
                );
            }
        }
    }

    #[test]
    fn fuzz_crate_builds_without_default_features() {
        let fuzz = read_manifest("fuzz/Cargo.toml");
        let client = table(table(&fuzz, "dependencies"), "imposter-client");
        assert_eq!(client.get("path").and_then(Value::as_str), Some(".."));
        assert_eq!(
            client.get("default-features").and_then(Value::as_bool),
            Some(false),
            "fuzz targets exercise decoding only and must not pull in the WebSocket stack"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: demo_policy
// ─────────────────────────────────────────────────────────────────────────────

mod demo_policy {
    use super::*;

    #[test]
    fn every_demo_target_exists() {
        let cargo = read_manifest("Cargo.toml");
        let examples = cargo
            .get("example")
            .and_then(Value::as_array)
            .expect("Cargo.toml must declare [[example]] targets");
        assert!(!examples.is_empty());

        for example in examples {
            let path = example
                .get("path")
                .and_then(Value::as_str)
                .expect("[[example]] entries must set an explicit path");
            assert!(
                path.starts_with("demos/"),
                "demo '{path}' must live under demos/"
            );
            assert!(
                project_root().join(path).is_file(),
                "demo '{path}' is declared in Cargo.toml but does not exist"
            );
        }
    }

    #[test]
    fn websocket_demo_requires_its_feature() {
        let cargo = read_manifest("Cargo.toml");
        let examples = cargo.get("example").and_then(Value::as_array).unwrap();
        let console = examples
            .iter()
            .find(|e| e.get("name").and_then(Value::as_str) == Some("console_session"))
            .expect("console_session demo must be declared");
        let required = console
            .get("required-features")
            .and_then(Value::as_array)
            .expect("console_session must declare required-features");
        assert!(required
            .iter()
            .any(|f| f.as_str() == Some("transport-websocket")));
    }
}
