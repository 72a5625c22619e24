// Allow deprecated APIs (assert_cmd::cargo_bin is deprecated but still works)
#![allow(deprecated)]

use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "entry": {
        "app": ["./assets/css/app.scss", "./assets/js/app.ts"]
    },
    "resolve": {
        "alias": {
            "@css": "./assets/css",
            "@": "./assets/js"
        }
    },
    "dev_server": {
        "proxy": [
            {"prefix": "/web", "target": "http://localhost:8000"}
        ]
    }
}"#;

fn write_project(dir: &Path) {
    fs::create_dir_all(dir.join("assets/js")).unwrap();
    fs::create_dir_all(dir.join("assets/css")).unwrap();
    fs::write(dir.join("fardel.json"), CONFIG).unwrap();
    fs::write(
        dir.join("assets/js/app.ts"),
        "import { greet } from '@/greet';\ngreet();\n",
    )
    .unwrap();
    fs::write(
        dir.join("assets/js/greet.ts"),
        "export function greet() {\n  console.info('hi');\n}\n",
    )
    .unwrap();
    fs::write(
        dir.join("assets/css/app.scss"),
        "$bg: #fff;\nbody { background: $bg; }\n",
    )
    .unwrap();
}

fn fardel(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fardel").unwrap();
    cmd.arg("--project-root").arg(dir).env_remove("FARDEL_ENV");
    cmd
}

fn assets(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.join("public/assets"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_dev_build_uses_stable_names() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());

    fardel(dir.path())
        .args(["--mode", "dev", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("development mode"));

    let names = assets(dir.path());
    assert!(names.contains(&"app.js".to_string()));
    assert!(names.contains(&"app.js.map".to_string()));
    // No manifest and no extracted stylesheet in development
    assert!(!names.iter().any(|n| n == "manifest.json"));
    assert!(!names.iter().any(|n| n.ends_with(".css")));
}

#[test]
fn test_prod_build_hashes_names_and_writes_manifest() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    // Stale output from a previous build must be cleaned
    fs::create_dir_all(dir.path().join("public/assets")).unwrap();
    fs::write(dir.path().join("public/assets/stale.js"), "old").unwrap();

    fardel(dir.path())
        .args(["--mode", "prod", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("production mode"));

    let names = assets(dir.path());
    assert!(!names.contains(&"stale.js".to_string()));
    assert!(names.contains(&"manifest.json".to_string()));
    let js = names
        .iter()
        .find(|n| n.starts_with("app.") && n.ends_with(".js"))
        .expect("hashed script bundle");
    assert_ne!(js, "app.js");
    let css = names
        .iter()
        .find(|n| n.starts_with("app.") && n.ends_with(".css"))
        .expect("hashed stylesheet");
    assert_ne!(css, "app.css");

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("public/assets/manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["app.js"], format!("/assets/{}", js));
    assert_eq!(manifest["app.css"], format!("/assets/{}", css));
}

#[rstest]
#[case("dev")]
#[case("prod")]
fn test_inspect_is_deterministic(#[case] mode: &str) {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());

    let run = || {
        let output = fardel(dir.path())
            .args(["--mode", mode, "inspect"])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);

    let config: serde_json::Value = serde_json::from_str(&first).unwrap();
    let hashed = config["output"]["filename"]
        .as_str()
        .unwrap()
        .contains("[chunkhash");
    assert_eq!(hashed, mode == "prod");
}

#[test]
fn test_mode_falls_back_to_environment() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());

    let output = fardel(dir.path())
        .env("FARDEL_ENV", "dev")
        .arg("inspect")
        .output()
        .unwrap();
    let config: serde_json::Value =
        serde_json::from_str(&String::from_utf8(output.stdout).unwrap()).unwrap();
    assert_eq!(config["mode"], "development");
    assert_eq!(
        config["output"]["public_path"],
        "http://localhost:8080/assets/"
    );
}

#[test]
fn test_missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    fardel(dir.path())
        .args(["--mode", "dev", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fardel.json"));
}

#[test]
fn test_unknown_config_key_is_named() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    fs::write(
        dir.path().join("fardel.json"),
        r#"{"entry": {"app": ["./assets/js/app.ts"]}, "outptu": {}}"#,
    )
    .unwrap();

    fardel(dir.path())
        .args(["--mode", "dev", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outptu"));
}

#[test]
fn test_unresolvable_import_names_specifier() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    fs::write(
        dir.path().join("assets/js/app.ts"),
        "import { gone } from './gone';\n",
    )
    .unwrap();

    fardel(dir.path())
        .args(["--mode", "dev", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("./gone"));
}

#[test]
fn test_strict_lint_fails_production_build() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    fs::write(
        dir.path().join("assets/js/util.js"),
        "debugger;\nmodule.exports = 1;\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("assets/js/app.ts"),
        "import './util.js';\n",
    )
    .unwrap();

    // Development tolerates the leftover debugger statement
    fardel(dir.path())
        .args(["--mode", "dev", "build"])
        .assert()
        .success();

    fardel(dir.path())
        .args(["--mode", "prod", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lint"));
}

#[test]
fn test_unknown_mode_rejected() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    fardel(dir.path())
        .args(["--mode", "staging", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn test_emitted_asset_listed_in_build_output() {
    let dir = TempDir::new().unwrap();
    write_project(dir.path());
    // Over the 8 KiB inline threshold, so the image is emitted as a file
    fs::write(dir.path().join("assets/css/bg.png"), vec![0u8; 10_000]).unwrap();
    fs::write(
        dir.path().join("assets/css/app.scss"),
        "body { background: url('./bg.png'); }\n",
    )
    .unwrap();

    fardel(dir.path())
        .args(["--mode", "dev", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bg."));

    let emitted: Vec<PathBuf> = fs::read_dir(dir.path().join("public/assets"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
        .collect();
    assert_eq!(emitted.len(), 1);
}
