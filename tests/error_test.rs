//! Tests for error types

use std::path::PathBuf;

use flagbench::{Error, Severity};

#[test]
fn test_compile_error() {
    let error = Error::Compile {
        bench: "list_bench".to_string(),
        command: "clang -O2 -c list_bench.c -o list_bench.o".to_string(),
        stderr: "list_bench.c:3: error: expected ';'".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Compile failed"));
    assert!(error_str.contains("list_bench"));
    assert!(error_str.contains("expected ';'"));
    assert_eq!(error.severity(), Severity::LocalSkip);
}

#[test]
fn test_link_error() {
    let error = Error::Link {
        bench: "hash_bench".to_string(),
        command: "clang hash_bench.o -o hash_bench -lm".to_string(),
        stderr: "undefined reference to `sqrt'".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Link failed"));
    assert!(error_str.contains("undefined reference"));
    assert_eq!(error.severity(), Severity::LocalSkip);
}

#[test]
fn test_runtime_error() {
    let error = Error::Runtime {
        bench: "graph_bench".to_string(),
        reason: "terminated by signal 11".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("failed at run time"));
    assert!(error_str.contains("signal 11"));
    assert!(!error.is_iteration_fatal());
    assert!(!error.is_run_fatal());
}

#[test]
fn test_build_system_error_carries_diagnostics() {
    let error = Error::BuildSystem {
        project: "libgcrypt".to_string(),
        command: "./configure --disable-asm".to_string(),
        status: "exit status: 1".to_string(),
        stdout: "checking for gcc... clang".to_string(),
        stderr: "configure: error: C compiler cannot create executables".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Build step failed for project 'libgcrypt'"));
    assert!(error_str.contains("./configure --disable-asm"));
    assert!(error_str.contains("STDOUT"));
    assert!(error_str.contains("cannot create executables"));
    assert!(error.is_iteration_fatal());
}

#[test]
fn test_missing_artifact_error() {
    let error = Error::MissingArtifact {
        project: "redis".to_string(),
        reason: "no results directory".to_string(),
    };
    assert!(format!("{error}").contains("redis"));
    assert_eq!(error.severity(), Severity::IterationFatal);
}

#[test]
fn test_source_and_fixture_errors_are_run_fatal() {
    let source = Error::SourceMissing {
        project: "glib".to_string(),
        path: PathBuf::from("/data/dataset/glib"),
    };
    let fixture = Error::FixtureMissing {
        project: "libyaml".to_string(),
        path: PathBuf::from("/data/dataset-bench/libyaml/config.yaml"),
    };
    assert!(format!("{source}").contains("/data/dataset/glib"));
    assert!(format!("{fixture}").contains("config.yaml"));
    assert!(source.is_run_fatal());
    assert!(fixture.is_run_fatal());
}

#[test]
fn test_config_error() {
    let error = Error::Config("duplicate project name 'lz4'".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Configuration error"));
    assert!(error_str.contains("lz4"));
    assert_eq!(error.severity(), Severity::RunFatal);
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error.is_run_fatal());
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<Vec<u8>>("not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_severity_ordering() {
    assert!(Severity::LocalSkip < Severity::IterationFatal);
    assert!(Severity::IterationFatal < Severity::RunFatal);
}
