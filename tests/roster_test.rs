//! The shipped project roster parses and carries each project's quirks

use std::path::{Path, PathBuf};

use flagbench::config::HarnessConfig;

const ROSTER: &str = include_str!("../flagbench.toml");

fn roster() -> HarnessConfig {
    HarnessConfig::from_toml_str(ROSTER, Path::new("/work")).unwrap()
}

#[test]
fn test_roster_parses_and_validates() {
    let config = roster();
    let names: Vec<&str> = config.projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "cJSON",
            "libyaml",
            "redis",
            "c-ares",
            "glib",
            "libgcrypt",
            "c-algorithms",
            "task_serpas",
            "igraph",
        ]
    );
    assert_eq!(config.expected_projects, Some(names.len()));
    assert_eq!(config.runs, 5);
    assert_eq!(config.iterations, 155);
    assert_eq!(config.dataset_path(), PathBuf::from("/work/ml_dataset.json"));
}

#[test]
fn test_cjson_builds_objects_then_links() {
    let config = roster();
    let cjson = config.project("cJSON").unwrap();
    assert_eq!(cjson.build.len(), 1);
    assert!(cjson.build[0].args[1].contains("ar rcs"));
    assert_eq!(cjson.build[0].env["CFLAGS"], "{flags}");
    assert_eq!(cjson.link_args, vec!["{build}/libcjson.a"]);
    assert_eq!(cjson.include_dirs, vec!["{source}"]);
}

#[test]
fn test_libyaml_uses_pkg_config_and_fixture() {
    let config = roster();
    let libyaml = config.project("libyaml").unwrap();
    let pc = libyaml.pkg_config.as_ref().unwrap();
    assert_eq!(pc.package, "yaml-0.1");
    assert!(pc.static_libs);
    assert_eq!(libyaml.fixtures, vec![PathBuf::from("config.yaml")]);
    assert_eq!(libyaml.discovery.suffix.as_deref(), Some("_bench"));

    let layout = config.adapter(libyaml).layout();
    assert_eq!(layout.install, PathBuf::from("/work/dataset/libyaml-install"));
}

#[test]
fn test_redis_runs_a_server() {
    let config = roster();
    let redis = config.project("redis").unwrap();
    let service = redis.service.as_ref().unwrap();
    assert_eq!(service.port, 6379);
    assert_eq!(service.program, "{install}/bin/redis-server");
    assert!(service.args.windows(2).any(|w| w == ["--save", ""]));
    assert_eq!(redis.cleanup[0].args, vec!["distclean"]);
    assert_eq!(redis.build[0].env["OPTIMIZATION"], "{flags}");
}

#[test]
fn test_c_ares_tools_get_arguments() {
    let config = roster();
    let cares = config.project("c-ares").unwrap();
    let prebuilt: Vec<&str> = cares.prebuilt.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(prebuilt, vec!["adig", "ahost"]);
    let adig = &cares.bench_args["adig"];
    assert_eq!(adig.args, vec!["localhost"]);
    assert_eq!(adig.rename.as_deref(), Some("adig_localhost"));
    assert!(cares.discovery.exclude.iter().any(|x| x == "ares_queryloop"));
    assert!(cares.build[0].args.iter().any(|a| a == "-DCMAKE_C_FLAGS={flags}"));
}

#[test]
fn test_single_binary_with_workloads() {
    let config = roster();
    let serpas = config.project("task_serpas").unwrap();
    assert!(serpas.discovery.extensions.is_empty());
    assert_eq!(serpas.prebuilt.len(), 4);
    assert!(serpas.prebuilt.iter().all(|p| p.path == "{source}/stest_x86"));
    assert_eq!(serpas.bench_args["benchmark_t3"].args, vec!["-t3"]);
}

#[test]
fn test_igraph_stall_marker() {
    let config = roster();
    let igraph = config.project("igraph").unwrap();
    assert_eq!(igraph.stall_markers, vec!["Select all vertices"]);
    assert!(igraph.discovery.recursive);
    assert!(igraph.discovery.matches(Path::new("tests/flow.cpp")));
}
