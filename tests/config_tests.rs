use std::fs;
use std::path::PathBuf;

use web_sweep_rs::config::{load_file_config, load_file_config_in, Overrides, SweepConfig, DEFAULT_CONFIG_FILE};
use web_sweep_rs::fetch::ParseMode;
use web_sweep_rs::ports::load_port_table_from_path;
use web_sweep_rs::targets::load_targets_from_path;
use web_sweep_rs::types::PortSpec;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("web-sweep-config-{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn targets_file_is_read_and_parsed() {
    let dir = scratch_dir("targets");
    let path = dir.join("targets.txt");
    fs::write(&path, "# lab\n10.0.0.0/30\n\n192.0.2.1-3.7  # printers\n").unwrap();

    let specs = load_targets_from_path(&path).unwrap();
    let shown: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
    assert_eq!(shown, vec!["10.0.0.0/30", "192.0.2.1-3.7"]);
    assert_eq!(specs.iter().map(|s| s.len()).sum::<u64>(), 2 + 3);

    fs::write(&path, "10.0.0.0/30\nnot-a-target\n").unwrap();
    let err = load_targets_from_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("line 2"));
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn ports_file_is_read_and_parsed() {
    let dir = scratch_dir("ports");
    let path = dir.join("ports.txt");
    fs::write(&path, "80\n8443   # admin\n9000-9001/https\n").unwrap();

    let table = load_port_table_from_path(&path).unwrap();
    assert_eq!(
        table,
        vec![PortSpec::http(80), PortSpec::https(8443), PortSpec::https(9000), PortSpec::https(9001)]
    );
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_list_files_are_errors() {
    let dir = scratch_dir("missing-lists");
    let err = load_targets_from_path(dir.join("nope.txt")).unwrap_err();
    assert!(err.to_string().contains("failed to read targets file"));
    let err = load_port_table_from_path(dir.join("nope.txt")).unwrap_err();
    assert!(err.to_string().contains("failed to read ports file"));
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn default_config_file_is_picked_up_from_dir() {
    let dir = scratch_dir("default-file");
    assert!(load_file_config_in(&dir, None).unwrap().is_none(), "absent default file is not an error");

    fs::write(dir.join(DEFAULT_CONFIG_FILE), "concurrency: 8\nstrict_parse: true\nmax_redirects: 2\n").unwrap();
    let file = load_file_config_in(&dir, None).unwrap().expect("default file found");
    assert_eq!(file.concurrency, Some(8));

    let cfg = SweepConfig::resolve(Some(file), Overrides::default()).unwrap();
    assert_eq!(cfg.concurrency, 8);
    assert_eq!(cfg.fetch.parse_mode, ParseMode::Strict);
    assert_eq!(cfg.fetch.max_redirects, 2);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn named_config_file_must_exist_and_parse() {
    let dir = scratch_dir("named-file");
    let missing = dir.join("absent.yaml");
    let err = load_file_config(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    let bad = dir.join("bad.yaml");
    fs::write(&bad, "concurency: 8\n").unwrap();
    let err = load_file_config(Some(&bad)).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    let good = dir.join("good.yaml");
    fs::write(&good, "workers: 3\n").unwrap();
    let file = load_file_config(Some(&good)).unwrap().unwrap();
    assert_eq!(file.workers, Some(3));
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn list_files_named_in_config_are_loaded() {
    let dir = scratch_dir("file-lists");
    let targets = dir.join("targets.txt");
    let ports = dir.join("ports.txt");
    fs::write(&targets, "198.51.100.0/30\n").unwrap();
    fs::write(&ports, "8080\n").unwrap();
    fs::write(
        dir.join(DEFAULT_CONFIG_FILE),
        format!("targets_file: {}\nports_file: {}\n", targets.display(), ports.display()),
    )
    .unwrap();

    let file = load_file_config_in(&dir, None).unwrap();
    let cfg = SweepConfig::resolve(file, Overrides::default()).unwrap();
    assert_eq!(cfg.total_hosts(), 2);
    assert_eq!(cfg.ports, vec![PortSpec::http(8080)]);

    // a ports file on the command line wins over the one in the file
    let cli_ports = dir.join("cli-ports.txt");
    fs::write(&cli_ports, "443\n").unwrap();
    let file = load_file_config_in(&dir, None).unwrap();
    let cli = Overrides {
        ports_file: Some(cli_ports),
        ..Overrides::default()
    };
    let cfg = SweepConfig::resolve(file, cli).unwrap();
    assert_eq!(cfg.ports, vec![PortSpec::https(443)]);
    let _ = fs::remove_dir_all(dir);
}
