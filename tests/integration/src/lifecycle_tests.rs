//! End-to-end lifecycle scenarios: machine start, reconfigure, stop

use std::fs;
use std::path::Path;
use std::sync::Once;

use pretty_assertions::assert_eq;
use sshcfg_core::{ConfigFileManager, HostConnection, ProjectIdentity, Settings};
use tempfile::TempDir;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn settings_for(dir: &Path) -> Settings {
    Settings {
        primary_file: Some(dir.join("config")),
        config_dir: Some(dir.join("config.d")),
        lock_timeout_secs: 2,
        ..Settings::default()
    }
}

fn conn(host: &str) -> HostConnection {
    HostConnection {
        host: host.to_string(),
        port: 22,
        user: "vagrant".to_string(),
        identity_file: None,
    }
}

#[test]
fn full_machine_lifecycle() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let settings = settings_for(temp.path());
    let primary = settings.primary_file().unwrap();
    let config_dir = settings.config_dir().unwrap();

    let manager = ConfigFileManager::new(&settings, ProjectIdentity::new("/home/u/app")).unwrap();

    // Machine start: write the file, then reconcile the Include block.
    manager.write("web", &conn("192.168.33.10")).unwrap();
    manager.write("db", &conn("192.168.33.11")).unwrap();
    manager.include().sync().unwrap();

    assert!(manager.include().exists().unwrap());
    assert_eq!(sshcfg_fs::io::list_conf_files(&config_dir).unwrap().len(), 2);
    let written = fs::read_to_string(manager.config_path("web")).unwrap();
    assert!(written.contains("Host app-web\n"));
    assert!(written.contains("  HostName 192.168.33.10\n"));
    assert!(written.contains("  Port 22\n"));

    // Reconfigure: full regeneration with the new address.
    manager.write("web", &conn("192.168.33.20")).unwrap();
    manager.include().sync().unwrap();
    let rewritten = fs::read_to_string(manager.config_path("web")).unwrap();
    assert!(rewritten.contains("  HostName 192.168.33.20\n"));
    assert!(!rewritten.contains("192.168.33.10"));

    // Stop one machine: the Include block stays while a file remains.
    assert!(manager.remove("web").unwrap());
    manager.include().sync().unwrap();
    assert!(manager.include().exists().unwrap());
    assert!(config_dir.is_dir());

    // Stop the last machine: block retracted, directory gone.
    assert!(manager.remove("db").unwrap());
    manager.include().sync().unwrap();
    assert!(!manager.include().exists().unwrap());
    assert!(!config_dir.exists());

    // The primary file holds no trace of the managed region.
    let leftover = fs::read_to_string(&primary).unwrap();
    assert!(!leftover.contains("sshcfg"));
    assert!(!leftover.contains("Include"));
}

#[test]
fn settings_loaded_from_toml_drive_the_engine() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let settings_path = temp.path().join("settings.toml");
    fs::write(
        &settings_path,
        format!(
            "config_dir = \"{}\"\nprimary_file = \"{}\"\nproject_isolation = false\n",
            temp.path().join("config.d").display(),
            temp.path().join("config").display(),
        ),
    )
    .unwrap();

    let settings = Settings::load(&settings_path).unwrap();
    let manager = ConfigFileManager::new(&settings, ProjectIdentity::new("/home/u/app")).unwrap();

    manager.write("web", &conn("10.0.0.5")).unwrap();
    manager.include().sync().unwrap();

    let content = fs::read_to_string(manager.config_path("web")).unwrap();
    assert!(content.contains("Host web\n"));

    let primary = fs::read_to_string(settings.primary_file().unwrap()).unwrap();
    assert!(primary.contains(&format!("Include {}/*.conf", temp.path().join("config.d").display())));
}

#[test]
fn user_authored_config_survives_the_whole_lifecycle() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let settings = settings_for(temp.path());
    let primary = settings.primary_file().unwrap();

    let original = "# private hosts\nHost bastion\n  HostName bastion.example.com\n  User admin\n";
    fs::write(&primary, original).unwrap();

    let manager = ConfigFileManager::new(&settings, ProjectIdentity::new("/home/u/app")).unwrap();
    manager.write("web", &conn("10.0.0.1")).unwrap();
    manager.include().sync().unwrap();

    let with_block = fs::read_to_string(&primary).unwrap();
    assert!(with_block.contains("Host bastion"));
    assert!(with_block.contains("Include"));

    manager.remove("web").unwrap();
    manager.include().sync().unwrap();
    assert_eq!(fs::read_to_string(&primary).unwrap(), original);
}
