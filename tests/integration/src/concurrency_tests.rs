//! Concurrent access across machines and the shared primary file
//!
//! Distinct machine files must never contend; writers to the same path
//! must serialize behind the advisory lock without deadlocking.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use sshcfg_core::{ConfigFileManager, HostConnection, ProjectIdentity, Settings};
use sshcfg_lock::{LockMode, acquire};
use tempfile::TempDir;

fn settings_for(dir: &Path) -> Settings {
    Settings {
        primary_file: Some(dir.join("config")),
        config_dir: Some(dir.join("config.d")),
        lock_timeout_secs: 10,
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
fn distinct_machines_write_concurrently() {
    let temp = TempDir::new().unwrap();
    let manager = Arc::new(
        ConfigFileManager::new(&settings_for(temp.path()), ProjectIdentity::new("/home/u/app"))
            .unwrap(),
    );

    let machines = ["web", "db", "cache", "worker"];
    let barrier = Arc::new(Barrier::new(machines.len()));

    let handles: Vec<_> = machines
        .into_iter()
        .enumerate()
        .map(|(i, machine)| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..20 {
                    manager
                        .write(machine, &conn(&format!("10.0.{i}.{round}")))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread should not panic");
    }

    for machine in machines {
        let content = fs::read_to_string(manager.config_path(machine)).unwrap();
        assert!(content.contains(&format!("Host app-{machine}\n")));
    }
}

#[test]
fn same_machine_writers_serialize_without_deadlock() {
    let temp = TempDir::new().unwrap();
    let manager = Arc::new(
        ConfigFileManager::new(&settings_for(temp.path()), ProjectIdentity::new("/home/u/app"))
            .unwrap(),
    );

    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.write("web", &conn(&format!("10.0.0.{i}"))).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread should not panic");
    }

    // The surviving file is one complete write, never a mixture.
    let content = fs::read_to_string(manager.config_path("web")).unwrap();
    assert!(content.starts_with("# Managed by sshcfg\n"));
    assert_eq!(content.matches("Host app-web\n").count(), 1);
    assert!(content.ends_with("  LogLevel FATAL\n"));
}

#[test]
fn concurrent_sync_converges_to_one_block() {
    let temp = TempDir::new().unwrap();
    let settings = settings_for(temp.path());
    let manager = Arc::new(
        ConfigFileManager::new(&settings, ProjectIdentity::new("/home/u/app")).unwrap(),
    );

    let machines = ["web", "db", "cache"];
    let barrier = Arc::new(Barrier::new(machines.len()));

    let handles: Vec<_> = machines
        .into_iter()
        .enumerate()
        .map(|(i, machine)| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.write(machine, &conn(&format!("10.1.0.{i}"))).unwrap();
                manager.include().sync().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("sync thread should not panic");
    }

    let primary = fs::read_to_string(settings.primary_file().unwrap()).unwrap();
    let begins = primary
        .lines()
        .filter(|l| *l == sshcfg_core::include::BEGIN_MARKER)
        .count();
    assert_eq!(begins, 1);
}

#[test]
fn held_lock_times_out_second_acquirer() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("contended.conf");

    let _held = acquire(&path, LockMode::Exclusive, Duration::from_secs(1)).unwrap();

    let contender = {
        let path = path.clone();
        thread::spawn(move || acquire(&path, LockMode::Exclusive, Duration::from_millis(300)))
    };
    let result = contender.join().unwrap();
    assert!(matches!(result, Err(sshcfg_lock::Error::Timeout { .. })));
}
