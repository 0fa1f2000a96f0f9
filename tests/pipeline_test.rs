//! Integration tests for the log pipeline
//!
//! Drives the public service API from several producer threads and checks
//! what ends up on disk.

use modlog::config::Config;
use modlog::{LevelMask, LogError, LogLevel, LogService, NoMemory, ParamCell, VmMemory};
use proptest::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

// =============================================================================
// Helpers
// =============================================================================

fn service(dir: &Path) -> Arc<LogService> {
    let mut config = Config::default();
    config.logs.dir = dir.to_path_buf();
    config.logs.time_format = "%Y-%m-%d %H:%M:%S".into();
    config.crash.enabled = false;
    LogService::new(config)
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_level_routing_to_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    svc.init().unwrap();

    svc.register("plugins/foo").unwrap();
    for (level, text) in [
        (LogLevel::Debug, "debug-msg"),
        (LogLevel::Info, "info-msg"),
        (LogLevel::Warning, "warning-msg"),
        (LogLevel::Error, "error-msg"),
    ] {
        svc.log_message("plugins/foo", level, text, vec![]).unwrap();
    }
    svc.exit();

    let module = lines(&dir.path().join("plugins").join("foo.log"));
    assert_eq!(module.len(), 4);
    assert!(module[0].ends_with("[DEBUG] debug-msg"));
    assert!(module[3].ends_with("[ERROR] error-msg"));

    let warnings = lines(&dir.path().join("warnings.log"));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].ends_with("[plugins/foo] warning-msg"));

    let errors = lines(&dir.path().join("errors.log"));
    assert_eq!(errors.len(), 1);
    assert!(errors[0].ends_with("[plugins/foo] error-msg"));
}

#[test]
fn test_line_layout() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    svc.init().unwrap();

    svc.register("core").unwrap();
    svc.log_message(
        "core",
        LogLevel::Info,
        "started",
        vec![
            modlog::CallFrame::new("main.pwn", 10),
            modlog::CallFrame::new("init.inc", 2),
        ],
    )
    .unwrap();
    svc.exit();

    let line = &lines(&dir.path().join("core.log"))[0];
    // [YYYY-MM-DD HH:MM:SS] = 21 chars
    assert!(line.starts_with('['));
    assert_eq!(&line[20..22], "] ");
    assert_eq!(
        &line[22..],
        "[INFO] started (main.pwn:10 -> init.inc:2)"
    );
}

#[test]
fn test_shutdown_drains_all_messages() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    svc.init().unwrap();
    svc.register("drain").unwrap();

    const K: usize = 1000;
    for i in 0..K {
        svc.log_message("drain", LogLevel::Info, &format!("msg {}", i), vec![])
            .unwrap();
    }
    svc.exit();

    let written = lines(&dir.path().join("drain.log"));
    assert_eq!(written.len(), K);
    for (i, line) in written.iter().enumerate() {
        assert!(line.ends_with(&format!("msg {}", i)));
    }
}

#[test]
fn test_logging_after_exit_fails() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    svc.init().unwrap();
    svc.register("core").unwrap();
    svc.exit();

    assert!(matches!(
        svc.log_message("core", LogLevel::Info, "late", vec![]),
        Err(LogError::NotRunning)
    ));
}

#[test]
fn test_independent_producers_share_one_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());

    // Two plugins each hold their own reference
    svc.init().unwrap();
    svc.init().unwrap();

    let a = svc.register_plugin("a").unwrap();
    let b = svc.register_plugin("b").unwrap();
    a.log(LogLevel::Info, "from a").unwrap();

    svc.exit();
    // Still running for b
    b.log(LogLevel::Info, "from b").unwrap();
    svc.exit();

    assert_eq!(lines(&dir.path().join("plugins").join("a.log")).len(), 1);
    assert_eq!(lines(&dir.path().join("plugins").join("b.log")).len(), 1);
}

#[test]
fn test_native_call_failures_enqueue_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    svc.init().unwrap();
    svc.register("natives").unwrap();

    let bad_tag = svc.log_native_call("natives", "f", "z", &[ParamCell(1)], &NoMemory, vec![]);
    assert!(matches!(bad_tag, Err(LogError::UnrecognizedTag { .. })));

    let no_name = svc.log_native_call("natives", "", "", &[], &NoMemory, vec![]);
    assert!(matches!(no_name, Err(LogError::EmptyFunctionName)));

    let no_module = svc.log_native_call("", "f", "", &[], &NoMemory, vec![]);
    assert!(matches!(no_module, Err(LogError::EmptyModule)));

    let mut mem = VmMemory::new(0);
    let hi = mem.push_str("hi");
    svc.log_native_call(
        "natives",
        "funcname",
        "dfs",
        &[ParamCell::from_int(5), ParamCell::from_float(2.5), hi],
        &mem,
        vec![],
    )
    .unwrap();

    let stats = svc.stats().unwrap();
    svc.exit();

    let written = lines(&dir.path().join("natives.log"));
    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("[DEBUG] funcname(5, 2.5, \"hi\")"));
    assert_eq!(stats.written(), 1);
    assert_eq!(stats.write_failures(), 0);
}

#[test]
fn test_censored_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    svc.init().unwrap();

    let logger = svc.register("auth").unwrap();
    logger.set_log_level(LevelMask::ALL).unwrap();
    logger
        .log_native_call("Login", "d*", &[ParamCell(1), ParamCell(0x5EC2E7)], &NoMemory, vec![])
        .unwrap();
    svc.exit();

    let content = fs::read_to_string(dir.path().join("auth.log")).unwrap();
    assert!(content.contains("Login(1, \"*****\")"));
    assert!(!content.contains(&0x5EC2E7.to_string()));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// N concurrent messages give exactly N module lines, and each producer's
    /// lines keep their submission order.
    #[test]
    fn prop_no_loss_and_per_producer_order(
        producers in 1usize..6,
        per_producer in 1usize..60,
        modules in 1usize..4,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        svc.init().unwrap();
        for m in 0..modules {
            svc.register(&format!("group/m{}", m)).unwrap();
        }

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let svc = svc.clone();
                thread::spawn(move || {
                    let module = format!("group/m{}", p % modules);
                    for i in 0..per_producer {
                        svc.log_message(&module, LogLevel::Info, &format!("p{} {}", p, i), vec![])
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        svc.exit();

        let mut total = 0;
        let mut next: HashMap<usize, usize> = HashMap::new();
        for m in 0..modules {
            for line in lines(&dir.path().join("group").join(format!("m{}.log", m))) {
                total += 1;
                let body = line.rsplit("] ").next().unwrap();
                let (p, i) = body.split_once(' ').unwrap();
                let p: usize = p[1..].parse().unwrap();
                let i: usize = i.parse().unwrap();
                let expected = next.entry(p).or_insert(0);
                prop_assert_eq!(i, *expected);
                *expected += 1;
            }
        }
        prop_assert_eq!(total, producers * per_producer);
    }
}
