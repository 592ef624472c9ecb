mod common;

use common::{scripted_package, test_config, write_log, FakeDb, SAMPLE_LOG, TWEAK_PATH};
use crashreport_core::crashlog::{scan_directory, CrashLog, CrashLogError, LogType, ParseError};
use crashreport_core::package::{PackageResolver, Resolution};
use crashreport_core::symbols::{InMemorySymbols, SymbolTable, SymbolicationError};
use tempfile::tempdir;

fn loaded(text: &str) -> (tempfile::TempDir, CrashLog) {
    let tmp = tempdir().expect("temp dir");
    let path = write_log(tmp.path(), "Demo", text);
    let mut log = CrashLog::new(path);
    log.load(&test_config(tmp.path())).expect("load crash log");
    (tmp, log)
}

#[test]
fn load_reads_header_threads_and_images() {
    let (_tmp, log) = loaded(SAMPLE_LOG);

    assert_eq!(log.log_name(), "Demo");
    assert_eq!(log.log_type(), LogType::App);
    assert!(!log.is_symbolicated());

    let header = log.header().expect("header");
    assert_eq!(header.process_name, "Demo");
    assert_eq!(header.pid, Some(321));
    assert_eq!(header.identifier.as_deref(), Some("com.example.demo"));
    assert_eq!(header.exception_type.as_deref(), Some("EXC_BAD_ACCESS (SIGSEGV)"));
    assert_eq!(header.crashed_thread, 0);

    assert_eq!(log.threads().len(), 2);
    let crashed = log.crashed_thread().expect("crashed thread");
    assert!(crashed.crashed);
    assert_eq!(crashed.frames.len(), 4);
    assert_eq!(crashed.frames[0].address, 0x2508);

    assert_eq!(log.images().len(), 5);
    let tweak = log.images().iter().find(|i| i.name == "Tweak.dylib").expect("tweak image");
    assert!(tweak.from_unofficial_source);
    assert_eq!(tweak.uuid.as_deref(), Some("cccc0003"));
    assert_eq!(tweak.size, 0x1000);

    let fp = log.fingerprint().expect("fingerprint");
    assert_eq!(fp.len(), 64);
}

#[test]
fn victim_does_not_depend_on_image_order() {
    let (_tmp, log) = loaded(SAMPLE_LOG);
    assert_eq!(log.victim().map(|v| v.name.as_str()), Some("libobjc.A.dylib"));

    // Same log with the image table reversed.
    let (head, table) = SAMPLE_LOG.split_once("Binary Images:\n").expect("image table");
    let mut rows: Vec<&str> = table.lines().collect();
    rows.reverse();
    let reversed = format!("{head}Binary Images:\n{}\n", rows.join("\n"));
    let (_tmp2, log2) = loaded(&reversed);
    assert_eq!(log2.victim().map(|v| v.name.as_str()), Some("libobjc.A.dylib"));
}

#[test]
fn suspects_skip_victim_and_system_images() {
    let (tmp, log) = loaded(SAMPLE_LOG);
    let db = FakeDb::default().with(TWEAK_PATH, scripted_package("com.example.tweak", "link email dev@example.com"));
    let resolver = PackageResolver::new(db, &test_config(tmp.path()));

    let suspects = log.suspects(&resolver);
    let names: Vec<&str> = suspects.iter().map(|s| s.image.name.as_str()).collect();
    assert_eq!(names, ["Tweak.dylib", "Demo"]);
    assert!(matches!(&suspects[0].resolution, Resolution::Package(p) if p.identifier == "com.example.tweak"));
    assert!(matches!(&suspects[1].resolution, Resolution::Package(p) if p.is_app_store));

    // Potential suspects add nothing new here: the victim is a system image.
    let potential = log.potential_suspects(&resolver);
    assert_eq!(potential.len(), 2);
}

#[test]
fn unofficial_victim_appears_in_potential_suspects() {
    let text = SAMPLE_LOG.replace(
        "    0x2000 -     0x2fff  libobjc.A.dylib",
        "    0x2000 -     0x2fff +libobjc.A.dylib",
    );
    let (tmp, log) = loaded(&text);
    let resolver = PackageResolver::new(FakeDb::default(), &test_config(tmp.path()));

    let potential = log.potential_suspects(&resolver);
    let names: Vec<&str> = potential.iter().map(|s| s.image.name.as_str()).collect();
    assert_eq!(names, ["Tweak.dylib", "Demo", "libobjc.A.dylib"]);
}

#[test]
fn image_row_covering_address_space_is_skipped() {
    let text = SAMPLE_LOG.replace(
        "    0x5000 -     0x5fff  libsystem_kernel.dylib",
        "    0x0 - 0xffffffffffffffff  huge /usr/lib/huge.dylib\n    0x5000 -     0x5fff  libsystem_kernel.dylib",
    );
    let (_tmp, log) = loaded(&text);
    assert_eq!(log.images().len(), 5);
    assert!(log.images().iter().all(|i| i.name != "huge"));
}

#[test]
fn malformed_logs_are_rejected() {
    let tmp = tempdir().expect("temp dir");
    let config = test_config(tmp.path());

    let no_date = SAMPLE_LOG.replace("Date/Time:       2011-02-03 12:00:30.000 +0000\n", "");
    let mut log = CrashLog::new(write_log(tmp.path(), "NoDate", &no_date));
    let err = log.load(&config).expect_err("missing date");
    assert!(matches!(err, ParseError::Malformed { .. }), "unexpected error: {err}");
    assert!(!log.is_loaded());

    let wrong_thread = SAMPLE_LOG.replace("Crashed Thread:  0", "Crashed Thread:  7");
    let mut log = CrashLog::new(write_log(tmp.path(), "WrongThread", &wrong_thread));
    assert!(matches!(log.load(&config), Err(ParseError::Malformed { .. })));

    let mut missing = CrashLog::new(tmp.path().join("Gone_2011-02-03-120030.crash"));
    assert!(matches!(missing.load(&config), Err(ParseError::Unreadable { .. })));
}

#[test]
fn symbolicate_rewrites_resolved_frames_only() {
    let (tmp, mut log) = loaded(SAMPLE_LOG);
    let mut symbols = InMemorySymbols::new();
    symbols.insert_uuid(
        "bbbb0002",
        SymbolTable::new(vec![(0x100, "objc_retain".into()), (0x500, "objc_msgSend".into())]),
    );
    symbols.insert_uuid("cccc0003", SymbolTable::new(vec![(0x0, "TweakHook".into())]));

    let summary = log.symbolicate(&symbols, tmp.path(), None).expect("symbolicate");
    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.errors.len(), 3);
    assert!(summary
        .errors
        .iter()
        .all(|e| matches!(e, SymbolicationError::NoSymbols { .. })));
    assert!(log.is_symbolicated());

    let on_disk = std::fs::read_to_string(log.path()).expect("read rewritten log");
    assert!(on_disk.contains("\t0x00002508 objc_msgSend + 8\n"));
    assert!(on_disk.contains("\t0x00003010 TweakHook + 16\n"));
    assert!(on_disk.contains("\t0x00001040 0x1000 + 64\n"));
    assert_eq!(on_disk.lines().count(), SAMPLE_LOG.lines().count());
    assert_eq!(log.text(), Some(on_disk.as_str()));

    // A second pass is a no-op.
    let again = log.symbolicate(&symbols, tmp.path(), None).expect("second symbolicate");
    assert_eq!(again.resolved, 0);
    let after = std::fs::read_to_string(log.path()).expect("read log");
    assert_eq!(after, on_disk);
}

#[test]
fn symbolicate_without_symbols_leaves_file_alone() {
    let (tmp, mut log) = loaded(SAMPLE_LOG);
    let before = std::fs::read(log.path()).expect("read log");

    let summary = log.symbolicate(&InMemorySymbols::new(), tmp.path(), None).expect("symbolicate");
    assert_eq!(summary.resolved, 0);
    assert!(!summary.is_complete());
    assert!(!log.is_symbolicated());
    assert_eq!(std::fs::read(log.path()).expect("read log"), before);
}

#[test]
fn symbolicate_requires_load() {
    let tmp = tempdir().expect("temp dir");
    let mut log = CrashLog::new(write_log(tmp.path(), "Demo", SAMPLE_LOG));
    let err = log.symbolicate(&InMemorySymbols::new(), tmp.path(), None).expect_err("not loaded");
    assert!(matches!(err, CrashLogError::NotLoaded(_)));
}

#[test]
fn scan_groups_by_process_and_delete_removes_file() {
    let tmp = tempdir().expect("temp dir");
    let dir = tmp.path();
    std::fs::write(dir.join("Demo_2011-02-03-120030_iPhone.crash"), SAMPLE_LOG).expect("write");
    std::fs::write(dir.join("Demo_2011-02-04-090000_iPhone.crash"), SAMPLE_LOG).expect("write");
    std::fs::write(dir.join("SpringBoard_2011-02-01-080000.ips"), SAMPLE_LOG).expect("write");
    std::fs::write(dir.join("notes.txt"), "not a log").expect("write");

    let groups = scan_directory(dir).expect("scan");
    let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["Demo", "SpringBoard"]);
    let demo = &groups[0];
    assert_eq!(demo.crash_logs.len(), 2);
    let newest = demo.newest().expect("newest");
    assert!(newest.path().ends_with("Demo_2011-02-04-090000_iPhone.crash"));
    assert_eq!(demo.unviewed_count(), 2);

    let mut groups = groups;
    groups[0].crash_logs[1].mark_viewed();
    assert_eq!(groups[0].unviewed_count(), 1);
    let demo = &groups[0];
    let newest = demo.newest().expect("newest");

    newest.delete(None).expect("delete");
    assert!(!newest.path().exists());

    assert!(scan_directory(&dir.join("missing")).expect("scan missing").is_empty());
}
