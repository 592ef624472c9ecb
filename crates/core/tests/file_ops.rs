use std::fs;

use crashreport_core::fsops::{delete_file, replace_file_atomically, IoError};
use tempfile::tempdir;

#[test]
fn replace_swaps_contents_and_leaves_no_temp_files() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("Demo.crash");
    fs::write(&path, "old\n").expect("write original");

    replace_file_atomically(&path, b"new\n", tmp.path(), None).expect("replace");

    assert_eq!(fs::read_to_string(&path).expect("read back"), "new\n");
    let entries = fs::read_dir(tmp.path()).expect("read dir").count();
    assert_eq!(entries, 1);
}

#[cfg(unix)]
#[test]
fn replace_keeps_existing_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("Demo.crash");
    fs::write(&path, "old\n").expect("write original");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

    replace_file_atomically(&path, b"new\n", tmp.path(), None).expect("replace");

    let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);
}

#[test]
fn delete_missing_file_reports_io_error() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("gone.crash");

    let err = delete_file(&path, None).expect_err("missing file");
    assert!(matches!(err, IoError::Io { .. }), "unexpected error: {err:?}");
}
