#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const SAMPLE_LOG: &str = "\
Process:         Demo [321]
Path:            /var/mobile/Applications/ABCD-1234/Demo.app/Demo
Identifier:      com.example.demo
Version:         1.0 (1.0)
Date/Time:       2011-02-03 12:00:30.000 +0000
OS Version:      iPhone OS 4.2.1 (8C148)

Exception Type:  EXC_BAD_ACCESS (SIGSEGV)
Crashed Thread:  0

Thread 0 Crashed:
0   libobjc.A.dylib               \t0x00002508 0x2000 + 1288
1   Tweak.dylib                   \t0x00003010 0x3000 + 16
2   Demo                          \t0x00001040 0x1000 + 64
3   UIKit                         \t0x00004100 0x4000 + 256

Thread 1:
0   libsystem_kernel.dylib        \t0x00005010 0x5000 + 16

Binary Images:
    0x1000 -     0x1fff +Demo armv7  <aaaa0001> /var/mobile/Applications/ABCD-1234/Demo.app/Demo
    0x2000 -     0x2fff  libobjc.A.dylib armv7  <bbbb0002> /usr/lib/libobjc.A.dylib
    0x3000 -     0x3fff +Tweak.dylib armv7  <cccc0003> /Library/MobileSubstrate/DynamicLibraries/Tweak.dylib
    0x4000 -     0x4fff  UIKit armv7  <dddd0004> /System/Library/Frameworks/UIKit.framework/UIKit
    0x5000 -     0x5fff  libsystem_kernel.dylib armv7  <eeee0005> /usr/lib/system/libsystem_kernel.dylib
";

/// Scratch layout for one CLI run: log dir, dpkg admin dir, and a config
/// file pointing at both.
pub struct Fixture {
    pub root: PathBuf,
    pub logs: PathBuf,
    pub dpkg: PathBuf,
    pub config: PathBuf,
}

impl Fixture {
    pub fn new(root: &Path) -> Self {
        Self::with_extra(root, "")
    }

    /// `extra` is spliced into the config JSON object (`"key": value,` form).
    pub fn with_extra(root: &Path, extra: &str) -> Self {
        let logs = root.join("logs");
        let dpkg = root.join("dpkg");
        let tmp = root.join("tmp");
        for dir in [&logs, &dpkg.join("info"), &tmp] {
            fs::create_dir_all(dir).expect("create fixture dir");
        }
        write_dpkg(&dpkg);

        let config = root.join("crashreport.json");
        let body = format!(
            r#"{{
  {extra}
  "mobile_log_dir": {logs:?},
  "root_log_dir": {logs:?},
  "temp_dir": {tmp:?},
  "dpkg_dir": {dpkg:?},
  "syslog_path": {syslog:?},
  "os_build_marker": null
}}"#,
            logs = logs.display().to_string(),
            tmp = tmp.display().to_string(),
            dpkg = dpkg.display().to_string(),
            syslog = root.join("syslog").display().to_string(),
        );
        fs::write(&config, body).expect("write config");
        Self { root: root.to_path_buf(), logs, dpkg, config }
    }

    pub fn write_log(&self, file_name: &str) -> PathBuf {
        let path = self.logs.join(file_name);
        fs::write(&path, SAMPLE_LOG).expect("write crash log");
        path
    }
}

fn write_dpkg(dpkg: &Path) {
    fs::write(
        dpkg.join("status"),
        "Package: com.example.tweak\nStatus: install ok installed\nName: Example Tweak\nAuthor: Jane Dev <jane@example.com>\n",
    )
    .expect("write status");
    fs::write(
        dpkg.join("info/com.example.tweak.list"),
        "/.\n/Library\n/Library/MobileSubstrate/DynamicLibraries/Tweak.dylib\n",
    )
    .expect("write list");
    fs::write(
        dpkg.join("info/com.example.tweak.crash_reporter"),
        "link as \"Bug Tracker\" url https://bugs.example.com\n",
    )
    .expect("write script");
}
