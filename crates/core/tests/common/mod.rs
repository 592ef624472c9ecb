#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crashreport_core::config::ReporterConfig;
use crashreport_core::package::{Package, PackageDatabase, PackageDbResult};

pub const SAMPLE_LOG: &str = "\
Incident Identifier: 5D1E0B7C-0000-4000-8000-000000000001
Process:         Demo [321]
Path:            /var/mobile/Applications/ABCD-1234/Demo.app/Demo
Identifier:      com.example.demo
Version:         1.0 (1.0)
Code Type:       ARM (Native)
Parent Process:  launchd [1]

Date/Time:       2011-02-03 12:00:30.000 +0000
OS Version:      iPhone OS 4.2.1 (8C148)
Report Version:  104

Exception Type:  EXC_BAD_ACCESS (SIGSEGV)
Exception Codes: KERN_INVALID_ADDRESS at 0x00000010
Crashed Thread:  0

Thread 0 Crashed:
0   libobjc.A.dylib               \t0x00002508 0x2000 + 1288
1   Tweak.dylib                   \t0x00003010 0x3000 + 16
2   Demo                          \t0x00001040 0x1000 + 64
3   UIKit                         \t0x00004100 0x4000 + 256

Thread 1:
0   libsystem_kernel.dylib        \t0x00005010 0x5000 + 16

Thread 0 crashed with ARM Thread State:
    r0: 0x00000000    r1: 0x00000001     r2: 0x00000002

Binary Images:
    0x1000 -     0x1fff +Demo armv7  <aaaa0001> /var/mobile/Applications/ABCD-1234/Demo.app/Demo
    0x2000 -     0x2fff  libobjc.A.dylib armv7  <bbbb0002> /usr/lib/libobjc.A.dylib
    0x3000 -     0x3fff +Tweak.dylib armv7  <cccc0003> /Library/MobileSubstrate/DynamicLibraries/Tweak.dylib
    0x4000 -     0x4fff  UIKit armv7  <dddd0004> /System/Library/Frameworks/UIKit.framework/UIKit
    0x5000 -     0x5fff  libsystem_kernel.dylib armv7  <eeee0005> /usr/lib/system/libsystem_kernel.dylib
";

pub const TWEAK_PATH: &str = "/Library/MobileSubstrate/DynamicLibraries/Tweak.dylib";

/// Write `text` as a crash log named like the OS names them.
pub fn write_log(dir: &Path, process: &str, text: &str) -> PathBuf {
    let path = dir.join(format!("{process}_2011-02-03-120030_iPhone.crash"));
    std::fs::write(&path, text).expect("write crash log");
    path
}

/// Config with nothing pointing at the real filesystem.
pub fn test_config(root: &Path) -> ReporterConfig {
    ReporterConfig {
        mobile_log_dir: root.join("mobile"),
        root_log_dir: root.join("root"),
        temp_dir: root.join("tmp"),
        dpkg_dir: root.join("dpkg"),
        syslog_path: root.join("syslog"),
        os_build_marker: None,
        ..ReporterConfig::default()
    }
}

/// In-memory ownership table that counts queries.
#[derive(Debug, Default)]
pub struct FakeDb {
    pub owners: HashMap<String, Package>,
    pub queries: AtomicUsize,
}

impl FakeDb {
    pub fn with(mut self, path: &str, package: Package) -> Self {
        self.owners.insert(path.to_string(), package);
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl PackageDatabase for FakeDb {
    fn find_owner(&self, path: &Path) -> PackageDbResult<Option<Package>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.owners.get(path.to_string_lossy().as_ref()).cloned())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Package shipping `script` as its reporter script.
pub fn scripted_package(id: &str, script: &str) -> Package {
    Package::new(id).with_config(script.lines().map(String::from).collect())
}
