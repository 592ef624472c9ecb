use crashreport_core::decode::{decimal_to_integer, hex_str, hex_to_integer, nibble, INVALID};
use crashreport_core::time::{format_syslog_time, parse_crash_date, syslog_line_time};
use crashreport_core::version;

#[test]
fn version_is_non_empty() {
    let v = version();
    assert!(!v.is_empty());
}

#[test]
fn hex_decoding_skips_prefix_and_junk() {
    assert_eq!(hex_str("0x1A"), 26);
    assert_eq!(hex_str("0x00002508"), 0x2508);
    assert_eq!(hex_to_integer(b"dead-beef"), 0xdead_beef);
    assert_eq!(hex_str(""), 0);
    assert_eq!(nibble(b'g'), INVALID);
    assert_eq!(nibble(b'F'), 15);
}

#[test]
fn decimal_decoding_is_positional() {
    assert_eq!(decimal_to_integer(b"2011"), 2011);
    assert_eq!(decimal_to_integer(b"007"), 7);
    assert_eq!(decimal_to_integer(b""), 0);
}

#[test]
fn crash_dates_and_syslog_stamps_line_up() {
    let crash = parse_crash_date("2011-02-03 12:00:30.000 +0000").expect("crash date");
    assert_eq!(format_syslog_time(&crash), "Feb  3 12:00:30");

    let line = "Feb  3 12:00:10 iPhone SpringBoard[15]: something happened";
    assert_eq!(syslog_line_time(line, 2011), parse_crash_date("2011-02-03 12:00:10"));
    assert_eq!(syslog_line_time("   continuation", 2011), None);
}
