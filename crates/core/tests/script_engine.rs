use std::cmp::Ordering;

use crashreport_core::script::{
    evaluate, parse_line, Evaluation, IncludeKind, InstructionKind, LinkTarget, Script, ScriptError,
};

#[test]
fn deny_removes_links_declared_before_or_after_it() {
    let package = Script::parse_str(
        "link as Dev url https://dev.example.com\nlink as Forum url https://forum.example.com\n",
    );
    let default = Script::parse_str("deny Dev\n");

    let evaluated = evaluate([&package, &default]);
    let titles: Vec<&str> = evaluated.links.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, ["Forum"]);

    let deny_first = Script::parse_str("deny Forum\nlink as Forum url https://forum.example.com\n");
    assert!(evaluate([&deny_first]).links.is_empty());
}

#[test]
fn deny_matches_unlocalized_default_titles() {
    let script = Script::parse_str("link email dev@example.com\ndeny Support\n");
    assert!(evaluate([&script]).links.is_empty());
}

#[test]
fn duplicate_links_and_includes_keep_first_occurrence() {
    let a = Script::parse_str("link as Site url https://a.example.com\ninclude file /var/log/a.log\n");
    let b = Script::parse_str(
        "link as Site url https://a.example.com\ninclude as Again file /var/log/a.log\ninclude command echo hi\n",
    );

    let mut eval = Evaluation::new();
    eval.add_script(&a, Some("com.example.a"));
    eval.add_script(&b, Some("com.example.b"));
    let evaluated = eval.finish();

    assert_eq!(evaluated.links.len(), 1);
    assert_eq!(evaluated.links[0].origin.as_deref(), Some("com.example.a"));
    let includes: Vec<&str> = evaluated.includes.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(includes, ["a.log", "echo"]);

    let order: Vec<&str> = evaluated.rendering_order().map(|i| i.title.as_str()).collect();
    assert_eq!(order, ["Site", "a.log", "echo"]);
}

#[test]
fn compare_orders_by_declaration_then_title_then_kind() {
    let link = parse_line("link as Same url https://x.example.com", 1).expect("parse").expect("instruction");
    let include = parse_line("include as Same file /tmp/x", 1).expect("parse").expect("instruction");
    let later = parse_line("link as Aaa url https://y.example.com", 2).expect("parse").expect("instruction");

    assert_eq!(link.compare(&include), Ordering::Less);
    assert_eq!(include.compare(&link), Ordering::Greater);
    assert_eq!(include.compare(&later), Ordering::Less);
    assert_eq!(link.compare(&link.clone()), Ordering::Equal);
}

#[test]
fn bad_lines_are_reported_and_skipped() {
    let script = Script::parse_str(
        "# comment\n\nlink url https://ok.example.com\nfrobnicate now\ninclude as \"open quote file /x\nlink url\n",
    );
    assert_eq!(script.instructions.len(), 1);
    assert_eq!(script.errors.len(), 3);
    assert_eq!(
        script.errors[0],
        ScriptError::UnknownKeyword { line_no: 4, keyword: "frobnicate".to_string() }
    );
    assert_eq!(script.errors[1], ScriptError::UnterminatedQuote { line_no: 5 });
    assert!(matches!(script.errors[2], ScriptError::Malformed { line_no: 6, .. }));
}

#[test]
fn canonical_rendering_reparses_to_the_same_instructions() {
    let source = "\
link email dev@example.com, support@example.com
link as \"Mail Me\" email me@example.com
link as \"Bug Tracker\" url https://bugs.example.com/new?x=1
include file /var/log/app.log
include as \"Prefs File\" plist /var/mobile/Library/Preferences/com.example.plist
include command grep -i \"it's broken\" /var/log/syslog
deny Support
";
    let script = Script::parse_str(source);
    assert!(script.errors.is_empty(), "unexpected errors: {:?}", script.errors);
    assert_eq!(script.instructions.len(), 7);

    let rendered = script.to_string();
    let reparsed = Script::parse_str(&rendered);
    assert!(reparsed.errors.is_empty(), "rendered script should reparse: {rendered}");
    assert_eq!(reparsed.instructions.len(), script.instructions.len());
    for (a, b) in script.instructions.iter().zip(&reparsed.instructions) {
        assert_eq!(a.title, b.title);
        assert_eq!(a.kind, b.kind);
    }

    let support = script.instructions[0].as_link().expect("link");
    assert!(support.is_support);
    assert_eq!(support.recipients(), ["dev@example.com", "support@example.com"]);
    let mail_me = script.instructions[1].as_link().expect("link");
    assert!(!mail_me.is_support);

    match &script.instructions[5].kind {
        InstructionKind::Include(inc) => {
            assert_eq!(inc.kind, IncludeKind::Command);
            assert_eq!(script.instructions[5].title, "grep");
        }
        other => panic!("expected include, got {other:?}"),
    }
    assert!(matches!(
        script.instructions[2].as_link().map(|l| &l.target),
        Some(LinkTarget::Url(u)) if u == "https://bugs.example.com/new?x=1"
    ));
}
