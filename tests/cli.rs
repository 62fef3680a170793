use std::io::Write;
use std::process::{Command, Stdio};

fn comp_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_comp"))
}

#[test]
fn evaluates_an_expression() {
    let out = comp_bin().arg("1 + 2 * 3").output().expect("failed to run comp");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "7");
}

#[test]
fn quotes_strings_as_json() {
    let out = comp_bin().arg("`hello` ++ ` world`").output().expect("failed to run comp");
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "\"hello world\"");
}

#[test]
fn compile_errors_go_to_stderr() {
    let out = comp_bin().arg("a").output().expect("failed to run comp");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unknown identifier 'a'"), "stderr: {}", stderr);
}

#[test]
fn reads_stdin_with_at_notation() {
    let mut child = comp_bin()
        .args(["-f", "@json", "[i | i <- in.list, i != 2]"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn comp");

    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(br#"{"list": [1, 2, 3]}"#)
        .expect("write stdin");

    let out = child.wait_with_output().expect("failed to wait for comp");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "[1, 3]");
}

#[test]
fn limit_flag_caps_output() {
    let out = comp_bin()
        .args(["--limit", "2", "[1, 2, 3, 4]"])
        .output()
        .expect("failed to run comp");
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "[1, 2]");
}

#[test]
fn serial_flag_matches_parallel_output_up_to_order() {
    let expr = "[i * i | i <- [1,2,3,4,5,6,7,8]]";

    let serial = comp_bin().args(["--serial", expr]).output().expect("failed to run comp");
    let parallel = comp_bin().arg(expr).output().expect("failed to run comp");
    assert!(serial.status.success() && parallel.status.success());

    let parse = |out: &[u8]| -> Vec<i64> {
        let text = String::from_utf8_lossy(out);
        let mut nums: Vec<i64> = text
            .trim()
            .trim_matches(['[', ']'])
            .split(", ")
            .map(|s| s.parse().unwrap())
            .collect();
        nums.sort_unstable();
        nums
    };
    assert_eq!(parse(&serial.stdout), parse(&parallel.stdout));
}

#[test]
fn missing_file_fails() {
    let out = comp_bin()
        .args(["-f", "no-such-file.json", "1"])
        .output()
        .expect("failed to run comp");
    assert!(!out.status.success());
    assert!(!out.stderr.is_empty());
}
