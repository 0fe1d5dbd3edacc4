use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const DRAWING: &str = "0
SECTION
2
BLOCKS
0
BLOCK
2
FSD_01
70
0
10
0.0
20
0.0
0
LWPOLYLINE
8
0
90
4
70
1
10
0.0
20
0.0
10
1000.0
20
0.0
10
1000.0
20
2000.0
10
0.0
20
2000.0
0
ENDBLK
0
BLOCK
2
QQQ_77
70
0
10
0.0
20
0.0
0
CIRCLE
8
0
10
0.0
20
0.0
40
100.0
0
ENDBLK
0
ENDSEC
0
SECTION
2
ENTITIES
0
INSERT
8
0
2
FSD_01
10
0.0
20
0.0
0
INSERT
8
0
2
QQQ_77
10
5000.0
20
0.0
0
ENDSEC
0
EOF
";

fn write_drawing(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("write drawing");
}

fn zlayer() -> Command {
    let mut cmd = Command::cargo_bin("zlayer").expect("binary");
    cmd.env_remove("ZLAYER_CONFIG");
    cmd
}

#[test]
fn converts_drawing_next_to_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_drawing(dir.path(), "B1.dxf", DRAWING);

    zlayer()
        .current_dir(dir.path())
        .args(["B1.dxf", "--no-cache"])
        .assert()
        .success()
        .stdout(predicate::str::contains("circulation: 1"))
        .stdout(predicate::str::contains("other: 1"));

    let converted = fs::read_to_string(dir.path().join("B1_converted.dxf")).expect("dxf");
    assert!(converted.contains("AC1009"));
    assert!(converted.contains("c-circulation-exit"));

    let csv = fs::read_to_string(dir.path().join("B1_layers.csv")).expect("csv");
    let mut lines = csv.lines();
    assert!(lines.next().expect("header").starts_with("id,block_name,"));
    assert_eq!(lines.count(), 2);
    assert!(!dir.path().join(".layer_classification_cache.json").exists());
}

#[test]
fn reports_statistics_and_unclassified_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_drawing(dir.path(), "B1.dxf", DRAWING);

    zlayer()
        .current_dir(dir.path())
        .args(["B1.dxf", "--no-cache", "--stats", "--show-unclassified"])
        .assert()
        .success()
        .stdout(predicate::str::contains("请求总数: 2"))
        .stdout(predicate::str::contains("1. QQQ_77"));
}

#[test]
fn cache_file_is_written_and_reused() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_drawing(dir.path(), "B1.dxf", DRAWING);

    zlayer()
        .current_dir(dir.path())
        .arg("B1.dxf")
        .assert()
        .success();
    assert!(dir.path().join(".layer_classification_cache.json").exists());

    zlayer()
        .current_dir(dir.path())
        .args(["B1.dxf", "--stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("缓存命中: 2"));
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");

    zlayer()
        .current_dir(dir.path())
        .args(["absent.dxf", "--no-cache"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.dxf"));
}

#[test]
fn drawing_without_blocks_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_drawing(
        dir.path(),
        "empty.dxf",
        "0\nSECTION\n2\nENTITIES\n0\nLINE\n8\n0\n10\n0.0\n20\n0.0\n11\n1.0\n21\n1.0\n0\nENDSEC\n0\nEOF\n",
    );

    zlayer()
        .current_dir(dir.path())
        .args(["empty.dxf", "--no-cache"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("未提取到任何块几何"));
    assert!(!dir.path().join("empty_converted.dxf").exists());
}
