use std::fs;
use std::process::Command;

#[test]
fn cli_writes_outputs_and_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("src");
    let out = dir.path().join("out");
    fs::create_dir_all(src.join("icons")).expect("mkdir");
    fs::write(
        src.join("icons").join("dot.svg"),
        "<!-- c -->\n<svg xmlns=\"http://www.w3.org/2000/svg\">\n  <g/>\n</svg>\n",
    )
    .expect("write svg");
    fs::write(src.join("readme.txt"), "plain").expect("write txt");
    let summary_path = dir.path().join("summary.json");

    let status = Command::new(env!("CARGO_BIN_EXE_imgshrink"))
        .arg("--base")
        .arg(&src)
        .arg("--output")
        .arg(&out)
        .arg("--batched")
        .arg("--summary-json")
        .arg(&summary_path)
        .arg(src.join("icons").join("dot.svg"))
        .arg(src.join("readme.txt"))
        .status()
        .expect("run cli");
    assert!(status.success());

    let svg = fs::read_to_string(out.join("icons").join("dot.svg")).expect("svg output");
    assert_eq!(svg, "<svg xmlns=\"http://www.w3.org/2000/svg\"><g/></svg>");
    assert_eq!(
        fs::read_to_string(out.join("readme.txt")).expect("txt output"),
        "plain"
    );

    let summary: serde_json::Value =
        serde_json::from_slice(&fs::read(&summary_path).expect("summary")).expect("json");
    assert_eq!(summary["item_count"], 1);
    assert!(summary["bytes_saved"].as_u64().expect("saved") > 0);
}

#[test]
fn cli_fails_on_broken_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("broken.png");
    fs::write(&input, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]).expect("write");

    let status = Command::new(env!("CARGO_BIN_EXE_imgshrink"))
        .arg("--output")
        .arg(dir.path().join("out"))
        .arg(&input)
        .status()
        .expect("run cli");
    assert!(!status.success());
}
