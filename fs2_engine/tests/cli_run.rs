mod common;

use std::process::Command;

use anyhow::{Context, Result};
use common::{command, message, speaker, Pack, WAIT};
use serde_json::Value;
use tempfile::tempdir;

fn pack() -> Pack {
    Pack::new()
        .sound("BGM01")
        .sound("rain")
        .image("BG01", (0, 0))
        .script(
            "op_cont2",
            &[
                command("bgm 1 BGM01"),
                command("bg 0 BG01"),
                speaker("Yumiko"),
                message("Which way?"),
                command("choice ev_left Left"),
                command("choice ev_right Right"),
                WAIT,
            ],
        )
        .loose_script(
            "ev_right",
            &[command("se 2 rain -1"), message("It starts to rain."), WAIT],
        )
}

fn engine_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fs2_engine"))
}

#[test]
fn headless_run_writes_logs_and_a_resumable_snapshot() -> Result<()> {
    let dir = tempdir()?;
    pack().write_to(dir.path())?;
    let save = dir.path().join("save.json");
    let audio_log = dir.path().join("logs/audio.json");
    let frame_log = dir.path().join("frame.json");

    let output = engine_bin()
        .arg("--asset-root")
        .arg(dir.path())
        .args(["--workers", "2", "--frames", "4", "--choose", "1", "--verbose"])
        .arg("--save")
        .arg(&save)
        .arg("--audio-log-json")
        .arg(&audio_log)
        .arg("--frame-json")
        .arg(&frame_log)
        .output()
        .context("running fs2_engine")?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "fs2_engine failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Yumiko: Which way?"), "{stdout}");
    assert!(stdout.contains("It starts to rain."), "{stdout}");
    assert!(stdout.contains("ev_right"), "{stdout}");

    let snapshot: Value = serde_json::from_str(&std::fs::read_to_string(&save)?)?;
    assert_eq!(snapshot["script"]["name"], "ev_right");
    assert_eq!(snapshot["music"]["name"], "BGM01");
    assert_eq!(snapshot["se"]["2"], "rain");
    assert_eq!(snapshot["images"]["bg"]["0"]["name"], "BG01");

    let events: Value = serde_json::from_str(&std::fs::read_to_string(&audio_log)?)?;
    let kinds: Vec<_> = events
        .as_array()
        .context("audio log should be an array")?
        .iter()
        .filter_map(|event| event["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"music_play"));
    assert!(kinds.contains(&"play"));

    let frame: Value = serde_json::from_str(&std::fs::read_to_string(&frame_log)?)?;
    assert_eq!(frame["draws"][0]["name"], "BG01");

    let resumed = engine_bin()
        .arg("--asset-root")
        .arg(dir.path())
        .arg("--load")
        .arg(&save)
        .output()
        .context("resuming fs2_engine")?;
    assert!(resumed.status.success());
    assert!(String::from_utf8_lossy(&resumed.stdout).contains("ev_right"));
    Ok(())
}

#[test]
fn missing_manifest_fails_cleanly() -> Result<()> {
    let dir = tempdir()?;
    let output = engine_bin().arg("--asset-root").arg(dir.path()).output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("manifest"));
    Ok(())
}
