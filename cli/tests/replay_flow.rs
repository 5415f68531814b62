use assert_cmd::Command;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn signal_log() -> String {
    [
        r#"{"signal":"session_started","info":{"map":"The Skeld","mode":"Classic"}}"#,
        r#"{"signal":"roster_available","players":[{"player_id":0,"name":"Alice"},{"player_id":1,"name":"Bob"}]}"#,
        r#"{"signal":"role_assigned","player_id":0,"role":"Impostor","team":"impostor"}"#,
        r#"{"signal":"death","victim_id":1,"evidence":{"kind":"explicit_kill","killer":"Alice"}}"#,
        r#"{"signal":"session_ended","reason":{"reason":"impostors_by_kill"}}"#,
    ]
    .join("\n")
}

#[test]
fn replay_records_and_lists_the_session() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let log = dir.path().join("signals.jsonl");
    std::fs::write(&log, signal_log())?;
    let data_dir = dir.path().join("records");

    Command::cargo_bin("crewlog")?
        .arg("replay")
        .arg(&log)
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(contains("Replayed 5 signal(s)"))
        .stdout(contains("Recorded:"));

    let record_file = std::fs::read_dir(&data_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| path.extension().is_some_and(|ext| ext == "json"))
        .ok_or("no record file written")?;
    let raw = std::fs::read_to_string(record_file)?;
    let record: crewlog_protocol::SessionRecord = serde_json::from_str(&raw)?;
    assert_eq!(record.metadata.map_name, "The Skeld");
    assert_eq!(record.statistics.total_kills, 1);
    assert_eq!(record.winner.win_condition, "Killed the crew");

    Command::cargo_bin("crewlog")?
        .arg("list")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(contains("[pending]"))
        .stdout(contains("1 record(s), 1 pending."));

    Ok(())
}

#[test]
fn replay_rejects_a_malformed_signal_line() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let log = dir.path().join("signals.jsonl");
    std::fs::write(&log, r#"{"signal":"not_a_signal"}"#)?;

    Command::cargo_bin("crewlog")?
        .arg("replay")
        .arg(&log)
        .arg("--data-dir")
        .arg(dir.path().join("records"))
        .assert()
        .failure()
        .stderr(contains("invalid signal on line 1"));

    Ok(())
}

#[test]
fn backlog_reports_when_nothing_is_pending() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    Command::cargo_bin("crewlog")?
        .arg("backlog")
        .arg("--data-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(contains("No pending session records"));

    Ok(())
}
