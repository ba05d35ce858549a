//! Artifacts written by a run, read back from disk.

use chrono::NaiveDate;

use rangeharvest::models::{Chunk, DateWindow, Record};
use rangeharvest::storage::{ChunkArtifact, ChunkStore, JsonDirStore};

fn chunk(start: u32, end: u32) -> Chunk {
    let window = DateWindow::new(
        NaiveDate::from_ymd_opt(2024, 3, start).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, end).unwrap(),
    )
    .unwrap();
    Chunk::new(0, window)
}

fn record(day: u32, event: &str) -> Record {
    let cells: Vec<String> = ["14:00", "英國", "GBP", "3", event, "0.2%", "0.1%", "0.0%"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Record::from_cells(NaiveDate::from_ymd_opt(2024, 3, day).unwrap(), &cells).unwrap()
}

#[test]
fn artifact_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonDirStore::new(dir.path());
    let chunk = chunk(4, 10);

    let written = store
        .write_chunk(
            &chunk.id(),
            &ChunkArtifact::new(&chunk, vec![record(5, "GDP")]),
        )
        .unwrap();

    let path = dir.path().join("2024-03-04_2024-03-10.json");
    assert_eq!(written.location, path.display().to_string());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["meta"]["filter_start"], "2024-03-04");
    assert_eq!(json["meta"]["filter_end"], "2024-03-10");
    assert_eq!(json["meta"]["count"], 1);
    assert_eq!(json["data"][0]["event"], "GDP");
    assert_eq!(json["data"][0]["country"], "英國");
}

#[test]
fn chunks_never_share_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonDirStore::new(dir.path());

    for (a, b) in [(1, 7), (8, 14), (15, 16)] {
        let chunk = chunk(a, b);
        store
            .write_chunk(&chunk.id(), &ChunkArtifact::new(&chunk, vec![record(a, "CPI")]))
            .unwrap();
    }

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "2024-03-01_2024-03-07.json",
            "2024-03-08_2024-03-14.json",
            "2024-03-15_2024-03-16.json"
        ]
    );
    assert!(store.contains("2024-03-08_2024-03-14"));
}
