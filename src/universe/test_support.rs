//! Fixture helpers shared by the universe test modules.

use crate::universe::publish::gzip_bytes;
use flate2::read::MultiGzDecoder;
use serde_json::{json, Value};
use std::fs;
use std::io::Read;
use std::path::Path;

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
}

pub fn write_gz_lines<S: AsRef<str>>(path: &Path, lines: &[S]) {
    ensure_parent(path);
    let mut raw = String::new();
    for line in lines {
        raw.push_str(line.as_ref());
        raw.push('\n');
    }
    fs::write(path, gzip_bytes(raw.as_bytes()).unwrap()).unwrap();
}

/// Raw, possibly non-UTF-8 content, gzip-compressed as-is.
pub fn write_gz_bytes(path: &Path, raw: &[u8]) {
    ensure_parent(path);
    fs::write(path, gzip_bytes(raw).unwrap()).unwrap();
}

pub fn write_gz_json(path: &Path, value: &Value) {
    ensure_parent(path);
    fs::write(path, gzip_bytes(value.to_string().as_bytes()).unwrap()).unwrap();
}

pub fn write_json(path: &Path, value: &Value) {
    ensure_parent(path);
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

pub fn read_gz_bytes(path: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    MultiGzDecoder::new(fs::File::open(path).unwrap())
        .read_to_end(&mut out)
        .unwrap();
    out
}

pub fn read_gz_string(path: &Path) -> String {
    let mut out = String::new();
    MultiGzDecoder::new(fs::File::open(path).unwrap())
        .read_to_string(&mut out)
        .unwrap();
    out
}

pub fn read_gz_lines(path: &Path) -> Vec<String> {
    read_gz_string(path).lines().map(str::to_string).collect()
}

pub fn read_gz_json(path: &Path) -> Value {
    serde_json::from_str(&read_gz_string(path)).unwrap()
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// One history pack row.
pub fn pack_row(canonical_id: &str) -> String {
    json!({
        "canonical_id": canonical_id,
        "bars": [["2026-01-02", 10.0, 11.0, 9.5, 10.5, 1000]]
    })
    .to_string()
}

/// A STOCK registry row, optionally pointing at `pack`.
pub fn stock_row(canonical_id: &str, symbol: &str, pack: Option<&str>) -> Value {
    let mut row = json!({
        "canonical_id": canonical_id,
        "symbol": symbol,
        "type_norm": "STOCK",
        "bars_count": 250,
        "_quality_basis": "backfill_real",
        "last_trade_date": "2026-01-30",
        "avg_volume_10d": 1500,
        "avg_volume_30d": 1400,
    });
    if let Some(pack) = pack {
        row["pointers"] = json!({
            "history_pack": pack,
            "pack_sha256": "abc123",
            "symbol_group": "grp_a",
        });
    }
    row
}
