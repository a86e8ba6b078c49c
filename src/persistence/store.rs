//! SQLite-backed durable prefix-cache store (spec §4.5, §6): a single
//! `prefixes(prefix TEXT, asn INTEGER, timestamp INTEGER)` table with
//! `PRIMARY KEY(prefix)` (spec §9 Open Question resolution — without it a
//! stale duplicate row would silently double-hydrate on restart).

use std::path::Path;

use ipnet::IpNet;
use rusqlite::Connection;

use crate::cache::{Asn, CacheEntry};
use crate::error::Result;

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS prefixes (
                prefix TEXT PRIMARY KEY,
                asn INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Reads every row, skipping any that fail to parse (a hand-edited or
    /// corrupted database shouldn't prevent the rest from loading).
    pub fn load_all(&self) -> Result<Vec<(IpNet, CacheEntry)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT prefix, asn, timestamp FROM prefixes")?;
        let rows = stmt.query_map([], |row| {
            let prefix: String = row.get(0)?;
            let asn: i64 = row.get(1)?;
            let timestamp: i64 = row.get(2)?;
            Ok((prefix, asn, timestamp))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (prefix, asn, timestamp) = row?;
            let Ok(net) = prefix.parse::<IpNet>() else {
                continue;
            };
            out.push((
                net,
                CacheEntry {
                    asn: Asn(asn as u32),
                    expiry: timestamp as u64,
                },
            ));
        }
        Ok(out)
    }

    /// Atomically replaces the table's contents with `entries` (spec §4.5:
    /// "replace atomically" rather than incrementally diffing).
    pub fn replace_all(&mut self, entries: &[(IpNet, CacheEntry)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM prefixes", [])?;
        {
            let mut insert =
                tx.prepare("INSERT OR REPLACE INTO prefixes (prefix, asn, timestamp) VALUES (?1, ?2, ?3)")?;
            for (net, entry) in entries {
                insert.execute(rusqlite::params![
                    net.to_string(),
                    entry.asn.0 as i64,
                    entry.expiry as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NEVER;

    #[test]
    fn round_trips_entries_through_a_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gixflow.db");
        let mut store = Store::open(&path).unwrap();

        let entries = vec![
            ("8.8.8.0/24".parse().unwrap(), CacheEntry { asn: Asn(15169), expiry: NEVER }),
            ("1.1.1.0/24".parse().unwrap(), CacheEntry { asn: Asn(13335), expiry: 1_700_000_000 }),
        ];
        store.replace_all(&entries).unwrap();

        let mut loaded = store.load_all().unwrap();
        let mut expected = entries;
        loaded.sort_by_key(|(net, _)| net.to_string());
        expected.sort_by_key(|(net, _)| net.to_string());
        assert_eq!(loaded, expected);
    }

    #[test]
    fn replace_all_clears_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gixflow.db");
        let mut store = Store::open(&path).unwrap();

        store
            .replace_all(&[("10.0.0.0/8".parse().unwrap(), CacheEntry { asn: Asn(1), expiry: NEVER })])
            .unwrap();
        store
            .replace_all(&[("192.0.2.0/24".parse().unwrap(), CacheEntry { asn: Asn(2), expiry: NEVER })])
            .unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1.asn, Asn(2));
    }

    #[test]
    fn missing_file_is_created_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.db");
        let store = Store::open(&path).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
