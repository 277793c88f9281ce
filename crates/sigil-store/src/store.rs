use std::path::Path;

use rusqlite::{Connection, Row, params};
use serde::Serialize;
use uuid::Uuid;

use sigil_core::{
    BraidResult, Category, PATTERN_DIM, Pattern, Sigil, SigilIndex, SigilParts, SigilTags,
    SourceKind,
};

use crate::error::{Result, StoreError};
use crate::schema;

const SIGIL_COLUMNS: &str =
    "id, pattern, category, source_kind, strength, created_at, origin_hash, tags";

pub struct Store {
    conn: Connection,
}

/// Row counts and bucket sizes for a quick look at a store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub sigils: usize,
    pub braids: usize,
    pub by_category: Vec<(Category, usize)>,
    pub by_source_kind: Vec<(SourceKind, usize)>,
    pub oldest: Option<u64>,
    pub newest: Option<u64>,
    pub schema_version: Option<i64>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        tracing::debug!(path = %path.display(), "opened sigil store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Sigils ---

    /// Persist one sigil. Fails if the id is already stored.
    pub fn save_sigil(&self, sigil: &Sigil) -> Result<()> {
        insert_sigil_on(&self.conn, sigil)
    }

    /// Replace all stored sigils with the contents of `index`. Braids are kept.
    pub fn save_index(&self, index: &SigilIndex) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        replace_sigils_on(&tx, index)?;
        tx.commit()?;
        tracing::debug!(count = index.len(), "saved sigil index");
        Ok(())
    }

    pub fn delete_sigil(&self, id: Uuid) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM sigils WHERE id = ?1", [id.to_string()])?;
        if rows == 0 {
            return Err(StoreError::InvalidData(format!("sigil not found: {id}")));
        }
        Ok(())
    }

    pub fn load_sigil(&self, id: Uuid) -> Result<Option<Sigil>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {SIGIL_COLUMNS} FROM sigils WHERE id = ?1"))?;
        let mut rows = stmt.query_map([id.to_string()], read_sigil_row)?;
        match rows.next() {
            Some(row) => Ok(Some(sigil_from_row(row?)?)),
            None => Ok(None),
        }
    }

    /// Rebuild the in-memory index from every stored sigil, in insertion order.
    pub fn load_index(&self) -> Result<SigilIndex> {
        let sigils = self.query_sigils(
            &format!("SELECT {SIGIL_COLUMNS} FROM sigils ORDER BY rowid"),
            [],
        )?;
        tracing::debug!(count = sigils.len(), "loaded sigil index");
        Ok(SigilIndex::from_sigils(sigils)?)
    }

    /// Indexed lookup by `linkedEntityId` without loading the whole index.
    pub fn sigils_by_external_id(&self, external_id: &str) -> Result<Vec<Sigil>> {
        self.query_sigils(
            &format!("SELECT {SIGIL_COLUMNS} FROM sigils WHERE external_id = ?1 ORDER BY rowid"),
            [external_id],
        )
    }

    fn query_sigils<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Sigil>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, read_sigil_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(sigil_from_row).collect()
    }

    // --- Braids ---

    pub fn save_braid(&self, braid: &BraidResult) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_braid_on(&tx, braid)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace all stored braids.
    pub fn save_braids(&self, braids: &[BraidResult]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        replace_braids_on(&tx, braids)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace every stored sigil and braid in one transaction. On error
    /// the store is left as it was.
    pub fn replace_all(&self, index: &SigilIndex, braids: &[BraidResult]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        replace_sigils_on(&tx, index)?;
        replace_braids_on(&tx, braids)?;
        tx.commit()?;
        tracing::debug!(sigils = index.len(), braids = braids.len(), "replaced store contents");
        Ok(())
    }

    pub fn load_braids(&self) -> Result<Vec<BraidResult>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM braids ORDER BY created_at, rowid")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|body| Ok(serde_json::from_str(body)?))
            .collect()
    }

    /// Ids of braids that include `sigil_id` as a participant.
    pub fn braids_with_sigil(&self, sigil_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT braid_id FROM braid_participants WHERE sigil_id = ?1 ORDER BY braid_id",
        )?;

        stmt.query_map([sigil_id.to_string()], |row| row.get::<_, String>(0))?
            .map(|r| {
                let id_str = r?;
                parse_uuid(&id_str)
            })
            .collect()
    }

    // --- Stats ---

    pub fn stats(&self) -> Result<StoreStats> {
        let sigils: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sigils", [], |row| row.get(0))?;
        let braids: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM braids", [], |row| row.get(0))?;
        let (oldest, newest): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM sigils",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let by_category = self
            .group_counts("category")?
            .into_iter()
            .map(|(name, n)| {
                Category::parse(&name)
                    .map(|c| (c, n))
                    .ok_or_else(|| StoreError::InvalidData(format!("unknown category '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        let by_source_kind = self
            .group_counts("source_kind")?
            .into_iter()
            .map(|(name, n)| {
                SourceKind::parse(&name)
                    .map(|k| (k, n))
                    .ok_or_else(|| StoreError::InvalidData(format!("unknown source kind '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StoreStats {
            sigils: sigils as usize,
            braids: braids as usize,
            by_category,
            by_source_kind,
            oldest: oldest.map(millis_from_sql).transpose()?,
            newest: newest.map(millis_from_sql).transpose()?,
            schema_version: schema::get_schema_version(&self.conn)?,
        })
    }

    fn group_counts(&self, column: &str) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM sigils GROUP BY {column} ORDER BY {column}"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn replace_sigils_on(conn: &Connection, index: &SigilIndex) -> Result<()> {
    conn.execute_batch("DELETE FROM sigils;")?;
    for sigil in index.iter() {
        insert_sigil_on(conn, sigil)?;
    }
    Ok(())
}

fn replace_braids_on(conn: &Connection, braids: &[BraidResult]) -> Result<()> {
    conn.execute_batch("DELETE FROM braid_participants; DELETE FROM braids;")?;
    for braid in braids {
        insert_braid_on(conn, braid)?;
    }
    Ok(())
}

/// SQLite integers are signed; timestamps past `i64::MAX` are refused.
fn millis_to_sql(millis: u64) -> Result<i64> {
    i64::try_from(millis)
        .map_err(|_| StoreError::InvalidData(format!("timestamp {millis} out of range")))
}

fn millis_from_sql(value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative timestamp {value}")))
}

fn insert_sigil_on(conn: &Connection, sigil: &Sigil) -> Result<()> {
    conn.execute(
        "INSERT INTO sigils (id, pattern, category, source_kind, strength, created_at, origin_hash, tags, external_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            sigil.id().to_string(),
            pattern_to_blob(sigil.pattern()),
            sigil.category().as_str(),
            sigil.source_kind().as_str(),
            sigil.strength(),
            millis_to_sql(sigil.created_at())?,
            sigil.origin_hash(),
            serde_json::to_string(sigil.tags())?,
            sigil.tags().linked_entity_id,
        ],
    )?;
    Ok(())
}

fn insert_braid_on(conn: &Connection, braid: &BraidResult) -> Result<()> {
    conn.execute(
        "INSERT INTO braids (id, created_at, fusion_score, classification, body)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            braid.id.to_string(),
            millis_to_sql(braid.created_at)?,
            braid.fusion_score,
            braid.classification.as_str(),
            serde_json::to_string(braid)?,
        ],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO braid_participants (braid_id, sigil_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, sigil_id) in braid.participant_ids.iter().enumerate() {
        stmt.execute(params![
            braid.id.to_string(),
            sigil_id.to_string(),
            position as i64
        ])?;
    }
    Ok(())
}

type SigilRow = (String, Vec<u8>, String, String, f64, i64, i32, String);

fn read_sigil_row(row: &Row<'_>) -> rusqlite::Result<SigilRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn sigil_from_row(row: SigilRow) -> Result<Sigil> {
    let (id_str, blob, category, source_kind, strength, created_at, origin_hash, tags) = row;
    let category = Category::parse(&category)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown category '{category}'")))?;
    let source_kind = SourceKind::parse(&source_kind)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown source kind '{source_kind}'")))?;
    let tags: SigilTags = serde_json::from_str(&tags)?;

    Ok(Sigil::from_parts(SigilParts {
        id: parse_uuid(&id_str)?,
        pattern: blob_to_pattern(&blob)?,
        category,
        source_kind,
        strength,
        created_at: millis_from_sql(created_at)?,
        origin_hash,
        tags,
    }))
}

/// Little-endian f64s, `PATTERN_DIM * 8` bytes.
fn pattern_to_blob(pattern: &Pattern) -> Vec<u8> {
    pattern.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_pattern(blob: &[u8]) -> Result<Pattern> {
    if blob.len() != PATTERN_DIM * 8 {
        return Err(StoreError::InvalidData(format!(
            "pattern blob is {} bytes, expected {}",
            blob.len(),
            PATTERN_DIM * 8
        )));
    }
    let values: Vec<f64> = blob
        .chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            f64::from_le_bytes(bytes)
        })
        .collect();
    Ok(Pattern::from_slice(&values)?)
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{Braider, Encoder};

    fn make_index() -> SigilIndex {
        let enc = Encoder::new();
        let mut index = SigilIndex::new();
        let dream = enc.encode_text("a bridge made of paper", SourceKind::Dream);
        let breath = enc
            .encode_text("slow exhale, count to six", SourceKind::Breath)
            .with_tags(SigilTags {
                triggered_by: Some(dream.id()),
                linked_entity_id: Some("session-7".into()),
                ..Default::default()
            });
        let meditation = enc.encode_text("noting practice", SourceKind::Meditation);
        index.insert(dream).unwrap();
        index.insert(breath).unwrap();
        index.insert(meditation).unwrap();
        index
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let original = make_index();

        store.save_index(&original).unwrap();
        let loaded = store.load_index().unwrap();

        assert_eq!(loaded.len(), 3);
        for (a, b) in original.iter().zip(loaded.iter()) {
            assert_eq!(a, b, "sigil changed across save/load");
        }
        assert_eq!(loaded.find_by_external_tag("session-7").len(), 1);
    }

    #[test]
    fn test_pattern_precision_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let sigil = Encoder::new().encode_text("precision", SourceKind::Dream);
        store.save_sigil(&sigil).unwrap();

        let loaded = store.load_sigil(sigil.id()).unwrap().unwrap();
        assert_eq!(loaded.pattern(), sigil.pattern());
        assert_eq!(loaded.origin_hash(), sigil.origin_hash());
    }

    #[test]
    fn test_save_sigil_rejects_duplicate() {
        let store = Store::open_in_memory().unwrap();
        let sigil = Encoder::new().encode_text("twice", SourceKind::Dream);
        store.save_sigil(&sigil).unwrap();
        assert!(matches!(
            store.save_sigil(&sigil),
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn test_delete_sigil() {
        let store = Store::open_in_memory().unwrap();
        let index = make_index();
        store.save_index(&index).unwrap();

        let id = index.as_slice()[0].id();
        store.delete_sigil(id).unwrap();
        assert!(store.load_sigil(id).unwrap().is_none());
        assert_eq!(store.load_index().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_nonexistent() {
        let store = Store::open_in_memory().unwrap();
        let result = store.delete_sigil(Uuid::new_v4());
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_sigils_by_external_id() {
        let store = Store::open_in_memory().unwrap();
        store.save_index(&make_index()).unwrap();

        let linked = store.sigils_by_external_id("session-7").unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].source_kind(), SourceKind::Breath);
        assert!(store.sigils_by_external_id("nope").unwrap().is_empty());
    }

    #[test]
    fn test_braid_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let index = make_index();
        store.save_index(&index).unwrap();

        let braid = Braider::default().braid(index.iter()).unwrap();
        store.save_braid(&braid).unwrap();

        let loaded = store.load_braids().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, braid.id);
        assert_eq!(loaded[0].participant_ids, braid.participant_ids);
        assert_eq!(loaded[0].combined_pattern, braid.combined_pattern);
        assert_eq!(loaded[0].relations, braid.relations);

        let first = index.as_slice()[0].id();
        assert_eq!(store.braids_with_sigil(first).unwrap(), vec![braid.id]);
    }

    #[test]
    fn test_save_braids_replaces() {
        let store = Store::open_in_memory().unwrap();
        let index = make_index();
        let braider = Braider::default();
        let a = braider.braid(index.iter().take(2)).unwrap();
        let b = braider.braid(index.iter().skip(1)).unwrap();

        store.save_braids(&[a.clone(), b]).unwrap();
        assert_eq!(store.load_braids().unwrap().len(), 2);
        store.save_braids(&[a]).unwrap();
        assert_eq!(store.load_braids().unwrap().len(), 1);
    }

    #[test]
    fn test_stats() {
        let store = Store::open_in_memory().unwrap();
        let index = make_index();
        store.save_index(&index).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.sigils, 3);
        assert_eq!(stats.braids, 0);
        assert_eq!(stats.by_category.iter().map(|(_, n)| n).sum::<usize>(), 3);
        assert_eq!(stats.by_source_kind.len(), 3);
        assert_eq!(stats.schema_version, Some(schema::SCHEMA_VERSION));
        assert!(stats.oldest <= stats.newest);
    }

    #[test]
    fn test_metadata() {
        let store = Store::open_in_memory().unwrap();

        assert!(store.get_metadata("foo").unwrap().is_none());

        store.set_metadata("foo", "bar").unwrap();
        assert_eq!(store.get_metadata("foo").unwrap(), Some("bar".to_string()));

        store.set_metadata("foo", "baz").unwrap();
        assert_eq!(store.get_metadata("foo").unwrap(), Some("baz".to_string()));
    }

    #[test]
    fn test_save_overwrites_previous() {
        let store = Store::open_in_memory().unwrap();
        let index = make_index();

        store.save_index(&index).unwrap();
        store.save_index(&index).unwrap();

        assert_eq!(store.load_index().unwrap().len(), 3);
    }

    #[test]
    fn test_load_empty_db() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_index().unwrap().is_empty());
        assert!(store.load_braids().unwrap().is_empty());
        let stats = store.stats().unwrap();
        assert_eq!(stats.sigils, 0);
        assert!(stats.oldest.is_none());
    }

    #[test]
    fn test_corrupt_pattern_blob() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO sigils (id, pattern, category, source_kind, strength, created_at, origin_hash)
                 VALUES (?1, x'0011', 'limbic', 'dream', 0.5, 0, 0)",
                [Uuid::new_v4().to_string()],
            )
            .unwrap();
        assert!(matches!(store.load_index(), Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_replace_all_rolls_back_on_failure() {
        let store = Store::open_in_memory().unwrap();
        let index = make_index();
        let braid = Braider::default().braid(index.iter()).unwrap();
        store.save_index(&index).unwrap();
        store.save_braid(&braid).unwrap();

        let enc = Encoder::new();
        let mut fresh = SigilIndex::new();
        fresh
            .insert(enc.encode_text("a tide pool at dusk", SourceKind::Dream))
            .unwrap();
        fresh
            .insert(enc.encode_text("box breathing", SourceKind::Breath))
            .unwrap();
        let new_braid = Braider::default().braid(fresh.iter()).unwrap();

        let result = store.replace_all(&fresh, &[new_braid.clone(), new_braid]);
        assert!(matches!(result, Err(StoreError::Sqlite(_))));

        let loaded = store.load_index().unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.get(index.as_slice()[0].id()).is_some());
        let braids = store.load_braids().unwrap();
        assert_eq!(braids.len(), 1);
        assert_eq!(braids[0].id, braid.id);
    }

    #[test]
    fn test_replace_all_swaps_contents() {
        let store = Store::open_in_memory().unwrap();
        let index = make_index();
        store.save_index(&index).unwrap();
        store
            .save_braid(&Braider::default().braid(index.iter()).unwrap())
            .unwrap();

        store.replace_all(&SigilIndex::new(), &[]).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.sigils, 0);
        assert_eq!(stats.braids, 0);
    }

    #[test]
    fn test_timestamp_past_i64_rejected() {
        let store = Store::open_in_memory().unwrap();
        let sigil = Encoder::new()
            .encode_text("far future", SourceKind::Dream)
            .with_created_at(u64::MAX);
        assert!(matches!(
            store.save_sigil(&sigil),
            Err(StoreError::InvalidData(_))
        ));
        assert!(store.load_index().unwrap().is_empty());

        let edge = Encoder::new()
            .encode_text("edge of range", SourceKind::Dream)
            .with_created_at(i64::MAX as u64);
        store.save_sigil(&edge).unwrap();
        assert_eq!(
            store.load_sigil(edge.id()).unwrap().unwrap().created_at(),
            i64::MAX as u64
        );
    }

    #[test]
    fn test_negative_timestamp_on_load() {
        let store = Store::open_in_memory().unwrap();
        let sigil = Encoder::new().encode_text("before the epoch", SourceKind::Dream);
        store.save_sigil(&sigil).unwrap();
        store
            .conn()
            .execute("UPDATE sigils SET created_at = -5", [])
            .unwrap();
        assert!(matches!(store.load_index(), Err(StoreError::InvalidData(_))));
    }
}
