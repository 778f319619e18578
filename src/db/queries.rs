use rusqlite::{params, Connection, OptionalExtension};

// ── Key-value store ──

pub const BOOKINGS_KEY: &str = "cricket-box-bookings";
pub const SLOTS_KEY: &str = "cricket-box-slots";
pub const USE_LOCAL_KEY: &str = "cricket-box-use-local-storage";

pub fn kv_get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn kv_set(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET
           value = excluded.value,
           updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

// ── Backend flag ──

pub fn get_use_local(conn: &Connection) -> rusqlite::Result<Option<bool>> {
    Ok(kv_get(conn, USE_LOCAL_KEY)?.map(|v| v == "true"))
}

pub fn set_use_local(conn: &Connection, use_local: bool) -> rusqlite::Result<()> {
    kv_set(conn, USE_LOCAL_KEY, if use_local { "true" } else { "false" })
}
