use rusqlite::Connection;

use crate::error::Result;

/// Open the database file with the connection bootstrap every table in this
/// crate expects (WAL journal, foreign keys enforced, bounded lock wait), then
/// run the idempotent schema migration.
pub fn open(dsn: &str) -> Result<Connection> {
    let conn = Connection::open(dsn)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=3000;",
    )?;
    init_db(&conn)?;
    Ok(conn)
}

/// Create every table in the data model plus the indexes backing the
/// common access patterns. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_agents_table(conn)?;
    create_conversations_table(conn)?;
    create_frames_table(conn)?;
    create_messages_table(conn)?;
    create_skills_table(conn)?;
    create_mcp_servers_table(conn)?;
    create_face_tables(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                TEXT PRIMARY KEY,
            name              TEXT NOT NULL UNIQUE,
            password_hash     TEXT NOT NULL,
            system_prompt     TEXT NOT NULL DEFAULT '',
            preferred_name    TEXT,
            default_model_url TEXT,
            summary_model     TEXT,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_agents_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS agents (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            system_prompt   TEXT NOT NULL DEFAULT '',
            model_name      TEXT NOT NULL,
            voice_reference TEXT,
            avatar          TEXT,
            excluded_tools  TEXT NOT NULL DEFAULT '[]',
            think_mode      INTEGER NOT NULL DEFAULT 0,
            memory          TEXT,
            trigger_word    TEXT,
            is_administrator INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(user_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_agents_user ON agents(user_id);",
    )?;
    Ok(())
}

fn create_conversations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title      TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_user
            ON conversations(user_id, updated_at DESC);",
    )?;
    Ok(())
}

fn create_frames_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS frames (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            summary         TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_frames_conversation
            ON frames(conversation_id, updated_at DESC);",
    )?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            frame_id    TEXT NOT NULL REFERENCES frames(id) ON DELETE CASCADE,
            agent_id    TEXT REFERENCES agents(id) ON DELETE SET NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            thinking    TEXT,
            raw_input   TEXT,
            raw_output  TEXT,
            speaker_name TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_frame
            ON messages(frame_id, created_at ASC);",
    )?;
    Ok(())
}

fn create_skills_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS skills (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name         TEXT NOT NULL,
            instructions TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL,
            UNIQUE(user_id, name)
        );",
    )?;
    Ok(())
}

fn create_mcp_servers_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS mcp_servers (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name       TEXT NOT NULL,
            transport  TEXT NOT NULL,
            url        TEXT,
            command    TEXT,
            args       TEXT NOT NULL DEFAULT '[]',
            env        TEXT NOT NULL DEFAULT '{}',
            enabled    INTEGER NOT NULL DEFAULT 1,
            UNIQUE(user_id, name)
        );",
    )?;
    Ok(())
}

fn create_face_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS face_identities (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name       TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(user_id, name)
        );
        CREATE TABLE IF NOT EXISTS face_photos (
            id          TEXT PRIMARY KEY,
            identity_id TEXT NOT NULL REFERENCES face_identities(id) ON DELETE CASCADE,
            embedding   TEXT NOT NULL,
            photo_blob_uuid TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_face_photos_identity
            ON face_photos(identity_id);",
    )?;
    Ok(())
}
