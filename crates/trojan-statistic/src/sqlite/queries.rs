//! SQL statements for the SQLite user store.

/// Schema; counters are 8-byte big-endian blobs.
pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    hash TEXT PRIMARY KEY NOT NULL,
    sent BLOB NOT NULL,
    recv BLOB NOT NULL,
    max_ip_num INTEGER NOT NULL DEFAULT 0,
    send_limit INTEGER NOT NULL DEFAULT 0,
    recv_limit INTEGER NOT NULL DEFAULT 0
)
"#;

pub const UPSERT_USER: &str = r#"
INSERT INTO users (hash, sent, recv, max_ip_num, send_limit, recv_limit)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT(hash) DO UPDATE SET
    sent = excluded.sent,
    recv = excluded.recv,
    max_ip_num = excluded.max_ip_num,
    send_limit = excluded.send_limit,
    recv_limit = excluded.recv_limit
"#;

pub const SELECT_USER: &str = r#"
SELECT hash, sent, recv, max_ip_num, send_limit, recv_limit
FROM users
WHERE hash = ?
"#;

pub const SELECT_USERS: &str = r#"
SELECT hash, sent, recv, max_ip_num, send_limit, recv_limit
FROM users
"#;

pub const DELETE_USER: &str = "DELETE FROM users WHERE hash = ?";

pub const UPDATE_TRAFFIC: &str = r#"
UPDATE users
SET sent = ?, recv = ?
WHERE hash = ?
"#;
