//! SQLite schema, applied on every open.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS trips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    uploaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_photos_trip ON photos(trip_id);

-- AUTOINCREMENT keeps group ids strictly increasing, so the higher id of a
-- pair is always the group created later.
CREATE TABLE IF NOT EXISTS face_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    thumbnail TEXT,
    representative BLOB NOT NULL,  -- little-endian f32
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_face_groups_trip ON face_groups(trip_id);

CREATE TABLE IF NOT EXISTS photo_face_relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL REFERENCES photos(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES face_groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_relations_group ON photo_face_relations(group_id);
CREATE INDEX IF NOT EXISTS idx_relations_photo ON photo_face_relations(photo_id);

CREATE TABLE IF NOT EXISTS face_merge_suggestions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    group_a INTEGER NOT NULL REFERENCES face_groups(id) ON DELETE CASCADE,
    group_b INTEGER NOT NULL REFERENCES face_groups(id) ON DELETE CASCADE,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    UNIQUE (group_a, group_b),
    CHECK (group_a < group_b)
);

CREATE TABLE IF NOT EXISTS group_members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    contact TEXT
);

CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    amount_cents INTEGER NOT NULL CHECK (amount_cents >= 0),
    category TEXT NOT NULL,
    date TEXT NOT NULL,
    description TEXT,
    payer_id INTEGER REFERENCES group_members(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_expenses_trip ON expenses(trip_id);
"#;
