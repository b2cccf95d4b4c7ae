//! Table definitions applied on connect. Every statement is idempotent.

pub(crate) const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS boards (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        anonymity_mode TEXT NOT NULL DEFAULT 'allow_choice',
        created_at TEXT NOT NULL
    )",
    // `groups` is a keyword in SQLite.
    "CREATE TABLE IF NOT EXISTS community_groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        invite_code TEXT NOT NULL UNIQUE,
        anonymity_mode TEXT NOT NULL DEFAULT 'allow_choice',
        owner_id BLOB NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS group_members (
        group_id INTEGER NOT NULL REFERENCES community_groups(id) ON DELETE CASCADE,
        user_id BLOB NOT NULL,
        joined_at TEXT NOT NULL,
        PRIMARY KEY (group_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        board_id INTEGER REFERENCES boards(id) ON DELETE CASCADE,
        group_id INTEGER REFERENCES community_groups(id) ON DELETE CASCADE,
        author_id BLOB,
        author_name TEXT,
        is_anonymous BOOLEAN NOT NULL,
        display_name TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        emotions TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT,
        CHECK ((board_id IS NULL) <> (group_id IS NULL))
    )",
    "CREATE INDEX IF NOT EXISTS idx_posts_board ON posts(board_id, id)",
    "CREATE INDEX IF NOT EXISTS idx_posts_group ON posts(group_id, id)",
    "CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        author_id BLOB,
        author_name TEXT,
        is_anonymous BOOLEAN NOT NULL,
        display_name TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, id)",
    "CREATE TABLE IF NOT EXISTS reactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        user_id BLOB NOT NULL,
        kind TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (post_id, user_id, kind)
    )",
];
