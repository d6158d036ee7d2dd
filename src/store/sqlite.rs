//! SQLite-backed store using the spin host's database.

use spin_sdk::sqlite::{Connection, QueryResult, RowResult, Value};

use crate::core::helpers::now_iso;
use crate::models::{NewPost, NewUser, Post, PostId, ProfileUpdate, StoredCredential, User, UserId};
use crate::store::{PostRepository, SocialGraph, Store, StoreError, UserRepository};

const SCHEMA: &[&str] = &[
    "PRAGMA foreign_keys = ON",
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        nick TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        pass TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS followers (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, follower_id),
        CHECK (user_id <> follower_id)
    )",
    "CREATE TABLE IF NOT EXISTS publications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        likes INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS likes_of_publications (
        publication_id INTEGER NOT NULL REFERENCES publications(id) ON DELETE CASCADE,
        liker_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (publication_id, liker_id)
    )",
];

const USER_COLUMNS: &str = "u.id, u.name, u.nick, u.email, u.created_at";
const POST_COLUMNS: &str = "p.id, p.title, p.content, p.author_id, u.nick, p.likes, p.created_at";

fn storage(e: impl std::fmt::Debug) -> StoreError {
    StoreError::Storage(format!("{:?}", e))
}

// Ids above i64::MAX can never have been issued; -1 matches no row.
fn id(value: u64) -> Value {
    Value::Integer(i64::try_from(value).unwrap_or(-1))
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn int_at(row: &RowResult, idx: usize) -> Result<u64, StoreError> {
    match row.values.get(idx) {
        Some(Value::Integer(v)) => u64::try_from(*v).map_err(storage),
        other => Err(StoreError::Storage(format!("column {} is not an integer: {:?}", idx, other))),
    }
}

fn text_at(row: &RowResult, idx: usize) -> Result<String, StoreError> {
    match row.values.get(idx) {
        Some(Value::Text(v)) => Ok(v.clone()),
        other => Err(StoreError::Storage(format!("column {} is not text: {:?}", idx, other))),
    }
}

fn user_from(row: &RowResult) -> Result<User, StoreError> {
    Ok(User {
        id: int_at(row, 0)?,
        name: text_at(row, 1)?,
        nick: text_at(row, 2)?,
        email: text_at(row, 3)?,
        created_at: text_at(row, 4)?,
    })
}

fn post_from(row: &RowResult) -> Result<Post, StoreError> {
    Ok(Post {
        id: int_at(row, 0)?,
        title: text_at(row, 1)?,
        content: text_at(row, 2)?,
        author_id: int_at(row, 3)?,
        author_nick: text_at(row, 4)?,
        likes: int_at(row, 5)?,
        created_at: text_at(row, 6)?,
    })
}

fn users_from(result: &QueryResult) -> Result<Vec<User>, StoreError> {
    result.rows.iter().map(user_from).collect()
}

fn posts_from(result: &QueryResult) -> Result<Vec<Post>, StoreError> {
    result.rows.iter().map(post_from).collect()
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Runs one statement. The store only ever talks to SQLite through this.
pub trait Database {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, StoreError>;
}

impl Database for Connection {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, StoreError> {
        Connection::execute(self, sql, params).map_err(storage)
    }
}

/// Rolls back on drop unless `commit` succeeded.
struct Transaction<'a, C: Database> {
    store: &'a SqliteStore<C>,
    open: bool,
}

impl<'a, C: Database> Transaction<'a, C> {
    fn begin(store: &'a SqliteStore<C>) -> Result<Self, StoreError> {
        store.exec("BEGIN IMMEDIATE", &[])?;
        Ok(Self { store, open: true })
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.store.exec("COMMIT", &[])?;
        self.open = false;
        Ok(())
    }
}

impl<C: Database> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.store.exec("ROLLBACK", &[]) {
                tracing::error!(error = %e, "rollback failed");
            }
        }
    }
}

pub struct SqliteStore<C = Connection> {
    conn: C,
}

impl SqliteStore<Connection> {
    /// Opens the component's default database and applies the schema.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_default().map_err(storage)?)
    }
}

impl<C: Database> SqliteStore<C> {
    pub fn with_connection(conn: C) -> Result<Self, StoreError> {
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            self.exec(statement, &[])?;
        }
        Ok(())
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<QueryResult, StoreError> {
        self.conn.execute(sql, params)
    }

    fn with_transaction<T>(
        &self,
        body: impl FnOnce(&Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = Transaction::begin(self)?;
        let value = body(self)?;
        tx.commit()?;
        Ok(value)
    }

    fn user_exists(&self, user: UserId) -> Result<bool, StoreError> {
        let result = self.exec("SELECT 1 FROM users WHERE id = ?", &[id(user)])?;
        Ok(!result.rows.is_empty())
    }

    fn ensure_unique(&self, nick: &str, email: &str, except: Option<UserId>) -> Result<(), StoreError> {
        let except = except.map(id).unwrap_or(Value::Integer(-1));
        let result = self.exec(
            "SELECT nick FROM users WHERE (nick = ? OR email = ?) AND id <> ?",
            &[text(nick), text(email), except],
        )?;
        match result.rows.first() {
            None => Ok(()),
            Some(row) if text_at(row, 0)? == nick => Err(StoreError::Duplicate("nick")),
            Some(_) => Err(StoreError::Duplicate("email")),
        }
    }
}

impl<C: Database> UserRepository for SqliteStore<C> {
    fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        self.with_transaction(|s| {
            s.ensure_unique(&user.nick, &user.email, None)?;
            let result = s.exec(
                "INSERT INTO users (name, nick, email, pass, created_at) VALUES (?, ?, ?, ?, ?)
                 RETURNING id, name, nick, email, created_at",
                &[
                    text(&user.name),
                    text(&user.nick),
                    text(&user.email),
                    text(&user.digest),
                    text(&now_iso()),
                ],
            )?;
            let row = result
                .rows
                .first()
                .ok_or_else(|| StoreError::Storage("insert returned no row".to_string()))?;
            user_from(row)
        })
    }

    fn search_users(&self, name_or_nick: &str) -> Result<Vec<User>, StoreError> {
        let pattern = like_pattern(name_or_nick);
        let result = self.exec(
            &format!(
                "SELECT {} FROM users u
                 WHERE LOWER(u.name) LIKE ? ESCAPE '\\' OR LOWER(u.nick) LIKE ? ESCAPE '\\'
                 ORDER BY u.id",
                USER_COLUMNS
            ),
            &[text(&pattern), text(&pattern)],
        )?;
        users_from(&result)
    }

    fn user_by_id(&self, user: UserId) -> Result<Option<User>, StoreError> {
        let result = self.exec(
            &format!("SELECT {} FROM users u WHERE u.id = ?", USER_COLUMNS),
            &[id(user)],
        )?;
        result.rows.first().map(user_from).transpose()
    }

    fn credential_by_email(&self, email: &str) -> Result<Option<StoredCredential>, StoreError> {
        let result = self.exec("SELECT id, pass FROM users WHERE email = ?", &[text(email)])?;
        result
            .rows
            .first()
            .map(|row| Ok(StoredCredential { id: int_at(row, 0)?, digest: text_at(row, 1)? }))
            .transpose()
    }

    fn password_digest(&self, user: UserId) -> Result<Option<String>, StoreError> {
        let result = self.exec("SELECT pass FROM users WHERE id = ?", &[id(user)])?;
        result.rows.first().map(|row| text_at(row, 0)).transpose()
    }

    fn update_user(&self, user: UserId, update: &ProfileUpdate) -> Result<(), StoreError> {
        self.with_transaction(|s| {
            s.ensure_unique(&update.nick, &update.email, Some(user))?;
            let result = s.exec(
                "UPDATE users SET name = ?, nick = ?, email = ? WHERE id = ? RETURNING id",
                &[text(&update.name), text(&update.nick), text(&update.email), id(user)],
            )?;
            if result.rows.is_empty() {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    fn update_password(&self, user: UserId, digest: &str) -> Result<(), StoreError> {
        let result = self.exec(
            "UPDATE users SET pass = ? WHERE id = ? RETURNING id",
            &[text(digest), id(user)],
        )?;
        if result.rows.is_empty() {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    fn delete_user(&self, user: UserId) -> Result<(), StoreError> {
        self.with_transaction(|s| {
            // Counters first, while the like edges still say which posts to touch.
            s.exec(
                "UPDATE publications SET likes = CASE WHEN likes > 0 THEN likes - 1 ELSE 0 END
                 WHERE id IN (SELECT publication_id FROM likes_of_publications WHERE liker_id = ?)",
                &[id(user)],
            )?;
            s.exec("DELETE FROM likes_of_publications WHERE liker_id = ?", &[id(user)])?;
            s.exec(
                "DELETE FROM likes_of_publications
                 WHERE publication_id IN (SELECT id FROM publications WHERE author_id = ?)",
                &[id(user)],
            )?;
            s.exec("DELETE FROM publications WHERE author_id = ?", &[id(user)])?;
            s.exec(
                "DELETE FROM followers WHERE user_id = ? OR follower_id = ?",
                &[id(user), id(user)],
            )?;
            let result = s.exec("DELETE FROM users WHERE id = ? RETURNING id", &[id(user)])?;
            if result.rows.is_empty() {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }
}

impl<C: Database> PostRepository for SqliteStore<C> {
    fn create_post(&self, author: UserId, post: &NewPost) -> Result<Post, StoreError> {
        self.with_transaction(|s| {
            if !s.user_exists(author)? {
                return Err(StoreError::NotFound("user"));
            }
            let result = s.exec(
                "INSERT INTO publications (title, content, author_id, created_at) VALUES (?, ?, ?, ?)
                 RETURNING id",
                &[text(&post.title), text(&post.content), id(author), text(&now_iso())],
            )?;
            let row = result
                .rows
                .first()
                .ok_or_else(|| StoreError::Storage("insert returned no row".to_string()))?;
            let post_id = int_at(row, 0)?;
            s.post_by_id(post_id)?
                .ok_or_else(|| StoreError::Storage("inserted publication vanished".to_string()))
        })
    }

    fn post_by_id(&self, post: PostId) -> Result<Option<Post>, StoreError> {
        let result = self.exec(
            &format!(
                "SELECT {} FROM publications p JOIN users u ON u.id = p.author_id WHERE p.id = ?",
                POST_COLUMNS
            ),
            &[id(post)],
        )?;
        result.rows.first().map(post_from).transpose()
    }

    fn feed(&self, user: UserId) -> Result<Vec<Post>, StoreError> {
        let result = self.exec(
            &format!(
                "SELECT DISTINCT {} FROM publications p
                 JOIN users u ON u.id = p.author_id
                 LEFT JOIN followers f ON f.user_id = p.author_id
                 WHERE p.author_id = ? OR f.follower_id = ?
                 ORDER BY p.created_at DESC, p.id DESC",
                POST_COLUMNS
            ),
            &[id(user), id(user)],
        )?;
        posts_from(&result)
    }

    fn posts_by_author(&self, author: UserId) -> Result<Vec<Post>, StoreError> {
        let result = self.exec(
            &format!(
                "SELECT {} FROM publications p JOIN users u ON u.id = p.author_id
                 WHERE p.author_id = ?
                 ORDER BY p.created_at DESC, p.id DESC",
                POST_COLUMNS
            ),
            &[id(author)],
        )?;
        posts_from(&result)
    }

    fn update_post(&self, post_id: PostId, post: &NewPost) -> Result<(), StoreError> {
        let result = self.exec(
            "UPDATE publications SET title = ?, content = ? WHERE id = ? RETURNING id",
            &[text(&post.title), text(&post.content), id(post_id)],
        )?;
        if result.rows.is_empty() {
            return Err(StoreError::NotFound("publication"));
        }
        Ok(())
    }

    fn delete_post(&self, post: PostId) -> Result<(), StoreError> {
        self.with_transaction(|s| {
            s.exec("DELETE FROM likes_of_publications WHERE publication_id = ?", &[id(post)])?;
            let result = s.exec("DELETE FROM publications WHERE id = ? RETURNING id", &[id(post)])?;
            if result.rows.is_empty() {
                return Err(StoreError::NotFound("publication"));
            }
            Ok(())
        })
    }
}

impl<C: Database> SocialGraph for SqliteStore<C> {
    fn follow(&self, target: UserId, follower: UserId) -> Result<(), StoreError> {
        if target == follower {
            return Err(StoreError::SelfFollow);
        }
        self.with_transaction(|s| {
            if !s.user_exists(target)? || !s.user_exists(follower)? {
                return Err(StoreError::NotFound("user"));
            }
            s.exec(
                "INSERT INTO followers (user_id, follower_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
                &[id(target), id(follower)],
            )?;
            Ok(())
        })
    }

    fn unfollow(&self, target: UserId, follower: UserId) -> Result<(), StoreError> {
        self.exec(
            "DELETE FROM followers WHERE user_id = ? AND follower_id = ?",
            &[id(target), id(follower)],
        )?;
        Ok(())
    }

    fn followers(&self, user: UserId) -> Result<Vec<User>, StoreError> {
        let result = self.exec(
            &format!(
                "SELECT {} FROM users u JOIN followers f ON u.id = f.follower_id
                 WHERE f.user_id = ? ORDER BY u.id",
                USER_COLUMNS
            ),
            &[id(user)],
        )?;
        users_from(&result)
    }

    fn following(&self, user: UserId) -> Result<Vec<User>, StoreError> {
        let result = self.exec(
            &format!(
                "SELECT {} FROM users u JOIN followers f ON u.id = f.user_id
                 WHERE f.follower_id = ? ORDER BY u.id",
                USER_COLUMNS
            ),
            &[id(user)],
        )?;
        users_from(&result)
    }

    fn like(&self, post: PostId, liker: UserId) -> Result<(), StoreError> {
        self.with_transaction(|s| {
            if !s.user_exists(liker)? {
                return Err(StoreError::NotFound("user"));
            }
            let bumped = s.exec(
                "UPDATE publications SET likes = likes + 1 WHERE id = ? RETURNING likes",
                &[id(post)],
            )?;
            if bumped.rows.is_empty() {
                return Err(StoreError::NotFound("publication"));
            }
            // An existing edge aborts the transaction, undoing the increment.
            let inserted = s.exec(
                "INSERT INTO likes_of_publications (publication_id, liker_id) VALUES (?, ?)
                 ON CONFLICT DO NOTHING RETURNING publication_id",
                &[id(post), id(liker)],
            )?;
            if inserted.rows.is_empty() {
                return Err(StoreError::AlreadyLiked);
            }
            Ok(())
        })
    }

    fn unlike(&self, post: PostId, liker: UserId) -> Result<(), StoreError> {
        self.with_transaction(|s| {
            let removed = s.exec(
                "DELETE FROM likes_of_publications WHERE publication_id = ? AND liker_id = ?
                 RETURNING publication_id",
                &[id(post), id(liker)],
            )?;
            if removed.rows.is_empty() {
                return Ok(());
            }
            s.exec(
                "UPDATE publications SET likes = CASE WHEN likes > 0 THEN likes - 1 ELSE 0 END
                 WHERE id = ?",
                &[id(post)],
            )?;
            Ok(())
        })
    }

    fn likers(&self, post: PostId) -> Result<Vec<User>, StoreError> {
        let result = self.exec(
            &format!(
                "SELECT {} FROM users u JOIN likes_of_publications l ON u.id = l.liker_id
                 WHERE l.publication_id = ? ORDER BY u.id",
                USER_COLUMNS
            ),
            &[id(post)],
        )?;
        users_from(&result)
    }
}

impl<C: Database> Store for SqliteStore<C> {
    fn ping(&self) -> Result<(), StoreError> {
        self.exec("SELECT 1", &[])?;
        Ok(())
    }

    fn probe_write(&self) -> Result<(), StoreError> {
        let tx = Transaction::begin(self)?;
        self.exec(
            "INSERT INTO users (name, nick, email, pass, created_at) VALUES (?, ?, ?, ?, ?)",
            &[
                text("probe"),
                text("__readiness_probe__"),
                text("probe@readiness.invalid"),
                text("-"),
                text(&now_iso()),
            ],
        )?;
        // Dropping the guard rolls the probe row back.
        drop(tx);
        Ok(())
    }
}
