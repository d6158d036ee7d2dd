use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::helpers::now_iso;
use crate::models::{NewPost, NewUser, Post, PostId, ProfileUpdate, StoredCredential, User, UserId};
use crate::store::{PostRepository, SocialGraph, Store, StoreError, UserRepository};

#[derive(Clone)]
struct UserRow {
    user: User,
    digest: String,
}

#[derive(Clone)]
struct PostRow {
    id: PostId,
    title: String,
    content: String,
    author_id: UserId,
    likes: u64,
    created_at: String,
}

#[derive(Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, UserRow>,
    posts: BTreeMap<PostId, PostRow>,
    /// (followed, follower)
    follows: BTreeSet<(UserId, UserId)>,
    /// (post, liker)
    likes: BTreeSet<(PostId, UserId)>,
    last_user_id: UserId,
    last_post_id: PostId,
}

impl Tables {
    fn post_view(&self, row: &PostRow) -> Post {
        Post {
            id: row.id,
            title: row.title.clone(),
            content: row.content.clone(),
            author_id: row.author_id,
            author_nick: self
                .users
                .get(&row.author_id)
                .map(|u| u.user.nick.clone())
                .unwrap_or_default(),
            likes: row.likes,
            created_at: row.created_at.clone(),
        }
    }

    fn users_in(&self, ids: impl Iterator<Item = UserId>) -> Vec<User> {
        ids.filter_map(|id| self.users.get(&id).map(|u| u.user.clone()))
            .collect()
    }

    fn newest_first(&self, mut posts: Vec<Post>) -> Vec<Post> {
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts
    }

    fn ensure_unique(&self, nick: &str, email: &str, except: Option<UserId>) -> Result<(), StoreError> {
        for row in self.users.values() {
            if Some(row.user.id) == except {
                continue;
            }
            if row.user.nick == nick {
                return Err(StoreError::Duplicate("nick"));
            }
            if row.user.email == email {
                return Err(StoreError::Duplicate("email"));
            }
        }
        Ok(())
    }
}

/// Rolls the tables back to the snapshot unless committed.
struct Transaction<'a> {
    tables: MutexGuard<'a, Tables>,
    snapshot: Option<Tables>,
}

impl Transaction<'_> {
    fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.tables = snapshot;
        }
    }
}

/// In-memory store with the same transactional guarantees as the SQLite
/// store. Transactions are serialised by a single mutex.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panicking transaction has already restored its snapshot, so the
        // data behind a poisoned lock is consistent.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, body: impl FnOnce(&Tables) -> T) -> T {
        body(&self.lock())
    }

    fn with_transaction<T>(
        &self,
        body: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tables = self.lock();
        let snapshot = Some(tables.clone());
        let mut tx = Transaction { tables, snapshot };

        let value = body(&mut *tx.tables)?;
        tx.commit();
        Ok(value)
    }
}

impl UserRepository for MemoryStore {
    fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        self.with_transaction(|t| {
            t.ensure_unique(&user.nick, &user.email, None)?;
            t.last_user_id += 1;
            let created = User {
                id: t.last_user_id,
                name: user.name.clone(),
                nick: user.nick.clone(),
                email: user.email.clone(),
                created_at: now_iso(),
            };
            t.users.insert(
                created.id,
                UserRow { user: created.clone(), digest: user.digest.clone() },
            );
            Ok(created)
        })
    }

    fn search_users(&self, name_or_nick: &str) -> Result<Vec<User>, StoreError> {
        let needle = name_or_nick.to_lowercase();
        Ok(self.read(|t| {
            t.users
                .values()
                .filter(|r| {
                    r.user.name.to_lowercase().contains(&needle)
                        || r.user.nick.to_lowercase().contains(&needle)
                })
                .map(|r| r.user.clone())
                .collect()
        }))
    }

    fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read(|t| t.users.get(&id).map(|r| r.user.clone())))
    }

    fn credential_by_email(&self, email: &str) -> Result<Option<StoredCredential>, StoreError> {
        Ok(self.read(|t| {
            t.users
                .values()
                .find(|r| r.user.email == email)
                .map(|r| StoredCredential { id: r.user.id, digest: r.digest.clone() })
        }))
    }

    fn password_digest(&self, id: UserId) -> Result<Option<String>, StoreError> {
        Ok(self.read(|t| t.users.get(&id).map(|r| r.digest.clone())))
    }

    fn update_user(&self, id: UserId, update: &ProfileUpdate) -> Result<(), StoreError> {
        self.with_transaction(|t| {
            t.ensure_unique(&update.nick, &update.email, Some(id))?;
            let row = t.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
            row.user.name = update.name.clone();
            row.user.nick = update.nick.clone();
            row.user.email = update.email.clone();
            Ok(())
        })
    }

    fn update_password(&self, id: UserId, digest: &str) -> Result<(), StoreError> {
        self.with_transaction(|t| {
            let row = t.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
            row.digest = digest.to_string();
            Ok(())
        })
    }

    fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        self.with_transaction(|t| {
            let liked: Vec<PostId> = t
                .likes
                .iter()
                .filter(|(_, liker)| *liker == id)
                .map(|(post, _)| *post)
                .collect();
            for post in liked {
                if let Some(row) = t.posts.get_mut(&post) {
                    row.likes = row.likes.saturating_sub(1);
                }
            }
            t.likes.retain(|(_, liker)| *liker != id);

            let authored: BTreeSet<PostId> = t
                .posts
                .values()
                .filter(|p| p.author_id == id)
                .map(|p| p.id)
                .collect();
            t.likes.retain(|(post, _)| !authored.contains(post));
            t.posts.retain(|post, _| !authored.contains(post));

            t.follows.retain(|(followed, follower)| *followed != id && *follower != id);
            t.users.remove(&id).ok_or(StoreError::NotFound("user"))?;
            Ok(())
        })
    }
}

impl PostRepository for MemoryStore {
    fn create_post(&self, author: UserId, post: &NewPost) -> Result<Post, StoreError> {
        self.with_transaction(|t| {
            if !t.users.contains_key(&author) {
                return Err(StoreError::NotFound("user"));
            }
            t.last_post_id += 1;
            let row = PostRow {
                id: t.last_post_id,
                title: post.title.clone(),
                content: post.content.clone(),
                author_id: author,
                likes: 0,
                created_at: now_iso(),
            };
            let view = t.post_view(&row);
            t.posts.insert(row.id, row);
            Ok(view)
        })
    }

    fn post_by_id(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(self.read(|t| t.posts.get(&id).map(|row| t.post_view(row))))
    }

    fn feed(&self, user: UserId) -> Result<Vec<Post>, StoreError> {
        Ok(self.read(|t| {
            let posts = t
                .posts
                .values()
                .filter(|p| p.author_id == user || t.follows.contains(&(p.author_id, user)))
                .map(|p| t.post_view(p))
                .collect();
            t.newest_first(posts)
        }))
    }

    fn posts_by_author(&self, author: UserId) -> Result<Vec<Post>, StoreError> {
        Ok(self.read(|t| {
            let posts = t
                .posts
                .values()
                .filter(|p| p.author_id == author)
                .map(|p| t.post_view(p))
                .collect();
            t.newest_first(posts)
        }))
    }

    fn update_post(&self, id: PostId, post: &NewPost) -> Result<(), StoreError> {
        self.with_transaction(|t| {
            let row = t.posts.get_mut(&id).ok_or(StoreError::NotFound("publication"))?;
            row.title = post.title.clone();
            row.content = post.content.clone();
            Ok(())
        })
    }

    fn delete_post(&self, id: PostId) -> Result<(), StoreError> {
        self.with_transaction(|t| {
            t.likes.retain(|(post, _)| *post != id);
            t.posts.remove(&id).ok_or(StoreError::NotFound("publication"))?;
            Ok(())
        })
    }
}

impl SocialGraph for MemoryStore {
    fn follow(&self, target: UserId, follower: UserId) -> Result<(), StoreError> {
        if target == follower {
            return Err(StoreError::SelfFollow);
        }
        self.with_transaction(|t| {
            if !t.users.contains_key(&target) || !t.users.contains_key(&follower) {
                return Err(StoreError::NotFound("user"));
            }
            t.follows.insert((target, follower));
            Ok(())
        })
    }

    fn unfollow(&self, target: UserId, follower: UserId) -> Result<(), StoreError> {
        self.with_transaction(|t| {
            t.follows.remove(&(target, follower));
            Ok(())
        })
    }

    fn followers(&self, user: UserId) -> Result<Vec<User>, StoreError> {
        Ok(self.read(|t| {
            let ids = t
                .follows
                .iter()
                .filter(|(followed, _)| *followed == user)
                .map(|(_, follower)| *follower);
            t.users_in(ids)
        }))
    }

    fn following(&self, user: UserId) -> Result<Vec<User>, StoreError> {
        Ok(self.read(|t| {
            let ids = t
                .follows
                .iter()
                .filter(|(_, follower)| *follower == user)
                .map(|(followed, _)| *followed);
            t.users_in(ids)
        }))
    }

    fn like(&self, post: PostId, liker: UserId) -> Result<(), StoreError> {
        self.with_transaction(|t| {
            if !t.users.contains_key(&liker) {
                return Err(StoreError::NotFound("user"));
            }
            let row = t.posts.get_mut(&post).ok_or(StoreError::NotFound("publication"))?;
            row.likes += 1;
            // The counter bump above is undone by the rollback on this path.
            if !t.likes.insert((post, liker)) {
                return Err(StoreError::AlreadyLiked);
            }
            Ok(())
        })
    }

    fn unlike(&self, post: PostId, liker: UserId) -> Result<(), StoreError> {
        self.with_transaction(|t| {
            if !t.likes.remove(&(post, liker)) {
                return Ok(());
            }
            if let Some(row) = t.posts.get_mut(&post) {
                row.likes = row.likes.saturating_sub(1);
            }
            Ok(())
        })
    }

    fn likers(&self, post: PostId) -> Result<Vec<User>, StoreError> {
        Ok(self.read(|t| {
            let ids = t
                .likes
                .iter()
                .filter(|(p, _)| *p == post)
                .map(|(_, liker)| *liker);
            t.users_in(ids)
        }))
    }
}

impl Store for MemoryStore {
    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn probe_write(&self) -> Result<(), StoreError> {
        let probe = self.with_transaction(|t| {
            t.last_user_id += 1;
            Err::<(), _>(StoreError::Storage("probe".to_string()))
        });
        match probe {
            Err(StoreError::Storage(msg)) if msg == "probe" => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(nick: &str) -> NewUser {
        NewUser {
            name: format!("{} name", nick),
            nick: nick.to_string(),
            email: format!("{}@example.com", nick),
            digest: "digest".to_string(),
        }
    }

    fn seeded() -> (MemoryStore, UserId, UserId, PostId) {
        let store = MemoryStore::new();
        let author = store.create_user(&new_user("author")).unwrap().id;
        let liker = store.create_user(&new_user("liker")).unwrap().id;
        let post = store
            .create_post(author, &NewPost { title: "t".into(), content: "c".into() })
            .unwrap()
            .id;
        (store, author, liker, post)
    }

    fn counter(store: &MemoryStore, post: PostId) -> u64 {
        store.post_by_id(post).unwrap().unwrap().likes
    }

    fn edges(store: &MemoryStore, post: PostId) -> u64 {
        store.likers(post).unwrap().len() as u64
    }

    #[test]
    fn like_unlike_scenario_keeps_counter_in_step() {
        let (store, _, liker, post) = seeded();
        assert_eq!(counter(&store, post), 0);

        store.like(post, liker).unwrap();
        assert_eq!(counter(&store, post), 1);
        assert_eq!(edges(&store, post), 1);

        assert_eq!(store.like(post, liker), Err(StoreError::AlreadyLiked));
        assert_eq!(counter(&store, post), 1);
        assert_eq!(edges(&store, post), 1);

        store.unlike(post, liker).unwrap();
        assert_eq!(counter(&store, post), 0);
        assert_eq!(edges(&store, post), 0);

        store.unlike(post, liker).unwrap();
        assert_eq!(counter(&store, post), 0);
        assert_eq!(edges(&store, post), 0);
    }

    #[test]
    fn counter_matches_edges_after_mixed_sequence() {
        let (store, author, liker, post) = seeded();
        let third = store.create_user(&new_user("third")).unwrap().id;

        let ops: [(bool, UserId); 9] = [
            (true, liker),
            (true, third),
            (false, liker),
            (false, liker),
            (true, author),
            (true, third),
            (false, third),
            (false, author),
            (true, liker),
        ];
        for (like, who) in ops {
            let _ = if like { store.like(post, who) } else { store.unlike(post, who) };
            assert_eq!(counter(&store, post), edges(&store, post));
        }
        assert_eq!(counter(&store, post), 1);
    }

    #[test]
    fn like_of_missing_publication_changes_nothing() {
        let (store, _, liker, _) = seeded();
        assert_eq!(store.like(999, liker), Err(StoreError::NotFound("publication")));
        assert!(store.likers(999).unwrap().is_empty());
    }

    #[test]
    fn like_by_deleted_user_is_rejected() {
        let (store, _, liker, post) = seeded();
        store.delete_user(liker).unwrap();

        assert_eq!(store.like(post, liker), Err(StoreError::NotFound("user")));
        assert_eq!(counter(&store, post), 0);
        assert_eq!(edges(&store, post), 0);
    }

    #[test]
    fn follow_is_idempotent() {
        let (store, author, liker, _) = seeded();
        store.follow(author, liker).unwrap();
        store.follow(author, liker).unwrap();

        let followers = store.followers(author).unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].id, liker);
        assert_eq!(store.following(liker).unwrap()[0].id, author);
    }

    #[test]
    fn unfollow_is_idempotent() {
        let (store, author, liker, _) = seeded();
        store.unfollow(author, liker).unwrap();
        store.follow(author, liker).unwrap();
        store.unfollow(author, liker).unwrap();
        store.unfollow(author, liker).unwrap();
        assert!(store.followers(author).unwrap().is_empty());
    }

    #[test]
    fn self_follow_is_refused_by_the_store_too() {
        let (store, author, _, _) = seeded();
        assert_eq!(store.follow(author, author), Err(StoreError::SelfFollow));
        assert!(store.followers(author).unwrap().is_empty());
    }

    #[test]
    fn follow_of_unknown_user_is_not_found() {
        let (store, _, liker, _) = seeded();
        assert_eq!(store.follow(999, liker), Err(StoreError::NotFound("user")));
    }

    #[test]
    fn duplicate_nick_or_email_is_rejected() {
        let store = MemoryStore::new();
        store.create_user(&new_user("ana")).unwrap();

        let mut same_nick = new_user("ana");
        same_nick.email = "other@example.com".into();
        assert_eq!(store.create_user(&same_nick), Err(StoreError::Duplicate("nick")));

        let mut same_email = new_user("bea");
        same_email.email = "ana@example.com".into();
        assert_eq!(store.create_user(&same_email), Err(StoreError::Duplicate("email")));
    }

    #[test]
    fn feed_contains_own_and_followed_posts_newest_first() {
        let (store, author, liker, first) = seeded();
        let stranger = store.create_user(&new_user("stranger")).unwrap().id;
        let own = store
            .create_post(liker, &NewPost { title: "mine".into(), content: "x".into() })
            .unwrap()
            .id;
        store
            .create_post(stranger, &NewPost { title: "hidden".into(), content: "x".into() })
            .unwrap();

        assert_eq!(store.feed(liker).unwrap().iter().map(|p| p.id).collect::<Vec<_>>(), vec![own]);

        store.follow(author, liker).unwrap();
        let feed: Vec<PostId> = store.feed(liker).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(feed, vec![own, first]);
    }

    #[test]
    fn deleting_a_liker_keeps_counters_consistent() {
        let (store, author, liker, post) = seeded();
        store.like(post, liker).unwrap();
        store.like(post, author).unwrap();
        store.follow(author, liker).unwrap();

        store.delete_user(liker).unwrap();

        assert_eq!(counter(&store, post), 1);
        assert_eq!(edges(&store, post), 1);
        assert!(store.followers(author).unwrap().is_empty());
        assert_eq!(store.user_by_id(liker).unwrap(), None);
    }

    #[test]
    fn deleting_an_author_removes_their_publications() {
        let (store, author, liker, post) = seeded();
        store.like(post, liker).unwrap();
        store.delete_user(author).unwrap();
        assert_eq!(store.post_by_id(post).unwrap(), None);
        assert!(store.likers(post).unwrap().is_empty());
    }

    #[test]
    fn failed_transaction_restores_every_table() {
        let (store, author, _, post) = seeded();
        let result = store.with_transaction(|t| {
            t.posts.clear();
            t.users.clear();
            Err::<(), _>(StoreError::Storage("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.user_by_id(author).unwrap().is_some());
        assert!(store.post_by_id(post).unwrap().is_some());
    }

    #[test]
    fn panicking_transaction_is_rolled_back() {
        let (store, author, _, _) = seeded();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = store.with_transaction(|t| -> Result<(), StoreError> {
                t.users.clear();
                panic!("mid-transaction failure");
            });
        }));
        assert!(outcome.is_err());
        assert!(store.user_by_id(author).unwrap().is_some());
    }

    #[test]
    fn probe_write_leaves_no_trace() {
        let store = MemoryStore::new();
        store.probe_write().unwrap();
        let created = store.create_user(&new_user("first")).unwrap();
        assert_eq!(created.id, 1);
    }
}
