use crate::models::{NewPost, NewUser};
use crate::security::credentials::hash;
use crate::store::{Store, StoreError};

struct DemoUser {
    nick: &'static str,
    name: &'static str,
    posts: &'static [(&'static str, &'static str)],
}

const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        nick: "test",
        name: "Test User",
        posts: &[("Hello", "This is my first post on Plaza!")],
    },
    DemoUser {
        nick: "alice",
        name: "Alice",
        posts: &[
            ("Welcome", "Welcome to my board! Excited to share thoughts here."),
            ("Done", "Just finished an amazing project. Feeling productive today!"),
        ],
    },
    DemoUser {
        nick: "bob",
        name: "Bob",
        posts: &[("Hey", "Hey everyone! Just joined, looking forward to connecting with you all.")],
    },
];

/// Seeds the demo accounts (password = nick) unless they already exist, and
/// makes `test` follow `bob`.
pub fn init_test_data<S: Store>(store: &S) -> anyhow::Result<()> {
    let mut test_id = None;
    let mut bob_id = None;

    for demo in DEMO_USERS {
        let digest = hash(demo.nick)?;
        let user = NewUser {
            name: demo.name.to_string(),
            nick: demo.nick.to_string(),
            email: format!("{}@plaza.local", demo.nick),
            digest,
        };

        let id = match store.create_user(&user) {
            Ok(created) => {
                for (title, content) in demo.posts {
                    store.create_post(
                        created.id,
                        &NewPost { title: title.to_string(), content: content.to_string() },
                    )?;
                }
                created.id
            }
            // Already seeded on an earlier start.
            Err(StoreError::Duplicate(_)) => match store.credential_by_email(&user.email)? {
                Some(existing) => existing.id,
                None => continue,
            },
            Err(e) => return Err(e.into()),
        };

        match demo.nick {
            "test" => test_id = Some(id),
            "bob" => bob_id = Some(id),
            _ => {}
        }
    }

    if let (Some(test), Some(bob)) = (test_id, bob_id) {
        store.follow(bob, test)?;
    }

    tracing::info!(users = DEMO_USERS.len(), "demo data ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PostRepository, SocialGraph, UserRepository};

    #[test]
    fn seeding_is_repeatable() {
        let store = MemoryStore::new();
        init_test_data(&store).unwrap();
        init_test_data(&store).unwrap();

        assert_eq!(store.search_users("").unwrap().len(), 3);

        let test = store.credential_by_email("test@plaza.local").unwrap().unwrap();
        let following = store.following(test.id).unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].nick, "bob");

        // Own post plus bob's.
        assert_eq!(store.feed(test.id).unwrap().len(), 2);
    }
}
