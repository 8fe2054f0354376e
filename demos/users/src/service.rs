//! In-memory user directory standing in for a real command/query pipeline.

use crate::messages::{
    CreateUser, DeleteUser, GetUser, ListUsers, User, UserCreated, UserDeleted, UserExists,
    UserNotFound, UserView,
};
use cqea_core::{Message, MessageStream, Pipeline, PipelineRegistry};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

/// Pipeline codes served by [`UserDirectory`].
pub const PIPELINE_CODES: [&str; 4] = ["users.create", "users.get", "users.list", "users.delete"];

/// Users kept in memory. Clones share the same directory.
#[derive(Clone, Debug)]
pub struct UserDirectory {
    users: Arc<Mutex<BTreeMap<i64, User>>>,
    next_id: Arc<AtomicI64>,
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self {
            users: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl UserDirectory {
    /// Registry with this directory under every code of [`PIPELINE_CODES`].
    #[must_use]
    pub fn registry(&self) -> PipelineRegistry {
        PIPELINE_CODES
            .iter()
            .fold(PipelineRegistry::new(), |registry, code| registry.with_pipeline(*code, self.clone()))
    }

    async fn handle(&self, command: &dyn Message) -> Vec<Box<dyn Message>> {
        if let Some(create) = command.downcast_ref::<CreateUser>() {
            return vec![self.create(create).await];
        }
        if let Some(get) = command.downcast_ref::<GetUser>() {
            return vec![self.get(get.id).await];
        }
        if let Some(list) = command.downcast_ref::<ListUsers>() {
            return self.list(list).await;
        }
        if let Some(delete) = command.downcast_ref::<DeleteUser>() {
            return vec![self.delete(delete.id).await];
        }

        tracing::warn!(command = command.type_name(), "Unsupported command");
        Vec::new()
    }

    async fn create(&self, command: &CreateUser) -> Box<dyn Message> {
        let mut users = self.users.lock().await;
        if users.values().any(|user| user.name == command.name) {
            return Box::new(UserExists::new(&command.name));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user = User {
            id,
            name: command.name.clone(),
            email: command.email.clone(),
        };
        users.insert(id, user.clone());
        tracing::info!(id, name = %user.name, "User created");
        Box::new(UserCreated { user })
    }

    async fn get(&self, id: i64) -> Box<dyn Message> {
        match self.users.lock().await.get(&id) {
            Some(user) => Box::new(UserView {
                user: user.clone(),
                total: 1,
            }),
            None => Box::new(UserNotFound::new(id)),
        }
    }

    async fn list(&self, query: &ListUsers) -> Vec<Box<dyn Message>> {
        let users = self.users.lock().await;
        let matching: Vec<&User> = users
            .values()
            .filter(|user| query.name.as_ref().is_none_or(|prefix| user.name.starts_with(prefix.as_str())))
            .collect();
        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let limit = query
            .limit
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(usize::MAX);

        matching
            .into_iter()
            .take(limit)
            .map(|user| {
                Box::new(UserView {
                    user: user.clone(),
                    total,
                }) as Box<dyn Message>
            })
            .collect()
    }

    async fn delete(&self, id: i64) -> Box<dyn Message> {
        match self.users.lock().await.remove(&id) {
            Some(_) => {
                tracing::info!(id, "User deleted");
                Box::new(UserDeleted { id })
            }
            None => Box::new(UserNotFound::new(id)),
        }
    }
}

impl Pipeline for UserDirectory {
    fn execute(&self, commands: Vec<Box<dyn Message>>) -> MessageStream {
        let directory = self.clone();
        async_stream::stream! {
            for command in commands {
                for result in directory.handle(command.as_ref()).await {
                    yield result;
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn run(directory: &UserDirectory, command: impl Message) -> Vec<Box<dyn Message>> {
        let command: Box<dyn Message> = Box::new(command);
        directory.execute(vec![command]).collect().await
    }

    fn create(name: &str) -> CreateUser {
        CreateUser {
            name: name.to_string(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let directory = UserDirectory::default();
        let created = run(&directory, create("ada")).await;
        let id = created[0].downcast_ref::<UserCreated>().unwrap().user.id;

        let found = run(&directory, GetUser { id }).await;
        assert_eq!(found[0].downcast_ref::<UserView>().unwrap().user.name, "ada");
    }

    #[tokio::test]
    async fn test_duplicate_name_is_a_conflict() {
        let directory = UserDirectory::default();
        run(&directory, create("ada")).await;

        let again = run(&directory, create("ada")).await;
        assert!(again[0].downcast_ref::<UserExists>().is_some());
    }

    #[tokio::test]
    async fn test_list_filters_and_limits_but_counts_all() {
        let directory = UserDirectory::default();
        for name in ["ada", "alan", "grace"] {
            run(&directory, create(name)).await;
        }

        let views = run(
            &directory,
            ListUsers {
                name: Some("a".into()),
                limit: Some(1),
            },
        )
        .await;

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].downcast_ref::<UserView>().unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_delete_unknown_user() {
        let directory = UserDirectory::default();
        let results = run(&directory, DeleteUser { id: 7 }).await;
        assert!(results[0].downcast_ref::<UserNotFound>().is_some());
    }

    #[test]
    fn test_registry_serves_every_code() {
        let registry = UserDirectory::default().registry();
        let mut expected = PIPELINE_CODES.to_vec();
        expected.sort_unstable();
        assert_eq!(registry.codes(), expected);
    }
}
