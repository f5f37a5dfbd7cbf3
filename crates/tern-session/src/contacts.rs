//! In-process contact repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tern_core::{Contact, ContactRepository, PersistenceError};
use tokio::sync::RwLock;

/// Contact records held in memory, keyed by uppercase hex key.
#[derive(Debug, Clone, Default)]
pub struct MemoryContactRepository {
    contacts: Arc<RwLock<BTreeMap<String, Contact>>>,
}

impl MemoryContactRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, ordered by key.
    pub async fn all(&self) -> Vec<Contact> {
        self.contacts.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ContactRepository for MemoryContactRepository {
    async fn exists(&self, public_key: &str) -> Result<bool, PersistenceError> {
        Ok(self.contacts.read().await.contains_key(public_key))
    }

    async fn add(&self, contact: Contact) -> Result<(), PersistenceError> {
        self.contacts
            .write()
            .await
            .insert(contact.public_key.clone(), contact);
        Ok(())
    }

    async fn reset_transient_data(&self) -> Result<(), PersistenceError> {
        for contact in self.contacts.write().await.values_mut() {
            contact.reset_transient();
        }
        Ok(())
    }

    async fn get(&self, public_key: &str) -> Result<Option<Contact>, PersistenceError> {
        Ok(self.contacts.read().await.get(public_key).cloned())
    }

    async fn update(
        &self,
        public_key: &str,
        update: Box<dyn for<'c> FnOnce(&'c mut Contact) + Send>,
    ) -> Result<bool, PersistenceError> {
        let mut contacts = self.contacts.write().await;
        let Some(contact) = contacts.get_mut(public_key) else {
            return Ok(false);
        };
        update(contact);
        Ok(true)
    }

    async fn delete(&self, public_key: &str) -> Result<bool, PersistenceError> {
        Ok(self.contacts.write().await.remove(public_key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::ConnectionStatus;

    #[tokio::test]
    async fn reset_clears_transient_fields() -> anyhow::Result<()> {
        let repository = MemoryContactRepository::new();
        let mut contact = Contact::new("AA");
        contact.connection_status = ConnectionStatus::Tcp;
        contact.typing = true;
        repository.add(contact).await?;

        repository.reset_transient_data().await?;
        let stored = repository.get("AA").await?.expect("stored");
        assert_eq!(stored.connection_status, ConnectionStatus::None);
        assert!(!stored.typing);
        Ok(())
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_records() -> anyhow::Result<()> {
        let repository = MemoryContactRepository::new();
        assert!(
            !repository
                .update("BB", Box::new(|contact: &mut Contact| contact.name = "x".into()))
                .await?
        );
        repository.add(Contact::new("BB")).await?;
        assert!(
            repository
                .update("BB", Box::new(|contact: &mut Contact| contact.name = "bob".into()))
                .await?
        );
        assert_eq!(repository.get("BB").await?.map(|c| c.name), Some("bob".into()));
        assert!(repository.delete("BB").await?);
        assert!(!repository.exists("BB").await?);
        assert!(!repository.delete("BB").await?);
        Ok(())
    }
}
