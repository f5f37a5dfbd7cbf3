//! Mirrors contact events from the bus into the contact repository.

use std::sync::Arc;

use tern_core::{Contact, ContactRepository, PersistenceError};
use tern_events::{Event, EventBus, EventEnvelope};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Change = Box<dyn for<'c> FnOnce(&'c mut Contact) + Send>;

/// Follow `events` and keep `contacts` current until the task is aborted.
pub fn spawn_contact_sync(
    events: &EventBus,
    contacts: Arc<dyn ContactRepository>,
) -> JoinHandle<()> {
    let mut stream = events.subscribe(None);
    tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            if let Err(err) = apply_event(contacts.as_ref(), &envelope).await {
                warn!(
                    event_id = envelope.id,
                    kind = envelope.event.kind(),
                    error = ?err,
                    "contact sync failed"
                );
            }
        }
        debug!("event bus closed; contact sync finished");
    })
}

/// Apply one event to the repository. Events about unknown contacts are
/// ignored, except `ContactAdded`, which creates the record.
pub(crate) async fn apply_event(
    contacts: &dyn ContactRepository,
    envelope: &EventEnvelope,
) -> Result<(), PersistenceError> {
    let timestamp = envelope.timestamp;
    let (public_key, change): (&str, Change) = match &envelope.event {
        Event::ContactAdded { public_key } => {
            if !contacts.exists(public_key).await? {
                contacts.add(Contact::new(public_key.clone())).await?;
            }
            return Ok(());
        }
        Event::ContactDeleted { public_key } => {
            contacts.delete(public_key).await?;
            return Ok(());
        }
        Event::ContactNameChanged { public_key, name } => {
            let name = name.clone();
            (
                public_key,
                Box::new(move |contact: &mut Contact| contact.name = name),
            )
        }
        Event::ContactStatusMessageChanged {
            public_key,
            status_message,
        } => {
            let status_message = status_message.clone();
            (
                public_key,
                Box::new(move |contact: &mut Contact| contact.status_message = status_message),
            )
        }
        Event::ContactStatusChanged { public_key, status } => {
            let status = *status;
            (
                public_key,
                Box::new(move |contact: &mut Contact| contact.status = status),
            )
        }
        Event::ContactConnectionChanged { public_key, status } => {
            let status = *status;
            (
                public_key,
                Box::new(move |contact: &mut Contact| contact.connection_status = status),
            )
        }
        Event::ContactTyping { public_key, typing } => {
            let typing = *typing;
            (
                public_key,
                Box::new(move |contact: &mut Contact| contact.typing = typing),
            )
        }
        Event::MessageReceived { public_key, .. } => (
            public_key,
            Box::new(move |contact: &mut Contact| contact.last_message_at = Some(timestamp)),
        ),
        _ => return Ok(()),
    };

    if !contacts.update(public_key, change).await? {
        debug!(public_key, kind = envelope.event.kind(), "event for unknown contact ignored");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::{ConnectionStatus, MessageType, UserStatus};
    use tern_events::EventStream;
    use tern_session::MemoryContactRepository;

    async fn deliver(
        bus: &EventBus,
        stream: &mut EventStream,
        repository: &MemoryContactRepository,
        event: Event,
    ) -> anyhow::Result<()> {
        let _ = bus.publish(event);
        let envelope = stream.next().await.expect("published event");
        apply_event(repository, &envelope).await?;
        Ok(())
    }

    #[tokio::test]
    async fn events_create_update_and_delete_records() -> anyhow::Result<()> {
        let bus = EventBus::with_capacity(16);
        let mut stream = bus.subscribe(None);
        let repository = MemoryContactRepository::new();
        let key = "AB".repeat(32);

        deliver(&bus, &mut stream, &repository, Event::ContactAdded {
            public_key: key.clone(),
        })
        .await?;
        deliver(&bus, &mut stream, &repository, Event::ContactNameChanged {
            public_key: key.clone(),
            name: "bob".into(),
        })
        .await?;
        deliver(&bus, &mut stream, &repository, Event::ContactStatusChanged {
            public_key: key.clone(),
            status: UserStatus::Busy,
        })
        .await?;
        deliver(&bus, &mut stream, &repository, Event::ContactConnectionChanged {
            public_key: key.clone(),
            status: ConnectionStatus::Udp,
        })
        .await?;
        deliver(&bus, &mut stream, &repository, Event::MessageReceived {
            public_key: key.clone(),
            kind: MessageType::Normal,
            text: "hi".into(),
        })
        .await?;

        let contact = repository.get(&key).await?.expect("record created");
        assert_eq!(contact.name, "bob");
        assert_eq!(contact.status, UserStatus::Busy);
        assert_eq!(contact.connection_status, ConnectionStatus::Udp);
        assert!(contact.last_message_at.is_some());

        deliver(&bus, &mut stream, &repository, Event::ContactDeleted {
            public_key: key.clone(),
        })
        .await?;
        assert!(!repository.exists(&key).await?);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_contacts_are_not_created_by_updates() -> anyhow::Result<()> {
        let bus = EventBus::with_capacity(4);
        let mut stream = bus.subscribe(None);
        let repository = MemoryContactRepository::new();

        deliver(&bus, &mut stream, &repository, Event::ContactTyping {
            public_key: "CD".repeat(32),
            typing: true,
        })
        .await?;
        assert!(repository.all().await.is_empty());
        Ok(())
    }
}
