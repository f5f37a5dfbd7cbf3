//! Conversions from engine callbacks to bus events.

use tern_core::EngineEvent;
use tern_events::Event;

#[must_use]
pub(crate) fn to_bus_event(event: EngineEvent) -> Event {
    match event {
        EngineEvent::SelfConnectionChanged { status } => Event::SelfConnectionChanged { status },
        EngineEvent::ContactRequest {
            public_key,
            message,
        } => Event::ContactRequest {
            public_key: public_key.to_hex(),
            message,
        },
        EngineEvent::ContactNameChanged { public_key, name } => Event::ContactNameChanged {
            public_key: public_key.to_hex(),
            name,
        },
        EngineEvent::ContactStatusMessageChanged {
            public_key,
            status_message,
        } => Event::ContactStatusMessageChanged {
            public_key: public_key.to_hex(),
            status_message,
        },
        EngineEvent::ContactStatusChanged { public_key, status } => Event::ContactStatusChanged {
            public_key: public_key.to_hex(),
            status,
        },
        EngineEvent::ContactConnectionChanged { public_key, status } => {
            Event::ContactConnectionChanged {
                public_key: public_key.to_hex(),
                status,
            }
        }
        EngineEvent::ContactTyping { public_key, typing } => Event::ContactTyping {
            public_key: public_key.to_hex(),
            typing,
        },
        EngineEvent::Message {
            public_key,
            kind,
            text,
        } => Event::MessageReceived {
            public_key: public_key.to_hex(),
            kind,
            text,
        },
        EngineEvent::ReadReceipt {
            public_key,
            message_id,
        } => Event::ReadReceipt {
            public_key: public_key.to_hex(),
            message_id,
        },
        EngineEvent::FileOffered {
            public_key,
            file_number,
            kind,
            size,
            name,
        } => Event::FileOffered {
            public_key: public_key.to_hex(),
            file_number,
            kind,
            size,
            name,
        },
        EngineEvent::FileChunkReceived {
            public_key,
            file_number,
            position,
            data,
        } => Event::FileChunkReceived {
            public_key: public_key.to_hex(),
            file_number,
            position,
            data,
        },
        EngineEvent::FileChunkRequested {
            public_key,
            file_number,
            position,
            length,
        } => Event::FileChunkRequested {
            public_key: public_key.to_hex(),
            file_number,
            position,
            length,
        },
        EngineEvent::CallEnded { public_key } => Event::CallEnded {
            public_key: public_key.to_hex(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::{MessageType, PublicKey};

    #[test]
    fn keys_become_uppercase_hex() {
        let key = PublicKey::from_bytes([0xab; 32]);
        let event = to_bus_event(EngineEvent::Message {
            public_key: key,
            kind: MessageType::Action,
            text: "waves".into(),
        });
        match event {
            Event::MessageReceived {
                public_key, kind, ..
            } => {
                assert_eq!(public_key, "AB".repeat(32));
                assert_eq!(kind, MessageType::Action);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
