use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tern_core::{
    BootstrapNode, ConnectionStatus, ContactRepository, EngineEvent, EngineOperationError,
    MessageType, PublicKey, SaveManager, SaveOptions, SessionError, SessionState, ToxFacade, ToxId,
    seed_nodes,
};
use tern_events::{Event, EventStream};
use tern_session::stub::{StubEngineFactory, StubProbe};
use tern_session::{
    MemoryContactRepository, MemorySaveManager, SessionDependencies, SessionHandle, start,
};
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    probe: StubProbe,
    saves: MemorySaveManager,
    contacts: MemoryContactRepository,
    dependencies: SessionDependencies,
}

fn harness() -> Harness {
    let probe = StubProbe::new();
    let saves = MemorySaveManager::new();
    let contacts = MemoryContactRepository::new();
    let dependencies = SessionDependencies::new(
        Arc::new(StubEngineFactory::new(probe.clone())),
        Arc::new(saves.clone()),
        Arc::new(contacts.clone()),
    );
    Harness {
        probe,
        saves,
        contacts,
        dependencies,
    }
}

impl Harness {
    async fn start(&self) -> anyhow::Result<SessionHandle> {
        Ok(start(&self.dependencies, SaveOptions::default()).await?)
    }

    async fn saved_profile(&self, session: &SessionHandle) -> anyhow::Result<serde_json::Value> {
        let blob = self
            .saves
            .load(&session.public_key())
            .await?
            .context("profile was never saved")?;
        Ok(serde_json::from_slice(&blob)?)
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_matching(stream: &mut EventStream, matches: impl Fn(&Event) -> bool) -> Event {
    timeout(WAIT, async {
        loop {
            let envelope = stream.next().await.expect("event bus closed");
            if matches(&envelope.event) {
                return envelope.event;
            }
        }
    })
    .await
    .expect("event not published in time")
}

fn peer(byte: u8) -> PublicKey {
    PublicKey::from_bytes([byte; 32])
}

#[tokio::test]
async fn concurrent_mutations_leave_the_last_applied_state_saved() -> anyhow::Result<()> {
    let harness = harness();
    let session = harness.start().await?;

    let mut tasks = Vec::new();
    for index in 0..20 {
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            session.set_name(format!("name-{index}")).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    let applied = harness.probe.names();
    assert_eq!(applied.len(), 20);
    let last = applied.last().cloned().context("no names applied")?;
    assert_eq!(session.name().await?, last);
    assert_eq!(harness.saved_profile(&session).await?["name"], last.as_str());

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn operations_run_in_submission_order() -> anyhow::Result<()> {
    let harness = harness();
    let session = harness.start().await?;

    let (first, second, third) = tokio::join!(
        session.set_name("first".into()),
        session.set_name("second".into()),
        session.set_name("third".into()),
    );
    first?;
    second?;
    third?;

    assert_eq!(harness.probe.names(), vec!["first", "second", "third"]);
    assert_eq!(session.name().await?, "third");
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn stop_persists_the_last_mutation() -> anyhow::Result<()> {
    let harness = harness();
    let session = harness.start().await?;
    session.set_status_message("gone fishing".into()).await?;
    session.stop().await?;

    let blob = harness
        .saves
        .load(&session.public_key())
        .await?
        .context("no profile saved")?;
    let resumed = start(
        &harness.dependencies,
        SaveOptions {
            save_data: Some(blob),
            ..SaveOptions::default()
        },
    )
    .await?;
    assert_eq!(resumed.public_key(), session.public_key());
    assert_eq!(resumed.tox_id(), session.tox_id());
    assert_eq!(resumed.status_message().await?, "gone fishing");
    resumed.stop().await?;
    Ok(())
}

#[tokio::test]
async fn work_queued_before_stop_still_runs() -> anyhow::Result<()> {
    let harness = harness();
    let session = harness.start().await?;

    let (renamed, stopped) = tokio::join!(session.set_name("queued".into()), session.stop());
    renamed?;
    stopped?;

    assert_eq!(harness.saved_profile(&session).await?["name"], "queued");
    Ok(())
}

#[tokio::test]
async fn start_then_immediate_stop_converges() -> anyhow::Result<()> {
    let harness = harness();
    let mut events = harness.dependencies.events.subscribe(None);
    let session = harness.start().await?;
    session.stop().await?;

    assert_eq!(session.state(), SessionState::Stopped);
    assert!(!session.is_started());
    assert_eq!(harness.saves.save_count(), 2);
    assert_eq!(harness.probe.shutdowns(), 1);

    session.stop().await?;
    assert_eq!(harness.probe.shutdowns(), 1);

    let mut states = Vec::new();
    while states.last() != Some(&SessionState::Stopped) {
        if let Event::SessionStateChanged { state } =
            next_matching(&mut events, |event| {
                matches!(event, Event::SessionStateChanged { .. })
            })
            .await
        {
            states.push(state);
        }
    }
    assert_eq!(states.first(), Some(&SessionState::Starting));
    assert_eq!(
        states.iter().filter(|state| **state == SessionState::Stopped).count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn operations_after_stop_are_rejected() -> anyhow::Result<()> {
    let harness = harness();
    let session = harness.start().await?;
    session.stop().await?;

    let error = session
        .set_name("late".into())
        .await
        .expect_err("session is stopped");
    assert!(matches!(
        error,
        SessionError::Closed {
            operation: "set_name"
        }
    ));
    assert!(matches!(
        session.name().await,
        Err(SessionError::Closed { operation: "name" })
    ));
    Ok(())
}

#[tokio::test]
async fn abandoned_operations_still_run() -> anyhow::Result<()> {
    let harness = harness();
    let session = harness.start().await?;

    let abandoned = timeout(Duration::ZERO, session.set_name("abandoned".into())).await;
    assert!(abandoned.is_err());

    assert_eq!(session.name().await?, "abandoned");
    session.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn changed_interval_applies_on_the_next_tick() -> anyhow::Result<()> {
    let harness = harness();
    harness.probe.set_interval(Duration::from_millis(20));
    harness.probe.queue_intervals([
        Duration::from_millis(100),
        Duration::from_millis(300),
        Duration::from_millis(700),
    ]);
    let session = harness.start().await?;

    while harness.probe.iterations().len() < 5 {
        sleep(Duration::from_millis(10)).await;
    }
    session.stop().await?;

    let ticks = harness.probe.iterations();
    let expected = [100, 300, 700, 20].map(Duration::from_millis);
    for (window, expected) in ticks.windows(2).zip(expected) {
        let gap = window[1] - window[0];
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(2),
            "gap {gap:?}, expected {expected:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn each_session_bootstraps_afresh() -> anyhow::Result<()> {
    let harness = harness();
    let first = harness.start().await?;
    eventually(|| harness.probe.bootstraps().len() >= 3).await;
    first.stop().await?;

    let after_first = harness.probe.bootstraps().len();
    assert_eq!(after_first, 3);
    let distinct: std::collections::HashSet<_> = harness
        .probe
        .bootstraps()
        .into_iter()
        .map(|node| node.host)
        .collect();
    assert_eq!(distinct.len(), 3);

    let second = harness.start().await?;
    eventually(|| harness.probe.bootstraps().len() >= after_first + 3).await;
    second.stop().await?;
    Ok(())
}

#[tokio::test]
async fn bootstrap_failures_are_retried() -> anyhow::Result<()> {
    let harness = harness();
    for node in seed_nodes() {
        harness.probe.mark_unreachable(&node.host);
    }
    let mut events = harness.dependencies.events.subscribe(None);
    let session = harness.start().await?;

    for _ in 0..2 {
        let failure = next_matching(&mut events, |event| {
            matches!(event, Event::BootstrapFailed { .. })
        })
        .await;
        assert!(matches!(failure, Event::BootstrapFailed { port: 33445, .. }));
    }
    assert!(harness.probe.bootstraps().len() >= 2);
    assert!(session.is_started());

    for node in seed_nodes() {
        harness.probe.mark_reachable(&node.host);
    }
    let connected = next_matching(&mut events, |event| {
        matches!(event, Event::SelfConnectionChanged { .. })
    })
    .await;
    assert_eq!(
        connected,
        Event::SelfConnectionChanged {
            status: ConnectionStatus::Tcp
        }
    );
    session.stop().await?;
    Ok(())
}

fn three_nodes() -> Vec<BootstrapNode> {
    seed_nodes()
        .into_iter()
        .take(3)
        .enumerate()
        .map(|(index, node)| BootstrapNode {
            host: format!("node{index}.test"),
            ..node
        })
        .collect()
}

async fn run_ticks(
    harness: &Harness,
    nodes: Vec<BootstrapNode>,
    ticks: usize,
) -> anyhow::Result<()> {
    harness.probe.set_interval(Duration::from_millis(2));
    let dependencies = SessionDependencies {
        bootstrap_nodes: nodes,
        ..harness.dependencies.clone()
    };
    let session = start(&dependencies, SaveOptions::default()).await?;
    let probe = harness.probe.clone();
    eventually(move || probe.iterations().len() >= ticks).await;
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn a_failed_node_abandons_the_rest_of_its_batch() -> anyhow::Result<()> {
    let harness = harness();
    let nodes = three_nodes();
    for node in &nodes {
        harness.probe.mark_unreachable(&node.host);
    }
    run_ticks(&harness, nodes, 5).await?;

    assert_eq!(
        harness.probe.bootstraps().len(),
        harness.probe.iterations().len()
    );
    Ok(())
}

#[tokio::test]
async fn one_bad_node_keeps_bootstrap_armed() -> anyhow::Result<()> {
    let harness = harness();
    let nodes = three_nodes();
    let bad_host = nodes[1].host.clone();
    harness.probe.mark_unreachable(&bad_host);
    run_ticks(&harness, nodes, 5).await?;

    let ticks = harness.probe.iterations().len();
    let attempts = harness.probe.bootstraps();
    assert!(attempts.len() >= ticks);
    assert!(attempts.len() <= 3 * ticks);
    let bad_attempts = attempts.iter().filter(|node| node.host == bad_host).count();
    assert_eq!(bad_attempts, ticks);
    Ok(())
}

#[tokio::test]
async fn a_clean_batch_clears_the_bootstrap_flag() -> anyhow::Result<()> {
    let harness = harness();
    run_ticks(&harness, three_nodes(), 5).await?;
    assert_eq!(harness.probe.bootstraps().len(), 3);
    Ok(())
}

#[tokio::test]
async fn losing_the_overlay_rearms_bootstrap() -> anyhow::Result<()> {
    let harness = harness();
    let mut events = harness.dependencies.events.subscribe(None);
    let session = harness.start().await?;
    next_matching(&mut events, |event| {
        matches!(event, Event::SelfConnectionChanged { status } if *status != ConnectionStatus::None)
    })
    .await;
    let before = harness.probe.bootstraps().len();

    harness.probe.inject(EngineEvent::SelfConnectionChanged {
        status: ConnectionStatus::None,
    });
    eventually(|| harness.probe.bootstraps().len() > before).await;
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn engine_errors_skip_the_save() -> anyhow::Result<()> {
    let harness = harness();
    let session = harness.start().await?;
    session.name().await?;
    let before = harness.saves.save_count();

    let error = session
        .send_message(peer(9), "hello".into(), MessageType::Normal)
        .await
        .expect_err("unknown contact");
    assert!(matches!(
        error,
        SessionError::Operation {
            operation: "send_message",
            source: EngineOperationError::UnknownContact { .. }
        }
    ));
    assert_eq!(harness.saves.save_count(), before);

    session.set_name("alice".into()).await?;
    assert_eq!(harness.saves.save_count(), before + 1);
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn getters_never_save() -> anyhow::Result<()> {
    let harness = harness();
    let session = harness.start().await?;
    session.name().await?;
    let before = harness.saves.save_count();

    session.name().await?;
    session.status_message().await?;
    let blob = session.save_data().await?;
    assert!(!blob.is_empty());
    assert_eq!(harness.saves.save_count(), before);
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn save_failures_escalate_after_retries() -> anyhow::Result<()> {
    let harness = harness();
    let mut events = harness.dependencies.events.subscribe(None);
    let session = harness.start().await?;
    session.name().await?;

    harness.saves.fail_next_saves(2);
    session.set_name("retried".into()).await?;

    harness.saves.fail_next_saves(3);
    let error = session
        .set_name("lost".into())
        .await
        .expect_err("every attempt failed");
    assert!(matches!(
        error,
        SessionError::Persistence {
            operation: "set_name",
            ..
        }
    ));
    let degraded = next_matching(&mut events, |event| {
        matches!(event, Event::HealthChanged { .. })
    })
    .await;
    assert_eq!(
        degraded,
        Event::HealthChanged {
            degraded: vec!["save_manager".to_string()]
        }
    );

    session.set_name("recovered".into()).await?;
    let recovered = next_matching(&mut events, |event| {
        matches!(event, Event::HealthChanged { .. })
    })
    .await;
    assert_eq!(recovered, Event::HealthChanged { degraded: vec![] });
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn iterate_failures_mark_the_engine_degraded() -> anyhow::Result<()> {
    let harness = harness();
    let mut events = harness.dependencies.events.subscribe(None);
    harness.probe.set_fail_iterate(true);
    let session = harness.start().await?;

    let degraded = next_matching(&mut events, |event| {
        matches!(event, Event::HealthChanged { .. })
    })
    .await;
    assert_eq!(
        degraded,
        Event::HealthChanged {
            degraded: vec!["engine".to_string()]
        }
    );
    assert!(session.is_started());

    harness.probe.set_fail_iterate(false);
    let recovered = next_matching(&mut events, |event| {
        matches!(event, Event::HealthChanged { .. })
    })
    .await;
    assert_eq!(recovered, Event::HealthChanged { degraded: vec![] });
    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn contacts_are_reconciled_at_startup() -> anyhow::Result<()> {
    let harness = harness();
    let mut events = harness.dependencies.events.subscribe(None);
    let session = harness.start().await?;
    session.accept_friend_request(peer(1)).await?;
    session
        .add_contact(ToxId::new(peer(2), 0xCAFE), "hi there".into())
        .await?;
    let added = next_matching(&mut events, |event| {
        matches!(event, Event::ContactAdded { .. })
    })
    .await;
    assert_eq!(
        added,
        Event::ContactAdded {
            public_key: peer(1).to_hex()
        }
    );
    session.stop().await?;
    let blob = harness
        .saves
        .load(&session.public_key())
        .await?
        .context("no profile saved")?;

    let repository = MemoryContactRepository::new();
    let mut stale = tern_core::Contact::new(peer(1).to_hex());
    stale.name = "remembered".into();
    stale.connection_status = ConnectionStatus::Tcp;
    stale.typing = true;
    repository.add(stale).await?;

    let dependencies = SessionDependencies {
        contacts: Arc::new(repository.clone()),
        ..harness.dependencies.clone()
    };
    let resumed = start(
        &dependencies,
        SaveOptions {
            save_data: Some(blob),
            ..SaveOptions::default()
        },
    )
    .await?;
    resumed.stop().await?;

    let contacts = repository.all().await;
    assert_eq!(contacts.len(), 2);
    let kept = &contacts[0];
    assert_eq!(kept.public_key, peer(1).to_hex());
    assert_eq!(kept.name, "remembered");
    assert_eq!(kept.connection_status, ConnectionStatus::None);
    assert!(!kept.typing);
    assert_eq!(contacts[1].public_key, peer(2).to_hex());
    assert!(harness.contacts.all().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn engine_callbacks_reach_the_bus() -> anyhow::Result<()> {
    let harness = harness();
    let mut events = harness.dependencies.events.subscribe(None);
    let session = harness.start().await?;
    session.accept_friend_request(peer(4)).await?;

    harness.probe.inject(EngineEvent::ContactTyping {
        public_key: peer(4),
        typing: true,
    });
    let typing = next_matching(&mut events, |event| {
        matches!(event, Event::ContactTyping { .. })
    })
    .await;
    assert_eq!(
        typing,
        Event::ContactTyping {
            public_key: peer(4).to_hex(),
            typing: true
        }
    );

    let file_number = session
        .send_file(peer(4), tern_core::FileKind::Data, 8, "notes.txt".into())
        .await?;
    let requested = next_matching(&mut events, |event| {
        matches!(event, Event::FileChunkRequested { .. })
    })
    .await;
    assert_eq!(
        requested,
        Event::FileChunkRequested {
            public_key: peer(4).to_hex(),
            file_number,
            position: 0,
            length: 8
        }
    );
    session
        .send_file_chunk(peer(4), file_number, 0, vec![1; 8])
        .await?;
    session.end_call(peer(4)).await?;
    session.delete_contact(peer(4)).await?;
    let deleted = next_matching(&mut events, |event| {
        matches!(event, Event::ContactDeleted { .. })
    })
    .await;
    assert_eq!(
        deleted,
        Event::ContactDeleted {
            public_key: peer(4).to_hex()
        }
    );
    session.stop().await?;
    Ok(())
}
