use std::sync::Arc;

use accord_crypto::SigningService;
use accord_flow::sim::simulated_signer;
use accord_flow::{
    ErrorKind, FinalityCoordinator, FlowConfig, FlowError, NodeConfig, PartyNode, ProgressBus,
    ProgressEvent, ProgressStep, ProposalBuilder, ProposalRequest, SessionState,
    SignatureCollector, SimNetwork, VaultConfig,
};
use accord_notary::{InMemoryNotary, NotaryDecision, OrderingAuthority};
use accord_types::{
    CommittedTransition, Command, LinearId, Proposal, Record, RecordAndRef, RecordRef, TodoItem,
    TransitionId,
};
use accord_vault::{
    ApplyOutcome, CurrentRecords, RecordQuery, RecordStore, Vault, VaultError, VaultResult,
};
use async_trait::async_trait;
use tokio::sync::broadcast;

async fn two_parties() -> (SimNetwork, Arc<PartyNode>, Arc<PartyNode>) {
    let mut sim = SimNetwork::new("Notary");
    let a = sim.add_party("PartyA").await.unwrap();
    let b = sim.add_party("PartyB").await.unwrap();
    (sim, a, b)
}

fn drain(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn buy_milk_end_to_end() {
    let (_sim, a, b) = two_parties().await;

    let t1 = a
        .propose_create(TodoItem::new("buy milk", "semi-skimmed"), "PartyB")
        .await
        .unwrap();
    assert!(!t1.proposal.output.payload.complete);
    assert_eq!(t1.proposal.command, Command::Create);
    assert!(t1.proposal.input.is_none());

    let t2 = b.propose_complete(t1.linear_id()).await.unwrap();
    assert!(t2.proposal.output.payload.complete);
    assert_eq!(t2.proposal.output.linear_id, t1.proposal.output.linear_id);
    assert_eq!(t2.input_ref(), Some(t1.output_ref()));

    for node in [&a, &b] {
        let current = node
            .query(&RecordQuery::all().linear_id(t1.linear_id()))
            .unwrap()
            .to_vec();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].reference, t2.output_ref());
        assert!(node.store().is_consumed(&t1.output_ref()).unwrap());
        assert!(node.store().transition(&t2.id).unwrap().is_some());
    }
}

#[tokio::test]
async fn queries_track_completion() {
    let (_sim, a, b) = two_parties().await;
    let me_b = b.whoami().clone();
    let open = RecordQuery::all().assignee(me_b.clone()).complete(false);
    let done = RecordQuery::all().assignee(me_b).complete(true);

    let t1 = a
        .propose_create(TodoItem::new("t", "d"), "PartyB")
        .await
        .unwrap();

    let open_now = b.query(&open).unwrap().to_vec();
    assert_eq!(open_now.len(), 1);
    assert_eq!(open_now[0].record, t1.proposal.output);
    assert!(b.query(&done).unwrap().is_empty());
    assert_eq!(b.my_todos().unwrap().count(), 1);
    assert_eq!(a.my_owned_todos().unwrap().count(), 1);
    assert!(a.my_todos().unwrap().is_empty());

    b.propose_complete(t1.linear_id()).await.unwrap();

    assert!(b.query(&open).unwrap().is_empty());
    assert_eq!(b.query(&done).unwrap().count(), 1);
    assert_eq!(b.my_completed_todos().unwrap().count(), 1);
    assert_eq!(a.todos().unwrap().count(), 1);
}

#[tokio::test]
async fn complete_of_unknown_record_never_leaves_the_node() {
    let (sim, _a, b) = two_parties().await;
    let sessions = sim.network().sessions_opened();

    let err = b.propose_complete(LinearId::new()).await.unwrap_err();

    assert!(matches!(err, FlowError::NotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(sim.network().sessions_opened(), sessions);
    assert_eq!(sim.notary().submissions(), 0);
}

#[tokio::test]
async fn completing_twice_fails_locally() {
    let (sim, a, b) = two_parties().await;
    let t1 = a
        .propose_create(TodoItem::new("t", "d"), "PartyB")
        .await
        .unwrap();
    b.propose_complete(t1.linear_id()).await.unwrap();
    let submissions = sim.notary().submissions();

    let err = a.propose_complete(t1.linear_id()).await.unwrap_err();
    assert!(matches!(err, FlowError::AlreadyComplete(id) if id == t1.linear_id()));
    assert_eq!(sim.notary().submissions(), submissions);
}

#[tokio::test]
async fn unknown_assignee_is_not_found() {
    let (sim, a, _b) = two_parties().await;
    let err = a
        .propose_create(TodoItem::new("t", "d"), "PartyZ")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(sim.network().sessions_opened(), 0);
}

#[tokio::test]
async fn self_assigned_record_needs_no_sessions() {
    let (sim, a, _b) = two_parties().await;
    let t1 = a
        .propose_create(TodoItem::new("note to self", ""), "PartyA")
        .await
        .unwrap();
    a.propose_complete(t1.linear_id()).await.unwrap();
    assert_eq!(sim.network().sessions_opened(), 0);
    assert_eq!(a.my_completed_todos().unwrap().count(), 1);
}

#[tokio::test]
async fn peers_exclude_self_and_authority() {
    let (_sim, a, _b) = two_parties().await;
    let peers: Vec<_> = a.peers().into_iter().map(|p| p.name).collect();
    assert_eq!(peers, vec!["PartyB"]);
    assert_eq!(a.whoami().name, "PartyA");
}

#[tokio::test]
async fn counterparty_rejects_invalid_proposal() {
    let (sim, a, b) = two_parties().await;
    let signer = simulated_signer("PartyA");

    let mut payload = TodoItem::new("t", "d");
    payload.complete = true;
    let record = Record::create(payload, a.whoami().clone(), b.whoami().clone());
    let mut proposal = Proposal::new(Command::Create, None, record);
    let id = proposal.id().unwrap();
    proposal.add_signature(signer.sign_transition(&id));

    let transport = sim.network().endpoint(a.whoami().clone());
    let events = ProgressBus::new(16);
    let mut rx = events.subscribe();
    let err = SignatureCollector::new(&transport, &events)
        .collect(proposal)
        .await
        .unwrap_err();

    match &err {
        FlowError::CounterpartyRejected { party, reason } => {
            assert_eq!(party, b.whoami());
            assert!(reason.contains("incomplete"), "{reason}");
        }
        other => panic!("expected counterparty rejection, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Validation);

    let states: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::Session { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SessionState::Sent,
            SessionState::AwaitingSignature,
            SessionState::Rejected
        ]
    );
    assert!(b.todos().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_counterparty_is_transport_error() {
    let (sim, a, _b) = two_parties().await;
    sim.network().disconnect("PartyB");

    let err = a
        .propose_create(TodoItem::new("t", "d"), "PartyB")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(a.todos().unwrap().is_empty());
    assert_eq!(sim.notary().submissions(), 0);
}

#[tokio::test]
async fn unreachable_authority_leaves_store_untouched() {
    let (sim, a, b) = two_parties().await;
    sim.notary().set_offline(true);

    let err = a
        .propose_create(TodoItem::new("t", "d"), "PartyB")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(a.todos().unwrap().is_empty());
    assert!(b.todos().unwrap().is_empty());
}

#[tokio::test]
async fn silent_counterparty_times_out() {
    let mut sim = SimNetwork::new("Notary");
    let config = NodeConfig {
        party: "PartyA".into(),
        flow: FlowConfig {
            collect_timeout_secs: Some(1),
            ..FlowConfig::default()
        },
        ..NodeConfig::default()
    };
    let a = sim.add_node(&config).await.unwrap();
    let (_silent, _inbox) = sim.add_silent_party("PartyC");

    let err = a
        .propose_create(TodoItem::new("t", "d"), "PartyC")
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Timeout(_)));
    assert!(a.todos().unwrap().is_empty());
    assert_eq!(sim.notary().submissions(), 0);
}

#[tokio::test]
async fn progress_steps_are_emitted_in_order() {
    let (_sim, a, b) = two_parties().await;
    let mut rx = a.subscribe();

    let t1 = a
        .propose_create(TodoItem::new("t", "d"), "PartyB")
        .await
        .unwrap();
    let events = drain(&mut rx);

    let steps: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Step(step) => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(steps, ProgressStep::ALL.to_vec());

    assert!(events.contains(&ProgressEvent::Session {
        counterparty: b.whoami().clone(),
        state: SessionState::Signed,
    }));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Committed {
            transition: t1.id,
            linear_id: t1.linear_id(),
        })
    );
}

#[tokio::test]
async fn distribution_failure_does_not_undo_commit() {
    let (sim, a, b) = two_parties().await;
    let record = Record::create(
        TodoItem::new("t", "d"),
        a.whoami().clone(),
        b.whoami().clone(),
    );
    let mut proposal = Proposal::new(Command::Create, None, record);
    let id = proposal.id().unwrap();
    for name in ["PartyA", "PartyB"] {
        proposal.add_signature(simulated_signer(name).sign_transition(&id));
    }
    sim.network().disconnect("PartyB");

    let transport = sim.network().endpoint(a.whoami().clone());
    let events = ProgressBus::new(16);
    let mut rx = events.subscribe();
    let committed = FinalityCoordinator::new(
        a.whoami(),
        sim.notary().as_ref(),
        a.store().as_ref(),
        &transport,
        &events,
    )
    .finalize(&proposal)
    .await
    .unwrap();

    assert_eq!(a.todos().unwrap().count(), 1);
    assert!(b.todos().unwrap().is_empty());
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        ProgressEvent::DistributionFailed { party, .. } if party == b.whoami()
    )));
    assert_eq!(committed.id, id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_finalizations_commit_exactly_once() {
    let (sim, a, b) = two_parties().await;
    let t1 = a
        .propose_create(TodoItem::new("t", "d"), "PartyB")
        .await
        .unwrap();

    let quorum_signed = || {
        let mut proposal = ProposalBuilder::new(a.whoami(), a.store().as_ref())
            .build(ProposalRequest::Complete {
                linear_id: t1.linear_id(),
            })
            .unwrap();
        let id = proposal.id().unwrap();
        for name in ["PartyA", "PartyB"] {
            proposal.add_signature(simulated_signer(name).sign_transition(&id));
        }
        proposal
    };
    let left = quorum_signed();
    let right = quorum_signed();
    assert_ne!(left.id().unwrap(), right.id().unwrap());

    let transport_a = sim.network().endpoint(a.whoami().clone());
    let transport_b = sim.network().endpoint(b.whoami().clone());
    let events = ProgressBus::new(16);
    let coordinator_a = FinalityCoordinator::new(
        a.whoami(),
        sim.notary().as_ref(),
        a.store().as_ref(),
        &transport_a,
        &events,
    );
    let coordinator_b = FinalityCoordinator::new(
        b.whoami(),
        sim.notary().as_ref(),
        b.store().as_ref(),
        &transport_b,
        &events,
    );

    let (first, second) = tokio::join!(
        coordinator_a.finalize(&left),
        coordinator_b.finalize(&right)
    );
    let outcomes = [first, second];

    let committed: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    let conflicts = outcomes
        .iter()
        .filter(|o| matches!(o, Err(FlowError::Conflict { .. })))
        .count();
    assert_eq!(committed.len(), 1);
    assert_eq!(conflicts, 1);

    let winner = committed[0].output_ref();
    for node in [&a, &b] {
        let latest = node.store().latest(&t1.linear_id()).unwrap().unwrap();
        assert_eq!(latest.reference, winner);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completes_leave_one_winner() {
    let (_sim, a, b) = two_parties().await;
    let t1 = a
        .propose_create(TodoItem::new("t", "d"), "PartyB")
        .await
        .unwrap();

    let (ra, rb) = tokio::join!(
        a.propose_complete(t1.linear_id()),
        b.propose_complete(t1.linear_id())
    );

    let wins = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let loser = if ra.is_err() { &ra } else { &rb };
    let err = loser.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict, "{err}");
    assert!(err.is_retryable());

    let a_view = a.store().latest(&t1.linear_id()).unwrap().unwrap();
    let b_view = b.store().latest(&t1.linear_id()).unwrap().unwrap();
    assert_eq!(a_view, b_view);
    assert!(a_view.record.is_complete());
}

#[tokio::test]
async fn records_survive_restart() {
    let dir = std::env::temp_dir().join(format!("accord-restart-{}", uuid::Uuid::new_v4()));
    let config = |name: &str| NodeConfig {
        party: name.to_string(),
        vault: VaultConfig::Journal {
            path: dir.join(format!("{name}.jsonl")),
        },
        ..NodeConfig::default()
    };

    let notary = Arc::new(InMemoryNotary::new(simulated_signer("Notary")));
    let t1 = {
        let mut sim = SimNetwork::with_notary(Arc::clone(&notary));
        let a = sim.add_node(&config("PartyA")).await.unwrap();
        sim.add_node(&config("PartyB")).await.unwrap();
        a.propose_create(TodoItem::new("buy milk", "d"), "PartyB")
            .await
            .unwrap()
    };

    let mut sim = SimNetwork::with_notary(notary);
    let a = sim.add_node(&config("PartyA")).await.unwrap();
    let b = sim.add_node(&config("PartyB")).await.unwrap();

    assert_eq!(b.my_todos().unwrap().count(), 1);
    let t2 = b.propose_complete(t1.linear_id()).await.unwrap();
    let latest = a.store().latest(&t1.linear_id()).unwrap().unwrap();
    assert_eq!(latest.reference, t2.output_ref());

    let _ = std::fs::remove_dir_all(dir);
}

fn signed_by(mut proposal: Proposal, names: &[&str]) -> Proposal {
    let id = proposal.id().unwrap();
    for name in names {
        proposal.add_signature(simulated_signer(name).sign_transition(&id));
    }
    proposal
}

async fn collect_from(
    sim: &SimNetwork,
    initiator: &PartyNode,
    proposal: Proposal,
) -> Result<Proposal, FlowError> {
    let transport = sim.network().endpoint(initiator.whoami().clone());
    let events = ProgressBus::new(16);
    SignatureCollector::new(&transport, &events)
        .collect(proposal)
        .await
}

#[tokio::test]
async fn outsider_cannot_consume_record_with_fabricated_input() {
    let (sim, a, b) = two_parties().await;
    let t1 = a
        .propose_create(TodoItem::new("buy milk", "d"), "PartyB")
        .await
        .unwrap();

    // Real reference to t1's output, but a record naming only Mallory.
    let mallory = simulated_signer("Mallory").identity().clone();
    let mut input = t1.output();
    input.record.owner = mallory.clone();
    input.record.assignee = mallory;
    let output = input.record.derive(input.record.payload.completed());
    let forged = signed_by(
        Proposal::new(Command::Complete, Some(input), output),
        &["Mallory"],
    );

    assert!(matches!(
        sim.notary().submit(&forged).await.unwrap(),
        NotaryDecision::Rejected { .. }
    ));

    let t2 = b.propose_complete(t1.linear_id()).await.unwrap();
    assert_eq!(t2.input_ref(), Some(t1.output_ref()));
}

#[tokio::test]
async fn counterparty_refuses_input_that_differs_from_its_record() {
    let (sim, a, b) = two_parties().await;
    let t1 = a
        .propose_create(TodoItem::new("buy milk", "d"), "PartyB")
        .await
        .unwrap();

    let mut input = t1.output();
    input.record.payload.description = "rewritten".into();
    let output = input.record.derive(input.record.payload.completed());
    let proposal = signed_by(
        Proposal::new(Command::Complete, Some(input), output),
        &["PartyA"],
    );

    match collect_from(&sim, &a, proposal).await.unwrap_err() {
        FlowError::CounterpartyRejected { party, reason } => {
            assert_eq!(&party, b.whoami());
            assert!(reason.contains("does not match"), "{reason}");
        }
        other => panic!("expected counterparty rejection, got {other:?}"),
    }
    let latest = b.store().latest(&t1.linear_id()).unwrap().unwrap();
    assert_eq!(latest.reference, t1.output_ref());
}

#[tokio::test]
async fn create_reusing_linear_id_is_refused_everywhere() {
    let (sim, a, b) = two_parties().await;
    let t1 = a
        .propose_create(TodoItem::new("buy milk", "d"), "PartyB")
        .await
        .unwrap();
    let t2 = b.propose_complete(t1.linear_id()).await.unwrap();

    let mut record = t1.proposal.output.clone();
    record.payload.description = "again".into();
    let reused = Proposal::new(Command::Create, None, record);

    match collect_from(&sim, &a, signed_by(reused.clone(), &["PartyA"]))
        .await
        .unwrap_err()
    {
        FlowError::CounterpartyRejected { reason, .. } => {
            assert!(reason.contains("already exists"), "{reason}")
        }
        other => panic!("expected counterparty rejection, got {other:?}"),
    }
    assert!(matches!(
        sim.notary()
            .submit(&signed_by(reused, &["PartyA", "PartyB"]))
            .await
            .unwrap(),
        NotaryDecision::Rejected { .. }
    ));

    for node in [&a, &b] {
        let latest = node.store().latest(&t1.linear_id()).unwrap().unwrap();
        assert_eq!(latest.reference, t2.output_ref());
        assert!(latest.record.is_complete());
    }
}

#[tokio::test]
async fn stale_input_is_refused_as_conflict() {
    let (sim, a, b) = two_parties().await;
    let t1 = a
        .propose_create(TodoItem::new("buy milk", "d"), "PartyB")
        .await
        .unwrap();
    let t2 = b.propose_complete(t1.linear_id()).await.unwrap();

    let input = t1.output();
    let output = input.record.derive(input.record.payload.completed());
    let stale = signed_by(
        Proposal::new(Command::Complete, Some(input), output),
        &["PartyA"],
    );

    let err = collect_from(&sim, &a, stale).await.unwrap_err();
    match &err {
        FlowError::Conflict {
            consumed,
            consumed_by,
        } => {
            assert_eq!(*consumed, t1.output_ref());
            assert_eq!(*consumed_by, t2.id);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(err.is_retryable());
}

/// Store whose writes always fail.
#[derive(Default)]
struct ReadOnlyStore {
    inner: Vault,
}

#[async_trait]
impl RecordStore for ReadOnlyStore {
    async fn apply(&self, _committed: &CommittedTransition) -> VaultResult<ApplyOutcome> {
        Err(VaultError::Backend("disk unavailable".into()))
    }

    fn current(&self, query: &RecordQuery) -> VaultResult<CurrentRecords> {
        self.inner.current(query)
    }

    fn latest(&self, linear_id: &LinearId) -> VaultResult<Option<RecordAndRef>> {
        self.inner.latest(linear_id)
    }

    fn transition(&self, id: &TransitionId) -> VaultResult<Option<CommittedTransition>> {
        self.inner.transition(id)
    }

    fn consumed_by(&self, reference: &RecordRef) -> VaultResult<Option<TransitionId>> {
        self.inner.consumed_by(reference)
    }
}

#[tokio::test]
async fn local_record_failure_still_distributes_commit() {
    let mut sim = SimNetwork::new("Notary");
    let a = sim
        .add_with_store(
            "PartyA",
            Arc::new(ReadOnlyStore::default()),
            &FlowConfig::default(),
        )
        .unwrap();
    let b = sim.add_party("PartyB").await.unwrap();
    let mut rx = a.subscribe();

    let committed = a
        .propose_create(TodoItem::new("buy milk", "d"), "PartyB")
        .await
        .unwrap();

    assert!(a.todos().unwrap().is_empty());
    let latest = b.store().latest(&committed.linear_id()).unwrap().unwrap();
    assert_eq!(latest.reference, committed.output_ref());
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        ProgressEvent::RecordFailed { transition, .. } if *transition == committed.id
    )));
}
