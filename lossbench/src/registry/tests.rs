// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::testing::init_tracing;

#[test]
fn ids_are_unique() {
    let registry = Registry::default();
    let mut ids = HashSet::new();

    for _ in 0..1000 {
        let session = registry.create();
        assert!(ids.insert(session.id));
        // retiring doesn't free the id up for reuse
        registry.retire(session.id);
    }

    assert!(registry.is_empty());
}

#[test]
fn absent_sessions_are_not_errors() {
    let registry = Registry::default();
    let id = SessionId::from(42);

    assert_eq!(registry.get(id), None);
    registry.touch(id);
    assert_eq!(registry.record_probe(id, 0), None);
    assert_eq!(registry.set_sent(id, 10), None);
    assert_eq!(registry.retire(id), None);
    assert_eq!(registry.remove(id), None);
    assert!(registry.is_empty());
}

#[test]
fn duplicate_probes_count_once() {
    let registry = Registry::default();
    let id = registry.create().id;

    assert!(registry.record_probe(id, 0).unwrap().is_new);
    assert!(registry.record_probe(id, 1).unwrap().is_new);
    assert!(!registry.record_probe(id, 0).unwrap().is_new);

    assert_eq!(registry.get(id).unwrap().received_count, 2);
}

#[test]
fn tally_test() {
    let registry = Registry::default();
    let session = registry.create();
    let id = session.id;

    for sequence_id in 0..7 {
        registry.record_probe(id, sequence_id);
    }
    registry.set_sent(id, 10);

    let session = registry.retire(id).unwrap();
    let tally = session.tally(session.started_at + Duration::from_millis(250));
    assert_eq!(
        tally,
        Tally {
            sent_packets: 10,
            received_packets: 7,
            lost_packets: 3,
            packet_loss_percentage: 30.0,
            duration: 250,
        }
    );

    // a second retirement finds nothing
    assert_eq!(registry.retire(id), None);
}

#[test]
fn tally_without_sent_count() {
    init_tracing();

    let registry = Registry::default();
    let id = registry.create().id;
    registry.record_probe(id, 0);

    let session = registry.get(id).unwrap();
    let tally = session.tally(session.started_at);
    assert_eq!(tally.lost_packets, 0);
    assert_eq!(tally.packet_loss_percentage, 0.0);
}

#[tokio::test(start_paused = true)]
async fn sweep_removes_idle_sessions() {
    let registry = Registry::default();
    let idle = registry.create().id;
    let active = registry.create().id;

    tokio::time::advance(Duration::from_secs(20)).await;
    registry.touch(active);

    // exactly at the threshold is not yet idle
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(registry.sweep(Duration::from_secs(30)), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(registry.sweep(Duration::from_secs(30)), 1);
    assert_eq!(registry.get(idle), None);
    assert!(registry.get(active).is_some());
}

#[tokio::test(start_paused = true)]
async fn sweeper_reclaims_in_background() {
    init_tracing();

    let registry = Registry::new(config::Responder {
        idle_timeout: Duration::from_secs(30),
        sweep_interval: Duration::from_secs(10),
        ..Default::default()
    })
    .unwrap();
    let sweeper = registry.spawn_sweeper();

    let id = registry.create().id;

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(registry.get(id).is_some());

    // the sweep at 40s is the first to see more than 30s of inactivity
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(registry.get(id), None);
    assert!(!sweeper.is_finished());
}

#[test]
fn invalid_config_is_rejected() {
    let config = config::Responder {
        sweep_interval: Duration::ZERO,
        ..Default::default()
    };
    assert_eq!(
        Registry::new(config).unwrap_err(),
        config::Error::ZeroDuration("sweep interval")
    );

    let config = config::Responder {
        induced_loss_rate: 101.0,
        ..Default::default()
    };
    assert_eq!(
        Registry::new(config).unwrap_err(),
        config::Error::LossRate(101.0)
    );
}

#[tokio::test(start_paused = true)]
async fn sweeper_exits_with_registry() {
    let registry = Registry::default();
    let sweeper = registry.spawn_sweeper();
    drop(registry);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(sweeper.is_finished());
}

#[derive(Debug, Default)]
struct Model {
    sessions: HashMap<SessionId, ModelSession>,
    retired: HashSet<SessionId>,
}

#[derive(Debug, Default)]
struct ModelSession {
    seen: HashSet<u64>,
    sent: u64,
}

#[derive(bolero::TypeGenerator, Debug, Copy, Clone)]
enum Operation {
    Create,
    Touch { idx: u8 },
    Probe { idx: u8, sequence_id: u8 },
    SetSent { idx: u8, count: u8 },
    Retire { idx: u8 },
    Remove { idx: u8 },
    SweepNone,
    SweepAll,
}

impl Model {
    /// Picks any id handed out so far, live or not
    fn pick(&self, idx: u8, ids: &[SessionId]) -> Option<SessionId> {
        if ids.is_empty() {
            return None;
        }
        Some(ids[idx as usize % ids.len()])
    }

    fn perform(&mut self, operation: Operation, registry: &Registry, ids: &mut Vec<SessionId>) {
        match operation {
            Operation::Create => {
                let id = registry.create().id;
                assert!(!self.retired.contains(&id), "{id} was reused");
                assert!(self.sessions.insert(id, Default::default()).is_none());
                ids.push(id);
            }
            Operation::Touch { idx } => {
                if let Some(id) = self.pick(idx, ids) {
                    registry.touch(id);
                }
            }
            Operation::Probe { idx, sequence_id } => {
                let Some(id) = self.pick(idx, ids) else {
                    return;
                };
                let sequence_id = sequence_id as u64;
                let received = registry.record_probe(id, sequence_id);
                match self.sessions.get_mut(&id) {
                    Some(session) => {
                        let received = received.expect("live session");
                        assert_eq!(received.is_new, session.seen.insert(sequence_id));
                    }
                    None => assert_eq!(received, None),
                }
            }
            Operation::SetSent { idx, count } => {
                let Some(id) = self.pick(idx, ids) else {
                    return;
                };
                let res = registry.set_sent(id, count as u64);
                match self.sessions.get_mut(&id) {
                    Some(session) => {
                        assert!(res.is_some());
                        session.sent = count as u64;
                    }
                    None => assert!(res.is_none()),
                }
            }
            Operation::Retire { idx } | Operation::Remove { idx } => {
                let Some(id) = self.pick(idx, ids) else {
                    return;
                };
                let session = if matches!(operation, Operation::Retire { .. }) {
                    registry.retire(id)
                } else {
                    registry.remove(id)
                };
                assert_eq!(session.is_some(), self.sessions.remove(&id).is_some());
                self.retired.insert(id);
            }
            Operation::SweepNone => {
                assert_eq!(registry.sweep(Duration::from_secs(3600)), 0);
            }
            Operation::SweepAll => {
                let now = Instant::now() + Duration::from_secs(1);
                assert_eq!(registry.sweep_at(now, Duration::ZERO), self.sessions.len());
                self.retired.extend(self.sessions.drain().map(|(id, _)| id));
            }
        }
    }

    fn check_invariants(&self, registry: &Registry) {
        assert_eq!(registry.len(), self.sessions.len());

        for (id, expected) in self.sessions.iter() {
            let session = registry.get(*id).expect("live session");
            assert_eq!(session.received_count, expected.seen.len() as u64);
            assert_eq!(session.sent_count, expected.sent);
        }

        for id in self.retired.iter() {
            assert_eq!(registry.get(*id), None);
        }
    }
}

#[test]
fn check_invariants() {
    bolero::check!()
        .with_type::<Vec<Operation>>()
        .with_iterations(10_000)
        .for_each(|input: &Vec<Operation>| {
            let mut model = Model::default();
            let registry = Registry::default();
            let mut ids = vec![];

            model.check_invariants(&registry);

            for op in input {
                model.perform(*op, &registry, &mut ids);
                model.check_invariants(&registry);
            }
        })
}
