// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config,
    policy::{Induced, Policy},
    testing, Initiator, Outcome, Registry, Report, Responder,
};
use core::time::Duration;

fn initiator(probe_count: u64) -> Initiator {
    Initiator::new(config::Initiator {
        probe_count,
        pacing_interval: Duration::from_millis(25),
        results_timeout: Duration::from_secs(10),
    })
    .unwrap()
}

fn responder(induced_loss_rate: f64) -> Responder {
    let registry = Registry::new(config::Responder {
        induced_loss_rate,
        ..Default::default()
    })
    .unwrap();
    Responder::new(registry)
}

/// Runs one measurement over an in-memory channel pair
async fn measure<P>(responder: &Responder, initiator: &Initiator, policy: P) -> Report
where
    P: 'static + Policy + Send,
{
    let (client, server) = testing::pair();

    let responder = responder.clone();
    let task = tokio::spawn(async move { responder.serve_with(server, policy).await });

    let report = initiator.run(client).await;
    task.await.unwrap();
    report
}

#[tokio::test(start_paused = true)]
async fn no_induced_loss() {
    testing::init_tracing();

    let responder = responder(0.0);
    let report = measure(&responder, &initiator(100), Induced::seeded(1)).await;

    assert_eq!(report.outcome, Outcome::Complete);
    assert_eq!(report.sent, 100);
    assert_eq!(report.acknowledged, 100);
    assert_eq!(report.packet_loss_percentage, 0.0);

    let server = report.server.unwrap();
    assert_eq!(server.sent_packets, 100);
    assert_eq!(server.received_packets, 100);
    assert_eq!(server.packet_loss_percentage, 0.0);

    // the session is retired once its results are served
    assert!(responder.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn total_induced_loss() {
    let responder = responder(100.0);
    let report = measure(&responder, &initiator(50), Induced::seeded(1)).await;

    assert_eq!(report.outcome, Outcome::Complete);
    assert_eq!(report.sent, 50);
    assert_eq!(report.acknowledged, 0);
    assert_eq!(report.packet_loss_percentage, 100.0);
    assert_eq!(report.average_rtt, None);

    // every probe arrived; only the acks were withheld
    assert_eq!(report.server.unwrap().packet_loss_percentage, 0.0);
}

#[tokio::test(start_paused = true)]
async fn partial_induced_loss() {
    let responder = responder(40.0);
    let initiator = initiator(100);
    let trials = 1000;

    let mut total = 0.0;
    for seed in 0..trials {
        let report = measure(&responder, &initiator, Induced::seeded(seed)).await;
        assert_eq!(report.outcome, Outcome::Complete);
        assert!((0.0..=100.0).contains(&report.packet_loss_percentage));
        total += report.packet_loss_percentage;
    }

    let mean = total / trials as f64;
    // binomial(100, 0.4) has a standard deviation of ~4.9%, so the mean over 1000 runs
    // should be well within this bound
    assert!((mean - 40.0).abs() < 1.5, "mean loss {mean}");
}

#[tokio::test(start_paused = true)]
async fn dropped_acks_count_as_client_loss() {
    testing::init_tracing();

    let responder = responder(0.0);
    let (client, server) = testing::pair();
    let mut server = testing::drop_acks(server, [10, 20, 30]);

    let task = {
        let responder = responder.clone();
        tokio::spawn(async move {
            responder.serve(&mut server).await;
            server.dropped()
        })
    };

    let report = initiator(100).run(client).await;
    assert_eq!(task.await.unwrap(), 3);

    assert_eq!(report.outcome, Outcome::Complete);
    assert_eq!(report.sent, 100);
    assert_eq!(report.acknowledged, 97);
    // the client's figure is the one reported
    assert_eq!(report.packet_loss_percentage, 3.0);
    assert_eq!(report.server.unwrap().packet_loss_percentage, 0.0);
}

#[tokio::test(start_paused = true)]
async fn sessions_are_independent() {
    let responder = responder(0.0);

    let (short, long) = (initiator(20), initiator(30));

    let (a, b) = tokio::join!(
        measure(&responder, &short, Induced::seeded(1)),
        measure(&responder, &long, Induced::seeded(2)),
    );

    assert_eq!(a.server.unwrap().sent_packets, 20);
    assert_eq!(b.server.unwrap().sent_packets, 30);
    assert!(responder.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn measure_submits_report() {
    let responder = responder(0.0);
    let (client, server) = testing::pair();
    let task = {
        let responder = responder.clone();
        tokio::spawn(async move { responder.serve(server).await })
    };

    let mut submitted: Vec<Report> = vec![];
    let report = initiator(5).measure(client, &mut submitted).await;
    task.await.unwrap();

    assert_eq!(submitted, vec![report]);
}
