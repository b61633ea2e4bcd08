//! Example task bodies. `swarm-core` treats `Task` bodies as an external
//! collaborator (spec §1) — real users register their own — but a runnable
//! binary needs something to hatch workers against, so this ships the
//! handful of tasks the quickstart scenarios in spec §8 exercise.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use swarm_core::{Boomer, SwarmError, Task, TaskSet};

/// Builds the demo task set: a fast "hello" task that always succeeds, and
/// a "flaky" task that fails roughly one request in five. Both report
/// through the given [`Boomer`] instance, the same way a real task would.
pub fn build(boomer: Arc<Boomer>) -> TaskSet {
    let mut tasks = TaskSet::new();

    let hello_boomer = boomer.clone();
    tasks
        .add(Task::new("hello", 1, move || {
            let boomer = hello_boomer.clone();
            async move {
                let latency_ms = rand::thread_rng().gen_range(5..40);
                tokio::time::sleep(Duration::from_millis(latency_ms)).await;
                boomer.record_success("", "hello", latency_ms, 128).await;
                Ok::<(), SwarmError>(())
            }
        }))
        .expect("hello task has a positive weight");

    let flaky_boomer = boomer;
    tasks
        .add(Task::new("flaky", 1, move || {
            let boomer = flaky_boomer.clone();
            async move {
                let latency_ms = rand::thread_rng().gen_range(5..80);
                tokio::time::sleep(Duration::from_millis(latency_ms)).await;
                if rand::thread_rng().gen_ratio(1, 5) {
                    boomer
                        .record_failure("", "flaky", latency_ms, "simulated timeout")
                        .await;
                } else {
                    boomer.record_success("", "flaky", latency_ms, 64).await;
                }
                Ok::<(), SwarmError>(())
            }
        }))
        .expect("flaky task has a positive weight");

    tasks
}
