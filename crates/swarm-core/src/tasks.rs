//! User-defined work items and weighted selection between them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand::Rng;

use crate::SwarmError;

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), SwarmError>> + Send>>;
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// A single unit of work a virtual user may execute, plus the relative
/// frequency it should be picked at.
#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub weight: u32,
    func: TaskFn,
}

impl Task {
    /// `weight` of zero is rejected by [`TaskSet::add`], not here, so that a
    /// `Task` can always be constructed in isolation for tests.
    pub fn new<F, Fut>(name: impl Into<String>, weight: u32, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SwarmError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            weight,
            func: Arc::new(move || Box::pin(func())),
        }
    }

    pub async fn run(&self) -> Result<(), SwarmError> {
        (self.func)().await
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

/// A weighted collection of [`Task`]s a worker pool draws from.
#[derive(Clone, Default)]
pub struct TaskSet {
    tasks: Vec<Task>,
    total_weight: u64,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `task` to the set. A weight of zero makes a task unreachable, so
    /// it is rejected rather than silently ignored.
    pub fn add(&mut self, task: Task) -> Result<(), SwarmError> {
        if task.weight == 0 {
            return Err(SwarmError::Validation(format!(
                "task '{}' has zero weight",
                task.name
            )));
        }
        self.total_weight += u64::from(task.weight);
        self.tasks.push(task);
        Ok(())
    }

    /// Looks up a task by name, used by the facade's one-shot `run-tasks`
    /// mode.
    pub fn find(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Picks one task at random, weighted by `weight`. Returns `None` if the
    /// set is empty.
    pub fn pick(&self) -> Option<&Task> {
        if self.tasks.is_empty() {
            return None;
        }
        let mut roll = rand::thread_rng().gen_range(0..self.total_weight);
        for task in &self.tasks {
            let weight = u64::from(task.weight);
            if roll < weight {
                return Some(task);
            }
            roll -= weight;
        }
        // Floating error margin only; weights are integral so this is unreachable
        // in practice, but falling back to the last task keeps pick() total.
        self.tasks.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_task(name: &str, weight: u32) -> Task {
        Task::new(name.to_string(), weight, || async { Ok(()) })
    }

    #[test]
    fn zero_weight_task_is_rejected() {
        let mut set = TaskSet::new();
        let err = set.add(noop_task("broken", 0)).unwrap_err();
        assert!(matches!(err, SwarmError::Validation(_)));
    }

    #[test]
    fn empty_set_picks_none() {
        let set = TaskSet::new();
        assert!(set.pick().is_none());
    }

    #[test]
    fn single_task_always_picked() {
        let mut set = TaskSet::new();
        set.add(noop_task("only", 5)).unwrap();
        for _ in 0..20 {
            assert_eq!(set.pick().unwrap().name, "only");
        }
    }

    #[test]
    fn weighted_pick_converges_to_configured_ratio() {
        let mut set = TaskSet::new();
        set.add(noop_task("light", 1)).unwrap();
        set.add(noop_task("heavy", 3)).unwrap();

        let mut light = 0u32;
        let mut heavy = 0u32;
        for _ in 0..100_000 {
            match set.pick().unwrap().name.as_str() {
                "light" => light += 1,
                "heavy" => heavy += 1,
                other => panic!("unexpected task {other}"),
            }
        }

        let ratio = f64::from(heavy) / f64::from(light);
        assert!(
            (2.85..=3.15).contains(&ratio),
            "expected heavy:light ratio near 3.0, got {ratio}"
        );
    }

    #[test]
    fn find_looks_up_by_name() {
        let mut set = TaskSet::new();
        set.add(noop_task("alpha", 1)).unwrap();
        set.add(noop_task("beta", 2)).unwrap();
        assert_eq!(set.find("beta").unwrap().name, "beta");
        assert!(set.find("missing").is_none());
    }

    #[tokio::test]
    async fn run_invokes_underlying_future() {
        let task = noop_task("runs", 1);
        task.run().await.unwrap();
    }

    #[tokio::test]
    async fn run_propagates_error() {
        let task = Task::new("fails", 1, || async {
            Err(SwarmError::Engine("boom".into()))
        });
        let err = task.run().await.unwrap_err();
        assert!(matches!(err, SwarmError::Engine(_)));
    }
}
