//! DAG evaluator actor
//!
//! Subscribes to the cell parser and drives cells through the supplied
//! evaluation function one at a time, threading the environment forward
//! from cell to cell. Edits cancel only what they invalidate: the
//! environment chain is truncated to the preserved prefix and evaluation
//! resumes from the first cell without a result.
//!
//! Cells depend linearly on everything above them. The prefix-based
//! invalidation here is only correct under that model; do not generalize
//! it to an arbitrary dependency graph without reworking both the parser
//! diff and the environment chain.

use ambox::{Inbox, Mailbox, StateServer, Subscribe};
use cellflow_types::{NodeEvalStatus, NodeId, NodeList, NodeListUpdate, NodeState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag handed to evaluation functions.
///
/// Cancellation is asynchronous and best-effort: the evaluator flips the
/// flag and immediately frees the job slot. The evaluation function is
/// responsible for polling the token at safe points; a function that never
/// polls still cannot corrupt state, because its eventual completion is
/// discarded as a zombie.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Evaluation function supplied by the language back-end.
///
/// Takes the environment produced by the previous cell and the cell input;
/// returns the cell's output and the environment for the next cell. May be
/// long-running; user code failures must be encoded in the output type.
pub type EvalFn<I, O, S> = Arc<dyn Fn(S, &I, &CancelToken) -> (O, S) + Send + Sync>;

/// Identity of one launched evaluation job.
///
/// Allocated monotonically; completion messages carry it back so reports
/// from cancelled jobs are recognizable no matter when they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JobId(u64);

/// Completion report sent by a worker thread to the evaluator.
pub struct JobComplete<O, S> {
    job: JobId,
    output: O,
    env: S,
}

/// Messages handled by the evaluator actor.
pub enum EvalMsg<I, O, S> {
    /// A cell-list diff from the parser.
    Source(NodeListUpdate<I>),
    /// A worker thread finished.
    JobDone(JobComplete<O, S>),
    /// Downstream subscription to the per-cell status stream.
    Subscribe(Subscribe<NodeList<NodeState<I, O>>, NodeListUpdate<NodeState<I, O>>>),
}

struct RunningJob {
    job: JobId,
    cancel: CancelToken,
    node: NodeId,
    index: usize,
}

/// Actor state.
///
/// `prev_envs[0]` is the initial environment and `prev_envs[k]` the
/// environment produced by the k-th cell; its length is always one more
/// than the number of completed cells at the head of the list. At most one
/// job runs at a time, and only ever for the first unevaluated cell.
pub struct DagEvaluator<I, O, S> {
    eval: EvalFn<I, O, S>,
    outward: StateServer<NodeList<NodeState<I, O>>, NodeListUpdate<NodeState<I, O>>>,
    prev_envs: Vec<S>,
    cur_running_job: Option<RunningJob>,
    next_job: u64,
    self_mailbox: Mailbox<EvalMsg<I, O, S>>,
}

impl<I, O, S> DagEvaluator<I, O, S>
where
    I: Clone + PartialEq + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    pub fn new(
        eval: EvalFn<I, O, S>,
        initial_env: S,
        self_mailbox: Mailbox<EvalMsg<I, O, S>>,
    ) -> Self {
        Self {
            eval,
            outward: StateServer::new(NodeList::new()),
            prev_envs: vec![initial_env],
            cur_running_job: None,
            next_job: 1,
            self_mailbox,
        }
    }

    /// React to an upstream cell-list diff: truncate the environment chain
    /// to the surviving prefix, surface the new cells as `Waiting`, cancel
    /// the running job if it was invalidated, and keep evaluation moving.
    fn on_source(&mut self, update: NodeListUpdate<I>) {
        let num_dropped = update.ordered.num_dropped;
        let num_valid = self.outward.state().len().saturating_sub(num_dropped);
        self.prev_envs.truncate(num_valid + 1);

        self.outward.update(update.map_values(NodeState::waiting));

        match self.cur_running_job.take() {
            None => self.launch_next_job(),
            Some(running) if running.index >= num_valid => {
                tracing::debug!(
                    node = %running.node,
                    index = running.index,
                    "cancelling invalidated job"
                );
                running.cancel.cancel();
                self.launch_next_job();
            }
            still_valid => self.cur_running_job = still_valid,
        }

        self.outward.flush_diffs();
        self.check_invariants();
    }

    /// Launch a job for the first cell without a result, if there is one.
    fn launch_next_job(&mut self) {
        debug_assert!(self.cur_running_job.is_none());
        let job_index = self.prev_envs.len() - 1;
        let cells = self.outward.state();
        if job_index >= cells.len() {
            return;
        }

        let node = cells.ids()[job_index];
        let input = cells
            .get(&node)
            .expect("ordered node missing from node map")
            .input
            .clone();
        let env = self.prev_envs[job_index].clone();

        let job = JobId(self.next_job);
        self.next_job += 1;
        let cancel = CancelToken::new();

        self.outward.update(NodeListUpdate::elt_update(
            node,
            NodeState {
                input: input.clone(),
                status: NodeEvalStatus::Running,
            },
        ));

        let eval = self.eval.clone();
        let report = self.self_mailbox.clone();
        let token = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let (output, env) = (eval)(env, &input, &token);
            report.send(EvalMsg::JobDone(JobComplete { job, output, env }));
        });

        tracing::debug!(node = %node, index = job_index, "launched evaluation job");
        self.cur_running_job = Some(RunningJob {
            job,
            cancel,
            node,
            index: job_index,
        });
    }

    /// React to a worker report. Reports whose job id does not match the
    /// current job are zombies, completions of jobs cancelled after their
    /// thread was already past the point of no return; they are dropped.
    fn on_job_done(&mut self, done: JobComplete<O, S>) {
        match &self.cur_running_job {
            Some(running) if running.job == done.job => {}
            _ => {
                tracing::debug!("discarding zombie job completion");
                return;
            }
        }
        let running = self.cur_running_job.take().expect("matched above");

        let input = self
            .outward
            .state()
            .get(&running.node)
            .expect("completed node missing from node map")
            .input
            .clone();
        self.outward.update(NodeListUpdate::elt_update(
            running.node,
            NodeState {
                input,
                status: NodeEvalStatus::Complete(done.output),
            },
        ));
        self.prev_envs.push(done.env);

        self.launch_next_job();
        self.outward.flush_diffs();
        self.check_invariants();
    }

    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        let cells = self.outward.state();
        let completed_prefix = cells
            .ids()
            .iter()
            .take_while(|id| {
                cells
                    .get(id)
                    .expect("ordered node missing from node map")
                    .status
                    .is_complete()
            })
            .count();
        debug_assert_eq!(self.prev_envs.len(), completed_prefix + 1);
        debug_assert!(self.prev_envs.len() <= cells.len() + 1);

        let running: Vec<usize> = cells
            .ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| {
                cells
                    .get(id)
                    .expect("ordered node missing from node map")
                    .status
                    .is_running()
            })
            .map(|(index, _)| index)
            .collect();
        debug_assert!(running.len() <= 1);
        if let Some(&index) = running.first() {
            debug_assert_eq!(index, completed_prefix);
            let current = self
                .cur_running_job
                .as_ref()
                .expect("running cell without a tracked job");
            debug_assert_eq!(current.index, index);
        }
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self) {}

    /// Serial message loop.
    pub async fn run(mut self, mut inbox: Inbox<EvalMsg<I, O, S>>) {
        while let Some(msg) = inbox.recv().await {
            match msg {
                EvalMsg::Source(update) => self.on_source(update),
                EvalMsg::JobDone(done) => self.on_job_done(done),
                EvalMsg::Subscribe(request) => self.outward.subscribe(request),
            }
        }
    }
}

/// Spawn the evaluator actor.
pub fn spawn<I, O, S>(eval: EvalFn<I, O, S>, initial_env: S) -> Mailbox<EvalMsg<I, O, S>>
where
    I: Clone + PartialEq + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    ambox::launch("dag-evaluator", move |inbox: Inbox<EvalMsg<I, O, S>>| {
        let evaluator = DagEvaluator::new(eval, initial_env, inbox.mailbox());
        evaluator.run(inbox)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambox::Update;
    use cellflow_types::{compute_node_list_update, FreshNames};
    use std::time::Duration;
    use tokio::sync::mpsc;

    type TestEvaluator = DagEvaluator<String, String, String>;

    /// Evaluation used across the suite: `(env, cell) -> (cell + "!", env + cell)`.
    fn bang_eval() -> EvalFn<String, String, String> {
        Arc::new(|env: String, cell: &String, _token: &CancelToken| {
            (format!("{cell}!"), format!("{env}{cell}"))
        })
    }

    struct Harness {
        evaluator: TestEvaluator,
        inbox: Inbox<EvalMsg<String, String, String>>,
        names: FreshNames,
        cells: NodeList<String>,
        diff_rx: mpsc::UnboundedReceiver<NodeListUpdate<NodeState<String, String>>>,
    }

    impl Harness {
        fn new(eval: EvalFn<String, String, String>) -> Self {
            let (mailbox, inbox) = Inbox::new();
            let mut evaluator = DagEvaluator::new(eval, String::new(), mailbox);

            let (snap_tx, _snap_rx) = mpsc::unbounded_channel();
            let (diff_tx, diff_rx) = mpsc::unbounded_channel();
            evaluator.outward.subscribe(Subscribe {
                reply: Mailbox::from_sender(snap_tx),
                subscriber: Mailbox::from_sender(diff_tx),
            });

            Self {
                evaluator,
                inbox,
                names: FreshNames::new(),
                cells: NodeList::new(),
                diff_rx,
            }
        }

        /// Parse `text` as lines and feed the resulting diff to the
        /// evaluator, mirroring what the parser actor would send.
        fn edit(&mut self, text: &str) {
            let values = text.lines().map(String::from).collect();
            let update = compute_node_list_update(&self.cells, values, &mut self.names);
            update.apply_to(&mut self.cells);
            self.evaluator.on_source(update);
        }

        /// Pump worker completions through the evaluator until it goes
        /// quiet. Each launched job reports through the actor mailbox we
        /// hold the inbox for.
        async fn settle(&mut self) {
            loop {
                let waiting = tokio::time::timeout(Duration::from_secs(5), self.inbox.recv());
                match waiting.await {
                    Ok(Some(EvalMsg::JobDone(done))) => self.evaluator.on_job_done(done),
                    Ok(Some(_)) => panic!("unexpected message in evaluator inbox"),
                    Ok(None) => panic!("evaluator inbox closed"),
                    Err(_) => panic!("evaluation did not settle"),
                }
                if self.evaluator.cur_running_job.is_none() {
                    return;
                }
            }
        }

        fn statuses(&self) -> Vec<NodeEvalStatus<String>> {
            self.evaluator
                .outward
                .state()
                .values()
                .map(|state| state.status.clone())
                .collect()
        }

        fn results(&self) -> Vec<String> {
            self.statuses()
                .iter()
                .map(|status| status.output().expect("cell not complete").clone())
                .collect()
        }
    }

    #[tokio::test]
    async fn test_fresh_file_completes_all_cells() {
        let mut harness = Harness::new(bang_eval());
        harness.edit("a\nb\nc");
        harness.settle().await;

        let ids = harness.evaluator.outward.state().ids().to_vec();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(harness.results(), vec!["a!", "b!", "c!"]);
        assert_eq!(harness.evaluator.prev_envs, vec!["", "a", "ab", "abc"]);
    }

    #[tokio::test]
    async fn test_append_only_edit_keeps_results() {
        let mut harness = Harness::new(bang_eval());
        harness.edit("a\nb\nc");
        harness.settle().await;

        harness.edit("a\nb\nc\nd");
        // Existing results survive the edit untouched.
        assert_eq!(
            harness.statuses()[..3]
                .iter()
                .filter(|status| status.is_complete())
                .count(),
            3
        );
        harness.settle().await;

        let ids = harness.evaluator.outward.state().ids().to_vec();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3), NodeId(4)]);
        assert_eq!(harness.results(), vec!["a!", "b!", "c!", "d!"]);
        assert_eq!(
            harness.evaluator.prev_envs,
            vec!["", "a", "ab", "abc", "abcd"]
        );
    }

    #[tokio::test]
    async fn test_middle_edit_truncates_env_chain() {
        let mut harness = Harness::new(bang_eval());
        harness.edit("a\nb\nc");
        harness.settle().await;

        harness.edit("a\nB\nc");
        // Only the environment up to the preserved prefix survives.
        assert_eq!(harness.evaluator.prev_envs[..2], ["", "a"]);
        harness.settle().await;

        let ids = harness.evaluator.outward.state().ids().to_vec();
        assert_eq!(ids, vec![NodeId(1), NodeId(4), NodeId(5)]);
        assert_eq!(harness.results(), vec!["a!", "B!", "c!"]);
        assert_eq!(harness.evaluator.prev_envs, vec!["", "a", "aB", "aBc"]);
    }

    #[tokio::test]
    async fn test_edit_during_evaluation_cancels_running_job() {
        // Cell "b" parks until its token is cancelled.
        let eval: EvalFn<String, String, String> =
            Arc::new(|env: String, cell: &String, token: &CancelToken| {
                if cell == "b" {
                    while !token.is_cancelled() {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                }
                (format!("{cell}!"), format!("{env}{cell}"))
            });

        let mut harness = Harness::new(eval);
        harness.edit("a\nb\nc");

        // Let "a" complete so "b" is the running job.
        loop {
            match harness.inbox.recv().await.unwrap() {
                EvalMsg::JobDone(done) => harness.evaluator.on_job_done(done),
                _ => panic!("unexpected message"),
            }
            let running = harness
                .evaluator
                .cur_running_job
                .as_ref()
                .expect("a job should be running");
            if running.node == NodeId(2) {
                break;
            }
        }

        harness.edit("a\nZ\nc");
        harness.settle().await;

        assert_eq!(harness.results(), vec!["a!", "Z!", "c!"]);
        assert_eq!(harness.evaluator.prev_envs, vec!["", "a", "aZ", "aZc"]);
    }

    #[tokio::test]
    async fn test_zombie_completion_is_discarded() {
        let mut harness = Harness::new(bang_eval());
        harness.edit("a");

        // Capture the genuine completion, then replay it after the job has
        // already been accounted for: the replay must change nothing.
        let done = match harness.inbox.recv().await.unwrap() {
            EvalMsg::JobDone(done) => done,
            _ => panic!("unexpected message"),
        };
        let replay = JobComplete {
            job: done.job,
            output: done.output.clone(),
            env: done.env.clone(),
        };
        harness.evaluator.on_job_done(done);
        assert_eq!(harness.results(), vec!["a!"]);

        harness.evaluator.on_job_done(replay);
        assert_eq!(harness.results(), vec!["a!"]);
        assert_eq!(harness.evaluator.prev_envs, vec!["", "a"]);
    }

    #[tokio::test]
    async fn test_empty_file_spawns_no_worker() {
        let mut harness = Harness::new(bang_eval());
        harness.edit("");

        assert!(harness.evaluator.outward.state().is_empty());
        assert!(harness.evaluator.cur_running_job.is_none());
        assert_eq!(harness.evaluator.prev_envs, vec![""]);

        // No worker means no completion report.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.inbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_diff_stream_reconstructs_state() {
        let mut harness = Harness::new(bang_eval());
        let mut replica: NodeList<NodeState<String, String>> = NodeList::new();

        harness.edit("a\nb\nc");
        harness.settle().await;
        harness.edit("a\nB\nc");
        harness.settle().await;

        while let Ok(diff) = harness.diff_rx.try_recv() {
            diff.apply_to(&mut replica);
        }
        assert_eq!(&replica, harness.evaluator.outward.state());
    }
}
