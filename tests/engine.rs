use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use migravisor::{
    Config, Direction, Driver, DriverRef, Engine, EngineBuilder, EngineError, Event, EventKind,
    HookError, HookFn, Host, HostRef, Param, Phase, StatementError, Subscribe,
};
use tokio::time;
use tracing_subscriber::fmt::MakeWriter;

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(j: &Journal) -> Vec<String> {
    j.lock().unwrap().clone()
}

/// Records every statement and tracks how many executions overlap.
struct RecordingDriver {
    journal: Journal,
    fail_on: Vec<&'static str>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingDriver {
    fn new(journal: &Journal) -> Self {
        Self {
            journal: Arc::clone(journal),
            fail_on: Vec::new(),
            delay: Duration::from_millis(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn failing_on(mut self, statement: &'static str) -> Self {
        self.fail_on.push(statement);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    async fn execute(&self, statement: &str, _params: &[Param]) -> Result<(), StatementError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.journal.lock().unwrap().push(statement.to_string());

        time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.contains(&statement) {
            Err(StatementError::new(format!("{statement} rejected")))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct FakeHost {
    shutdowns: AtomicUsize,
}

#[async_trait]
impl Host for FakeHost {
    fn name(&self) -> &str {
        "app"
    }

    async fn shutdown(&self) -> Result<(), HookError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counting_hook(hits: &Arc<AtomicUsize>) -> migravisor::HookRef {
    let hits = Arc::clone(hits);
    HookFn::arc(move |_db: DriverRef| {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<(), HookError>(())
        }
    })
}

fn builder() -> EngineBuilder {
    Engine::builder(Config::default()).on_idle_exit(|| {})
}

#[tokio::test(start_paused = true)]
async fn apply_steps_run_in_registration_order() {
    let j = journal();
    let driver = Arc::new(RecordingDriver::new(&j).with_delay(Duration::from_millis(10)));
    let (engine, ready) = builder()
        .apply("INSERT A", vec![])
        .apply("INSERT B", vec![Param::from(2)])
        .apply("INSERT C", vec![])
        .revert("DELETE ALL", vec![])
        .build();
    ready.ready(None);

    engine.up(driver.clone()).await.unwrap();

    assert_eq!(entries(&j), ["INSERT A", "INSERT B", "INSERT C"]);
    assert_eq!(driver.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(engine.phase(Direction::Apply), Phase::Done);
    assert_eq!(engine.phase(Direction::Revert), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn continuation_runs_before_the_next_step() {
    let j = journal();
    let jc = Arc::clone(&j);
    let cont = HookFn::arc(move |db: DriverRef| {
        let jc = Arc::clone(&jc);
        async move {
            time::sleep(Duration::from_millis(50)).await;
            jc.lock().unwrap().push("continuation".into());
            db.execute("INSERT FROM CONTINUATION", &[])
                .await
                .map_err(|e| HookError::new(e.message))
        }
    });

    let (engine, ready) = builder()
        .apply_then("INSERT A", vec![], cont)
        .apply("INSERT B", vec![])
        .build();
    ready.ready(None);

    engine.up(Arc::new(RecordingDriver::new(&j))).await.unwrap();

    assert_eq!(
        entries(&j),
        ["INSERT A", "continuation", "INSERT FROM CONTINUATION", "INSERT B"]
    );
}

#[tokio::test(start_paused = true)]
async fn continuation_that_never_resumes_holds_the_queue() {
    let j = journal();
    let completed = Arc::new(AtomicUsize::new(0));
    let stuck = HookFn::arc(|_db: DriverRef| futures::future::pending::<Result<(), HookError>>());

    let (engine, ready) = builder()
        .apply_then("INSERT A", vec![], stuck)
        .apply("INSERT B", vec![])
        .on_apply_complete(counting_hook(&completed))
        .build();
    ready.ready(None);

    let res = time::timeout(
        Duration::from_secs(60),
        engine.up(Arc::new(RecordingDriver::new(&j))),
    )
    .await;

    assert!(res.is_err(), "run must not finish");
    assert_eq!(entries(&j), ["INSERT A"]);
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert_eq!(engine.phase(Direction::Apply), Phase::AwaitingContinuation);
}

#[tokio::test(start_paused = true)]
async fn failing_step_aborts_without_completion_hook() {
    let j = journal();
    let completed = Arc::new(AtomicUsize::new(0));
    let host = Arc::new(FakeHost::default());
    let (engine, ready) = builder()
        .apply("INSERT A", vec![])
        .apply("INSERT BAD", vec![])
        .apply("INSERT C", vec![])
        .on_apply_complete(counting_hook(&completed))
        .build();
    ready.ready(Some(host.clone() as HostRef));

    let driver = Arc::new(RecordingDriver::new(&j).failing_on("INSERT BAD"));
    let err = engine.up(driver).await.unwrap_err();

    match &err {
        EngineError::Statement {
            direction,
            index,
            statement,
            source,
        } => {
            assert_eq!(*direction, Direction::Apply);
            assert_eq!(*index, 1);
            assert_eq!(statement, "INSERT BAD");
            assert_eq!(source.message, "INSERT BAD rejected");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(entries(&j), ["INSERT A", "INSERT BAD"]);
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert_eq!(engine.phase(Direction::Apply), Phase::Aborted);
    assert!(!engine.idle_timer_armed());
}

#[tokio::test(start_paused = true)]
async fn ignored_error_lets_the_run_complete() {
    let j = journal();
    let completed = Arc::new(AtomicUsize::new(0));
    let (engine, ready) = builder()
        .ignore_errors(true)
        .apply("INSERT A", vec![])
        .apply("INSERT BAD", vec![])
        .apply("INSERT C", vec![])
        .on_apply_complete(counting_hook(&completed))
        .build();
    let mut events = engine.subscribe();
    ready.ready(None);

    let driver = Arc::new(RecordingDriver::new(&j).failing_on("INSERT BAD"));
    engine.up(driver).await.unwrap();

    assert_eq!(entries(&j), ["INSERT A", "INSERT BAD", "INSERT C"]);
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    let ignored: Vec<u32> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| e.kind == EventKind::StepErrorIgnored)
        .filter_map(|e| e.step)
        .collect();
    assert_eq!(ignored, [1]);
}

#[tokio::test(start_paused = true)]
async fn completion_hook_uses_the_run_handle_and_its_error_is_fatal() {
    let j = journal();
    let failing = HookFn::arc(|db: DriverRef| async move {
        db.execute("UPDATE schema_version", &[])
            .await
            .map_err(|e| HookError::new(e.message))?;
        Err(HookError::new("version table locked"))
    });
    let (engine, ready) = builder()
        .revert("DROP TABLE t", vec![])
        .on_revert_complete(failing)
        .build();
    ready.ready(None);

    let err = engine
        .down(Arc::new(RecordingDriver::new(&j)))
        .await
        .unwrap_err();

    assert_eq!(err.as_label(), "completion_hook_failed");
    assert_eq!(entries(&j), ["DROP TABLE t", "UPDATE schema_version"]);
    assert_eq!(engine.phase(Direction::Revert), Phase::Aborted);
}

#[tokio::test(start_paused = true)]
async fn empty_queue_goes_straight_to_completion() {
    let j = journal();
    let completed = Arc::new(AtomicUsize::new(0));
    let (engine, ready) = builder()
        .apply("INSERT A", vec![])
        .on_revert_complete(counting_hook(&completed))
        .build();
    ready.ready(None);

    engine.down(Arc::new(RecordingDriver::new(&j))).await.unwrap();

    assert!(entries(&j).is_empty());
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(engine.phase(Direction::Revert), Phase::Done);
}

#[tokio::test(start_paused = true)]
async fn call_before_ready_waits_for_the_signal() {
    let j = journal();
    let (engine, ready) = builder()
        .revert("DROP TABLE b", vec![])
        .revert("DROP TABLE a", vec![])
        .build();

    let mut down = Box::pin(engine.down(Arc::new(RecordingDriver::new(&j))));
    assert!(futures::poll!(down.as_mut()).is_pending());

    time::sleep(Duration::from_secs(5)).await;
    assert!(!engine.is_ready());
    assert!(entries(&j).is_empty());
    assert_eq!(engine.phase(Direction::Revert), Phase::Idle);

    ready.ready(None);
    down.await.unwrap();

    assert!(engine.is_ready());
    assert_eq!(entries(&j), ["DROP TABLE b", "DROP TABLE a"]);
}

#[tokio::test(start_paused = true)]
async fn deferred_calls_replay_in_arrival_order() {
    let j = journal();
    let (engine, ready) = builder()
        .apply("CREATE TABLE t", vec![])
        .revert("DROP TABLE t", vec![])
        .build();
    let mut events = engine.subscribe();
    let db: DriverRef = Arc::new(RecordingDriver::new(&j));

    let mut down = Box::pin(engine.down(db.clone()));
    let mut up = Box::pin(engine.up(db.clone()));
    assert!(futures::poll!(down.as_mut()).is_pending());
    assert!(futures::poll!(up.as_mut()).is_pending());

    ready.ready(None);
    let (down_res, up_res) = tokio::join!(down, up);
    down_res.unwrap();
    up_res.unwrap();

    assert_eq!(entries(&j), ["DROP TABLE t", "CREATE TABLE t"]);

    let seen: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    let deferred: Vec<_> = seen
        .iter()
        .filter(|e| e.kind == EventKind::CallDeferred)
        .filter_map(|e| e.direction)
        .collect();
    assert_eq!(deferred, [Direction::Revert, Direction::Apply]);
    let ready_ev = seen
        .iter()
        .find(|e| e.kind == EventKind::ReadySignaled)
        .unwrap();
    assert_eq!(ready_ev.replayed, Some(2));
}

#[tokio::test(start_paused = true)]
async fn dropped_ready_signal_fails_buffered_and_new_calls() {
    let j = journal();
    let (engine, ready) = builder().apply("INSERT A", vec![]).build();
    let db: DriverRef = Arc::new(RecordingDriver::new(&j));

    let mut up = Box::pin(engine.up(db.clone()));
    assert!(futures::poll!(up.as_mut()).is_pending());

    drop(ready);

    assert!(matches!(up.await, Err(EngineError::Misuse { .. })));
    assert!(matches!(
        engine.up(db).await,
        Err(EngineError::Misuse { .. })
    ));
    assert!(entries(&j).is_empty());
}

#[tokio::test(start_paused = true)]
async fn host_is_exposed_and_shut_down_after_idle_interval() {
    let j = journal();
    let exits = Arc::new(AtomicUsize::new(0));
    let host = Arc::new(FakeHost::default());
    let e = Arc::clone(&exits);
    let (engine, ready) = Engine::builder(Config::default())
        .apply("INSERT A", vec![])
        .on_idle_exit(move || {
            e.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    ready.ready(Some(host.clone() as HostRef));
    assert_eq!(engine.host().map(|h| h.name().to_string()).as_deref(), Some("app"));

    engine.up(Arc::new(RecordingDriver::new(&j))).await.unwrap();
    assert!(engine.idle_timer_armed());

    time::sleep(Duration::from_millis(2999)).await;
    assert_eq!(exits.load(Ordering::SeqCst), 0);
    assert_eq!(host.shutdowns.load(Ordering::SeqCst), 0);

    time::sleep(Duration::from_millis(2)).await;
    assert_eq!(host.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(exits.load(Ordering::SeqCst), 1);
    assert!(!engine.idle_timer_armed());
}

#[tokio::test(start_paused = true)]
async fn new_activity_cancels_the_pending_exit() {
    let j = journal();
    let exits = Arc::new(AtomicUsize::new(0));
    let e = Arc::clone(&exits);
    let (engine, ready) = Engine::builder(Config::default())
        .apply("INSERT A", vec![])
        .revert("DELETE A", vec![])
        .on_idle_exit(move || {
            e.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let mut events = engine.subscribe();
    ready.ready(Some(Arc::new(FakeHost::default()) as HostRef));
    let db: DriverRef = Arc::new(RecordingDriver::new(&j));

    engine.up(db.clone()).await.unwrap();
    time::sleep(Duration::from_secs(1)).await;
    engine.down(db).await.unwrap();

    // First deadline (3s after the apply run) passes quietly.
    time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(exits.load(Ordering::SeqCst), 0);

    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(exits.load(Ordering::SeqCst), 1);

    let idle: Vec<EventKind> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.kind)
        .filter(|k| {
            matches!(
                k,
                EventKind::IdleTimerArmed
                    | EventKind::IdleTimerCancelled
                    | EventKind::IdleTimeoutElapsed
            )
        })
        .collect();
    assert_eq!(
        idle,
        [
            EventKind::IdleTimerArmed,
            EventKind::IdleTimerCancelled,
            EventKind::IdleTimerArmed,
            EventKind::IdleTimeoutElapsed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn no_host_means_no_idle_exit() {
    let j = journal();
    let exits = Arc::new(AtomicUsize::new(0));
    let e = Arc::clone(&exits);
    let (engine, ready) = Engine::builder(Config::default())
        .apply("INSERT A", vec![])
        .on_idle_exit(move || {
            e.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    ready.ready(None);

    engine.up(Arc::new(RecordingDriver::new(&j))).await.unwrap();
    time::sleep(Duration::from_secs(30)).await;

    assert!(engine.host().is_none());
    assert!(!engine.idle_timer_armed());
    assert_eq!(exits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn zero_idle_timeout_never_arms() {
    let j = journal();
    let (engine, ready) = builder()
        .idle_timeout(Duration::ZERO)
        .apply("INSERT A", vec![])
        .build();
    ready.ready(Some(Arc::new(FakeHost::default()) as HostRef));

    engine.up(Arc::new(RecordingDriver::new(&j))).await.unwrap();
    assert!(!engine.idle_timer_armed());
}

#[tokio::test(start_paused = true)]
async fn panicking_continuation_aborts_the_run_and_the_engine_keeps_serving() {
    let j = journal();
    let throws = HookFn::arc(|_db: DriverRef| async {
        if true {
            panic!("continuation threw");
        }
        Ok::<(), HookError>(())
    });
    let (engine, ready) = builder()
        .apply_then("INSERT A", vec![], throws)
        .apply("INSERT B", vec![])
        .revert("DELETE A", vec![])
        .build();
    let mut events = engine.subscribe();
    ready.ready(None);
    let db: DriverRef = Arc::new(RecordingDriver::new(&j));

    let err = engine.up(db.clone()).await.unwrap_err();
    match &err {
        EngineError::Panicked { direction, reason } => {
            assert_eq!(*direction, Direction::Apply);
            assert_eq!(reason, "continuation threw");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.phase(Direction::Apply), Phase::Aborted);

    engine.down(db).await.unwrap();
    assert_eq!(entries(&j), ["INSERT A", "DELETE A"]);

    let aborted: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| e.kind == EventKind::RunAborted)
        .collect();
    assert_eq!(aborted.len(), 1);
    assert_eq!(aborted[0].direction, Some(Direction::Apply));
}

#[tokio::test(start_paused = true)]
async fn panicking_driver_is_reported_as_a_fatal_run_error() {
    struct Exploding;

    #[async_trait]
    impl Driver for Exploding {
        async fn execute(&self, _statement: &str, _params: &[Param]) -> Result<(), StatementError> {
            panic!("driver blew up");
        }
    }

    let (engine, ready) = builder()
        .ignore_errors(true)
        .revert("DROP TABLE t", vec![])
        .build();
    ready.ready(None);

    let err = engine.down(Arc::new(Exploding)).await.unwrap_err();
    assert_eq!(err.as_label(), "run_panicked");
    assert_eq!(err.direction(), Some(Direction::Revert));
    assert_eq!(engine.phase(Direction::Revert), Phase::Aborted);
}

/// Collects formatted `tracing` output in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

async fn run_with_captured_logs(verbose: bool) -> String {
    let out = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(out.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let j = journal();
    let (engine, ready) = builder()
        .verbose(verbose)
        .ignore_errors(true)
        .apply("INSERT A", vec![])
        .apply("INSERT BAD", vec![])
        .build();
    ready.ready(None);

    let driver = Arc::new(RecordingDriver::new(&j).failing_on("INSERT BAD"));
    engine.up(driver).await.unwrap();
    engine.log("checkpoint reached");

    out.text()
}

#[tokio::test(start_paused = true)]
async fn verbose_logs_statements_ignored_errors_and_messages() {
    let text = run_with_captured_logs(true).await;

    assert!(text.contains("apply[0] INSERT A"), "{text}");
    assert!(text.contains("apply[1] INSERT BAD"), "{text}");
    assert!(text.contains("WARN"), "{text}");
    assert!(text.contains("apply[1] ignored error: INSERT BAD rejected"), "{text}");
    assert!(text.contains("checkpoint reached"), "{text}");
}

#[tokio::test(start_paused = true)]
async fn quiet_engine_writes_nothing() {
    let text = run_with_captured_logs(false).await;

    assert!(!text.contains("INSERT A"), "{text}");
    assert!(!text.contains("ignored error"), "{text}");
    assert!(!text.contains("checkpoint reached"), "{text}");
}

#[derive(Default)]
struct KindRecorder {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for KindRecorder {
    async fn on_event(&self, event: &Event) {
        self.kinds.lock().unwrap().push(event.kind);
    }

    fn name(&self) -> &'static str {
        "kind-recorder"
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_the_idle_exit_before_the_process_exits() {
    let j = journal();
    let recorder = Arc::new(KindRecorder::default());
    let seen_at_exit = Arc::new(Mutex::new(Vec::new()));

    let r = Arc::clone(&recorder);
    let seen = Arc::clone(&seen_at_exit);
    let (engine, ready) = Engine::builder(Config::default())
        .apply("INSERT A", vec![])
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .on_idle_exit(move || {
            *seen.lock().unwrap() = r.kinds.lock().unwrap().clone();
        })
        .build();
    ready.ready(Some(Arc::new(FakeHost::default()) as HostRef));

    engine.up(Arc::new(RecordingDriver::new(&j))).await.unwrap();
    time::sleep(Duration::from_secs(5)).await;

    let seen = seen_at_exit.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&EventKind::ReadySignaled));
    assert!(seen.contains(&EventKind::RunFinished));
    assert_eq!(seen.last(), Some(&EventKind::IdleTimeoutElapsed));
}
