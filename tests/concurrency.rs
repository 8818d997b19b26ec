//! Cross-thread tests: a publisher thread feeding a spinning executor.

use nodebus::{Context, Executor, ExecutorConfig, ExecutorState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn test_publisher_thread_feeds_spin() {
    let ctx = Context::init();
    let node = ctx.create_node("listener").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    node.create_subscription("chatter", 1000, move |m| sink.lock().push(m.sequence()))
        .unwrap();

    let executor = Arc::new(Executor::new(Arc::clone(&ctx)));
    let spinner = {
        let executor = Arc::clone(&executor);
        thread::spawn(move || executor.spin(&[node]))
    };

    let publisher_ctx = Arc::clone(&ctx);
    let publisher = thread::spawn(move || {
        for i in 0..200u32 {
            publisher_ctx.publish("chatter", i.to_le_bytes().to_vec());
        }
    });
    publisher.join().unwrap();

    assert!(wait_until(Duration::from_secs(5), || seen.lock().len() == 200));
    ctx.request_shutdown();
    spinner.join().unwrap().unwrap();

    let seen = seen.lock();
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(executor.state(), ExecutorState::Stopped);
}

#[test]
fn test_idle_spin_wakes_on_publish() {
    let ctx = Context::init();
    let node = ctx.create_node("n").unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    node.create_subscription("t", 10, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    // Idle wait far longer than the test timeout: only a wake-up can deliver.
    let executor = Arc::new(Executor::with_config(
        Arc::clone(&ctx),
        ExecutorConfig { idle_wait_ms: 60_000 },
    ));
    let spinner = {
        let executor = Arc::clone(&executor);
        thread::spawn(move || executor.spin(&[node]))
    };
    assert!(wait_until(Duration::from_secs(5), || executor.state() == ExecutorState::Running));
    thread::sleep(Duration::from_millis(20));

    ctx.publish("t", b"wake".to_vec());
    assert!(wait_until(Duration::from_secs(5), || count.load(Ordering::SeqCst) == 1));

    executor.stop();
    spinner.join().unwrap().unwrap();
}

#[test]
fn test_shutdown_from_other_thread_stops_callbacks() {
    let ctx = Context::init();
    let node = ctx.create_node("n").unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    node.create_subscription("t", 10, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    let executor = Arc::new(Executor::new(Arc::clone(&ctx)));
    let spinner = {
        let executor = Arc::clone(&executor);
        let node = Arc::clone(&node);
        thread::spawn(move || executor.spin(&[node]))
    };

    node.shutdown();
    let after = count.load(Ordering::SeqCst);
    assert_eq!(ctx.publish("t", b"late".to_vec()), 0);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), after);

    executor.stop();
    spinner.join().unwrap().unwrap();
}

#[test]
fn test_publish_wakes_the_executor_that_owns_the_topic() {
    let ctx = Context::init();
    let slow = ExecutorConfig { idle_wait_ms: 60_000 };
    let mut spinners = Vec::new();
    let mut executors = Vec::new();
    let mut counts = Vec::new();

    for name in ["left", "right"] {
        let node = ctx.create_node(name).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        node.create_subscription(name, 10, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let executor = Arc::new(Executor::with_config(Arc::clone(&ctx), slow.clone()));
        let e = Arc::clone(&executor);
        spinners.push(thread::spawn(move || e.spin(&[node])));
        executors.push(executor);
        counts.push(count);
    }
    for executor in &executors {
        assert!(wait_until(Duration::from_secs(5), || executor.state() == ExecutorState::Running));
    }
    thread::sleep(Duration::from_millis(20));

    // Each executor sleeps until signalled, so neither publish may be
    // consumed by the wrong one.
    ctx.publish("right", b"r".to_vec());
    assert!(wait_until(Duration::from_secs(2), || counts[1].load(Ordering::SeqCst) == 1));
    ctx.publish("left", b"l".to_vec());
    assert!(wait_until(Duration::from_secs(2), || counts[0].load(Ordering::SeqCst) == 1));

    ctx.request_shutdown();
    for spinner in spinners {
        spinner.join().unwrap().unwrap();
    }
}
