// Executors and context driving several nodes
use capybarish_core::communication::QoSProfile;
use capybarish_core::config::{CapyConfig, ExecutorConfig};
use capybarish_core::context::Context;
use capybarish_core::scheduling::{MultiThreadedExecutor, Rate, SingleThreadedExecutor};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_multi_threaded_executor_drives_several_nodes() {
    let context = Context::new();
    let producer = context.create_node("producer").unwrap();
    let consumer = context.create_node("consumer").unwrap();

    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    consumer
        .create_subscription::<u32, _>("data", QoSProfile::keep_all(), move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    let publisher = producer.create_publisher::<u32>("data", QoSProfile::keep_all()).unwrap();
    let sent = Arc::new(AtomicUsize::new(0));
    let sent_counter = sent.clone();
    producer
        .create_timer(Duration::from_millis(2), move || {
            let n = sent_counter.fetch_add(1, Ordering::Relaxed);
            let _ = publisher.publish(n as u32);
        })
        .unwrap();

    let executor = Arc::new(MultiThreadedExecutor::new());
    executor.add_node(&producer);
    executor.add_node(&consumer);

    let spinner = {
        let executor = executor.clone();
        std::thread::spawn(move || executor.spin())
    };
    let start = Instant::now();
    while received.load(Ordering::Relaxed) < 5 && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(5));
    }
    executor.shutdown();
    spinner.join().unwrap().unwrap();

    assert!(received.load(Ordering::Relaxed) >= 5);
    assert!(!executor.is_running());
    assert_eq!(executor.worker_count(), 0);
}

#[test]
fn test_single_threaded_spin_stops_on_shutdown() {
    let context = Context::new();
    let node = context.create_node("looper").unwrap();
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    node.create_timer(Duration::from_millis(1), move || {
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let executor = Arc::new(SingleThreadedExecutor::with_config(ExecutorConfig {
        idle_sleep_us: Some(200),
        ..ExecutorConfig::default()
    }));
    executor.add_node(&node);
    let spinner = {
        let executor = executor.clone();
        std::thread::spawn(move || executor.spin())
    };
    std::thread::sleep(Duration::from_millis(50));
    executor.shutdown();
    spinner.join().unwrap();

    assert!(ticks.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_rate_paces_publisher_loop() {
    let context = Context::new();
    let node = context.create_node("paced").unwrap();
    let publisher = node.create_publisher::<f64>("wave", QoSProfile::sensor_data()).unwrap();
    let mut rate = Rate::new(200.0).unwrap();

    let start = Instant::now();
    for i in 0..10 {
        publisher.publish(i as f64).unwrap();
        rate.sleep();
    }
    assert!(start.elapsed() >= Duration::from_millis(45));
    assert_eq!(publisher.publish_count(), 10);
}

#[test]
fn test_context_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[network]\nbase_port = 9100\n\n[executor]\nidle_sleep_ms = 2").unwrap();

    let config = CapyConfig::from_file(file.path()).unwrap();
    let context = Context::with_config(config).unwrap();
    let node = context.create_node("configured").unwrap();
    node.create_publisher::<u8>("first", QoSProfile::default()).unwrap();
    node.create_publisher::<u8>("second", QoSProfile::default()).unwrap();

    assert_eq!(context.manager().allocated_port("/first"), Some(9100));
    assert_eq!(context.manager().allocated_port("/second"), Some(9101));
    assert_eq!(context.config().executor.idle_sleep(), Duration::from_millis(2));
}
