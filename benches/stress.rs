use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Weekday};
use ulid::Ulid;

use tutorslot::engine::{Engine, HoldRequest, WalStore};
use tutorslot::gateway::{PaymentResult, SandboxGateway};
use tutorslot::model::{Actor, AvailabilityTemplate, TimeRange, WallClock};
use tutorslot::notify::NotifyHub;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

struct Bench {
    engine: Arc<Engine>,
    gateway: Arc<SandboxGateway>,
    teacher: Ulid,
}

/// First Monday of 2024.
fn monday(week: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(7 * week)
}

fn hour_slot(hour: u16) -> TimeRange {
    TimeRange::new(WallClock::new(hour, 0).unwrap(), WallClock::new(hour + 1, 0).unwrap())
}

async fn setup(name: &str) -> Bench {
    let dir = std::env::temp_dir().join(format!("tutorslot_bench_{name}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Arc::new(WalStore::open(&dir.join("reservations.wal")).unwrap());
    let gateway = Arc::new(SandboxGateway::new());
    let engine = Arc::new(Engine::new(store, gateway.clone(), Arc::new(NotifyHub::new())));

    let teacher = Ulid::new();
    let mut template = AvailabilityTemplate::default();
    let day = template.day_mut(Weekday::Mon);
    day.enabled = true;
    day.ranges.push(TimeRange::new(WallClock::new(0, 0).unwrap(), WallClock::new(23, 0).unwrap()));
    engine
        .publish_availability(Actor::instructor(teacher), teacher, template)
        .await
        .unwrap();

    Bench { engine, gateway, teacher }
}

impl Bench {
    fn request(&self, week: u64, hour: u16) -> HoldRequest {
        HoldRequest {
            teacher_id: self.teacher,
            course_id: Ulid::new(),
            date: monday(week),
            slot: hour_slot(hour),
            note: String::new(),
        }
    }
}

async fn phase1_sequential() {
    let bench = setup("seq").await;
    let n = 2000u64;
    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();

    for i in 0..n {
        let req = bench.request(i / 23, (i % 23) as u16);
        let t = Instant::now();
        bench.engine.create_hold(Actor::learner(Ulid::new()), req).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} holds in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("hold latency", &mut latencies);
}

async fn phase2_concurrent() {
    let bench = setup("conc").await;
    let n_tasks = 10u64;
    let n_per_task = 200u64;
    let start = Instant::now();

    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let engine = bench.engine.clone();
        let requests: Vec<_> = (0..n_per_task).map(|j| bench.request(task * 10 + j / 23, (j % 23) as u16)).collect();
        handles.push(tokio::spawn(async move {
            for req in requests {
                engine.create_hold(Actor::learner(Ulid::new()), req).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} holds = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Many learners hold and pay for the same slot at once; exactly one may win.
async fn phase3_payment_race() {
    let bench = setup("race").await;
    let n_slots = 50u64;
    let contenders = 8;
    let mut latencies = Vec::new();
    let start = Instant::now();

    for s in 0..n_slots {
        let mut orders = Vec::with_capacity(contenders);
        for _ in 0..contenders {
            let student = Actor::learner(Ulid::new());
            let r = bench
                .engine
                .create_hold(student, bench.request(s / 23, (s % 23) as u16))
                .await
                .unwrap();
            let r = bench.engine.begin_payment(r.id, student, 4500).await.unwrap();
            orders.push(r.payment_order_id.unwrap());
        }

        let mut handles = Vec::new();
        for order in orders {
            let engine = bench.engine.clone();
            handles.push(tokio::spawn(async move {
                let t = Instant::now();
                let won = engine.confirm_payment(&order, PaymentResult::Succeeded).await.is_ok();
                (won, t.elapsed())
            }));
        }
        let mut winners = 0;
        for h in handles {
            let (won, latency) = h.await.unwrap();
            winners += usize::from(won);
            latencies.push(latency);
        }
        assert_eq!(winners, 1, "slot {s} had {winners} winners");
    }

    let elapsed = start.elapsed();
    println!(
        "  {n_slots} slots x {contenders} contenders in {:.2}s, {} refunds issued",
        elapsed.as_secs_f64(),
        bench.gateway.refund_count()
    );
    print_latency("confirm latency", &mut latencies);
}

async fn phase4_read_under_load() {
    let bench = setup("read").await;
    for i in 0..200u64 {
        bench
            .engine
            .create_hold(Actor::learner(Ulid::new()), bench.request(0, (i % 23) as u16))
            .await
            .unwrap();
    }

    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..5u64 {
        let engine = bench.engine.clone();
        let stop = stop.clone();
        let teacher = bench.teacher;
        writers.push(tokio::spawn(async move {
            let mut i = 0u64;
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let req = HoldRequest {
                    teacher_id: teacher,
                    course_id: Ulid::new(),
                    date: monday(1 + w * 1000 + i / 23),
                    slot: hour_slot((i % 23) as u16),
                    note: String::new(),
                };
                let _ = engine.create_hold(Actor::learner(Ulid::new()), req).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut readers = Vec::new();
    for _ in 0..n_readers {
        let engine = bench.engine.clone();
        let teacher = bench.teacher;
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                engine.open_ranges(teacher, monday(0)).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }

    print_latency("open-slots query", &mut all);
}

#[tokio::main]
async fn main() {
    println!("=== tutorslot stress benchmark ===\n");

    println!("[phase 1] sequential hold throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent hold throughput");
    phase2_concurrent().await;

    println!("\n[phase 3] contended payment confirmation");
    phase3_payment_race().await;

    println!("\n[phase 4] open-slot reads under write load");
    phase4_read_under_load().await;

    println!("\n=== benchmark complete ===");
}
