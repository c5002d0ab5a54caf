use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ulid::Ulid;

use equiptrack::compactor::compact_if_due;
use equiptrack::config::Config;
use equiptrack::engine::{Engine, EngineError, now_ms};
use equiptrack::model::{NewEquipment, ReserveOutcome};
use equiptrack::service::BookingService;

const H: i64 = 3_600_000; // 1 hour in ms
const JAN_1: i64 = 1_767_225_600_000; // 2026-01-01T00:00:00Z

// ── Test infrastructure ──────────────────────────────────────

fn test_config() -> Config {
    let dir = std::env::temp_dir().join(format!("equiptrack_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    Config {
        data_dir: dir,
        ..Config::default()
    }
}

fn open(config: &Config) -> (Arc<Engine>, BookingService) {
    let engine = Arc::new(Engine::open(&config.wal_path(), config.engine_options()).unwrap());
    let service = BookingService::from_engine(engine.clone(), config);
    (engine, service)
}

async fn register(service: &BookingService, name: &str) -> Ulid {
    service
        .register_equipment(NewEquipment {
            name: name.into(),
            short_description: format!("{name}, shared bench"),
            full_description: String::new(),
        })
        .await
        .unwrap()
        .equipment_id
}

fn cleanup(path: PathBuf) {
    let _ = std::fs::remove_dir_all(path);
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_users_never_double_book() {
    let config = test_config();
    let (_engine, service) = open(&config);
    let service = Arc::new(service);

    let items = [
        register(&service, "Scope").await,
        register(&service, "Analyzer").await,
        register(&service, "Printer").await,
    ];

    // 30 users each try every hour-long slot of a four-hour morning on every item.
    let mut handles = Vec::new();
    for _ in 0..30 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let user = Ulid::new();
            let mut won: usize = 0;
            for item in items {
                for slot in 0..4 {
                    let start = JAN_1 + slot * 2 * H;
                    if service.book(user, item, start, start + H).await.unwrap().created() {
                        won += 1;
                    }
                }
            }
            won
        }));
    }

    let mut total = 0;
    for h in handles {
        total += h.await.unwrap();
    }
    assert_eq!(total, items.len() * 4);

    for item in items {
        let info = service.reservation_info(item).await.unwrap();
        assert_eq!(info.amount, 4);
        for pair in info.windows.windows(2) {
            assert!(pair[0].end < pair[1].start, "windows must not touch: {pair:?}");
        }
    }
    cleanup(config.data_dir);
}

#[tokio::test]
async fn bookings_survive_restart() {
    let config = test_config();
    let user = Ulid::new();

    let item = {
        let (_engine, service) = open(&config);
        let item = register(&service, "Reflow oven").await;
        assert!(service.book(user, item, JAN_1 + H, JAN_1 + 2 * H).await.unwrap().created());
        item
    };
    // Let the previous writer task wind down.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (_engine, service) = open(&config);
    let eq = service.equipment(item).await.unwrap();
    assert_eq!(eq.name, "Reflow oven");

    let again = service.book(Ulid::new(), item, JAN_1 + H, JAN_1 + 2 * H).await.unwrap();
    assert!(matches!(again, ReserveOutcome::Rejected { .. }));

    assert_eq!(service.release_user(user).await.unwrap(), 1);
    assert!(service.is_available(item, JAN_1 + H, JAN_1 + 2 * H).await.unwrap());
    cleanup(config.data_dir);
}

#[tokio::test]
async fn compaction_then_restart_keeps_calendar() {
    let config = test_config();
    let item = {
        let (engine, service) = open(&config);
        let item = register(&service, "Soldering station").await;
        for slot in 0..6 {
            let start = JAN_1 + slot * 2 * H;
            let outcome = service.book(Ulid::new(), item, start, start + H).await.unwrap();
            if slot % 3 == 0 {
                let ReserveOutcome::Created { id } = outcome else {
                    panic!("expected slot {slot} to be free");
                };
                service.cancel_reservation(id).await.unwrap();
            }
        }
        assert!(!compact_if_due(&engine, 1_000).await);
        assert!(compact_if_due(&engine, 1).await);
        item
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (engine, service) = open(&config);
    assert_eq!(engine.log_appends_since_compact().await, 0);
    let info = service.reservation_info(item).await.unwrap();
    assert_eq!(info.amount, 4);
    assert_eq!(info.windows[0].start, JAN_1 + 2 * H);
    cleanup(config.data_dir);
}

#[tokio::test]
async fn listing_payload_shape() {
    let config = test_config();
    let (_engine, service) = open(&config);

    let empty = service.list_equipment(None, None).await.unwrap();
    let json = serde_json::to_value(&empty).unwrap();
    assert_eq!(json["total_count"], 0);
    assert_eq!(json["total_pages"], 0);
    assert_eq!(json["has_more"], false);
    assert!(json["equipments"].as_array().unwrap().is_empty());

    let item = register(&service, "Pipette").await;
    service.book(Ulid::new(), item, JAN_1, JAN_1 + H).await.unwrap();
    let info = serde_json::to_value(service.reservation_info(item).await.unwrap()).unwrap();
    assert_eq!(info["amount"], 1);
    assert_eq!(info["data"][0]["reservation_start"], JAN_1);
    assert_eq!(info["data"][0]["reservation_end"], JAN_1 + H);
    cleanup(config.data_dir);
}

#[tokio::test]
async fn removal_guarded_by_live_bookings() {
    let config = test_config();
    let (_engine, service) = open(&config);
    let item = register(&service, "Fume hood").await;

    let start = now_ms() + 24 * H;
    let ReserveOutcome::Created { id } = service.book(Ulid::new(), item, start, start + H).await.unwrap()
    else {
        panic!("expected booking to be created");
    };

    assert!(matches!(
        service.remove_equipment(item).await,
        Err(EngineError::HasLiveReservations(_))
    ));
    service.cancel_reservation(id).await.unwrap();
    service.remove_equipment(item).await.unwrap();
    assert!(matches!(service.equipment(item).await, Err(EngineError::NotFound(_))));
    cleanup(config.data_dir);
}
