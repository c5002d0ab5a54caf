use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Engine;

/// Background task that compacts the log once enough appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// Compact when `threshold` appends have accumulated. Returns whether it ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.log_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_log().await {
        Ok(()) => {
            debug!("compacted after {appends} appends");
            true
        }
        Err(e) => {
            warn!("compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineOptions, now_ms};
    use crate::model::NewEquipment;
    use ulid::Ulid;

    const H: i64 = 3_600_000;

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let engine = Engine::in_memory(EngineOptions::default());
        let eq = engine
            .create_equipment(NewEquipment {
                short_description: "soldering station".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let start = now_ms() + H;
        for i in 0..4 {
            let outcome = engine
                .reserve(Ulid::new(), eq.equipment_id, start + i * 2 * H, start + i * 2 * H + H)
                .await
                .unwrap();
            if let crate::model::ReserveOutcome::Created { id } = outcome {
                engine.cancel_reservation(id).await.unwrap();
            }
        }
        // 1 create + 4 bookings + 4 cancellations
        assert_eq!(engine.log_appends_since_compact().await, 9);

        assert!(!compact_if_due(&engine, 10).await);
        assert!(compact_if_due(&engine, 9).await);
        assert_eq!(engine.log_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn background_task_compacts_once_due() {
        let engine = Arc::new(Engine::in_memory(EngineOptions::default()));
        for _ in 0..3 {
            engine
                .create_equipment(NewEquipment {
                    short_description: "fume hood".into(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        assert_eq!(engine.log_appends_since_compact().await, 3);

        let task = tokio::spawn(run_compactor(engine.clone(), 3));
        let mut compacted = false;
        for _ in 0..100 {
            if engine.log_appends_since_compact().await == 0 {
                compacted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();
        assert!(compacted, "first tick should compact a log at its threshold");
        assert_eq!(engine.equipment_count(), 3);
    }
}
