use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::combat::hooks::{HookError, PersistenceHook, ProgressionHook, SaveRequest, SightingReport};

/// Work handed from the engines to the redis writer
#[derive(Debug)]
pub enum RedisJob {
    SaveResult(SaveRequest),
    Sighting(SightingReport),
}

/// Persistence and progression hooks backed by a redis worker task
#[derive(Debug, Clone)]
pub struct RedisHooks {
    tx: mpsc::Sender<RedisJob>,
}

impl RedisHooks {
    /// Connect and spawn the writer; engines only ever `try_send` to it
    pub async fn connect(redis_url: &str, queue_capacity: usize) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut con = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        tracing::info!("Successfully connected to Redis at {}", redis_url);

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(run_worker(con, rx));
        Ok(RedisHooks { tx })
    }

    pub fn from_sender(tx: mpsc::Sender<RedisJob>) -> Self {
        RedisHooks { tx }
    }

    fn enqueue(&self, job: RedisJob) -> Result<(), HookError> {
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => HookError::Backpressure,
            TrySendError::Closed(_) => HookError::Unavailable("redis worker stopped".to_string()),
        })
    }
}

impl PersistenceHook for RedisHooks {
    fn save_battle_result(&self, request: SaveRequest) -> Result<(), HookError> {
        self.enqueue(RedisJob::SaveResult(request))
    }
}

impl ProgressionHook for RedisHooks {
    fn combatant_sighted(&self, report: SightingReport) -> Result<(), HookError> {
        self.enqueue(RedisJob::Sighting(report))
    }
}

async fn run_worker(mut con: ConnectionManager, mut rx: mpsc::Receiver<RedisJob>) {
    while let Some(job) = rx.recv().await {
        if let Err(e) = handle_job(&mut con, job).await {
            tracing::warn!("Redis job failed: {}", e);
        }
    }
    tracing::info!("Redis worker stopped");
}

async fn handle_job(con: &mut ConnectionManager, job: RedisJob) -> Result<(), HookError> {
    match job {
        RedisJob::SaveResult(request) => {
            let json = serde_json::to_string(&request).map_err(|e| HookError::Encode(e.to_string()))?;
            con.set::<_, _, ()>(result_key(&request), json)
                .await
                .map_err(|e| HookError::Unavailable(e.to_string()))?;
            tracing::info!("Stored result for battle {}", request.battle_id);
        }
        RedisJob::Sighting(report) => {
            con.sadd::<_, _, ()>(sightings_key(&report.identity), report.species_id)
                .await
                .map_err(|e| HookError::Unavailable(e.to_string()))?;
        }
    }
    Ok(())
}

pub fn result_key(request: &SaveRequest) -> String {
    format!("battle:{}:result", request.battle_id)
}

pub fn sightings_key(identity: &str) -> String {
    format!("sightings:{}", identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SightingReport {
        SightingReport {
            identity: "ash".to_string(),
            species_id: 16,
            name: "Pidgey".to_string(),
            level: 3,
            is_shiny: false,
            location: None,
        }
    }

    #[test]
    fn stopped_worker_reports_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let hooks = RedisHooks::from_sender(tx);
        assert!(matches!(hooks.combatant_sighted(report()), Err(HookError::Unavailable(_))));
    }

    #[test]
    fn full_queue_reports_backpressure() {
        let (tx, _rx) = mpsc::channel(1);
        let hooks = RedisHooks::from_sender(tx);
        assert!(hooks.combatant_sighted(report()).is_ok());
        assert_eq!(hooks.combatant_sighted(report()), Err(HookError::Backpressure));
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(sightings_key("ash"), "sightings:ash");
    }
}
