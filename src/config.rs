use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::info;

use crate::combat::ko::KoTiming;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub battle: BattleSettings,
    pub performance: PerformanceConfig,
    pub monsters: MonstersConfig,
    pub redis: RedisConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

/// Game-balance pacing, all in milliseconds unless noted
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BattleSettings {
    pub intro_delay_ms: u64,
    pub wild_ai_delay_ms: u64,
    pub trainer_ai_delay_ms: u64,
    pub attacker_delay_ms: u64,
    pub faint_delay_ms: u64,
    pub ko_message_delay_ms: u64,
    pub winner_delay_ms: u64,
    pub selection_timeout_sec: u64, // 0 disables the timeout
    pub wild_flee_chance: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub event_channel_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonstersConfig {
    pub moves_path: String,
    pub type_chart_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>, // Tracing-only hooks when unset
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
                port: 8080,
                cors_origins: vec!["*".to_string()],
            },
            battle: BattleSettings {
                intro_delay_ms: 1500,
                wild_ai_delay_ms: 0,
                trainer_ai_delay_ms: 1200,
                attacker_delay_ms: 1000,
                faint_delay_ms: 500,
                ko_message_delay_ms: 1000,
                winner_delay_ms: 1500,
                selection_timeout_sec: 60,
                wild_flee_chance: 0.05,
            },
            performance: PerformanceConfig {
                event_channel_size: 256,
            },
            monsters: MonstersConfig {
                moves_path: "resources/moves.json".to_string(),
                type_chart_path: "resources/types.json".to_string(),
            },
            redis: RedisConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse::<T>().ok())
}

impl Config {
    pub fn from_env() -> Self {
        // Load .env file if available
        dotenv::dotenv().ok();

        let mut config = Config::default();

        // Server config
        if let Some(port) = parse_env::<u16>("PORT") {
            config.server.port = port;
        }

        if let Some(host) = parse_env::<IpAddr>("HOST") {
            config.server.host = host;
        }

        if let Ok(cors) = env::var("CORS_ORIGINS") {
            config.server.cors_origins = cors.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Battle pacing
        let battle = &mut config.battle;
        for (key, slot) in [
            ("INTRO_DELAY_MS", &mut battle.intro_delay_ms),
            ("WILD_AI_DELAY_MS", &mut battle.wild_ai_delay_ms),
            ("TRAINER_AI_DELAY_MS", &mut battle.trainer_ai_delay_ms),
            ("ATTACKER_DELAY_MS", &mut battle.attacker_delay_ms),
            ("FAINT_DELAY_MS", &mut battle.faint_delay_ms),
            ("KO_MESSAGE_DELAY_MS", &mut battle.ko_message_delay_ms),
            ("WINNER_DELAY_MS", &mut battle.winner_delay_ms),
            ("SELECTION_TIMEOUT_SEC", &mut battle.selection_timeout_sec),
        ] {
            if let Some(value) = parse_env::<u64>(key) {
                *slot = value;
            }
        }

        if let Some(chance) = parse_env::<f64>("WILD_FLEE_CHANCE") {
            if (0.0..=1.0).contains(&chance) {
                battle.wild_flee_chance = chance;
            }
        }

        // Performance config
        if let Some(channel_size) = parse_env::<usize>("EVENT_CHANNEL_SIZE") {
            config.performance.event_channel_size = channel_size;
        }

        // Monster data
        if let Ok(moves_path) = env::var("MOVES_PATH") {
            config.monsters.moves_path = moves_path;
        }

        if let Ok(type_chart_path) = env::var("TYPE_CHART_PATH") {
            config.monsters.type_chart_path = type_chart_path;
        }

        if let Ok(url) = env::var("REDIS_URL") {
            if !url.trim().is_empty() {
                config.redis.url = Some(url);
            }
        }

        info!("Configuration loaded: {:?}", config);
        config
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    pub fn battle_timing(&self) -> BattleTiming {
        let b = &self.battle;
        BattleTiming {
            intro_delay: Duration::from_millis(b.intro_delay_ms),
            wild_ai_delay: Duration::from_millis(b.wild_ai_delay_ms),
            trainer_ai_delay: Duration::from_millis(b.trainer_ai_delay_ms),
            attacker_delay: Duration::from_millis(b.attacker_delay_ms),
            ko: KoTiming {
                faint_delay: Duration::from_millis(b.faint_delay_ms),
                message_delay: Duration::from_millis(b.ko_message_delay_ms),
                winner_delay: Duration::from_millis(b.winner_delay_ms),
            },
            selection_timeout: (b.selection_timeout_sec > 0).then(|| Duration::from_secs(b.selection_timeout_sec)),
            wild_flee_chance: b.wild_flee_chance,
        }
    }
}

/// Engine-facing pacing derived from [`Config`]
#[derive(Debug, Clone, PartialEq)]
pub struct BattleTiming {
    pub intro_delay: Duration,
    pub wild_ai_delay: Duration,
    pub trainer_ai_delay: Duration,
    pub attacker_delay: Duration,
    pub ko: KoTiming,
    pub selection_timeout: Option<Duration>,
    pub wild_flee_chance: f64,
}

impl Default for BattleTiming {
    fn default() -> Self {
        Config::default().battle_timing()
    }
}

impl BattleTiming {
    /// No delays, no timeout and no wild fleeing
    pub fn instant() -> Self {
        BattleTiming {
            intro_delay: Duration::ZERO,
            wild_ai_delay: Duration::ZERO,
            trainer_ai_delay: Duration::ZERO,
            attacker_delay: Duration::ZERO,
            ko: KoTiming {
                faint_delay: Duration::ZERO,
                message_delay: Duration::ZERO,
                winner_delay: Duration::ZERO,
            },
            selection_timeout: None,
            wild_flee_chance: 0.0,
        }
    }
}
