//! Configuration types for obi-taker
//!
//! Settings come from an optional TOML file and are then overridden by the
//! flat environment variables the bot has always accepted (`THRESHOLD`,
//! `MAX_POLLS`, ...). Everything is read once at startup.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value could not be parsed or is out of range
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Exchange connectivity and market data settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// REST base URL, including the `/api` prefix
    pub base_url: String,
    /// Traded symbol
    pub symbol: String,
    /// Use summed depth levels instead of L1 quantities
    pub use_depth: bool,
    /// Number of depth levels per side in depth mode
    pub depth_levels: usize,
    /// `recvWindow` for signed requests, milliseconds
    pub recv_window_ms: u64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://testnet.binance.vision/api".to_string(),
            symbol: "BTCUSDT".to_string(),
            use_depth: false,
            depth_levels: 10,
            recv_window_ms: 5000,
            request_timeout_secs: 10,
        }
    }
}

/// Signal pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Static imbalance threshold (also the pre-calibration threshold)
    pub threshold: f64,
    /// Confirmation window length (M)
    pub confirmation_m: usize,
    /// Required hits inside the window (K)
    pub confirmation_k: usize,
    /// Identical books tolerated before the raw side is forced to HOLD (0 = off)
    pub stale_repeat_limit: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            threshold: 0.06,
            confirmation_m: 1,
            confirmation_k: 1,
            stale_repeat_limit: 0,
        }
    }
}

/// Threshold calibration mode
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Static threshold for the whole run
    #[default]
    Off,
    /// Calibrate once after the warm-up window, then freeze
    WarmupThenTrade,
    /// Recalibrate on a trailing window every `trade_polls` polls
    RollingWalkForward,
}

impl FromStr for CalibrationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "disabled" | "none" => Ok(Self::Off),
            "warmup_then_trade" => Ok(Self::WarmupThenTrade),
            "rolling_walk_forward" => Ok(Self::RollingWalkForward),
            other => Err(format!("unknown calibration mode '{other}'")),
        }
    }
}

impl std::fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::WarmupThenTrade => "warmup_then_trade",
            Self::RollingWalkForward => "rolling_walk_forward",
        };
        f.write_str(s)
    }
}

/// Walk-forward threshold calibration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub mode: CalibrationMode,
    /// Sample window (W)
    pub window_polls: usize,
    /// Polls traded between recalibrations (H)
    pub trade_polls: usize,
    /// Forward-return horizon in polls
    pub horizon_polls: usize,
    pub grid_min: f64,
    pub grid_max: f64,
    pub grid_step: f64,
    /// Minimum non-HOLD samples a candidate must produce
    pub min_trades: usize,
    pub turnover_penalty_alpha: f64,
    /// Score smoothing rate across recalibrations (0 = off)
    pub ema_lambda: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            mode: CalibrationMode::Off,
            window_polls: 300,
            trade_polls: 100,
            horizon_polls: 5,
            grid_min: 0.02,
            grid_max: 0.50,
            grid_step: 0.02,
            min_trades: 20,
            turnover_penalty_alpha: 0.0,
            ema_lambda: 0.0,
        }
    }
}

/// Risk limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskConfig {
    pub cooldown_secs: f64,
    pub max_notional_per_trade_usdt: Decimal,
    /// Sized trades below this notional are suppressed (0 = off)
    pub min_notional_per_trade_usdt: Decimal,
    pub max_abs_position_btc: Decimal,
    /// Allow sells that take the position below zero
    pub allow_short: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 15.0,
            max_notional_per_trade_usdt: Decimal::new(10, 0),
            min_notional_per_trade_usdt: Decimal::ZERO,
            max_abs_position_btc: Decimal::new(1, 3), // 0.001
            allow_short: false,
        }
    }
}

/// Dynamic sizing mode
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    /// Notional scales with |imbalance|
    #[default]
    LinearAbs,
    /// Notional scales with the imbalance in excess of the threshold
    LinearExcess,
}

impl FromStr for SizingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear_abs" => Ok(Self::LinearAbs),
            "linear_excess" => Ok(Self::LinearExcess),
            other => Err(format!("unknown sizing mode '{other}'")),
        }
    }
}

/// Position sizing configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Scale notional with signal strength instead of always using the max
    pub dynamic: bool,
    pub mode: SizingMode,
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Paper,
    Live,
}

/// Execution engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
}

/// Paper simulator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaperConfig {
    pub start_usdt: Decimal,
    pub start_btc: Decimal,
    pub fee_rate: Decimal,
    pub slippage_bps: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            start_usdt: Decimal::new(10_000, 0),
            start_btc: Decimal::ZERO,
            fee_rate: Decimal::ZERO,
            slippage_bps: Decimal::ZERO,
        }
    }
}

/// Polling, backoff and stop conditions
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub poll_interval_secs: f64,
    pub max_consecutive_errors: u32,
    pub backoff_base_secs: f64,
    pub backoff_cap_secs: f64,
    pub resync_every_n_polls: u64,
    /// Stop after this many polls (0 = run until stopped)
    pub max_polls: u64,
    pub print_every_n_polls: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2.0,
            max_consecutive_errors: 5,
            backoff_base_secs: 2.0,
            backoff_cap_secs: 60.0,
            resync_every_n_polls: 30,
            max_polls: 0,
            print_every_n_polls: 1,
        }
    }
}

impl ResilienceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    pub output_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("outputs/trades.csv"),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply flat `KEY=value` overrides, then clamp everything into range
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup: &lookup };

        if let Some(dry_run) = env.parse_bool("DRY_RUN")? {
            self.execution.mode = if dry_run {
                ExecutionMode::Paper
            } else {
                ExecutionMode::Live
            };
        }
        env.set(&mut self.exchange.symbol, "SYMBOL")?;
        env.set(&mut self.exchange.base_url, "BINANCE_TESTNET_BASE_URL")?;
        env.set_bool(&mut self.exchange.use_depth, "USE_DEPTH")?;
        env.set(&mut self.exchange.depth_levels, "DEPTH_LEVELS")?;

        env.set(&mut self.signal.threshold, "THRESHOLD")?;
        env.set(&mut self.signal.confirmation_m, "CONFIRMATION_M")?;
        env.set(&mut self.signal.confirmation_k, "CONFIRMATION_K")?;
        env.set(&mut self.signal.stale_repeat_limit, "STALE_REPEAT_LIMIT")?;

        if let Some(false) = env.parse_bool("ENABLE_THRESHOLD_CALIBRATION")? {
            self.calibration.mode = CalibrationMode::Off;
        }
        env.set(&mut self.calibration.mode, "CALIBRATION_MODE")?;
        env.set(&mut self.calibration.window_polls, "CALIBRATION_W_POLLS")?;
        env.set(&mut self.calibration.trade_polls, "CALIBRATION_H_POLLS")?;
        env.set(&mut self.calibration.horizon_polls, "CALIBRATION_HORIZON_POLLS")?;
        env.set(&mut self.calibration.grid_min, "THRESH_GRID_MIN")?;
        env.set(&mut self.calibration.grid_max, "THRESH_GRID_MAX")?;
        env.set(&mut self.calibration.grid_step, "THRESH_GRID_STEP")?;
        env.set(&mut self.calibration.min_trades, "CALIBRATION_MIN_TRADES")?;
        env.set(
            &mut self.calibration.turnover_penalty_alpha,
            "CALIBRATION_TURNOVER_PENALTY_ALPHA",
        )?;
        env.set(&mut self.calibration.ema_lambda, "CALIBRATION_EMA_LAMBDA")?;

        env.set(&mut self.risk.cooldown_secs, "COOLDOWN_SECONDS")?;
        env.set(
            &mut self.risk.max_notional_per_trade_usdt,
            "MAX_NOTIONAL_PER_TRADE_USDT",
        )?;
        env.set(
            &mut self.risk.min_notional_per_trade_usdt,
            "MIN_NOTIONAL_PER_TRADE_USDT",
        )?;
        env.set(&mut self.risk.max_abs_position_btc, "MAX_ABS_POSITION_BTC")?;
        env.set_bool(&mut self.risk.allow_short, "ALLOW_SHORT")?;
        env.set_bool(&mut self.sizing.dynamic, "DYNAMIC_SIZING")?;
        env.set(&mut self.sizing.mode, "SIZING_MODE")?;

        env.set(&mut self.paper.start_usdt, "PAPER_START_USDT")?;
        env.set(&mut self.paper.start_btc, "PAPER_START_BTC")?;
        env.set(&mut self.paper.fee_rate, "PAPER_FEE_RATE")?;
        env.set(&mut self.paper.slippage_bps, "PAPER_SLIPPAGE_BPS")?;

        env.set(&mut self.resilience.poll_interval_secs, "POLL_INTERVAL_SECONDS")?;
        env.set(
            &mut self.resilience.max_consecutive_errors,
            "MAX_CONSECUTIVE_ERRORS",
        )?;
        env.set(&mut self.resilience.backoff_base_secs, "BACKOFF_BASE_SECONDS")?;
        env.set(&mut self.resilience.backoff_cap_secs, "BACKOFF_CAP_SECONDS")?;
        env.set(&mut self.resilience.resync_every_n_polls, "RESYNC_EVERY_N_POLLS")?;
        env.set(&mut self.resilience.max_polls, "MAX_POLLS")?;
        env.set(&mut self.resilience.print_every_n_polls, "PRINT_EVERY_N_POLLS")?;

        env.set(&mut self.data.output_path, "OUTPUT_CSV")?;
        env.set(&mut self.telemetry.log_level, "LOG_LEVEL")?;

        self.validate()?;
        self.normalize();
        Ok(self)
    }

    /// Reject values that clamping cannot repair
    ///
    /// Every float must be finite and waits must fit in a [`Duration`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("signal.threshold", self.signal.threshold),
            ("calibration.grid_min", self.calibration.grid_min),
            ("calibration.grid_max", self.calibration.grid_max),
            ("calibration.grid_step", self.calibration.grid_step),
            (
                "calibration.turnover_penalty_alpha",
                self.calibration.turnover_penalty_alpha,
            ),
            ("calibration.ema_lambda", self.calibration.ema_lambda),
            ("risk.cooldown_secs", self.risk.cooldown_secs),
        ];
        for (key, value) in finite {
            check_float(key, value, f64::MAX)?;
        }

        let waits = [
            ("resilience.poll_interval_secs", self.resilience.poll_interval_secs),
            ("resilience.backoff_base_secs", self.resilience.backoff_base_secs),
            ("resilience.backoff_cap_secs", self.resilience.backoff_cap_secs),
        ];
        for (key, value) in waits {
            check_float(key, value, MAX_WAIT_SECS)?;
        }
        Ok(())
    }

    /// Clamp values into their valid ranges
    pub fn normalize(&mut self) {
        let signal = &mut self.signal;
        signal.threshold = signal.threshold.max(0.0);
        signal.confirmation_m = signal.confirmation_m.max(1);
        signal.confirmation_k = signal.confirmation_k.clamp(1, signal.confirmation_m);

        self.exchange.depth_levels = self.exchange.depth_levels.max(1);

        let cal = &mut self.calibration;
        cal.window_polls = cal.window_polls.max(1);
        cal.trade_polls = cal.trade_polls.max(1);
        cal.horizon_polls = cal.horizon_polls.max(1);
        cal.grid_min = cal.grid_min.max(0.0);
        cal.ema_lambda = cal.ema_lambda.clamp(0.0, 1.0);
        cal.turnover_penalty_alpha = cal.turnover_penalty_alpha.max(0.0);

        let risk = &mut self.risk;
        risk.cooldown_secs = risk.cooldown_secs.max(0.0);
        risk.max_notional_per_trade_usdt = risk.max_notional_per_trade_usdt.max(Decimal::ZERO);
        risk.min_notional_per_trade_usdt = risk.min_notional_per_trade_usdt.max(Decimal::ZERO);
        risk.max_abs_position_btc = risk.max_abs_position_btc.max(Decimal::ZERO);

        let paper = &mut self.paper;
        paper.start_usdt = paper.start_usdt.max(Decimal::ZERO);
        paper.start_btc = paper.start_btc.max(Decimal::ZERO);
        paper.fee_rate = paper.fee_rate.max(Decimal::ZERO);
        paper.slippage_bps = paper.slippage_bps.max(Decimal::ZERO);

        let res = &mut self.resilience;
        res.poll_interval_secs = res.poll_interval_secs.max(0.1);
        res.max_consecutive_errors = res.max_consecutive_errors.max(1);
        res.backoff_base_secs = res.backoff_base_secs.max(0.1);
        res.backoff_cap_secs = res.backoff_cap_secs.max(1.0);
        res.resync_every_n_polls = res.resync_every_n_polls.max(1);
        res.print_every_n_polls = res.print_every_n_polls.max(1);
    }
}

/// Longest configurable poll or backoff wait
const MAX_WAIT_SECS: f64 = 86_400.0;

fn check_float(key: &str, value: f64, max: f64) -> Result<(), ConfigError> {
    let reason = if !value.is_finite() {
        "must be a finite number".to_string()
    } else if value > max {
        format!("must be at most {max}")
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    })
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn set<T>(&self, target: &mut T, key: &str) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = self.raw(key) {
            *target = value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn parse_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let Some(value) = self.raw(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "n" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
                reason: "expected a boolean".to_string(),
            }),
        }
    }

    fn set_bool(&self, target: &mut bool, key: &str) -> Result<(), ConfigError> {
        if let Some(v) = self.parse_bool(key)? {
            *target = v;
        }
        Ok(())
    }
}
